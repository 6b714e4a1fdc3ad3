use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
	coding::*,
	message::{Message, ParameterBytes, ParameterVarInt, Parameters, Version, VersionCode, Versions},
};

/// What an endpoint is willing to do on a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u64)]
pub enum Role {
	/// Sends Announce, answers Subscribe.
	Publisher = 0x01,
	/// Answers Announce, sends Subscribe.
	Subscriber = 0x02,
	Both = 0x03,
}

impl Role {
	pub fn is_publisher(self) -> bool {
		matches!(self, Self::Publisher | Self::Both)
	}

	pub fn is_subscriber(self) -> bool {
		matches!(self, Self::Subscriber | Self::Both)
	}

	fn from_parameters(params: &Parameters) -> Result<Self, DecodeError> {
		let role = params.get_varint(ParameterVarInt::Role).ok_or(DecodeError::Missing)?;
		Self::try_from(role).map_err(|_| DecodeError::InvalidValue)
	}
}

/// Sent by the client on the control stream to open the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSetup {
	pub versions: Versions,
	pub role: Role,
	pub path: Option<String>,
	pub implementation: Option<String>,
}

impl Message for ClientSetup {
	const ID: u64 = 0x40;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.versions.encode(w, version);

		let mut params = Parameters::default();
		params.set_varint(ParameterVarInt::Role, self.role.into());
		if let Some(path) = &self.path {
			params.set_bytes(ParameterBytes::Path, path.as_bytes());
		}
		if let Some(implementation) = &self.implementation {
			params.set_bytes(ParameterBytes::Implementation, implementation.as_bytes());
		}
		params.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let versions = Versions::decode(r, version)?;
		let params = Parameters::decode(r, version)?;

		let role = Role::from_parameters(&params)?;
		let path = utf8_param(&params, ParameterBytes::Path)?;
		let implementation = utf8_param(&params, ParameterBytes::Implementation)?;

		Ok(Self {
			versions,
			role,
			path,
			implementation,
		})
	}
}

/// Sent by the server in response to [ClientSetup].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSetup {
	pub version: VersionCode,
	pub role: Role,
	pub implementation: Option<String>,
}

impl Message for ServerSetup {
	const ID: u64 = 0x41;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.version.encode(w, version);

		let mut params = Parameters::default();
		params.set_varint(ParameterVarInt::Role, self.role.into());
		if let Some(implementation) = &self.implementation {
			params.set_bytes(ParameterBytes::Implementation, implementation.as_bytes());
		}
		params.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let selected = VersionCode::decode(r, version)?;
		let params = Parameters::decode(r, version)?;

		Ok(Self {
			version: selected,
			role: Role::from_parameters(&params)?,
			implementation: utf8_param(&params, ParameterBytes::Implementation)?,
		})
	}
}

fn utf8_param(params: &Parameters, kind: ParameterBytes) -> Result<Option<String>, DecodeError> {
	match params.get_bytes(kind) {
		Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec())?)),
		None => Ok(None),
	}
}
