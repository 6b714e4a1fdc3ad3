use crate::{
	coding::*,
	message::{Message, ParameterBytes, Parameters, Version},
};

/// Sent by the publisher to offer a namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announce {
	pub namespace: String,
	pub auth: Option<Vec<u8>>,
}

impl Message for Announce {
	const ID: u64 = 0x06;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.namespace.encode(w, version);

		let mut params = Parameters::default();
		if let Some(auth) = &self.auth {
			params.set_bytes(ParameterBytes::AuthorizationInfo, auth.clone());
		}
		params.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let namespace = String::decode(r, version)?;
		let params = Parameters::decode(r, version)?;

		Ok(Self {
			namespace,
			auth: params.get_bytes(ParameterBytes::AuthorizationInfo).map(<[u8]>::to_vec),
		})
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnounceOk {
	pub namespace: String,
}

impl Message for AnnounceOk {
	const ID: u64 = 0x07;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.namespace.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		Ok(Self {
			namespace: String::decode(r, version)?,
		})
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnounceError {
	pub namespace: String,
	pub code: u64,
	pub reason: String,
}

impl Message for AnnounceError {
	const ID: u64 = 0x08;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.namespace.encode(w, version);
		self.code.encode(w, version);
		self.reason.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let namespace = String::decode(r, version)?;
		let code = u64::decode(r, version)?;
		let reason = String::decode(r, version)?;

		Ok(Self {
			namespace,
			code,
			reason,
		})
	}
}

/// Sent by the publisher to withdraw a namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unannounce {
	pub namespace: String,
}

impl Message for Unannounce {
	const ID: u64 = 0x09;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.namespace.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		Ok(Self {
			namespace: String::decode(r, version)?,
		})
	}
}
