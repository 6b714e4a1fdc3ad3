use crate::{
	coding::*,
	message::{Message, ParameterBytes, Parameters, Version},
};

/// Sent by the subscriber to request a track.
///
/// The id is allocated by the subscriber and identifies the request for its whole lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscribe {
	pub id: u64,
	pub namespace: String,
	pub name: String,
	pub auth: Option<Vec<u8>>,
}

impl Message for Subscribe {
	const ID: u64 = 0x03;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.id.encode(w, version);
		self.namespace.encode(w, version);
		self.name.encode(w, version);

		let mut params = Parameters::default();
		if let Some(auth) = &self.auth {
			params.set_bytes(ParameterBytes::AuthorizationInfo, auth.clone());
		}
		params.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let id = u64::decode(r, version)?;
		let namespace = String::decode(r, version)?;
		let name = String::decode(r, version)?;
		let params = Parameters::decode(r, version)?;

		Ok(Self {
			id,
			namespace,
			name,
			auth: params.get_bytes(ParameterBytes::AuthorizationInfo).map(<[u8]>::to_vec),
		})
	}
}

/// Sent by the publisher to accept a [Subscribe].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeOk {
	pub id: u64,

	/// The track id carried by every object of this subscription.
	/// Usually equal to the request id, but the publisher may choose another.
	pub track_id: u64,

	/// Milliseconds until the subscription expires, or 0 for never.
	pub expires: u64,
}

impl Message for SubscribeOk {
	const ID: u64 = 0x04;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.id.encode(w, version);
		self.track_id.encode(w, version);
		self.expires.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let id = u64::decode(r, version)?;
		let track_id = u64::decode(r, version)?;
		let expires = u64::decode(r, version)?;

		Ok(Self { id, track_id, expires })
	}
}

/// Sent by the publisher to reject a [Subscribe].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeError {
	pub id: u64,
	pub code: u64,
	pub reason: String,
}

impl Message for SubscribeError {
	const ID: u64 = 0x05;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.id.encode(w, version);
		self.code.encode(w, version);
		self.reason.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let id = u64::decode(r, version)?;
		let code = u64::decode(r, version)?;
		let reason = String::decode(r, version)?;

		Ok(Self { id, code, reason })
	}
}

/// Sent by the subscriber to cancel a subscription, pending or accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unsubscribe {
	pub id: u64,
}

impl Message for Unsubscribe {
	const ID: u64 = 0x0a;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.id.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		Ok(Self {
			id: u64::decode(r, version)?,
		})
	}
}

/// Sent by the publisher once no more objects will be sent for an accepted subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeDone {
	pub id: u64,

	/// Zero when the track ended normally.
	pub code: u64,
	pub reason: String,
}

impl Message for SubscribeDone {
	const ID: u64 = 0x0b;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.id.encode(w, version);
		self.code.encode(w, version);
		self.reason.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let id = u64::decode(r, version)?;
		let code = u64::decode(r, version)?;
		let reason = String::decode(r, version)?;

		Ok(Self { id, code, reason })
	}
}
