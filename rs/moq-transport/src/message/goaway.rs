use crate::{
	coding::*,
	message::{Message, Version},
};

/// Sent by the server to ask the client to migrate to a new session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoAway {
	/// Where to reconnect; empty to reuse the current URI.
	pub uri: String,
}

impl Message for GoAway {
	const ID: u64 = 0x10;

	fn encode_msg<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.uri.encode(w, version);
	}

	fn decode_msg<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		Ok(Self {
			uri: String::decode(r, version)?,
		})
	}
}
