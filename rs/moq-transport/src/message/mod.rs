//! The control vocabulary and the data-stream object headers.

mod announce;
mod goaway;
mod object;
mod parameters;
mod setup;
mod subscribe;
mod version;

pub use announce::*;
pub use goaway::*;
pub use object::*;
pub use parameters::*;
pub use setup::*;
pub use subscribe::*;
pub use version::*;

use std::fmt::Debug;

use bytes::{Buf, BufMut, BytesMut};

use crate::coding::*;

/// The largest control message payload we are willing to buffer.
pub const MAX_MESSAGE_SIZE: usize = 65_535;

/// A control message with a fixed type tag.
pub trait Message: Sized + Debug {
	const ID: u64;

	/// Encode the payload, without the type and length prefix.
	fn encode_msg<W: BufMut>(&self, w: &mut W, version: Version);

	/// Decode the payload, without the type and length prefix.
	fn decode_msg<R: Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError>;
}

// Generates the tagged union over every control message.
// Each message is framed as a varint type, a varint payload length, and the payload.
macro_rules! control_messages {
	{$($name:ident,)*} => {
		/// Any message sent on the control stream.
		#[derive(Clone, Debug, PartialEq, Eq)]
		pub enum Control {
			$($name($name)),*
		}

		impl Control {
			pub fn id(&self) -> u64 {
				match self {
					$(Self::$name(_) => $name::ID,)*
				}
			}

			fn is_known(id: u64) -> bool {
				matches!(id, $($name::ID)|*)
			}

			fn decode_payload<R: Buf>(id: u64, r: &mut R, version: Version) -> Result<Self, DecodeError> {
				Ok(match id {
					$($name::ID => Self::$name($name::decode_msg(r, version)?),)*
					_ => return Err(DecodeError::InvalidMessage(id)),
				})
			}

			fn encode_payload<W: BufMut>(&self, w: &mut W, version: Version) {
				match self {
					$(Self::$name(m) => m.encode_msg(w, version),)*
				}
			}
		}

		$(impl From<$name> for Control {
			fn from(m: $name) -> Self {
				Self::$name(m)
			}
		})*
	}
}

control_messages! {
	ClientSetup,
	ServerSetup,
	Subscribe,
	SubscribeOk,
	SubscribeError,
	Announce,
	AnnounceOk,
	AnnounceError,
	Unannounce,
	Unsubscribe,
	SubscribeDone,
	GoAway,
}

impl Decode<Version> for Control {
	fn decode<R: Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let id = u64::decode(r, version)?;
		if !Self::is_known(id) {
			return Err(DecodeError::InvalidMessage(id));
		}

		let size = usize::decode(r, version)?;
		if size > MAX_MESSAGE_SIZE {
			return Err(DecodeError::TooLarge(size));
		}

		if r.remaining() < size {
			return Err(DecodeError::Short);
		}

		let mut payload = r.copy_to_bytes(size);

		// The payload is complete, so running out of bytes means the length was wrong.
		let msg = Self::decode_payload(id, &mut payload, version).map_err(|err| match err {
			DecodeError::Short => DecodeError::WrongSize,
			err => err,
		})?;

		if payload.has_remaining() {
			return Err(DecodeError::WrongSize);
		}

		Ok(msg)
	}
}

impl Encode<Version> for Control {
	fn encode<W: BufMut>(&self, w: &mut W, version: Version) {
		let mut payload = BytesMut::new();
		self.encode_payload(&mut payload, version);

		self.id().encode(w, version);
		payload.len().encode(w, version);
		w.put(payload);
	}
}
