use bytes::Bytes;

use crate::{coding::*, message::Version};

const OBJECT_DATAGRAM: u64 = 0x00;
const OBJECT_STREAM: u64 = 0x02;

/// Identifies an object within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectHeader {
	pub track_id: u64,
	pub group: u64,
	pub object: u64,
	pub send_order: u64,
}

impl ObjectHeader {
	fn encode_fields<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		self.track_id.encode(w, version);
		self.group.encode(w, version);
		self.object.encode(w, version);
		self.send_order.encode(w, version);
	}

	fn decode_fields<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		Ok(Self {
			track_id: u64::decode(r, version)?,
			group: u64::decode(r, version)?,
			object: u64::decode(r, version)?,
			send_order: u64::decode(r, version)?,
		})
	}
}

/// Written at the start of each unidirectional stream; the payload runs until the stream is finished.
impl Encode<Version> for ObjectHeader {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		OBJECT_STREAM.encode(w, version);
		self.encode_fields(w, version);
	}
}

impl Decode<Version> for ObjectHeader {
	fn decode<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let kind = u64::decode(r, version)?;
		if kind != OBJECT_STREAM {
			return Err(DecodeError::InvalidMessage(kind));
		}

		Self::decode_fields(r, version)
	}
}

/// An entire object carried by a single datagram, with an explicit payload length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectDatagram {
	pub header: ObjectHeader,
	pub payload: Bytes,
}

impl Encode<Version> for ObjectDatagram {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: Version) {
		OBJECT_DATAGRAM.encode(w, version);
		self.header.encode_fields(w, version);
		self.payload.encode(w, version);
	}
}

impl Decode<Version> for ObjectDatagram {
	fn decode<R: bytes::Buf>(r: &mut R, version: Version) -> Result<Self, DecodeError> {
		let kind = u64::decode(r, version)?;
		if kind != OBJECT_DATAGRAM {
			return Err(DecodeError::InvalidMessage(kind));
		}

		let header = ObjectHeader::decode_fields(r, version)?;
		let payload = Bytes::decode(r, version)?;

		// A datagram is never split, so anything missing or left over is malformed.
		if r.has_remaining() {
			return Err(DecodeError::WrongSize);
		}

		Ok(Self { header, payload })
	}
}

impl ObjectDatagram {
	/// Decode a complete datagram, treating a truncated payload as malformed rather than short.
	pub fn decode_datagram(mut datagram: Bytes, version: Version) -> Result<Self, DecodeError> {
		Self::decode(&mut datagram, version).map_err(|err| match err {
			DecodeError::Short => DecodeError::WrongSize,
			err => err,
		})
	}
}
