use std::fmt;

use thiserror::Error;

use crate::coding::{Decode, DecodeError, Encode};

/// The value does not fit in the target integer type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("value out of range")]
pub struct BoundsExceeded;

/// An integer less than 2^62, encoded with the QUIC variable-length scheme.
///
/// The two most significant bits of the first byte select a 1, 2, 4 or 8 byte encoding.
#[derive(Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarInt(u64);

impl VarInt {
	pub const MAX: Self = Self((1 << 62) - 1);
	pub const ZERO: Self = Self(0);

	pub const fn from_u32(x: u32) -> Self {
		Self(x as u64)
	}

	pub const fn from_u64(x: u64) -> Option<Self> {
		if x <= Self::MAX.0 {
			Some(Self(x))
		} else {
			None
		}
	}

	pub const fn into_inner(self) -> u64 {
		self.0
	}

	/// The number of bytes this value occupies on the wire.
	pub const fn size(self) -> usize {
		match self.0 {
			0..=0x3f => 1,
			0x40..=0x3fff => 2,
			0x4000..=0x3fff_ffff => 4,
			_ => 8,
		}
	}
}

impl From<u8> for VarInt {
	fn from(x: u8) -> Self {
		Self(x.into())
	}
}

impl From<u16> for VarInt {
	fn from(x: u16) -> Self {
		Self(x.into())
	}
}

impl From<u32> for VarInt {
	fn from(x: u32) -> Self {
		Self(x.into())
	}
}

impl TryFrom<u64> for VarInt {
	type Error = BoundsExceeded;

	fn try_from(x: u64) -> Result<Self, BoundsExceeded> {
		Self::from_u64(x).ok_or(BoundsExceeded)
	}
}

impl TryFrom<usize> for VarInt {
	type Error = BoundsExceeded;

	fn try_from(x: usize) -> Result<Self, BoundsExceeded> {
		Self::try_from(x as u64)
	}
}

impl From<VarInt> for u64 {
	fn from(x: VarInt) -> Self {
		x.0
	}
}

impl TryFrom<VarInt> for usize {
	type Error = BoundsExceeded;

	fn try_from(x: VarInt) -> Result<Self, BoundsExceeded> {
		usize::try_from(x.0).map_err(|_| BoundsExceeded)
	}
}

impl TryFrom<VarInt> for u32 {
	type Error = BoundsExceeded;

	fn try_from(x: VarInt) -> Result<Self, BoundsExceeded> {
		u32::try_from(x.0).map_err(|_| BoundsExceeded)
	}
}

impl fmt::Debug for VarInt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl fmt::Display for VarInt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl<V> Decode<V> for VarInt {
	fn decode<R: bytes::Buf>(r: &mut R, _: V) -> Result<Self, DecodeError> {
		if !r.has_remaining() {
			return Err(DecodeError::Short);
		}

		let size = 1usize << (r.chunk()[0] >> 6);
		if r.remaining() < size {
			return Err(DecodeError::Short);
		}

		let mut buf = [0u8; 8];
		r.copy_to_slice(&mut buf[8 - size..]);
		buf[8 - size] &= 0b0011_1111;

		Ok(Self(u64::from_be_bytes(buf)))
	}
}

impl<V> Encode<V> for VarInt {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, _: V) {
		let x = self.0;
		match self.size() {
			1 => w.put_u8(x as u8),
			2 => w.put_u16(0b01 << 14 | x as u16),
			4 => w.put_u32(0b10 << 30 | x as u32),
			_ => w.put_u64(0b11 << 62 | x),
		}
	}
}

impl<V> Decode<V> for u64 {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		VarInt::decode(r, version).map(u64::from)
	}
}

impl<V> Encode<V> for u64 {
	/// Panics if the value is 2^62 or larger; callers only encode ids and lengths well below that.
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		let v = VarInt::try_from(*self).expect("varint out of range");
		v.encode(w, version)
	}
}

impl<V> Decode<V> for usize {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		let v = VarInt::decode(r, version)?;
		usize::try_from(v).map_err(|_| DecodeError::BoundsExceeded)
	}
}

impl<V> Encode<V> for usize {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		(*self as u64).encode(w, version)
	}
}

impl<V> Decode<V> for u32 {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		let v = VarInt::decode(r, version)?;
		u32::try_from(v).map_err(|_| DecodeError::BoundsExceeded)
	}
}

impl<V> Encode<V> for u32 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		VarInt::from(*self).encode(w, version)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;

	fn encode(v: u64) -> Vec<u8> {
		let mut buf = Vec::new();
		v.encode(&mut buf, ());
		buf
	}

	#[test]
	fn boundaries() {
		assert_eq!(encode(0), [0x00]);
		assert_eq!(encode(63), [0x3f]);
		assert_eq!(encode(64), [0x40, 0x40]);
		assert_eq!(encode(16383), [0x7f, 0xff]);
		assert_eq!(encode(16384), [0x80, 0x00, 0x40, 0x00]);
		assert_eq!(encode(VarInt::MAX.into_inner()).len(), 8);
	}

	#[test]
	fn rfc9000_samples() {
		let mut buf = Bytes::from_static(&[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c]);
		assert_eq!(u64::decode(&mut buf, ()).unwrap(), 151_288_809_941_952_652);

		let mut buf = Bytes::from_static(&[0x9d, 0x7f, 0x3e, 0x7d]);
		assert_eq!(u64::decode(&mut buf, ()).unwrap(), 494_878_333);

		let mut buf = Bytes::from_static(&[0x7b, 0xbd]);
		assert_eq!(u64::decode(&mut buf, ()).unwrap(), 15_293);
	}

	#[test]
	fn short() {
		let mut buf = Bytes::from_static(&[0x80, 0x00]);
		assert!(matches!(u64::decode(&mut buf, ()), Err(DecodeError::Short)));

		let mut buf = Bytes::new();
		assert!(matches!(u64::decode(&mut buf, ()), Err(DecodeError::Short)));
	}

	#[test]
	fn out_of_range() {
		assert_eq!(VarInt::try_from(1u64 << 62), Err(BoundsExceeded));
		assert!(VarInt::from_u64(u64::MAX).is_none());
	}
}
