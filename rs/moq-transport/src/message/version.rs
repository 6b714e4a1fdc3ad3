use std::{fmt, ops::Deref};

use crate::coding::*;

/// The ALPN used for native QUIC connections.
pub const ALPN: &str = "moq-00";

/// A protocol version negotiated during setup.
///
/// The negotiated version is bound into the control stream's reader and writer, so a new wire layout only needs a
/// new variant and the matching branches in the message codecs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
	Draft01,
}

impl Version {
	/// The versions we offer, in preference order.
	pub const SUPPORTED: [Version; 1] = [Version::Draft01];

	pub const fn code(self) -> u64 {
		match self {
			Self::Draft01 => 0xff000001,
		}
	}

	pub fn from_code(code: u64) -> Option<Self> {
		Self::SUPPORTED.into_iter().find(|v| v.code() == code)
	}
}

impl fmt::Debug for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#x}", self.code())
	}
}

/// A version code as it appears on the wire, which may not be one we understand.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionCode(pub u64);

impl From<Version> for VersionCode {
	fn from(v: Version) -> Self {
		Self(v.code())
	}
}

impl fmt::Debug for VersionCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#x}", self.0)
	}
}

impl<V> Decode<V> for VersionCode {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		Ok(Self(u64::decode(r, version)?))
	}
}

impl<V> Encode<V> for VersionCode {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.0.encode(w, version);
	}
}

/// A list of version codes in preference order.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Versions(Vec<VersionCode>);

impl Versions {
	/// The first version in our preference order that the peer also offers.
	pub fn select(&self) -> Option<Version> {
		Version::SUPPORTED
			.into_iter()
			.find(|ours| self.0.contains(&VersionCode::from(*ours)))
	}
}

impl<V: Clone> Decode<V> for Versions {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		let count = u64::decode(r, version.clone())?;
		if count > 64 {
			return Err(DecodeError::TooMany);
		}

		let mut vs = Vec::new();
		for _ in 0..count {
			vs.push(VersionCode::decode(r, version.clone())?);
		}

		Ok(Self(vs))
	}
}

impl<V: Clone> Encode<V> for Versions {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.0.len().encode(w, version.clone());

		for v in &self.0 {
			v.encode(w, version.clone());
		}
	}
}

impl Deref for Versions {
	type Target = [VersionCode];

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl From<Vec<VersionCode>> for Versions {
	fn from(vs: Vec<VersionCode>) -> Self {
		Self(vs)
	}
}

impl<const N: usize> From<[Version; N]> for Versions {
	fn from(vs: [Version; N]) -> Self {
		Self(vs.into_iter().map(VersionCode::from).collect())
	}
}

impl fmt::Debug for Versions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.0.iter()).finish()
	}
}
