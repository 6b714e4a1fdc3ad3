use std::collections::{btree_map, BTreeMap};

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::coding::*;

const MAX_PARAMS: u64 = 64;

/// Parameters with an even key carry a varint value.
#[derive(Debug, Copy, Clone, FromPrimitive, IntoPrimitive, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u64)]
pub enum ParameterVarInt {
	Role = 0,
	#[num_enum(catch_all)]
	Unknown(u64),
}

/// Parameters with an odd key carry a length-prefixed byte string.
#[derive(Debug, Copy, Clone, FromPrimitive, IntoPrimitive, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u64)]
pub enum ParameterBytes {
	Path = 1,
	AuthorizationInfo = 3,
	Implementation = 7,
	#[num_enum(catch_all)]
	Unknown(u64),
}

/// Key/value parameters carried by setup, announce and subscribe messages.
///
/// Keys are unique; a repeated key is a decode error. Unknown keys are kept so they survive a round trip.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
	vars: BTreeMap<ParameterVarInt, u64>,
	bytes: BTreeMap<ParameterBytes, Vec<u8>>,
}

impl<V: Clone> Decode<V> for Parameters {
	fn decode<R: bytes::Buf>(r: &mut R, version: V) -> Result<Self, DecodeError> {
		let mut params = Parameters::default();

		let count = u64::decode(r, version.clone())?;
		if count > MAX_PARAMS {
			return Err(DecodeError::TooMany);
		}

		for _ in 0..count {
			let kind = u64::decode(r, version.clone())?;

			if kind % 2 == 0 {
				match params.vars.entry(kind.into()) {
					btree_map::Entry::Occupied(_) => return Err(DecodeError::Duplicate),
					btree_map::Entry::Vacant(entry) => entry.insert(u64::decode(r, version.clone())?),
				};
			} else {
				match params.bytes.entry(kind.into()) {
					btree_map::Entry::Occupied(_) => return Err(DecodeError::Duplicate),
					btree_map::Entry::Vacant(entry) => entry.insert(Vec::<u8>::decode(r, version.clone())?),
				};
			}
		}

		Ok(params)
	}
}

impl<V: Clone> Encode<V> for Parameters {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		(self.vars.len() + self.bytes.len()).encode(w, version.clone());

		for (kind, value) in self.vars.iter() {
			u64::from(*kind).encode(w, version.clone());
			value.encode(w, version.clone());
		}

		for (kind, value) in self.bytes.iter() {
			u64::from(*kind).encode(w, version.clone());
			value.encode(w, version.clone());
		}
	}
}

impl Parameters {
	pub fn get_varint(&self, kind: ParameterVarInt) -> Option<u64> {
		self.vars.get(&kind).copied()
	}

	pub fn set_varint(&mut self, kind: ParameterVarInt, value: u64) {
		self.vars.insert(kind, value);
	}

	pub fn get_bytes(&self, kind: ParameterBytes) -> Option<&[u8]> {
		self.bytes.get(&kind).map(|v| v.as_slice())
	}

	pub fn set_bytes(&mut self, kind: ParameterBytes, value: impl Into<Vec<u8>>) {
		self.bytes.insert(kind, value.into());
	}

	pub fn is_empty(&self) -> bool {
		self.vars.is_empty() && self.bytes.is_empty()
	}
}
