use bytes::{Bytes, BytesMut};

/// A value written to the wire, laid out according to the negotiated version.
pub trait Encode<V>: Sized {
	/// Encode the value to the given writer.
	///
	/// This will panic if the [bytes::BufMut] does not have enough capacity.
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V);

	/// Encode the value into a [Bytes] buffer.
	///
	/// NOTE: This will allocate.
	fn encode_bytes(&self, v: V) -> Bytes {
		let mut buf = BytesMut::new();
		self.encode(&mut buf, v);
		buf.freeze()
	}
}

impl<V> Encode<V> for u8 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, _: V) {
		w.put_u8(*self);
	}
}

impl<V> Encode<V> for String {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		self.as_str().encode(w, version)
	}
}

impl<V> Encode<V> for &str {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		prefixed(self.as_bytes(), w, version)
	}
}

impl<V> Encode<V> for Vec<u8> {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		prefixed(self, w, version)
	}
}

impl<V> Encode<V> for Bytes {
	fn encode<W: bytes::BufMut>(&self, w: &mut W, version: V) {
		prefixed(self, w, version)
	}
}

// Strings and byte fields share the same layout: a varint length, then the bytes.
fn prefixed<W: bytes::BufMut, V>(data: &[u8], w: &mut W, version: V) {
	data.len().encode(w, version);
	w.put_slice(data);
}
