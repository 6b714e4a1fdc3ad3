use std::{cmp, fmt::Debug, io};

use bytes::{Buf, Bytes, BytesMut};

use crate::{coding::*, transport::RecvStream, Error};

/// A buffered reader for decoding messages from a stream.
///
/// Short reads are absorbed: decoding retries with more data until the value is complete.
pub struct Reader<S: RecvStream, V> {
	stream: S,
	buffer: BytesMut,
	version: V,
}

impl<S: RecvStream, V> Reader<S, V> {
	pub fn new(stream: S, version: V) -> Self {
		Self {
			stream,
			buffer: Default::default(),
			version,
		}
	}

	/// Decode the next value from the stream.
	pub async fn decode<T: Decode<V> + Debug>(&mut self) -> Result<T, Error>
	where
		V: Clone,
	{
		loop {
			let mut cursor = io::Cursor::new(&self.buffer);
			match T::decode(&mut cursor, self.version.clone()) {
				Ok(msg) => {
					self.buffer.advance(cursor.position() as usize);
					return Ok(msg);
				}
				Err(DecodeError::Short) => {
					if self.stream.read_buf(&mut self.buffer).await?.is_none() {
						// Stream finished while we still need more data
						return Err(Error::Decode(DecodeError::Short));
					}
				}
				Err(e) => return Err(Error::Decode(e)),
			}
		}
	}

	/// Decode the next value unless the stream is finished.
	pub async fn decode_maybe<T: Decode<V> + Debug>(&mut self) -> Result<Option<T>, Error>
	where
		V: Clone,
	{
		match self.closed().await {
			Ok(()) => Ok(None),
			Err(Error::Decode(DecodeError::ExpectedEnd)) => Ok(Some(self.decode().await?)),
			Err(e) => Err(e),
		}
	}

	/// Returns a non-empty chunk of at most `max` bytes, or None if the stream is finished.
	pub async fn read(&mut self, max: usize) -> Result<Option<Bytes>, Error> {
		if !self.buffer.is_empty() {
			let size = cmp::min(max, self.buffer.len());
			let data = self.buffer.split_to(size).freeze();
			return Ok(Some(data));
		}

		self.stream.read_chunk(max).await
	}

	/// Wait until the stream is finished, erroring if there are any additional bytes.
	pub async fn closed(&mut self) -> Result<(), Error> {
		if self.buffer.is_empty() && self.stream.read_buf(&mut self.buffer).await?.is_none() {
			return Ok(());
		}

		Err(DecodeError::ExpectedEnd.into())
	}

	/// Ask the peer to stop sending, using the code for the given error.
	pub fn abort(&mut self, err: &Error) {
		self.stream.stop(err.to_code());
	}

	/// Cast the reader to a different version, used during version negotiation.
	pub fn with_version<O>(self, version: O) -> Reader<S, O> {
		Reader {
			stream: self.stream,
			buffer: self.buffer,
			version,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::{mem, Connection, SendStream};

	#[tokio::test]
	async fn decode_across_partial_writes() {
		let (a, b) = mem::pair();
		let mut send = a.open_uni().await.unwrap();
		let recv = b.accept_uni().await.unwrap();
		let mut reader = Reader::new(recv, ());

		// A four byte varint, split over two writes, followed by a string.
		send.write_buf(&mut &[0x80u8, 0x01][..]).await.unwrap();
		send.write_buf(&mut &[0x00u8, 0x00, 0x02, b'h'][..]).await.unwrap();
		send.write_buf(&mut &[b'i'][..]).await.unwrap();
		send.finish().unwrap();

		let v: u64 = reader.decode().await.unwrap();
		assert_eq!(v, 0x0001_0000);

		let s: String = reader.decode().await.unwrap();
		assert_eq!(s, "hi");

		assert!(reader.decode_maybe::<u64>().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn truncated_stream() {
		let (a, b) = mem::pair();
		let mut send = a.open_uni().await.unwrap();
		let recv = b.accept_uni().await.unwrap();
		let mut reader = Reader::new(recv, ());

		send.write_buf(&mut &[0x80u8, 0x01][..]).await.unwrap();
		send.finish().unwrap();

		let err = reader.decode::<u64>().await.unwrap_err();
		assert!(matches!(err, Error::Decode(DecodeError::Short)));
	}

	#[tokio::test]
	async fn read_drains_buffer_first() {
		let (a, b) = mem::pair();
		let mut send = a.open_uni().await.unwrap();
		let recv = b.accept_uni().await.unwrap();
		let mut reader = Reader::new(recv, ());

		send.write_buf(&mut &[0x05u8, 1, 2, 3][..]).await.unwrap();
		send.finish().unwrap();

		let v: u8 = reader.decode().await.unwrap();
		assert_eq!(v, 5);

		let chunk = reader.read(2).await.unwrap().unwrap();
		assert_eq!(&chunk[..], &[1, 2]);
		let chunk = reader.read(1024).await.unwrap().unwrap();
		assert_eq!(&chunk[..], &[3]);
		assert!(reader.read(1024).await.unwrap().is_none());
	}
}
