use std::fmt::Debug;

use crate::{coding::*, transport::SendStream, Error};

/// A wrapper around a [SendStream] that will reset on Drop.
pub struct Writer<S: SendStream, V> {
	stream: Option<S>,
	buffer: bytes::BytesMut,
	version: V,
}

impl<S: SendStream, V> Writer<S, V> {
	/// Create a new writer for the given stream and version.
	pub fn new(stream: S, version: V) -> Self {
		Self {
			stream: Some(stream),
			buffer: Default::default(),
			version,
		}
	}

	fn stream(&mut self) -> Result<&mut S, Error> {
		self.stream.as_mut().ok_or(Error::Closed)
	}

	/// Encode the given message to the stream.
	pub async fn encode<T: Encode<V> + Debug>(&mut self, msg: &T) -> Result<(), Error>
	where
		V: Clone,
	{
		self.buffer.clear();
		msg.encode(&mut self.buffer, self.version.clone());

		let mut buffer = std::mem::take(&mut self.buffer);
		let res = self.write_all(&mut buffer).await;
		self.buffer = buffer;
		res
	}

	/// Write the entire [bytes::Buf] to the stream.
	///
	/// NOTE: This can avoid performing a copy when using [bytes::Bytes].
	pub async fn write_all<Buf: bytes::Buf + Send>(&mut self, buf: &mut Buf) -> Result<(), Error> {
		while buf.has_remaining() {
			self.stream()?.write_buf(buf).await?;
		}
		Ok(())
	}

	/// Mark the stream as finished.
	pub fn finish(&mut self) -> Result<(), Error> {
		self.stream.take().ok_or(Error::Closed)?.finish()
	}

	/// Abort the stream with the code for the given error.
	pub fn abort(&mut self, err: &Error) {
		self.reset(err.to_code());
	}

	/// Abort the stream with an application error code.
	pub fn reset(&mut self, code: u32) {
		if let Some(mut stream) = self.stream.take() {
			stream.reset(code);
		}
	}

	/// Cast the writer to a different version, used during version negotiation.
	pub fn with_version<O>(mut self, version: O) -> Writer<S, O> {
		Writer {
			// We need to use an Option so Drop doesn't reset the stream.
			stream: self.stream.take(),
			buffer: std::mem::take(&mut self.buffer),
			version,
		}
	}
}

impl<S: SendStream, V> Drop for Writer<S, V> {
	fn drop(&mut self) {
		if let Some(mut stream) = self.stream.take() {
			// Unlike the Quinn default, we abort the stream on drop.
			stream.reset(Error::Cancel.to_code());
		}
	}
}
