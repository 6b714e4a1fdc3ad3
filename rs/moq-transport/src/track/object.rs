use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::{mpsc, watch};

use crate::{
	coding::Writer,
	message::{ObjectHeader, Version},
	stats::Stats,
	transport::SendStream,
	Error,
};

/// The payload of a single received object, read in order.
pub struct ObjectReader {
	header: ObjectHeader,
	chunks: mpsc::Receiver<Result<Bytes, Error>>,
	buffered: Bytes,
}

impl ObjectReader {
	pub(crate) fn new(header: ObjectHeader, chunks: mpsc::Receiver<Result<Bytes, Error>>) -> Self {
		Self {
			header,
			chunks,
			buffered: Bytes::new(),
		}
	}

	pub fn header(&self) -> &ObjectHeader {
		&self.header
	}

	/// Return the next non-empty chunk of the payload, or None at the end of the object.
	///
	/// Fails with [Error::Reset] if the sender abandoned the object.
	pub async fn read_chunk(&mut self) -> Result<Option<Bytes>, Error> {
		if !self.buffered.is_empty() {
			return Ok(Some(std::mem::take(&mut self.buffered)));
		}

		loop {
			match self.chunks.recv().await {
				Some(Ok(chunk)) if chunk.is_empty() => continue,
				Some(Ok(chunk)) => return Ok(Some(chunk)),
				Some(Err(err)) => return Err(err),
				None => return Ok(None),
			}
		}
	}

	/// Copy payload bytes into `buf`, returning 0 at the end of the object.
	pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
		if buf.is_empty() {
			return Ok(0);
		}

		let Some(mut chunk) = self.read_chunk().await? else {
			return Ok(0);
		};

		let size = buf.len().min(chunk.len());
		buf[..size].copy_from_slice(&chunk[..size]);
		chunk.advance(size);
		self.buffered = chunk;

		Ok(size)
	}

	/// Read the rest of the payload.
	pub async fn read_all(&mut self) -> Result<Bytes, Error> {
		let mut payload = BytesMut::new();
		while let Some(chunk) = self.read_chunk().await? {
			payload.extend_from_slice(&chunk);
		}

		Ok(payload.freeze())
	}
}

/// Writes the payload of a single object to its own stream.
///
/// Dropping without [Self::finish] resets the stream.
pub struct ObjectWriter<S: SendStream> {
	writer: Writer<S, Version>,
	header: ObjectHeader,

	// Only cancellable objects are abandoned when the track ends.
	ended: Option<watch::Receiver<Option<Error>>>,
	stats: Option<Arc<dyn Stats>>,
}

impl<S: SendStream> ObjectWriter<S> {
	pub(crate) fn new(
		writer: Writer<S, Version>,
		header: ObjectHeader,
		ended: Option<watch::Receiver<Option<Error>>>,
		stats: Option<Arc<dyn Stats>>,
	) -> Self {
		Self {
			writer,
			header,
			ended,
			stats,
		}
	}

	pub fn header(&self) -> &ObjectHeader {
		&self.header
	}

	pub fn is_cancellable(&self) -> bool {
		self.ended.is_some()
	}

	/// Write the entire buffer.
	pub async fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
		self.write_buf(&mut &buf[..]).await
	}

	/// Write the entire chunk without copying it.
	pub async fn write_chunk(&mut self, mut chunk: Bytes) -> Result<(), Error> {
		self.write_buf(&mut chunk).await
	}

	async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<(), Error> {
		let size = buf.remaining();

		let res = match &mut self.ended {
			Some(ended) => tokio::select! {
				res = self.writer.write_all(buf) => res,
				err = wait_ended(ended) => Err(err),
			},
			None => self.writer.write_all(buf).await,
		};

		match &res {
			Ok(()) => {
				if let Some(stats) = &self.stats {
					stats.add_tx_bytes(size as u64);
				}
			}
			Err(err) => {
				tracing::debug!(header = ?self.header, %err, "abandoning object");
				self.writer.abort(err);
			}
		}

		res
	}

	/// Mark the end of the object.
	pub fn finish(mut self) -> Result<(), Error> {
		self.writer.finish()
	}

	/// Abandon the object; the receiver's read fails with [Error::Reset] carrying `code`.
	pub fn reset(mut self, code: u32) {
		self.writer.reset(code);
	}
}

// Resolves once the track has ended, immediately if it already has.
pub(crate) async fn wait_ended(ended: &mut watch::Receiver<Option<Error>>) -> Error {
	loop {
		if let Some(err) = ended.borrow_and_update().clone() {
			return err;
		}

		if ended.changed().await.is_err() {
			return Error::Closed;
		}
	}
}
