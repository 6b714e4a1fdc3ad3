//! The connection capability set the session engine is written against.
//!
//! A backend provides unidirectional and bidirectional streams, unreliable datagrams, and an abrupt close.
//! [WebTransport] adapts any [web_transport_trait::Session]; native QUIC lives in `moq-transport-native`.

mod webtransport;

#[cfg(test)]
pub(crate) mod mem;

pub use webtransport::*;

use std::future::Future;

use bytes::{Buf, BufMut, Bytes};

use crate::Error;

/// A QUIC-like connection.
///
/// Every operation fails with [Error::Transport] once the connection is closed by either side.
/// Blocking operations are cancelled by dropping the returned future.
pub trait Connection: Clone + Send + Sync + 'static {
	type SendStream: SendStream;
	type RecvStream: RecvStream;

	/// Open a new unidirectional stream.
	fn open_uni(&self) -> impl Future<Output = Result<Self::SendStream, Error>> + Send;

	/// Accept the next unidirectional stream opened by the peer, in the order they were opened.
	fn accept_uni(&self) -> impl Future<Output = Result<Self::RecvStream, Error>> + Send;

	/// Open a new bidirectional stream.
	fn open_bi(&self) -> impl Future<Output = Result<(Self::SendStream, Self::RecvStream), Error>> + Send;

	/// Accept the next bidirectional stream opened by the peer.
	fn accept_bi(&self) -> impl Future<Output = Result<(Self::SendStream, Self::RecvStream), Error>> + Send;

	/// Send an unreliable datagram.
	fn send_datagram(&self, payload: Bytes) -> Result<(), Error>;

	/// Receive the next unreliable datagram.
	fn recv_datagram(&self) -> impl Future<Output = Result<Bytes, Error>> + Send;

	/// Close the connection immediately with an application error code.
	fn close(&self, code: u32, reason: &str);
}

/// The sending half of a stream.
pub trait SendStream: Send + 'static {
	/// Write some of the buffer, advancing it by the number of bytes written.
	fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> impl Future<Output = Result<usize, Error>> + Send;

	/// Gracefully finish the stream; the peer reads the remaining data and then end-of-stream.
	fn finish(&mut self) -> Result<(), Error>;

	/// Abruptly terminate the stream; the peer's read fails with [Error::Reset].
	fn reset(&mut self, code: u32);
}

/// The receiving half of a stream.
pub trait RecvStream: Send + 'static {
	/// Read into the buffer, returning `None` once the stream is finished.
	fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B)
		-> impl Future<Output = Result<Option<usize>, Error>> + Send;

	/// Read a non-empty chunk of at most `max` bytes, returning `None` once the stream is finished.
	fn read_chunk(&mut self, max: usize) -> impl Future<Output = Result<Option<Bytes>, Error>> + Send;

	/// Ask the peer to stop sending.
	fn stop(&mut self, code: u32);
}
