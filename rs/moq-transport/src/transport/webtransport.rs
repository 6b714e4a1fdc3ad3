use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes};

use crate::{
	transport::{Connection, RecvStream, SendStream},
	Error,
};

fn transport<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
	Error::Transport(Arc::new(err))
}

/// A [Connection] tunneled over a WebTransport session.
#[derive(Clone)]
pub struct WebTransport<S: web_transport_trait::Session>(S);

impl<S: web_transport_trait::Session> WebTransport<S> {
	pub fn new(session: S) -> Self {
		Self(session)
	}

	pub fn inner(&self) -> &S {
		&self.0
	}
}

impl<S> Connection for WebTransport<S>
where
	S: web_transport_trait::Session,
	S::SendStream: Send + 'static,
	S::RecvStream: Send + 'static,
{
	type SendStream = WebTransportSend<S::SendStream>;
	type RecvStream = WebTransportRecv<S::RecvStream>;

	async fn open_uni(&self) -> Result<Self::SendStream, Error> {
		let send = self.0.open_uni().await.map_err(transport)?;
		Ok(WebTransportSend(send))
	}

	async fn accept_uni(&self) -> Result<Self::RecvStream, Error> {
		let recv = self.0.accept_uni().await.map_err(transport)?;
		Ok(WebTransportRecv(recv))
	}

	async fn open_bi(&self) -> Result<(Self::SendStream, Self::RecvStream), Error> {
		let (send, recv) = self.0.open_bi().await.map_err(transport)?;
		Ok((WebTransportSend(send), WebTransportRecv(recv)))
	}

	async fn accept_bi(&self) -> Result<(Self::SendStream, Self::RecvStream), Error> {
		let (send, recv) = self.0.accept_bi().await.map_err(transport)?;
		Ok((WebTransportSend(send), WebTransportRecv(recv)))
	}

	fn send_datagram(&self, payload: Bytes) -> Result<(), Error> {
		self.0.send_datagram(payload).map_err(transport)
	}

	async fn recv_datagram(&self) -> Result<Bytes, Error> {
		self.0.recv_datagram().await.map_err(transport)
	}

	fn close(&self, code: u32, reason: &str) {
		self.0.close(code, reason);
	}
}

/// The sending half of a WebTransport stream.
pub struct WebTransportSend<S>(S);

impl<S: web_transport_trait::SendStream + Send + 'static> SendStream for WebTransportSend<S> {
	async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<usize, Error> {
		self.0.write_buf(buf).await.map_err(transport)
	}

	fn finish(&mut self) -> Result<(), Error> {
		self.0.finish().map_err(transport)
	}

	fn reset(&mut self, code: u32) {
		self.0.reset(code);
	}
}

/// The receiving half of a WebTransport stream.
pub struct WebTransportRecv<S>(S);

impl<S: web_transport_trait::RecvStream + Send + 'static> RecvStream for WebTransportRecv<S> {
	async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> Result<Option<usize>, Error> {
		self.0.read_buf(buf).await.map_err(transport)
	}

	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, Error> {
		self.0.read_chunk(max).await.map_err(transport)
	}

	fn stop(&mut self, code: u32) {
		self.0.stop(code);
	}
}
