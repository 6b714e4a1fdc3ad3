use bytes::{Buf, BufMut, Bytes};
use moq_transport::{
	Error, WebTransport,
	transport::{self, Connection as _, RecvStream as _, SendStream as _},
};

use crate::{QuicConnection, QuicRecv, QuicSend};

type WebTransportConnection = WebTransport<web_transport_quinn::Session>;
type WebTransportSend = <WebTransportConnection as transport::Connection>::SendStream;
type WebTransportRecv = <WebTransportConnection as transport::Connection>::RecvStream;

/// Either backend, chosen when the session is dialed or accepted.
#[derive(Clone)]
pub enum Connection {
	Quic(QuicConnection),
	WebTransport(WebTransportConnection),
}

impl Connection {
	/// The backend name, for logging.
	pub fn transport(&self) -> &'static str {
		match self {
			Self::Quic(_) => "quic",
			Self::WebTransport(_) => "webtransport",
		}
	}
}

impl From<QuicConnection> for Connection {
	fn from(conn: QuicConnection) -> Self {
		Self::Quic(conn)
	}
}

impl From<web_transport_quinn::Session> for Connection {
	fn from(session: web_transport_quinn::Session) -> Self {
		Self::WebTransport(WebTransport::new(session))
	}
}

impl transport::Connection for Connection {
	type SendStream = SendStream;
	type RecvStream = RecvStream;

	async fn open_uni(&self) -> Result<SendStream, Error> {
		Ok(match self {
			Self::Quic(conn) => SendStream::Quic(conn.open_uni().await?),
			Self::WebTransport(conn) => SendStream::WebTransport(conn.open_uni().await?),
		})
	}

	async fn accept_uni(&self) -> Result<RecvStream, Error> {
		Ok(match self {
			Self::Quic(conn) => RecvStream::Quic(conn.accept_uni().await?),
			Self::WebTransport(conn) => RecvStream::WebTransport(conn.accept_uni().await?),
		})
	}

	async fn open_bi(&self) -> Result<(SendStream, RecvStream), Error> {
		Ok(match self {
			Self::Quic(conn) => {
				let (send, recv) = conn.open_bi().await?;
				(SendStream::Quic(send), RecvStream::Quic(recv))
			}
			Self::WebTransport(conn) => {
				let (send, recv) = conn.open_bi().await?;
				(SendStream::WebTransport(send), RecvStream::WebTransport(recv))
			}
		})
	}

	async fn accept_bi(&self) -> Result<(SendStream, RecvStream), Error> {
		Ok(match self {
			Self::Quic(conn) => {
				let (send, recv) = conn.accept_bi().await?;
				(SendStream::Quic(send), RecvStream::Quic(recv))
			}
			Self::WebTransport(conn) => {
				let (send, recv) = conn.accept_bi().await?;
				(SendStream::WebTransport(send), RecvStream::WebTransport(recv))
			}
		})
	}

	fn send_datagram(&self, payload: Bytes) -> Result<(), Error> {
		match self {
			Self::Quic(conn) => conn.send_datagram(payload),
			Self::WebTransport(conn) => conn.send_datagram(payload),
		}
	}

	async fn recv_datagram(&self) -> Result<Bytes, Error> {
		match self {
			Self::Quic(conn) => conn.recv_datagram().await,
			Self::WebTransport(conn) => conn.recv_datagram().await,
		}
	}

	fn close(&self, code: u32, reason: &str) {
		match self {
			Self::Quic(conn) => conn.close(code, reason),
			Self::WebTransport(conn) => conn.close(code, reason),
		}
	}
}

pub enum SendStream {
	Quic(QuicSend),
	WebTransport(WebTransportSend),
}

impl transport::SendStream for SendStream {
	async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<usize, Error> {
		match self {
			Self::Quic(send) => send.write_buf(buf).await,
			Self::WebTransport(send) => send.write_buf(buf).await,
		}
	}

	fn finish(&mut self) -> Result<(), Error> {
		match self {
			Self::Quic(send) => send.finish(),
			Self::WebTransport(send) => send.finish(),
		}
	}

	fn reset(&mut self, code: u32) {
		match self {
			Self::Quic(send) => send.reset(code),
			Self::WebTransport(send) => send.reset(code),
		}
	}
}

pub enum RecvStream {
	Quic(QuicRecv),
	WebTransport(WebTransportRecv),
}

impl transport::RecvStream for RecvStream {
	async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> Result<Option<usize>, Error> {
		match self {
			Self::Quic(recv) => recv.read_buf(buf).await,
			Self::WebTransport(recv) => recv.read_buf(buf).await,
		}
	}

	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, Error> {
		match self {
			Self::Quic(recv) => recv.read_chunk(max).await,
			Self::WebTransport(recv) => recv.read_chunk(max).await,
		}
	}

	fn stop(&mut self, code: u32) {
		match self {
			Self::Quic(recv) => recv.stop(code),
			Self::WebTransport(recv) => recv.stop(code),
		}
	}
}
