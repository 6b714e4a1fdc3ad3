use std::{sync::Arc, time::Duration};

use anyhow::Context;
use bytes::{Buf, BufMut, Bytes};
use moq_transport::{Error, transport};
use serde::{Deserialize, Serialize};

/// Datagrams buffered per connection before the oldest are dropped.
const DATAGRAM_BUFFER: usize = 1024 * 1024;

/// QUIC transport tuning shared by the client and server.
#[derive(clap::Args, Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
#[non_exhaustive]
pub struct QuicConfig {
	/// Close the connection after this long without hearing from the peer.
	#[arg(
		id = "quic-idle-timeout",
		long = "quic-idle-timeout",
		default_value = "60s",
		value_parser = humantime::parse_duration,
		env = "MOQ_QUIC_IDLE_TIMEOUT",
	)]
	#[serde(with = "humantime_serde")]
	pub idle_timeout: Duration,

	/// Send a keep-alive this often, if set.
	#[arg(
		id = "quic-keep-alive",
		long = "quic-keep-alive",
		default_value = "4s",
		value_parser = humantime::parse_duration,
		env = "MOQ_QUIC_KEEP_ALIVE",
	)]
	#[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
	pub keep_alive: Option<Duration>,
}

impl Default for QuicConfig {
	fn default() -> Self {
		Self {
			idle_timeout: Duration::from_secs(60),
			keep_alive: Some(Duration::from_secs(4)),
		}
	}
}

impl QuicConfig {
	pub(crate) fn transport(&self) -> anyhow::Result<Arc<quinn::TransportConfig>> {
		let idle_timeout = self.idle_timeout.try_into().context("idle timeout too large")?;

		let mut transport = quinn::TransportConfig::default();
		transport.max_idle_timeout(Some(idle_timeout));
		transport.keep_alive_interval(self.keep_alive);
		transport.datagram_receive_buffer_size(Some(DATAGRAM_BUFFER));

		Ok(Arc::new(transport))
	}
}

fn transport_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
	Error::Transport(Arc::new(err))
}

fn reset_code(code: quinn::VarInt) -> u32 {
	u32::try_from(code.into_inner()).unwrap_or(u32::MAX)
}

/// A raw QUIC connection, negotiated with the [moq_transport::ALPN].
#[derive(Clone)]
pub struct QuicConnection(quinn::Connection);

impl QuicConnection {
	pub fn new(conn: quinn::Connection) -> Self {
		Self(conn)
	}

	pub fn inner(&self) -> &quinn::Connection {
		&self.0
	}
}

impl transport::Connection for QuicConnection {
	type SendStream = QuicSend;
	type RecvStream = QuicRecv;

	async fn open_uni(&self) -> Result<QuicSend, Error> {
		let send = self.0.open_uni().await.map_err(transport_error)?;
		Ok(QuicSend(send))
	}

	async fn accept_uni(&self) -> Result<QuicRecv, Error> {
		let recv = self.0.accept_uni().await.map_err(transport_error)?;
		Ok(QuicRecv(recv))
	}

	async fn open_bi(&self) -> Result<(QuicSend, QuicRecv), Error> {
		let (send, recv) = self.0.open_bi().await.map_err(transport_error)?;
		Ok((QuicSend(send), QuicRecv(recv)))
	}

	async fn accept_bi(&self) -> Result<(QuicSend, QuicRecv), Error> {
		let (send, recv) = self.0.accept_bi().await.map_err(transport_error)?;
		Ok((QuicSend(send), QuicRecv(recv)))
	}

	fn send_datagram(&self, payload: Bytes) -> Result<(), Error> {
		self.0.send_datagram(payload).map_err(transport_error)
	}

	async fn recv_datagram(&self) -> Result<Bytes, Error> {
		self.0.read_datagram().await.map_err(transport_error)
	}

	fn close(&self, code: u32, reason: &str) {
		self.0.close(quinn::VarInt::from_u32(code), reason.as_bytes());
	}
}

pub struct QuicSend(quinn::SendStream);

impl transport::SendStream for QuicSend {
	async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<usize, Error> {
		let size = self.0.write(buf.chunk()).await.map_err(|err| match err {
			quinn::WriteError::Stopped(code) => Error::Reset(reset_code(code)),
			err => transport_error(err),
		})?;

		buf.advance(size);
		Ok(size)
	}

	fn finish(&mut self) -> Result<(), Error> {
		self.0.finish().map_err(transport_error)
	}

	fn reset(&mut self, code: u32) {
		// Fails only if the stream already finished.
		let _ = self.0.reset(quinn::VarInt::from_u32(code));
	}
}

pub struct QuicRecv(quinn::RecvStream);

impl QuicRecv {
	async fn next(&mut self, max: usize) -> Result<Option<Bytes>, Error> {
		let chunk = self.0.read_chunk(max, true).await.map_err(|err| match err {
			quinn::ReadError::Reset(code) => Error::Reset(reset_code(code)),
			err => transport_error(err),
		})?;

		Ok(chunk.map(|chunk| chunk.bytes))
	}
}

impl transport::RecvStream for QuicRecv {
	async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> Result<Option<usize>, Error> {
		let Some(chunk) = self.next(buf.remaining_mut()).await? else {
			return Ok(None);
		};

		let size = chunk.len();
		buf.put(chunk);
		Ok(Some(size))
	}

	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, Error> {
		self.next(max).await
	}

	fn stop(&mut self, code: u32) {
		let _ = self.0.stop(quinn::VarInt::from_u32(code));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quic_config_from_toml() {
		let config: QuicConfig = toml::from_str(r#"idle_timeout = "30s""#).unwrap();
		assert_eq!(config.idle_timeout, Duration::from_secs(30));
		assert_eq!(config.keep_alive, Some(Duration::from_secs(4)));
		assert!(config.transport().is_ok());
	}
}
