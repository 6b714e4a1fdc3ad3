use std::future::Future;
use std::path::PathBuf;
use std::{net, sync::Arc};

use anyhow::Context;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use moq_transport::{Session, SessionConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use url::Url;

use crate::{Connection, QuicConfig, QuicConnection, crypto};

/// TLS configuration for the server.
///
/// Certificate and key must currently be files on disk.
/// Otherwise a self-signed certificate is generated for the given hostnames.
#[derive(clap::Args, Clone, Default, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ServerTlsConfig {
	/// Load the certificate chain from this PEM file.
	#[arg(long = "tls-cert", id = "tls-cert", env = "MOQ_SERVER_TLS_CERT", requires = "tls-key")]
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cert: Option<PathBuf>,

	/// Load the private key from this PEM file.
	#[arg(long = "tls-key", id = "tls-key", env = "MOQ_SERVER_TLS_KEY", requires = "tls-cert")]
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<PathBuf>,

	/// Generate a certificate with these hostnames if none was loaded, `localhost` by default.
	/// This won't be valid unless the client uses the fingerprint or disables verification.
	#[arg(
		long = "tls-generate",
		id = "tls-generate",
		value_delimiter = ',',
		env = "MOQ_SERVER_TLS_GENERATE"
	)]
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub generate: Vec<String>,
}

impl ServerTlsConfig {
	// Load the configured files, falling back to a generated certificate.
	fn load(&self) -> anyhow::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
		if let (Some(cert), Some(key)) = (&self.cert, &self.key) {
			match crypto::load(cert, key) {
				Ok(loaded) => return Ok(loaded),
				Err(err) => tracing::warn!(?err, "failed to load TLS certificate, generating one instead"),
			}
		}

		let hostnames = match self.generate.is_empty() {
			true => vec!["localhost".to_string()],
			false => self.generate.clone(),
		};

		tracing::debug!(?hostnames, "generating self-signed certificate");
		crypto::generate(hostnames)
	}
}

/// Configuration for the MoQ server.
#[derive(clap::Args, Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
#[non_exhaustive]
pub struct ServerConfig {
	/// Listen for UDP packets on the given address.
	/// Defaults to `[::]:443` if not provided.
	#[serde(alias = "listen")]
	#[arg(id = "server-bind", long = "server-bind", alias = "listen", env = "MOQ_SERVER_BIND")]
	pub bind: Option<net::SocketAddr>,

	#[command(flatten)]
	#[serde(default)]
	pub tls: ServerTlsConfig,

	#[command(flatten)]
	#[serde(default)]
	pub quic: QuicConfig,
}

impl ServerConfig {
	pub fn init(self) -> anyhow::Result<Server> {
		Server::new(self)
	}
}

/// Runs a session accepted by [Server::listen], one task per session.
///
/// Implemented for any `Fn(Session<Connection>) -> impl Future<Output = anyhow::Result<()>>`.
pub trait SessionHandler: Clone + Send + Sync + 'static {
	fn handle(&self, session: Session<Connection>) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl<F, Fut> SessionHandler for F
where
	F: Fn(Session<Connection>) -> Fut + Clone + Send + Sync + 'static,
	Fut: Future<Output = anyhow::Result<()>> + Send,
{
	fn handle(&self, session: Session<Connection>) -> impl Future<Output = anyhow::Result<()>> + Send {
		self(session)
	}
}

/// Server for accepting MoQ sessions over raw QUIC and WebTransport on the same UDP socket.
///
/// The backend is picked by the ALPN each client offers.
pub struct Server {
	quic: quinn::Endpoint,
	fingerprints: Vec<String>,
	accept: FuturesUnordered<BoxFuture<'static, anyhow::Result<Request>>>,
}

impl Server {
	pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
		let provider = crypto::provider();

		let (chain, key) = config.tls.load()?;
		let fingerprints = chain
			.iter()
			.take(1)
			.map(|cert| crypto::sha256(&provider, cert).map(hex::encode))
			.collect::<anyhow::Result<Vec<_>>>()?;

		let mut tls = rustls::ServerConfig::builder_with_provider(provider)
			.with_protocol_versions(&[&rustls::version::TLS13])?
			.with_no_client_auth()
			.with_single_cert(chain, key)
			.context("invalid certificate")?;

		tls.alpn_protocols = vec![
			web_transport_quinn::ALPN.as_bytes().to_vec(),
			moq_transport::ALPN.as_bytes().to_vec(),
		];

		let tls: quinn::crypto::rustls::QuicServerConfig = tls.try_into()?;
		let mut server = quinn::ServerConfig::with_crypto(Arc::new(tls));
		server.transport_config(config.quic.transport()?);

		let bind = config
			.bind
			.unwrap_or_else(|| net::SocketAddr::new(net::Ipv6Addr::UNSPECIFIED.into(), 443));
		let socket = std::net::UdpSocket::bind(bind).context("failed to bind UDP socket")?;

		let runtime = quinn::default_runtime().context("no async runtime")?;
		let endpoint_config = quinn::EndpointConfig::default();

		let quic = quinn::Endpoint::new(endpoint_config, Some(server), socket, runtime)
			.context("failed to create QUIC endpoint")?;

		tracing::info!(addr = ?quic.local_addr().ok(), ?fingerprints, "listening");

		Ok(Self {
			quic,
			fingerprints,
			accept: Default::default(),
		})
	}

	/// The hex-encoded SHA-256 fingerprints of the certificates we serve, for clients to pin.
	pub fn fingerprints(&self) -> &[String] {
		&self.fingerprints
	}

	pub fn local_addr(&self) -> anyhow::Result<net::SocketAddr> {
		self.quic.local_addr().context("failed to get local address")
	}

	/// Returns the next partially established QUIC or WebTransport session.
	///
	/// This returns a [Request] instead of a [Session]
	/// so the connection can be rejected early on an invalid path or missing auth.
	/// Returns None once the endpoint is closed or on ctrl-c.
	pub async fn accept(&mut self) -> Option<Request> {
		loop {
			tokio::select! {
				res = self.quic.accept() => {
					let conn = res?;
					self.accept.push(Self::accept_session(conn).boxed());
				}
				Some(res) = self.accept.next() => match res {
					Ok(request) => return Some(request),
					Err(err) => tracing::debug!(%err, "failed to accept session"),
				},
				_ = tokio::signal::ctrl_c() => {
					self.close();
					return None;
				}
			}
		}
	}

	async fn accept_session(conn: quinn::Incoming) -> anyhow::Result<Request> {
		let conn = conn.await.context("failed to accept QUIC connection")?;

		let alpn = conn
			.handshake_data()
			.and_then(|data| data.downcast::<quinn::crypto::rustls::HandshakeData>().ok())
			.and_then(|data| data.protocol)
			.context("missing ALPN")?;
		let alpn = String::from_utf8(alpn).context("failed to decode ALPN")?;

		tracing::debug!(remote = %conn.remote_address(), %alpn, "accepted");

		let kind = match alpn.as_str() {
			alpn if alpn == web_transport_quinn::ALPN => {
				let request = web_transport_quinn::Request::accept(conn)
					.await
					.context("failed to receive WebTransport request")?;
				RequestKind::WebTransport(request)
			}
			alpn if alpn == moq_transport::ALPN => RequestKind::Quic(conn),
			_ => anyhow::bail!("unsupported ALPN: {alpn}"),
		};

		Ok(Request { kind })
	}

	/// Accept sessions on either backend until the server closes.
	pub async fn listen<H: SessionHandler>(self, config: SessionConfig, handler: H) -> anyhow::Result<()> {
		self.serve(config, handler, |_| true).await
	}

	/// Accept sessions over raw QUIC only, turning away WebTransport clients.
	pub async fn listen_quic<H: SessionHandler>(self, config: SessionConfig, handler: H) -> anyhow::Result<()> {
		self.serve(config, handler, |request| request.transport() == "quic").await
	}

	/// Accept sessions over WebTransport only, turning away raw QUIC clients.
	pub async fn listen_webtransport<H: SessionHandler>(self, config: SessionConfig, handler: H) -> anyhow::Result<()> {
		self.serve(config, handler, |request| request.transport() == "webtransport").await
	}

	async fn serve<H: SessionHandler>(
		mut self,
		config: SessionConfig,
		handler: H,
		allow: impl Fn(&Request) -> bool,
	) -> anyhow::Result<()> {
		while let Some(request) = self.accept().await {
			let config = config.clone();
			let handler = handler.clone();

			if !allow(&request) {
				tracing::debug!(transport = request.transport(), "rejecting session");
				tokio::spawn(async move {
					if let Err(err) = request.reject(404).await {
						tracing::debug!(%err, "failed to reject session");
					}
				});
				continue;
			}

			tokio::spawn(async move {
				let session = match request.accept(config).await {
					Ok(session) => session,
					Err(err) => {
						tracing::warn!(?err, "failed to accept session");
						return;
					}
				};

				// The session ends with its handler.
				match handler.handle(session.clone()).await {
					Ok(()) => session.close(0, ""),
					Err(err) => {
						tracing::warn!(?err, "session handler failed");
						session.close(1, &err.to_string());
					}
				}
			});
		}

		Ok(())
	}

	pub fn close(&mut self) {
		self.quic.close(quinn::VarInt::from_u32(0), b"server shutdown");
	}
}

enum RequestKind {
	Quic(quinn::Connection),
	WebTransport(web_transport_quinn::Request),
}

/// An incoming connection that can be accepted or rejected.
pub struct Request {
	kind: RequestKind,
}

impl Request {
	/// The backend name, for logging.
	pub fn transport(&self) -> &'static str {
		match self.kind {
			RequestKind::Quic(_) => "quic",
			RequestKind::WebTransport(_) => "webtransport",
		}
	}

	/// Returns the URL provided by a WebTransport client.
	pub fn url(&self) -> Option<&Url> {
		match &self.kind {
			RequestKind::WebTransport(request) => Some(request.url()),
			RequestKind::Quic(_) => None,
		}
	}

	/// Reject the session, returning your favorite HTTP status code.
	///
	/// Raw QUIC has no status line, so the code is used as the connection close code.
	pub async fn reject(self, code: u16) -> anyhow::Result<()> {
		match self.kind {
			RequestKind::Quic(conn) => conn.close(quinn::VarInt::from_u32(code.into()), b"rejected"),
			RequestKind::WebTransport(request) => {
				let status = web_transport_quinn::http::StatusCode::from_u16(code).context("invalid status code")?;
				request.close(status).await?;
			}
		}

		Ok(())
	}

	/// Accept the session, performing rest of the MoQ handshake.
	pub async fn accept(self, config: SessionConfig) -> anyhow::Result<Session<Connection>> {
		let conn = match self.kind {
			RequestKind::Quic(conn) => Connection::from(QuicConnection::new(conn)),
			RequestKind::WebTransport(request) => {
				let session = request.ok().await.context("failed to respond to WebTransport request")?;
				Connection::from(session)
			}
		};

		let session = Session::accept(conn, config).await.context("failed MoQ setup")?;
		Ok(session)
	}
}
