use std::{fs, io, net, path::PathBuf, sync::Arc};

use anyhow::Context;
use moq_transport::{Session, SessionConfig};
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use url::Url;

use crate::{Connection, QuicConfig, QuicConnection, crypto};

/// TLS configuration for the client.
#[derive(Clone, Default, Debug, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct ClientTls {
	/// Use the TLS root at this path, encoded as PEM.
	///
	/// This value can be provided multiple times for multiple roots.
	/// If this is empty, system roots will be used instead
	#[serde(skip_serializing_if = "Vec::is_empty")]
	#[arg(id = "tls-root", long = "tls-root", env = "MOQ_CLIENT_TLS_ROOT")]
	pub root: Vec<PathBuf>,

	/// Danger: Disable TLS certificate verification.
	///
	/// Fine for local development, but should be used in caution in production.
	#[serde(skip_serializing_if = "Option::is_none")]
	#[arg(
		id = "tls-disable-verify",
		long = "tls-disable-verify",
		env = "MOQ_CLIENT_TLS_DISABLE_VERIFY",
		default_missing_value = "true",
		num_args = 0..=1,
		value_parser = clap::value_parser!(bool),
	)]
	pub disable_verify: Option<bool>,

	/// Only trust a server certificate with this hex-encoded SHA-256 fingerprint.
	///
	/// Used with the self-signed certificates a server generates.
	#[serde(skip_serializing_if = "Option::is_none")]
	#[arg(id = "tls-fingerprint", long = "tls-fingerprint", env = "MOQ_CLIENT_TLS_FINGERPRINT")]
	pub fingerprint: Option<String>,
}

/// Configuration for the MoQ client.
#[derive(Clone, Debug, clap::Parser, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
#[non_exhaustive]
pub struct ClientConfig {
	/// Listen for UDP packets on the given address.
	#[arg(
		id = "client-bind",
		long = "client-bind",
		default_value = "[::]:0",
		env = "MOQ_CLIENT_BIND"
	)]
	pub bind: net::SocketAddr,

	#[command(flatten)]
	#[serde(default)]
	pub tls: ClientTls,

	#[command(flatten)]
	#[serde(default)]
	pub quic: QuicConfig,
}

impl ClientConfig {
	pub fn init(self) -> anyhow::Result<Client> {
		Client::new(self)
	}
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			bind: net::SocketAddr::new(net::Ipv6Addr::UNSPECIFIED.into(), 0),
			tls: ClientTls::default(),
			quic: QuicConfig::default(),
		}
	}
}

/// Client for dialing MoQ sessions over raw QUIC or WebTransport.
///
/// Create via [`ClientConfig::init`] or [`Client::new`].
#[derive(Clone)]
pub struct Client {
	quic: quinn::Endpoint,
	tls: rustls::ClientConfig,
	transport: Arc<quinn::TransportConfig>,
}

impl Client {
	pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
		let provider = crypto::provider();

		// Create a list of acceptable root certificates.
		let mut roots = RootCertStore::empty();

		if config.tls.root.is_empty() {
			let native = rustls_native_certs::load_native_certs();

			// Log any errors that occurred while loading the native root certificates.
			for err in native.errors {
				tracing::warn!(%err, "failed to load root cert");
			}

			for cert in native.certs {
				roots.add(cert).context("failed to add root cert")?;
			}
		} else {
			for root in &config.tls.root {
				let root = fs::File::open(root).context("failed to open root cert file")?;
				let mut root = io::BufReader::new(root);

				for cert in rustls_pemfile::certs(&mut root) {
					let cert = cert.context("failed to read root cert")?;
					roots.add(cert).context("failed to add root cert")?;
				}
			}
		}

		let mut tls = rustls::ClientConfig::builder_with_provider(provider.clone())
			.with_protocol_versions(&[&rustls::version::TLS13])?
			.with_root_certificates(roots)
			.with_no_client_auth();

		if config.tls.disable_verify.unwrap_or_default() {
			tracing::warn!("TLS server certificate verification is disabled; A man-in-the-middle attack is possible.");

			let noop = NoCertificateVerification(provider.clone());
			tls.dangerous().set_certificate_verifier(Arc::new(noop));
		} else if let Some(fingerprint) = &config.tls.fingerprint {
			let fingerprint = hex::decode(fingerprint.trim()).context("invalid fingerprint")?;
			let verifier = FingerprintVerifier::new(provider.clone(), fingerprint);
			tls.dangerous().set_certificate_verifier(Arc::new(verifier));
		}

		let socket = std::net::UdpSocket::bind(config.bind).context("failed to bind UDP socket")?;

		// There's a bit more boilerplate to make a generic endpoint.
		let runtime = quinn::default_runtime().context("no async runtime")?;
		let endpoint_config = quinn::EndpointConfig::default();

		let quic =
			quinn::Endpoint::new(endpoint_config, None, socket, runtime).context("failed to create QUIC endpoint")?;

		Ok(Self {
			quic,
			tls,
			transport: config.quic.transport()?,
		})
	}

	/// Dial a `moqt://` URL over raw QUIC, or an `https://` URL over WebTransport, then perform the MoQ setup.
	pub async fn connect(&self, url: Url, config: SessionConfig) -> anyhow::Result<Session<Connection>> {
		match url.scheme() {
			"moqt" => self.dial_quic(url, config).await,
			"https" => self.dial_webtransport(url, config).await,
			scheme => anyhow::bail!("unsupported url scheme: {scheme}"),
		}
	}

	/// Dial over raw QUIC using the [moq_transport::ALPN].
	pub async fn dial_quic(&self, url: Url, config: SessionConfig) -> anyhow::Result<Session<Connection>> {
		let connection = self.connect_quic(&url, moq_transport::ALPN).await?;
		let conn = Connection::from(QuicConnection::new(connection));

		let session = Session::connect(conn, config).await.context("failed MoQ setup")?;
		Ok(session)
	}

	/// Dial an HTTP/3 server and upgrade to a WebTransport session.
	pub async fn dial_webtransport(&self, url: Url, config: SessionConfig) -> anyhow::Result<Session<Connection>> {
		let connection = self.connect_quic(&url, web_transport_quinn::ALPN).await?;

		let session = web_transport_quinn::Session::connect(connection, url)
			.await
			.context("failed WebTransport handshake")?;

		let session = Session::connect(Connection::from(session), config)
			.await
			.context("failed MoQ setup")?;
		Ok(session)
	}

	async fn connect_quic(&self, url: &Url, alpn: &str) -> anyhow::Result<quinn::Connection> {
		let mut config = self.tls.clone();

		let host = url.host_str().context("invalid DNS name")?.to_string();
		let port = url.port().unwrap_or(443);

		// Look up the DNS entry.
		let ip = tokio::net::lookup_host((host.clone(), port))
			.await
			.context("failed DNS lookup")?
			.next()
			.context("no DNS entries")?;

		config.alpn_protocols = vec![alpn.as_bytes().to_vec()];

		let config: quinn::crypto::rustls::QuicClientConfig = config.try_into()?;
		let mut config = quinn::ClientConfig::new(Arc::new(config));
		config.transport_config(self.transport.clone());

		tracing::debug!(%url, %ip, alpn, "connecting");

		let connection = self.quic.connect_with(config, ip, &host)?.await?;
		Ok(connection)
	}
}

#[derive(Debug)]
struct NoCertificateVerification(crypto::Provider);

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp: &[u8],
		_now: UnixTime,
	) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
		Ok(rustls::client::danger::ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
	}

	fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
		self.0.signature_verification_algorithms.supported_schemes()
	}
}

// Verify the certificate matches a provided fingerprint.
#[derive(Debug)]
struct FingerprintVerifier {
	provider: crypto::Provider,
	fingerprint: Vec<u8>,
}

impl FingerprintVerifier {
	pub fn new(provider: crypto::Provider, fingerprint: Vec<u8>) -> Self {
		Self { provider, fingerprint }
	}
}

impl rustls::client::danger::ServerCertVerifier for FingerprintVerifier {
	fn verify_server_cert(
		&self,
		end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp: &[u8],
		_now: UnixTime,
	) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
		let fingerprint =
			crypto::sha256(&self.provider, end_entity).map_err(|err| rustls::Error::General(err.to_string()))?;

		if fingerprint.as_ref() == self.fingerprint.as_slice() {
			Ok(rustls::client::danger::ServerCertVerified::assertion())
		} else {
			Err(rustls::Error::General("fingerprint mismatch".into()))
		}
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
	}

	fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
		self.provider.signature_verification_algorithms.supported_schemes()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[test]
	fn toml_fingerprint() {
		let toml = r#"
			bind = "127.0.0.1:0"
			tls.fingerprint = "abcd"
		"#;

		let config: ClientConfig = toml::from_str(toml).unwrap();
		assert_eq!(config.bind, "127.0.0.1:0".parse().unwrap());
		assert_eq!(config.tls.fingerprint.as_deref(), Some("abcd"));
		assert_eq!(config.tls.disable_verify, None);
	}

	#[test]
	fn toml_rejects_unknown_fields() {
		assert!(toml::from_str::<ClientConfig>("websocket = true").is_err());
	}

	#[test]
	fn cli_disable_verify_flag() {
		let config = ClientConfig::parse_from(["test", "--tls-disable-verify"]);
		assert_eq!(config.tls.disable_verify, Some(true));
	}

	#[test]
	fn cli_defaults() {
		let config = ClientConfig::parse_from(["test"]);
		assert_eq!(config.tls.disable_verify, None);
		assert_eq!(config.quic.idle_timeout, std::time::Duration::from_secs(60));
		assert_eq!(config.bind.port(), 0);
	}

	#[tokio::test]
	async fn rejects_unknown_scheme() {
		let client = ClientConfig {
			bind: "127.0.0.1:0".parse().unwrap(),
			..Default::default()
		}
		.init()
		.unwrap();

		let url = Url::parse("http://localhost:4443").unwrap();
		let err = client.connect(url, SessionConfig::default()).await.err().unwrap();
		assert!(err.to_string().contains("unsupported url scheme"));
	}
}
