use std::{fs, io, path::Path, sync::Arc};

use anyhow::Context;
use rustls::crypto::hash::{self, HashAlgorithm};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

#[cfg(not(any(feature = "aws-lc-rs", feature = "ring")))]
compile_error!("enable either the aws-lc-rs or the ring feature");

pub type Provider = Arc<rustls::crypto::CryptoProvider>;

/// Certificates we generate stay valid for this long, the maximum browsers accept for a pinned certificate.
const GENERATED_VALIDITY: time::Duration = time::Duration::days(14);

/// The process-wide provider if one was installed, otherwise the one selected by our features.
pub fn provider() -> Provider {
	if let Some(provider) = rustls::crypto::CryptoProvider::get_default() {
		return provider.clone();
	}

	#[cfg(feature = "aws-lc-rs")]
	let provider = rustls::crypto::aws_lc_rs::default_provider();

	#[cfg(all(feature = "ring", not(feature = "aws-lc-rs")))]
	let provider = rustls::crypto::ring::default_provider();

	Arc::new(provider)
}

pub fn sha256(provider: &Provider, data: &[u8]) -> anyhow::Result<hash::Output> {
	let hash = provider
		.cipher_suites
		.iter()
		.filter_map(|suite| suite.tls13())
		.map(|suite| suite.common.hash_provider)
		.find(|hash| hash.algorithm() == HashAlgorithm::SHA256)
		.context("no SHA-256 implementation")?;

	Ok(hash.hash(data))
}

/// Load a certificate chain and its private key from PEM files.
pub fn load(cert: &Path, key: &Path) -> anyhow::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
	let file = fs::File::open(cert).with_context(|| format!("failed to open {}", cert.display()))?;
	let chain = rustls_pemfile::certs(&mut io::BufReader::new(file))
		.collect::<Result<Vec<_>, _>>()
		.context("failed to read certificate")?;
	anyhow::ensure!(!chain.is_empty(), "no certificates in {}", cert.display());

	let file = fs::File::open(key).with_context(|| format!("failed to open {}", key.display()))?;
	let key = rustls_pemfile::private_key(&mut io::BufReader::new(file))
		.context("failed to read private key")?
		.with_context(|| format!("no private key in {}", key.display()))?;

	Ok((chain, key))
}

/// Generate a self-signed certificate for the given hostnames.
pub fn generate(hostnames: Vec<String>) -> anyhow::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
	let key = rcgen::KeyPair::generate().context("failed to generate key")?;

	let mut params = rcgen::CertificateParams::new(hostnames).context("invalid hostname")?;
	let now = time::OffsetDateTime::now_utc();
	params.not_before = now - time::Duration::minutes(5);
	params.not_after = now + GENERATED_VALIDITY;

	let cert = params.self_signed(&key).context("failed to sign certificate")?;
	let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));

	Ok((vec![cert.der().clone()], key))
}
