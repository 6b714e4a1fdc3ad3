//! Native backends for moq-transport.
//!
//! Establishes MoQ sessions over:
//! - raw QUIC, negotiated with the `moq-00` ALPN and a `moqt://` URL
//! - WebTransport over HTTP/3, with an `https://` URL
//!
//! See [`Client`] for dialing and [`Server`] for listening.
//! Both produce a [moq_transport::Session] over [`Connection`], so handlers need not care which backend is in use.

mod client;
mod connection;
mod crypto;
mod log;
mod quic;
mod server;

pub use client::*;
pub use connection::*;
pub use log::*;
pub use quic::*;
pub use server::*;

// Re-export these crates.
pub use moq_transport;
pub use rustls;
pub use web_transport_quinn;
