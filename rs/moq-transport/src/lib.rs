//! # moq-transport: Media over QUIC session engine
//!
//! A session runs over any [Connection]: native QUIC (see `moq-transport-native`) or a WebTransport session via
//! [WebTransport]. It negotiates the version and roles during setup, carries every control message on a single
//! bidirectional stream, and delivers each object on its own unidirectional stream or as a datagram.
//!
//! ## API
//!
//! To publish:
//! - [Session::announce] to offer a namespace, waiting for the peer to accept it.
//! - [Session::read_subscription] to receive each [Subscription], then [Subscription::accept] to get a [SendTrack].
//! - [SendTrack::start_reliable_object] or [SendTrack::start_cancellable_object] for each object, then
//!   [ObjectWriter::write] and [ObjectWriter::finish].
//!
//! To consume:
//! - [Session::read_announcement] to receive each [Announcement], then [Announcement::accept] or [Announcement::reject].
//! - [Session::subscribe] to get a [ReceiveTrack].
//! - [ReceiveTrack::read] for one continuous byte stream, or [ReceiveTrack::next_object] for each [ObjectReader].
//!
//! Every announcement and subscription must be answered exactly once; dropping one unanswered rejects it.

mod error;
mod session;
mod stats;
mod track;

pub mod coding;
pub mod message;
pub mod transport;

pub use error::*;
pub use message::{Role, Version, ALPN};
pub use session::*;
pub use stats::*;
pub use track::*;
pub use transport::{Connection, RecvStream, SendStream, WebTransport};
