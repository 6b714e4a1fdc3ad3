use std::sync::Weak;

use crate::{
	coding::VarInt,
	message,
	session::{RejectCode, RemoteAnnounce, Shared},
	transport::Connection,
	Error,
};

/// A namespace offered by the peer, waiting for the application to [Self::accept] or [Self::reject] it.
///
/// Both consume the announcement, so it can only be resolved once.
/// Dropping it unresolved rejects it, so the peer always receives exactly one response.
pub struct Announcement<C: Connection> {
	session: Weak<Shared<C>>,
	namespace: String,
	auth: Option<Vec<u8>>,
	sequence: u64,
	resolved: bool,
}

impl<C: Connection> Announcement<C> {
	pub(crate) fn new(session: Weak<Shared<C>>, msg: message::Announce, sequence: u64) -> Self {
		Self {
			session,
			namespace: msg.namespace,
			auth: msg.auth,
			sequence,
			resolved: false,
		}
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// The authorization info sent with the announce, if any.
	pub fn auth(&self) -> Option<&[u8]> {
		self.auth.as_deref()
	}

	/// Reply AnnounceOk.
	///
	/// Fails with [Error::NotFound] if the peer withdrew the namespace in the meantime.
	pub fn accept(mut self) -> Result<(), Error> {
		self.resolved = true;

		let session = self.session.upgrade().ok_or(Error::Closed)?;
		let mut state = session.state.lock();
		state.check()?;

		match state.announced.get_mut(&self.namespace) {
			Some(entry) if entry.is_pending(self.sequence) => *entry = RemoteAnnounce::Active,
			_ => return Err(Error::NotFound),
		}

		session.outbox.send(message::AnnounceOk {
			namespace: self.namespace.clone(),
		})
	}

	/// Reply AnnounceError with the given code and reason.
	///
	/// A code that does not fit in a varint fails, and the peer is sent the code for a dropped announcement instead.
	pub fn reject(mut self, code: u64, reason: &str) -> Result<(), Error> {
		VarInt::try_from(code)?;
		self.resolved = true;
		self.send_reject(code, reason)
	}

	fn send_reject(&self, code: u64, reason: &str) -> Result<(), Error> {
		let session = self.session.upgrade().ok_or(Error::Closed)?;
		let mut state = session.state.lock();
		state.check()?;

		match state.announced.get(&self.namespace) {
			Some(entry) if entry.is_pending(self.sequence) => state.announced.remove(&self.namespace),
			_ => return Err(Error::NotFound),
		};

		session.outbox.send(message::AnnounceError {
			namespace: self.namespace.clone(),
			code,
			reason: reason.to_string(),
		})
	}
}

impl<C: Connection> Drop for Announcement<C> {
	fn drop(&mut self) {
		if !self.resolved {
			tracing::debug!(namespace = %self.namespace, "announcement dropped without a response");
			let _ = self.send_reject(RejectCode::Dropped.into(), "not accepted");
		}
	}
}
