use std::sync::Weak;

use tokio::sync::watch;

use crate::{
	coding::VarInt,
	message,
	session::{RejectCode, RemoteSubscribe, Shared},
	track::SendTrack,
	transport::Connection,
	Error,
};

/// A track requested by the peer, waiting for the application to [Self::accept] or [Self::reject] it.
///
/// Both consume the subscription, so it can only be resolved once.
/// Dropping it unresolved rejects it, so the peer always receives exactly one response.
pub struct Subscription<C: Connection> {
	session: Weak<Shared<C>>,
	id: u64,
	track_id: u64,
	namespace: String,
	name: String,
	auth: Option<Vec<u8>>,
	sequence: u64,
	resolved: bool,
}

impl<C: Connection> Subscription<C> {
	pub(crate) fn new(session: Weak<Shared<C>>, msg: message::Subscribe, sequence: u64) -> Self {
		Self {
			session,
			id: msg.id,
			track_id: msg.id,
			namespace: msg.namespace,
			name: msg.name,
			auth: msg.auth,
			sequence,
			resolved: false,
		}
	}

	/// The request id chosen by the subscriber.
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn auth(&self) -> Option<&[u8]> {
		self.auth.as_deref()
	}

	/// The track id objects will carry; defaults to the request id.
	pub fn track_id(&self) -> u64 {
		self.track_id
	}

	/// Use a different track id for the objects of this subscription.
	///
	/// Fails if the id does not fit in a varint, leaving the track id unchanged.
	pub fn set_track_id(&mut self, track_id: u64) -> Result<(), Error> {
		VarInt::try_from(track_id)?;
		self.track_id = track_id;
		Ok(())
	}

	/// Reply SubscribeOk and return the track to publish objects on.
	///
	/// Fails with [Error::Duplicate] if the track id is bound to another live track; the peer is sent a SubscribeError.
	/// Fails with [Error::Cancel] if the peer unsubscribed in the meantime.
	pub fn accept(mut self) -> Result<SendTrack<C>, Error> {
		self.resolved = true;

		let session = self.session.upgrade().ok_or(Error::Closed)?;
		let ended = {
			let mut state = session.state.lock();
			state.check()?;

			let pending = state.publishes.get(&self.id);
			if !pending.is_some_and(|entry| entry.is_pending(self.sequence)) {
				return Err(Error::Cancel);
			}

			if state.track_ids.contains(&self.track_id) {
				state.publishes.remove(&self.id);
				session.outbox.send(message::SubscribeError {
					id: self.id,
					code: RejectCode::Duplicate.into(),
					reason: "duplicate track id".into(),
				})?;
				return Err(Error::Duplicate);
			}

			let (ended, rx) = watch::channel(None);
			state.track_ids.insert(self.track_id);
			state.publishes.insert(
				self.id,
				RemoteSubscribe::Active {
					track_id: self.track_id,
					ended,
				},
			);

			session.outbox.send(message::SubscribeOk {
				id: self.id,
				track_id: self.track_id,
				expires: 0,
			})?;

			rx
		};

		Ok(SendTrack::new(
			&session,
			self.id,
			self.track_id,
			std::mem::take(&mut self.namespace),
			std::mem::take(&mut self.name),
			ended,
		))
	}

	/// Reply SubscribeError with the given code and reason.
	///
	/// A code that does not fit in a varint fails, and the peer is sent the code for a dropped subscription instead.
	pub fn reject(mut self, code: u64, reason: &str) -> Result<(), Error> {
		VarInt::try_from(code)?;
		self.resolved = true;
		self.send_reject(code, reason)
	}

	fn send_reject(&self, code: u64, reason: &str) -> Result<(), Error> {
		let session = self.session.upgrade().ok_or(Error::Closed)?;
		let mut state = session.state.lock();
		state.check()?;

		match state.publishes.get(&self.id) {
			Some(entry) if entry.is_pending(self.sequence) => state.publishes.remove(&self.id),
			// The peer already unsubscribed, and may have reused the id since.
			_ => return Ok(()),
		};

		session.outbox.send(message::SubscribeError {
			id: self.id,
			code,
			reason: reason.to_string(),
		})
	}
}

impl<C: Connection> Drop for Subscription<C> {
	fn drop(&mut self) {
		if !self.resolved {
			tracing::debug!(namespace = %self.namespace, name = %self.name, "subscription dropped without a response");
			let _ = self.send_reject(RejectCode::Dropped.into(), "not accepted");
		}
	}
}
