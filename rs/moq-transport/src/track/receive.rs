use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{
	session::{Accepted, Shared},
	track::{ObjectReader, TrackEvent},
	transport::Connection,
	Error,
};

/// An accepted subscription, consumed as a sequence of objects or as one continuous byte stream.
///
/// Dropping the track unsubscribes.
pub struct ReceiveTrack<C: Connection> {
	session: Weak<Shared<C>>,
	id: u64,
	track_id: u64,
	namespace: String,
	name: String,

	events: mpsc::UnboundedReceiver<TrackEvent>,

	// The object being drained by read().
	current: Option<ObjectReader>,

	// Set once no more objects will arrive.
	done: Option<Result<(), Error>>,
}

impl<C: Connection> ReceiveTrack<C> {
	pub(crate) fn new(session: &Arc<Shared<C>>, id: u64, namespace: &str, name: &str, accepted: Accepted) -> Self {
		Self {
			session: Arc::downgrade(session),
			id,
			track_id: accepted.track_id,
			namespace: namespace.to_string(),
			name: name.to_string(),
			events: accepted.events,
			current: None,
			done: None,
		}
	}

	/// The request id we allocated for this subscription.
	pub fn id(&self) -> u64 {
		self.id
	}

	/// The track id chosen by the publisher, carried by every object.
	pub fn track_id(&self) -> u64 {
		self.track_id
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Wait for the next object, returning None once the publisher ends the track.
	///
	/// Discards whatever is left of the object [Self::read] was draining.
	/// Fails with [Error::Closed] once the session is closed.
	pub async fn next_object(&mut self) -> Result<Option<ObjectReader>, Error> {
		self.current = None;

		if let Some(done) = &self.done {
			return done.clone().map(|_| None);
		}

		match self.events.recv().await {
			Some(TrackEvent::Object(object)) => Ok(Some(object)),
			Some(TrackEvent::Done(res)) => {
				tracing::debug!(id = self.id, ?res, "track done");
				self.done = Some(res.clone());
				res.map(|_| None)
			}
			None => {
				self.done = Some(Err(Error::Closed));
				Err(Error::Closed)
			}
		}
	}

	/// Read the whole payload of the next object.
	pub async fn read_object(&mut self) -> Result<Option<Bytes>, Error> {
		match self.next_object().await? {
			Some(mut object) => Ok(Some(object.read_all().await?)),
			None => Ok(None),
		}
	}

	/// Read payload bytes, moving on to the next object once the current one is exhausted.
	///
	/// A single read never spans two objects. Returns 0 once the track has ended.
	/// If the sender abandons an object the read fails, and the following read starts at the next object.
	pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
		if buf.is_empty() {
			return Ok(0);
		}

		loop {
			if let Some(object) = &mut self.current {
				match object.read(buf).await {
					Ok(0) => self.current = None,
					Ok(size) => return Ok(size),
					Err(err) => {
						self.current = None;
						return Err(err);
					}
				}
			}

			match self.next_object().await? {
				Some(object) => self.current = Some(object),
				None => return Ok(0),
			}
		}
	}
}

impl<C: Connection> Drop for ReceiveTrack<C> {
	fn drop(&mut self) {
		if let Some(session) = self.session.upgrade() {
			session.unsubscribe(self.id);
		}
	}
}
