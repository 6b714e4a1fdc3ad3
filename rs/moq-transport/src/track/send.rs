use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::sync::watch;

use crate::{
	coding::{Encode, VarInt, Writer},
	message::{ObjectDatagram, ObjectHeader, Version},
	session::Shared,
	stats::Stats,
	track::{object::wait_ended, ObjectWriter},
	transport::Connection,
	Error,
};

/// An accepted subscription we publish objects on.
///
/// Objects are numbered in order within a group, starting at 0. Nothing is buffered or replayed.
/// Closing or dropping the track sends SubscribeDone, unless the subscriber already unsubscribed.
pub struct SendTrack<C: Connection> {
	session: Weak<Shared<C>>,
	conn: C,
	version: Version,
	stats: Option<Arc<dyn Stats>>,

	id: u64,
	track_id: u64,
	namespace: String,
	name: String,

	group: u64,
	object: u64,

	// Set when the subscriber unsubscribes or the session closes.
	ended: watch::Receiver<Option<Error>>,
	closed: bool,
}

impl<C: Connection> SendTrack<C> {
	pub(crate) fn new(
		session: &Arc<Shared<C>>,
		id: u64,
		track_id: u64,
		namespace: String,
		name: String,
		ended: watch::Receiver<Option<Error>>,
	) -> Self {
		Self {
			session: Arc::downgrade(session),
			conn: session.conn.clone(),
			version: session.version,
			stats: session.config.stats.clone(),
			id,
			track_id,
			namespace,
			name,
			group: 0,
			object: 0,
			ended,
			closed: false,
		}
	}

	/// The subscriber's request id.
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn track_id(&self) -> u64 {
		self.track_id
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// The group the next object belongs to.
	pub fn group(&self) -> u64 {
		self.group
	}

	/// Start a new group; the object sequence restarts at 0.
	pub fn next_group(&mut self) -> u64 {
		self.group += 1;
		self.object = 0;
		self.group
	}

	fn check(&self) -> Result<(), Error> {
		match self.ended.borrow().clone() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	fn next_header(&mut self) -> ObjectHeader {
		let header = ObjectHeader {
			track_id: self.track_id,
			group: self.group,
			object: self.object,
			send_order: 0,
		};

		self.object += 1;
		header
	}

	async fn start_object(&mut self, cancellable: bool) -> Result<ObjectWriter<C::SendStream>, Error> {
		self.check()?;

		let header = self.next_header();
		let stream = self.conn.open_uni().await?;

		let mut writer = Writer::new(stream, self.version);
		writer.encode(&header).await?;
		tracing::trace!(?header, cancellable, "started object");

		let ended = cancellable.then(|| self.ended.clone());
		Ok(ObjectWriter::new(writer, header, ended, self.stats.clone()))
	}

	/// Open a stream for the next object; it is delivered in full unless the writer resets it.
	pub async fn start_reliable_object(&mut self) -> Result<ObjectWriter<C::SendStream>, Error> {
		self.start_object(false).await
	}

	/// Open a stream for the next object that is abandoned, rather than completed, once the track ends.
	///
	/// The writer may also [ObjectWriter::reset] it at any time; the receiver drops the object and carries on.
	pub async fn start_cancellable_object(&mut self) -> Result<ObjectWriter<C::SendStream>, Error> {
		self.start_object(true).await
	}

	/// Send the next object as a single unreliable datagram.
	pub fn send_datagram(&mut self, payload: Bytes) -> Result<(), Error> {
		self.check()?;

		let size = payload.len();
		let datagram = ObjectDatagram {
			header: self.next_header(),
			payload,
		};

		self.conn.send_datagram(datagram.encode_bytes(self.version))?;

		if let Some(stats) = &self.stats {
			stats.add_tx_bytes(size as u64);
		}

		Ok(())
	}

	/// Wait until the subscriber unsubscribes or the session closes, returning why.
	pub async fn unsubscribed(&self) -> Error {
		let mut ended = self.ended.clone();
		wait_ended(&mut ended).await
	}

	/// End the track normally.
	pub fn close(mut self) {
		self.finish(0, "end of track");
	}

	/// End the track with an application error code.
	///
	/// A code that does not fit in a varint fails, and the track ends normally instead.
	pub fn close_with_error(mut self, code: u64, reason: &str) -> Result<(), Error> {
		VarInt::try_from(code)?;
		self.finish(code, reason);
		Ok(())
	}

	fn finish(&mut self, code: u64, reason: &str) {
		if std::mem::replace(&mut self.closed, true) {
			return;
		}

		if let Some(session) = self.session.upgrade() {
			session.finish_publish(self.id, &self.ended, code, reason);
		}
	}
}

impl<C: Connection> Drop for SendTrack<C> {
	fn drop(&mut self) {
		self.finish(0, "end of track");
	}
}
