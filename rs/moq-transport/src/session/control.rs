use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{
	coding::{Encode, Reader, Writer},
	message::{self, Control, Version},
	session::{
		Accepted, Announcement, LocalAnnounce, LocalSubscribe, RejectCode, RemoteAnnounce, RemoteSubscribe, Shared,
		Subscription, Unsolicited,
	},
	track::TrackEvent,
	transport::{Connection, RecvStream, SendStream},
	Error,
};

/// Queues encoded control messages for the single control stream writer.
///
/// Sending never blocks, so it is safe while holding the session lock and keeps messages in the order state changed.
#[derive(Clone)]
pub(crate) struct Outbox {
	tx: mpsc::UnboundedSender<Bytes>,
	version: Version,
}

impl Outbox {
	pub fn new(version: Version) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx, version }, rx)
	}

	pub fn send<T: Into<Control>>(&self, msg: T) -> Result<(), Error> {
		let msg = msg.into();
		tracing::debug!(message = ?msg, "sending control message");

		let buf = msg.encode_bytes(self.version);
		tracing::trace!(id = msg.id(), size = buf.len(), hex = %hex::encode(&buf), "encoded control message");

		self.tx.send(buf).map_err(|_| Error::Closed)
	}

	pub async fn run<S: SendStream>(
		mut writer: Writer<S, Version>,
		mut rx: mpsc::UnboundedReceiver<Bytes>,
	) -> Result<(), Error> {
		while let Some(mut buf) = rx.recv().await {
			writer.write_all(&mut buf).await?;
		}

		Ok(())
	}
}

/// Decode and dispatch control messages in order until the peer finishes the control stream.
pub(crate) async fn run_read<C: Connection, S: RecvStream>(
	shared: &Shared<C>,
	mut reader: Reader<S, Version>,
) -> Result<(), Error> {
	while let Some(msg) = reader.decode_maybe::<Control>().await? {
		tracing::debug!(message = ?msg, "received control message");

		match msg {
			Control::Announce(msg) => shared.recv_announce(msg)?,
			Control::AnnounceOk(msg) => shared.recv_announce_ok(msg),
			Control::AnnounceError(msg) => shared.recv_announce_error(msg),
			Control::Unannounce(msg) => shared.recv_unannounce(msg),
			Control::Subscribe(msg) => shared.recv_subscribe(msg)?,
			Control::SubscribeOk(msg) => shared.recv_subscribe_ok(msg),
			Control::SubscribeError(msg) => shared.recv_subscribe_error(msg),
			Control::SubscribeDone(msg) => shared.recv_subscribe_done(msg),
			Control::Unsubscribe(msg) => shared.recv_unsubscribe(msg),
			Control::GoAway(msg) => shared.recv_goaway(msg)?,
			Control::ClientSetup(_) | Control::ServerSetup(_) => return Err(Error::UnexpectedMessage),
		}
	}

	Ok(())
}

impl<C: Connection> Shared<C> {
	fn recv_announce(&self, msg: message::Announce) -> Result<(), Error> {
		if !self.remote.is_publisher() || !self.local.is_subscriber() {
			return Err(Error::ProtocolViolation("announce not permitted by role"));
		}

		let sequence = {
			let mut state = self.state.lock();
			if state.announced.contains_key(&msg.namespace) {
				tracing::warn!(namespace = %msg.namespace, "duplicate announce");
				return self.outbox.send(message::AnnounceError {
					namespace: msg.namespace,
					code: RejectCode::Duplicate.into(),
					reason: "duplicate announce".into(),
				});
			}

			let sequence = state.next_sequence();
			state.announced.insert(msg.namespace.clone(), RemoteAnnounce::Pending(sequence));
			sequence
		};

		// Created outside the lock; dropping it rejects, which takes the lock again.
		let announcement = Announcement::new(self.weak(), msg, sequence);
		let _ = self.announcements.0.try_send(announcement);

		Ok(())
	}

	fn recv_announce_ok(&self, msg: message::AnnounceOk) {
		let mut state = self.state.lock();
		match state.announces.get_mut(&msg.namespace) {
			Some(entry) if matches!(entry, LocalAnnounce::Pending(_)) => {
				if let LocalAnnounce::Pending(tx) = std::mem::replace(entry, LocalAnnounce::Active) {
					let _ = tx.send(Ok(()));
				}
			}
			_ => tracing::warn!(namespace = %msg.namespace, "announce ok for unknown namespace"),
		}
	}

	fn recv_announce_error(&self, msg: message::AnnounceError) {
		let mut state = self.state.lock();
		match state.announces.remove(&msg.namespace) {
			Some(LocalAnnounce::Pending(tx)) => {
				let _ = tx.send(Err(Error::Rejected {
					code: msg.code,
					reason: msg.reason,
				}));
			}
			Some(LocalAnnounce::Active) => {
				tracing::info!(namespace = %msg.namespace, reason = %msg.reason, "announcement withdrawn by peer");
			}
			None => tracing::warn!(namespace = %msg.namespace, "announce error for unknown namespace"),
		}
	}

	fn recv_unannounce(&self, msg: message::Unannounce) {
		let mut state = self.state.lock();
		if state.announced.remove(&msg.namespace).is_none() {
			tracing::debug!(namespace = %msg.namespace, "unannounce for unknown namespace");
		}
	}

	fn recv_subscribe(&self, msg: message::Subscribe) -> Result<(), Error> {
		if !self.remote.is_subscriber() || !self.local.is_publisher() {
			return Err(Error::ProtocolViolation("subscribe not permitted by role"));
		}

		let sequence = {
			let mut state = self.state.lock();
			if state.publishes.contains_key(&msg.id) {
				return Err(Error::Duplicate);
			}

			if self.config.unsolicited == Unsolicited::Reject
				&& !matches!(state.announces.get(&msg.namespace), Some(LocalAnnounce::Active))
			{
				tracing::debug!(namespace = %msg.namespace, name = %msg.name, "rejecting unsolicited subscribe");
				return self.outbox.send(message::SubscribeError {
					id: msg.id,
					code: RejectCode::NotFound.into(),
					reason: "namespace not announced".into(),
				});
			}

			let sequence = state.next_sequence();
			state.publishes.insert(msg.id, RemoteSubscribe::Pending(sequence));
			sequence
		};

		let subscription = Subscription::new(self.weak(), msg, sequence);
		let _ = self.subscriptions.0.try_send(subscription);

		Ok(())
	}

	fn recv_subscribe_ok(&self, msg: message::SubscribeOk) {
		let mut state = self.state.lock();

		let tx = match state.subscribes.remove(&msg.id) {
			Some(LocalSubscribe::Pending(tx)) => tx,
			Some(active) => {
				tracing::warn!(id = msg.id, "duplicate subscribe ok");
				state.subscribes.insert(msg.id, active);
				return;
			}
			None => {
				// Most likely we unsubscribed before the response arrived.
				tracing::debug!(id = msg.id, "subscribe ok for unknown id");
				return;
			}
		};

		if state.aliases.contains_key(&msg.track_id) {
			tracing::warn!(id = msg.id, track_id = msg.track_id, "track id already in use");
			let _ = tx.send(Err(Error::Duplicate));
			let _ = self.outbox.send(message::Unsubscribe { id: msg.id });
			return;
		}

		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let accepted = Accepted {
			track_id: msg.track_id,
			events: events_rx,
		};

		if tx.send(Ok(accepted)).is_err() {
			let _ = self.outbox.send(message::Unsubscribe { id: msg.id });
			return;
		}

		state.aliases.insert(msg.track_id, msg.id);
		state.subscribes.insert(
			msg.id,
			LocalSubscribe::Active {
				track_id: msg.track_id,
				events: events_tx,
			},
		);
	}

	fn recv_subscribe_error(&self, msg: message::SubscribeError) {
		let mut state = self.state.lock();
		let err = Error::Rejected {
			code: msg.code,
			reason: msg.reason,
		};

		match state.end_subscribe(msg.id) {
			Some(LocalSubscribe::Pending(tx)) => {
				let _ = tx.send(Err(err));
			}
			Some(LocalSubscribe::Active { events, .. }) => {
				let _ = events.send(TrackEvent::Done(Err(err)));
			}
			_ => tracing::debug!(id = msg.id, "subscribe error for unknown id"),
		}
	}

	fn recv_subscribe_done(&self, msg: message::SubscribeDone) {
		let mut state = self.state.lock();
		let res = match msg.code {
			0 => Ok(()),
			code => Err(Error::Rejected {
				code,
				reason: msg.reason,
			}),
		};

		match state.end_subscribe(msg.id) {
			Some(LocalSubscribe::Active { events, .. }) => {
				let _ = events.send(TrackEvent::Done(res));
			}
			Some(LocalSubscribe::Pending(tx)) => {
				let _ = tx.send(res.and(Err(Error::NotFound)));
			}
			_ => tracing::debug!(id = msg.id, "subscribe done for unknown id"),
		}
	}

	fn recv_unsubscribe(&self, msg: message::Unsubscribe) {
		let mut state = self.state.lock();
		if state.remove_publish(msg.id, Error::Cancel).is_none() {
			tracing::debug!(id = msg.id, "unsubscribe for unknown id");
		}
	}

	fn recv_goaway(&self, msg: message::GoAway) -> Result<(), Error> {
		if !self.client {
			return Err(Error::ProtocolViolation("goaway sent by client"));
		}

		tracing::info!(uri = %msg.uri, "server is going away");
		self.state.lock().goaway = Some(msg.uri);

		Ok(())
	}
}
