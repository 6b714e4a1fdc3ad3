use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use web_async::Lock;

use crate::{
	coding::Stream,
	message::{self, Role, Version},
	session::{
		control, data, Accepted, Announcement, LocalAnnounce, LocalSubscribe, Outbox, RemoteSubscribe, SessionConfig, State,
		Status, Subscription,
	},
	track::TrackEvent,
	transport::Connection,
	Error,
};

type Queue<T> = (async_channel::Sender<T>, async_channel::Receiver<T>);

/// Everything owned by one session, shared by its handles and background tasks.
///
/// Tracks, announcements and subscriptions only hold a [Weak] reference.
pub(crate) struct Shared<C: Connection> {
	pub conn: C,
	pub version: Version,
	pub client: bool,
	pub local: Role,
	pub remote: Role,
	pub config: SessionConfig,

	pub state: Lock<State>,
	pub outbox: Outbox,

	pub announcements: Queue<Announcement<C>>,
	pub subscriptions: Queue<Subscription<C>>,

	status: watch::Sender<Status>,
	me: Weak<Shared<C>>,
}

impl<C: Connection> Shared<C> {
	pub fn new(
		conn: C,
		version: Version,
		client: bool,
		remote: Role,
		config: SessionConfig,
	) -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
		let (outbox, rx) = Outbox::new(version);

		let shared = Arc::new_cyclic(|me| Self {
			conn,
			version,
			client,
			local: config.role,
			remote,
			config,
			state: Default::default(),
			outbox,
			announcements: async_channel::unbounded(),
			subscriptions: async_channel::unbounded(),
			status: watch::Sender::new(Status::Established),
			me: me.clone(),
		});

		shared.state.lock().status = Status::Established;

		(shared, rx)
	}

	pub fn weak(&self) -> Weak<Self> {
		self.me.clone()
	}

	pub async fn run_control(self: Arc<Self>, stream: Stream<C, Version>, rx: mpsc::UnboundedReceiver<Bytes>) {
		let res = tokio::select! {
			res = control::run_read(&*self, stream.reader) => res,
			res = Outbox::run(stream.writer, rx) => res,
			_ = self.closed() => return,
		};

		self.finish(res);
	}

	pub async fn run_data(self: Arc<Self>) {
		let res = tokio::select! {
			res = data::run(&*self) => res,
			_ = self.closed() => return,
		};

		self.finish(res);
	}

	// A background loop ended on its own; the session ends with it.
	fn finish(&self, res: Result<(), Error>) {
		match res {
			Ok(()) => {
				tracing::info!("session closed by peer");
				self.terminate(0, "", None);
			}
			Err(err @ Error::Transport(_)) => {
				tracing::info!(%err, "session terminated");
				self.terminate(1, "", Some(err));
			}
			Err(err) => {
				tracing::warn!(%err, "session error");
				self.terminate(err.to_code(), &err.to_string(), Some(err));
			}
		}
	}

	/// Close the connection and fail everything outstanding. Only the first call has any effect.
	pub fn terminate(&self, code: u32, reason: &str, error: Option<Error>) {
		{
			let mut state = self.state.lock();
			if matches!(state.status, Status::Closing | Status::Closed) {
				return;
			}

			state.status = Status::Closing;
			state.error = error;
			self.status.send_replace(Status::Closing);

			self.conn.close(code, reason);
			state.drain();
			state.status = Status::Closed;
		}

		self.announcements.0.close();
		self.subscriptions.0.close();
		self.status.send_replace(Status::Closed);
	}

	/// Wait until the session is closed.
	pub async fn closed(&self) {
		let mut status = self.status.subscribe();
		while *status.borrow_and_update() != Status::Closed {
			if status.changed().await.is_err() {
				return;
			}
		}
	}

	/// Stop receiving a track: free its id and tell the peer, unless the publisher already ended it.
	pub fn unsubscribe(&self, id: u64) {
		let mut state = self.state.lock();
		if state.check().is_err() {
			return;
		}

		match state.remove_subscribe(id) {
			Some(LocalSubscribe::Pending(_)) | Some(LocalSubscribe::Active { .. }) => {
				let _ = self.outbox.send(message::Unsubscribe { id });
			}
			Some(LocalSubscribe::Ended) | None => {}
		}
	}

	/// A send track is done: free its track id and reply SubscribeDone.
	///
	/// Nothing happens if the track already ended, since the peer may have reused the request id since.
	pub fn finish_publish(&self, id: u64, ended: &watch::Receiver<Option<Error>>, code: u64, reason: &str) {
		let mut state = self.state.lock();
		if state.check().is_err() || ended.borrow().is_some() {
			return;
		}

		if let Some(RemoteSubscribe::Active { .. }) = state.remove_publish(id, Error::Cancel) {
			let _ = self.outbox.send(message::SubscribeDone {
				id,
				code,
				reason: reason.to_string(),
			});
		}
	}

	/// Route an event to the receive track bound to `track_id`, returning it back if there is none.
	pub fn route(&self, track_id: u64, event: TrackEvent) -> Result<(), TrackEvent> {
		let state = self.state.lock();

		let events = state
			.aliases
			.get(&track_id)
			.and_then(|id| state.subscribes.get(id))
			.and_then(|entry| match entry {
				LocalSubscribe::Active { events, .. } => Some(events),
				_ => None,
			});

		match events {
			Some(events) => events.send(event).map_err(|e| e.0),
			None => Err(event),
		}
	}
}

/// Waits for the reply to an announce, withdrawing the announcement if dropped first.
///
/// The reply channel is checked under the session lock, so a namespace already answered is never touched.
pub(crate) struct PendingAnnounce<'a, C: Connection> {
	shared: &'a Shared<C>,
	namespace: &'a str,
	rx: oneshot::Receiver<Result<(), Error>>,
	armed: bool,
}

impl<'a, C: Connection> PendingAnnounce<'a, C> {
	pub fn new(shared: &'a Shared<C>, namespace: &'a str, rx: oneshot::Receiver<Result<(), Error>>) -> Self {
		Self {
			shared,
			namespace,
			rx,
			armed: true,
		}
	}

	pub async fn wait(mut self) -> Result<(), Error> {
		let res = (&mut self.rx).await;
		self.armed = false;
		res.unwrap_or(Err(Error::Closed))
	}
}

impl<C: Connection> Drop for PendingAnnounce<'_, C> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let mut state = self.shared.state.lock();
		if state.check().is_err() {
			return;
		}

		// Still pending, or accepted with nobody left to hold it.
		let ours = match self.rx.try_recv() {
			Err(oneshot::error::TryRecvError::Empty) => {
				matches!(state.announces.get(self.namespace), Some(LocalAnnounce::Pending(_)))
			}
			Ok(Ok(())) => matches!(state.announces.get(self.namespace), Some(LocalAnnounce::Active)),
			Ok(Err(_)) | Err(oneshot::error::TryRecvError::Closed) => false,
		};

		if ours {
			state.announces.remove(self.namespace);
			let _ = self.shared.outbox.send(message::Unannounce {
				namespace: self.namespace.to_string(),
			});
		}
	}
}

/// Waits for the reply to a subscribe, unsubscribing if dropped first.
///
/// The reply channel is checked under the session lock, so an id freed by a SubscribeError and reused by another
/// request is never touched.
pub(crate) struct PendingSubscribe<'a, C: Connection> {
	shared: &'a Shared<C>,
	id: u64,
	rx: oneshot::Receiver<Result<Accepted, Error>>,
	armed: bool,
}

impl<'a, C: Connection> PendingSubscribe<'a, C> {
	pub fn new(shared: &'a Shared<C>, id: u64, rx: oneshot::Receiver<Result<Accepted, Error>>) -> Self {
		Self {
			shared,
			id,
			rx,
			armed: true,
		}
	}

	pub async fn wait(mut self) -> Result<Accepted, Error> {
		let res = (&mut self.rx).await;
		self.armed = false;
		res.unwrap_or(Err(Error::Closed))
	}
}

impl<C: Connection> Drop for PendingSubscribe<'_, C> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let mut state = self.shared.state.lock();
		if state.check().is_err() {
			return;
		}

		match self.rx.try_recv() {
			Err(oneshot::error::TryRecvError::Empty) | Ok(Ok(_)) => {}
			Ok(Err(_)) | Err(oneshot::error::TryRecvError::Closed) => return,
		}

		match state.remove_subscribe(self.id) {
			Some(LocalSubscribe::Pending(_)) | Some(LocalSubscribe::Active { .. }) => {
				let _ = self.shared.outbox.send(message::Unsubscribe { id: self.id });
			}
			Some(LocalSubscribe::Ended) | None => {}
		}
	}
}
