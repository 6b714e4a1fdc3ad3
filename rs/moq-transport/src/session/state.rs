use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, oneshot, watch};

use crate::{track::TrackEvent, Error};

/// The lifecycle of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
	/// Performing the setup handshake.
	#[default]
	Connecting,
	/// The only state in which announcements and subscriptions may be created.
	Established,
	/// Tearing down; nothing new succeeds.
	Closing,
	Closed,
}

/// A namespace we announced.
pub(crate) enum LocalAnnounce {
	Pending(oneshot::Sender<Result<(), Error>>),
	Active,
}

/// A namespace the peer announced.
pub(crate) enum RemoteAnnounce {
	/// Queued for the application, which has yet to accept or reject it. Holds the request sequence.
	Pending(u64),
	Active,
}

impl RemoteAnnounce {
	pub fn is_pending(&self, sequence: u64) -> bool {
		matches!(self, Self::Pending(pending) if *pending == sequence)
	}
}

/// The result of a successful subscribe, handed back to the caller.
pub(crate) struct Accepted {
	pub track_id: u64,
	pub events: mpsc::UnboundedReceiver<TrackEvent>,
}

/// A subscription we sent.
pub(crate) enum LocalSubscribe {
	Pending(oneshot::Sender<Result<Accepted, Error>>),
	Active {
		track_id: u64,
		events: mpsc::UnboundedSender<TrackEvent>,
	},
	/// The publisher ended it, but the receive track still holds the id.
	Ended,
}

/// A subscription the peer sent.
pub(crate) enum RemoteSubscribe {
	/// Holds the request sequence, since the peer may reuse the id once it unsubscribes.
	Pending(u64),
	Active {
		track_id: u64,
		ended: watch::Sender<Option<Error>>,
	},
}

impl RemoteSubscribe {
	pub fn is_pending(&self, sequence: u64) -> bool {
		matches!(self, Self::Pending(pending) if *pending == sequence)
	}
}

/// Everything mutated by both the control loop and API callers, guarded by one lock per session.
#[derive(Default)]
pub(crate) struct State {
	pub status: Status,

	// Why the session ended, unless it was closed cleanly.
	pub error: Option<Error>,

	pub goaway: Option<String>,

	pub announces: HashMap<String, LocalAnnounce>,
	pub announced: HashMap<String, RemoteAnnounce>,

	// Keyed by the request id we allocated.
	pub subscribes: HashMap<u64, LocalSubscribe>,

	// Track id carried by incoming objects -> request id.
	pub aliases: HashMap<u64, u64>,

	// Keyed by the peer's request id.
	pub publishes: HashMap<u64, RemoteSubscribe>,

	// Track ids bound to live send tracks.
	pub track_ids: HashSet<u64>,

	// Numbers every inbound announce and subscribe, so a stale handle can't answer a newer request.
	sequence: u64,
}

impl State {
	pub fn check(&self) -> Result<(), Error> {
		match self.status {
			Status::Established => Ok(()),
			_ => Err(Error::Closed),
		}
	}

	/// The lowest id that neither names a live request nor is carried by a live receive track.
	pub fn next_track_id(&self) -> u64 {
		(0..)
			.find(|id| !self.subscribes.contains_key(id) && !self.aliases.contains_key(id))
			.unwrap_or_default()
	}

	pub fn next_sequence(&mut self) -> u64 {
		self.sequence += 1;
		self.sequence
	}

	/// Remove a local subscription, freeing its id.
	pub fn remove_subscribe(&mut self, id: u64) -> Option<LocalSubscribe> {
		let entry = self.subscribes.remove(&id)?;
		if let LocalSubscribe::Active { track_id, .. } = &entry {
			self.aliases.remove(track_id);
		}
		Some(entry)
	}

	/// Stop routing objects to a local subscription after the publisher ended it.
	///
	/// A pending subscription is removed. An active one keeps its id reserved until the receive track is dropped.
	pub fn end_subscribe(&mut self, id: u64) -> Option<LocalSubscribe> {
		let track_id = match self.subscribes.get(&id)? {
			LocalSubscribe::Pending(_) => return self.subscribes.remove(&id),
			LocalSubscribe::Active { track_id, .. } => *track_id,
			LocalSubscribe::Ended => return None,
		};

		self.aliases.remove(&track_id);
		self.subscribes.insert(id, LocalSubscribe::Ended)
	}

	/// Remove a served subscription, freeing its track id and notifying the send track.
	pub fn remove_publish(&mut self, id: u64, reason: Error) -> Option<RemoteSubscribe> {
		let entry = self.publishes.remove(&id)?;
		if let RemoteSubscribe::Active { track_id, ended } = &entry {
			self.track_ids.remove(track_id);
			ended.send_replace(Some(reason));
		}
		Some(entry)
	}

	/// Fail everything outstanding with [Error::Closed].
	pub fn drain(&mut self) {
		for (_, announce) in self.announces.drain() {
			if let LocalAnnounce::Pending(tx) = announce {
				let _ = tx.send(Err(Error::Closed));
			}
		}

		for (_, subscribe) in self.subscribes.drain() {
			match subscribe {
				LocalSubscribe::Pending(tx) => {
					let _ = tx.send(Err(Error::Closed));
				}
				LocalSubscribe::Active { events, .. } => {
					let _ = events.send(TrackEvent::Done(Err(Error::Closed)));
				}
				LocalSubscribe::Ended => {}
			}
		}

		for (_, publish) in self.publishes.drain() {
			if let RemoteSubscribe::Active { ended, .. } = publish {
				ended.send_replace(Some(Error::Closed));
			}
		}

		self.announced.clear();
		self.aliases.clear();
		self.track_ids.clear();
	}
}
