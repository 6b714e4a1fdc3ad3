//! The per-connection session engine.
//!
//! A [Session] performs the setup handshake on a bidirectional control stream, then spawns two background tasks:
//! one decodes and dispatches control messages in order, the other accepts object streams and datagrams and routes
//! them to receive tracks by track id. Neither task ever waits on the other.
//!
//! All tables are guarded by a single lock per session; API calls and the control task take it briefly and never
//! across an await.

mod announcement;
mod control;
mod data;
mod shared;
mod state;
mod subscription;

#[cfg(test)]
mod tests;

pub use announcement::*;
pub use state::Status;
pub use subscription::*;

pub(crate) use control::Outbox;
pub(crate) use shared::*;
pub(crate) use state::{Accepted, LocalAnnounce, LocalSubscribe, RemoteAnnounce, RemoteSubscribe, State};

use std::sync::Arc;

use num_enum::IntoPrimitive;

use crate::{
	coding::Stream,
	message::{self, Control, Role, Version, VersionCode, Versions},
	stats::Stats,
	track::ReceiveTrack,
	transport::Connection,
	Error, ErrorCode,
};

/// Codes we put in AnnounceError and SubscribeError when the engine answers on the application's behalf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive)]
#[repr(u64)]
pub enum RejectCode {
	/// The application dropped the request without answering it.
	Dropped = 0x0,
	Duplicate = 0x1,
	NotFound = 0x2,
}

/// What to do with a subscribe for a namespace we never announced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Unsolicited {
	/// Hand it to the application like any other subscription.
	#[default]
	Deliver,
	/// Reply SubscribeError without involving the application.
	Reject,
}

/// Options for a single session.
#[derive(Clone)]
pub struct SessionConfig {
	pub role: Role,
	pub unsolicited: Unsolicited,

	/// Sent in the CLIENT_SETUP path parameter; ignored by servers.
	pub path: Option<String>,

	pub implementation: Option<String>,
	pub stats: Option<Arc<dyn Stats>>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			role: Role::Both,
			unsolicited: Unsolicited::Deliver,
			path: None,
			implementation: Some("moq-transport-rs".into()),
			stats: None,
		}
	}
}

impl SessionConfig {
	pub fn with_role(mut self, role: Role) -> Self {
		self.role = role;
		self
	}

	pub fn with_unsolicited(mut self, unsolicited: Unsolicited) -> Self {
		self.unsolicited = unsolicited;
		self
	}

	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = Some(path.into());
		self
	}

	pub fn with_stats(mut self, stats: Arc<dyn Stats>) -> Self {
		self.stats = Some(stats);
		self
	}
}

/// A MoQ transport session over a single [Connection].
///
/// Created via:
/// - [Session::connect] for clients.
/// - [Session::accept] for servers.
///
/// Handles are cheap to clone and all refer to the same session.
/// The session runs in the background until either side closes it.
pub struct Session<C: Connection> {
	shared: Arc<Shared<C>>,
}

impl<C: Connection> Clone for Session<C> {
	fn clone(&self) -> Self {
		Self {
			shared: self.shared.clone(),
		}
	}
}

impl<C: Connection> Session<C> {
	/// Perform the setup handshake as a client.
	///
	/// On failure the connection is closed before the error is returned.
	pub async fn connect(conn: C, config: SessionConfig) -> Result<Self, Error> {
		match Self::connect_setup(conn.clone(), config).await {
			Ok(session) => Ok(session),
			Err(err) => {
				close_setup(&conn, &err);
				Err(err)
			}
		}
	}

	async fn connect_setup(conn: C, config: SessionConfig) -> Result<Self, Error> {
		let mut stream = Stream::open(&conn, Version::Draft01).await?;

		let client = message::ClientSetup {
			versions: Version::SUPPORTED.into(),
			role: config.role,
			path: config.path.clone(),
			implementation: config.implementation.clone(),
		};

		tracing::trace!(?client, "sending client setup");
		stream.writer.encode(&Control::from(client.clone())).await?;

		let server = match stream.reader.decode::<Control>().await? {
			Control::ServerSetup(server) => server,
			_ => return Err(Error::UnexpectedMessage),
		};
		tracing::trace!(?server, "received server setup");

		let version = Version::from_code(server.version.0)
			.filter(|v| client.versions.contains(&VersionCode::from(*v)))
			.ok_or_else(|| Error::Version(client.versions.clone(), Versions::from(vec![server.version])))?;

		check_roles(config.role, server.role)?;

		tracing::debug!(?version, role = ?server.role, "connected");

		Ok(Self::start(conn, stream, version, true, server.role, config))
	}

	/// Perform the setup handshake as a server, on a connection that was just accepted.
	///
	/// On failure the connection is closed before the error is returned.
	pub async fn accept(conn: C, config: SessionConfig) -> Result<Self, Error> {
		match Self::accept_setup(conn.clone(), config).await {
			Ok(session) => Ok(session),
			Err(err) => {
				close_setup(&conn, &err);
				Err(err)
			}
		}
	}

	async fn accept_setup(conn: C, config: SessionConfig) -> Result<Self, Error> {
		let mut stream = Stream::accept(&conn, Version::Draft01).await?;

		let client = match stream.reader.decode::<Control>().await? {
			Control::ClientSetup(client) => client,
			_ => return Err(Error::UnexpectedMessage),
		};
		tracing::trace!(?client, "received client setup");

		let version = client
			.versions
			.select()
			.ok_or_else(|| Error::Version(client.versions.clone(), Version::SUPPORTED.into()))?;

		check_roles(client.role, config.role)?;

		let server = message::ServerSetup {
			version: version.into(),
			role: config.role,
			implementation: config.implementation.clone(),
		};

		tracing::trace!(?server, "sending server setup");
		stream.writer.encode(&Control::from(server)).await?;

		tracing::debug!(?version, role = ?client.role, path = ?client.path, "accepted");

		Ok(Self::start(conn, stream, version, false, client.role, config))
	}

	fn start(
		conn: C,
		stream: Stream<C, Version>,
		version: Version,
		client: bool,
		remote: Role,
		config: SessionConfig,
	) -> Self {
		let (shared, outbox) = Shared::new(conn, version, client, remote, config);

		web_async::spawn(Shared::run_control(shared.clone(), stream, outbox));
		web_async::spawn(Shared::run_data(shared.clone()));

		Self { shared }
	}

	/// Our role, as sent during setup.
	pub fn role(&self) -> Role {
		self.shared.local
	}

	/// The peer's role, as received during setup.
	pub fn peer_role(&self) -> Role {
		self.shared.remote
	}

	pub fn version(&self) -> Version {
		self.shared.version
	}

	pub fn status(&self) -> Status {
		self.shared.state.lock().status
	}

	/// The underlying connection.
	pub fn connection(&self) -> &C {
		&self.shared.conn
	}

	/// Offer a namespace to the peer, waiting until it replies.
	///
	/// Fails with [Error::Duplicate] if the namespace is already announced or being announced,
	/// and with [Error::Rejected] if the peer replies AnnounceError.
	/// Dropping the future withdraws the announcement.
	pub async fn announce(&self, namespace: &str) -> Result<(), Error> {
		if !self.shared.local.is_publisher() || !self.shared.remote.is_subscriber() {
			return Err(Error::InvalidRole);
		}

		let (tx, rx) = tokio::sync::oneshot::channel();
		{
			let mut state = self.shared.state.lock();
			state.check()?;

			if state.announces.contains_key(namespace) {
				return Err(Error::Duplicate);
			}

			self.shared.outbox.send(message::Announce {
				namespace: namespace.to_string(),
				auth: None,
			})?;
			state.announces.insert(namespace.to_string(), LocalAnnounce::Pending(tx));
		}

		PendingAnnounce::new(&self.shared, namespace, rx).wait().await
	}

	/// Withdraw a namespace we announced.
	pub fn unannounce(&self, namespace: &str) -> Result<(), Error> {
		let mut state = self.shared.state.lock();
		state.check()?;

		// A pending announce is withdrawn by dropping the announce future instead.
		if !matches!(state.announces.get(namespace), Some(LocalAnnounce::Active)) {
			return Err(Error::NotFound);
		}

		state.announces.remove(namespace);
		self.shared.outbox.send(message::Unannounce {
			namespace: namespace.to_string(),
		})
	}

	/// Wait for the peer to announce a namespace.
	///
	/// Announcements arrive in the order they were received. Returns [Error::Closed] once the session is closed.
	pub async fn read_announcement(&self) -> Result<Announcement<C>, Error> {
		let announcement = self.shared.announcements.1.recv().await.map_err(|_| Error::Closed)?;

		let status = self.status();
		if status != Status::Established {
			return Err(Error::Closed);
		}

		Ok(announcement)
	}

	/// Request a track from the peer, waiting until it replies.
	///
	/// The request uses the lowest id that is not bound to a pending request or live receive track.
	/// Fails with [Error::Rejected] if the peer replies SubscribeError, which frees the id.
	/// Dropping the future unsubscribes.
	pub async fn subscribe(&self, namespace: &str, name: &str) -> Result<ReceiveTrack<C>, Error> {
		self.subscribe_auth(namespace, name, None).await
	}

	/// Like [Self::subscribe], carrying authorization info for the publisher.
	pub async fn subscribe_auth(
		&self,
		namespace: &str,
		name: &str,
		auth: Option<Vec<u8>>,
	) -> Result<ReceiveTrack<C>, Error> {
		if !self.shared.local.is_subscriber() || !self.shared.remote.is_publisher() {
			return Err(Error::InvalidRole);
		}

		let (tx, rx) = tokio::sync::oneshot::channel();
		let id = {
			let mut state = self.shared.state.lock();
			state.check()?;

			let id = state.next_track_id();
			self.shared.outbox.send(message::Subscribe {
				id,
				namespace: namespace.to_string(),
				name: name.to_string(),
				auth,
			})?;
			state.subscribes.insert(id, LocalSubscribe::Pending(tx));

			id
		};

		tracing::debug!(id, %namespace, %name, "subscribing");

		let accepted = PendingSubscribe::new(&self.shared, id, rx).wait().await?;

		Ok(ReceiveTrack::new(&self.shared, id, namespace, name, accepted))
	}

	/// Wait for the peer to subscribe to a track.
	///
	/// Subscriptions arrive in the order they were received. Returns [Error::Closed] once the session is closed.
	pub async fn read_subscription(&self) -> Result<Subscription<C>, Error> {
		let subscription = self.shared.subscriptions.1.recv().await.map_err(|_| Error::Closed)?;

		let status = self.status();
		if status != Status::Established {
			return Err(Error::Closed);
		}

		Ok(subscription)
	}

	/// Wait until the session is closed.
	///
	/// Returns `Ok` if it was closed cleanly by either side, or the error that ended it.
	/// The session keeps running if this future is dropped.
	pub async fn run(&self) -> Result<(), Error> {
		self.shared.closed().await;

		match self.shared.state.lock().error.clone() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	/// Close the session and the connection with an application error code.
	///
	/// Every blocked call fails with [Error::Closed]. Closing twice has no effect.
	pub fn close(&self, code: u32, reason: &str) {
		tracing::info!(code, %reason, "closing session");
		self.shared.terminate(code, reason, None);
	}

	/// Close the session with the code and message for the given error.
	pub fn close_with_error(&self, err: Error) {
		self.shared.terminate(err.to_code(), &err.to_string(), Some(err));
	}

	/// Ask the client to reconnect to a different URI. Only servers may send this.
	pub fn goaway(&self, uri: &str) -> Result<(), Error> {
		if self.shared.client {
			return Err(Error::InvalidRole);
		}

		self.shared.state.lock().check()?;
		self.shared.outbox.send(message::GoAway { uri: uri.to_string() })
	}

	/// The URI from the server's GOAWAY, if one was received.
	pub fn goaway_uri(&self) -> Option<String> {
		self.shared.state.lock().goaway.clone()
	}
}

fn check_roles(client: Role, server: Role) -> Result<(), Error> {
	match (client, server) {
		(Role::Publisher, Role::Publisher) | (Role::Subscriber, Role::Subscriber) => Err(Error::InvalidRole),
		_ => Ok(()),
	}
}

// Close the connection after a failed handshake.
fn close_setup<C: Connection>(conn: &C, err: &Error) {
	tracing::warn!(%err, "setup failed");

	match err {
		Error::Version(..) => conn.close(ErrorCode::SessionTerminated.into(), "unsupported version"),
		Error::InvalidRole => conn.close(err.to_code(), "incompatible roles"),
		_ => conn.close(ErrorCode::Generic.into(), "internal server error"),
	}
}
