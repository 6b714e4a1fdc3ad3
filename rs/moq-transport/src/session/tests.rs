use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};

use futures::FutureExt;
use tracing_test::traced_test;

use crate::{
	coding::{DecodeError, Encode, Stream, Writer},
	message::{self, Control, ObjectHeader, Role, Version, VersionCode, Versions},
	transport::{
		mem::{self, MemConnection},
		Connection,
	},
	Error, ReceiveTrack, SendTrack, Session, SessionConfig, Stats, Status, Unsolicited,
};

type Mem = Session<MemConnection>;

async fn setup_with(client: SessionConfig, server: SessionConfig) -> (Mem, Mem) {
	let (a, b) = mem::pair();
	let (client, server) = tokio::join!(Session::connect(a, client), Session::accept(b, server));
	(client.unwrap(), server.unwrap())
}

async fn setup() -> (Mem, Mem) {
	setup_with(SessionConfig::default(), SessionConfig::default()).await
}

// The client subscribes to clock/second and the server accepts.
async fn subscribed(client: &Mem, server: &Mem) -> (SendTrack<MemConnection>, ReceiveTrack<MemConnection>) {
	let accept = async { server.read_subscription().await.unwrap().accept().unwrap() };
	let (recv, send) = tokio::join!(client.subscribe("clock", "second"), accept);
	(send, recv.unwrap())
}

// A hand-driven client, to send exactly the messages a test needs.
async fn raw_client(conn: &MemConnection, role: Role) -> Stream<MemConnection, Version> {
	let mut stream = Stream::open(conn, Version::Draft01).await.unwrap();
	let setup = message::ClientSetup {
		versions: Version::SUPPORTED.into(),
		role,
		path: None,
		implementation: None,
	};
	stream.writer.encode(&Control::from(setup)).await.unwrap();

	let reply: Control = stream.reader.decode().await.unwrap();
	assert!(matches!(reply, Control::ServerSetup(_)));

	stream
}

// Control messages are handled in order, so everything `from` sent before this has been handled by `to`.
async fn barrier(from: &Mem, to: &Mem, namespace: &str) {
	let accept = async { to.read_announcement().await.unwrap().accept().unwrap() };
	let (res, ()) = tokio::join!(from.announce(namespace), accept);
	res.unwrap();
}

fn announce(namespace: &str) -> Control {
	message::Announce {
		namespace: namespace.into(),
		auth: None,
	}
	.into()
}

#[derive(Default)]
struct Counter {
	rx: AtomicU64,
	tx: AtomicU64,
	dropped: AtomicU64,
}

impl Stats for Counter {
	fn add_rx_bytes(&self, bytes: u64) {
		self.rx.fetch_add(bytes, Ordering::Relaxed);
	}

	fn add_tx_bytes(&self, bytes: u64) {
		self.tx.fetch_add(bytes, Ordering::Relaxed);
	}

	fn add_dropped_object(&self) {
		self.dropped.fetch_add(1, Ordering::Relaxed);
	}
}

#[tokio::test]
async fn announce_accepted() {
	let (client, server) = setup().await;

	let read = async {
		let announcement = client.read_announcement().await.unwrap();
		assert_eq!(announcement.namespace(), "clock");
		announcement.accept().unwrap();
	};

	let (res, ()) = tokio::join!(server.announce("clock"), read);
	res.unwrap();

	assert_eq!(client.status(), Status::Established);
	assert_eq!(server.status(), Status::Established);
	assert_eq!(client.peer_role(), Role::Both);
}

#[tokio::test]
async fn subscribe_and_read() {
	let counter = Arc::new(Counter::default());
	let (client, server) = setup_with(
		SessionConfig::default().with_stats(counter.clone()),
		SessionConfig::default(),
	)
	.await;

	let publish = async {
		let subscription = server.read_subscription().await.unwrap();
		assert_eq!(subscription.namespace(), "clock");
		assert_eq!(subscription.name(), "second");

		let mut track = subscription.accept().unwrap();
		let mut object = track.start_reliable_object().await.unwrap();
		object.write(b"2024-05-01 12:00:00").await.unwrap();
		object.finish().unwrap();

		track
	};

	let (res, _track) = tokio::join!(client.subscribe("clock", "second"), publish);
	let mut track = res.unwrap();

	let mut buf = [0u8; 64];
	let size = track.read(&mut buf).await.unwrap();
	assert_eq!(&buf[..size], b"2024-05-01 12:00:00");
	assert_eq!(counter.rx.load(Ordering::Relaxed), size as u64);
}

#[tokio::test]
async fn rejected_subscribe_frees_id() {
	let (client, server) = setup().await;

	let reject = async {
		let subscription = server.read_subscription().await.unwrap();
		assert_eq!(subscription.id(), 0);
		subscription.reject(404, "unknown namespace").unwrap();
	};

	let (res, ()) = tokio::join!(client.subscribe("nope", "second"), reject);
	let Err(err) = res else {
		panic!("subscribe should fail");
	};
	assert!(matches!(&err, Error::Rejected { code: 404, .. }));
	assert!(err.to_string().contains("unknown namespace"));

	let (send, recv) = subscribed(&client, &server).await;
	assert_eq!(recv.id(), 0);
	assert_eq!(send.id(), 0);
}

#[tokio::test]
async fn live_ids_are_not_reused() {
	let (client, server) = setup().await;

	let (_send0, recv0) = subscribed(&client, &server).await;
	let (_send1, recv1) = subscribed(&client, &server).await;
	assert_eq!(recv0.id(), 0);
	assert_eq!(recv1.id(), 1);

	drop(recv0);
	let (_send2, recv2) = subscribed(&client, &server).await;
	assert_eq!(recv2.id(), 0);
}

#[tokio::test]
async fn reset_object_keeps_track() {
	let (client, server) = setup().await;
	let (mut send, mut recv) = subscribed(&client, &server).await;

	let mut object = send.start_cancellable_object().await.unwrap();
	assert!(object.is_cancellable());
	object.write(b"partial").await.unwrap();
	object.reset(7);

	let mut buf = [0u8; 64];
	let size = recv.read(&mut buf).await.unwrap();
	assert_eq!(&buf[..size], b"partial");

	let err = recv.read(&mut buf).await.unwrap_err();
	assert!(matches!(err, Error::Reset(7)));

	let mut object = send.start_cancellable_object().await.unwrap();
	object.write(b"next").await.unwrap();
	object.finish().unwrap();

	let size = recv.read(&mut buf).await.unwrap();
	assert_eq!(&buf[..size], b"next");
	assert_eq!(client.status(), Status::Established);
}

#[tokio::test]
async fn close_unblocks_subscribe() {
	let (client, server) = setup().await;

	let close = async {
		let _subscription = server.read_subscription().await.unwrap();
		server.close(0, "bye");
	};

	let subscribe = tokio::time::timeout(Duration::from_secs(5), client.subscribe("clock", "second"));
	let (res, ()) = tokio::join!(subscribe, close);

	let res = res.expect("subscribe should not hang");
	assert!(matches!(res, Err(Error::Closed)));

	assert!(server.run().await.is_ok());
	client.run().await.unwrap_err();
	assert_eq!(client.status(), Status::Closed);
	assert!(matches!(client.read_announcement().await, Err(Error::Closed)));
}

#[tokio::test]
async fn close_unblocks_read() {
	let (client, server) = setup().await;
	let (_send, mut recv) = subscribed(&client, &server).await;

	let read = async {
		let mut buf = [0u8; 16];
		recv.read(&mut buf).await
	};

	let (res, ()) = tokio::join!(read, async { client.close(0, "done") });
	assert!(matches!(res, Err(Error::Closed)));
}

#[tokio::test]
async fn duplicate_local_announce() {
	let (client, server) = setup().await;

	let first = server.announce("clock");
	tokio::pin!(first);
	assert!(futures::poll!(&mut first).is_pending());

	assert!(matches!(server.announce("clock").await, Err(Error::Duplicate)));

	let accept = async { client.read_announcement().await.unwrap().accept().unwrap() };
	let (res, ()) = tokio::join!(first, accept);
	res.unwrap();

	server.unannounce("clock").unwrap();
	assert!(matches!(server.unannounce("clock"), Err(Error::NotFound)));
}

#[tokio::test]
async fn duplicate_remote_announce() {
	let (a, b) = mem::pair();
	let (mut raw, server) = tokio::join!(raw_client(&a, Role::Publisher), Session::accept(b, SessionConfig::default()));
	let server = server.unwrap();

	raw.writer.encode(&announce("clock")).await.unwrap();
	raw.writer.encode(&announce("clock")).await.unwrap();

	let reply: Control = raw.reader.decode().await.unwrap();
	let Control::AnnounceError(err) = reply else {
		panic!("expected announce error, got {reply:?}");
	};
	assert_eq!(err.namespace, "clock");
	assert_eq!(err.code, 0x1);

	server.read_announcement().await.unwrap().accept().unwrap();

	let reply: Control = raw.reader.decode().await.unwrap();
	assert_eq!(
		reply,
		Control::AnnounceOk(message::AnnounceOk {
			namespace: "clock".into()
		})
	);
	assert_eq!(server.status(), Status::Established);
}

#[tokio::test]
#[traced_test]
async fn resolved_once() {
	let (a, b) = mem::pair();
	let (mut raw, server) = tokio::join!(raw_client(&a, Role::Publisher), Session::accept(b, SessionConfig::default()));
	let server = server.unwrap();

	raw.writer.encode(&announce("a")).await.unwrap();
	raw.writer.encode(&announce("b")).await.unwrap();

	server.read_announcement().await.unwrap().reject(5, "no").unwrap();
	drop(server.read_announcement().await.unwrap());
	assert!(logs_contain("announcement dropped without a response"));

	raw.writer.encode(&announce("c")).await.unwrap();
	server.read_announcement().await.unwrap().accept().unwrap();

	let expected = [
		Control::AnnounceError(message::AnnounceError {
			namespace: "a".into(),
			code: 5,
			reason: "no".into(),
		}),
		Control::AnnounceError(message::AnnounceError {
			namespace: "b".into(),
			code: 0,
			reason: "not accepted".into(),
		}),
		Control::AnnounceOk(message::AnnounceOk { namespace: "c".into() }),
	];

	for expected in expected {
		let reply: Control = raw.reader.decode().await.unwrap();
		assert_eq!(reply, expected);
	}
}

#[tokio::test]
async fn unknown_track_is_dropped() {
	let counter = Arc::new(Counter::default());
	let (client, server) = setup_with(
		SessionConfig::default().with_stats(counter.clone()),
		SessionConfig::default(),
	)
	.await;

	// One write, so the header and payload arrive before the receiver stops the stream.
	let header = ObjectHeader {
		track_id: 99,
		group: 0,
		object: 0,
		send_order: 0,
	};
	let mut buf = header.encode_bytes(Version::Draft01).to_vec();
	buf.extend_from_slice(b"lost");

	let mut stray = Writer::new(server.connection().open_uni().await.unwrap(), Version::Draft01);
	stray.write_all(&mut &buf[..]).await.unwrap();
	stray.finish().unwrap();

	// The stray's header was sent with it, long before this object's stream was opened.
	let (mut send, mut recv) = subscribed(&client, &server).await;
	let mut object = send.start_reliable_object().await.unwrap();
	object.write(b"found").await.unwrap();
	object.finish().unwrap();

	assert_eq!(recv.read_object().await.unwrap().unwrap(), &b"found"[..]);
	assert_eq!(counter.dropped.load(Ordering::Relaxed), 1);
	assert_eq!(client.status(), Status::Established);
}

#[tokio::test]
async fn objects_arrive_in_order() {
	let counter = Arc::new(Counter::default());
	let (client, server) = setup_with(
		SessionConfig::default(),
		SessionConfig::default().with_stats(counter.clone()),
	)
	.await;
	let (mut send, mut recv) = subscribed(&client, &server).await;

	// Open every stream before writing any payload, and finish them in reverse.
	let mut objects = Vec::new();
	for _ in 0..3 {
		objects.push(send.start_reliable_object().await.unwrap());
	}
	for object in objects.iter_mut().rev() {
		let payload = object.header().object.to_string();
		object.write(payload.as_bytes()).await.unwrap();
	}
	for object in objects.into_iter().rev() {
		object.finish().unwrap();
	}

	for expected in 0..3u64 {
		let mut object = recv.next_object().await.unwrap().unwrap();
		assert_eq!(object.header().object, expected);
		assert_eq!(object.header().track_id, recv.track_id());
		assert_eq!(object.read_all().await.unwrap(), expected.to_string().as_bytes());
	}

	assert_eq!(counter.tx.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn groups_restart_object_sequence() {
	let (client, server) = setup().await;
	let (mut send, mut recv) = subscribed(&client, &server).await;

	send.start_reliable_object().await.unwrap().finish().unwrap();
	assert_eq!(send.next_group(), 1);
	send.start_reliable_object().await.unwrap().finish().unwrap();

	let first = recv.next_object().await.unwrap().unwrap();
	let second = recv.next_object().await.unwrap().unwrap();
	assert_eq!((first.header().group, first.header().object), (0, 0));
	assert_eq!((second.header().group, second.header().object), (1, 0));
}

#[tokio::test]
async fn datagram_object() {
	let (client, server) = setup().await;
	let (mut send, mut recv) = subscribed(&client, &server).await;

	send.send_datagram(bytes::Bytes::from_static(b"tick")).unwrap();

	let mut object = recv.next_object().await.unwrap().unwrap();
	assert_eq!(object.header().object, 0);
	assert_eq!(object.read_all().await.unwrap(), &b"tick"[..]);
}

#[tokio::test]
async fn role_violation_is_fatal() {
	let (a, b) = mem::pair();
	let (mut raw, server) = tokio::join!(raw_client(&a, Role::Subscriber), Session::accept(b, SessionConfig::default()));
	let server = server.unwrap();

	// A subscriber may not announce.
	raw.writer.encode(&announce("clock")).await.unwrap();

	let err = server.run().await.unwrap_err();
	assert!(matches!(err, Error::ProtocolViolation(_)));
	assert_eq!(a.close_reason().unwrap().code, 0x3);
}

#[tokio::test]
async fn local_role_is_enforced() {
	let (client, server) = setup_with(
		SessionConfig::default().with_role(Role::Subscriber),
		SessionConfig::default().with_role(Role::Publisher),
	)
	.await;

	assert!(matches!(client.announce("clock").await, Err(Error::InvalidRole)));
	assert!(matches!(server.subscribe("clock", "second").await, Err(Error::InvalidRole)));
	assert!(matches!(client.goaway("moqt://elsewhere"), Err(Error::InvalidRole)));
}

#[tokio::test]
async fn incompatible_roles() {
	let (a, b) = mem::pair();
	let publisher = SessionConfig::default().with_role(Role::Publisher);
	let (client, server) = tokio::join!(Session::connect(a.clone(), publisher.clone()), Session::accept(b, publisher));

	assert!(matches!(server, Err(Error::InvalidRole)));
	assert!(client.is_err());
	assert_eq!(a.close_reason().unwrap().code, 0x3);
}

#[tokio::test]
async fn unsupported_version() {
	let (a, b) = mem::pair();

	let offer = async {
		let mut stream = Stream::open(&a, Version::Draft01).await.unwrap();
		let setup = message::ClientSetup {
			versions: Versions::from(vec![VersionCode(0xff000099)]),
			role: Role::Both,
			path: None,
			implementation: None,
		};
		stream.writer.encode(&Control::from(setup)).await.unwrap();
		stream
	};

	let (_stream, server) = tokio::join!(offer, Session::accept(b, SessionConfig::default()));
	assert!(matches!(server, Err(Error::Version(..))));

	let closed = a.close_reason().unwrap();
	assert_eq!(closed.code, 0x6);
	assert_eq!(closed.reason, "unsupported version");
}

#[tokio::test]
async fn unsolicited_subscribe_rejected() {
	let (client, server) = setup_with(
		SessionConfig::default(),
		SessionConfig::default().with_unsolicited(Unsolicited::Reject),
	)
	.await;

	let Err(err) = client.subscribe("clock", "second").await else {
		panic!("subscribe should be rejected");
	};
	assert!(matches!(err, Error::Rejected { code: 0x2, .. }));

	let accept = async { client.read_announcement().await.unwrap().accept().unwrap() };
	let (res, ()) = tokio::join!(server.announce("clock"), accept);
	res.unwrap();

	let (_send, recv) = subscribed(&client, &server).await;
	assert_eq!(recv.namespace(), "clock");
}

#[tokio::test]
async fn track_id_override() {
	let (client, server) = setup().await;

	let accept = async {
		let mut subscription = server.read_subscription().await.unwrap();
		subscription.set_track_id(42).unwrap();
		subscription.accept().unwrap()
	};

	let (recv, mut send) = tokio::join!(client.subscribe("clock", "second"), accept);
	let mut recv = recv.unwrap();
	assert_eq!(recv.track_id(), 42);
	assert_eq!(send.track_id(), 42);

	let mut object = send.start_reliable_object().await.unwrap();
	object.write(b"routed").await.unwrap();
	object.finish().unwrap();

	assert_eq!(recv.read_object().await.unwrap().unwrap(), &b"routed"[..]);
}

#[tokio::test]
async fn duplicate_track_id_on_accept() {
	let (client, server) = setup().await;
	let (_send, _recv) = subscribed(&client, &server).await;

	let accept = async {
		let mut subscription = server.read_subscription().await.unwrap();
		subscription.set_track_id(0).unwrap();
		subscription.accept()
	};

	let (recv, send) = tokio::join!(client.subscribe("clock", "minute"), accept);
	assert!(matches!(send, Err(Error::Duplicate)));
	assert!(matches!(recv, Err(Error::Rejected { code: 0x1, .. })));
}

#[tokio::test]
async fn subscribe_done_ends_track() {
	let (client, server) = setup().await;
	let (mut send, mut recv) = subscribed(&client, &server).await;

	let mut object = send.start_reliable_object().await.unwrap();
	object.write(b"last").await.unwrap();
	object.finish().unwrap();
	assert_eq!(recv.read_object().await.unwrap().unwrap(), &b"last"[..]);

	send.close();

	let mut buf = [0u8; 16];
	assert_eq!(recv.read(&mut buf).await.unwrap(), 0);
	assert!(recv.next_object().await.unwrap().is_none());
}

#[tokio::test]
async fn unsubscribe_ends_send_track() {
	let (client, server) = setup().await;
	let (mut send, recv) = subscribed(&client, &server).await;

	drop(recv);

	assert!(matches!(send.unsubscribed().await, Error::Cancel));
	assert!(matches!(send.start_reliable_object().await, Err(Error::Cancel)));
}

#[tokio::test]
async fn goaway_reaches_client() {
	let (client, server) = setup().await;

	server.goaway("moqt://relay.example/next").unwrap();

	barrier(&server, &client, "clock").await;

	assert_eq!(client.goaway_uri().as_deref(), Some("moqt://relay.example/next"));
}

#[tokio::test]
async fn concurrent_subscribes_answered_out_of_order() {
	let (client, server) = setup().await;

	let answer = async {
		let first = server.read_subscription().await.unwrap();
		let other = server.read_subscription().await.unwrap();
		let (minute, second) = match first.name() {
			"minute" => (first, other),
			_ => (other, first),
		};
		assert_ne!(minute.id(), second.id());

		let send = second.accept().unwrap();
		minute.reject(404, "no minutes").unwrap();
		send
	};

	let (minute, second, _send) = tokio::join!(
		client.subscribe("clock", "minute"),
		client.subscribe("clock", "second"),
		answer
	);

	assert!(matches!(minute, Err(Error::Rejected { code: 404, .. })));
	let second = second.unwrap();
	assert_eq!(second.name(), "second");
	assert_eq!(client.status(), Status::Established);
}

#[tokio::test]
async fn concurrent_announces_answered_out_of_order() {
	let (client, server) = setup().await;

	let answer = async {
		let first = client.read_announcement().await.unwrap();
		let other = client.read_announcement().await.unwrap();
		let (a, b) = match first.namespace() {
			"a" => (first, other),
			_ => (other, first),
		};
		assert_eq!(b.namespace(), "b");

		b.accept().unwrap();
		a.reject(9, "not a").unwrap();
	};

	let (a, b, ()) = tokio::join!(server.announce("a"), server.announce("b"), answer);
	assert!(matches!(a, Err(Error::Rejected { code: 9, .. })));
	b.unwrap();

	server.unannounce("b").unwrap();
	assert!(matches!(server.unannounce("a"), Err(Error::NotFound)));
}

#[tokio::test]
async fn rejected_subscribe_leaves_reused_id_alone() {
	let (client, server) = setup().await;

	let mut nope = Box::pin(client.subscribe("nope", "second"));
	assert!(futures::poll!(&mut nope).is_pending());
	server.read_subscription().await.unwrap().reject(404, "unknown namespace").unwrap();
	barrier(&server, &client, "sync").await;

	// The rejected id is free again, and taken before the rejected caller looks at its reply.
	let (mut send, mut recv) = subscribed(&client, &server).await;
	assert_eq!(recv.id(), 0);

	assert!(matches!(nope.await, Err(Error::Rejected { code: 404, .. })));

	let mut object = send.start_reliable_object().await.unwrap();
	object.write(b"still here").await.unwrap();
	object.finish().unwrap();

	assert_eq!(recv.read_object().await.unwrap().unwrap(), &b"still here"[..]);
	assert_eq!(client.status(), Status::Established);
}

#[tokio::test]
async fn dropped_rejected_subscribe_leaves_reused_id_alone() {
	let (client, server) = setup().await;

	let mut nope = Box::pin(client.subscribe("nope", "second"));
	assert!(futures::poll!(&mut nope).is_pending());
	server.read_subscription().await.unwrap().reject(404, "unknown namespace").unwrap();
	barrier(&server, &client, "sync").await;

	let (mut send, _recv) = subscribed(&client, &server).await;

	// The reply is already in, so dropping the future must not unsubscribe the id's new owner.
	drop(nope);
	barrier(&client, &server, "sync").await;

	assert!(send.unsubscribed().now_or_never().is_none());
	send.start_reliable_object().await.unwrap().finish().unwrap();
}

#[tokio::test]
async fn dropped_subscribe_unsubscribes() {
	let (client, server) = setup().await;

	let mut pending = Box::pin(client.subscribe("clock", "second"));
	assert!(futures::poll!(&mut pending).is_pending());
	let subscription = server.read_subscription().await.unwrap();

	drop(pending);
	barrier(&client, &server, "sync").await;

	assert!(matches!(subscription.accept(), Err(Error::Cancel)));

	let (_send, recv) = subscribed(&client, &server).await;
	assert_eq!(recv.id(), 0);
}

#[tokio::test]
async fn dropped_announce_unannounces() {
	let (client, server) = setup().await;

	let mut pending = Box::pin(server.announce("clock"));
	assert!(futures::poll!(&mut pending).is_pending());
	let stale = client.read_announcement().await.unwrap();

	drop(pending);

	// Announcing again only works once the first one was withdrawn.
	let answer = async {
		let fresh = client.read_announcement().await.unwrap();
		assert!(matches!(stale.accept(), Err(Error::NotFound)));
		fresh.accept().unwrap();
	};

	let (res, ()) = tokio::join!(server.announce("clock"), answer);
	res.unwrap();
	server.unannounce("clock").unwrap();
}

#[tokio::test]
async fn rejected_announce_leaves_new_announce_alone() {
	let (client, server) = setup().await;

	let mut first = Box::pin(server.announce("clock"));
	assert!(futures::poll!(&mut first).is_pending());
	client.read_announcement().await.unwrap().reject(5, "not yet").unwrap();
	barrier(&client, &server, "sync").await;

	let mut second = Box::pin(server.announce("clock"));
	assert!(futures::poll!(&mut second).is_pending());

	assert!(matches!(first.await, Err(Error::Rejected { code: 5, .. })));

	client.read_announcement().await.unwrap().accept().unwrap();
	tokio::time::timeout(Duration::from_secs(5), second)
		.await
		.expect("announce should be answered")
		.unwrap();
}

#[tokio::test]
async fn stale_subscription_cannot_answer_reused_id() {
	let (client, server) = setup().await;

	let mut old = Box::pin(client.subscribe("clock", "old"));
	assert!(futures::poll!(&mut old).is_pending());
	let stale = server.read_subscription().await.unwrap();
	assert_eq!(stale.id(), 0);
	drop(old);

	let answer = async {
		let fresh = server.read_subscription().await.unwrap();
		assert_eq!((fresh.id(), fresh.name()), (0, "new"));
		assert!(matches!(stale.accept(), Err(Error::Cancel)));
		fresh.accept().unwrap()
	};

	let (recv, mut send) = tokio::join!(client.subscribe("clock", "new"), answer);
	let mut recv = recv.unwrap();
	assert_eq!(send.name(), "new");
	assert_eq!(recv.name(), "new");

	let mut object = send.start_reliable_object().await.unwrap();
	object.write(b"new").await.unwrap();
	object.finish().unwrap();
	assert_eq!(recv.read_object().await.unwrap().unwrap(), &b"new"[..]);
}

#[tokio::test]
async fn oversized_track_id_and_codes_are_refused() {
	let (client, server) = setup().await;

	let answer = async {
		let mut subscription = server.read_subscription().await.unwrap();
		let err = subscription.set_track_id(u64::MAX).unwrap_err();
		assert!(matches!(err, Error::Decode(DecodeError::BoundsExceeded)));
		assert_eq!(subscription.track_id(), subscription.id());

		// Unresolved, so dropping it answers with the default code.
		assert!(subscription.reject(1 << 62, "too big").is_err());
	};

	let (res, ()) = tokio::join!(client.subscribe("clock", "second"), answer);
	assert!(matches!(res, Err(Error::Rejected { code: 0, .. })));

	let answer = async {
		let announcement = client.read_announcement().await.unwrap();
		assert!(announcement.reject(u64::MAX, "too big").is_err());
	};

	let (res, ()) = tokio::join!(server.announce("clock"), answer);
	assert!(matches!(res, Err(Error::Rejected { code: 0, .. })));

	let (send, mut recv) = subscribed(&client, &server).await;
	assert!(send.close_with_error(u64::MAX, "too big").is_err());

	let mut buf = [0u8; 16];
	assert_eq!(recv.read(&mut buf).await.unwrap(), 0);
	assert_eq!(server.status(), Status::Established);
}

#[tokio::test]
async fn stalled_header_only_delays_its_own_stream() {
	let (client, server) = setup().await;
	let (mut send, mut recv) = subscribed(&client, &server).await;

	// Opened first, but its header never arrives.
	let _stalled = server.connection().open_uni().await.unwrap();

	let mut object = send.start_reliable_object().await.unwrap();
	object.write(b"on time").await.unwrap();
	object.finish().unwrap();

	let payload = tokio::time::timeout(Duration::from_secs(2), recv.read_object())
		.await
		.expect("object should not wait for another stream's header");
	assert_eq!(payload.unwrap().unwrap(), &b"on time"[..]);
}
