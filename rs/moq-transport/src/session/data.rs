use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{stream::FuturesUnordered, FutureExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
	coding::Reader,
	message::{ObjectDatagram, ObjectHeader, Version},
	session::Shared,
	stats::Stats,
	track::{ObjectReader, TrackEvent},
	transport::{Connection, RecvStream},
	Error,
};

/// How long a peer may take to send the header of a new object stream.
const HEADER_TIMEOUT: Duration = Duration::from_secs(10);

/// Chunks buffered per object before the stream is no longer read.
const CHUNK_BACKLOG: usize = 16;

const CHUNK_SIZE: usize = 64 * 1024;

/// Accept object streams and datagrams, routing each to its receive track.
///
/// Headers are read concurrently and each object is handed over as soon as its header arrives, so a stream that is
/// slow to send its header only delays itself. Headers that are ready together are handed over in the order their
/// streams were accepted.
pub(crate) async fn run<C: Connection>(shared: &Shared<C>) -> Result<(), Error> {
	let mut headers = FuturesUnordered::new();
	let mut sequence = 0u64;
	let mut datagrams = true;

	loop {
		tokio::select! {
			res = shared.conn.accept_uni() => {
				let stream = Reader::new(res?, shared.version);
				headers.push(read_header(sequence, stream));
				sequence += 1;
			}
			res = shared.conn.recv_datagram(), if datagrams => match res {
				Ok(datagram) => shared.recv_datagram(datagram),
				Err(err) => {
					// The connection closing is noticed by accept_uni.
					tracing::debug!(%err, "no longer receiving datagrams");
					datagrams = false;
				}
			},
			Some(first) = headers.next() => {
				let mut ready = vec![first];
				while let Some(Some(next)) = headers.next().now_or_never() {
					ready.push(next);
				}
				ready.sort_by_key(|(sequence, _)| *sequence);

				for (_, res) in ready {
					if let Some((header, stream)) = res {
						shared.recv_object(header, stream);
					}
				}
			}
		}
	}
}

type Header<S> = Option<(ObjectHeader, Reader<S, Version>)>;

async fn read_header<S: RecvStream>(sequence: u64, mut stream: Reader<S, Version>) -> (u64, Header<S>) {
	let res = match tokio::time::timeout(HEADER_TIMEOUT, stream.decode::<ObjectHeader>()).await {
		Ok(Ok(header)) => Some((header, stream)),
		Ok(Err(err)) => {
			tracing::warn!(%err, "invalid object header");
			stream.abort(&err);
			None
		}
		Err(_) => {
			tracing::warn!("timed out waiting for object header");
			stream.abort(&Error::Cancel);
			None
		}
	};

	(sequence, res)
}

impl<C: Connection> Shared<C> {
	fn recv_object<S: RecvStream>(&self, header: ObjectHeader, mut stream: Reader<S, Version>) {
		tracing::trace!(?header, "received object header");

		let (tx, rx) = mpsc::channel(CHUNK_BACKLOG);
		let object = ObjectReader::new(header, rx);

		if self.route(header.track_id, TrackEvent::Object(object)).is_err() {
			// The subscriber may have just unsubscribed, so this is not fatal.
			tracing::warn!(track_id = header.track_id, "unknown track id, dropping object");
			self.dropped_object();
			stream.abort(&Error::UnknownTrack(header.track_id));
			return;
		}

		web_async::spawn(pump(stream, tx, self.config.stats.clone()));
	}

	fn recv_datagram(&self, datagram: Bytes) {
		let datagram = match ObjectDatagram::decode_datagram(datagram, self.version) {
			Ok(datagram) => datagram,
			Err(err) => {
				tracing::warn!(%err, "invalid object datagram");
				return;
			}
		};

		let header = datagram.header;
		let size = datagram.payload.len();
		tracing::trace!(?header, size, "received object datagram");

		let (tx, rx) = mpsc::channel(1);
		let _ = tx.try_send(Ok(datagram.payload));
		drop(tx);

		if self.route(header.track_id, TrackEvent::Object(ObjectReader::new(header, rx))).is_err() {
			tracing::warn!(track_id = header.track_id, "unknown track id, dropping datagram");
			self.dropped_object();
			return;
		}

		if let Some(stats) = &self.config.stats {
			stats.add_rx_bytes(size as u64);
		}
	}

	fn dropped_object(&self) {
		if let Some(stats) = &self.config.stats {
			stats.add_dropped_object();
		}
	}
}

// Feed one object's payload to its reader until the stream ends or the reader is dropped.
async fn pump<S: RecvStream>(
	mut stream: Reader<S, Version>,
	tx: mpsc::Sender<Result<Bytes, Error>>,
	stats: Option<Arc<dyn Stats>>,
) {
	loop {
		let res = tokio::select! {
			res = stream.read(CHUNK_SIZE) => res,
			_ = tx.closed() => Err(Error::Cancel),
		};

		match res {
			Ok(Some(chunk)) => {
				if let Some(stats) = &stats {
					stats.add_rx_bytes(chunk.len() as u64);
				}

				if tx.send(Ok(chunk)).await.is_err() {
					stream.abort(&Error::Cancel);
					return;
				}
			}
			Ok(None) => return,
			Err(err) => {
				stream.abort(&err);
				let _ = tx.send(Err(err)).await;
				return;
			}
		}
	}
}
