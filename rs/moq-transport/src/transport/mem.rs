//! An in-memory [Connection] pair, used to run two sessions back to back in tests.

use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut, Bytes};
use tokio::sync::{mpsc, watch};

use crate::{
	transport::{Connection, RecvStream, SendStream},
	Error,
};

#[derive(Debug, Clone, thiserror::Error)]
#[error("connection closed: code={code} reason={reason}")]
pub struct ConnectionClosed {
	pub code: u32,
	pub reason: String,
}

type Closed = watch::Receiver<Option<ConnectionClosed>>;

async fn wait_closed(closed: &mut Closed) -> Error {
	loop {
		if let Some(err) = closed.borrow_and_update().clone() {
			return Error::Transport(Arc::new(err));
		}

		if closed.changed().await.is_err() {
			return Error::Transport(Arc::new(ConnectionClosed {
				code: 0,
				reason: "dropped".into(),
			}));
		}
	}
}

fn check_closed(closed: &Closed) -> Result<(), Error> {
	match closed.borrow().clone() {
		Some(err) => Err(Error::Transport(Arc::new(err))),
		None => Ok(()),
	}
}

enum Frame {
	Data(Bytes),
	Reset(u32),
}

fn stream(closed: Closed) -> (MemSend, MemRecv) {
	let (tx, rx) = mpsc::unbounded_channel();
	let stopped = Arc::new(Mutex::new(None));

	let send = MemSend {
		tx: Some(tx),
		stopped: stopped.clone(),
		closed: closed.clone(),
	};

	let recv = MemRecv {
		rx,
		buffer: Bytes::new(),
		stopped,
		closed,
	};

	(send, recv)
}

struct Inbox {
	uni: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemRecv>>,
	bi: tokio::sync::Mutex<mpsc::UnboundedReceiver<(MemSend, MemRecv)>>,
	datagrams: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

#[derive(Clone)]
struct Outbox {
	uni: mpsc::UnboundedSender<MemRecv>,
	bi: mpsc::UnboundedSender<(MemSend, MemRecv)>,
	datagrams: mpsc::UnboundedSender<Bytes>,
}

fn mailbox() -> (Outbox, Inbox) {
	let (uni_tx, uni_rx) = mpsc::unbounded_channel();
	let (bi_tx, bi_rx) = mpsc::unbounded_channel();
	let (datagrams_tx, datagrams_rx) = mpsc::unbounded_channel();

	let outbox = Outbox {
		uni: uni_tx,
		bi: bi_tx,
		datagrams: datagrams_tx,
	};

	let inbox = Inbox {
		uni: uni_rx.into(),
		bi: bi_rx.into(),
		datagrams: datagrams_rx.into(),
	};

	(outbox, inbox)
}

/// One end of an in-memory connection.
#[derive(Clone)]
pub struct MemConnection {
	inbox: Arc<Inbox>,
	outbox: Outbox,
	close: Arc<watch::Sender<Option<ConnectionClosed>>>,
}

/// Create a connected pair of endpoints.
pub fn pair() -> (MemConnection, MemConnection) {
	let (a_out, a_in) = mailbox();
	let (b_out, b_in) = mailbox();
	let close = Arc::new(watch::Sender::new(None));

	let a = MemConnection {
		inbox: Arc::new(b_in),
		outbox: a_out,
		close: close.clone(),
	};

	let b = MemConnection {
		inbox: Arc::new(a_in),
		outbox: b_out,
		close,
	};

	(a, b)
}

impl MemConnection {
	fn closed(&self) -> Closed {
		self.close.subscribe()
	}

	/// The close code and reason, once either side has closed.
	pub fn close_reason(&self) -> Option<ConnectionClosed> {
		self.close.borrow().clone()
	}
}

impl Connection for MemConnection {
	type SendStream = MemSend;
	type RecvStream = MemRecv;

	async fn open_uni(&self) -> Result<MemSend, Error> {
		let closed = self.closed();
		check_closed(&closed)?;

		let (send, recv) = stream(closed);
		self.outbox.uni.send(recv).map_err(|_| Error::Closed)?;
		Ok(send)
	}

	async fn accept_uni(&self) -> Result<MemRecv, Error> {
		let mut closed = self.closed();
		let mut uni = self.inbox.uni.lock().await;

		tokio::select! {
			biased;
			Some(recv) = uni.recv() => Ok(recv),
			err = wait_closed(&mut closed) => Err(err),
		}
	}

	async fn open_bi(&self) -> Result<(MemSend, MemRecv), Error> {
		let closed = self.closed();
		check_closed(&closed)?;

		let (local_send, remote_recv) = stream(closed.clone());
		let (remote_send, local_recv) = stream(closed);
		self.outbox
			.bi
			.send((remote_send, remote_recv))
			.map_err(|_| Error::Closed)?;

		Ok((local_send, local_recv))
	}

	async fn accept_bi(&self) -> Result<(MemSend, MemRecv), Error> {
		let mut closed = self.closed();
		let mut bi = self.inbox.bi.lock().await;

		tokio::select! {
			biased;
			Some(pair) = bi.recv() => Ok(pair),
			err = wait_closed(&mut closed) => Err(err),
		}
	}

	fn send_datagram(&self, payload: Bytes) -> Result<(), Error> {
		check_closed(&self.closed())?;
		self.outbox.datagrams.send(payload).map_err(|_| Error::Closed)
	}

	async fn recv_datagram(&self) -> Result<Bytes, Error> {
		let mut closed = self.closed();
		let mut datagrams = self.inbox.datagrams.lock().await;

		tokio::select! {
			biased;
			Some(datagram) = datagrams.recv() => Ok(datagram),
			err = wait_closed(&mut closed) => Err(err),
		}
	}

	fn close(&self, code: u32, reason: &str) {
		self.close.send_if_modified(|state| {
			if state.is_some() {
				return false;
			}

			*state = Some(ConnectionClosed {
				code,
				reason: reason.to_string(),
			});
			true
		});
	}
}

/// Dropping without [SendStream::finish] also finishes the stream, like quinn.
pub struct MemSend {
	tx: Option<mpsc::UnboundedSender<Frame>>,
	stopped: Arc<Mutex<Option<u32>>>,
	closed: Closed,
}

impl SendStream for MemSend {
	async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<usize, Error> {
		check_closed(&self.closed)?;

		if let Some(code) = *self.stopped.lock().unwrap() {
			return Err(Error::Reset(code));
		}

		let tx = self.tx.as_ref().ok_or(Error::Closed)?;
		let size = buf.remaining();
		let data = buf.copy_to_bytes(size);
		tx.send(Frame::Data(data)).map_err(|_| Error::Reset(0))?;

		Ok(size)
	}

	fn finish(&mut self) -> Result<(), Error> {
		self.tx.take().map(|_| ()).ok_or(Error::Closed)
	}

	fn reset(&mut self, code: u32) {
		if let Some(tx) = self.tx.take() {
			let _ = tx.send(Frame::Reset(code));
		}
	}
}

pub struct MemRecv {
	rx: mpsc::UnboundedReceiver<Frame>,
	buffer: Bytes,
	stopped: Arc<Mutex<Option<u32>>>,
	closed: Closed,
}

impl MemRecv {
	async fn fill(&mut self) -> Result<bool, Error> {
		while self.buffer.is_empty() {
			let frame = tokio::select! {
				biased;
				frame = self.rx.recv() => frame,
				err = wait_closed(&mut self.closed) => return Err(err),
			};

			match frame {
				Some(Frame::Data(data)) => self.buffer = data,
				Some(Frame::Reset(code)) => return Err(Error::Reset(code)),
				None => return Ok(false),
			}
		}

		Ok(true)
	}
}

impl RecvStream for MemRecv {
	async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> Result<Option<usize>, Error> {
		if !self.fill().await? {
			return Ok(None);
		}

		let size = buf.remaining_mut().min(self.buffer.len());
		buf.put(self.buffer.split_to(size));
		Ok(Some(size))
	}

	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, Error> {
		if !self.fill().await? {
			return Ok(None);
		}

		let size = max.min(self.buffer.len());
		Ok(Some(self.buffer.split_to(size)))
	}

	fn stop(&mut self, code: u32) {
		*self.stopped.lock().unwrap() = Some(code);
		self.rx.close();
	}
}
