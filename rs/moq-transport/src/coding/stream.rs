use crate::coding::{Reader, Writer};
use crate::transport::Connection;
use crate::Error;

/// A [Writer] and [Reader] pair for a single bidirectional stream, used for the control channel.
pub struct Stream<C: Connection, V> {
	pub writer: Writer<C::SendStream, V>,
	pub reader: Reader<C::RecvStream, V>,
}

impl<C: Connection, V> Stream<C, V> {
	/// Open a new stream with the given version.
	pub async fn open(conn: &C, version: V) -> Result<Self, Error>
	where
		V: Clone,
	{
		let (send, recv) = conn.open_bi().await?;

		let writer = Writer::new(send, version.clone());
		let reader = Reader::new(recv, version);

		Ok(Stream { writer, reader })
	}

	/// Accept a new stream with the given version.
	pub async fn accept(conn: &C, version: V) -> Result<Self, Error>
	where
		V: Clone,
	{
		let (send, recv) = conn.accept_bi().await?;

		let writer = Writer::new(send, version.clone());
		let reader = Reader::new(recv, version);

		Ok(Stream { writer, reader })
	}

	/// Cast the stream to a different version, used during version negotiation.
	pub fn with_version<O: Clone>(self, version: O) -> Stream<C, O> {
		Stream {
			writer: self.writer.with_version(version.clone()),
			reader: self.reader.with_version(version),
		}
	}
}
