use anyhow::Context;
use chrono::prelude::*;

use moq_transport_native::moq_transport::{ReceiveTrack, SendTrack};
use moq_transport_native::Connection;

pub struct Publisher {
	track: SendTrack<Connection>,
}

impl Publisher {
	pub fn new(track: SendTrack<Connection>) -> Self {
		Self { track }
	}

	/// Publish the time once a second, starting a new group every minute.
	pub async fn run(mut self) -> anyhow::Result<()> {
		let mut minute = Utc::now().minute();

		loop {
			let now = Utc::now();
			if now.minute() != minute {
				minute = now.minute();
				self.track.next_group();
			}

			// A late tick is worthless, so it's abandoned rather than retransmitted once the track ends.
			let mut object = self.track.start_cancellable_object().await?;
			object.write(now.format("%Y-%m-%d %H:%M:%S").to_string().as_bytes()).await?;
			object.finish()?;

			let next = now + chrono::TimeDelta::try_seconds(1).context("invalid delta")?;
			let next = next.with_nanosecond(0).context("invalid time")?;
			let delay = (next - Utc::now()).to_std().unwrap_or_default();

			tokio::select! {
				_ = tokio::time::sleep(delay) => {},
				err = self.track.unsubscribed() => {
					tracing::info!(%err, "subscriber left");
					return Ok(());
				}
			}
		}
	}
}

pub struct Subscriber {
	track: ReceiveTrack<Connection>,
}

impl Subscriber {
	pub fn new(track: ReceiveTrack<Connection>) -> Self {
		Self { track }
	}

	pub async fn run(mut self) -> anyhow::Result<()> {
		while let Some(object) = self.track.read_object().await? {
			println!("{}", String::from_utf8_lossy(&object));
		}

		Ok(())
	}
}
