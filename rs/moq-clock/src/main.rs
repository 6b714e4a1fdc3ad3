use anyhow::Context;
use clap::{Parser, Subcommand};
use url::Url;

use moq_transport_native::moq_transport::{RejectCode, Role, Session, SessionConfig};
use moq_transport_native::{ClientConfig, Connection, ServerConfig};

mod clock;

#[derive(Parser, Clone)]
pub struct Config {
	/// The namespace the clock is announced under.
	#[arg(long, default_value = "clock")]
	pub namespace: String,

	/// The name of the clock track.
	#[arg(long, default_value = "second")]
	pub track: String,

	/// The log configuration.
	#[command(flatten)]
	pub log: moq_transport_native::Log,

	/// Whether to serve the clock or consume it.
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
	/// Accept sessions and publish the clock on each of them.
	Serve {
		#[command(flatten)]
		server: ServerConfig,
	},
	/// Connect to a server and print every tick.
	Subscribe {
		/// Connect to the given URL, starting with moqt:// for QUIC or https:// for WebTransport.
		#[arg(long)]
		url: Url,

		#[command(flatten)]
		client: ClientConfig,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = Config::parse();
	config.log.init();

	let Config {
		namespace, track, command, ..
	} = config;

	match command {
		Command::Serve { server } => {
			let server = server.init()?;
			let session = SessionConfig::default().with_role(Role::Publisher);

			server
				.listen(session, move |session: Session<Connection>| {
					serve(session, namespace.clone(), track.clone())
				})
				.await
		}
		Command::Subscribe { url, client } => {
			let client = client.init()?;

			tracing::info!(%url, "connecting to server");

			let session = client
				.connect(url, SessionConfig::default().with_role(Role::Subscriber))
				.await?;
			subscribe(session, &namespace, &track).await
		}
	}
}

async fn serve(session: Session<Connection>, namespace: String, track: String) -> anyhow::Result<()> {
	session.announce(&namespace).await.context("failed to announce")?;
	tracing::info!(%namespace, "announced");

	loop {
		let subscription = match session.read_subscription().await {
			Ok(subscription) => subscription,
			Err(err) if err.is_closed() => return Ok(()),
			Err(err) => return Err(err.into()),
		};

		if subscription.namespace() != namespace || subscription.name() != track {
			tracing::warn!(namespace = subscription.namespace(), name = subscription.name(), "unknown track");
			subscription.reject(RejectCode::NotFound.into(), "unknown track")?;
			continue;
		}

		let track = subscription.accept()?;
		tracing::info!(id = track.id(), "publishing clock");

		tokio::spawn(async move {
			if let Err(err) = clock::Publisher::new(track).run().await {
				tracing::warn!(?err, "clock stopped");
			}
		});
	}
}

async fn subscribe(session: Session<Connection>, namespace: &str, track: &str) -> anyhow::Result<()> {
	let track = session.subscribe(namespace, track).await.context("failed to subscribe")?;
	let clock = clock::Subscriber::new(track);

	tokio::select! {
		res = clock.run() => res,
		res = accept_announcements(session.clone()) => res,
		res = session.run() => res.context("session closed"),
	}
}

async fn accept_announcements(session: Session<Connection>) -> anyhow::Result<()> {
	loop {
		let announcement = session.read_announcement().await?;
		tracing::info!(namespace = announcement.namespace(), "accepting announcement");
		announcement.accept()?;
	}
}
