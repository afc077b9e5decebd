//! Listen to PubSub topics and print every event.
//!
//! ```text,ignore
//! $ cargo run --example pubsub -- \
//!   --channel-id 12345 \
//!   --topic video-playback-by-id
//! ```

use anyhow::Result;
use clap::Parser;
use twitch_feed::pubsub::{Config, PubSub, PubSubEvent, StaticToken};
use twitch_feed::transport::WsConnector;

#[derive(Parser)]
#[command(author, version)]
struct Args {
  /// Used to qualify topics without a `.`
  #[arg(long)]
  channel_id: Option<String>,

  /// Oauth2 token, for topics which require one
  #[arg(long)]
  token: Option<String>,

  /// Topics to listen to
  #[arg(long, required = true)]
  topic: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let args = Args::parse();
  let mut config = Config::default();
  if let Some(channel_id) = args.channel_id {
    config = config.channel_id(channel_id);
  }
  if let Some(token) = args.token {
    config = config.token(StaticToken::new(token));
  }

  let (pubsub, mut events) = PubSub::connect(config, WsConnector::pubsub()).await?;
  for topic in &args.topic {
    pubsub.listen(topic)?;
  }

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        println!("{}", serde_json::to_string_pretty(&pubsub.snapshot().await?)?);
        pubsub.close();
      }
      event = events.recv() => match event {
        Some(PubSubEvent::Message { topic, payload, .. }) => println!("{topic}: {payload}"),
        Some(PubSubEvent::Closed) | None => break,
        Some(event) => println!("{event:?}"),
      }
    }
  }

  Ok(())
}
