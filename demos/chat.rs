//! Print chat messages with their emotes.
//!
//! ```text,ignore
//! $ cargo run --example chat -- \
//!   --login mybot --token oauth:yfvzjqb705z12hrhy1zkwa9xt7v662 \
//!   --channel #forsen
//! ```

use anyhow::Result;
use clap::Parser;
use twitch_feed::chat::{ChatClient, ChatEvent, Config, Credentials};
use twitch_feed::transport::WsConnector;

#[derive(Parser)]
#[command(author, version)]
struct Args {
  /// Login name, required with `--token`
  #[arg(long, requires = "token")]
  login: Option<String>,

  /// Login oauth2 token
  #[arg(long, requires = "login")]
  token: Option<String>,

  /// Channels to join
  #[arg(long)]
  channel: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let args = Args::parse();
  let credentials = match (args.login, args.token) {
    (Some(login), Some(token)) => Credentials::new(login, token),
    _ => Credentials::anon(),
  };
  let config = Config::default()
    .credentials(credentials)
    .channels(args.channel);

  let mut client = ChatClient::connect(config, WsConnector::chat()).await?;
  let handle = client.handle().clone();

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        handle.close();
      }
      event = client.recv() => match event {
        Some(ChatEvent::Message(msg)) => {
          println!("#{} {}: {}", msg.channel(), msg.sender().name(), msg.text());
          for emote in msg.emotes() {
            println!("  {} [{}..={}] {}", emote.display_name, emote.start_index, emote.end_index, emote.url);
          }
          if !handle.is_anon() && msg.text().starts_with("!yo") {
            handle.send(msg.channel(), "yo")?;
          }
        }
        Some(ChatEvent::Notice { channel, text, .. }) => {
          println!("NOTICE {}: {text}", channel.as_deref().unwrap_or("*"));
        }
        Some(ChatEvent::Reconnecting { reason }) => println!("reconnecting: {reason}"),
        Some(ChatEvent::Closed) | None => break,
        Some(_) => {}
      }
    }
  }

  Ok(())
}
