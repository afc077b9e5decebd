//! ## Twitch chat
//!
//! [`ChatMessage`] is a typed `PRIVMSG` with its emotes already resolved.
//!
//! With the `client` feature, [`ChatClient`] connects to Twitch IRC
//! through a [`crate::transport::Connector`], performs the handshake,
//! and turns the incoming frames into [`ChatEvent`]s.
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use twitch_feed::chat::{ChatClient, ChatEvent, Config};
//! use twitch_feed::transport::WsConnector;
//!
//! let config = Config::default().channels(["pajlada"]);
//! let mut client = ChatClient::connect(config, WsConnector::chat()).await?;
//!
//! while let Some(event) = client.recv().await {
//!   if let ChatEvent::Message(message) = event {
//!     println!("{}: {}", message.sender().login(), message.text());
//!   }
//! }
//! # Ok(())
//! # }
//! ```

mod message;

#[cfg(feature = "client")]
mod client;

pub use message::{Badge, BadgeData, ChatMessage, ClearTarget, User};

#[cfg(feature = "client")]
pub use client::{
  ChatClient, ChatEvent, ChatHandle, Closed, Config, ConnectError, Credentials, SendError,
};

use crate::keepalive::KeepAliveConfig;
use std::time::Duration;

/// Default keep-alive timing for chat.
///
/// Twitch closes idle connections after about five minutes,
/// but a dead connection should be noticed well before that.
pub const DEFAULT_KEEPALIVE: KeepAliveConfig = KeepAliveConfig {
  ping_interval: Duration::from_secs(60),
  ping_jitter: Duration::from_secs(5),
  pong_timeout: Duration::from_secs(10),
};

/// Normalize a channel name: no leading `#`, lowercase.
pub fn channel_name(channel: &str) -> String {
  channel.trim_start_matches('#').to_ascii_lowercase()
}
