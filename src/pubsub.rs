//! ## Twitch PubSub
//!
//! Topic negotiation and liveness for the PubSub feed.
//!
//! The protocol logic lives in [`Negotiator`] and [`crate::keepalive::KeepAlive`],
//! both of which are plain state machines. With the `client` feature,
//! [`PubSub`] drives them over a [`crate::transport::Connector`].
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use twitch_feed::pubsub::{Config, PubSub, PubSubEvent};
//! use twitch_feed::transport::WsConnector;
//!
//! let config = Config::default().channel_id("12345");
//! let (pubsub, mut events) = PubSub::connect(config, WsConnector::pubsub()).await?;
//! pubsub.listen("video-playback-by-id")?;
//!
//! while let Some(event) = events.recv().await {
//!   if let PubSubEvent::Message { topic, payload, .. } = event {
//!     println!("{topic}: {payload}");
//!   }
//! }
//! # Ok(())
//! # }
//! ```

mod msg;
mod negotiate;
mod token;

#[cfg(feature = "client")]
mod client;

pub use msg::{Incoming, MessageData, Request, ResponseError, TopicsData};
pub use negotiate::{
  nonce, NegotiationError, Negotiator, Outcome, Outgoing, PendingTopic, TopicSnapshot, NONCE_LEN,
};
pub use token::{NoToken, StaticToken, TokenProvider};

#[cfg(feature = "client")]
pub use client::{Closed, Config, ConnectError, PubSub, PubSubEvent, DEFAULT_NEGOTIATION_TIMEOUT};

use serde::Serialize;
use std::fmt::Display;

/// How many times a failed negotiation is retried by default.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// The payload sent as a keep-alive ping.
pub const PING: &str = r#"{"type":"PING"}"#;

/// Whether a negotiation subscribes to or unsubscribes from a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
  Listen,
  Unlisten,
}

impl Display for Mode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Mode::Listen => f.write_str("LISTEN"),
      Mode::Unlisten => f.write_str("UNLISTEN"),
    }
  }
}

/// Append `.{channel_id}` to a topic which does not have a `.` yet.
///
/// ```rust
/// # use twitch_feed::pubsub::qualify_topic;
/// assert_eq!(qualify_topic("video-playback-by-id", Some("12345")), "video-playback-by-id.12345");
/// assert_eq!(qualify_topic("whispers.1", Some("12345")), "whispers.1");
/// ```
pub fn qualify_topic(topic: &str, channel_id: Option<&str>) -> String {
  match channel_id {
    Some(channel_id) if !topic.contains('.') => format!("{topic}.{channel_id}"),
    _ => topic.to_string(),
  }
}

/// The event category of a topic, which is everything before the first `.`.
pub fn topic_category(topic: &str) -> &str {
  topic.split_once('.').map_or(topic, |(category, _)| category)
}
