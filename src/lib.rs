#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

pub mod chat;
pub mod common;
pub mod emoji;
pub mod emote;
pub mod irc;
pub mod keepalive;
pub mod pubsub;

#[cfg(feature = "client")]
pub mod transport;

pub use chat::ChatMessage;
pub use common::{maybe_unescape, unescape};
pub use emoji::EmojiTrie;
pub use emote::{ChatEmoteSpan, Extractor};
pub use irc::{split_frames, Command, IrcMessage, IrcMessageRef, Prefix, Tag};
pub use keepalive::{Backoff, KeepAlive, KeepAliveConfig, DEFAULT_BACKOFF, DEFAULT_TIMEOUT};

#[cfg(feature = "client")]
pub use chat::{ChatClient, ChatEvent, ChatHandle};
#[cfg(feature = "client")]
pub use pubsub::{PubSub, PubSubEvent};
#[cfg(feature = "client")]
pub use transport::{Connector, Duplex, TransportError};
