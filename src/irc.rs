//! ## Twitch IRC frame parser
//!
//! The entrypoint to this module is [`IrcMessageRef`].
//!
//! ```rust,no_run
//! let msg = twitch_feed::IrcMessageRef::parse("...");
//! ```
//!
//! A transport payload may carry several frames joined by `\r\n`,
//! use [`split_frames`] to get at the individual frames first.
//!
//! ⚠ This parser is _not_ compliant with the IRCv3 spec!
//! It assumes that it will only ever parse messages sent by Twitch,
//! which means it handles Twitch-specific quirks, but it also means
//! that it's unlikely to work for IRC messages sent by other servers.

mod command;
mod params;
mod prefix;
mod tags;
pub mod write;

pub use command::Command;
pub use prefix::{Prefix, PrefixParseError};
pub use tags::Tag;

use crate::common::Span;
use std::fmt::{Debug, Display};

use prefix::RawPrefix;
use tags::RawTags;

/// The frame delimiter.
pub const FRAME_DELIMITER: &str = "\r\n";

/// Split a transport payload into individual frames.
///
/// Only the exact `\r\n` sequence separates frames, a lone `\r` or `\n`
/// stays part of the frame. Empty frames are skipped, and the last frame
/// does not need a trailing delimiter.
pub fn split_frames(payload: &str) -> impl Iterator<Item = &str> + '_ {
  payload
    .split(FRAME_DELIMITER)
    .filter(|frame| !frame.is_empty())
}

/// A frame could not be parsed because a required delimiter is missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedFrame {
  /// The frame is empty.
  Empty,
  /// The tag block is not followed by a space.
  UnterminatedTags,
  /// The prefix is empty or not followed by a space.
  UnterminatedPrefix,
  /// There is no command.
  MissingCommand,
}

impl Display for MalformedFrame {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      MalformedFrame::Empty => write!(f, "malformed frame: frame is empty"),
      MalformedFrame::UnterminatedTags => write!(f, "malformed frame: unterminated tag block"),
      MalformedFrame::UnterminatedPrefix => write!(f, "malformed frame: unterminated prefix"),
      MalformedFrame::MissingCommand => write!(f, "malformed frame: missing command"),
    }
  }
}

impl std::error::Error for MalformedFrame {}

/// A base IRC message.
///
/// This variant references the original string instead of owning it.
#[derive(Clone)]
pub struct IrcMessageRef<'src> {
  src: &'src str,
  parts: IrcMessageParts,
}

#[derive(Clone)]
struct IrcMessageParts {
  tags: RawTags,
  prefix: Option<RawPrefix>,
  command: Span,
  channel: Option<Span>,
  body: Option<Span>,
}

#[inline(always)]
fn skip_spaces(src: &str, pos: &mut usize) {
  let bytes = src.as_bytes();
  while *pos < bytes.len() && bytes[*pos] == b' ' {
    *pos += 1;
  }
}

impl<'src> IrcMessageRef<'src> {
  /// Parse a single Twitch IRC frame.
  ///
  /// `src` must not contain the trailing `\r\n`.
  pub fn parse(src: &'src str) -> Result<Self, MalformedFrame> {
    Self::parse_inner(src)
  }

  #[inline(always)]
  fn parse_inner(src: &'src str) -> Result<Self, MalformedFrame> {
    if src.is_empty() {
      return Err(MalformedFrame::Empty);
    }

    let mut pos = 0usize;

    let tags = tags::parse(src, &mut pos)?;
    skip_spaces(src, &mut pos);
    let prefix = prefix::parse(src, &mut pos)?;
    skip_spaces(src, &mut pos);
    let command = command::parse(src, &mut pos)?;
    skip_spaces(src, &mut pos);
    let (channel, body) = params::parse(src, pos);

    Ok(Self {
      src,
      parts: IrcMessageParts {
        tags,
        prefix,
        command,
        channel,
        body,
      },
    })
  }

  /// Get the string from which this message was parsed.
  pub fn raw(&self) -> &'src str {
    self.src
  }

  /// Get an iterator over the message tags as `(key, value)` pairs.
  ///
  /// Values are raw, see [`crate::maybe_unescape`].
  pub fn tags(&self) -> impl Iterator<Item = (&'src str, &'src str)> + '_ {
    self.parts.tags.iter().map(|pair| pair.get(self.src))
  }

  /// Whether the message has any tags.
  pub fn has_tags(&self) -> bool {
    !self.parts.tags.is_empty()
  }

  /// Get the message [`Prefix`].
  pub fn prefix(&self) -> Option<Prefix<'src>> {
    self.parts.prefix.map(|prefix| prefix.get(self.src))
  }

  /// Get the message [`Command`].
  pub fn command(&self) -> Command<'src> {
    Command::from_token(&self.src[self.parts.command])
  }

  /// Get the channel name this message was sent to, without the `#`.
  pub fn channel(&self) -> Option<&'src str> {
    self.parts.channel.map(|span| &self.src[span])
  }

  /// Everything after the first `:` following the command.
  pub fn body(&self) -> Option<&'src str> {
    self.parts.body.map(|span| &self.src[span])
  }

  /// Retrieve the value of `tag`.
  ///
  /// `tag` can provided as:
  /// - A variant of the [`Tag`] enum
  /// - The stringified kebab-case tag name
  ///
  /// ```rust,ignore
  /// assert!(message.tag(Tag::MsgId) == message.tag("msg-id"));
  /// ```
  pub fn tag<'a>(&self, tag: impl Into<Tag<'a>>) -> Option<&'src str> {
    let tag = tag.into();
    self
      .parts
      .tags
      .iter()
      .find(|pair| &self.src[pair.key] == tag.as_str())
      .map(|pair| &self.src[pair.value])
  }
}

impl<'src> Debug for IrcMessageRef<'src> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("IrcMessage")
      .field("tags", &DebugIter::new(self.tags()))
      .field("prefix", &self.prefix())
      .field("command", &self.command())
      .field("channel", &self.channel())
      .field("body", &self.body())
      .finish()
  }
}

/// A base IRC message.
///
/// This variants owns the input message.
#[derive(Clone)]
pub struct IrcMessage {
  src: String,
  parts: IrcMessageParts,
}

impl IrcMessage {
  /// Parse a single Twitch IRC frame.
  pub fn parse(src: impl Into<String>) -> Result<Self, MalformedFrame> {
    let src = src.into();
    let parts = IrcMessageRef::parse_inner(&src)?.parts;
    Ok(IrcMessage { src, parts })
  }

  /// Get the string from which this message was parsed.
  pub fn raw(&self) -> &str {
    &self.src
  }

  /// Get an iterator over the message tags as `(key, value)` pairs.
  pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
    self.parts.tags.iter().map(|pair| pair.get(&self.src))
  }

  /// Get the message [`Prefix`].
  pub fn prefix(&self) -> Option<Prefix<'_>> {
    self.parts.prefix.map(|prefix| prefix.get(&self.src))
  }

  /// Get the message [`Command`].
  pub fn command(&self) -> Command<'_> {
    Command::from_token(&self.src.as_str()[self.parts.command])
  }

  /// Get the channel name this message was sent to, without the `#`.
  pub fn channel(&self) -> Option<&str> {
    self.parts.channel.map(|span| &self.src.as_str()[span])
  }

  /// Everything after the first `:` following the command.
  pub fn body(&self) -> Option<&str> {
    self.parts.body.map(|span| &self.src.as_str()[span])
  }

  /// Retrieve the value of `tag`.
  pub fn tag<'a>(&self, tag: impl Into<Tag<'a>>) -> Option<&str> {
    self.as_ref().tag(tag)
  }

  /// Turn the [`IrcMessage`] into its borrowed variant, [`IrcMessageRef`].
  pub fn as_ref(&self) -> IrcMessageRef<'_> {
    IrcMessageRef {
      src: &self.src,
      parts: self.parts.clone(),
    }
  }
}

impl<'src> IrcMessageRef<'src> {
  /// Turn the [`IrcMessageRef`] into its owned variant, [`IrcMessage`].
  pub fn into_owned(self) -> IrcMessage {
    IrcMessage {
      src: self.src.into(),
      parts: self.parts,
    }
  }
}

impl Debug for IrcMessage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Debug::fmt(&self.as_ref(), f)
  }
}

static_assert_send!(IrcMessageRef);
static_assert_sync!(IrcMessageRef);

static_assert_send!(IrcMessage);
static_assert_sync!(IrcMessage);

struct DebugIter<I>(std::cell::RefCell<I>);
impl<I> DebugIter<I> {
  fn new(iter: I) -> Self {
    Self(std::cell::RefCell::new(iter))
  }
}
impl<I> Debug for DebugIter<I>
where
  I: Iterator,
  I::Item: Debug,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    use std::ops::DerefMut;
    let mut list = f.debug_list();
    for item in self.0.borrow_mut().deref_mut() {
      list.entry(&item);
    }
    list.finish()
  }
}
