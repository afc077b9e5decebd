use std::fmt::Display;
use std::ops::Deref;

use super::MalformedFrame;
use crate::common::Span;

macro_rules! tags_def {
  (
    $tag:ident;
    $($(#[$meta:meta])* $key:literal = $name:ident),* $(,)?
  ) => {
    /// A tag key.
    #[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
    #[non_exhaustive]
    pub enum $tag<'src> {
      $(
        $(#[$meta])*
        $name,
      )*
      Unknown(&'src str),
    }

    impl<'src> $tag<'src> {
      #[doc = concat!("Get the string value of the [`", stringify!($tag), "`].")]
      #[inline]
      pub fn as_str(&self) -> &'src str {
        match self {
          $(Self::$name => $key,)*
          Self::Unknown(key) => key,
        }
      }

      #[doc = concat!("Parse a [`", stringify!($tag), "`] from a string.")]
      #[inline]
      pub fn parse(src: &'src str) -> Self {
        match src {
          $($key => Self::$name,)*
          _ => Self::Unknown(src),
        }
      }
    }
  }
}

impl<'src> From<&'src str> for Tag<'src> {
  fn from(value: &'src str) -> Self {
    Tag::parse(value)
  }
}

tags_def! {
  Tag;
  "badge-info" = BadgeInfo,
  "badges" = Badges,

  /// Number of bits cheered with the message.
  "bits" = Bits,
  "color" = Color,
  "display-name" = DisplayName,

  /// Twitch-native emote ranges, `id:start-end,start-end/id:start-end`.
  ///
  /// Offsets count a surrogate pair as a single unit.
  "emotes" = Emotes,
  "id" = Id,
  "login" = Login,
  "msg-id" = MsgId,
  "reply-parent-msg-body" = ReplyParentMsgBody,
  "room-id" = RoomId,
  "tmi-sent-ts" = TmiSentTs,
  "user-id" = UserId,

  /// Set on `CLEARCHAT` for timeouts, in seconds.
  "ban-duration" = BanDuration,
  "target-msg-id" = TargetMsgId,
  "target-user-id" = TargetUserId,
}

impl<'src> Display for Tag<'src> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Default, Clone)]
pub(super) struct RawTags(Vec<TagPair>);

impl Deref for RawTags {
  type Target = Vec<TagPair>;

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl RawTags {
  /// Keys are unique; a repeated key replaces the earlier value.
  fn insert(&mut self, src: &str, pair: TagPair) {
    let key = &src[pair.key];
    match self.0.iter_mut().find(|existing| &src[existing.key] == key) {
      Some(existing) => existing.value = pair.value,
      None => self.0.push(pair),
    }
  }
}

#[derive(Clone, Copy)]
pub(super) struct TagPair {
  // key=value
  // ^  ^
  pub(super) key: Span,
  // key=value
  //     ^    ^
  pub(super) value: Span,
}

impl TagPair {
  #[inline]
  pub(super) fn get<'a>(&self, src: &'a str) -> (&'a str, &'a str) {
    (&src[self.key], &src[self.value])
  }
}

/// `@key=value;key=value <rest>`
///
/// Pairs where either the key or the value is empty are dropped.
/// Values are kept raw, without unescaping.
pub(super) fn parse(src: &str, pos: &mut usize) -> Result<RawTags, MalformedFrame> {
  let mut tags = RawTags::default();
  if !src[*pos..].starts_with('@') {
    return Ok(tags);
  }

  let start = *pos + 1;
  let end = match src[start..].find(' ') {
    Some(end) => start + end,
    None => return Err(MalformedFrame::UnterminatedTags),
  };

  let bytes = src.as_bytes();
  let mut key_start = start;
  let mut key_end = None;
  for i in start..=end {
    let c = if i == end { b';' } else { bytes[i] };
    match c {
      b'=' if key_end.is_none() => key_end = Some(i),
      b';' => {
        if let Some(key_end) = key_end {
          let key = Span::from(key_start..key_end);
          let value = Span::from(key_end + 1..i);
          if !key.is_empty() && !value.is_empty() {
            tags.insert(src, TagPair { key, value });
          }
        }
        key_start = i + 1;
        key_end = None;
      }
      _ => {}
    }
  }

  *pos = end + 1;

  Ok(tags)
}
