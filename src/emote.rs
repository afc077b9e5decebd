//! ## Emote extraction
//!
//! Turns the text of a chat message into a list of [`ChatEmoteSpan`]s,
//! combining four sources, in order of precedence:
//!
//! 1. Twitch-native emotes from the `emotes` tag
//! 2. Emoji, found with the [`EmojiTrie`]
//! 3. Third-party emotes, from an [`EmoteCache`]
//! 4. Cheermotes, from a [`CheermoteCache`], only in messages with bits
//!
//! All offsets are UTF-16 code unit offsets into the displayed text,
//! which is the message body without `/me` framing.

mod cache;

pub use cache::{
  CheermoteCache, Cheermote, CheermoteTier, EmoteCache, EmoteMetadata, Lookup, NoEmotes,
  StaticCheermotes, StaticEmotes,
};

use crate::emoji::EmojiTrie;
use crate::irc::{IrcMessageRef, Tag};
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt::Display;
use std::ops::Range;

/// Base URL for Twitch-native emote images.
pub const TWITCH_EMOTE_BASE_URL: &str = "https://static-cdn.jtvnw.net/emoticons/v2";

/// An emote occurrence within a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatEmoteSpan {
  /// Namespaced id, e.g. `twitch_25`, `emoji_1f638`, `cheer_cheer_100`.
  pub id: String,
  /// The text covered by this span.
  pub display_name: String,
  /// First UTF-16 code unit, inclusive.
  pub start_index: u32,
  /// Last UTF-16 code unit, inclusive.
  pub end_index: u32,
  pub url: String,
  pub animated: bool,
  /// Amount of bits written in a cheer, `0` for anything else.
  pub bits: u32,
  /// Tier color of a cheer.
  pub color: Option<String>,
}

impl ChatEmoteSpan {
  fn range(&self) -> Range<usize> {
    self.start_index as usize..self.end_index as usize + 1
  }
}

/// Which sources to extract emotes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractOptions {
  pub twitch: bool,
  pub emoji: bool,
  pub third_party: bool,
  pub cheermotes: bool,
}

impl Default for ExtractOptions {
  fn default() -> Self {
    Self {
      twitch: true,
      emoji: true,
      third_party: true,
      cheermotes: true,
    }
  }
}

/// Strip the `/me` framing, `\u{1}ACTION text\u{1}`.
///
/// Returns the displayed text, and whether the message was an action.
pub fn strip_action(input: &str) -> (&str, bool) {
  let Some(s) = input.strip_prefix("\u{0001}ACTION ") else {
    return (input, false);
  };
  let Some(s) = s.strip_suffix('\u{0001}') else {
    return (input, false);
  };
  (s, true)
}

/// Extracts emote spans from messages.
///
/// The extractor only borrows its collaborators, and is cheap to create per message.
#[derive(Clone, Copy)]
pub struct Extractor<'a> {
  trie: &'a EmojiTrie,
  emotes: &'a dyn EmoteCache,
  cheermotes: &'a dyn CheermoteCache,
  options: ExtractOptions,
}

impl Default for Extractor<'static> {
  fn default() -> Self {
    Self::new(EmojiTrie::global())
  }
}

impl<'a> Extractor<'a> {
  /// Extractor using `trie` for emoji, without any third-party emotes or cheermotes.
  pub fn new(trie: &'a EmojiTrie) -> Self {
    Self {
      trie,
      emotes: &NoEmotes,
      cheermotes: &NoEmotes,
      options: ExtractOptions::default(),
    }
  }

  pub fn with_emotes(mut self, emotes: &'a dyn EmoteCache) -> Self {
    self.emotes = emotes;
    self
  }

  pub fn with_cheermotes(mut self, cheermotes: &'a dyn CheermoteCache) -> Self {
    self.cheermotes = cheermotes;
    self
  }

  pub fn with_options(mut self, options: ExtractOptions) -> Self {
    self.options = options;
    self
  }

  /// Extract emotes from a `PRIVMSG`.
  ///
  /// Uses the message body without `/me` framing, and the `emotes`, `room-id` and `bits` tags.
  pub fn extract_message(
    &self,
    message: &IrcMessageRef<'_>,
  ) -> Result<Vec<ChatEmoteSpan>, MalformedEmoteTag> {
    let (text, _) = strip_action(message.body().unwrap_or_default());
    let bits = message
      .tag(Tag::Bits)
      .and_then(|bits| bits.parse().ok())
      .unwrap_or(0);
    self.extract(
      text,
      message.tag(Tag::Emotes),
      message.tag(Tag::RoomId),
      bits,
    )
  }

  /// Extract emotes from `text`.
  ///
  /// - `emotes_tag` is the raw value of the `emotes` tag.
  /// - `channel_id` scopes third-party emote and cheermote lookups.
  /// - `bits` is the amount of bits attached to the message.
  ///
  /// The spans are sorted by [`ChatEmoteSpan::start_index`], and never overlap.
  pub fn extract(
    &self,
    text: &str,
    emotes_tag: Option<&str>,
    channel_id: Option<&str>,
    bits: u32,
  ) -> Result<Vec<ChatEmoteSpan>, MalformedEmoteTag> {
    let units = text.encode_utf16().collect::<Vec<_>>();

    let mut spans = match emotes_tag {
      Some(tag) if self.options.twitch => twitch_emotes(text, &units, tag)?,
      _ => Vec::new(),
    };

    if self.options.emoji {
      let emoji = self.emoji(&units, &spans);
      if !emoji.is_empty() {
        spans.extend(emoji);
        spans.sort_by_key(|span| span.start_index);
      }
    }

    if self.options.third_party || (self.options.cheermotes && bits > 0) {
      let words = self.words(&units, &spans, channel_id, bits);
      if !words.is_empty() {
        spans.extend(words);
        spans.sort_by_key(|span| span.start_index);
      }
    }

    trace!(spans = spans.len(), "extracted emotes");
    Ok(spans)
  }

  /// Scan the unclaimed parts of the message for emoji.
  fn emoji(&self, units: &[u16], claimed: &[ChatEmoteSpan]) -> Vec<ChatEmoteSpan> {
    let mut out = Vec::new();
    let mut claimed = claimed.iter().peekable();
    let mut i = 0;
    while i < units.len() {
      if let Some(span) = claimed.peek() {
        if span.start_index as usize <= i {
          i = i.max(span.end_index as usize + 1);
          claimed.next();
          continue;
        }
      }

      let Some(leaf) = self.trie.lookup(units, i) else {
        i += 1;
        continue;
      };
      let end = i + leaf.depth() as usize;
      if claimed.peek().is_some_and(|span| span.start_index as usize <= end) {
        i += 1;
        continue;
      }

      out.push(ChatEmoteSpan {
        id: format!("emoji_{}", leaf.key()),
        display_name: String::from_utf16_lossy(&units[i..=end]),
        start_index: i as u32,
        end_index: end as u32,
        url: leaf.url(),
        animated: false,
        bits: 0,
        color: None,
      });
      i = end + 1;
    }
    out
  }

  /// Scan every word in the gaps between claimed spans
  /// for third-party emotes and cheermotes.
  fn words(
    &self,
    units: &[u16],
    claimed: &[ChatEmoteSpan],
    channel_id: Option<&str>,
    bits: u32,
  ) -> Vec<ChatEmoteSpan> {
    let mut out = Vec::new();
    let mut gap_start = 0;
    let gaps = claimed
      .iter()
      .map(|span| span.range())
      .chain(std::iter::once(units.len()..units.len()));
    for claimed in gaps {
      if gap_start < claimed.start {
        for (range, word) in words(units, gap_start..claimed.start) {
          if let Some(span) = self.word(&word, range, channel_id, bits) {
            out.push(span);
          }
        }
      }
      gap_start = gap_start.max(claimed.end);
    }
    out
  }

  fn word(
    &self,
    word: &str,
    range: Range<usize>,
    channel_id: Option<&str>,
    bits: u32,
  ) -> Option<ChatEmoteSpan> {
    if self.options.third_party {
      let emote = scoped(channel_id, |channel_id| self.emotes.try_get(word, channel_id));
      if let Lookup::Found(emote) = emote {
        return Some(ChatEmoteSpan {
          id: emote.id,
          display_name: word.to_string(),
          start_index: range.start as u32,
          end_index: (range.end - 1) as u32,
          url: emote.url,
          animated: emote.animated,
          bits: 0,
          color: None,
        });
      }
    }

    if self.options.cheermotes && bits > 0 {
      let (prefix, amount) = split_cheer(word)?;
      let cheermote = scoped(channel_id, |channel_id| {
        self.cheermotes.try_get(prefix, channel_id)
      })
      .found()?;
      let tier = cheermote.tier(bits)?;
      return Some(ChatEmoteSpan {
        id: format!("cheer_{}_{}", prefix.to_ascii_lowercase(), tier.id),
        display_name: word.to_string(),
        start_index: range.start as u32,
        end_index: (range.end - 1) as u32,
        url: tier.url.clone(),
        animated: tier.animated,
        bits: amount,
        color: tier.color.clone(),
      });
    }

    None
  }
}

/// Channel-scoped lookup first, then global.
fn scoped<T>(channel_id: Option<&str>, f: impl Fn(Option<&str>) -> Lookup<T>) -> Lookup<T> {
  match channel_id {
    Some(channel_id) => f(Some(channel_id)).or_else(|| f(None)),
    None => f(None),
  }
}

/// `Cheer100` -> `("Cheer", 100)`
fn split_cheer(word: &str) -> Option<(&str, u32)> {
  let prefix = word.trim_end_matches(|c: char| c.is_ascii_digit());
  if prefix.is_empty() || prefix.len() == word.len() {
    return None;
  }
  let amount = word[prefix.len()..].parse().ok()?;
  Some((prefix, amount))
}

/// Whitespace-separated words in `units[range]`, with their UTF-16 ranges.
fn words(units: &[u16], range: Range<usize>) -> Vec<(Range<usize>, String)> {
  let mut out = Vec::new();
  let mut word = String::new();
  let mut start = range.start;
  let mut pos = range.start;
  for c in char::decode_utf16(units[range].iter().copied()) {
    let c = c.unwrap_or(char::REPLACEMENT_CHARACTER);
    let len = c.len_utf16();
    if c.is_whitespace() {
      if !word.is_empty() {
        out.push((start..pos, std::mem::take(&mut word)));
      }
      start = pos + len;
    } else {
      word.push(c);
    }
    pos += len;
  }
  if !word.is_empty() {
    out.push((start..pos, word));
  }
  out
}

/// Parse the `emotes` tag into spans.
///
/// Twitch counts a surrogate pair as a single unit, so every offset is
/// corrected by the number of surrogate pairs before it.
fn twitch_emotes(
  text: &str,
  units: &[u16],
  tag: &str,
) -> Result<Vec<ChatEmoteSpan>, MalformedEmoteTag> {
  // positions of surrogate pairs, counted in codepoints
  let mut pairs = SmallVec::<[usize; 8]>::new();
  let mut len = 0;
  for (i, c) in text.chars().enumerate() {
    if c.len_utf16() == 2 {
      pairs.push(i);
    }
    len = i + 1;
  }

  let mut spans = Vec::new();
  for group in tag.split('/').filter(|group| !group.is_empty()) {
    let error = |kind| MalformedEmoteTag {
      group: group.to_string(),
      kind,
    };

    let (id, ranges) = group
      .split_once(':')
      .ok_or_else(|| error(MalformedEmoteTagKind::MissingId))?;
    if id.is_empty() {
      return Err(error(MalformedEmoteTagKind::MissingId));
    }

    for range in ranges.split(',') {
      let (start, end) = range
        .split_once('-')
        .ok_or_else(|| error(MalformedEmoteTagKind::InvalidRange))?;
      let start: usize = start
        .parse()
        .map_err(|_| error(MalformedEmoteTagKind::InvalidIndex))?;
      let end: usize = end
        .parse()
        .map_err(|_| error(MalformedEmoteTagKind::InvalidIndex))?;
      if start > end || end >= len {
        return Err(error(MalformedEmoteTagKind::InvalidRange));
      }

      let start = start + pairs.partition_point(|&pair| pair < start);
      let end = end + pairs.partition_point(|&pair| pair <= end);

      spans.push(ChatEmoteSpan {
        id: format!("twitch_{id}"),
        display_name: String::from_utf16_lossy(&units[start..=end]),
        start_index: start as u32,
        end_index: end as u32,
        url: format!("{TWITCH_EMOTE_BASE_URL}/{id}/static/dark/1.0"),
        animated: false,
        bits: 0,
        color: None,
      });
    }
  }

  spans.sort_by_key(|span| span.start_index);
  let mut last_end = None;
  spans.retain(|span| {
    if last_end.is_some_and(|end| span.start_index <= end) {
      return false;
    }
    last_end = Some(span.end_index);
    true
  });

  Ok(spans)
}

/// The `emotes` tag could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MalformedEmoteTag {
  /// The offending `id:start-end,...` group.
  pub group: String,
  pub kind: MalformedEmoteTagKind,
}

/// See [`MalformedEmoteTag`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MalformedEmoteTagKind {
  /// The group has no emote id.
  MissingId,
  /// An offset is not a number.
  InvalidIndex,
  /// A range is missing its `-`, is reversed, or is outside of the message.
  InvalidRange,
}

impl Display for MalformedEmoteTag {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let reason = match self.kind {
      MalformedEmoteTagKind::MissingId => "missing emote id",
      MalformedEmoteTagKind::InvalidIndex => "invalid index",
      MalformedEmoteTagKind::InvalidRange => "invalid range",
    };
    write!(f, "malformed emote tag `{}`: {reason}", self.group)
  }
}

impl std::error::Error for MalformedEmoteTag {}

static_assert_send!(Extractor<'static>);
static_assert_sync!(Extractor<'static>);

#[cfg(test)]
mod tests {
  use super::*;

  fn assert_sorted_and_disjoint(spans: &[ChatEmoteSpan]) {
    for pair in spans.windows(2) {
      assert!(
        pair[0].end_index < pair[1].start_index,
        "{:?} overlaps {:?}",
        pair[0],
        pair[1]
      );
    }
  }

  fn ids(spans: &[ChatEmoteSpan]) -> Vec<(&str, u32, u32)> {
    spans
      .iter()
      .map(|span| (span.id.as_str(), span.start_index, span.end_index))
      .collect()
  }

  #[test]
  fn twitch_emotes_without_surrogates() {
    let spans = Extractor::default()
      .extract("Kappa Keepo Kappa", Some("25:0-4,12-16/1902:6-10"), None, 0)
      .unwrap();
    assert_eq!(
      ids(&spans),
      vec![
        ("twitch_25", 0, 4),
        ("twitch_1902", 6, 10),
        ("twitch_25", 12, 16)
      ]
    );
    assert_eq!(spans[1].display_name, "Keepo");
    assert_eq!(
      spans[0].url,
      "https://static-cdn.jtvnw.net/emoticons/v2/25/static/dark/1.0"
    );
  }

  #[test]
  fn twitch_emotes_after_surrogate_pairs() {
    // "😸" is one unit for twitch, and two in UTF-16
    let text = "😸 Kappa 😸😸 Kappa";
    let spans = Extractor::default()
      .with_options(ExtractOptions {
        emoji: false,
        ..Default::default()
      })
      .extract(text, Some("25:2-6,11-15"), None, 0)
      .unwrap();
    assert_eq!(ids(&spans), vec![("twitch_25", 3, 7), ("twitch_25", 14, 18)]);
    for span in &spans {
      assert_eq!(span.display_name, "Kappa");
    }
  }

  #[test]
  fn twitch_emote_ending_in_surrogate_pair() {
    // a twitch emote covering an emoji covers both of its code units
    let text = "a😸";
    let spans = Extractor::default()
      .extract(text, Some("1:1-1"), None, 0)
      .unwrap();
    assert_eq!(ids(&spans), vec![("twitch_1", 1, 2)]);
    assert_eq!(spans[0].display_name, "😸");
  }

  #[test]
  fn emoji_between_twitch_emotes() {
    let text = "Kappa 🏳️‍⚧️ Kappa😸";
    let spans = Extractor::default()
      .extract(text, Some("25:0-4,12-16"), None, 0)
      .unwrap();
    assert_sorted_and_disjoint(&spans);
    assert_eq!(
      ids(&spans),
      vec![
        ("twitch_25", 0, 4),
        ("emoji_1f3f3-fe0f-200d-26a7-fe0f", 6, 11),
        ("twitch_25", 13, 17),
        ("emoji_1f638", 18, 19),
      ]
    );
    assert_eq!(spans[1].display_name, "🏳️‍⚧️");
  }

  #[test]
  fn emoji_only() {
    let spans = Extractor::default()
      .extract("👍🏽 nice ❤️‍🔥", None, None, 0)
      .unwrap();
    assert_sorted_and_disjoint(&spans);
    assert_eq!(
      spans.iter().map(|s| s.display_name.as_str()).collect::<Vec<_>>(),
      vec!["👍🏽", "❤️‍🔥"]
    );
  }

  #[test]
  fn third_party_channel_before_global() {
    let emote = |id: &str, name: &str| EmoteMetadata {
      id: id.into(),
      name: name.into(),
      url: format!("https://example.com/{id}"),
      animated: false,
    };
    let cache = StaticEmotes::new()
      .global(emote("global_catJAM", "catJAM"))
      .channel("11148817", emote("channel_catJAM", "catJAM"))
      .global(emote("global_forsenE", "forsenE"));

    let spans = Extractor::default()
      .with_emotes(&cache)
      .extract("catJAM forsenE  catJAM", None, Some("11148817"), 0)
      .unwrap();
    assert_eq!(
      ids(&spans),
      vec![
        ("channel_catJAM", 0, 5),
        ("global_forsenE", 7, 13),
        ("channel_catJAM", 16, 21),
      ]
    );

    let spans = Extractor::default()
      .with_emotes(&cache)
      .extract("catJAM", None, None, 0)
      .unwrap();
    assert_eq!(ids(&spans), vec![("global_catJAM", 0, 5)]);
  }

  #[test]
  fn third_party_does_not_override_twitch() {
    let cache = StaticEmotes::new().global(EmoteMetadata {
      id: "bttv_kappa".into(),
      name: "Kappa".into(),
      url: String::new(),
      animated: false,
    });
    let spans = Extractor::default()
      .with_emotes(&cache)
      .extract("Kappa Kappa", Some("25:0-4"), None, 0)
      .unwrap();
    assert_eq!(ids(&spans), vec![("twitch_25", 0, 4), ("bttv_kappa", 6, 10)]);
  }

  fn cheers() -> StaticCheermotes {
    let tier = |min_bits: u32, color: &str| CheermoteTier {
      min_bits,
      id: min_bits.to_string(),
      url: format!("https://example.com/cheer/{min_bits}.gif"),
      animated: true,
      color: Some(color.into()),
    };
    StaticCheermotes::new().global(Cheermote::new(
      "Cheer",
      vec![
        tier(1, "#979797"),
        tier(100, "#9c3ee8"),
        tier(1000, "#1db2a5"),
      ],
    ))
  }

  #[test]
  fn cheermotes_require_bits() {
    let cache = cheers();
    let extractor = Extractor::default().with_cheermotes(&cache);

    let spans = extractor.extract("Cheer100 hi", None, None, 0).unwrap();
    assert!(spans.is_empty());

    let spans = extractor.extract("Cheer100 hi", None, None, 100).unwrap();
    assert_eq!(ids(&spans), vec![("cheer_cheer_100", 0, 7)]);
    assert_eq!(spans[0].bits, 100);
    assert_eq!(spans[0].color.as_deref(), Some("#9c3ee8"));
  }

  #[test]
  fn cheermote_tier_follows_message_bits() {
    let cache = cheers();
    let extractor = Extractor::default().with_cheermotes(&cache);

    let spans = extractor
      .extract("Cheer1 Cheer1 Cheer98", None, None, 100)
      .unwrap();
    assert_eq!(
      ids(&spans),
      vec![
        ("cheer_cheer_100", 0, 5),
        ("cheer_cheer_100", 7, 12),
        ("cheer_cheer_100", 14, 20),
      ]
    );
    assert_eq!(spans[2].bits, 98);

    let spans = extractor.extract("Cheer99", None, None, 99).unwrap();
    assert_eq!(ids(&spans), vec![("cheer_cheer_1", 0, 6)]);
  }

  #[test]
  fn not_a_cheer() {
    let cache = cheers();
    let extractor = Extractor::default().with_cheermotes(&cache);
    let spans = extractor
      .extract("Cheer 100 Cheerio5 cheer10", None, None, 10)
      .unwrap();
    assert_eq!(ids(&spans), vec![("cheer_cheer_1", 19, 25)]);
  }

  #[test]
  fn disabled_sources() {
    let spans = Extractor::default()
      .with_options(ExtractOptions {
        twitch: false,
        emoji: false,
        third_party: false,
        cheermotes: false,
      })
      .extract("Kappa 😸", Some("25:0-4"), None, 0)
      .unwrap();
    assert!(spans.is_empty());

    // a disabled source does not validate its tag
    let spans = Extractor::default()
      .with_options(ExtractOptions {
        twitch: false,
        ..Default::default()
      })
      .extract("hi", Some("25:a-b"), None, 0)
      .unwrap();
    assert!(spans.is_empty());
  }

  #[test]
  fn empty_emotes_tag() {
    let spans = Extractor::default().extract("hi", Some(""), None, 0).unwrap();
    assert!(spans.is_empty());
  }

  #[test]
  fn overlapping_twitch_ranges_keep_the_first() {
    let spans = Extractor::default()
      .extract("Kappa", Some("25:0-4/26:2-4"), None, 0)
      .unwrap();
    assert_eq!(ids(&spans), vec![("twitch_25", 0, 4)]);
  }

  #[test]
  fn malformed_emote_tag() {
    let extract = |tag| Extractor::default().extract("Kappa", Some(tag), None, 0);

    assert_eq!(
      extract("25:0-x").unwrap_err(),
      MalformedEmoteTag {
        group: "25:0-x".into(),
        kind: MalformedEmoteTagKind::InvalidIndex,
      }
    );
    assert_eq!(
      extract("25:4-0").unwrap_err().kind,
      MalformedEmoteTagKind::InvalidRange
    );
    assert_eq!(
      extract("25:0-5").unwrap_err().kind,
      MalformedEmoteTagKind::InvalidRange
    );
    assert_eq!(
      extract("25:0").unwrap_err().kind,
      MalformedEmoteTagKind::InvalidRange
    );
    assert_eq!(
      extract(":0-4").unwrap_err().kind,
      MalformedEmoteTagKind::MissingId
    );
    assert_eq!(
      extract("25:0-4/1902").unwrap_err().group,
      "1902"
    );
  }

  #[test]
  fn action_is_stripped() {
    assert_eq!(strip_action("\u{1}ACTION waves\u{1}"), ("waves", true));
    assert_eq!(strip_action("\u{1}ACTION waves"), ("\u{1}ACTION waves", false));
    assert_eq!(strip_action("waves"), ("waves", false));

    let msg = IrcMessageRef::parse(
      "@emotes=25:0-4;room-id=1 :a!a@a.tmi.twitch.tv PRIVMSG #a :\u{1}ACTION Kappa\u{1}",
    )
    .unwrap();
    let spans = Extractor::default().extract_message(&msg).unwrap();
    assert_eq!(ids(&spans), vec![("twitch_25", 0, 4)]);
  }

  #[test]
  fn mixed_message_is_sorted_and_disjoint() {
    let emotes = StaticEmotes::new().global(EmoteMetadata {
      id: "ffz_1".into(),
      name: "LULW".into(),
      url: String::new(),
      animated: false,
    });
    let cheermotes = cheers();
    let text = "😸LULW Kappa 🏳️‍⚧️ Cheer100 LULW 👍🏽";
    let spans = Extractor::default()
      .with_emotes(&emotes)
      .with_cheermotes(&cheermotes)
      .extract(text, Some("25:6-10"), Some("1"), 100)
      .unwrap();
    assert_sorted_and_disjoint(&spans);
    assert_eq!(
      spans.iter().map(|s| s.display_name.as_str()).collect::<Vec<_>>(),
      vec!["😸", "LULW", "Kappa", "🏳️‍⚧️", "Cheer100", "LULW", "👍🏽"]
    );
  }
}
