//! Emote lookup collaborators.

use serde::Serialize;
use std::collections::HashMap;

/// Result of an emote lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
  Found(T),
  NotFound,
}

impl<T> Lookup<T> {
  /// Convert into an [`Option`].
  pub fn found(self) -> Option<T> {
    match self {
      Lookup::Found(value) => Some(value),
      Lookup::NotFound => None,
    }
  }

  /// Try `f` if this lookup did not find anything.
  pub fn or_else(self, f: impl FnOnce() -> Lookup<T>) -> Lookup<T> {
    match self {
      Lookup::Found(value) => Lookup::Found(value),
      Lookup::NotFound => f(),
    }
  }
}

impl<T> From<Option<T>> for Lookup<T> {
  fn from(value: Option<T>) -> Self {
    match value {
      Some(value) => Lookup::Found(value),
      None => Lookup::NotFound,
    }
  }
}

/// A third-party emote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmoteMetadata {
  /// Unique id, used as the span id as-is.
  pub id: String,
  /// The word which is replaced by this emote.
  pub name: String,
  /// Image URL.
  pub url: String,
  pub animated: bool,
}

/// A cheermote, e.g. `Cheer` in `Cheer100`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cheermote {
  pub prefix: String,
  /// Sorted ascending by [`CheermoteTier::min_bits`].
  pub tiers: Vec<CheermoteTier>,
}

impl Cheermote {
  /// Create a cheermote, sorting `tiers` by their threshold.
  pub fn new(prefix: impl Into<String>, mut tiers: Vec<CheermoteTier>) -> Self {
    tiers.sort_by_key(|tier| tier.min_bits);
    Self {
      prefix: prefix.into(),
      tiers,
    }
  }

  /// Pick the tier for a message carrying `bits`.
  ///
  /// This is the last tier whose threshold is not above `bits`,
  /// or the lowest tier if `bits` is below every threshold.
  pub fn tier(&self, bits: u32) -> Option<&CheermoteTier> {
    let mut pick = self.tiers.first()?;
    for pair in self.tiers.windows(2) {
      if bits < pair[1].min_bits {
        break;
      }
      pick = &pair[1];
    }
    Some(pick)
  }
}

/// One tier of a [`Cheermote`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheermoteTier {
  pub min_bits: u32,
  pub id: String,
  pub url: String,
  pub animated: bool,
  pub color: Option<String>,
}

/// Source of third-party emotes.
///
/// `channel_id` is `None` for global emotes.
pub trait EmoteCache: Send + Sync {
  fn try_get(&self, name: &str, channel_id: Option<&str>) -> Lookup<EmoteMetadata>;
}

/// Source of cheermotes.
///
/// `channel_id` is `None` for global cheermotes.
pub trait CheermoteCache: Send + Sync {
  fn try_get(&self, prefix: &str, channel_id: Option<&str>) -> Lookup<Cheermote>;
}

/// Finds nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEmotes;

impl EmoteCache for NoEmotes {
  fn try_get(&self, _: &str, _: Option<&str>) -> Lookup<EmoteMetadata> {
    Lookup::NotFound
  }
}

impl CheermoteCache for NoEmotes {
  fn try_get(&self, _: &str, _: Option<&str>) -> Lookup<Cheermote> {
    Lookup::NotFound
  }
}

/// In-memory [`EmoteCache`].
#[derive(Clone, Debug, Default)]
pub struct StaticEmotes {
  global: HashMap<String, EmoteMetadata>,
  channels: HashMap<String, HashMap<String, EmoteMetadata>>,
}

impl StaticEmotes {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a global emote.
  pub fn global(mut self, emote: EmoteMetadata) -> Self {
    self.global.insert(emote.name.clone(), emote);
    self
  }

  /// Add an emote which is only available in the channel `channel_id`.
  pub fn channel(mut self, channel_id: impl Into<String>, emote: EmoteMetadata) -> Self {
    self
      .channels
      .entry(channel_id.into())
      .or_default()
      .insert(emote.name.clone(), emote);
    self
  }
}

impl EmoteCache for StaticEmotes {
  fn try_get(&self, name: &str, channel_id: Option<&str>) -> Lookup<EmoteMetadata> {
    let emote = match channel_id {
      Some(channel_id) => self.channels.get(channel_id).and_then(|emotes| emotes.get(name)),
      None => self.global.get(name),
    };
    emote.cloned().into()
  }
}

/// In-memory [`CheermoteCache`].
///
/// Prefixes are matched case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct StaticCheermotes {
  global: HashMap<String, Cheermote>,
  channels: HashMap<String, HashMap<String, Cheermote>>,
}

impl StaticCheermotes {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a global cheermote.
  pub fn global(mut self, cheermote: Cheermote) -> Self {
    self
      .global
      .insert(cheermote.prefix.to_ascii_lowercase(), cheermote);
    self
  }

  /// Add a cheermote which is only available in the channel `channel_id`.
  pub fn channel(mut self, channel_id: impl Into<String>, cheermote: Cheermote) -> Self {
    self
      .channels
      .entry(channel_id.into())
      .or_default()
      .insert(cheermote.prefix.to_ascii_lowercase(), cheermote);
    self
  }
}

impl CheermoteCache for StaticCheermotes {
  fn try_get(&self, prefix: &str, channel_id: Option<&str>) -> Lookup<Cheermote> {
    let prefix = prefix.to_ascii_lowercase();
    let cheermote = match channel_id {
      Some(channel_id) => self
        .channels
        .get(channel_id)
        .and_then(|cheermotes| cheermotes.get(&prefix)),
      None => self.global.get(&prefix),
    };
    cheermote.cloned().into()
  }
}
