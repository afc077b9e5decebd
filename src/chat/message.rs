//! A basic Twitch chat message sent by some user to a specific channel.

use crate::common::maybe_unescape;
use crate::emote::{strip_action, ChatEmoteSpan, Extractor, MalformedEmoteTag};
use crate::irc::{Command, IrcMessageRef, Tag};
use chrono::{DateTime, Utc};
use serde::Serialize;
use smallvec::SmallVec;
use std::time::Duration;

/// A `PRIVMSG` with its emotes resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
  channel: String,
  channel_id: String,
  message_id: String,
  sender: User,
  text: String,
  is_action: bool,
  badges: Vec<Badge>,
  color: Option<String>,
  bits: Option<u32>,
  timestamp: DateTime<Utc>,
  emotes: Vec<ChatEmoteSpan>,
  #[serde(skip_serializing_if = "Option::is_none")]
  emote_error: Option<MalformedEmoteTag>,
}

generate_getters! {
  for ChatMessage as self {
    /// Channel in which this message was sent, without the `#`.
    channel -> &str = self.channel.as_ref(),

    /// ID of the channel in which this message was sent.
    channel_id -> &str = self.channel_id.as_ref(),

    /// Unique ID of the message.
    message_id -> &str = self.message_id.as_ref(),

    /// Basic info about the user who sent this message.
    sender -> &User = &self.sender,

    /// Text content of the message.
    ///
    /// This strips the action prefix/suffix bytes if the message was sent with `/me`.
    text -> &str = self.text.as_ref(),

    /// Whether the message was sent with `/me`.
    is_action -> bool,

    /// Channel badges enabled by the user.
    badges -> &[Badge] = &self.badges,

    /// The user's selected name color.
    ///
    /// [`None`] means the user has not selected a color.
    color -> Option<&str> = self.color.as_deref(),

    /// The number of bits cheered with this message.
    bits -> Option<u32>,

    /// The time at which the message was sent.
    timestamp -> DateTime<Utc>,

    /// Emotes in [`ChatMessage::text`], ordered by position.
    emotes -> &[ChatEmoteSpan] = &self.emotes,

    /// Set if the `emotes` tag could not be used.
    ///
    /// [`ChatMessage::emotes`] is empty in that case.
    emote_error -> Option<&MalformedEmoteTag> = self.emote_error.as_ref(),
  }
}

impl ChatMessage {
  /// Parse a `PRIVMSG`, resolving emotes with the default [`Extractor`].
  ///
  /// Returns [`None`] if the message is not a `PRIVMSG`,
  /// or is missing any of the tags sent with `twitch.tv/tags`.
  pub fn parse(message: &IrcMessageRef<'_>) -> Option<Self> {
    Self::parse_with(message, &Extractor::default())
  }

  /// Parse a `PRIVMSG`, resolving emotes with `extractor`.
  pub fn parse_with(message: &IrcMessageRef<'_>, extractor: &Extractor<'_>) -> Option<Self> {
    if message.command() != Command::Privmsg {
      return None;
    }

    let (text, is_action) = strip_action(message.body()?);
    let channel_id = message.tag(Tag::RoomId)?;
    let bits = message.tag(Tag::Bits).and_then(|bits| bits.parse().ok());

    let (emotes, emote_error) = match extractor.extract(
      text,
      message.tag(Tag::Emotes),
      Some(channel_id),
      bits.unwrap_or(0),
    ) {
      Ok(emotes) => (emotes, None),
      Err(e) => {
        warn!("ignoring emotes of message: {e}");
        (Vec::new(), Some(e))
      }
    };

    Some(ChatMessage {
      channel: message.channel()?.to_string(),
      channel_id: channel_id.to_string(),
      message_id: message.tag(Tag::Id)?.to_string(),
      sender: User {
        id: message.tag(Tag::UserId)?.to_string(),
        login: message.prefix().and_then(|prefix| prefix.nick())?.to_string(),
        name: maybe_unescape(message.tag(Tag::DisplayName)?).into_owned(),
      },
      text: text.to_string(),
      is_action,
      badges: message
        .tag(Tag::Badges)
        .map(|badges| parse_badges(badges, message.tag(Tag::BadgeInfo).unwrap_or_default()))
        .unwrap_or_default(),
      color: message
        .tag(Tag::Color)
        .filter(|color| !color.is_empty())
        .map(String::from),
      bits,
      timestamp: message.tag(Tag::TmiSentTs).and_then(parse_timestamp)?,
      emotes,
      emote_error,
    })
  }
}

/// Basic information about a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
  id: String,
  login: String,
  name: String,
}

generate_getters! {
  for User as self {
    /// Id of the user.
    id -> &str = self.id.as_ref(),

    /// Login of the user.
    login -> &str = self.login.as_ref(),

    /// Display name, already unescaped.
    ///
    /// This is the name which appears in chat, and may contain arbitrary unicode characters.
    /// This is in contrast to [`User::login`] which is always only ASCII.
    name -> &str = self.name.as_ref(),
  }
}

/// A chat badge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Badge {
  /// `staff/1`
  Staff,

  /// `turbo/1`
  Turbo,

  /// `broadcaster/1`
  Broadcaster,

  /// `moderator/1`
  Moderator,

  /// `vip/1`
  Vip,

  /// `subscriber/{version}` from `badges` + `subscriber/{months}` from `badge-info`.
  Subscriber { version: String, months: u64 },

  /// Some other badge.
  Other(BadgeData),
}

impl From<BadgeData> for Badge {
  fn from(value: BadgeData) -> Self {
    match value.name.as_str() {
      "staff" => Self::Staff,
      "turbo" => Self::Turbo,
      "broadcaster" => Self::Broadcaster,
      "moderator" => Self::Moderator,
      "vip" => Self::Vip,
      "subscriber" => Self::Subscriber {
        months: value
          .extra
          .as_deref()
          .and_then(|v| v.parse().ok())
          .unwrap_or(1),
        version: value.version,
      },
      _ => Self::Other(value),
    }
  }
}

/// Basic info about a badge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BadgeData {
  name: String,
  version: String,
  extra: Option<String>,
}

generate_getters! {
  for BadgeData as self {
    /// Name of the badge, e.g. `bits`.
    name -> &str = self.name.as_ref(),

    /// Version of the badge.
    version -> &str = self.version.as_ref(),

    /// Extra badge info from the `badge-info` tag.
    extra -> Option<&str> = self.extra.as_deref(),
  }
}

/// What a `CLEARCHAT` or `CLEARMSG` removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClearTarget {
  /// The entire chat was cleared.
  All,

  /// A user was banned, or timed out if `duration` is set.
  User {
    login: String,
    id: Option<String>,
    duration: Option<Duration>,
  },

  /// A single message was deleted.
  Message { id: String, login: Option<String> },
}

impl ClearTarget {
  /// Parse a `CLEARCHAT` or `CLEARMSG`.
  pub fn from_irc(message: &IrcMessageRef<'_>) -> Option<Self> {
    match message.command() {
      Command::ClearChat => Some(match message.body() {
        Some(login) if !login.is_empty() => ClearTarget::User {
          login: login.to_string(),
          id: message.tag(Tag::TargetUserId).map(String::from),
          duration: message.tag(Tag::BanDuration).and_then(parse_duration),
        },
        _ => ClearTarget::All,
      }),
      Command::ClearMsg => Some(ClearTarget::Message {
        id: message.tag(Tag::TargetMsgId)?.to_string(),
        login: message.tag(Tag::Login).map(String::from),
      }),
      _ => None,
    }
  }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  use chrono::TimeZone;
  Utc.timestamp_millis_opt(s.parse().ok()?).single()
}

fn parse_duration(s: &str) -> Option<Duration> {
  Some(Duration::from_secs(s.parse().ok()?))
}

fn parse_badges(badges: &str, badge_info: &str) -> Vec<Badge> {
  if badges.is_empty() {
    return Vec::new();
  }

  let badge_info = badge_info
    .split(',')
    .flat_map(|info| info.split_once('/'))
    .collect::<SmallVec<[_; 8]>>();

  badges
    .split(',')
    .flat_map(|badge| badge.split_once('/'))
    .map(|(name, version)| {
      BadgeData {
        name: name.to_string(),
        version: version.to_string(),
        extra: badge_info
          .iter()
          .find(|(needle, _)| *needle == name)
          .map(|(_, value)| value.to_string()),
      }
      .into()
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::emoji::EmojiTrie;
  use crate::emote::{Cheermote, CheermoteTier, MalformedEmoteTagKind, StaticCheermotes};

  fn parse(src: &str) -> ChatMessage {
    ChatMessage::parse(&IrcMessageRef::parse(src).unwrap()).unwrap()
  }

  #[test]
  fn basic() {
    let msg = parse("@badge-info=;badges=;color=#0000FF;display-name=JuN1oRRRR;emotes=;flags=;id=e9d998c3-36f1-430f-89ec-6b887c28af36;mod=0;room-id=11148817;subscriber=0;tmi-sent-ts=1594545155039;turbo=0;user-id=29803735;user-type= :jun1orrrr!jun1orrrr@jun1orrrr.tmi.twitch.tv PRIVMSG #pajlada :dank cam");
    assert_eq!(msg.channel(), "pajlada");
    assert_eq!(msg.channel_id(), "11148817");
    assert_eq!(msg.message_id(), "e9d998c3-36f1-430f-89ec-6b887c28af36");
    assert_eq!(msg.sender().id(), "29803735");
    assert_eq!(msg.sender().login(), "jun1orrrr");
    assert_eq!(msg.sender().name(), "JuN1oRRRR");
    assert_eq!(msg.text(), "dank cam");
    assert!(!msg.is_action());
    assert!(msg.badges().is_empty());
    assert_eq!(msg.color(), Some("#0000FF"));
    assert_eq!(msg.bits(), None);
    assert_eq!(msg.timestamp().timestamp_millis(), 1594545155039);
    assert!(msg.emotes().is_empty());
    assert!(msg.emote_error().is_none());
  }

  #[test]
  fn action_and_badges() {
    let msg = parse("@badge-info=subscriber/22;badges=moderator/1,subscriber/12,bits/100;color=#19E6E6;display-name=randers;emotes=;flags=;id=d831d848-b7c7-4559-ae3a-2cb88f4dbfed;mod=1;room-id=11148817;subscriber=1;tmi-sent-ts=1594555275886;turbo=0;user-id=40286300;user-type=mod :randers!randers@randers.tmi.twitch.tv PRIVMSG #pajlada :\u{1}ACTION -tags\u{1}");
    assert_eq!(msg.text(), "-tags");
    assert!(msg.is_action());
    assert_eq!(
      msg.badges(),
      &[
        Badge::Moderator,
        Badge::Subscriber {
          version: "12".into(),
          months: 22
        },
        Badge::Other(BadgeData {
          name: "bits".into(),
          version: "100".into(),
          extra: None,
        }),
      ]
    );
  }

  #[test]
  fn escaped_display_name() {
    let msg = parse("@badge-info=;badges=;color=;display-name=Riot\\sGames;emotes=;flags=;id=bdfa278e-11c4-484f-9491-0a61b16fab60;mod=1;room-id=36029255;subscriber=0;tmi-sent-ts=1593953876927;turbo=0;user-id=36029255;user-type= :riotgames!riotgames@riotgames.tmi.twitch.tv PRIVMSG #riotgames :test fake message");
    assert_eq!(msg.sender().name(), "Riot Games");
    assert_eq!(msg.color(), None);
  }

  #[test]
  fn twitch_emotes_and_emoji() {
    let msg = parse("@badge-info=;badges=;color=;display-name=boring_nick;emotes=25:0-4;id=3d9540a0-04b6-4bea-baf9-9165b14160be;room-id=55203741;tmi-sent-ts=1696093084212;user-id=111024753 :boring_nick!boring_nick@boring_nick.tmi.twitch.tv PRIVMSG #moscowwbish :Kappa 😸");
    let emotes = msg.emotes();
    assert_eq!(emotes.len(), 2);
    assert_eq!(emotes[0].id, "twitch_25");
    assert_eq!((emotes[0].start_index, emotes[0].end_index), (0, 4));
    assert_eq!(emotes[1].id, "emoji_1f638");
    assert_eq!((emotes[1].start_index, emotes[1].end_index), (6, 7));
  }

  #[test]
  fn malformed_emote_tag_keeps_message() {
    let msg = parse("@badge-info=;badges=;color=;display-name=a;emotes=25:0-40;id=1;room-id=2;tmi-sent-ts=1696093084212;user-id=3 :a!a@a.tmi.twitch.tv PRIVMSG #a :Kappa");
    assert_eq!(msg.text(), "Kappa");
    assert!(msg.emotes().is_empty());
    assert_eq!(
      msg.emote_error().map(|e| e.kind),
      Some(MalformedEmoteTagKind::InvalidRange)
    );
  }

  #[test]
  fn cheer() {
    let cheermotes = StaticCheermotes::new().global(Cheermote::new(
      "Cheer",
      vec![
        CheermoteTier {
          min_bits: 1,
          id: "1".into(),
          url: "https://example.com/1.gif".into(),
          animated: true,
          color: Some("#979797".into()),
        },
        CheermoteTier {
          min_bits: 100,
          id: "100".into(),
          url: "https://example.com/100.gif".into(),
          animated: true,
          color: Some("#9c3ee8".into()),
        },
      ],
    ));
    let trie = EmojiTrie::new();
    let extractor = Extractor::new(&trie).with_cheermotes(&cheermotes);

    let src = "@badge-info=;badges=bits/100;bits=100;color=#004B49;display-name=TETYYS;emotes=;id=d7f03a35-f339-41ca-b4d4-7c0721438570;room-id=11148817;tmi-sent-ts=1594571566672;user-id=36175310 :tetyys!tetyys@tetyys.tmi.twitch.tv PRIVMSG #pajlada :cheer100 nice";
    let msg = ChatMessage::parse_with(&IrcMessageRef::parse(src).unwrap(), &extractor).unwrap();
    assert_eq!(msg.bits(), Some(100));
    assert_eq!(msg.emotes().len(), 1);
    assert_eq!(msg.emotes()[0].id, "cheer_cheer_100");
    assert_eq!(msg.emotes()[0].bits, 100);
    assert_eq!(msg.emotes()[0].color.as_deref(), Some("#9c3ee8"));
  }

  #[test]
  fn missing_tags() {
    let src = ":jun1orrrr!jun1orrrr@jun1orrrr.tmi.twitch.tv PRIVMSG #pajlada :dank cam";
    assert!(ChatMessage::parse(&IrcMessageRef::parse(src).unwrap()).is_none());
    let src = ":tmi.twitch.tv NOTICE * :Login authentication failed";
    assert!(ChatMessage::parse(&IrcMessageRef::parse(src).unwrap()).is_none());
  }

  #[test]
  fn serialize() {
    let msg = parse("@badge-info=;badges=vip/1;color=;display-name=a;emotes=;id=1;room-id=2;tmi-sent-ts=1594545155039;user-id=3 :a!a@a.tmi.twitch.tv PRIVMSG #a :hi");
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["sender"]["login"], "a");
    assert_eq!(json["badges"][0], "vip");
    assert_eq!(json["timestamp"], "2020-07-12T09:12:35.039Z");
    assert!(json.get("emote_error").is_none());
  }

  #[test]
  fn clear_targets() {
    let clear = |src: &str| ClearTarget::from_irc(&IrcMessageRef::parse(src).unwrap());

    assert_eq!(
      clear("@room-id=11148817;tmi-sent-ts=1594561392337 :tmi.twitch.tv CLEARCHAT #pajlada"),
      Some(ClearTarget::All)
    );
    assert_eq!(
      clear("@ban-duration=1;room-id=11148817;target-user-id=148973258;tmi-sent-ts=1594553828245 :tmi.twitch.tv CLEARCHAT #pajlada :fabzeef"),
      Some(ClearTarget::User {
        login: "fabzeef".into(),
        id: Some("148973258".into()),
        duration: Some(Duration::from_secs(1)),
      })
    );
    assert_eq!(
      clear("@login=alazymeme;room-id=;target-msg-id=3c92014f-340a-4dc3-a9c9-e5cf182f4a84;tmi-sent-ts=1594561955611 :tmi.twitch.tv CLEARMSG #pajlada :NIGHT CUNT"),
      Some(ClearTarget::Message {
        id: "3c92014f-340a-4dc3-a9c9-e5cf182f4a84".into(),
        login: Some("alazymeme".into()),
      })
    );
    assert_eq!(clear(":tmi.twitch.tv PING"), None);
  }
}
