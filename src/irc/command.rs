use std::fmt::Display;

use super::MalformedFrame;
use crate::common::Span;

/// The command of a Twitch IRC frame.
///
/// Only the commands the chat client acts on have their own variant,
/// everything else is [`Command::Other`]. Converting back with
/// [`Command::as_str`] always yields the original token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Command<'src> {
  /// `PING`, answered with a `PONG`
  Ping,
  /// `PONG`
  Pong,
  /// `RECONNECT`, the server is about to restart
  Reconnect,
  /// `PRIVMSG`, a chat message
  Privmsg,
  /// `NOTICE`
  Notice,
  /// `CLEARCHAT`, a timeout, ban, or full chat clear
  ClearChat,
  /// `CLEARMSG`, a single deleted message
  ClearMsg,
  /// `CAP`, capability negotiation
  Capability,
  /// `001`, login succeeded
  RplWelcome,
  /// Any other command, including the numerics sent after `001`
  Other(&'src str),
}

impl<'src> Command<'src> {
  /// Classify a command token.
  pub fn from_token(token: &'src str) -> Self {
    match token {
      "PING" => Command::Ping,
      "PONG" => Command::Pong,
      "RECONNECT" => Command::Reconnect,
      "PRIVMSG" => Command::Privmsg,
      "NOTICE" => Command::Notice,
      "CLEARCHAT" => Command::ClearChat,
      "CLEARMSG" => Command::ClearMsg,
      "CAP" => Command::Capability,
      "001" => Command::RplWelcome,
      other => Command::Other(other),
    }
  }

  /// The command token.
  pub fn as_str(&self) -> &'src str {
    match self {
      Command::Ping => "PING",
      Command::Pong => "PONG",
      Command::Reconnect => "RECONNECT",
      Command::Privmsg => "PRIVMSG",
      Command::Notice => "NOTICE",
      Command::ClearChat => "CLEARCHAT",
      Command::ClearMsg => "CLEARMSG",
      Command::Capability => "CAP",
      Command::RplWelcome => "001",
      Command::Other(token) => token,
    }
  }
}

impl<'src> Display for Command<'src> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// `COMMAND <rest>`
///
/// Returns the span of the command token, which ends at the next space
/// or at the end of the frame.
#[inline(always)]
pub(super) fn parse(src: &str, pos: &mut usize) -> Result<Span, MalformedFrame> {
  let start = *pos;
  let (end, next_pos) = match src[start..].find(' ') {
    Some(len) => (start + len, start + len + 1),
    None => (src.len(), src.len()),
  };
  if end == start {
    return Err(MalformedFrame::MissingCommand);
  }

  *pos = next_pos;
  Ok(Span::from(start..end))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn command(data: &str) -> (Command<'_>, &str) {
    let mut pos = 0;
    let span = parse(data, &mut pos).unwrap();
    (Command::from_token(&data[span]), &data[pos..])
  }

  #[test]
  fn known_command() {
    assert_eq!(command("PING <rest>"), (Command::Ping, "<rest>"));
    assert_eq!(command("001 justinfan :Welcome"), (Command::RplWelcome, "justinfan :Welcome"));
  }

  #[test]
  fn unknown_command() {
    let (cmd, rest) = command("HOSTTARGET #a :b");
    assert_eq!(cmd, Command::Other("HOSTTARGET"));
    assert_eq!(rest, "#a :b");
    assert_eq!(command("376 realeris :>").0, Command::Other("376"));
  }

  #[test]
  fn command_at_end_of_frame() {
    let data = "RECONNECT";
    let mut pos = 0;
    let span = parse(data, &mut pos).unwrap();
    assert_eq!(Command::from_token(&data[span]), Command::Reconnect);
    assert_eq!(pos, data.len());
  }

  #[test]
  fn token_is_preserved() {
    for token in [
      "PING", "PONG", "RECONNECT", "PRIVMSG", "NOTICE", "CLEARCHAT", "CLEARMSG", "CAP", "001",
      "JOIN", "USERSTATE", "353", "ping",
    ] {
      assert_eq!(Command::from_token(token).as_str(), token);
      assert_eq!(Command::from_token(token).to_string(), token);
    }
  }

  #[test]
  fn empty_command() {
    let mut pos = 0;
    assert!(matches!(
      parse("", &mut pos),
      Err(MalformedFrame::MissingCommand)
    ));
  }
}
