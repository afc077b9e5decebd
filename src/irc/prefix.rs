use super::MalformedFrame;
use crate::common::Span;

#[derive(Debug, Clone, Copy)]
pub(super) enum RawPrefix {
  Server {
    host: Span,
  },
  User {
    nick: Span,
    user: Option<Span>,
    host: Option<Span>,
  },
}

impl RawPrefix {
  pub(super) fn get<'src>(&self, src: &'src str) -> Prefix<'src> {
    match *self {
      RawPrefix::Server { host } => Prefix::Server { host: &src[host] },
      RawPrefix::User { nick, user, host } => Prefix::User {
        nick: &src[nick],
        user: user.map(|span| &src[span]),
        host: host.map(|span| &src[span]),
      },
    }
  }

  /// Classify `src[span]` as either a server or a user prefix.
  ///
  /// ```text,ignore
  /// nick!user@host
  /// nick!user
  /// nick@host
  /// server.host
  /// nick
  /// ```
  fn classify(src: &str, span: Span) -> RawPrefix {
    let raw = &src[span];
    let start = span.start as usize;
    let at = |i: usize, j: usize| Span::from(start + i..start + j);

    if let Some(bang) = raw.find('!') {
      let rest = &raw[bang + 1..];
      let nick = at(0, bang);
      return match rest.find('@') {
        Some(i) => {
          let at_sign = bang + 1 + i;
          RawPrefix::User {
            nick,
            user: Some(at(bang + 1, at_sign)),
            host: Some(at(at_sign + 1, raw.len())),
          }
        }
        None => RawPrefix::User {
          nick,
          user: Some(at(bang + 1, raw.len())),
          host: None,
        },
      };
    }

    if let Some(at_sign) = raw.find('@') {
      return RawPrefix::User {
        nick: at(0, at_sign),
        user: None,
        host: Some(at(at_sign + 1, raw.len())),
      };
    }

    if raw.contains('.') {
      return RawPrefix::Server { host: span };
    }

    RawPrefix::User {
      nick: span,
      user: None,
      host: None,
    }
  }
}

/// A message prefix.
///
/// ```text,ignore
/// :nick!user@host
/// :tmi.twitch.tv
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Prefix<'src> {
  /// The message originated from a server, e.g. `tmi.twitch.tv`.
  Server {
    /// Hostname of the server.
    host: &'src str,
  },
  /// The message originated from a user.
  User {
    /// The `nick` part of the prefix.
    nick: &'src str,
    /// The `user` part of the prefix.
    user: Option<&'src str>,
    /// The `host` part of the prefix.
    host: Option<&'src str>,
  },
}

/// The prefix was empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrefixParseError;

impl std::fmt::Display for PrefixParseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("could not parse prefix: prefix is empty")
  }
}

impl std::error::Error for PrefixParseError {}

impl<'src> Prefix<'src> {
  /// Classify a raw prefix (without the leading `:`).
  ///
  /// Every non-empty input is classified, nothing else is rejected.
  pub fn parse(raw: &'src str) -> Result<Self, PrefixParseError> {
    if raw.is_empty() {
      return Err(PrefixParseError);
    }
    Ok(RawPrefix::classify(raw, Span::from(0..raw.len())).get(raw))
  }

  /// The `nick` of a user prefix.
  pub fn nick(&self) -> Option<&'src str> {
    match *self {
      Prefix::Server { .. } => None,
      Prefix::User { nick, .. } => Some(nick),
    }
  }

  /// The `host` part of the prefix, if there is one.
  pub fn host(&self) -> Option<&'src str> {
    match *self {
      Prefix::Server { host } => Some(host),
      Prefix::User { host, .. } => host,
    }
  }
}

impl<'src> std::fmt::Display for Prefix<'src> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match *self {
      Prefix::Server { host } => f.write_str(host),
      Prefix::User { nick, user, host } => {
        f.write_str(nick)?;
        if let Some(user) = user {
          write!(f, "!{user}")?;
        }
        if let Some(host) = host {
          write!(f, "@{host}")?;
        }
        Ok(())
      }
    }
  }
}

/// `:prefix <rest>`
#[inline(always)]
pub(super) fn parse(src: &str, pos: &mut usize) -> Result<Option<RawPrefix>, MalformedFrame> {
  if !src[*pos..].starts_with(':') {
    return Ok(None);
  }

  let start = *pos + 1;
  let Some(end) = src[start..].find(' ') else {
    return Err(MalformedFrame::UnterminatedPrefix);
  };
  let end = start + end;
  *pos = end + 1;

  let span = Span::from(start..end);
  if span.is_empty() {
    return Err(MalformedFrame::UnterminatedPrefix);
  }

  Ok(Some(RawPrefix::classify(src, span)))
}
