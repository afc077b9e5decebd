//! Outgoing IRC lines.
//!
//! Every function appends a single `\r\n`-terminated line to `buf`.

use std::fmt::{self, Write};

/// `CAP REQ :twitch.tv/commands twitch.tv/tags [twitch.tv/membership]`
pub fn cap(buf: &mut String, with_membership: bool) -> fmt::Result {
  write!(
    buf,
    "CAP REQ :twitch.tv/commands twitch.tv/tags{}\r\n",
    if with_membership {
      " twitch.tv/membership"
    } else {
      ""
    }
  )
}

/// `PASS <token>`
pub fn pass(buf: &mut String, token: &str) -> fmt::Result {
  write!(buf, "PASS {token}\r\n")
}

/// `NICK <login>`
pub fn nick(buf: &mut String, login: &str) -> fmt::Result {
  write!(buf, "NICK {login}\r\n")
}

/// `JOIN #<channel>`
pub fn join(buf: &mut String, channel: &str) -> fmt::Result {
  write!(buf, "JOIN #{}\r\n", channel.trim_start_matches('#'))
}

/// `PART #<channel>`
pub fn part(buf: &mut String, channel: &str) -> fmt::Result {
  write!(buf, "PART #{}\r\n", channel.trim_start_matches('#'))
}

/// `PRIVMSG #<channel> :<text>`
pub fn privmsg(buf: &mut String, channel: &str, text: &str) -> fmt::Result {
  write!(
    buf,
    "PRIVMSG #{} :{}\r\n",
    channel.trim_start_matches('#'),
    text
  )
}

/// `PING :<nonce>`
pub fn ping(buf: &mut String, nonce: &str) -> fmt::Result {
  write!(buf, "PING :{nonce}\r\n")
}

/// `PONG [:<nonce>]`
pub fn pong(buf: &mut String, nonce: Option<&str>) -> fmt::Result {
  match nonce {
    Some(nonce) => write!(buf, "PONG :{nonce}\r\n"),
    None => write!(buf, "PONG\r\n"),
  }
}
