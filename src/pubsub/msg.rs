//! PubSub wire format.

use super::Mode;
use serde::de::{Deserialize, Deserializer};
use serde::Serialize;
use std::fmt::Display;

/// A message sent to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Request {
  Listen { data: TopicsData, nonce: String },
  Unlisten { data: TopicsData, nonce: String },
  Ping,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TopicsData {
  pub topics: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auth_token: Option<String>,
}

impl std::fmt::Debug for TopicsData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TopicsData")
      .field("topics", &self.topics)
      .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
      .finish()
  }
}

impl Request {
  pub fn negotiate(
    mode: Mode,
    topic: impl Into<String>,
    nonce: impl Into<String>,
    auth_token: Option<String>,
  ) -> Self {
    let data = TopicsData {
      topics: vec![topic.into()],
      auth_token,
    };
    let nonce = nonce.into();
    match mode {
      Mode::Listen => Request::Listen { data, nonce },
      Mode::Unlisten => Request::Unlisten { data, nonce },
    }
  }

  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

/// A message received from the server.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Incoming {
  /// Answer to a [`Request::Listen`] or [`Request::Unlisten`] with the same nonce.
  Response {
    #[serde(default)]
    nonce: String,
    /// `None` on success.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    error: Option<ResponseError>,
  },
  Pong,
  /// The server is going away, the client should reconnect.
  Reconnect,
  Message {
    data: MessageData,
  },
}

impl Incoming {
  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct MessageData {
  pub topic: String,
  /// The event payload, itself a JSON document.
  pub message: String,
}

/// Error returned by the server in a `RESPONSE`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ResponseError {
  BadMessage,
  BadAuth,
  BadTopic,
  Server,
  Other(String),
}

impl From<&str> for ResponseError {
  fn from(value: &str) -> Self {
    match value {
      "ERR_BADMESSAGE" => Self::BadMessage,
      "ERR_BADAUTH" => Self::BadAuth,
      "ERR_BADTOPIC" => Self::BadTopic,
      "ERR_SERVER" => Self::Server,
      other => Self::Other(other.to_string()),
    }
  }
}

impl Display for ResponseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ResponseError::BadMessage => f.write_str("ERR_BADMESSAGE"),
      ResponseError::BadAuth => f.write_str("ERR_BADAUTH"),
      ResponseError::BadTopic => f.write_str("ERR_BADTOPIC"),
      ResponseError::Server => f.write_str("ERR_SERVER"),
      ResponseError::Other(other) => f.write_str(other),
    }
  }
}

impl std::error::Error for ResponseError {}

fn empty_string_as_none<'de, D>(de: D) -> Result<Option<ResponseError>, D::Error>
where
  D: Deserializer<'de>,
{
  let error = Option::<String>::deserialize(de)?;
  Ok(
    error
      .filter(|error| !error.is_empty())
      .map(|error| ResponseError::from(error.as_str())),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn serialize_listen() {
    let request = Request::negotiate(
      Mode::Listen,
      "video-playback-by-id.12345",
      "44h1k13746815ab1r2",
      Some("cfabdegwdoklmawdzdo98xt2fo512y".into()),
    );
    insta::assert_snapshot!(request.to_json().unwrap(), @r###"{"type":"LISTEN","data":{"topics":["video-playback-by-id.12345"],"auth_token":"cfabdegwdoklmawdzdo98xt2fo512y"},"nonce":"44h1k13746815ab1r2"}"###);
  }

  #[test]
  fn serialize_unlisten_without_token() {
    let request = Request::negotiate(Mode::Unlisten, "broadcast-settings-update.1", "n", None);
    insta::assert_snapshot!(request.to_json().unwrap(), @r###"{"type":"UNLISTEN","data":{"topics":["broadcast-settings-update.1"]},"nonce":"n"}"###);
  }

  #[test]
  fn serialize_ping() {
    insta::assert_snapshot!(Request::Ping.to_json().unwrap(), @r###"{"type":"PING"}"###);
  }

  #[test]
  fn token_is_not_debug_printed() {
    let request = Request::negotiate(Mode::Listen, "a.1", "n", Some("secret".into()));
    assert!(!format!("{request:?}").contains("secret"));
  }

  #[test]
  fn deserialize_pong() {
    assert_eq!(
      Incoming::from_json(r#"{ "type": "PONG" }"#).unwrap(),
      Incoming::Pong
    );
  }

  #[test]
  fn deserialize_reconnect() {
    assert_eq!(
      Incoming::from_json(r#"{ "type": "RECONNECT" }"#).unwrap(),
      Incoming::Reconnect
    );
  }

  #[test]
  fn deserialize_response() {
    let ok = r#"{ "type": "RESPONSE", "nonce": "44h1k13746815ab1r2", "error": "" }"#;
    assert_eq!(
      Incoming::from_json(ok).unwrap(),
      Incoming::Response {
        nonce: "44h1k13746815ab1r2".into(),
        error: None,
      }
    );

    let err = r#"{ "type": "RESPONSE", "nonce": "abc", "error": "ERR_BADAUTH" }"#;
    assert_eq!(
      Incoming::from_json(err).unwrap(),
      Incoming::Response {
        nonce: "abc".into(),
        error: Some(ResponseError::BadAuth),
      }
    );

    let other = r#"{ "type": "RESPONSE", "nonce": "abc", "error": "ERR_NEW" }"#;
    assert_eq!(
      Incoming::from_json(other).unwrap(),
      Incoming::Response {
        nonce: "abc".into(),
        error: Some(ResponseError::Other("ERR_NEW".into())),
      }
    );
  }

  #[test]
  fn deserialize_message() {
    let json = r#"{
      "type": "MESSAGE",
      "data": {
        "topic": "video-playback-by-id.12345",
        "message": "{\"type\":\"viewcount\",\"viewers\":42}"
      }
    }"#;
    assert_eq!(
      Incoming::from_json(json).unwrap(),
      Incoming::Message {
        data: MessageData {
          topic: "video-playback-by-id.12345".into(),
          message: r#"{"type":"viewcount","viewers":42}"#.into(),
        }
      }
    );
  }

  #[test]
  fn unknown_type() {
    assert!(Incoming::from_json(r#"{ "type": "WHAT" }"#).is_err());
  }
}
