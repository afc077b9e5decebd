//! ## Transport
//!
//! A connection is a pair of channels, see [`Duplex`].
//! [`Connector`] opens new connections, [`WsConnector`] is the WebSocket implementation.

use futures_util::{SinkExt as _, StreamExt as _};
use std::fmt::Display;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

/// Twitch IRC over WebSocket.
pub const CHAT_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Twitch PubSub.
pub const PUBSUB_URL: &str = "wss://pubsub-edge.twitch.tv";

const BUFFER: usize = 64;

/// One open connection.
///
/// Dropping `outgoing` closes the connection.
/// `incoming` ends after yielding an error, or when the server closes the connection.
#[derive(Debug)]
pub struct Duplex {
  pub outgoing: mpsc::Sender<String>,
  pub incoming: mpsc::Receiver<Result<String, TransportError>>,
}

/// The other end of a [`Duplex`].
#[derive(Debug)]
pub struct Peer {
  /// Payloads sent through [`Duplex::outgoing`].
  pub incoming: mpsc::Receiver<String>,
  /// Payloads received through [`Duplex::incoming`].
  pub outgoing: mpsc::Sender<Result<String, TransportError>>,
}

impl Duplex {
  /// Create a connected [`Duplex`] and [`Peer`].
  pub fn channel(buffer: usize) -> (Duplex, Peer) {
    let (to_peer, from_duplex) = mpsc::channel(buffer);
    let (to_duplex, from_peer) = mpsc::channel(buffer);
    (
      Duplex {
        outgoing: to_peer,
        incoming: from_peer,
      },
      Peer {
        incoming: from_duplex,
        outgoing: to_duplex,
      },
    )
  }

  /// Send one payload.
  pub async fn send(&self, payload: String) -> Result<(), TransportError> {
    self
      .outgoing
      .send(payload)
      .await
      .map_err(|_| TransportError::Closed)
  }
}

/// Opens connections.
pub trait Connector {
  fn connect(&self) -> impl Future<Output = Result<Duplex, TransportError>> + Send;
}

/// Connects over WebSocket, exchanging text frames.
#[derive(Clone, Debug)]
pub struct WsConnector {
  url: String,
}

impl WsConnector {
  pub fn new(url: impl Into<String>) -> Self {
    Self { url: url.into() }
  }

  /// Connector for [`CHAT_URL`].
  pub fn chat() -> Self {
    Self::new(CHAT_URL)
  }

  /// Connector for [`PUBSUB_URL`].
  pub fn pubsub() -> Self {
    Self::new(PUBSUB_URL)
  }
}

impl Connector for WsConnector {
  async fn connect(&self) -> Result<Duplex, TransportError> {
    trace!(url = %self.url, "opening websocket");
    let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
    let (mut sink, mut stream) = stream.split();
    let (duplex, peer) = Duplex::channel(BUFFER);
    let Peer {
      incoming: mut to_send,
      outgoing: received,
    } = peer;

    tokio::spawn(async move {
      while let Some(payload) = to_send.recv().await {
        if let Err(e) = sink.send(Message::Text(payload)).await {
          debug!("websocket write failed: {e}");
          return;
        }
      }
      trace!("closing websocket");
      let _ = sink.close().await;
    });

    tokio::spawn(async move {
      while let Some(message) = stream.next().await {
        let item = match message {
          Ok(Message::Text(text)) => Ok(text),
          Ok(Message::Close(frame)) => {
            debug!(?frame, "websocket closed by server");
            let _ = received.send(Err(TransportError::Closed)).await;
            return;
          }
          Ok(_) => continue,
          Err(e) => {
            let _ = received.send(Err(e.into())).await;
            return;
          }
        };
        if received.send(item).await.is_err() {
          return;
        }
      }
    });

    Ok(duplex)
  }
}

/// Failed to open or use a connection.
#[derive(Debug)]
pub enum TransportError {
  /// The connection could not be established.
  Connect(String),
  /// The connection is closed.
  Closed,
  /// The connection did not open in time.
  Timeout,
  WebSocket(tungstenite::Error),
}

impl From<tungstenite::Error> for TransportError {
  fn from(value: tungstenite::Error) -> Self {
    match value {
      tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Self::Closed,
      e => Self::WebSocket(e),
    }
  }
}

impl From<tokio::time::error::Elapsed> for TransportError {
  fn from(_: tokio::time::error::Elapsed) -> Self {
    Self::Timeout
  }
}

impl Display for TransportError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TransportError::Connect(reason) => write!(f, "failed to connect: {reason}"),
      TransportError::Closed => write!(f, "connection closed"),
      TransportError::Timeout => write!(f, "connection timed out"),
      TransportError::WebSocket(e) => write!(f, "websocket error: {e}"),
    }
  }
}

impl std::error::Error for TransportError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      TransportError::WebSocket(e) => Some(e),
      _ => None,
    }
  }
}

static_assert_send!(Duplex);
static_assert_sync!(Duplex);
