use super::{
  qualify_topic, topic_category, Incoming, Mode, NegotiationError, Negotiator, NoToken, Outcome,
  Outgoing, Request, TokenProvider, TopicSnapshot, DEFAULT_MAX_RETRIES, PING,
};
use crate::keepalive::{
  Backoff, KeepAlive, KeepAliveAction, KeepAliveConfig, DEFAULT_BACKOFF, DEFAULT_KEEPALIVE,
  DEFAULT_TIMEOUT,
};
use crate::transport::{Connector, Duplex, TransportError};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// A negotiation which is not answered within this long is failed.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// PubSub configuration.
#[derive(Clone)]
pub struct Config {
  /// Used to qualify topics without a `.`, see [`qualify_topic`].
  pub channel_id: Option<String>,

  /// Supplies `auth_token` for every negotiation.
  pub token: Arc<dyn TokenProvider>,

  pub keepalive: KeepAliveConfig,

  /// Used when the connection is lost.
  pub backoff: Backoff,

  /// How many times a failed negotiation is retried.
  pub max_retries: u32,

  pub negotiation_timeout: Duration,

  pub connect_timeout: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      channel_id: None,
      token: Arc::new(NoToken),
      keepalive: DEFAULT_KEEPALIVE,
      backoff: DEFAULT_BACKOFF,
      max_retries: DEFAULT_MAX_RETRIES,
      negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
      connect_timeout: DEFAULT_TIMEOUT,
    }
  }
}

impl Config {
  pub fn channel_id(mut self, channel_id: impl Into<String>) -> Self {
    self.channel_id = Some(channel_id.into());
    self
  }

  pub fn token(mut self, token: impl TokenProvider + 'static) -> Self {
    self.token = Arc::new(token);
    self
  }

  pub fn keepalive(mut self, keepalive: KeepAliveConfig) -> Self {
    self.keepalive = keepalive;
    self
  }

  pub fn backoff(mut self, backoff: Backoff) -> Self {
    self.backoff = backoff;
    self
  }

  pub fn max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
    self.negotiation_timeout = timeout;
    self
  }

  pub fn connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = timeout;
    self
  }
}

impl std::fmt::Debug for Config {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Config")
      .field("channel_id", &self.channel_id)
      .field("keepalive", &self.keepalive)
      .field("backoff", &self.backoff)
      .field("max_retries", &self.max_retries)
      .field("negotiation_timeout", &self.negotiation_timeout)
      .field("connect_timeout", &self.connect_timeout)
      .finish_non_exhaustive()
  }
}

/// Something happened on the PubSub connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PubSubEvent {
  /// A connection was established, including after a reconnect.
  Connected,
  /// The connection was lost, and a new one is being opened.
  ///
  /// Every accepted topic will be listened to again.
  Reconnecting { reason: String },
  Listened { topic: String },
  Unlistened { topic: String },
  NegotiationFailed(NegotiationError),
  Message {
    topic: String,
    /// The part of the topic before the first `.`.
    category: String,
    /// Raw JSON.
    payload: String,
  },
  /// The connection is gone for good. This is always the last event.
  Closed,
}

impl PubSubEvent {
  /// Deserialize the payload of a [`PubSubEvent::Message`].
  pub fn json<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
    match self {
      PubSubEvent::Message { payload, .. } => Some(serde_json::from_str(payload)),
      _ => None,
    }
  }
}

enum Command {
  Negotiate(Mode, String),
  Snapshot(oneshot::Sender<TopicSnapshot>),
  Close,
}

/// Handle to a PubSub connection.
///
/// Cloning the handle is cheap. The connection is closed once
/// [`PubSub::close`] is called, or every handle is dropped.
#[derive(Clone)]
pub struct PubSub {
  commands: mpsc::UnboundedSender<Command>,
  channel_id: Option<String>,
}

static_assert_send!(PubSub);
static_assert_sync!(PubSub);

impl PubSub {
  /// Connect using `connector`, and spawn the connection task.
  ///
  /// Only the first connection attempt is reported here,
  /// later failures are retried according to [`Config::backoff`].
  pub async fn connect<C>(
    config: Config,
    connector: C,
  ) -> Result<(PubSub, mpsc::UnboundedReceiver<PubSubEvent>), ConnectError>
  where
    C: Connector + Send + Sync + 'static,
  {
    trace!("connecting to pubsub");
    let duplex = open(&connector, config.connect_timeout).await?;

    let (commands, receiver) = mpsc::unbounded_channel();
    let (events, events_rx) = mpsc::unbounded_channel();
    let pubsub = PubSub {
      commands,
      channel_id: config.channel_id.clone(),
    };
    let worker = Worker {
      negotiator: Negotiator::new(config.max_retries),
      keepalive: KeepAlive::new(config.keepalive, now()),
      config,
      connector,
      commands: receiver,
      events,
    };
    tokio::spawn(worker.run(duplex));

    Ok((pubsub, events_rx))
  }

  /// Queue a `LISTEN` for `topic`.
  ///
  /// The outcome is reported as [`PubSubEvent::Listened`] or [`PubSubEvent::NegotiationFailed`].
  pub fn listen(&self, topic: impl AsRef<str>) -> Result<(), Closed> {
    self.negotiate(Mode::Listen, topic.as_ref())
  }

  /// Queue an `UNLISTEN` for `topic`.
  ///
  /// The outcome is reported as [`PubSubEvent::Unlistened`] or [`PubSubEvent::NegotiationFailed`].
  pub fn unlisten(&self, topic: impl AsRef<str>) -> Result<(), Closed> {
    self.negotiate(Mode::Unlisten, topic.as_ref())
  }

  fn negotiate(&self, mode: Mode, topic: &str) -> Result<(), Closed> {
    let topic = qualify_topic(topic, self.channel_id.as_deref());
    self
      .commands
      .send(Command::Negotiate(mode, topic))
      .map_err(|_| Closed)
  }

  /// A copy of the current negotiation state.
  pub async fn snapshot(&self) -> Result<TopicSnapshot, Closed> {
    let (tx, rx) = oneshot::channel();
    self.commands.send(Command::Snapshot(tx)).map_err(|_| Closed)?;
    rx.await.map_err(|_| Closed)
  }

  /// Close the connection.
  ///
  /// In-flight negotiations are abandoned.
  pub fn close(&self) {
    let _ = self.commands.send(Command::Close);
  }

  pub fn is_closed(&self) -> bool {
    self.commands.is_closed()
  }
}

fn now() -> std::time::Instant {
  Instant::now().into_std()
}

async fn open<C: Connector>(connector: &C, timeout: Duration) -> Result<Duplex, TransportError> {
  tokio::time::timeout(timeout, connector.connect()).await?
}

enum Exit {
  Close,
  Reconnect(String),
}

struct Worker<C> {
  config: Config,
  connector: C,
  negotiator: Negotiator,
  keepalive: KeepAlive,
  commands: mpsc::UnboundedReceiver<Command>,
  events: mpsc::UnboundedSender<PubSubEvent>,
}

impl<C: Connector> Worker<C> {
  async fn run(mut self, mut duplex: Duplex) {
    loop {
      let reason = match self.session(&mut duplex).await {
        Exit::Close => break,
        Exit::Reconnect(reason) => reason,
      };
      warn!("pubsub connection lost: {reason}");
      self.emit(PubSubEvent::Reconnecting { reason });
      for outcome in self.negotiator.on_reconnect() {
        self.report(outcome);
      }

      match self.reconnect().await {
        Some(next) => duplex = next,
        None => break,
      }
    }

    let abandoned = self.negotiator.abandon();
    debug!(abandoned, "pubsub closed");
    self.emit(PubSubEvent::Closed);
  }

  async fn session(&mut self, duplex: &mut Duplex) -> Exit {
    self.keepalive.reset(now());
    debug!("pubsub connected");
    self.emit(PubSubEvent::Connected);

    loop {
      if let Err(e) = self.flush(duplex).await {
        return Exit::Reconnect(e.to_string());
      }

      let deadline = match self.negotiator.next_timeout(self.config.negotiation_timeout) {
        Some(timeout) => timeout.min(self.keepalive.next_deadline()),
        None => self.keepalive.next_deadline(),
      };

      tokio::select! {
        _ = tokio::time::sleep_until(Instant::from_std(deadline)) => {
          if let Some(exit) = self.on_timer(duplex).await {
            return exit;
          }
        }
        payload = duplex.incoming.recv() => match payload {
          Some(Ok(payload)) => {
            if let Some(exit) = self.on_payload(&payload) {
              return exit;
            }
          }
          Some(Err(e)) => return Exit::Reconnect(e.to_string()),
          None => return Exit::Reconnect(TransportError::Closed.to_string()),
        },
        command = self.commands.recv() => match command {
          Some(Command::Close) | None => return Exit::Close,
          Some(command) => self.on_command(command),
        },
      }
    }
  }

  async fn reconnect(&mut self) -> Option<Duplex> {
    for (attempt, delay) in self.config.backoff.delays().enumerate() {
      debug!(attempt, ?delay, "waiting to reconnect");
      let sleep = tokio::time::sleep(delay);
      tokio::pin!(sleep);
      loop {
        tokio::select! {
          _ = &mut sleep => break,
          command = self.commands.recv() => match command {
            Some(Command::Close) | None => return None,
            Some(command) => self.on_command(command),
          },
        }
      }

      match open(&self.connector, self.config.connect_timeout).await {
        Ok(duplex) => return Some(duplex),
        Err(e) => warn!("reconnect attempt {} failed: {e}", attempt + 1),
      }
    }

    warn!("giving up on reconnecting to pubsub");
    None
  }

  /// Send every request the negotiator is willing to send right now.
  async fn flush(&mut self, duplex: &Duplex) -> Result<(), TransportError> {
    while let Some(Outgoing { mode, topic, nonce }) = self.negotiator.next_request(now()) {
      let request = Request::negotiate(mode, topic, nonce, self.config.token.token());
      match request.to_json() {
        Ok(json) => {
          trace!(?request, "sending");
          duplex.send(json).await?;
        }
        Err(e) => warn!("failed to serialize {request:?}: {e}"),
      }
    }
    Ok(())
  }

  async fn on_timer(&mut self, duplex: &Duplex) -> Option<Exit> {
    let now = now();
    for outcome in self
      .negotiator
      .expire(now, self.config.negotiation_timeout)
    {
      self.report(outcome);
    }

    match self.keepalive.poll(now) {
      KeepAliveAction::Idle => None,
      KeepAliveAction::SendPing => {
        trace!("sending PING");
        match duplex.send(PING.to_string()).await {
          Ok(()) => None,
          Err(e) => Some(Exit::Reconnect(e.to_string())),
        }
      }
      KeepAliveAction::Dead => Some(Exit::Reconnect("no PONG received in time".into())),
    }
  }

  fn on_payload(&mut self, payload: &str) -> Option<Exit> {
    trace!(payload, "received");
    let message = match Incoming::from_json(payload) {
      Ok(message) => message,
      Err(e) => {
        warn!("dropping malformed pubsub message: {e}");
        return None;
      }
    };

    match message {
      Incoming::Response { nonce, error } => match self.negotiator.on_response(&nonce, error) {
        Some(outcome) => self.report(outcome),
        None => debug!(%nonce, "response to unknown nonce"),
      },
      Incoming::Pong => self.keepalive.on_pong(now()),
      Incoming::Reconnect => return Some(Exit::Reconnect("server requested a reconnect".into())),
      Incoming::Message { data } => {
        let category = topic_category(&data.topic).to_string();
        self.emit(PubSubEvent::Message {
          topic: data.topic,
          category,
          payload: data.message,
        });
      }
    }
    None
  }

  fn on_command(&mut self, command: Command) {
    match command {
      Command::Negotiate(mode, topic) => self.negotiator.enqueue(mode, topic),
      Command::Snapshot(tx) => {
        let _ = tx.send(self.negotiator.snapshot());
      }
      Command::Close => {}
    }
  }

  fn report(&self, outcome: Outcome) {
    match outcome {
      Outcome::Listened(topic) => {
        debug!(%topic, "listening");
        self.emit(PubSubEvent::Listened { topic });
      }
      Outcome::Unlistened(topic) => {
        debug!(%topic, "no longer listening");
        self.emit(PubSubEvent::Unlistened { topic });
      }
      Outcome::Retrying { mode, topic } => warn!("{mode} {topic} failed, retrying"),
      Outcome::Failed(error) => {
        warn!("{error}");
        self.emit(PubSubEvent::NegotiationFailed(error));
      }
    }
  }

  fn emit(&self, event: PubSubEvent) {
    let _ = self.events.send(event);
  }
}

/// The PubSub connection is closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Closed;

impl Display for Closed {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("pubsub connection is closed")
  }
}

impl std::error::Error for Closed {}

/// Failed to open the first PubSub connection.
#[derive(Debug)]
pub enum ConnectError {
  Transport(TransportError),
}

impl From<TransportError> for ConnectError {
  fn from(value: TransportError) -> Self {
    Self::Transport(value)
  }
}

impl Display for ConnectError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConnectError::Transport(e) => write!(f, "failed to connect to pubsub: {e}"),
    }
  }
}

impl std::error::Error for ConnectError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ConnectError::Transport(e) => Some(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn event_json() {
    #[derive(serde::Deserialize)]
    struct ViewCount {
      viewers: u64,
    }

    let event = PubSubEvent::Message {
      topic: "video-playback-by-id.1".into(),
      category: "video-playback-by-id".into(),
      payload: r#"{"type":"viewcount","viewers":42}"#.into(),
    };
    let count = event.json::<ViewCount>().unwrap().unwrap();
    assert_eq!(count.viewers, 42);
    assert!(PubSubEvent::Connected.json::<ViewCount>().is_none());
  }

  #[test]
  fn config_debug_omits_token() {
    let config = Config::default().token(crate::pubsub::StaticToken::new("secret"));
    assert!(!format!("{config:?}").contains("secret"));
  }
}
