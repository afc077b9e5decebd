use super::{channel_name, ChatMessage, ClearTarget, DEFAULT_KEEPALIVE};
use crate::common::JoinIter as _;
use crate::emoji::EmojiTrie;
use crate::emote::{CheermoteCache, EmoteCache, ExtractOptions, Extractor, NoEmotes};
use crate::irc::{split_frames, write, Command, IrcMessage, IrcMessageRef};
use crate::keepalive::{
  Backoff, KeepAlive, KeepAliveAction, KeepAliveConfig, DEFAULT_BACKOFF, DEFAULT_TIMEOUT,
};
use crate::transport::{Connector, Duplex, TransportError};
use rand::{thread_rng, Rng};
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Sent as the `PING` nonce by the keep-alive.
const PING_NONCE: &str = "tmi.twitch.tv";

/// Credentials used to authenticate to Twitch IRC.
///
/// The [`Default`] impl uses [`Credentials::anon`].
#[derive(Clone)]
pub struct Credentials {
  /// The _login_ of the user.
  pub nick: String,

  /// The oauth2 token, including the `oauth:` prefix.
  pub pass: String,
}

impl Credentials {
  const ANON_RANGE: std::ops::Range<u32> = 10000..99999;

  pub fn new(nick: impl ToString, pass: impl ToString) -> Self {
    Self {
      nick: nick.to_string(),
      pass: pass.to_string(),
    }
  }

  /// An anonymous login.
  ///
  /// Twitch allows logging in using any username in the form `justinfan?????`
  /// where `?` is any digit. Anonymous users can read chat, but not send messages.
  pub fn anon() -> Self {
    Self {
      pass: "just_a_lil_guy".into(),
      nick: format!("justinfan{}", thread_rng().gen_range(Self::ANON_RANGE)),
    }
  }

  pub fn is_anon(&self) -> bool {
    let Some(digits) = self.nick.strip_prefix("justinfan") else {
      return false;
    };
    let Ok(digits) = digits.parse::<u32>() else {
      return false;
    };
    Self::ANON_RANGE.contains(&digits)
  }
}

impl Default for Credentials {
  fn default() -> Self {
    Self::anon()
  }
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("nick", &self.nick)
      .finish_non_exhaustive()
  }
}

/// Chat configuration.
#[derive(Clone)]
pub struct Config {
  pub credentials: Credentials,

  /// Joined after every (re)connect.
  pub channels: Vec<String>,

  /// Which emote sources are used for [`ChatMessage::emotes`].
  pub emotes: ExtractOptions,

  /// Third-party emotes.
  pub emote_cache: Arc<dyn EmoteCache>,

  pub cheermote_cache: Arc<dyn CheermoteCache>,

  pub keepalive: KeepAliveConfig,

  /// Used when the connection is lost.
  pub backoff: Backoff,

  /// Applies to opening the connection, and to the handshake.
  pub timeout: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      credentials: Credentials::default(),
      channels: Vec::new(),
      emotes: ExtractOptions::default(),
      emote_cache: Arc::new(NoEmotes),
      cheermote_cache: Arc::new(NoEmotes),
      keepalive: DEFAULT_KEEPALIVE,
      backoff: DEFAULT_BACKOFF,
      timeout: DEFAULT_TIMEOUT,
    }
  }
}

impl Config {
  pub fn credentials(mut self, credentials: Credentials) -> Self {
    self.credentials = credentials;
    self
  }

  pub fn channels(mut self, channels: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.channels = channels.into_iter().map(Into::into).collect();
    self
  }

  pub fn emotes(mut self, options: ExtractOptions) -> Self {
    self.emotes = options;
    self
  }

  pub fn emote_cache(mut self, cache: impl EmoteCache + 'static) -> Self {
    self.emote_cache = Arc::new(cache);
    self
  }

  pub fn cheermote_cache(mut self, cache: impl CheermoteCache + 'static) -> Self {
    self.cheermote_cache = Arc::new(cache);
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

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

impl std::fmt::Debug for Config {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Config")
      .field("credentials", &self.credentials)
      .field("channels", &self.channels)
      .field("emotes", &self.emotes)
      .field("keepalive", &self.keepalive)
      .field("backoff", &self.backoff)
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

/// Something happened in chat.
#[derive(Clone, Debug)]
pub enum ChatEvent {
  /// The handshake completed, including after a reconnect.
  Connected,

  /// The connection was lost, and a new one is being opened.
  ///
  /// Every channel will be joined again.
  Reconnecting { reason: String },

  Message(ChatMessage),

  /// `NOTICE`
  Notice {
    channel: Option<String>,
    /// See <https://dev.twitch.tv/docs/irc/msg-id/>.
    id: Option<String>,
    text: String,
  },

  /// `CLEARCHAT` or `CLEARMSG`
  Clear {
    channel: String,
    target: ClearTarget,
  },

  /// Any other message.
  Irc(IrcMessage),

  /// The connection is gone for good. This is always the last event.
  Closed,
}

enum Request {
  Join(String),
  Part(String),
  Privmsg { channel: String, text: String },
  Close,
}

/// Handle to a chat connection.
///
/// Cloning the handle is cheap.
#[derive(Clone)]
pub struct ChatHandle {
  requests: mpsc::UnboundedSender<Request>,
  is_anon: bool,
}

static_assert_send!(ChatHandle);
static_assert_sync!(ChatHandle);

impl ChatHandle {
  /// Join `channel`, now and after every reconnect.
  pub fn join(&self, channel: impl AsRef<str>) -> Result<(), Closed> {
    self.request(Request::Join(channel_name(channel.as_ref())))
  }

  /// Leave `channel`.
  pub fn part(&self, channel: impl AsRef<str>) -> Result<(), Closed> {
    self.request(Request::Part(channel_name(channel.as_ref())))
  }

  /// Send a message to `channel`.
  ///
  /// Messages are not queued across reconnects.
  pub fn send(&self, channel: impl AsRef<str>, text: impl Into<String>) -> Result<(), SendError> {
    if self.is_anon {
      return Err(SendError::Anonymous);
    }
    self.request(Request::Privmsg {
      channel: channel_name(channel.as_ref()),
      text: text.into(),
    })?;
    Ok(())
  }

  /// Close the connection.
  pub fn close(&self) {
    let _ = self.requests.send(Request::Close);
  }

  pub fn is_anon(&self) -> bool {
    self.is_anon
  }

  pub fn is_closed(&self) -> bool {
    self.requests.is_closed()
  }

  fn request(&self, request: Request) -> Result<(), Closed> {
    self.requests.send(request).map_err(|_| Closed)
  }
}

/// Twitch IRC client.
///
/// Receives [`ChatEvent`]s. Use [`ChatClient::handle`] to join, part and send.
pub struct ChatClient {
  handle: ChatHandle,
  events: mpsc::UnboundedReceiver<ChatEvent>,
}

impl ChatClient {
  /// Connect using `connector`, perform the handshake, and spawn the connection task.
  ///
  /// Only the first connection attempt is reported here,
  /// later failures are retried according to [`Config::backoff`].
  pub async fn connect<C>(config: Config, connector: C) -> Result<ChatClient, ConnectError>
  where
    C: Connector + Send + Sync + 'static,
  {
    trace!("connecting to chat");
    let duplex = establish(&connector, &config).await?;

    let (requests, receiver) = mpsc::unbounded_channel();
    let (events, events_rx) = mpsc::unbounded_channel();
    let handle = ChatHandle {
      requests,
      is_anon: config.credentials.is_anon(),
    };
    let worker = Worker {
      channels: config.channels.iter().map(|c| channel_name(c)).collect(),
      keepalive: KeepAlive::new(config.keepalive, now()),
      config,
      connector,
      requests: receiver,
      events,
    };
    tokio::spawn(worker.run(duplex));

    Ok(ChatClient {
      handle,
      events: events_rx,
    })
  }

  /// The next event, or [`None`] after [`ChatEvent::Closed`].
  pub async fn recv(&mut self) -> Option<ChatEvent> {
    self.events.recv().await
  }

  pub fn handle(&self) -> &ChatHandle {
    &self.handle
  }

  pub fn into_parts(self) -> (ChatHandle, mpsc::UnboundedReceiver<ChatEvent>) {
    (self.handle, self.events)
  }
}

fn now() -> std::time::Instant {
  Instant::now().into_std()
}

/// Build a single outgoing line.
fn line(f: impl FnOnce(&mut String) -> fmt::Result) -> String {
  let mut buf = String::new();
  // writing to a `String` never fails
  let _ = f(&mut buf);
  buf
}

async fn establish<C: Connector>(connector: &C, config: &Config) -> Result<Duplex, ConnectError> {
  let mut duplex = tokio::time::timeout(config.timeout, connector.connect()).await??;
  tokio::time::timeout(config.timeout, handshake(&mut duplex, &config.credentials)).await??;
  Ok(duplex)
}

async fn handshake(duplex: &mut Duplex, credentials: &Credentials) -> Result<(), ConnectError> {
  trace!("performing handshake");

  let lines = line(|buf| {
    write::cap(buf, false)?;
    write::pass(buf, &credentials.pass)?;
    write::nick(buf, &credentials.nick)
  });
  trace!(nick = %credentials.nick, "CAP REQ; PASS ***; NICK");
  duplex.send(lines).await?;

  let mut acknowledged = false;
  let mut welcomed = false;
  while !(acknowledged && welcomed) {
    let payload = match duplex.incoming.recv().await {
      Some(payload) => payload?,
      None => return Err(TransportError::Closed.into()),
    };

    for frame in split_frames(&payload) {
      let message = match IrcMessageRef::parse(frame) {
        Ok(message) => message,
        Err(e) => {
          warn!("dropping malformed frame during handshake: {e}");
          continue;
        }
      };
      trace!(?message, "received message");

      match message.command() {
        Command::Capability => {
          if message
            .channel()
            .is_some_and(|params| params.split(' ').any(|p| p == "ACK"))
          {
            trace!("received CAP * ACK");
            acknowledged = true;
          } else {
            return Err(ConnectError::Capability(message.into_owned()));
          }
        }
        Command::RplWelcome => {
          trace!("received 001");
          welcomed = true;
        }
        Command::Notice => {
          let text = message.body().unwrap_or_default();
          if text.contains("authentication failed") || text.contains("Improperly formatted auth") {
            trace!("invalid credentials");
            return Err(ConnectError::Auth);
          }
          return Err(ConnectError::Notice(message.into_owned()));
        }
        Command::Ping => {
          duplex
            .send(line(|buf| write::pong(buf, message.body())))
            .await?;
        }
        _ if !welcomed => return Err(ConnectError::Welcome(message.into_owned())),
        _ => {}
      }
    }
  }

  debug!("chat connected");
  Ok(())
}

enum Exit {
  Close,
  Reconnect(String),
}

struct Worker<C> {
  config: Config,
  connector: C,
  /// Joined after every (re)connect.
  channels: BTreeSet<String>,
  keepalive: KeepAlive,
  requests: mpsc::UnboundedReceiver<Request>,
  events: mpsc::UnboundedSender<ChatEvent>,
}

impl<C: Connector> Worker<C> {
  async fn run(mut self, mut duplex: Duplex) {
    loop {
      let reason = match self.session(&mut duplex).await {
        Exit::Close => break,
        Exit::Reconnect(reason) => reason,
      };
      warn!("chat connection lost: {reason}");
      self.emit(ChatEvent::Reconnecting { reason });

      match self.reconnect().await {
        Some(next) => duplex = next,
        None => break,
      }
    }

    debug!("chat closed");
    self.emit(ChatEvent::Closed);
  }

  async fn session(&mut self, duplex: &mut Duplex) -> Exit {
    self.keepalive.reset(now());
    self.emit(ChatEvent::Connected);

    if !self.channels.is_empty() {
      let joins = line(|buf| {
        self
          .channels
          .iter()
          .try_for_each(|channel| write::join(buf, channel))
      });
      debug!("joining channels: {}", self.channels.iter().join(", "));
      if let Err(e) = duplex.send(joins).await {
        return Exit::Reconnect(e.to_string());
      }
    }

    loop {
      let deadline = Instant::from_std(self.keepalive.next_deadline());

      let result = tokio::select! {
        _ = tokio::time::sleep_until(deadline) => self.on_timer(duplex).await,
        payload = duplex.incoming.recv() => match payload {
          Some(Ok(payload)) => self.on_payload(duplex, &payload).await,
          Some(Err(e)) => Err(Exit::Reconnect(e.to_string())),
          None => Err(Exit::Reconnect(TransportError::Closed.to_string())),
        },
        request = self.requests.recv() => match request {
          Some(Request::Close) | None => Err(Exit::Close),
          Some(request) => match self.on_request(request) {
            Some(line) => send(duplex, line).await,
            None => Ok(()),
          },
        },
      };

      if let Err(exit) = result {
        return exit;
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
          request = self.requests.recv() => match request {
            Some(Request::Close) | None => return None,
            Some(Request::Privmsg { channel, .. }) => {
              warn!("not connected, dropping message to #{channel}");
            }
            Some(request) => {
              self.on_request(request);
            }
          },
        }
      }

      match establish(&self.connector, &self.config).await {
        Ok(duplex) => return Some(duplex),
        Err(ConnectError::Auth) => {
          warn!("credentials were rejected, giving up on reconnecting");
          return None;
        }
        Err(e) => warn!("reconnect attempt {} failed: {e}", attempt + 1),
      }
    }

    warn!("giving up on reconnecting to chat");
    None
  }

  async fn on_timer(&mut self, duplex: &Duplex) -> Result<(), Exit> {
    match self.keepalive.poll(now()) {
      KeepAliveAction::Idle => Ok(()),
      KeepAliveAction::SendPing => {
        trace!("sending PING");
        send(duplex, line(|buf| write::ping(buf, PING_NONCE))).await
      }
      KeepAliveAction::Dead => Err(Exit::Reconnect("no PONG received in time".into())),
    }
  }

  async fn on_payload(&mut self, duplex: &Duplex, payload: &str) -> Result<(), Exit> {
    for frame in split_frames(payload) {
      let message = match IrcMessageRef::parse(frame) {
        Ok(message) => message,
        Err(e) => {
          warn!("dropping {frame:?}: {e}");
          continue;
        }
      };
      trace!(?message, "received");

      match message.command() {
        Command::Ping => {
          send(duplex, line(|buf| write::pong(buf, message.body()))).await?;
        }
        Command::Pong => self.keepalive.on_pong(now()),
        Command::Reconnect => {
          return Err(Exit::Reconnect("server requested a reconnect".into()));
        }
        _ => self.on_message(message),
      }
    }
    Ok(())
  }

  fn on_message(&self, message: IrcMessageRef<'_>) {
    let event = match message.command() {
      Command::Privmsg => {
        let extractor = Extractor::new(EmojiTrie::global())
          .with_emotes(&*self.config.emote_cache)
          .with_cheermotes(&*self.config.cheermote_cache)
          .with_options(self.config.emotes);
        match ChatMessage::parse_with(&message, &extractor) {
          Some(message) => ChatEvent::Message(message),
          None => {
            debug!("PRIVMSG is missing tags");
            ChatEvent::Irc(message.into_owned())
          }
        }
      }
      Command::Notice => ChatEvent::Notice {
        channel: message
          .channel()
          .filter(|channel| *channel != "*")
          .map(String::from),
        id: message.tag("msg-id").map(String::from),
        text: message.body().unwrap_or_default().to_string(),
      },
      Command::ClearChat | Command::ClearMsg => {
        match (message.channel(), ClearTarget::from_irc(&message)) {
          (Some(channel), Some(target)) => ChatEvent::Clear {
            channel: channel.to_string(),
            target,
          },
          _ => ChatEvent::Irc(message.into_owned()),
        }
      }
      _ => ChatEvent::Irc(message.into_owned()),
    };
    self.emit(event);
  }

  /// Update the channel set, and return the line to send, if any.
  fn on_request(&mut self, request: Request) -> Option<String> {
    match request {
      Request::Join(channel) => {
        let join = line(|buf| write::join(buf, &channel));
        self.channels.insert(channel).then_some(join)
      }
      Request::Part(channel) => {
        let part = line(|buf| write::part(buf, &channel));
        self.channels.remove(&channel).then_some(part)
      }
      Request::Privmsg { channel, text } => Some(line(|buf| write::privmsg(buf, &channel, &text))),
      Request::Close => None,
    }
  }

  fn emit(&self, event: ChatEvent) {
    let _ = self.events.send(event);
  }
}

async fn send(duplex: &Duplex, line: String) -> Result<(), Exit> {
  trace!(line = line.trim_end(), "sending");
  duplex
    .send(line)
    .await
    .map_err(|e| Exit::Reconnect(e.to_string()))
}

/// The chat connection is closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Closed;

impl Display for Closed {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("chat connection is closed")
  }
}

impl std::error::Error for Closed {}

/// Failed to send a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendError {
  /// Anonymous users may not send messages.
  Anonymous,
  Closed,
}

impl From<Closed> for SendError {
  fn from(_: Closed) -> Self {
    Self::Closed
  }
}

impl Display for SendError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SendError::Anonymous => f.write_str("cannot send messages while logged in anonymously"),
      SendError::Closed => Display::fmt(&Closed, f),
    }
  }
}

impl std::error::Error for SendError {}

/// An error which occurred while attempting to connect to Twitch IRC.
#[derive(Debug)]
pub enum ConnectError {
  /// Failed to open the connection, or it failed during the handshake.
  Transport(TransportError),

  /// The handshake timed out.
  Timeout,

  /// Received an unexpected message before the welcome message.
  Welcome(IrcMessage),

  /// Failed to connect because of invalid credentials.
  Auth,

  /// The server refused the requested capabilities.
  Capability(IrcMessage),

  /// Twitch sent a notice that we didn't expect during the handshake.
  Notice(IrcMessage),
}

impl From<TransportError> for ConnectError {
  fn from(value: TransportError) -> Self {
    Self::Transport(value)
  }
}

impl From<tokio::time::error::Elapsed> for ConnectError {
  fn from(_: tokio::time::error::Elapsed) -> Self {
    Self::Timeout
  }
}

impl Display for ConnectError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConnectError::Transport(e) => write!(f, "failed to connect: {e}"),
      ConnectError::Timeout => write!(f, "failed to connect: connection timed out"),
      ConnectError::Welcome(msg) => write!(
        f,
        "failed to connect: expected `CAP` or `001` as first message, instead received: {msg:?}"
      ),
      ConnectError::Auth => write!(f, "failed to connect: invalid credentials"),
      ConnectError::Capability(msg) => write!(
        f,
        "failed to connect: capabilities were not acknowledged: {msg:?}"
      ),
      ConnectError::Notice(msg) => write!(
        f,
        "failed to connect: received unrecognized notice: {msg:?}"
      ),
    }
  }
}

impl std::error::Error for ConnectError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ConnectError::Transport(e) => Some(e),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transport::Peer;

  struct MockConnector {
    peers: mpsc::UnboundedSender<Peer>,
  }

  impl Connector for MockConnector {
    async fn connect(&self) -> Result<Duplex, TransportError> {
      let (duplex, peer) = Duplex::channel(16);
      self.peers.send(peer).map_err(|_| TransportError::Closed)?;
      Ok(duplex)
    }
  }

  const WELCOME: &str = ":tmi.twitch.tv CAP * ACK :twitch.tv/commands twitch.tv/tags\r\n\
    :tmi.twitch.tv 001 justinfan12345 :Welcome, GLHF!\r\n\
    :tmi.twitch.tv 002 justinfan12345 :Your host is tmi.twitch.tv\r\n";

  const KEEPALIVE: KeepAliveConfig = KeepAliveConfig {
    ping_interval: Duration::from_secs(60),
    ping_jitter: Duration::ZERO,
    pong_timeout: Duration::from_secs(10),
  };

  fn config() -> Config {
    Config::default()
      .credentials(Credentials::new("justinfan12345", "just_a_lil_guy"))
      .channels(["#Pajlada"])
      .keepalive(KEEPALIVE)
  }

  async fn accept(peers: &mut mpsc::UnboundedReceiver<Peer>) -> Peer {
    let mut peer = peers.recv().await.unwrap();
    let handshake = peer.incoming.recv().await.unwrap();
    assert_eq!(
      handshake,
      "CAP REQ :twitch.tv/commands twitch.tv/tags\r\n\
       PASS just_a_lil_guy\r\n\
       NICK justinfan12345\r\n"
    );
    peer.outgoing.send(Ok(WELCOME.into())).await.unwrap();
    peer
  }

  async fn connect(config: Config) -> (ChatClient, mpsc::UnboundedReceiver<Peer>, Peer) {
    let (tx, mut peers) = mpsc::unbounded_channel();
    let client = tokio::spawn(ChatClient::connect(config, MockConnector { peers: tx }));
    let mut peer = accept(&mut peers).await;
    let mut client = client.await.unwrap().unwrap();
    assert!(matches!(client.recv().await, Some(ChatEvent::Connected)));
    assert_eq!(peer.incoming.recv().await.unwrap(), "JOIN #pajlada\r\n");
    (client, peers, peer)
  }

  #[test]
  fn credentials() {
    assert!(Credentials::anon().is_anon());
    assert!(!Credentials::new("justinfan", "x").is_anon());
    assert!(!Credentials::new("pajlada", "oauth:secret").is_anon());
    let debug = format!("{:?}", Credentials::new("pajlada", "oauth:secret"));
    assert!(debug.contains("pajlada"));
    assert!(!debug.contains("secret"));
  }

  #[tokio::test(start_paused = true)]
  async fn handshake_and_messages() {
    let (mut client, _peers, peer) = connect(config()).await;

    peer
      .outgoing
      .send(Ok("@badge-info=;badges=;color=#0000FF;display-name=JuN1oRRRR;emotes=25:0-4;id=e9d998c3-36f1-430f-89ec-6b887c28af36;room-id=11148817;tmi-sent-ts=1594545155039;user-id=29803735 :jun1orrrr!jun1orrrr@jun1orrrr.tmi.twitch.tv PRIVMSG #pajlada :Kappa cam\r\n\
        @msg-id=msg_banned :tmi.twitch.tv NOTICE #forsen :You are permanently banned from talking in forsen.\r\n\
        @badges=\r\n\
        @room-id=11148817;tmi-sent-ts=1594561392337 :tmi.twitch.tv CLEARCHAT #pajlada\r\n\
        :jun1orrrr!jun1orrrr@jun1orrrr.tmi.twitch.tv JOIN #pajlada\r\n"
        .into()))
      .await
      .unwrap();

    let Some(ChatEvent::Message(message)) = client.recv().await else {
      panic!("expected a message");
    };
    assert_eq!(message.text(), "Kappa cam");
    assert_eq!(message.emotes()[0].id, "twitch_25");

    let Some(ChatEvent::Notice { channel, id, text }) = client.recv().await else {
      panic!("expected a notice");
    };
    assert_eq!(channel.as_deref(), Some("forsen"));
    assert_eq!(id.as_deref(), Some("msg_banned"));
    assert_eq!(text, "You are permanently banned from talking in forsen.");

    let Some(ChatEvent::Clear { channel, target }) = client.recv().await else {
      panic!("expected a clear");
    };
    assert_eq!(channel, "pajlada");
    assert_eq!(target, ClearTarget::All);

    let Some(ChatEvent::Irc(join)) = client.recv().await else {
      panic!("expected a join");
    };
    assert_eq!(join.command(), Command::Other("JOIN"));
  }

  #[tokio::test(start_paused = true)]
  async fn invalid_credentials() {
    let (tx, mut peers) = mpsc::unbounded_channel();
    let config = Config::default().credentials(Credentials::new("pajlada", "oauth:wrong"));
    let client = tokio::spawn(ChatClient::connect(config, MockConnector { peers: tx }));

    let mut peer = peers.recv().await.unwrap();
    peer.incoming.recv().await.unwrap();
    peer
      .outgoing
      .send(Ok(":tmi.twitch.tv NOTICE * :Login authentication failed\r\n".into()))
      .await
      .unwrap();

    assert!(matches!(client.await.unwrap(), Err(ConnectError::Auth)));
  }

  #[tokio::test(start_paused = true)]
  async fn capabilities_rejected() {
    let (tx, mut peers) = mpsc::unbounded_channel();
    let client = tokio::spawn(ChatClient::connect(config(), MockConnector { peers: tx }));

    let mut peer = peers.recv().await.unwrap();
    peer.incoming.recv().await.unwrap();
    peer
      .outgoing
      .send(Ok(":tmi.twitch.tv CAP * NAK :twitch.tv/commands twitch.tv/tags\r\n".into()))
      .await
      .unwrap();

    let Err(ConnectError::Capability(nak)) = client.await.unwrap() else {
      panic!("expected the capabilities to be rejected");
    };
    assert_eq!(nak.channel(), Some("* NAK"));
    assert_eq!(nak.body(), Some("twitch.tv/commands twitch.tv/tags"));
  }

  #[tokio::test(start_paused = true)]
  async fn handshake_timeout() {
    let (tx, mut peers) = mpsc::unbounded_channel();
    let config = config().timeout(Duration::from_secs(5));
    let client = tokio::spawn(ChatClient::connect(config, MockConnector { peers: tx }));

    let _peer = peers.recv().await.unwrap();
    assert!(matches!(client.await.unwrap(), Err(ConnectError::Timeout)));
  }

  #[tokio::test(start_paused = true)]
  async fn ping_pong() {
    let (_client, _peers, mut peer) = connect(config()).await;

    peer
      .outgoing
      .send(Ok("PING :tmi.twitch.tv\r\n".into()))
      .await
      .unwrap();
    assert_eq!(peer.incoming.recv().await.unwrap(), "PONG :tmi.twitch.tv\r\n");

    // keep-alive
    assert_eq!(peer.incoming.recv().await.unwrap(), "PING :tmi.twitch.tv\r\n");
    peer
      .outgoing
      .send(Ok(":tmi.twitch.tv PONG tmi.twitch.tv :tmi.twitch.tv\r\n".into()))
      .await
      .unwrap();
    assert_eq!(peer.incoming.recv().await.unwrap(), "PING :tmi.twitch.tv\r\n");
  }

  #[tokio::test(start_paused = true)]
  async fn missing_pong_reconnects() {
    let (mut client, mut peers, mut peer) = connect(config()).await;

    assert_eq!(peer.incoming.recv().await.unwrap(), "PING :tmi.twitch.tv\r\n");
    let Some(ChatEvent::Reconnecting { reason }) = client.recv().await else {
      panic!("expected a reconnect");
    };
    assert_eq!(reason, "no PONG received in time");

    let mut peer = accept(&mut peers).await;
    assert!(matches!(client.recv().await, Some(ChatEvent::Connected)));
    assert_eq!(peer.incoming.recv().await.unwrap(), "JOIN #pajlada\r\n");
  }

  #[tokio::test(start_paused = true)]
  async fn server_reconnect_rejoins() {
    let (mut client, mut peers, peer) = connect(config()).await;
    let handle = client.handle().clone();

    handle.join("#Forsen").unwrap();
    handle.part("pajlada").unwrap();
    peer
      .outgoing
      .send(Ok(":tmi.twitch.tv RECONNECT\r\n".into()))
      .await
      .unwrap();

    assert!(matches!(
      client.recv().await,
      Some(ChatEvent::Reconnecting { .. })
    ));
    let mut peer = accept(&mut peers).await;
    assert!(matches!(client.recv().await, Some(ChatEvent::Connected)));
    assert_eq!(peer.incoming.recv().await.unwrap(), "JOIN #forsen\r\n");
  }

  #[tokio::test(start_paused = true)]
  async fn join_part_send() {
    let (client, _peers, mut peer) = connect(config()).await;
    let handle = client.handle();

    handle.join("forsen").unwrap();
    assert_eq!(peer.incoming.recv().await.unwrap(), "JOIN #forsen\r\n");
    // already joined
    handle.join("#forsen").unwrap();
    handle.part("#forsen").unwrap();
    assert_eq!(peer.incoming.recv().await.unwrap(), "PART #forsen\r\n");

    assert_eq!(handle.send("forsen", "hi"), Err(SendError::Anonymous));
  }

  #[tokio::test(start_paused = true)]
  async fn send_with_credentials() {
    let (tx, mut peers) = mpsc::unbounded_channel();
    let config = Config::default().credentials(Credentials::new("bot", "oauth:token"));
    let client = tokio::spawn(ChatClient::connect(config, MockConnector { peers: tx }));

    let mut peer = peers.recv().await.unwrap();
    peer.incoming.recv().await.unwrap();
    peer.outgoing.send(Ok(WELCOME.into())).await.unwrap();
    let client = client.await.unwrap().unwrap();

    client.handle().send("#Pajlada", "hello :)").unwrap();
    assert_eq!(
      peer.incoming.recv().await.unwrap(),
      "PRIVMSG #pajlada :hello :)\r\n"
    );

    client.handle().close();
    let (handle, mut events) = client.into_parts();
    assert!(matches!(events.recv().await, Some(ChatEvent::Connected)));
    assert!(matches!(events.recv().await, Some(ChatEvent::Closed)));
    assert_eq!(handle.send("pajlada", "hi"), Err(SendError::Closed));
  }
}
