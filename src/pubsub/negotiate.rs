use super::msg::ResponseError;
use super::Mode;
use rand::distributions::Alphanumeric;
use rand::Rng as _;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Display;
use std::time::{Duration, Instant};

/// Length of a request nonce.
pub const NONCE_LEN: usize = 30;

/// A random request nonce, `[a-zA-Z0-9]{30}`.
pub fn nonce() -> String {
  rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(NONCE_LEN)
    .map(char::from)
    .collect()
}

#[derive(Clone, Debug)]
struct Pending {
  mode: Mode,
  topic: String,
  attempts: u32,
}

#[derive(Clone, Debug)]
struct InFlight {
  mode: Mode,
  topic: String,
  attempts: u32,
  seq: u64,
  sent_at: Instant,
}

/// A negotiation which should be sent now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outgoing {
  pub mode: Mode,
  pub topic: String,
  pub nonce: String,
}

/// What happened to a negotiation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
  Listened(String),
  Unlistened(String),
  /// The negotiation failed, and was queued again.
  Retrying { mode: Mode, topic: String },
  /// The negotiation failed, and will not be retried.
  Failed(NegotiationError),
}

/// Topic negotiation state for one connection.
///
/// Owns the request queue, the nonce-correlated in-flight requests,
/// and the set of accepted topics. At most one request per topic is
/// in flight at any time.
#[derive(Clone, Debug)]
pub struct Negotiator {
  queue: VecDeque<Pending>,
  in_flight: HashMap<String, InFlight>,
  accepted: BTreeSet<String>,
  max_retries: u32,
  seq: u64,
}

impl Negotiator {
  /// `max_retries` is how many times a failed negotiation is retried.
  pub fn new(max_retries: u32) -> Self {
    Self {
      queue: VecDeque::new(),
      in_flight: HashMap::new(),
      accepted: BTreeSet::new(),
      max_retries,
      seq: 0,
    }
  }

  pub fn enqueue(&mut self, mode: Mode, topic: impl Into<String>) {
    let topic = topic.into();
    trace!(?mode, %topic, "queued");
    self.queue.push_back(Pending {
      mode,
      topic,
      attempts: 0,
    });
  }

  /// Dequeue the next request, unless a request for the same topic is in flight.
  ///
  /// Call until it returns `None`.
  pub fn next_request(&mut self, now: Instant) -> Option<Outgoing> {
    let head = self.queue.front()?;
    if self.is_in_flight(&head.topic) {
      trace!(topic = %head.topic, "waiting for in-flight request");
      return None;
    }

    let Pending {
      mode,
      topic,
      attempts,
    } = self.queue.pop_front()?;
    let nonce = nonce();
    self.seq += 1;
    self.in_flight.insert(
      nonce.clone(),
      InFlight {
        mode,
        topic: topic.clone(),
        attempts,
        seq: self.seq,
        sent_at: now,
      },
    );
    Some(Outgoing { mode, topic, nonce })
  }

  fn is_in_flight(&self, topic: &str) -> bool {
    self.in_flight.values().any(|request| request.topic == topic)
  }

  /// Handle a `RESPONSE`.
  ///
  /// Returns `None` if `nonce` does not belong to an in-flight request.
  pub fn on_response(&mut self, nonce: &str, error: Option<ResponseError>) -> Option<Outcome> {
    let request = self.in_flight.remove(nonce)?;
    let outcome = match error {
      None => match request.mode {
        Mode::Listen => {
          self.accepted.insert(request.topic.clone());
          Outcome::Listened(request.topic)
        }
        Mode::Unlisten => {
          self.accepted.remove(&request.topic);
          Outcome::Unlistened(request.topic)
        }
      },
      Some(reason) => self.retry(request, |topic, mode| NegotiationError::Rejected {
        topic,
        mode,
        reason,
      }),
    };
    Some(outcome)
  }

  fn retry(
    &mut self,
    request: InFlight,
    error: impl FnOnce(String, Mode) -> NegotiationError,
  ) -> Outcome {
    if request.attempts < self.max_retries {
      self.queue.push_front(Pending {
        mode: request.mode,
        topic: request.topic.clone(),
        attempts: request.attempts + 1,
      });
      Outcome::Retrying {
        mode: request.mode,
        topic: request.topic,
      }
    } else {
      Outcome::Failed(error(request.topic, request.mode))
    }
  }

  /// The earliest instant at which an in-flight request times out.
  pub fn next_timeout(&self, timeout: Duration) -> Option<Instant> {
    self
      .in_flight
      .values()
      .map(|request| request.sent_at + timeout)
      .min()
  }

  /// Fail every request which has been in flight for at least `timeout`.
  pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<Outcome> {
    let expired = self
      .in_flight
      .iter()
      .filter(|(_, request)| now >= request.sent_at + timeout)
      .map(|(nonce, _)| nonce.clone())
      .collect::<Vec<_>>();

    let mut expired = expired
      .into_iter()
      .filter_map(|nonce| self.in_flight.remove(&nonce))
      .collect::<Vec<_>>();
    expired.sort_by_key(|request| request.seq);

    expired
      .into_iter()
      .map(|request| self.retry(request, |topic, mode| NegotiationError::Timeout { topic, mode }))
      .collect()
  }

  /// Prepare for a new connection.
  ///
  /// Nothing is accepted on a fresh connection, so every accepted topic is
  /// queued to be listened to again, ahead of whatever was already queued.
  /// Requests still in flight died with the old connection. They are not
  /// sent again, and are returned as failures in the order they were sent.
  pub fn on_reconnect(&mut self) -> Vec<Outcome> {
    let mut dropped = self.in_flight.drain().map(|(_, r)| r).collect::<Vec<_>>();
    dropped.sort_by_key(|request| request.seq);

    let relisten = std::mem::take(&mut self.accepted)
      .into_iter()
      .map(|topic| Pending {
        mode: Mode::Listen,
        topic,
        attempts: 0,
      });
    let queue = relisten.chain(self.queue.drain(..)).collect::<VecDeque<_>>();
    debug!(
      queued = queue.len(),
      dropped = dropped.len(),
      "requeued topics for new connection"
    );
    self.queue = queue;

    dropped
      .into_iter()
      .map(|request| {
        Outcome::Failed(NegotiationError::ConnectionLost {
          topic: request.topic,
          mode: request.mode,
        })
      })
      .collect()
  }

  /// Drop everything, for a connection which is going away for good.
  ///
  /// Returns the number of abandoned in-flight requests.
  pub fn abandon(&mut self) -> usize {
    let abandoned = self.in_flight.len();
    self.in_flight.clear();
    self.queue.clear();
    self.accepted.clear();
    abandoned
  }

  pub fn is_accepted(&self, topic: &str) -> bool {
    self.accepted.contains(topic)
  }

  pub fn snapshot(&self) -> TopicSnapshot {
    let mut in_flight = self
      .in_flight
      .iter()
      .map(|(nonce, request)| PendingTopic {
        mode: request.mode,
        topic: request.topic.clone(),
        nonce: Some(nonce.clone()),
      })
      .collect::<Vec<_>>();
    in_flight.sort_by(|a, b| a.topic.cmp(&b.topic));

    TopicSnapshot {
      accepted: self.accepted.iter().cloned().collect(),
      in_flight,
      queued: self
        .queue
        .iter()
        .map(|request| PendingTopic {
          mode: request.mode,
          topic: request.topic.clone(),
          nonce: None,
        })
        .collect(),
    }
  }
}

impl Default for Negotiator {
  fn default() -> Self {
    Self::new(super::DEFAULT_MAX_RETRIES)
  }
}

/// A copy of the negotiation state at some point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TopicSnapshot {
  /// Sorted.
  pub accepted: Vec<String>,
  /// Sorted by topic.
  pub in_flight: Vec<PendingTopic>,
  /// In queue order.
  pub queued: Vec<PendingTopic>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingTopic {
  pub mode: Mode,
  pub topic: String,
  pub nonce: Option<String>,
}

/// A topic negotiation failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NegotiationError {
  /// The server answered with an error.
  Rejected {
    topic: String,
    mode: Mode,
    reason: ResponseError,
  },
  /// The server did not answer in time.
  Timeout { topic: String, mode: Mode },
  /// The connection was lost before the server answered.
  ConnectionLost { topic: String, mode: Mode },
}

impl NegotiationError {
  pub fn topic(&self) -> &str {
    match self {
      NegotiationError::Rejected { topic, .. }
      | NegotiationError::Timeout { topic, .. }
      | NegotiationError::ConnectionLost { topic, .. } => topic,
    }
  }
}

impl Display for NegotiationError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      NegotiationError::Rejected {
        topic,
        mode,
        reason,
      } => write!(f, "{mode} {topic} was rejected: {reason}"),
      NegotiationError::Timeout { topic, mode } => write!(f, "{mode} {topic} timed out"),
      NegotiationError::ConnectionLost { topic, mode } => {
        write!(f, "{mode} {topic} was lost with the connection")
      }
    }
  }
}

impl std::error::Error for NegotiationError {}
