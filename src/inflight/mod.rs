use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::ApiGateway;

/// Categories of backend call; the latest-wins guard is applied per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Providers,
    Definition,
    Typeahead,
    Preview,
    Submit,
}

/// Identity of one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken {
    pub kind: RequestKind,
    pub seq: u64,
    pub generation: u64,
}

/// Tracks issued requests so that superseded or orphaned responses are dropped.
///
/// `seq` grows monotonically across all kinds. A response is applied only when
/// its `seq` is the latest issued for its kind and it belongs to the current
/// generation. Bumping the generation orphans everything in flight.
#[derive(Debug, Default)]
pub struct RequestTracker {
    next_seq: u64,
    generation: u64,
    latest: HashMap<RequestKind, u64>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for a new request, superseding any earlier one of the same kind.
    pub fn issue(&mut self, kind: RequestKind) -> RequestToken {
        self.next_seq += 1;
        self.latest.insert(kind, self.next_seq);
        RequestToken {
            kind,
            seq: self.next_seq,
            generation: self.generation,
        }
    }

    pub fn is_current(&self, token: &RequestToken) -> bool {
        token.generation == self.generation && self.latest.get(&token.kind) == Some(&token.seq)
    }

    /// Accept a completion. Returns `false` for stale or orphaned tokens; a
    /// current token is settled so the same response cannot apply twice.
    pub fn settle(&mut self, token: &RequestToken) -> bool {
        if !self.is_current(token) {
            tracing::debug!(
                kind = ?token.kind,
                seq = token.seq,
                generation = token.generation,
                "discarding superseded response"
            );
            return false;
        }
        self.latest.remove(&token.kind);
        true
    }

    /// Whether a request of this kind is still awaiting its response.
    pub fn is_pending(&self, kind: RequestKind) -> bool {
        self.latest.contains_key(&kind)
    }

    pub fn has_pending(&self) -> bool {
        !self.latest.is_empty()
    }

    /// Forget the outstanding request of this kind; its response will be dropped.
    pub fn cancel(&mut self, kind: RequestKind) {
        self.latest.remove(&kind);
    }

    /// Start a new owner instance. Responses for the previous one become no-ops.
    pub fn next_generation(&mut self) {
        self.generation += 1;
        self.latest.clear();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A finished request, delivered back to the UI loop.
#[derive(Debug)]
pub struct Completion<T> {
    pub token: RequestToken,
    pub payload: T,
}

/// Runs gateway calls off the UI thread and queues their completions.
///
/// Completions arrive in the order the calls finish, which need not match
/// the order they were issued.
pub struct Dispatcher<T> {
    gateway: Arc<dyn ApiGateway>,
    tx: Sender<Completion<T>>,
    rx: Receiver<Completion<T>>,
}

impl<T: Send + 'static> Dispatcher<T> {
    pub fn new(gateway: Arc<dyn ApiGateway>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { gateway, tx, rx }
    }

    pub fn spawn<F>(&self, token: RequestToken, job: F)
    where
        F: FnOnce(&dyn ApiGateway) -> T + Send + 'static,
    {
        let gateway = Arc::clone(&self.gateway);
        let tx = self.tx.clone();
        tracing::debug!(kind = ?token.kind, seq = token.seq, "request issued");
        std::thread::spawn(move || {
            let payload = job(gateway.as_ref());
            // The receiver is gone once the UI has shut down.
            let _ = tx.send(Completion { token, payload });
        });
    }

    /// All completions that have arrived so far, without blocking.
    pub fn drain(&self) -> Vec<Completion<T>> {
        self.rx.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Completion<T>> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// Emits an input value once it has been stable for `delay`.
#[derive(Debug)]
pub struct Debounce {
    delay: Duration,
    pending: Option<(String, Instant)>,
    last_fired: Option<String>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            last_fired: None,
        }
    }

    /// Record a new input value; restarts the quiet period.
    pub fn input(&mut self, value: impl Into<String>, now: Instant) {
        self.pending = Some((value.into(), now));
    }

    /// Returns the value to look up once the quiet period has elapsed.
    /// Repeating the previously fired value yields nothing.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let ready = matches!(&self.pending, Some((_, at)) if now.duration_since(*at) >= self.delay);
        if !ready {
            return None;
        }
        let (value, _) = self.pending.take()?;
        if self.last_fired.as_deref() == Some(value.as_str()) {
            return None;
        }
        self.last_fired = Some(value.clone());
        Some(value)
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.last_fired = None;
    }
}
