//! Look-ahead buffer of candidate groups.
//!
//! A single actor task owns the ready queue, the in-flight fetches and the pending pull.
//! Callers talk to it through a command channel,
//! and fetches report back through the actor's `JoinSet`,
//! so every state change happens in one place.

use std::collections::VecDeque;
use std::future::Future;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::duplicates::{CandidateGroup, GroupSource, ReviewError};
use crate::print_warning;

/// Default number of groups kept ready or in flight.
pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(9);
/// Default number of consecutive failed fetches before giving up.
pub const DEFAULT_MAX_FAILURES: NonZeroU32 = NonZeroU32::MIN.saturating_add(4);

type GroupResult = Result<CandidateGroup, ReviewError>;

/// Prefetch buffer settings.
#[derive(Debug, Clone, Copy)]
pub struct BufferOptions {
    /// Target for ready plus in-flight groups.
    pub capacity: NonZeroUsize,
    /// Consecutive failed fetches after which refilling stops.
    pub max_failures: NonZeroU32,
    /// Delay before the first retry after a failure. Doubles for each further failure.
    pub backoff: Duration,
    /// Upper limit for the retry delay.
    pub max_backoff: Duration,
    /// Print failed fetches.
    pub verbose: bool,
}

/// Snapshot of the buffer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStatus {
    pub ready: usize,
    pub in_flight: usize,
    pub capacity: usize,
    pub pending_pull: bool,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub delivered: u64,
}

/// Handle to the prefetch actor.
///
/// Dropping the handle stops the actor and aborts every in-flight fetch.
#[derive(Debug)]
pub struct PrefetchBuffer {
    commands: mpsc::UnboundedSender<Command>,
    actor: JoinHandle<()>,
}

#[derive(Debug)]
enum Command {
    Pull(oneshot::Sender<GroupResult>),
    Status(oneshot::Sender<BufferStatus>),
    Shutdown(oneshot::Sender<()>),
}

struct Actor<G> {
    source: Arc<G>,
    options: BufferOptions,
    ready: VecDeque<CandidateGroup>,
    in_flight: JoinSet<GroupResult>,
    pending: Option<oneshot::Sender<GroupResult>>,
    consecutive_failures: u32,
    total_failures: u64,
    delivered: u64,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_failures: DEFAULT_MAX_FAILURES,
            backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            verbose: false,
        }
    }
}

impl BufferOptions {
    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Delay before launching a replacement fetch after `failures` consecutive failures.
    #[must_use]
    pub fn retry_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1_u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl PrefetchBuffer {
    /// Start the actor and immediately launch `capacity` fetches.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start<G: GroupSource>(source: G, options: BufferOptions) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let actor = Actor::new(Arc::new(source), options);
        let actor = tokio::spawn(actor.run(receiver));
        Self { commands, actor }
    }

    /// Get the next candidate group.
    ///
    /// Returns a ready group immediately if one is queued,
    /// otherwise waits for the first in-flight fetch to complete.
    /// Groups come out in completion order.
    ///
    /// The request is registered when this is called, not when the future is first polled.
    /// Only one request may be outstanding at a time.
    ///
    /// # Errors
    /// - `ConcurrentPull` if another request is still waiting.
    /// - `BufferExhausted` if fetching failed too many times in a row.
    /// - `BufferClosed` if the buffer has been shut down.
    pub fn request_next_group(&self) -> impl Future<Output = GroupResult> + Send + use<> {
        let (reply, response) = oneshot::channel();
        let sent = self.commands.send(Command::Pull(reply)).is_ok();
        async move {
            if !sent {
                return Err(ReviewError::BufferClosed);
            }
            response.await.unwrap_or(Err(ReviewError::BufferClosed))
        }
    }

    /// Get a snapshot of the current buffer state.
    ///
    /// # Errors
    /// Returns `BufferClosed` if the buffer has been shut down.
    pub async fn status(&self) -> Result<BufferStatus, ReviewError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Status(reply))
            .map_err(|_| ReviewError::BufferClosed)?;
        response.await.map_err(|_| ReviewError::BufferClosed)
    }

    /// Stop the actor, abort in-flight fetches and wait for them to finish.
    /// A waiting request receives `BufferClosed`.
    pub async fn shutdown(self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done)).is_ok() {
            let _ = finished.await;
        }
        let _ = self.actor.await;
    }
}

impl<G: GroupSource> Actor<G> {
    fn new(source: Arc<G>, options: BufferOptions) -> Self {
        Self {
            source,
            options,
            ready: VecDeque::with_capacity(options.capacity.get()),
            in_flight: JoinSet::new(),
            pending: None,
            consecutive_failures: 0,
            total_failures: 0,
            delivered: 0,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.refill();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Pull(reply)) => self.handle_pull(reply),
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(Command::Shutdown(done)) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.handle_completion(joined);
                }
            }
        }
    }

    fn handle_pull(&mut self, reply: oneshot::Sender<GroupResult>) {
        if self.has_pending_pull() {
            let _ = reply.send(Err(ReviewError::ConcurrentPull));
            return;
        }

        if let Some(group) = self.ready.pop_front() {
            if let Err(Ok(group)) = reply.send(Ok(group)) {
                // Caller went away, keep the group at the head of the queue.
                self.ready.push_front(group);
            } else {
                self.delivered += 1;
            }
            self.refill();
            return;
        }

        self.pending = Some(reply);
        self.refill();
        self.fail_pending_if_exhausted();
    }

    fn handle_completion(&mut self, joined: Result<GroupResult, JoinError>) {
        match joined {
            Ok(Ok(group)) => {
                self.consecutive_failures = 0;
                self.offer(group);
            }
            Ok(Err(error)) => self.record_failure(&error.to_string()),
            Err(error) if error.is_cancelled() => {}
            Err(error) => self.record_failure(&format!("fetch task panicked: {error}")),
        }

        self.refill();
        self.fail_pending_if_exhausted();
    }

    /// Hand a completed group to the waiting caller, or queue it if nobody is waiting.
    fn offer(&mut self, group: CandidateGroup) {
        let group = match self.pending.take() {
            Some(reply) => match reply.send(Ok(group)) {
                Ok(()) => {
                    self.delivered += 1;
                    return;
                }
                Err(Ok(group)) => group,
                Err(Err(_)) => return,
            },
            None => group,
        };
        self.ready.push_back(group);
    }

    fn record_failure(&mut self, message: &str) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures += 1;
        if self.options.verbose {
            print_warning!(
                "Fetch failed ({}/{}): {message}",
                self.consecutive_failures,
                self.options.max_failures
            );
        }
    }

    /// Launch fetches until ready plus in-flight groups reach capacity.
    fn refill(&mut self) {
        if self.is_exhausted() {
            return;
        }
        let delay = self.options.retry_delay(self.consecutive_failures);
        while self.ready.len() + self.in_flight.len() < self.options.capacity.get() {
            let source = Arc::clone(&self.source);
            self.in_flight.spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                source.fetch_one_group().await
            });
        }
    }

    /// Nothing can produce a group anymore: tell the waiting caller instead of leaving it hanging.
    fn fail_pending_if_exhausted(&mut self) {
        if self.is_exhausted()
            && self.in_flight.is_empty()
            && self.ready.is_empty()
            && let Some(reply) = self.pending.take()
        {
            let _ = reply.send(Err(ReviewError::BufferExhausted {
                failures: self.consecutive_failures,
            }));
        }
    }

    const fn is_exhausted(&self) -> bool {
        self.consecutive_failures >= self.options.max_failures.get()
    }

    fn has_pending_pull(&self) -> bool {
        self.pending.as_ref().is_some_and(|reply| !reply.is_closed())
    }

    fn status(&self) -> BufferStatus {
        BufferStatus {
            ready: self.ready.len(),
            in_flight: self.in_flight.len(),
            capacity: self.options.capacity.get(),
            pending_pull: self.has_pending_pull(),
            consecutive_failures: self.consecutive_failures,
            total_failures: self.total_failures,
            delivered: self.delivered,
        }
    }

    async fn shutdown(&mut self) {
        self.in_flight.shutdown().await;
        if let Some(reply) = self.pending.take() {
            let _ = reply.send(Err(ReviewError::BufferClosed));
        }
    }
}

#[cfg(test)]
mod retry_delay_tests {
    use super::*;

    fn options() -> BufferOptions {
        BufferOptions {
            backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            ..BufferOptions::default()
        }
    }

    #[test]
    fn no_delay_without_failures() {
        assert_eq!(options().retry_delay(0), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_per_failure() {
        let options = options();
        assert_eq!(options.retry_delay(1), Duration::from_millis(100));
        assert_eq!(options.retry_delay(2), Duration::from_millis(200));
        assert_eq!(options.retry_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn delay_is_capped() {
        let options = options();
        assert_eq!(options.retry_delay(5), Duration::from_secs(1));
        assert_eq!(options.retry_delay(40), Duration::from_secs(1));
    }

    #[test]
    fn default_options() {
        let options = BufferOptions::default();
        assert_eq!(options.capacity.get(), 10);
        assert_eq!(options.max_failures.get(), 5);
    }
}
