//! Concurrent query scheduling with in-flight deduplication.
//!
//! Each distinct (name, type, class) being resolved owns one spawned task.
//! Identical submissions made while it runs join as extra waiters and get a
//! clone of the same outcome. Dropping or cancelling a [`QueryHandle`]
//! detaches its waiter; the task is aborted once no waiter is left.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll, ready};

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::dns::Question;
use crate::error::ResolveError;
use crate::resolver::{ResolutionResult, Resolver};
use crate::shard::ShardedMap;

type Outcome = Result<ResolutionResult, ResolveError>;

struct PendingQuery {
    /// Tells a resolution apart from a later one for the same key.
    generation: u64,
    waiters: FxHashMap<u64, oneshot::Sender<Outcome>>,
    task: AbortHandle,
}

/// The dedup table plus a count of its entries, kept in step with every
/// insert and remove so the in-flight limit holds under concurrent submits.
#[derive(Default)]
struct PendingTable {
    queries: ShardedMap<Question, PendingQuery>,
    count: AtomicUsize,
}

impl PendingTable {
    /// Claim a slot for a new resolution, if one is free.
    fn reserve(&self, limit: usize) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .is_ok()
    }

    fn release(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct Scheduler {
    resolver: Arc<Resolver>,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self {
            resolver,
            pending: Arc::new(PendingTable::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Number of distinct questions being resolved.
    pub fn in_flight(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    /// Start resolving `question`, or join the resolution already running
    /// for it. Must be called from within a tokio runtime.
    ///
    /// Fails with [`ResolveError::AllocationFailure`] when a new resolution
    /// would exceed the in-flight limit; joining one never fails.
    pub fn submit(&self, question: Question) -> Result<QueryHandle, ResolveError> {
        let limit = self.resolver.settings().max_in_flight;
        let waiter = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();

        let mut shard = self.pending.queries.write(&question);
        let generation = match shard.get_mut(&question) {
            Some(pending) => {
                pending.waiters.insert(waiter, sender);
                self.resolver.stats().record_deduplicated();
                trace!(%question, waiters = pending.waiters.len(), "joined in-flight query");
                pending.generation
            }
            None if !self.pending.reserve(limit) => {
                warn!(%question, limit, "too many queries in flight");
                return Err(ResolveError::AllocationFailure);
            }
            None => {
                let task = tokio::spawn(run(
                    self.resolver.clone(),
                    self.pending.clone(),
                    question.clone(),
                    waiter,
                ));
                let mut waiters = FxHashMap::default();
                waiters.insert(waiter, sender);
                shard.insert(
                    question.clone(),
                    PendingQuery {
                        generation: waiter,
                        waiters,
                        task: task.abort_handle(),
                    },
                );
                waiter
            }
        };
        drop(shard);

        Ok(QueryHandle {
            question,
            waiter,
            generation,
            receiver,
            pending: self.pending.clone(),
            state: HandleState::Waiting,
        })
    }
}

/// Resolve, then hand the outcome to every waiter still attached.
async fn run(resolver: Arc<Resolver>, pending: Arc<PendingTable>, question: Question, generation: u64) {
    let outcome = resolver.resolve(question.clone()).await;

    let finished = {
        let mut shard = pending.queries.write(&question);
        match shard.get(&question) {
            Some(entry) if entry.generation == generation => shard.remove(&question),
            _ => None,
        }
    };
    let Some(finished) = finished else {
        return;
    };
    pending.release();
    for (_, sender) in finished.waiters {
        // A receiver may have gone away since; its handle detaches on drop.
        let _ = sender.send(outcome.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Waiting,
    Done,
    Cancelled,
}

/// One caller's claim on a pending resolution.
///
/// Awaiting it yields the outcome. Dropping it before then is the same as
/// calling [`cancel`](QueryHandle::cancel).
pub struct QueryHandle {
    question: Question,
    waiter: u64,
    generation: u64,
    receiver: oneshot::Receiver<Outcome>,
    pending: Arc<PendingTable>,
    state: HandleState,
}

impl QueryHandle {
    pub fn question(&self) -> &Question {
        &self.question
    }

    /// Stop waiting. Other waiters on the same question are unaffected; if
    /// this was the last one the resolution is aborted. Awaiting the handle
    /// afterwards yields [`ResolveError::Cancelled`].
    pub fn cancel(&mut self) {
        if self.state == HandleState::Waiting {
            self.detach();
            self.receiver.close();
            self.state = HandleState::Cancelled;
        }
    }

    fn detach(&self) {
        let mut shard = self.pending.queries.write(&self.question);
        let Some(entry) = shard.get_mut(&self.question) else {
            return;
        };
        if entry.generation != self.generation {
            return;
        }
        entry.waiters.remove(&self.waiter);
        if entry.waiters.is_empty() {
            entry.task.abort();
            shard.remove(&self.question);
            self.pending.release();
            debug!(question = %self.question, "last waiter gone, resolution aborted");
        }
    }
}

impl Future for QueryHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        match self.state {
            HandleState::Cancelled | HandleState::Done => {
                return Poll::Ready(Err(ResolveError::Cancelled));
            }
            HandleState::Waiting => {}
        }
        let received = ready!(Pin::new(&mut self.receiver).poll(cx));
        self.state = HandleState::Done;
        Poll::Ready(received.unwrap_or(Err(ResolveError::Cancelled)))
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        if self.state == HandleState::Waiting {
            self.detach();
        }
    }
}
