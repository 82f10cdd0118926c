use crate::{DetailLevel, GenerationError, SectionPos, TerrainUnit};

use async_channel::{Receiver, Sender, TryRecvError};
use futures_lite::future;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

/// Receives every [`TerrainUnit`] generated on behalf of a task.
pub trait TaskTracker: Send + Sync {
    fn on_unit(&self, unit: &TerrainUnit);
}

/// Ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTracker;

impl TaskTracker for NullTracker {
    fn on_unit(&self, _unit: &TerrainUnit) {}
}

/// Why a task did not produce its section.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailCause {
    /// Submitted after the queue started shutting down.
    Rejected,
    /// Dropped from the waiting set to make room for a closer task.
    Evicted,
    /// Removed by the caller, or its promise was dropped unresolved.
    Cancelled,
    /// Still waiting when the queue shut down.
    Shutdown,
    /// The generation job ran and failed.
    Generation(GenerationError),
}

/// The terminal state of one task.
#[derive(Debug)]
pub enum GenResult {
    Success(SectionPos),
    Fail(FailCause),
    /// The section was too coarse for the generator. Each child covers one quadrant and completes independently.
    Split([GenFuture; 4]),
}

impl GenResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn fail_cause(&self) -> Option<&FailCause> {
        match self {
            Self::Fail(cause) => Some(cause),
            _ => None,
        }
    }
}

/// A request to generate one section, waiting to be dispatched or split.
pub struct GenTask {
    pub position: SectionPos,
    pub required_detail: DetailLevel,
    pub tracker: Arc<dyn TaskTracker>,
    promise: GenPromise,
}

impl GenTask {
    pub fn new(
        position: SectionPos,
        required_detail: DetailLevel,
        tracker: Arc<dyn TaskTracker>,
    ) -> (Self, GenFuture) {
        let (promise, future) = gen_promise();
        (
            Self {
                position,
                required_detail,
                tracker,
                promise,
            },
            future,
        )
    }

    pub fn resolve(self, result: GenResult) {
        self.promise.resolve(result);
    }

    pub fn succeed(self) {
        let position = self.position;
        self.resolve(GenResult::Success(position));
    }

    pub fn fail(self, cause: FailCause) {
        self.resolve(GenResult::Fail(cause));
    }

    /// Replaces this task with one task per child quadrant, resolving this task to [`GenResult::Split`].
    pub fn split(self) -> [GenTask; 4] {
        let [c0, c1, c2, c3] = self.position.children();
        let (t0, f0) = GenTask::new(c0, self.required_detail, self.tracker.clone());
        let (t1, f1) = GenTask::new(c1, self.required_detail, self.tracker.clone());
        let (t2, f2) = GenTask::new(c2, self.required_detail, self.tracker.clone());
        let (t3, f3) = GenTask::new(c3, self.required_detail, self.tracker.clone());
        self.resolve(GenResult::Split([f0, f1, f2, f3]));
        [t0, t1, t2, t3]
    }
}

impl fmt::Debug for GenTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenTask")
            .field("position", &self.position)
            .field("required_detail", &self.required_detail)
            .finish_non_exhaustive()
    }
}

fn gen_promise() -> (GenPromise, GenFuture) {
    let (sender, receiver) = async_channel::bounded(1);
    (GenPromise { sender }, GenFuture { receiver })
}

/// The write end of a one-shot [`GenResult`]. Dropping it unresolved resolves the future to [`FailCause::Cancelled`].
#[derive(Debug)]
pub struct GenPromise {
    sender: Sender<GenResult>,
}

impl GenPromise {
    pub fn resolve(self, result: GenResult) {
        // Nobody may be listening anymore.
        let _ = self.sender.try_send(result);
    }
}

/// The read end of a one-shot [`GenResult`].
///
/// Await it, block on it with [`GenFuture::wait`], or poll it with [`GenFuture::try_result`].
#[derive(Debug)]
pub struct GenFuture {
    receiver: Receiver<GenResult>,
}

impl GenFuture {
    pub fn is_resolved(&self) -> bool {
        !self.receiver.is_empty() || self.receiver.is_closed()
    }

    /// Takes the result if it is ready, otherwise gives the future back.
    pub fn try_result(self) -> Result<GenResult, Self> {
        match self.receiver.try_recv() {
            Ok(result) => Ok(result),
            Err(TryRecvError::Closed) => Ok(GenResult::Fail(FailCause::Cancelled)),
            Err(TryRecvError::Empty) => Err(self),
        }
    }

    pub fn wait(self) -> GenResult {
        future::block_on(self.into_future())
    }

    /// Blocks until this task and every task it was split into have finished, returning only the terminal
    /// (success or failure) results.
    pub fn wait_leaves(self) -> Vec<GenResult> {
        let mut leaves = Vec::new();
        let mut pending = vec![self];
        while let Some(next) = pending.pop() {
            match next.wait() {
                GenResult::Split(children) => pending.extend(children),
                terminal => leaves.push(terminal),
            }
        }
        leaves
    }
}

impl IntoFuture for GenFuture {
    type Output = GenResult;
    type IntoFuture = Pin<Box<dyn Future<Output = GenResult> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            self.receiver
                .recv()
                .await
                .unwrap_or(GenResult::Fail(FailCause::Cancelled))
        })
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
