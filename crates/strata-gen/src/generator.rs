use crate::{
    CellUnits, DetailLevel, GenerationError, GenerationMode, RawCell, SectionPos, TerrainUnit,
};

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_core::glam::IVec2;

/// The external terrain-generation backend.
///
/// Implementations own whatever executor they run jobs on and are expected to bound its concurrency themselves; the queue
/// only limits how many jobs it keeps in flight.
pub trait TerrainGenerator: Send + Sync {
    /// The finest data detail this generator can produce.
    fn finest_detail(&self) -> DetailLevel;

    /// The coarsest data detail this generator can produce.
    fn coarsest_detail(&self) -> DetailLevel;

    /// The only kind of [`ProducedUnit`] this generator will hand to a [`UnitSink`].
    fn return_shape(&self) -> ReturnShape;

    /// When true, [`ReturnShape::StructuredUnits`] output is trusted without checking it against the request.
    fn validates_units(&self) -> bool {
        false
    }

    /// Called once at the start of every admission pass.
    fn pre_dispatch(&self) {}

    /// Starts generating `request`, feeding each unit into `sink`. The returned handle must be completed exactly once.
    fn generate(&self, request: GenerationRequest, sink: UnitSink) -> JobHandle;

    fn close(&self) {}
}

/// How a generator returns its output.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReturnShape {
    /// Raw cells that may still need a lighting bake.
    RawCells,
    /// Finished units that need no further processing.
    StructuredUnits,
    /// Writes into a pooled unit handed over in the request.
    PooledWriteThrough,
}

/// Everything a generator needs to know about one job.
#[derive(Debug)]
pub struct GenerationRequest {
    pub position: SectionPos,
    /// The minimum cell of the requested square.
    pub origin_cell: CellUnits<IVec2>,
    /// Edge length of the requested square.
    pub width_cells: CellUnits<i32>,
    /// The data detail to generate at.
    pub detail: DetailLevel,
    /// The detail requested by the task that started this job. Tasks that join the running job later do not change it.
    pub required_detail: DetailLevel,
    pub mode: GenerationMode,
    /// Only set for [`ReturnShape::PooledWriteThrough`] generators.
    pub pooled_unit: Option<TerrainUnit>,
}

impl GenerationRequest {
    pub fn num_cells(&self) -> i32 {
        self.width_cells.0 * self.width_cells.0
    }

    pub fn contains_cell(&self, cell: CellUnits<IVec2>) -> bool {
        square_contains(self.origin_cell, self.width_cells, cell)
    }
}

/// True if `cell` lies in the square of `width` cells whose minimum is `origin`.
pub(crate) fn square_contains(
    origin: CellUnits<IVec2>,
    width: CellUnits<i32>,
    cell: CellUnits<IVec2>,
) -> bool {
    let CellUnits(min) = origin;
    let CellUnits(c) = cell;
    let max = min + IVec2::splat(width.0);
    c.cmpge(min).all() && c.cmplt(max).all()
}

#[derive(Debug)]
pub enum ProducedUnit {
    Raw(RawCell),
    Structured(TerrainUnit),
    Pooled(TerrainUnit),
}

impl ProducedUnit {
    pub fn shape(&self) -> ReturnShape {
        match self {
            Self::Raw(_) => ReturnShape::RawCells,
            Self::Structured(_) => ReturnShape::StructuredUnits,
            Self::Pooled(_) => ReturnShape::PooledWriteThrough,
        }
    }
}

type SinkFn = dyn Fn(ProducedUnit) -> Result<(), GenerationError> + Send + Sync;

/// Where a generator delivers units. Cheap to clone, so it can be moved onto worker threads.
///
/// An `Err` from [`UnitSink::accept`] means the queue no longer wants output for this job and the generator should stop.
#[derive(Clone)]
pub struct UnitSink {
    consumer: Arc<SinkFn>,
}

impl UnitSink {
    pub fn new(
        consumer: impl Fn(ProducedUnit) -> Result<(), GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            consumer: Arc::new(consumer),
        }
    }

    pub fn accept(&self, unit: ProducedUnit) -> Result<(), GenerationError> {
        (self.consumer)(unit)
    }
}

impl fmt::Debug for UnitSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitSink").finish_non_exhaustive()
    }
}

pub type JobOutcome = Result<(), GenerationError>;

type CompletionCallback = Box<dyn FnOnce(JobOutcome) + Send>;

enum JobSlot {
    Pending(Option<CompletionCallback>),
    Done(JobOutcome),
}

struct JobState {
    slot: Mutex<JobSlot>,
    cancelled: AtomicBool,
    interrupted: AtomicBool,
}

impl JobState {
    /// The first call wins.
    fn finish(&self, outcome: JobOutcome) {
        let callback = {
            let mut slot = self.slot.lock();
            let callback = match &mut *slot {
                JobSlot::Done(_) => return,
                JobSlot::Pending(callback) => callback.take(),
            };
            *slot = JobSlot::Done(outcome.clone());
            callback
        };
        if let Some(callback) = callback {
            callback(outcome);
        }
    }
}

/// The queue's view of a running generation job.
#[derive(Clone)]
pub struct JobHandle {
    state: Arc<JobState>,
}

/// The generator's half of a job. Dropping it without calling [`JobCompleter::complete`] completes the job with
/// [`GenerationError::Abandoned`].
pub struct JobCompleter {
    state: Arc<JobState>,
    completed: bool,
}

impl JobHandle {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (JobHandle, JobCompleter) {
        let state = Arc::new(JobState {
            slot: Mutex::new(JobSlot::Pending(None)),
            cancelled: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
        });
        (
            JobHandle {
                state: state.clone(),
            },
            JobCompleter {
                state,
                completed: false,
            },
        )
    }

    /// A handle for a job that finished before it was returned.
    pub fn finished(outcome: JobOutcome) -> Self {
        let (handle, completer) = Self::new();
        completer.complete(outcome);
        handle
    }

    /// Completes the job right away with [`GenerationError::Cancelled`], or [`GenerationError::Interrupted`] if `interrupt`.
    /// The completer sees the flags so a cooperative generator can stop working.
    pub fn cancel(&self, interrupt: bool) {
        self.state.cancelled.store(true, Ordering::Release);
        if interrupt {
            self.state.interrupted.store(true, Ordering::Release);
        }
        self.state.finish(Err(if interrupt {
            GenerationError::Interrupted
        } else {
            GenerationError::Cancelled
        }));
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        match &*self.state.slot.lock() {
            JobSlot::Done(outcome) => Some(outcome.clone()),
            JobSlot::Pending(_) => None,
        }
    }

    /// Registers the single completion callback. Runs it immediately on this thread if the job is already done.
    pub(crate) fn on_complete(&self, callback: impl FnOnce(JobOutcome) + Send + 'static) {
        let mut slot = self.state.slot.lock();
        if let JobSlot::Done(outcome) = &*slot {
            let outcome = outcome.clone();
            drop(slot);
            callback(outcome);
            return;
        }
        *slot = JobSlot::Pending(Some(Box::new(callback)));
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("outcome", &self.outcome())
            .finish()
    }
}

impl JobCompleter {
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::Acquire)
    }

    pub fn complete(mut self, outcome: JobOutcome) {
        self.completed = true;
        self.state.finish(outcome);
    }
}

impl Drop for JobCompleter {
    fn drop(&mut self) {
        if !self.completed {
            self.state.finish(Err(GenerationError::Abandoned));
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use crossbeam::channel;

    #[test]
    fn callback_runs_once_with_first_outcome() {
        let (handle, completer) = JobHandle::new();
        let (tx, rx) = channel::unbounded();
        handle.on_complete(move |outcome| tx.send(outcome).unwrap());

        completer.complete(Ok(()));
        handle.cancel(true);

        assert_eq!(rx.try_recv(), Ok(Ok(())));
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.outcome(), Some(Ok(())));
    }

    #[test]
    fn callback_registered_late_runs_immediately() {
        let handle = JobHandle::finished(Err(GenerationError::Failed("no terrain".into())));
        let (tx, rx) = channel::unbounded();
        handle.on_complete(move |outcome| tx.send(outcome).unwrap());
        assert_eq!(
            rx.try_recv(),
            Ok(Err(GenerationError::Failed("no terrain".into())))
        );
    }

    #[test]
    fn cancel_is_visible_to_the_generator() {
        let (handle, completer) = JobHandle::new();
        handle.cancel(true);
        assert!(completer.is_cancelled());
        assert!(completer.is_interrupted());
        assert_eq!(handle.outcome(), Some(Err(GenerationError::Interrupted)));

        // Too late to matter.
        completer.complete(Ok(()));
        assert_eq!(handle.outcome(), Some(Err(GenerationError::Interrupted)));
    }

    #[test]
    fn dropped_completer_abandons_the_job() {
        let (handle, completer) = JobHandle::new();
        let worker = std::thread::spawn(move || drop(completer));
        worker.join().unwrap();
        assert_eq!(handle.outcome(), Some(Err(GenerationError::Abandoned)));
    }

    #[test]
    fn request_knows_its_cells() {
        let request = GenerationRequest {
            position: SectionPos::new(6, -1, 0),
            origin_cell: CellUnits(IVec2::new(-4, 0)),
            width_cells: CellUnits(4),
            detail: 0,
            required_detail: 0,
            mode: GenerationMode::Full,
            pooled_unit: None,
        };
        assert_eq!(request.num_cells(), 16);
        assert!(request.contains_cell(CellUnits(IVec2::new(-1, 3))));
        assert!(!request.contains_cell(CellUnits(IVec2::new(0, 0))));
        assert!(!request.contains_cell(CellUnits(IVec2::new(-4, 4))));
    }
}
