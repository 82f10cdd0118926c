mod adapter;
mod admission;
mod in_progress;
mod shutdown;

#[cfg(test)]
mod mock;

pub use shutdown::{QueueState, ShutdownFuture};

use crate::buckets::{WaitingTasks, FARTHEST_BAND};
use crate::{
    BlockUnits, CellBaker, DetailLevel, FailCause, GenFuture, GenTask, NoBake, QueueConfig,
    QueueError, ReturnShape, SectionPos, SubmitError, TaskTracker, TerrainGenerator, UnitPool,
};
use admission::{run_worker, WorkerCommand};
use in_progress::InProgressRegistry;
use shutdown::ShutdownState;

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use strata_core::geometry::FacingBias;
use strata_core::glam::{IVec2, Vec3A};
use strata_core::RollingAverage;

/// # Generation Queue
///
/// Schedules terrain generation for square sections of the world, closest first.
///
/// Submitted tasks wait in distance bands around a moving reference point. A dedicated admission thread repeatedly takes
/// the best task from the closest band and either dispatches it to the [`TerrainGenerator`] or, when the section is too
/// coarse for the generator, splits it into its four children and puts them back into the bands. At most
/// `max_in_progress` jobs run at once, and a task for a position that is already being generated joins the running job.
///
/// Facing direction biases the choice within a band toward sections ahead of the observer.
///
/// ## Backpressure
///
/// Submission never fails for capacity reasons. When `max_waiting_tasks` tasks are already waiting, a new task that is not
/// in the farthest band evicts one task from a band farther than its own, which resolves to [`FailCause::Evicted`].
///
/// ## Shutdown
///
/// [`GenerationQueue::start_shutdown`] stops dispatching, fails every waiting task and returns a [`ShutdownFuture`] that
/// resolves once the jobs still running have terminated. [`GenerationQueue::close`] does all of that and also stops the
/// admission thread and closes the generator. Dropping the queue closes it.
pub struct GenerationQueue {
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

pub(crate) struct QueueShared {
    generator: Arc<dyn TerrainGenerator>,
    config: QueueConfig,
    finest_detail: DetailLevel,
    coarsest_detail: DetailLevel,
    return_shape: ReturnShape,
    validates_units: bool,
    baker: Arc<dyn CellBaker>,
    unit_pool: UnitPool,

    waiting: Mutex<WaitingTasks>,
    in_progress: InProgressRegistry,
    steering: Mutex<Steering>,
    rolling_average: Mutex<RollingAverage>,
    estimated_remaining_tasks: AtomicUsize,
    estimated_remaining_units: AtomicUsize,

    generation_enabled: AtomicBool,
    closing: AtomicBool,
    wake_pending: AtomicBool,
    commands: Sender<WorkerCommand>,
    shutdown: ShutdownState,
}

struct Steering {
    reference: BlockUnits<IVec2>,
    facing: Option<FacingBias>,
}

/// The positions a queue knows about at one moment, sorted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DebugSnapshot {
    pub reference: BlockUnits<IVec2>,
    pub anchor: Option<BlockUnits<IVec2>>,
    pub waiting: Vec<SectionPos>,
    pub in_progress: Vec<SectionPos>,
}

impl GenerationQueue {
    pub fn new(
        generator: Arc<dyn TerrainGenerator>,
        config: QueueConfig,
    ) -> Result<Self, QueueError> {
        Self::with_baker(generator, config, Arc::new(NoBake))
    }

    /// Like [`GenerationQueue::new`], but unlit raw cells are passed through `baker` before trackers see them.
    pub fn with_baker(
        generator: Arc<dyn TerrainGenerator>,
        config: QueueConfig,
        baker: Arc<dyn CellBaker>,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let finest_detail = generator.finest_detail();
        let coarsest_detail = generator.coarsest_detail();
        if finest_detail > coarsest_detail {
            return Err(QueueError::InvalidDetailRange {
                finest: finest_detail,
                coarsest: coarsest_detail,
            });
        }

        let return_shape = generator.return_shape();
        let validates_units = generator.validates_units();

        let (commands, command_rx) = channel::unbounded();
        let shared = Arc::new(QueueShared {
            generator,
            config,
            finest_detail,
            coarsest_detail,
            return_shape,
            validates_units,
            baker,
            unit_pool: UnitPool::new(config.max_in_progress),
            waiting: Mutex::new(WaitingTasks::new()),
            in_progress: InProgressRegistry::new(),
            steering: Mutex::new(Steering {
                reference: BlockUnits(IVec2::ZERO),
                facing: None,
            }),
            rolling_average: Mutex::new(RollingAverage::new(config.rolling_average_window)),
            estimated_remaining_tasks: AtomicUsize::new(0),
            estimated_remaining_units: AtomicUsize::new(0),
            generation_enabled: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            wake_pending: AtomicBool::new(false),
            commands,
            shutdown: ShutdownState::new(),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("strata-admission".into())
            .spawn(move || run_worker(worker_shared, command_rx))
            .map_err(QueueError::SpawnWorker)?;

        log::info!(
            "Created generation queue for data detail {}..={} returning {:?} ({} jobs, {} waiting tasks)",
            finest_detail,
            coarsest_detail,
            return_shape,
            config.max_in_progress,
            config.max_waiting_tasks
        );

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queues generation of `position`, which the generator must provide with data at least as fine as `required_detail`.
    ///
    /// A `required_detail` coarser than the generator supports is clamped. After shutdown has started, the returned future
    /// resolves immediately to [`FailCause::Rejected`].
    pub fn submit(
        &self,
        position: SectionPos,
        required_detail: DetailLevel,
        tracker: Arc<dyn TaskTracker>,
    ) -> Result<GenFuture, SubmitError> {
        let finest = self.shared.finest_detail;
        if required_detail < finest {
            return Err(SubmitError::UnsupportedDetail {
                required: required_detail,
                finest,
            });
        }
        if position.data_detail() < finest {
            return Err(SubmitError::SectionTooFine { position, finest });
        }
        if !position.fits_in_blocks() {
            return Err(SubmitError::SectionOutOfRange { position });
        }
        let required_detail = required_detail.min(self.shared.coarsest_detail);

        let (task, future) = GenTask::new(position, required_detail, tracker);
        match self.shared.enqueue(task) {
            Ok(()) => self.shared.schedule_pass(),
            Err(task) => task.fail(FailCause::Rejected),
        }
        Ok(future)
    }

    /// Cancels every waiting task whose position matches `predicate`. Returns how many were cancelled.
    ///
    /// Tasks already in progress are not affected. `predicate` runs without any queue lock held, so it may call back into
    /// the queue.
    pub fn remove_if(&self, mut predicate: impl FnMut(SectionPos) -> bool) -> usize {
        let positions: Vec<SectionPos> = self.shared.waiting.lock().positions().collect();
        let doomed: Vec<SectionPos> = positions
            .into_iter()
            .filter(|&position| predicate(position))
            .collect();
        let removed = self.shared.waiting.lock().remove_all(doomed);
        let num_removed = removed.len();
        for task in removed {
            task.fail(FailCause::Cancelled);
        }
        num_removed
    }

    /// Moves the point that generation is centered around.
    pub fn set_reference_point(&self, reference: BlockUnits<IVec2>) {
        self.shared.steering.lock().reference = reference;
        self.shared.schedule_pass();
    }

    /// Sets the direction the observer is facing. Only the horizontal component is used; `None` or a vertical direction
    /// turns the bias off.
    pub fn set_facing_direction(&self, facing: Option<Vec3A>) {
        let bias = facing.and_then(|f| FacingBias::new(f, self.shared.config.behind_penalty));
        self.shared.steering.lock().facing = bias;
    }

    /// Runs an admission pass, e.g. once per frame.
    pub fn advance(&self) {
        self.shared.schedule_pass();
    }

    pub fn reference_point(&self) -> BlockUnits<IVec2> {
        self.shared.steering.lock().reference
    }

    pub fn waiting_count(&self) -> usize {
        self.shared.waiting_count()
    }

    pub fn in_progress_count(&self) -> usize {
        self.shared.in_progress.len()
    }

    /// The number of cells covered by every waiting section.
    pub fn queued_cell_count(&self) -> u64 {
        self.shared
            .waiting
            .lock()
            .positions()
            .map(|p| {
                let w = p.cell_width().into_inner() as u64;
                w * w
            })
            .sum()
    }

    /// Mean generation time of one cell in milliseconds, over the recent successful jobs.
    pub fn rolling_average_cost_per_unit(&self) -> f64 {
        self.shared.rolling_average.lock().average()
    }

    pub fn estimated_remaining_units(&self) -> usize {
        self.shared.estimated_remaining_units.load(Ordering::Relaxed)
    }

    pub fn set_estimated_remaining_units(&self, units: usize) {
        self.shared
            .estimated_remaining_units
            .store(units, Ordering::Relaxed);
    }

    pub fn estimated_remaining_tasks(&self) -> usize {
        self.shared.estimated_remaining_tasks.load(Ordering::Relaxed)
    }

    pub fn set_estimated_remaining_tasks(&self, tasks: usize) {
        self.shared
            .estimated_remaining_tasks
            .store(tasks, Ordering::Relaxed);
    }

    pub fn finest_detail(&self) -> DetailLevel {
        self.shared.finest_detail
    }

    pub fn coarsest_detail(&self) -> DetailLevel {
        self.shared.coarsest_detail
    }

    /// False once the generator broke its contract. Tasks keep waiting but nothing more is dispatched.
    pub fn is_generation_enabled(&self) -> bool {
        self.shared.is_generation_enabled()
    }

    pub fn state(&self) -> QueueState {
        self.shared.shutdown.state()
    }

    pub fn debug_snapshot(&self) -> DebugSnapshot {
        let (mut waiting, anchor) = {
            let waiting = self.shared.waiting.lock();
            (waiting.positions().collect::<Vec<_>>(), waiting.anchor())
        };
        let mut in_progress = self.shared.in_progress.positions();
        waiting.sort();
        in_progress.sort();
        DebugSnapshot {
            reference: self.reference_point(),
            anchor,
            waiting,
            in_progress,
        }
    }

    /// Stops dispatching and fails all waiting tasks with [`FailCause::Shutdown`].
    ///
    /// If `cancel_in_progress`, running jobs are cancelled as well (and `interrupt` is forwarded to them). Calling this again
    /// returns the same future.
    pub fn start_shutdown(&self, cancel_in_progress: bool, interrupt: bool) -> ShutdownFuture {
        self.shared.start_shutdown(cancel_in_progress, interrupt)
    }

    /// Shuts down, cancelling running jobs, then blocks until they have terminated and closes the generator.
    pub fn close(&self) {
        let shutdown = self.start_shutdown(true, true);
        shutdown.wait();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = self.shared.commands.send(WorkerCommand::Stop);
            if worker.join().is_err() {
                log::error!("Admission worker panicked");
            }
            self.shared.generator.close();
            self.shared.shutdown.mark_closed();
            log::info!("Generation queue closed");
        }
    }
}

impl Drop for GenerationQueue {
    fn drop(&mut self) {
        self.close();
    }
}

impl QueueShared {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn is_generation_enabled(&self) -> bool {
        self.generation_enabled.load(Ordering::Acquire)
    }

    fn waiting_count(&self) -> usize {
        self.waiting.lock().len()
    }

    /// Adds `task` to the waiting set, evicting a farther task if the set is full. Gives the task back if the queue is
    /// shutting down.
    fn enqueue(&self, task: GenTask) -> Result<(), GenTask> {
        let reference = self.steering.lock().reference;
        let position = task.position;

        let (evicted, replaced) = {
            let mut waiting = self.waiting.lock();
            // Checked under the lock so shutdown cannot drain the set between the check and the insert.
            if self.is_closing() {
                return Err(task);
            }

            let band = waiting.band_for(position, reference);
            let evicted = if waiting.len() >= self.config.max_waiting_tasks && band < FARTHEST_BAND {
                waiting.evict_worst(band)
            } else {
                None
            };
            (evicted, waiting.add(task, reference))
        };

        if let Some(evicted) = evicted {
            log::debug!("Evicting {} to make room for {}", evicted.position, position);
            evicted.fail(FailCause::Evicted);
        }
        if let Some(replaced) = replaced {
            replaced.fail(FailCause::Cancelled);
        }
        Ok(())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
