//! A scriptable [`TerrainGenerator`] for scheduler tests.

use crate::{
    CellUnits, DetailLevel, GenerationError, GenerationRequest, JobCompleter, JobHandle,
    ProducedUnit, RawCell, ReturnShape, SectionPos, TaskTracker, TerrainGenerator, TerrainUnit,
    UnitSink,
};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_core::glam::IVec2;

pub const JOB_TIMEOUT: Duration = Duration::from_secs(5);

const AUTOMATIC_WORKERS: usize = 2;

/// Every started job goes into a channel. In manual mode the test takes jobs out and finishes them; in automatic mode a
/// couple of worker threads do.
pub struct MockGenerator {
    finest: DetailLevel,
    coarsest: DetailLevel,
    declared: ReturnShape,
    produced: Mutex<ReturnShape>,
    bad_detail: AtomicBool,
    jobs_tx: Sender<MockJob>,
    jobs_rx: Receiver<MockJob>,
    dispatched: Mutex<Vec<SectionPos>>,
    active: Arc<AtomicUsize>,
    max_active: AtomicUsize,
    closed: AtomicBool,
}

impl MockGenerator {
    pub fn manual(finest: DetailLevel, coarsest: DetailLevel, shape: ReturnShape) -> Arc<Self> {
        let (jobs_tx, jobs_rx) = channel::unbounded();
        Arc::new(Self {
            finest,
            coarsest,
            declared: shape,
            produced: Mutex::new(shape),
            bad_detail: AtomicBool::new(false),
            jobs_tx,
            jobs_rx,
            dispatched: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn automatic(finest: DetailLevel, coarsest: DetailLevel, shape: ReturnShape) -> Arc<Self> {
        let generator = Self::manual(finest, coarsest, shape);
        for _ in 0..AUTOMATIC_WORKERS {
            let jobs = generator.jobs_rx.clone();
            std::thread::spawn(move || {
                for job in jobs.iter() {
                    job.finish();
                }
            });
        }
        generator
    }

    /// Produce units of `shape` regardless of the declared return shape.
    pub fn producing(self: Arc<Self>, shape: ReturnShape) -> Arc<Self> {
        *self.produced.lock() = shape;
        self
    }

    /// Produce units one detail level coarser than requested.
    pub fn with_bad_detail(self: Arc<Self>) -> Arc<Self> {
        self.bad_detail.store(true, Ordering::SeqCst);
        self
    }

    pub fn next_job(&self) -> Option<MockJob> {
        self.next_job_within(JOB_TIMEOUT)
    }

    pub fn next_job_within(&self, timeout: Duration) -> Option<MockJob> {
        self.jobs_rx.recv_timeout(timeout).ok()
    }

    pub fn dispatched(&self) -> Vec<SectionPos> {
        self.dispatched.lock().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TerrainGenerator for MockGenerator {
    fn finest_detail(&self) -> DetailLevel {
        self.finest
    }

    fn coarsest_detail(&self) -> DetailLevel {
        self.coarsest
    }

    fn return_shape(&self) -> ReturnShape {
        self.declared
    }

    fn generate(&self, request: GenerationRequest, sink: UnitSink) -> JobHandle {
        self.dispatched.lock().push(request.position);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let (handle, completer) = JobHandle::new();
        let job = MockJob {
            request,
            sink,
            completer,
            produced: *self.produced.lock(),
            bad_detail: self.bad_detail.load(Ordering::SeqCst),
            active: self.active.clone(),
        };
        self.jobs_tx
            .send(job)
            .expect("job channel closed while the generator is alive");
        handle
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MockJob {
    pub request: GenerationRequest,
    pub sink: UnitSink,
    pub completer: JobCompleter,
    produced: ReturnShape,
    bad_detail: bool,
    active: Arc<AtomicUsize>,
}

impl MockJob {
    /// Produces one unit per requested cell (or the single pooled unit), then completes the job.
    pub fn finish(mut self) {
        let outcome = self.produce();
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completer.complete(outcome);
    }

    fn produce(&mut self) -> Result<(), GenerationError> {
        let detail = self.request.detail + self.bad_detail as DetailLevel;
        if self.produced == ReturnShape::PooledWriteThrough {
            let mut unit = self.request.pooled_unit.take().unwrap_or_default();
            unit.detail = detail;
            unit.payload.push(1);
            return self.sink.accept(ProducedUnit::Pooled(unit));
        }

        let CellUnits(origin) = self.request.origin_cell;
        let width = self.request.width_cells.into_inner();
        for z in 0..width {
            for x in 0..width {
                let cell = CellUnits(origin + IVec2::new(x, z));
                let unit = match self.produced {
                    ReturnShape::RawCells => ProducedUnit::Raw(RawCell {
                        cell,
                        detail,
                        lit: false,
                        payload: vec![1],
                    }),
                    _ => ProducedUnit::Structured(TerrainUnit::new(cell, detail, vec![1])),
                };
                self.sink.accept(unit)?;
            }
        }
        Ok(())
    }
}

/// Counts units and remembers their payloads.
#[derive(Default)]
pub struct CountingTracker {
    count: AtomicUsize,
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl CountingTracker {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().clone()
    }
}

impl TaskTracker for CountingTracker {
    fn on_unit(&self, unit: &TerrainUnit) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().push(unit.payload.clone());
    }
}

/// Polls `condition` until it holds, panicking after [`JOB_TIMEOUT`].
pub fn eventually(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + JOB_TIMEOUT;
    while !condition() {
        assert!(
            Instant::now() < deadline,
            "condition not met within {:?}",
            JOB_TIMEOUT
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
