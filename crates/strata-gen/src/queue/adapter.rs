//! Turns dispatched groups into generator jobs and generator output into tracker callbacks.

use super::in_progress::{InProgressGroup, Registration};
use super::QueueShared;
use crate::generator::square_contains;
use crate::{
    CellUnits, DetailLevel, FailCause, GenTask, GenerationError, GenerationRequest, JobOutcome,
    ProducedUnit, ReturnShape, TerrainUnit, UnitSink, CELL_DETAIL_LEVEL,
};

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use strata_core::glam::IVec2;

/// The region a job was asked to fill, for checking what comes back.
#[derive(Clone, Copy, Debug)]
struct UnitBounds {
    origin_cell: CellUnits<IVec2>,
    width_cells: CellUnits<i32>,
    detail: DetailLevel,
}

impl UnitBounds {
    fn check(&self, unit: &TerrainUnit) -> Result<(), GenerationError> {
        let CellUnits(cell) = unit.cell;
        if !square_contains(self.origin_cell, self.width_cells, unit.cell) {
            let CellUnits(min) = self.origin_cell;
            return Err(GenerationError::InvalidUnit(format!(
                "cell {} is outside of the {}-cell square at {}",
                cell, self.width_cells.0, min
            )));
        }
        if unit.detail != self.detail {
            return Err(GenerationError::InvalidUnit(format!(
                "unit has detail {} but {} was requested",
                unit.detail, self.detail
            )));
        }
        if unit.payload.is_empty() {
            return Err(GenerationError::InvalidUnit(format!(
                "unit for cell {} is empty",
                cell
            )));
        }
        Ok(())
    }
}

impl QueueShared {
    /// Registers `task` as in progress and starts its job, unless a job for the same position is already running.
    pub(super) fn dispatch(self: &Arc<Self>, task: GenTask) {
        let position = task.position;
        let registration = {
            let guard = self.shutdown.guard.lock();
            let shutdown_guard = match guard.as_ref() {
                Some(shutdown_guard) => shutdown_guard,
                None => {
                    drop(guard);
                    task.fail(FailCause::Shutdown);
                    return;
                }
            };
            self.in_progress.register(task, shutdown_guard)
        };

        match registration {
            Registration::Joined => log::debug!("Task for {} joined a running job", position),
            Registration::Started(group) => self.start_job(group),
        }
    }

    fn start_job(self: &Arc<Self>, group: Arc<InProgressGroup>) {
        let shape = self.return_shape;
        let position = group.position;
        let width_exponent =
            position.detail() as i32 - group.detail as i32 - CELL_DETAIL_LEVEL as i32;
        let bounds = UnitBounds {
            origin_cell: position.min_cell(),
            width_cells: CellUnits(1 << width_exponent.max(0)),
            detail: group.detail,
        };
        let num_cells = bounds.width_cells.0 * bounds.width_cells.0;

        let request = GenerationRequest {
            position,
            origin_cell: bounds.origin_cell,
            width_cells: bounds.width_cells,
            detail: group.detail,
            required_detail: group.required_detail,
            mode: self.config.mode,
            pooled_unit: (shape == ReturnShape::PooledWriteThrough)
                .then(|| self.unit_pool.checkout(bounds.origin_cell, group.detail)),
        };
        log::debug!(
            "Dispatching {} at data detail {} ({} cells)",
            position,
            group.detail,
            num_cells
        );

        let sink = self.unit_sink(&group, shape, bounds);
        let started = Instant::now();
        let handle = self.generator.generate(request, sink);
        group.attach_handle(handle.clone());

        let queue = Arc::downgrade(self);
        handle.on_complete(move |outcome| {
            let queue = queue.upgrade();
            if let Some(queue) = &queue {
                queue.record_outcome(&outcome, started, num_cells);
            }
            let finished = match group.finish() {
                Some(finished) => finished,
                None => return,
            };
            if let Some(queue) = &queue {
                queue.in_progress.remove(&group);
            }

            for task in finished.tasks {
                match &outcome {
                    Ok(()) => task.succeed(),
                    Err(e) => task.fail(FailCause::Generation(e.clone())),
                }
            }
            drop(finished.shutdown_guard);

            if let Some(queue) = queue {
                queue.schedule_pass();
            }
        });
    }

    fn record_outcome(&self, outcome: &JobOutcome, started: Instant, num_cells: i32) {
        match outcome {
            Ok(()) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.rolling_average
                    .lock()
                    .add(elapsed_ms / num_cells.max(1) as f64);
            }
            Err(e) if e.disables_generation() => {
                self.disable_generation(e);
            }
            Err(e) if e.is_interrupt_or_cancel() => {}
            Err(e) => log::error!("Terrain generation failed: {}", e),
        }
    }

    fn unit_sink(
        self: &Arc<Self>,
        group: &Arc<InProgressGroup>,
        expected: ReturnShape,
        bounds: UnitBounds,
    ) -> UnitSink {
        let queue = Arc::downgrade(self);
        let group = group.clone();
        UnitSink::new(move |produced| {
            let queue = queue.upgrade().ok_or(GenerationError::Cancelled)?;
            queue.consume_unit(&group, expected, &bounds, produced)
        })
    }

    fn consume_unit(
        &self,
        group: &InProgressGroup,
        expected: ReturnShape,
        bounds: &UnitBounds,
        produced: ProducedUnit,
    ) -> Result<(), GenerationError> {
        if !self.is_generation_enabled() {
            return Err(GenerationError::Cancelled);
        }
        let found = produced.shape();
        if found != expected {
            return Err(self.disable_generation(&GenerationError::CapabilityMismatch {
                expected,
                found,
            }));
        }

        let delivered = match produced {
            ProducedUnit::Raw(mut raw) => {
                if !raw.lit {
                    self.baker.bake(&mut raw);
                    raw.lit = true;
                }
                group.deliver(&TerrainUnit::from(raw))
            }
            ProducedUnit::Structured(unit) => {
                if !self.validates_units {
                    bounds
                        .check(&unit)
                        .map_err(|e| self.disable_generation(&e))?;
                }
                group.deliver(&unit)
            }
            ProducedUnit::Pooled(unit) => {
                let delivered = group.deliver(&unit);
                self.unit_pool.give_back(unit);
                delivered
            }
        };

        if delivered {
            Ok(())
        } else {
            Err(GenerationError::Cancelled)
        }
    }

    /// Stops all further generation. Logs only the first time.
    fn disable_generation(&self, cause: &GenerationError) -> GenerationError {
        if self.generation_enabled.swap(false, Ordering::AcqRel) {
            log::error!("Disabling terrain generation: {}", cause);
        }
        cause.clone()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
