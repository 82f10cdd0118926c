use super::QueueShared;
use crate::{FailCause, GenTask};

use crossbeam::channel::Receiver;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub(crate) enum WorkerCommand {
    Wake,
    Stop,
}

/// Body of the admission thread. Runs one pass per wake-up until told to stop.
pub(crate) fn run_worker(queue: Arc<QueueShared>, commands: Receiver<WorkerCommand>) {
    for command in commands.iter() {
        match command {
            WorkerCommand::Wake => {
                // Cleared before the pass so a trigger that lands during it queues exactly one more.
                queue.wake_pending.store(false, Ordering::Release);
                queue.run_pass();
            }
            WorkerCommand::Stop => break,
        }
    }
    log::debug!("Admission worker stopped");
}

impl QueueShared {
    /// Asks the worker for an admission pass. At most one request is ever queued.
    pub(super) fn schedule_pass(&self) {
        if !self.wake_pending.swap(true, Ordering::AcqRel) {
            // Fails only after the worker has exited, when there is nothing left to admit.
            let _ = self.commands.send(WorkerCommand::Wake);
        }
    }

    fn run_pass(self: &Arc<Self>) {
        if !self.may_dispatch() {
            return;
        }
        self.generator.pre_dispatch();
        while self.admit_next() {}
    }

    fn may_dispatch(&self) -> bool {
        !self.is_closing() && self.is_generation_enabled()
    }

    /// Dispatches or splits the best waiting task. Returns false when the pass should end.
    fn admit_next(self: &Arc<Self>) -> bool {
        if !self.may_dispatch() || self.in_progress.len() >= self.config.max_in_progress {
            return false;
        }

        let (reference, facing) = {
            let steering = self.steering.lock();
            (steering.reference, steering.facing)
        };
        let task = {
            let mut waiting = self.waiting.lock();
            if waiting.needs_rebucket(reference, self.config.rebucket_threshold_cells) {
                log::debug!(
                    "Rebucketing {} waiting tasks around {:?}",
                    waiting.len(),
                    reference.0
                );
                waiting.rebucket(reference);
            }
            waiting.take_best(reference, facing.as_ref())
        };
        let task = match task {
            Some(task) => task,
            None => return false,
        };

        // Submission guarantees the data detail is never finer than the generator's finest.
        match task.position.data_detail().cmp(&self.coarsest_detail) {
            CmpOrdering::Greater => self.split(task),
            CmpOrdering::Less | CmpOrdering::Equal => self.dispatch(task),
        }
        true
    }

    /// Replaces a task that is too coarse for the generator with its four children.
    fn split(&self, task: GenTask) {
        log::debug!("Splitting {}", task.position);
        let children = task.split();
        let reference = self.steering.lock().reference;

        let mut replaced = Vec::new();
        let mut rejected = Vec::new();
        {
            let mut waiting = self.waiting.lock();
            for child in children {
                if self.is_closing() {
                    rejected.push(child);
                } else if let Some(old) = waiting.add(child, reference) {
                    replaced.push(old);
                }
            }
        }
        for task in rejected {
            task.fail(FailCause::Shutdown);
        }
        for task in replaced {
            task.fail(FailCause::Cancelled);
        }
    }
}
