use crate::{DetailLevel, GenTask, JobHandle, SectionPos, TaskTracker, TerrainUnit};

use async_channel::Sender;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;
use strata_core::ahash;

/// A running generation job and every task waiting on its result.
pub(crate) struct InProgressGroup {
    pub position: SectionPos,
    /// The data detail being generated.
    pub detail: DetailLevel,
    pub required_detail: DetailLevel,
    state: Mutex<GroupState>,
}

struct GroupState {
    /// `None` once the job has finished; no task can join after that.
    tasks: Option<SmallVec<[GenTask; 1]>>,
    handle: Option<JobHandle>,
    /// A cancellation that arrived before the job handle did. The flag is `interrupt`.
    pending_cancel: Option<bool>,
    /// Keeps the shutdown future pending while the job runs.
    shutdown_guard: Option<Sender<()>>,
}

/// What [`InProgressGroup::finish`] hands back to resolve.
pub(crate) struct FinishedGroup {
    pub tasks: SmallVec<[GenTask; 1]>,
    pub shutdown_guard: Option<Sender<()>>,
}

impl InProgressGroup {
    fn new(task: GenTask, shutdown_guard: Sender<()>) -> Self {
        let mut tasks = SmallVec::new();
        let position = task.position;
        let required_detail = task.required_detail;
        tasks.push(task);
        Self {
            position,
            detail: position.data_detail(),
            required_detail,
            state: Mutex::new(GroupState {
                tasks: Some(tasks),
                handle: None,
                pending_cancel: None,
                shutdown_guard: Some(shutdown_guard),
            }),
        }
    }

    /// Adds `task` to the group, or gives it back if the job already finished.
    fn try_join(&self, task: GenTask) -> Result<(), GenTask> {
        match &mut self.state.lock().tasks {
            Some(tasks) => {
                tasks.push(task);
                Ok(())
            }
            None => Err(task),
        }
    }

    pub fn attach_handle(&self, handle: JobHandle) {
        let pending_cancel = {
            let mut state = self.state.lock();
            state.handle = Some(handle.clone());
            state.pending_cancel.take()
        };
        if let Some(interrupt) = pending_cancel {
            handle.cancel(interrupt);
        }
    }

    pub fn cancel(&self, interrupt: bool) {
        let handle = {
            let mut state = self.state.lock();
            if state.tasks.is_none() {
                return;
            }
            match &state.handle {
                Some(handle) => handle.clone(),
                None => {
                    state.pending_cancel = Some(interrupt);
                    return;
                }
            }
        };
        handle.cancel(interrupt);
    }

    /// Closes the group to new tasks. Only the first call returns anything.
    pub fn finish(&self) -> Option<FinishedGroup> {
        let mut state = self.state.lock();
        let tasks = state.tasks.take()?;
        state.handle = None;
        Some(FinishedGroup {
            tasks,
            shutdown_guard: state.shutdown_guard.take(),
        })
    }

    #[cfg(test)]
    pub fn num_tasks(&self) -> usize {
        self.state.lock().tasks.as_ref().map_or(0, |tasks| tasks.len())
    }

    /// Hands `unit` to the tracker of every task in the group. Returns false if the group already finished.
    pub fn deliver(&self, unit: &TerrainUnit) -> bool {
        let trackers: SmallVec<[Arc<dyn TaskTracker>; 1]> = {
            let state = self.state.lock();
            match &state.tasks {
                Some(tasks) => tasks.iter().map(|task| task.tracker.clone()).collect(),
                None => return false,
            }
        };
        for tracker in trackers {
            tracker.on_unit(unit);
        }
        true
    }
}

pub(crate) enum Registration {
    /// A new group was registered and its job must be started.
    Started(Arc<InProgressGroup>),
    /// The task joined a group that is already running.
    Joined,
}

/// The groups currently being generated, at most one per position.
#[derive(Default)]
pub(crate) struct InProgressRegistry {
    groups: DashMap<SectionPos, Arc<InProgressGroup>, ahash::RandomState>,
}

impl InProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Puts `task` into the live group for its position, or registers a new group for it.
    ///
    /// A group that already finished but has not been removed yet is replaced.
    pub fn register(&self, task: GenTask, shutdown_guard: &Sender<()>) -> Registration {
        match self.groups.entry(task.position) {
            Entry::Occupied(mut occupied) => match occupied.get().try_join(task) {
                Ok(()) => Registration::Joined,
                Err(task) => {
                    log::warn!(
                        "Replacing finished generation group for {}",
                        occupied.key()
                    );
                    let group = Arc::new(InProgressGroup::new(task, shutdown_guard.clone()));
                    occupied.insert(group.clone());
                    Registration::Started(group)
                }
            },
            Entry::Vacant(vacant) => {
                let group = Arc::new(InProgressGroup::new(task, shutdown_guard.clone()));
                vacant.insert(group.clone());
                Registration::Started(group)
            }
        }
    }

    /// Removes `group` unless its position has been taken over by a newer group.
    pub fn remove(&self, group: &Arc<InProgressGroup>) {
        self.groups
            .remove_if(&group.position, |_, registered| Arc::ptr_eq(registered, group));
    }

    pub fn snapshot(&self) -> Vec<Arc<InProgressGroup>> {
        self.groups.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn positions(&self) -> Vec<SectionPos> {
        self.groups.iter().map(|entry| *entry.key()).collect()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
