use super::QueueShared;
use crate::FailCause;

use async_channel::{Receiver, Sender};
use futures_lite::future;
use parking_lot::Mutex;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::Ordering;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueState {
    Open,
    /// No more dispatches. Waiting for in-progress jobs to terminate.
    Closing,
    Closed,
}

/// Resolves once every job that was in progress when shutdown started has terminated.
///
/// Every in-progress group holds a sender of a channel nobody ever sends on; the channel closes when the last one is dropped.
#[derive(Clone, Debug)]
pub struct ShutdownFuture {
    receiver: Receiver<()>,
}

impl ShutdownFuture {
    pub fn is_complete(&self) -> bool {
        self.receiver.is_closed()
    }

    pub fn wait(self) {
        future::block_on(self.into_future())
    }
}

impl IntoFuture for ShutdownFuture {
    type Output = ();
    type IntoFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            // Only ever returns an error, once the channel is closed.
            let _ = self.receiver.recv().await;
        })
    }
}

pub(crate) struct ShutdownState {
    /// The queue's own guard. Taken when shutdown starts; dispatches need a clone of it.
    pub guard: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    state: QueueState,
    future: Option<ShutdownFuture>,
}

impl ShutdownState {
    pub fn new() -> Self {
        let (guard, receiver) = async_channel::bounded(1);
        Self {
            guard: Mutex::new(Some(guard)),
            receiver,
            lifecycle: Mutex::new(Lifecycle {
                state: QueueState::Open,
                future: None,
            }),
        }
    }

    pub fn state(&self) -> QueueState {
        self.lifecycle.lock().state
    }

    pub fn mark_closed(&self) {
        self.lifecycle.lock().state = QueueState::Closed;
    }
}

impl QueueShared {
    pub(crate) fn start_shutdown(
        &self,
        cancel_in_progress: bool,
        interrupt: bool,
    ) -> ShutdownFuture {
        let future = {
            let mut lifecycle = self.shutdown.lifecycle.lock();
            if let Some(future) = &lifecycle.future {
                return future.clone();
            }

            log::info!(
                "Shutting down generation queue with {} waiting and {} in progress",
                self.waiting_count(),
                self.in_progress.len()
            );
            self.closing.store(true, Ordering::Release);

            // Groups registered from here on cannot get a guard, so the future only waits on jobs already running.
            drop(self.shutdown.guard.lock().take());

            let future = ShutdownFuture {
                receiver: self.shutdown.receiver.clone(),
            };
            lifecycle.state = QueueState::Closing;
            lifecycle.future = Some(future.clone());
            future
        };

        if cancel_in_progress {
            for group in self.in_progress.snapshot() {
                group.cancel(interrupt);
            }
        }

        let waiting = self.waiting.lock().drain();
        if !waiting.is_empty() {
            log::debug!("Failing {} waiting tasks for shutdown", waiting.len());
        }
        for task in waiting {
            task.fail(FailCause::Shutdown);
        }

        future
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
