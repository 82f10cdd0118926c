use crate::{DetailLevel, ReturnShape, SectionPos};

use thiserror::Error;

/// Why [`GenerationQueue::submit`](crate::GenerationQueue::submit) refused a request.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SubmitError {
    #[error("required detail {required} is finer than the generator's finest detail {finest}")]
    UnsupportedDetail {
        required: DetailLevel,
        finest: DetailLevel,
    },
    #[error("section {position} carries data finer than the generator's finest detail {finest}")]
    SectionTooFine {
        position: SectionPos,
        finest: DetailLevel,
    },
    #[error("section {position} does not fit in block coordinates")]
    SectionOutOfRange { position: SectionPos },
}

/// The outcome of a generation job that did not succeed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GenerationError {
    #[error("generation failed: {0}")]
    Failed(String),
    #[error("generation job was cancelled")]
    Cancelled,
    #[error("generation job was interrupted")]
    Interrupted,
    #[error("generation job was dropped without completing")]
    Abandoned,
    #[error("generator produced {found:?} units but declared {expected:?}")]
    CapabilityMismatch {
        expected: ReturnShape,
        found: ReturnShape,
    },
    #[error("generator produced an invalid unit: {0}")]
    InvalidUnit(String),
}

impl GenerationError {
    /// Cancellations and interrupts are expected during shutdown and are not worth an error log.
    pub fn is_interrupt_or_cancel(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Interrupted)
    }

    /// Errors that mean the generator cannot be trusted for any further work.
    pub fn disables_generation(&self) -> bool {
        matches!(
            self,
            Self::CapabilityMismatch { .. } | Self::InvalidUnit(_)
        )
    }
}

/// Why a [`GenerationQueue`](crate::GenerationQueue) could not be created.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("generator's finest detail {finest} is coarser than its coarsest detail {coarsest}")]
    InvalidDetailRange {
        finest: DetailLevel,
        coarsest: DetailLevel,
    },
    #[error("failed to spawn the admission worker: {0}")]
    SpawnWorker(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
