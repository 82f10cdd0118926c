//! The strata terrain generation scheduler.
//!
//! # Sections
//!
//! The world is addressed as a quad-tree of square sections, each named by a [`SectionPos`](crate::SectionPos). A section at
//! detail `d` is `2^d` blocks wide and carries data at detail `d - 6`, so every section holds the same number of data points no matter how much
//! ground it covers. Parents and children are computed from the position itself.
//!
//! # Tasks
//!
//! Callers [`submit`](crate::GenerationQueue::submit) a section and get back a [`GenFuture`](crate::GenFuture). It resolves
//! exactly once, to success, to a failure with a [`FailCause`](crate::FailCause), or to a split into four child futures when
//! the section was too coarse for the generator. Generated units are streamed to the task's
//! [`TaskTracker`](crate::TaskTracker) as they arrive.
//!
//! # Scheduling
//!
//! Waiting tasks are kept in distance bands around a reference point, usually the observer. The admission thread always
//! serves the closest band first and, inside it, prefers sections the observer is facing. The number of concurrently running
//! jobs is bounded, and when too many tasks are waiting, far ones are evicted in favor of near ones.
//!
//! # Generators
//!
//! The backend is anything implementing [`TerrainGenerator`](crate::TerrainGenerator). It declares which data details it can
//! produce and the [`ReturnShape`](crate::ReturnShape) of its output, and it owns the executor its jobs run on.

mod buckets;
mod config;
mod error;
mod generator;
mod position;
mod queue;
mod task;
mod unit;
mod units;

pub use buckets::*;
pub use config::*;
pub use error::*;
pub use generator::*;
pub use position::*;
pub use queue::*;
pub use task::*;
pub use unit::*;
pub use units::*;
