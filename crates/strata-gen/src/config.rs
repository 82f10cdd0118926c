use crate::ConfigError;

use serde::{Deserialize, Serialize};

/// How much work the generator is allowed to do for a request. Passed through untouched.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum GenerationMode {
    /// Only load terrain that already exists in the backend's storage.
    PreExistingOnly,
    /// Generate whatever is missing.
    Full,
}

impl Default for GenerationMode {
    fn default() -> Self {
        Self::Full
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound on concurrently running generation jobs.
    pub max_in_progress: usize,
    /// Once this many tasks are waiting, a new closer task evicts a far one.
    pub max_waiting_tasks: usize,
    /// How far (in cells) the reference point may drift from the bucketing anchor before all waiting tasks are rebucketed.
    pub rebucket_threshold_cells: i32,
    /// Distance multiplier for tasks directly behind the facing direction.
    pub behind_penalty: f32,
    /// Number of samples in the per-cell generation time average.
    pub rolling_average_window: usize,
    pub mode: GenerationMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let parallelism = available_parallelism();
        Self {
            max_in_progress: parallelism,
            max_waiting_tasks: 500,
            rebucket_threshold_cells: 16,
            behind_penalty: 1.5,
            rolling_average_window: parallelism * 500,
            mode: GenerationMode::Full,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_progress == 0 {
            return Err(ConfigError::Invalid("max_in_progress must be positive".into()));
        }
        if self.max_waiting_tasks == 0 {
            return Err(ConfigError::Invalid(
                "max_waiting_tasks must be positive".into(),
            ));
        }
        if self.rolling_average_window == 0 {
            return Err(ConfigError::Invalid(
                "rolling_average_window must be positive".into(),
            ));
        }
        if self.rebucket_threshold_cells < 0 {
            return Err(ConfigError::Invalid(
                "rebucket_threshold_cells must not be negative".into(),
            ));
        }
        if !(self.behind_penalty >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "behind_penalty must be at least 1, got {}",
                self.behind_penalty
            )));
        }
        Ok(())
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
