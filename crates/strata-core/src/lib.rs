pub mod geometry;
pub mod rolling_average;

pub use rolling_average::RollingAverage;

use ahash::{AHashMap, AHashSet};
pub type SmallKeyHashMap<K, V> = AHashMap<K, V>;
pub type SmallKeyHashSet<K> = AHashSet<K>;

// Re-exports.
pub use ahash;
pub use approx;
pub use glam;
pub use static_assertions;
