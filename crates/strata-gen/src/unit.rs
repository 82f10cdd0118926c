use crate::{CellUnits, DetailLevel};

use parking_lot::Mutex;
use strata_core::glam::IVec2;

/// One cell's worth of generated terrain, ready for consumers.
///
/// The payload is opaque to the scheduler.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TerrainUnit {
    pub cell: CellUnits<IVec2>,
    pub detail: DetailLevel,
    pub payload: Vec<u8>,
}

impl TerrainUnit {
    pub fn new(cell: CellUnits<IVec2>, detail: DetailLevel, payload: Vec<u8>) -> Self {
        Self {
            cell,
            detail,
            payload,
        }
    }
}

/// A cell straight out of a generator that works in raw cells. It may still need lighting baked in before it is usable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawCell {
    pub cell: CellUnits<IVec2>,
    pub detail: DetailLevel,
    pub lit: bool,
    pub payload: Vec<u8>,
}

impl From<RawCell> for TerrainUnit {
    fn from(raw: RawCell) -> Self {
        Self::new(raw.cell, raw.detail, raw.payload)
    }
}

/// Finishes raw cells that come out of the generator unlit.
pub trait CellBaker: Send + Sync {
    fn bake(&self, cell: &mut RawCell);
}

/// Leaves cells as they are.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBake;

impl CellBaker for NoBake {
    fn bake(&self, _cell: &mut RawCell) {}
}

/// Recycles [`TerrainUnit`] buffers for generators that write their output in place.
#[derive(Debug)]
pub struct UnitPool {
    free: Mutex<Vec<TerrainUnit>>,
    max_pooled: usize,
}

impl UnitPool {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_pooled)),
            max_pooled,
        }
    }

    /// Takes a cleared unit addressed to `cell` and `detail`, reusing a pooled buffer when there is one.
    pub fn checkout(&self, cell: CellUnits<IVec2>, detail: DetailLevel) -> TerrainUnit {
        let mut unit = self.free.lock().pop().unwrap_or_default();
        unit.cell = cell;
        unit.detail = detail;
        unit.payload.clear();
        unit
    }

    /// Returns a buffer to the pool. Buffers beyond the pool's capacity are dropped.
    pub fn give_back(&self, unit: TerrainUnit) {
        let mut free = self.free.lock();
        if free.len() < self.max_pooled {
            free.push(unit);
        }
    }

    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.lock().is_empty()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pool_reuses_buffers_and_clears_them() {
        let pool = UnitPool::new(1);
        let mut unit = pool.checkout(CellUnits(IVec2::new(1, 2)), 0);
        unit.payload.extend_from_slice(&[1, 2, 3]);
        let capacity = unit.payload.capacity();
        pool.give_back(unit);
        assert_eq!(pool.len(), 1);

        let reused = pool.checkout(CellUnits(IVec2::new(5, 5)), 1);
        assert!(pool.is_empty());
        assert_eq!(reused.cell, CellUnits(IVec2::new(5, 5)));
        assert_eq!(reused.detail, 1);
        assert!(reused.payload.is_empty());
        assert_eq!(reused.payload.capacity(), capacity);
    }

    #[test]
    fn pool_is_bounded() {
        let pool = UnitPool::new(1);
        pool.give_back(TerrainUnit::default());
        pool.give_back(TerrainUnit::default());
        assert_eq!(pool.len(), 1);
    }
}
