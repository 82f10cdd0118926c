use crate::{BlockUnits, GenTask, SectionPos};

use float_ord::FloatOrd;
use strata_core::geometry::{chebyshev_distance, FacingBias};
use strata_core::glam::IVec2;
use strata_core::{SmallKeyHashMap, SmallKeyHashSet};

/// Upper bounds (exclusive, in cells) of every band but the last, which catches everything farther.
pub const BAND_BOUNDARIES_CELLS: [i32; 5] = [8, 16, 32, 64, 128];
pub const NUM_BANDS: usize = BAND_BOUNDARIES_CELLS.len() + 1;
pub const FARTHEST_BAND: BandIndex = NUM_BANDS - 1;

/// 0 is the closest band.
pub type BandIndex = usize;

pub fn band_for_distance(distance_cells: i32) -> BandIndex {
    BAND_BOUNDARIES_CELLS
        .iter()
        .position(|&boundary| distance_cells < boundary)
        .unwrap_or(FARTHEST_BAND)
}

/// Chebyshev distance in whole cells between the center of `position` and `reference`.
pub fn cell_distance(position: SectionPos, reference: BlockUnits<IVec2>) -> i32 {
    let BlockUnits(center) = position.center();
    BlockUnits(chebyshev_distance(center, reference.0))
        .in_cells()
        .into_inner()
}

/// The set of tasks waiting to be dispatched, grouped into distance bands.
///
/// Bands are computed relative to the *anchor*, the reference point at the time of the last [`WaitingTasks::rebucket`]. The
/// reference may drift from the anchor between rebuckets; selection within a band always uses the current reference.
///
/// Every task is stored once in the flat map alongside its band, and its position appears in exactly that band.
#[derive(Default)]
pub struct WaitingTasks {
    tasks: SmallKeyHashMap<SectionPos, WaitingEntry>,
    bands: [SmallKeyHashSet<SectionPos>; NUM_BANDS],
    anchor: Option<BlockUnits<IVec2>>,
}

struct WaitingEntry {
    task: GenTask,
    band: BandIndex,
}

impl WaitingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn anchor(&self) -> Option<BlockUnits<IVec2>> {
        self.anchor
    }

    pub fn contains(&self, position: SectionPos) -> bool {
        self.tasks.contains_key(&position)
    }

    /// The band `position` would be placed in right now.
    pub fn band_for(&self, position: SectionPos, reference: BlockUnits<IVec2>) -> BandIndex {
        band_for_distance(cell_distance(position, self.anchor.unwrap_or(reference)))
    }

    pub fn band_of(&self, position: SectionPos) -> Option<BandIndex> {
        self.tasks.get(&position).map(|entry| entry.band)
    }

    pub fn positions(&self) -> impl Iterator<Item = SectionPos> + '_ {
        self.tasks.keys().copied()
    }

    /// Inserts `task`, returning the task it replaced at the same position, if any.
    pub fn add(&mut self, task: GenTask, reference: BlockUnits<IVec2>) -> Option<GenTask> {
        let anchor = *self.anchor.get_or_insert(reference);
        let position = task.position;
        let band = band_for_distance(cell_distance(position, anchor));

        let replaced = self.remove(position);
        self.bands[band].insert(position);
        self.tasks.insert(position, WaitingEntry { task, band });
        replaced
    }

    pub fn remove(&mut self, position: SectionPos) -> Option<GenTask> {
        let entry = self.tasks.remove(&position)?;
        self.bands[entry.band].remove(&position);
        Some(entry.task)
    }

    pub fn needs_rebucket(&self, reference: BlockUnits<IVec2>, threshold_cells: i32) -> bool {
        match self.anchor {
            None => true,
            Some(BlockUnits(anchor)) => {
                let moved = BlockUnits(chebyshev_distance(anchor, reference.0)).in_cells();
                moved.into_inner() >= threshold_cells
            }
        }
    }

    /// Makes `reference` the new anchor and moves every task into the band implied by its distance from it.
    pub fn rebucket(&mut self, reference: BlockUnits<IVec2>) {
        self.anchor = Some(reference);
        for band in self.bands.iter_mut() {
            band.clear();
        }
        for (&position, entry) in self.tasks.iter_mut() {
            entry.band = band_for_distance(cell_distance(position, reference));
            self.bands[entry.band].insert(position);
        }
    }

    /// Removes the best task from the closest non-empty band.
    ///
    /// Within the band, the task with the smallest distance to `reference` wins, scaled by `facing` when given so tasks
    /// ahead are preferred over tasks behind. Ties go to the smaller position key so selection is deterministic.
    pub fn take_best(
        &mut self,
        reference: BlockUnits<IVec2>,
        facing: Option<&FacingBias>,
    ) -> Option<GenTask> {
        let band = self.bands.iter().find(|band| !band.is_empty())?;
        let best = band
            .iter()
            .copied()
            .min_by_key(|&position| (FloatOrd(priority(position, reference, facing)), position))?;
        self.remove(best)
    }

    /// Removes an arbitrary task from the farthest non-empty band that is strictly farther than `closer_than`.
    pub fn evict_worst(&mut self, closer_than: BandIndex) -> Option<GenTask> {
        let victim = ((closer_than + 1)..NUM_BANDS)
            .rev()
            .find_map(|band| self.bands[band].iter().next().copied())?;
        self.remove(victim)
    }

    /// Removes the tasks at `positions`. Positions with no waiting task are skipped.
    pub fn remove_all(&mut self, positions: impl IntoIterator<Item = SectionPos>) -> Vec<GenTask> {
        positions
            .into_iter()
            .filter_map(|position| self.remove(position))
            .collect()
    }

    pub fn drain(&mut self) -> Vec<GenTask> {
        for band in self.bands.iter_mut() {
            band.clear();
        }
        self.tasks.drain().map(|(_, entry)| entry.task).collect()
    }

    /// Checks that the flat map and the bands agree, and that every band matches the distance from the anchor.
    #[cfg(test)]
    fn assert_consistent(&self) {
        let banded: usize = self.bands.iter().map(|b| b.len()).sum();
        assert_eq!(banded, self.tasks.len());
        for (&position, entry) in self.tasks.iter() {
            assert!(self.bands[entry.band].contains(&position));
            let anchor = self.anchor.expect("tasks without an anchor");
            assert_eq!(entry.band, band_for_distance(cell_distance(position, anchor)));
        }
    }
}

fn priority(
    position: SectionPos,
    reference: BlockUnits<IVec2>,
    facing: Option<&FacingBias>,
) -> f32 {
    let BlockUnits(center) = position.center();
    let distance = chebyshev_distance(center, reference.0) as f32;
    match facing {
        Some(bias) if distance > 0.0 => {
            bias.biased_distance(distance, center.as_vec2() - reference.0.as_vec2())
        }
        _ => distance,
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
