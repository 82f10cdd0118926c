use crate::units::*;

use std::fmt;
use strata_core::glam::IVec2;
use strata_core::static_assertions::const_assert_eq;

/// Logarithmic resolution. A region at detail `d` is `2^d` blocks wide; lower is finer.
pub type DetailLevel = i8;

/// Index of one of the four children of a [`SectionPos`]. Bit 0 is the X offset, bit 1 is the Z offset.
pub type ChildIndex = u8;

/// A section at detail `d` carries data at detail `d - SECTION_DETAIL_OFFSET`, i.e. `2^6 x 2^6` data points.
pub const SECTION_DETAIL_OFFSET: DetailLevel = 6;

const DETAIL_BITS: u32 = 8;
const COORD_BITS: u32 = 28;
const_assert_eq!(DETAIL_BITS + 2 * COORD_BITS, 64);

const X_SHIFT: u32 = COORD_BITS;
const DETAIL_SHIFT: u32 = 2 * COORD_BITS;
const COORD_MASK: u64 = (1 << COORD_BITS) - 1;

/// The coarsest detail whose block width fits in an `i32`.
pub const MAX_BLOCK_DETAIL: DetailLevel = 30;

pub const MIN_SECTION_COORD: i32 = -(1 << (COORD_BITS - 1));
pub const MAX_SECTION_COORD: i32 = (1 << (COORD_BITS - 1)) - 1;

/// The quad-tree address of a square region: `(detail, x, z)` packed into a single `u64`.
///
/// `(x, z)` count sections of the same detail, so the minimum corner of a section is `(x << detail, z << detail)` in blocks.
/// Parents and children are derived arithmetically; there is nothing to look up.
///
/// The derived `Ord` compares packed keys. It is total but has no spatial meaning.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct SectionPos {
    key: u64,
}

impl SectionPos {
    pub fn new(detail: DetailLevel, x: i32, z: i32) -> Self {
        debug_assert!((MIN_SECTION_COORD..=MAX_SECTION_COORD).contains(&x));
        debug_assert!((MIN_SECTION_COORD..=MAX_SECTION_COORD).contains(&z));

        let key = ((detail as u8 as u64) << DETAIL_SHIFT)
            | ((x as u32 as u64 & COORD_MASK) << X_SHIFT)
            | (z as u32 as u64 & COORD_MASK);
        Self { key }
    }

    /// The section of `detail` that contains block `p`.
    pub fn containing(detail: DetailLevel, p: BlockUnits<IVec2>) -> Self {
        let BlockUnits(p) = p;
        Self::new(detail, p.x >> detail, p.y >> detail)
    }

    #[inline]
    pub const fn from_key(key: u64) -> Self {
        Self { key }
    }

    #[inline]
    pub const fn key(&self) -> u64 {
        self.key
    }

    #[inline]
    pub fn detail(&self) -> DetailLevel {
        (self.key >> DETAIL_SHIFT) as u8 as DetailLevel
    }

    #[inline]
    pub fn x(&self) -> i32 {
        unpack_coord(self.key >> X_SHIFT)
    }

    #[inline]
    pub fn z(&self) -> i32 {
        unpack_coord(self.key)
    }

    /// The detail of the data this section carries, saturating at [`DetailLevel::MIN`].
    #[inline]
    pub fn data_detail(&self) -> DetailLevel {
        self.detail().saturating_sub(SECTION_DETAIL_OFFSET)
    }

    pub fn parent(&self) -> Self {
        Self::new(self.detail() + 1, self.x() >> 1, self.z() >> 1)
    }

    pub fn child(&self, index: ChildIndex) -> Self {
        debug_assert!(index < 4);
        let x = (self.x() << 1) + (index & 1) as i32;
        let z = (self.z() << 1) + ((index >> 1) & 1) as i32;
        Self::new(self.detail() - 1, x, z)
    }

    pub fn children(&self) -> [Self; 4] {
        [self.child(0), self.child(1), self.child(2), self.child(3)]
    }

    pub fn visit_children(&self, mut visitor: impl FnMut(ChildIndex, SectionPos)) {
        for child_i in 0..4 {
            visitor(child_i, self.child(child_i));
        }
    }

    /// True if `other` is this section or one of its descendants.
    pub fn contains(&self, other: SectionPos) -> bool {
        let levels_down = self.detail() as i32 - other.detail() as i32;
        if levels_down < 0 {
            return false;
        }
        (other.x() >> levels_down) == self.x() && (other.z() >> levels_down) == self.z()
    }

    /// True if every block of this section has coordinates that fit in an `i32`. The block geometry below is only
    /// meaningful for such sections.
    pub fn fits_in_blocks(&self) -> bool {
        let d = self.detail();
        if !(0..=MAX_BLOCK_DETAIL).contains(&d) {
            return false;
        }
        let width = 1i64 << d;
        let in_range = |c: i32| {
            let min = (c as i64) << d;
            i32::try_from(min).is_ok() && i32::try_from(min + width - 1).is_ok()
        };
        in_range(self.x()) && in_range(self.z())
    }

    pub fn block_width(&self) -> BlockUnits<i32> {
        BlockUnits(1 << self.detail())
    }

    /// How many whole cells fit along one edge. Zero for sections finer than a cell.
    pub fn cell_width(&self) -> CellUnits<i32> {
        self.block_width().in_cells()
    }

    pub fn min_corner(&self) -> BlockUnits<IVec2> {
        let d = self.detail();
        BlockUnits(IVec2::new(self.x() << d, self.z() << d))
    }

    pub fn center(&self) -> BlockUnits<IVec2> {
        let BlockUnits(half_width) = self.block_width().map(|w| w >> 1);
        self.min_corner().map(|min| min + IVec2::splat(half_width))
    }

    /// The cell containing the minimum corner.
    pub fn min_cell(&self) -> CellUnits<IVec2> {
        self.min_corner()
            .map(|min| min >> IVec2::splat(CELL_DETAIL_LEVEL as i32))
            .into_cells()
    }
}

impl BlockUnits<IVec2> {
    fn into_cells(self) -> CellUnits<IVec2> {
        CellUnits(self.0)
    }
}

#[inline]
fn unpack_coord(bits: u64) -> i32 {
    // Shift the sign bit of the 28-bit field up to bit 31, then arithmetic shift back down to sign-extend.
    let unused = 32 - COORD_BITS;
    (((bits & COORD_MASK) as u32) << unused) as i32 >> unused
}

impl fmt::Debug for SectionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionPos")
            .field("detail", &self.detail())
            .field("x", &self.x())
            .field("z", &self.z())
            .finish()
    }
}

impl fmt::Display for SectionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{},{}", self.detail(), self.x(), self.z())
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
    fn key_preserves_negative_and_extreme_coordinates() {
        for (detail, x, z) in [
            (10, -3, 7),
            (0, MIN_SECTION_COORD, MAX_SECTION_COORD),
            (-2, -1, -1),
        ] {
            let pos = SectionPos::new(detail, x, z);
            let decoded = SectionPos::from_key(pos.key());
            assert_eq!((decoded.detail(), decoded.x(), decoded.z()), (detail, x, z));
        }
    }

    #[test]
    fn children_tile_the_parent() {
        let parent = SectionPos::new(8, -3, 5);
        let children = parent.children();

        let mut covered = 0;
        for child in children {
            assert_eq!(child.detail(), 7);
            assert_eq!(child.parent(), parent);
            assert!(parent.contains(child));
            covered += child.block_width().0 * child.block_width().0;
        }
        assert_eq!(covered, parent.block_width().0 * parent.block_width().0);

        // The children's corners are exactly the four quadrants of the parent.
        let BlockUnits(min) = parent.min_corner();
        let half = parent.block_width().0 / 2;
        let corners: Vec<_> = children.iter().map(|c| c.min_corner().0).collect();
        assert_eq!(
            corners,
            vec![
                min,
                min + IVec2::new(half, 0),
                min + IVec2::new(0, half),
                min + IVec2::new(half, half),
            ]
        );
    }

    #[test]
    fn visit_children_matches_children() {
        let parent = SectionPos::new(3, 1, -1);
        let mut visited = Vec::new();
        parent.visit_children(|i, child| visited.push((i, child)));
        let expected: Vec<_> = parent
            .children()
            .into_iter()
            .enumerate()
            .map(|(i, c)| (i as ChildIndex, c))
            .collect();
        assert_eq!(visited, expected);
    }

    #[test]
    fn contains_follows_ancestry() {
        let root = SectionPos::new(10, 0, 0);
        let grandchild = root.child(3).child(1);
        assert!(root.contains(grandchild));
        assert!(root.contains(root));
        assert!(!grandchild.contains(root));
        assert!(!root.contains(SectionPos::new(9, 2, 0)));
    }

    #[test]
    fn geometry_in_blocks_and_cells() {
        let pos = SectionPos::new(6, -1, 2);
        assert_eq!(pos.block_width(), BlockUnits(64));
        assert_eq!(pos.cell_width(), CellUnits(4));
        assert_eq!(pos.min_corner(), BlockUnits(IVec2::new(-64, 128)));
        assert_eq!(pos.center(), BlockUnits(IVec2::new(-32, 160)));
        assert_eq!(pos.min_cell(), CellUnits(IVec2::new(-4, 8)));
        assert_eq!(pos.data_detail(), 0);
        assert_eq!(
            SectionPos::containing(6, BlockUnits(IVec2::new(-1, 130))),
            pos
        );
    }

    #[test]
    fn block_range_is_checked() {
        assert!(SectionPos::new(0, MIN_SECTION_COORD, MAX_SECTION_COORD).fits_in_blocks());
        assert!(SectionPos::new(MAX_BLOCK_DETAIL, -2, 1).fits_in_blocks());
        assert!(SectionPos::new(4, MAX_SECTION_COORD, 0).fits_in_blocks());
        assert!(SectionPos::new(4, 0, MIN_SECTION_COORD).fits_in_blocks());

        assert!(!SectionPos::new(MAX_BLOCK_DETAIL + 1, 0, 0).fits_in_blocks());
        assert!(!SectionPos::new(40, 0, 0).fits_in_blocks());
        assert!(!SectionPos::new(MAX_BLOCK_DETAIL, 2, 0).fits_in_blocks());
        assert!(!SectionPos::new(MAX_BLOCK_DETAIL, 0, -3).fits_in_blocks());
        assert!(!SectionPos::new(8, MAX_SECTION_COORD, 0).fits_in_blocks());
        assert!(!SectionPos::new(-1, 0, 0).fits_in_blocks());
    }

    #[test]
    fn data_detail_saturates() {
        assert_eq!(SectionPos::new(-120, 0, 0).data_detail(), -126);
        assert_eq!(SectionPos::new(DetailLevel::MIN, 0, 0).data_detail(), DetailLevel::MIN);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(SectionPos::new(7, -2, 9).to_string(), "7*-2,9");
    }
}
