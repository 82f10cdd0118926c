macro_rules! def_units {
    ($t: ident, $unit: literal) => {
        #[doc = concat!("Denotes that the inner `T` is given in units of ", $unit, ".")]
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
        pub struct $t<T>(pub T);

        impl<T> $t<T> {
            pub fn into_inner(self) -> T {
                self.0
            }

            pub fn map<S>(self, mut f: impl FnMut(T) -> S) -> $t<S> {
                $t(f(self.0))
            }

            pub fn combine<S, R>(u1: Self, u2: $t<S>, mut f: impl FnMut(T, S) -> R) -> $t<R> {
                $t(f(u1.into_inner(), u2.into_inner()))
            }
        }
    };
}

def_units!(BlockUnits, "blocks");
def_units!(CellUnits, "cells");

/// A cell is `2^CELL_DETAIL_LEVEL` blocks wide.
pub const CELL_DETAIL_LEVEL: i8 = 4;

impl BlockUnits<i32> {
    /// Whole cells covered by this distance, rounding toward negative infinity.
    pub fn in_cells(self) -> CellUnits<i32> {
        CellUnits(self.0 >> CELL_DETAIL_LEVEL)
    }
}
