use crate::glam::{IVec2, Vec2, Vec3A};

/// The largest per-axis difference between `a` and `b`, saturating at `i32::MAX`.
#[inline]
pub fn chebyshev_distance(a: IVec2, b: IVec2) -> i32 {
    let dx = (a.x as i64 - b.x as i64).abs();
    let dz = (a.y as i64 - b.y as i64).abs();
    dx.max(dz).min(i32::MAX as i64) as i32
}

/// Projects a 3D direction onto the horizontal (XZ) plane.
///
/// Returns `None` when the direction is (nearly) vertical, since it says nothing about which way is "ahead" on the plane.
pub fn planar_direction(direction: Vec3A) -> Option<Vec2> {
    let planar = Vec2::new(direction.x, direction.z);
    (planar.length_squared() > 1e-6).then(|| planar.normalize())
}

/// Scales distances so that points ahead of an observer look closer than points behind it.
///
/// The multiplier is `1` straight ahead and `behind_penalty` straight behind, interpolated linearly by the dot product of the
/// normalized offset and the facing direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FacingBias {
    direction: Vec2,
    behind_penalty: f32,
}

impl FacingBias {
    pub fn new(facing: Vec3A, behind_penalty: f32) -> Option<Self> {
        planar_direction(facing).map(|direction| Self {
            direction,
            behind_penalty,
        })
    }

    pub fn direction(&self) -> Vec2 {
        self.direction
    }

    pub fn multiplier(&self, offset: Vec2) -> f32 {
        if offset.length_squared() <= 0.0 {
            return 1.0;
        }
        let dot = offset.normalize().dot(self.direction).clamp(-1.0, 1.0);
        1.0 + (self.behind_penalty - 1.0) * (1.0 - dot) * 0.5
    }

    pub fn biased_distance(&self, distance: f32, offset: Vec2) -> f32 {
        distance * self.multiplier(offset)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
