use serde::{Deserialize, Serialize};

use crate::{Real, Vec2};

/// Brown-Conrady distortion with radial `k1, k2, k3` and tangential `p1, p2` terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
    pub p1: Real,
    pub p2: Real,
}

impl BrownConrady5 {
    /// Fixed-point iterations used by [`BrownConrady5::undistort`].
    pub const UNDISTORT_ITERS: usize = 8;

    pub fn distort(&self, n: &Vec2) -> Vec2 {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        Vec2::new(x * radial + x_tan, y * radial + y_tan)
    }

    pub fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        let mut n = *n_dist;
        for _ in 0..Self::UNDISTORT_ITERS {
            let d = self.distort(&n);
            n -= d - n_dist;
        }
        n
    }
}
