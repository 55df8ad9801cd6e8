//! Device-space quads
//!
//! A [`Quad`] is a rectangle after transformation. Corners are stored in
//! tri-strip order:
//!
//! ```text
//! 0 (top-left)     2 (top-right)
//!     ┌───────────────┐
//!     │               │
//!     └───────────────┘
//! 1 (bottom-left)  3 (bottom-right)
//! ```
//!
//! Edge `i` runs from corner `i` to corner `NEXT_CCW[i]`, which makes the
//! edges left, bottom, top, right in that order.

use std::ops::{BitOr, BitOrAssign};

use crate::geometry::{Point, Point3, Rect};
use crate::matrix::Matrix;

/// Counter-clockwise successor of each corner (the far end of edge `i`)
pub const NEXT_CCW: [usize; 4] = [1, 3, 0, 2];

/// Clockwise successor of each corner
pub const NEXT_CW: [usize; 4] = [2, 0, 3, 1];

/// Per-edge antialiasing flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QuadAaFlags(u8);

impl QuadAaFlags {
    pub const NONE: QuadAaFlags = QuadAaFlags(0);
    pub const LEFT: QuadAaFlags = QuadAaFlags(0b0001);
    pub const TOP: QuadAaFlags = QuadAaFlags(0b0010);
    pub const RIGHT: QuadAaFlags = QuadAaFlags(0b0100);
    pub const BOTTOM: QuadAaFlags = QuadAaFlags(0b1000);
    pub const ALL: QuadAaFlags = QuadAaFlags(0b1111);

    /// Build from the low four bits of `bits`
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0b1111)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_all(self) -> bool {
        self.0 == Self::ALL.0
    }

    /// True when any flag in `other` is also set here
    pub const fn intersects(self, other: QuadAaFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: QuadAaFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// 1.0 for antialiased edges, 0.0 otherwise, in edge order
    /// (left, bottom, top, right).
    pub fn edge_mask(self) -> [f32; 4] {
        let bit = |flag: QuadAaFlags| if self.contains(flag) { 1.0 } else { 0.0 };
        [
            bit(Self::LEFT),
            bit(Self::BOTTOM),
            bit(Self::TOP),
            bit(Self::RIGHT),
        ]
    }

    /// Iterate all sixteen flag combinations
    pub fn all_combinations() -> impl Iterator<Item = QuadAaFlags> {
        (0u8..16).map(QuadAaFlags)
    }
}

impl BitOr for QuadAaFlags {
    type Output = QuadAaFlags;

    fn bitor(self, rhs: QuadAaFlags) -> QuadAaFlags {
        QuadAaFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for QuadAaFlags {
    fn bitor_assign(&mut self, rhs: QuadAaFlags) {
        self.0 |= rhs.0;
    }
}

/// A transformed rectangle with optionally homogeneous corners
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    xs: [f32; 4],
    ys: [f32; 4],
    ws: [f32; 4],
}

impl Quad {
    /// Corners given directly in tri-strip order, with w = 1
    pub fn from_points(points: [Point; 4]) -> Self {
        Self {
            xs: points.map(|p| p.x),
            ys: points.map(|p| p.y),
            ws: [1.0; 4],
        }
    }

    /// Homogeneous corners in tri-strip order
    pub fn from_points3(points: [Point3; 4]) -> Self {
        Self {
            xs: points.map(|p| p.x),
            ys: points.map(|p| p.y),
            ws: points.map(|p| p.w),
        }
    }

    /// Map `rect` through `matrix`. Perspective matrices keep w undivided.
    pub fn from_rect(rect: Rect, matrix: &Matrix) -> Self {
        let corners = [
            Point::new(rect.left(), rect.top()),
            Point::new(rect.left(), rect.bottom()),
            Point::new(rect.right(), rect.top()),
            Point::new(rect.right(), rect.bottom()),
        ];
        if matrix.has_perspective() {
            Self::from_points3(corners.map(|p| matrix.map_point3(p)))
        } else {
            Self::from_points(corners.map(|p| {
                let q = matrix.map_point3(p);
                Point::new(q.x, q.y)
            }))
        }
    }

    pub fn x(&self, i: usize) -> f32 {
        self.xs[i]
    }

    pub fn y(&self, i: usize) -> f32 {
        self.ys[i]
    }

    pub fn w(&self, i: usize) -> f32 {
        self.ws[i]
    }

    pub fn xs(&self) -> [f32; 4] {
        self.xs
    }

    pub fn ys(&self) -> [f32; 4] {
        self.ys
    }

    pub fn ws(&self) -> [f32; 4] {
        self.ws
    }

    /// Reciprocal w per corner
    pub fn iws(&self) -> [f32; 4] {
        self.ws.map(|w| 1.0 / w)
    }

    pub fn point(&self, i: usize) -> Point3 {
        Point3::new(self.xs[i], self.ys[i], self.ws[i])
    }

    /// True when every corner has w == 1
    pub fn is_2d(&self) -> bool {
        self.ws.iter().all(|&w| w == 1.0)
    }

    /// Axis-aligned box around the perspective-divided corners
    pub fn bounds(&self) -> Rect {
        let (xs, ys) = if self.is_2d() {
            (self.xs, self.ys)
        } else {
            let iws = self.iws();
            (
                [0, 1, 2, 3].map(|i| self.xs[i] * iws[i]),
                [0, 1, 2, 3].map(|i| self.ys[i] * iws[i]),
            )
        };
        let min = |v: [f32; 4]| v.iter().copied().fold(f32::INFINITY, f32::min);
        let max = |v: [f32; 4]| v.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Rect::from_ltrb(min(xs), min(ys), max(xs), max(ys))
    }
}
