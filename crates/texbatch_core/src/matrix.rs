//! 3x3 transformation matrix

use crate::geometry::{Point, Point3};

/// 2D projective transformation (row-major)
///
/// ```text
/// | sx  kx  tx |
/// | ky  sy  ty |
/// | p0  p1  p2 |
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix {
    /// Matrix elements [sx, kx, tx, ky, sy, ty, p0, p1, p2]
    pub elements: [f32; 9],
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        elements: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    };

    pub const fn from_row_major(elements: [f32; 9]) -> Self {
        Self { elements }
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            elements: [1.0, 0.0, x, 0.0, 1.0, y, 0.0, 0.0, 1.0],
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            elements: [sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Rotation by `angle` radians about the origin
    pub fn rotate(angle: f32) -> Self {
        let c = angle.cos();
        let s = angle.sin();
        Self {
            elements: [c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Identity with the given perspective row
    pub fn perspective(p0: f32, p1: f32, p2: f32) -> Self {
        Self {
            elements: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, p0, p1, p2],
        }
    }

    /// Concatenate (self * other): the result applies `other` first, then `self`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        let a = &self.elements;
        let b = &other.elements;
        let mut out = [0.0f32; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = a[row * 3] * b[col]
                    + a[row * 3 + 1] * b[3 + col]
                    + a[row * 3 + 2] * b[6 + col];
            }
        }
        Matrix { elements: out }
    }

    pub fn has_perspective(&self) -> bool {
        let [_, _, _, _, _, _, p0, p1, p2] = self.elements;
        p0 != 0.0 || p1 != 0.0 || p2 != 1.0
    }

    /// True when every axis-aligned rect maps to an axis-aligned rect
    /// (scale, translate and 90 degree rotations only).
    pub fn rect_stays_rect(&self) -> bool {
        if self.has_perspective() {
            return false;
        }
        let [sx, kx, _, ky, sy, _, _, _, _] = self.elements;
        if kx == 0.0 && ky == 0.0 {
            sx != 0.0 && sy != 0.0
        } else {
            sx == 0.0 && sy == 0.0 && kx != 0.0 && ky != 0.0
        }
    }

    /// Map a point without dividing by w
    pub fn map_point3(&self, point: Point) -> Point3 {
        let [sx, kx, tx, ky, sy, ty, p0, p1, p2] = self.elements;
        Point3::new(
            sx * point.x + kx * point.y + tx,
            ky * point.x + sy * point.y + ty,
            p0 * point.x + p1 * point.y + p2,
        )
    }

    pub fn map_point(&self, point: Point) -> Point {
        self.map_point3(point).project()
    }
}
