//! texbatch Core
//!
//! Device-space vocabulary shared by the texture batching engine:
//!
//! - **Geometry**: points, sizes and rectangles
//! - **Matrix**: 3x3 transforms, including perspective
//! - **Quad**: a transformed rectangle in tri-strip corner order
//! - **Color**: float colors, packed vertex colors and color-space transforms
//!
//! # Example
//!
//! ```rust
//! use texbatch_core::{Matrix, Quad, Rect};
//!
//! let quad = Quad::from_rect(Rect::new(10.0, 10.0, 20.0, 30.0), &Matrix::translate(5.0, 0.0));
//! assert_eq!(quad.bounds(), Rect::new(15.0, 10.0, 20.0, 30.0));
//! ```

pub mod color;
pub mod geometry;
pub mod matrix;
pub mod quad;

pub use color::{xforms_equal, Color, ColorSpaceXform, PackedColor};
pub use geometry::{Point, Point3, Rect, Size};
pub use matrix::Matrix;
pub use quad::{Quad, QuadAaFlags, NEXT_CCW, NEXT_CW};
