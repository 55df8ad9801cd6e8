//! Colors and color-space transforms

use std::sync::Arc;

/// RGBA color (linear space, unpremultiplied)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.a = alpha;
        self
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Premultiply and quantize to 8 bits per channel
    pub fn to_premul_packed(&self) -> PackedColor {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        let a = self.a.clamp(0.0, 1.0);
        PackedColor::from_rgba8(q(self.r * a), q(self.g * a), q(self.b * a), q(a))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Premultiplied 8-bit RGBA, red in the low byte
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PackedColor(pub u32);

impl PackedColor {
    pub const WHITE: PackedColor = PackedColor(0xFFFF_FFFF);
    pub const TRANSPARENT: PackedColor = PackedColor(0);

    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self((r as u32) | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24)
    }

    /// Bytes in memory order (r, g, b, a), matching a `Unorm8x4` attribute
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<Color> for PackedColor {
    fn from(color: Color) -> Self {
        color.to_premul_packed()
    }
}

/// Opaque color-space conversion applied by the shading stage.
///
/// Only the gamut matrix is evaluated on the CPU; transfer-function steps are
/// carried as `flags` and compared by value.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorSpaceXform {
    /// Row-major 3x3 gamut matrix
    pub gamut: [f32; 9],
    /// Enabled conversion steps (unpremul, linearize, gamut, encode, premul)
    pub flags: u32,
}

impl ColorSpaceXform {
    pub const STEP_UNPREMUL: u32 = 1 << 0;
    pub const STEP_LINEARIZE: u32 = 1 << 1;
    pub const STEP_GAMUT: u32 = 1 << 2;
    pub const STEP_ENCODE: u32 = 1 << 3;
    pub const STEP_PREMUL: u32 = 1 << 4;

    pub fn new(gamut: [f32; 9], flags: u32) -> Self {
        Self { gamut, flags }
    }

    /// Gamut-only transform
    pub fn gamut(gamut: [f32; 9]) -> Self {
        Self::new(gamut, Self::STEP_GAMUT)
    }

    /// Apply the gamut step to an RGB triple; alpha passes through
    pub fn apply(&self, color: Color) -> Color {
        if self.flags & Self::STEP_GAMUT == 0 {
            return color;
        }
        let m = &self.gamut;
        Color::rgba(
            m[0] * color.r + m[1] * color.g + m[2] * color.b,
            m[3] * color.r + m[4] * color.g + m[5] * color.b,
            m[6] * color.r + m[7] * color.g + m[8] * color.b,
            color.a,
        )
    }

    /// Shader key bits for an optional transform; 0 means no transform
    pub fn key(xform: Option<&ColorSpaceXform>) -> u32 {
        match xform {
            None => 0,
            Some(x) => (x.flags << 1) | 1,
        }
    }
}

/// Value equality for optional shared transforms. Two missing transforms are
/// equal; a missing and a present one are not.
pub fn xforms_equal(a: Option<&Arc<ColorSpaceXform>>, b: Option<&Arc<ColorSpaceXform>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b) || **a == **b,
        _ => false,
    }
}
