//! Texture domain clamping
//!
//! A domain is the normalized texture rect that fragment sampling is clamped
//! into, so bilinear taps never read texels outside the source rect.

use texbatch_core::Rect;

use crate::texture::{Filter, SurfaceOrigin};

/// Domain for draws that need no clamp: far outside [0, 1] on every side.
pub const NO_DOMAIN: [f32; 4] = [-2.0, -2.0, 2.0, 2.0];

/// Normalized clamp rect `[left, top, right, bottom]` for a source rect given
/// in texels.
pub fn compute_domain(
    has_domain: bool,
    filter: Filter,
    src_rect: &Rect,
    origin: SurfaceOrigin,
    texture_size: (u32, u32),
) -> [f32; 4] {
    if !has_domain {
        return NO_DOMAIN;
    }
    let mut ltrb = src_rect.to_ltrb();
    if filter == Filter::Bilinear {
        // Keep bilinear taps half a texel inside. A rect thinner than one
        // texel snaps to its center on that axis instead of inverting.
        let center = src_rect.center();
        if src_rect.width().abs() < 1.0 {
            ltrb[0] = center.x;
            ltrb[2] = center.x;
        } else {
            ltrb[0] += 0.5;
            ltrb[2] -= 0.5;
        }
        if src_rect.height().abs() < 1.0 {
            ltrb[1] = center.y;
            ltrb[3] = center.y;
        } else {
            ltrb[1] += 0.5;
            ltrb[3] -= 0.5;
        }
    }
    let iw = 1.0 / texture_size.0 as f32;
    let ih = 1.0 / texture_size.1 as f32;
    let [l, t, r, b] = [ltrb[0] * iw, ltrb[1] * ih, ltrb[2] * iw, ltrb[3] * ih];
    match origin {
        SurfaceOrigin::TopLeft => [l, t, r, b],
        SurfaceOrigin::BottomLeft => [l, 1.0 - b, r, 1.0 - t],
    }
}

/// Normalized texture coordinates of the source rect, flipped for
/// bottom-left storage.
pub fn normalized_tex_rect(src_rect: &Rect, origin: SurfaceOrigin, texture_size: (u32, u32)) -> [f32; 4] {
    let iw = 1.0 / texture_size.0 as f32;
    let ih = 1.0 / texture_size.1 as f32;
    let [l, t, r, b] = src_rect.to_ltrb();
    match origin {
        SurfaceOrigin::TopLeft => [l * iw, t * ih, r * iw, b * ih],
        SurfaceOrigin::BottomLeft => [l * iw, 1.0 - t * ih, r * iw, 1.0 - b * ih],
    }
}
