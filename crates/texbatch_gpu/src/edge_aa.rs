//! Analytic edge antialiasing
//!
//! Computes four line equations per quad whose value at a device pixel is the
//! signed distance (in pixels) to that edge, biased so coverage reaches zero
//! half a pixel outside the edge. Edges without AA are pushed out a further
//! pixel so they never limit coverage.
//!
//! When the mesh itself must grow to cover the ramp, [`outset_corners`] (2D)
//! or [`outset_perspective`] (homogeneous) move the corners outward and drag
//! the texture coordinates along by the same fraction of each edge.

use texbatch_core::{QuadAaFlags, NEXT_CCW, NEXT_CW};

/// Distance from the true edge at which AA coverage reaches zero
const AA_OUTSET: f32 = 0.5;

/// Edge equations in edge order (left, bottom, top, right).
///
/// `a[i] * x + b[i] * y + c[i]` is the biased distance to edge `i`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeEquations {
    pub a: [f32; 4],
    pub b: [f32; 4],
    pub c: [f32; 4],
}

impl EdgeEquations {
    /// Equations that evaluate to 1 everywhere (w = 1 positions only)
    pub const INERT: EdgeEquations = EdgeEquations {
        a: [0.0; 4],
        b: [0.0; 4],
        c: [1.0; 4],
    };

    pub fn evaluate(&self, edge: usize, x: f32, y: f32) -> f32 {
        self.a[edge] * x + self.b[edge] * y + self.c[edge]
    }

    /// Minimum over all four edges, clamped to [0, 1]
    pub fn coverage(&self, x: f32, y: f32) -> f32 {
        (0..4)
            .map(|edge| self.evaluate(edge, x, y))
            .fold(f32::INFINITY, f32::min)
            .clamp(0.0, 1.0)
    }

    /// Per-vertex attribute form: one (a, b, c) triple per edge
    pub fn to_attributes(&self) -> [[f32; 3]; 4] {
        [0, 1, 2, 3].map(|i| [self.a[i], self.b[i], self.c[i]])
    }
}

/// Positions (homogeneous) and texture coordinates of one quad's corners
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadVertices {
    pub x: [f32; 4],
    pub y: [f32; 4],
    pub w: [f32; 4],
    pub u: [f32; 4],
    pub v: [f32; 4],
}

/// Normalized edge directions and reciprocal lengths
struct EdgeVectors {
    dx: [f32; 4],
    dy: [f32; 4],
    inv_len: [f32; 4],
}

fn next_cw(v: [f32; 4]) -> [f32; 4] {
    NEXT_CW.map(|i| v[i])
}

fn next_ccw(v: [f32; 4]) -> [f32; 4] {
    NEXT_CCW.map(|i| v[i])
}

fn edge_vectors(x: &[f32; 4], y: &[f32; 4]) -> EdgeVectors {
    let xn = next_ccw(*x);
    let yn = next_ccw(*y);
    let mut dx = [0.0; 4];
    let mut dy = [0.0; 4];
    let mut inv_len = [0.0; 4];
    for i in 0..4 {
        let ex = xn[i] - x[i];
        let ey = yn[i] - y[i];
        inv_len[i] = 1.0 / (ex * ex + ey * ey).sqrt();
        dx[i] = ex * inv_len[i];
        dy[i] = ey * inv_len[i];
    }
    EdgeVectors { dx, dy, inv_len }
}

/// Compute the biased edge equations of a convex quad given in tri-strip
/// order. `x` and `y` are device-space (already divided by w).
pub fn compute_edge_equations(flags: QuadAaFlags, x: &[f32; 4], y: &[f32; 4]) -> EdgeEquations {
    let ev = edge_vectors(x, y);
    let xn = next_ccw(*x);
    let yn = next_ccw(*y);
    let xcw = next_cw(*x);
    let ycw = next_cw(*y);

    let mut c = [0.0; 4];
    for i in 0..4 {
        c[i] = (xn[i] * y[i] - yn[i] * x[i]) * ev.inv_len[i];
    }

    // Normals must face into the quad: check each equation against the corner
    // that is not on its edge.
    let inward = (0..4).all(|i| ev.dy[i] * xcw[i] - ev.dx[i] * ycw[i] + c[i] >= 0.0);
    let (a, b) = if inward {
        (ev.dy, ev.dx.map(|d| -d))
    } else {
        c = c.map(|v| -v);
        (ev.dy.map(|d| -d), ev.dx)
    };

    let mask = flags.edge_mask();
    for i in 0..4 {
        c[i] += AA_OUTSET + (1.0 - mask[i]);
    }
    EdgeEquations { a, b, c }
}

/// Move each 2D corner half a pixel out along both adjoining edges (only for
/// antialiased edges) and move the texture coordinates by the same fraction.
pub fn outset_corners(flags: QuadAaFlags, quad: &mut QuadVertices) {
    let ev = edge_vectors(&quad.x, &quad.y);
    let mask = flags.edge_mask().map(|m| m * AA_OUTSET);
    let mask_cw = next_cw(mask);
    let dx_cw = next_cw(ev.dx);
    let dy_cw = next_cw(ev.dy);
    let inv_len_cw = next_cw(ev.inv_len);

    let du = sub(next_ccw(quad.u), quad.u);
    let dv = sub(next_ccw(quad.v), quad.v);
    let du_cw = next_cw(du);
    let dv_cw = next_cw(dv);

    for i in 0..4 {
        quad.x[i] += mask_cw[i] * -ev.dx[i] + mask[i] * dx_cw[i];
        quad.y[i] += mask_cw[i] * -ev.dy[i] + mask[i] * dy_cw[i];

        let t_back = mask_cw[i] * ev.inv_len[i];
        let t_fwd = mask[i] * inv_len_cw[i];
        quad.u[i] += t_back * -du[i] + t_fwd * du_cw[i];
        quad.v[i] += t_back * -dv[i] + t_fwd * dv_cw[i];
    }
}

/// Homogeneous corner outset. Left/right edges are resolved first, then
/// top/bottom against the refreshed device-space corners.
pub fn outset_perspective(flags: QuadAaFlags, quad: &mut QuadVertices) {
    let horizontal = flags.intersects(QuadAaFlags::LEFT | QuadAaFlags::RIGHT);
    let vertical = flags.intersects(QuadAaFlags::TOP | QuadAaFlags::BOTTOM);

    if horizontal {
        let (x2d, y2d) = project(quad);
        // Lengths of the top (0 -> 2) and bottom (1 -> 3) edges.
        let len = [
            length(x2d[2] - x2d[0], y2d[2] - y2d[0]),
            length(x2d[3] - x2d[1], y2d[3] - y2d[1]),
        ];
        let s = [len[0], len[1], len[0], len[1]].map(|l| (l + AA_OUTSET) / l);
        let left = flags.contains(QuadAaFlags::LEFT);
        let right = flags.contains(QuadAaFlags::RIGHT);
        blend_from_opposite(quad, [2, 3, 0, 1], s, [left, left, right, right]);
    }

    if vertical {
        let (x2d, y2d) = project(quad);
        // Lengths of the left (0 -> 1) and right (2 -> 3) edges.
        let len = [
            length(x2d[1] - x2d[0], y2d[1] - y2d[0]),
            length(x2d[3] - x2d[2], y2d[3] - y2d[2]),
        ];
        let s = [len[0], len[0], len[1], len[1]].map(|l| (l + AA_OUTSET) / l);
        let top = flags.contains(QuadAaFlags::TOP);
        let bottom = flags.contains(QuadAaFlags::BOTTOM);
        blend_from_opposite(quad, [1, 0, 3, 2], s, [top, bottom, top, bottom]);
    }
}

/// Push each enabled corner away from its opposite corner so that, after the
/// perspective divide, the device-space distance grows by the factor `s`.
fn blend_from_opposite(quad: &mut QuadVertices, opposite: [usize; 4], s: [f32; 4], enabled: [bool; 4]) {
    let src = *quad;
    for i in 0..4 {
        if !enabled[i] {
            continue;
        }
        let o = opposite[i];
        // Similar triangles: the homogeneous blend t that lands on the
        // device-space point op + s * (p - op).
        let s_op_w = s[i] * src.w[o];
        let t = s_op_w / (s_op_w + (1.0 - s[i]) * src.w[i]);
        quad.x[i] = src.x[o] + t * (src.x[i] - src.x[o]);
        quad.y[i] = src.y[o] + t * (src.y[i] - src.y[o]);
        quad.w[i] = src.w[o] + t * (src.w[i] - src.w[o]);
        quad.u[i] = src.u[o] + t * (src.u[i] - src.u[o]);
        quad.v[i] = src.v[o] + t * (src.v[i] - src.v[o]);
    }
}

fn project(quad: &QuadVertices) -> ([f32; 4], [f32; 4]) {
    let mut x = [0.0; 4];
    let mut y = [0.0; 4];
    for i in 0..4 {
        let iw = 1.0 / quad.w[i];
        x[i] = quad.x[i] * iw;
        y[i] = quad.y[i] * iw;
    }
    (x, y)
}

fn length(dx: f32, dy: f32) -> f32 {
    (dx * dx + dy * dy).sqrt()
}

fn sub(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3] - b[3]]
}
