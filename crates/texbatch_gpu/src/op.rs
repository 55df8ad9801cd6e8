//! Textured quad draw op
//!
//! A [`TextureDrawOp`] owns an ordered list of [`DrawEntry`]s partitioned into
//! [`ProxyGroup`]s (runs of consecutive entries sampling the same texture).
//! Ops recorded back to back may merge into one op, or chain so a single
//! submission draws several textures through per-mesh bindings.
//!
//! # Lifecycle
//!
//! ```text
//! Open ──finalize()──▶ Finalized ──flush──▶ Consumed
//! ```
//!
//! While open the op holds a plain ref on every texture it samples. At
//! `finalize` each plain ref becomes a pending read. Dropping the op releases
//! whichever kind of reference it holds at that point.

use std::fmt::Write as _;
use std::sync::Arc;

use smallvec::SmallVec;
use texbatch_core::{xforms_equal, ColorSpaceXform, Matrix, PackedColor, Quad, QuadAaFlags, Rect};

use crate::config::Caps;
use crate::error::{FlushError, Result};
use crate::target::{DrawSubmission, FlushStats, FlushTarget, Mesh, PipelineDesc, TextureBindings};
use crate::tessellate::{BatchRequirements, GeometryDescription, TessellationParams, VariantDispatcher};
use crate::texture::{Filter, ProxyRef, TextureProxy};

/// Antialiasing mode of an op
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AaType {
    #[default]
    None,
    /// Analytic per-edge coverage ramps
    Coverage,
    /// Hardware multisampling; every edge counts as antialiased
    Msaa,
}

/// How strictly sampling must stay inside the source rect
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SrcRectConstraint {
    /// Filtering may read texels just outside the source rect
    #[default]
    Fast,
    /// Sampling is clamped to the source rect
    Strict,
}

/// Outcome of [`TextureDrawOp::combine`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombineResult {
    /// The other op's entries were moved into this op
    Merged,
    /// The ops can share a submission with per-mesh texture bindings
    MayChain,
    CannotCombine,
}

/// Resource ownership state of an op
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpState {
    /// Holding plain texture refs; accepts merges
    Open,
    /// Holding pending reads; queued for flush
    Finalized,
    /// Flushed
    Consumed,
}

/// One textured quad
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawEntry {
    src_rect: Rect,
    quad: Quad,
    aa_flags: QuadAaFlags,
    color: PackedColor,
    has_domain: bool,
}

impl DrawEntry {
    pub fn new(src_rect: Rect, quad: Quad, aa_flags: QuadAaFlags, color: PackedColor, has_domain: bool) -> Self {
        Self {
            src_rect,
            quad,
            aa_flags,
            color,
            has_domain,
        }
    }

    /// Source rect in texels
    pub fn src_rect(&self) -> &Rect {
        &self.src_rect
    }

    /// Device-space quad
    pub fn quad(&self) -> &Quad {
        &self.quad
    }

    pub fn aa_flags(&self) -> QuadAaFlags {
        self.aa_flags
    }

    pub fn color(&self) -> PackedColor {
        self.color
    }

    pub fn has_domain(&self) -> bool {
        self.has_domain
    }
}

/// A run of consecutive entries sampling one texture
#[derive(Clone, Debug)]
pub struct ProxyGroup {
    pub proxy: ProxyRef,
    pub quad_count: usize,
}

/// One element of a batched draw
#[derive(Clone, Debug)]
pub struct TextureSetEntry {
    pub proxy: ProxyRef,
    pub src_rect: Rect,
    pub dst_rect: Rect,
    pub aa_flags: QuadAaFlags,
}

/// Paint state shared by every quad of a new op
#[derive(Clone, Debug, Default)]
pub struct DrawParams {
    pub filter: Filter,
    pub color: PackedColor,
    pub aa_type: AaType,
    pub view_matrix: Matrix,
    pub texture_xform: Option<Arc<ColorSpaceXform>>,
    pub paint_xform: Option<Arc<ColorSpaceXform>>,
}

impl DrawParams {
    pub fn new() -> Self {
        Self {
            color: PackedColor::WHITE,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_color(mut self, color: PackedColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_aa(mut self, aa_type: AaType) -> Self {
        self.aa_type = aa_type;
        self
    }

    pub fn with_view_matrix(mut self, matrix: Matrix) -> Self {
        self.view_matrix = matrix;
        self
    }

    pub fn with_texture_xform(mut self, xform: Arc<ColorSpaceXform>) -> Self {
        self.texture_xform = Some(xform);
        self
    }

    pub fn with_paint_xform(mut self, xform: Arc<ColorSpaceXform>) -> Self {
        self.paint_xform = Some(xform);
        self
    }
}

fn is_integral(v: f32) -> bool {
    v == v.trunc()
}

/// Coverage AA changes nothing for an axis-aligned quad on pixel boundaries
fn aa_has_effect_for_rect_stays_rect(quad: &Quad) -> bool {
    debug_assert!(quad.is_2d());
    !(is_integral(quad.x(0)) && is_integral(quad.y(0)) && is_integral(quad.x(3)) && is_integral(quad.y(3)))
}

/// Filtering changes nothing for an unscaled copy that lines up with the
/// source's texel grid
fn filter_has_effect_for_rect_stays_rect(quad: &Quad, src_rect: &Rect) -> bool {
    debug_assert!(quad.is_2d());
    debug_assert!(src_rect.is_sorted());
    let (ql, qt, qr, qb) = (quad.x(0), quad.y(0), quad.x(3), quad.y(3));
    (qr - ql) != src_rect.width()
        || (qb - qt) != src_rect.height()
        || ql.fract() != src_rect.left().fract()
        || qt.fract() != src_rect.top().fract()
}

/// Batched textured quad draw
#[derive(Debug)]
pub struct TextureDrawOp {
    entries: Vec<DrawEntry>,
    groups: SmallVec<[ProxyGroup; 1]>,
    texture_xform: Option<Arc<ColorSpaceXform>>,
    paint_xform: Option<Arc<ColorSpaceXform>>,
    filter: Filter,
    aa_type: AaType,
    perspective: bool,
    domain: bool,
    bounds: Rect,
    chained: bool,
    state: OpState,
}

impl TextureDrawOp {
    /// Draw `src_rect` of one texture into `dst_rect` mapped by the view matrix
    pub fn single(
        proxy: ProxyRef,
        src_rect: Rect,
        dst_rect: Rect,
        aa_flags: QuadAaFlags,
        constraint: SrcRectConstraint,
        params: &DrawParams,
    ) -> Self {
        debug_assert!(!src_rect.is_empty(), "empty source rect");
        debug_assert!(!dst_rect.is_empty(), "empty destination rect");

        let mut aa_type = params.aa_type;
        let mut aa_flags = aa_flags;
        let mut filter = params.filter;
        match aa_type {
            AaType::None => aa_flags = QuadAaFlags::NONE,
            AaType::Coverage if aa_flags.is_empty() => aa_type = AaType::None,
            AaType::Coverage => {}
            AaType::Msaa => aa_flags = QuadAaFlags::ALL,
        }

        let quad = Quad::from_rect(dst_rect, &params.view_matrix);
        if params.view_matrix.rect_stays_rect() {
            if aa_type == AaType::Coverage && !aa_has_effect_for_rect_stays_rect(&quad) {
                aa_type = AaType::None;
                aa_flags = QuadAaFlags::NONE;
            }
            if filter != Filter::Nearest && !filter_has_effect_for_rect_stays_rect(&quad, &src_rect) {
                filter = Filter::Nearest;
            }
        }
        // A strict constraint only matters once filtering or AA bloat can
        // reach past the source rect.
        let mut constraint = constraint;
        if constraint == SrcRectConstraint::Strict && filter == Filter::Nearest && aa_type != AaType::Coverage {
            constraint = SrcRectConstraint::Fast;
        }

        proxy.add_ref();
        let has_domain = constraint == SrcRectConstraint::Strict;
        let bounds = quad.bounds();
        let mut groups = SmallVec::new();
        groups.push(ProxyGroup { proxy, quad_count: 1 });

        Self {
            entries: vec![DrawEntry::new(src_rect, quad, aa_flags, params.color, has_domain)],
            groups,
            texture_xform: params.texture_xform.clone(),
            paint_xform: params.paint_xform.clone(),
            filter,
            aa_type,
            perspective: params.view_matrix.has_perspective(),
            domain: has_domain,
            bounds,
            chained: false,
            state: OpState::Open,
        }
    }

    /// Draw a list of texture rects sharing one paint. Consecutive entries
    /// over the same texture share a proxy group.
    pub fn batch(set: &[TextureSetEntry], params: &DrawParams) -> Self {
        debug_assert!(!set.is_empty(), "empty texture set");

        let rect_stays_rect = params.view_matrix.rect_stays_rect();
        let mut entries = Vec::with_capacity(set.len());
        let mut groups: SmallVec<[ProxyGroup; 1]> = SmallVec::new();
        let mut bounds = Rect::ZERO;
        let mut need_aa = false;
        let mut must_filter = false;

        for item in set {
            debug_assert!(
                item.proxy.format() == set[0].proxy.format()
                    && item.proxy.texture_type() == set[0].proxy.texture_type(),
                "mixed texture formats in one batch"
            );
            let quad = Quad::from_rect(item.dst_rect, &params.view_matrix);
            bounds = bounds.join(&quad.bounds());

            let aa_flags = match params.aa_type {
                AaType::None => QuadAaFlags::NONE,
                AaType::Coverage
                    if rect_stays_rect && !item.aa_flags.is_empty() && !aa_has_effect_for_rect_stays_rect(&quad) =>
                {
                    QuadAaFlags::NONE
                }
                AaType::Coverage => item.aa_flags,
                AaType::Msaa => QuadAaFlags::ALL,
            };
            need_aa |= !item.aa_flags.is_empty();
            if !must_filter && params.filter != Filter::Nearest {
                must_filter = !rect_stays_rect || filter_has_effect_for_rect_stays_rect(&quad, &item.src_rect);
            }
            entries.push(DrawEntry::new(item.src_rect, quad, aa_flags, params.color, false));

            match groups.last_mut() {
                Some(group) if group.proxy.unique_id() == item.proxy.unique_id() => group.quad_count += 1,
                _ => {
                    item.proxy.add_ref();
                    groups.push(ProxyGroup {
                        proxy: item.proxy.clone(),
                        quad_count: 1,
                    });
                }
            }
        }

        let aa_type = if need_aa { params.aa_type } else { AaType::None };
        if aa_type == AaType::None {
            // MSAA entries were widened to every edge above.
            for entry in &mut entries {
                entry.aa_flags = QuadAaFlags::NONE;
            }
        }

        Self {
            entries,
            groups,
            texture_xform: params.texture_xform.clone(),
            paint_xform: params.paint_xform.clone(),
            filter: if must_filter { params.filter } else { Filter::Nearest },
            aa_type,
            perspective: params.view_matrix.has_perspective(),
            domain: false,
            bounds,
            chained: false,
            state: OpState::Open,
        }
    }

    pub fn entries(&self) -> &[DrawEntry] {
        &self.entries
    }

    pub fn groups(&self) -> &[ProxyGroup] {
        &self.groups
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn aa_type(&self) -> AaType {
        self.aa_type
    }

    pub fn has_perspective(&self) -> bool {
        self.perspective
    }

    /// True when any entry clamps sampling to its source rect
    pub fn has_domain(&self) -> bool {
        self.domain
    }

    pub fn texture_xform(&self) -> Option<&Arc<ColorSpaceXform>> {
        self.texture_xform.as_ref()
    }

    pub fn paint_xform(&self) -> Option<&Arc<ColorSpaceXform>> {
        self.paint_xform.as_ref()
    }

    pub fn state(&self) -> OpState {
        self.state
    }

    pub fn is_chained(&self) -> bool {
        self.chained
    }

    pub(crate) fn set_chained(&mut self) {
        self.chained = true;
    }

    /// Device bounds of the quads
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Device bounds grown by the coverage AA ramp
    pub fn bloated_bounds(&self) -> Rect {
        if self.aa_type == AaType::Coverage {
            self.bounds.outset(0.5, 0.5)
        } else {
            self.bounds
        }
    }

    /// The pipeline must enable multisampling
    pub fn uses_hw_aa(&self) -> bool {
        self.aa_type == AaType::Msaa
    }

    /// Call `f` with every referenced texture
    pub fn visit_proxies(&self, mut f: impl FnMut(&ProxyRef)) {
        for group in &self.groups {
            f(&group.proxy);
        }
    }

    /// Try to fold `that` (recorded after `self`) into this op.
    ///
    /// On [`CombineResult::Merged`] the entries of `that` have moved here and
    /// `that` should be dropped.
    pub fn combine(&mut self, that: &mut TextureDrawOp, caps: &Caps) -> CombineResult {
        debug_assert!(self.state == OpState::Open && that.state == OpState::Open);

        if !xforms_equal(self.texture_xform.as_ref(), that.texture_xform.as_ref()) {
            tracing::trace!("cannot combine: texture color-space transforms differ");
            return CombineResult::CannotCombine;
        }
        if !xforms_equal(self.paint_xform.as_ref(), that.paint_xform.as_ref()) {
            tracing::trace!("cannot combine: paint color-space transforms differ");
            return CombineResult::CannotCombine;
        }
        let upgrade_to_coverage = match (self.aa_type, that.aa_type) {
            (a, b) if a == b => false,
            (AaType::Coverage, AaType::None) | (AaType::None, AaType::Coverage) => true,
            (a, b) => {
                tracing::trace!("cannot combine: aa {:?} vs {:?}", a, b);
                return CombineResult::CannotCombine;
            }
        };
        if self.filter != that.filter {
            tracing::trace!("cannot combine: filter {:?} vs {:?}", self.filter, that.filter);
            return CombineResult::CannotCombine;
        }
        if self.groups.len() > 1 || that.groups.len() > 1 || that.chained {
            tracing::trace!("cannot combine: multi-texture or already chained op");
            return CombineResult::CannotCombine;
        }

        let this_proxy = &self.groups[0].proxy;
        let that_proxy = &that.groups[0].proxy;
        let proxy_id = this_proxy.unique_id();
        if proxy_id != that_proxy.unique_id() {
            if this_proxy.format() == that_proxy.format()
                && this_proxy.texture_type() == that_proxy.texture_type()
                && caps.dynamic_texture_binding
            {
                return CombineResult::MayChain;
            }
            return CombineResult::CannotCombine;
        }

        let moved = that.entries.len();
        self.groups[0].quad_count += moved;
        that.groups[0].quad_count = 0;
        self.entries.append(&mut that.entries);
        self.bounds = self.bounds.join(&that.bounds);
        self.perspective |= that.perspective;
        self.domain |= that.domain;
        if upgrade_to_coverage {
            self.aa_type = AaType::Coverage;
        }
        tracing::trace!("merged {} quads into op over proxy {}", moved, proxy_id);
        CombineResult::Merged
    }

    /// Trade every plain texture ref for a pending read. Must run exactly once.
    pub fn finalize(&mut self) {
        debug_assert!(self.state == OpState::Open, "draw op finalized twice");
        if self.state != OpState::Open {
            return;
        }
        self.state = OpState::Finalized;
        for group in &self.groups {
            group.proxy.add_pending_read();
            group.proxy.unref();
        }
    }

    pub(crate) fn mark_consumed(&mut self) {
        debug_assert!(self.state == OpState::Finalized);
        self.state = OpState::Consumed;
    }

    /// Tessellate a chain of ops (head first) into one submission.
    ///
    /// Resource failures skip the whole chain and are counted in
    /// [`FlushStats::skipped_batches`].
    pub fn prepare_chain(chain: &[&TextureDrawOp], target: &mut dyn FlushTarget, max_quads_per_draw: u32) -> FlushStats {
        match Self::try_prepare_chain(chain, target, max_quads_per_draw) {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!("skipping texture draw batch of {} ops: {}", chain.len(), err);
                FlushStats {
                    skipped_batches: 1,
                    ..Default::default()
                }
            }
        }
    }

    fn try_prepare_chain(
        chain: &[&TextureDrawOp],
        target: &mut dyn FlushTarget,
        max_quads_per_draw: u32,
    ) -> Result<FlushStats> {
        let Some(head) = chain.first() else {
            return Ok(FlushStats::default());
        };
        let head_proxy = &head.groups[0].proxy;
        let texture_type = head_proxy.texture_type();
        let format = head_proxy.format();

        let mut requirements = BatchRequirements::default();
        let mut aa_type = head.aa_type;
        let mut proxy_count = 0;
        let mut quad_count = 0;
        let mut needs_indices = false;
        for op in chain {
            debug_assert!(op.state == OpState::Finalized, "preparing an op that was not finalized");
            requirements.perspective |= op.perspective;
            requirements.domain |= op.domain;
            proxy_count += op.groups.len();
            for group in &op.groups {
                quad_count += group.quad_count;
                needs_indices |= group.quad_count > 1;
                if !group.proxy.instantiate() {
                    return Err(FlushError::InstantiateFailed(group.proxy.unique_id()));
                }
                debug_assert_eq!(group.proxy.format(), format);
                debug_assert_eq!(group.proxy.texture_type(), texture_type);
            }
            if op.aa_type == AaType::Coverage {
                debug_assert!(matches!(aa_type, AaType::Coverage | AaType::None));
                aa_type = AaType::Coverage;
            }
        }
        requirements.coverage_aa = aa_type == AaType::Coverage;

        let dispatcher = VariantDispatcher::resolve(requirements);
        let geometry = GeometryDescription {
            layout: dispatcher.layout(),
            texture_type,
            format,
            filter: head.filter,
            texture_xform: head.texture_xform.clone(),
            paint_xform: head.paint_xform.clone(),
        };
        let pipeline = PipelineDesc {
            hw_antialias: aa_type == AaType::Msaa,
        };

        let max_quads = if needs_indices {
            target.quad_index_buffer()?.max_quads.min(max_quads_per_draw)
        } else {
            max_quads_per_draw
        };
        let stride = dispatcher.stride();
        let allocation = target.allocate_vertices(stride, quad_count * 4)?;

        let mut meshes = Vec::with_capacity(proxy_count);
        let mut bindings = Vec::with_capacity(proxy_count);
        let vertices = target.vertices_mut(&allocation);
        let mut cursor = 0;
        for op in chain {
            let mut first = 0;
            for group in &op.groups {
                let count = group.quad_count;
                let bytes = count * 4 * stride;
                let params = TessellationParams {
                    filter: op.filter,
                    origin: group.proxy.origin(),
                    texture_size: (group.proxy.width(), group.proxy.height()),
                };
                dispatcher.tessellate(
                    &mut vertices[cursor..cursor + bytes],
                    &op.entries[first..first + count],
                    &params,
                );
                let vertex_offset = allocation.offset + cursor;
                meshes.push(if count > 1 {
                    Mesh::quad_patterned(vertex_offset, count as u32, max_quads)
                } else {
                    Mesh::TriangleStrip {
                        vertex_offset,
                        vertex_count: 4,
                    }
                });
                bindings.push(group.proxy.clone());
                cursor += bytes;
                first += count;
            }
        }
        debug_assert_eq!(cursor, allocation.byte_len());

        let textures = match bindings.as_slice() {
            [single] => TextureBindings::Fixed(single.clone()),
            _ => TextureBindings::PerMesh(bindings),
        };
        let stats = FlushStats {
            draws: 1,
            meshes: meshes.len(),
            quads: quad_count,
            skipped_batches: 0,
        };
        target.draw(DrawSubmission {
            geometry,
            pipeline,
            textures,
            meshes,
        });
        Ok(stats)
    }

    /// Human-readable listing of every group and quad
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# draws: {}", self.entries.len());
        let mut entries = self.entries.iter();
        for group in &self.groups {
            let _ = writeln!(
                out,
                "Proxy ID: {}, Filter: {}",
                group.proxy.unique_id(),
                self.filter as u32
            );
            for (i, entry) in entries.by_ref().take(group.quad_count).enumerate() {
                let src = entry.src_rect;
                let q = &entry.quad;
                let _ = writeln!(
                    out,
                    "{}: Color: 0x{:08x}, TexRect [L: {:.2}, T: {:.2}, R: {:.2}, B: {:.2}] \
                     Quad [({:.2}, {:.2}), ({:.2}, {:.2}), ({:.2}, {:.2}), ({:.2}, {:.2})]",
                    i,
                    entry.color.0,
                    src.left(),
                    src.top(),
                    src.right(),
                    src.bottom(),
                    q.x(0),
                    q.y(0),
                    q.x(1),
                    q.y(1),
                    q.x(2),
                    q.y(2),
                    q.x(3),
                    q.y(3)
                );
            }
        }
        out
    }
}

impl Drop for TextureDrawOp {
    fn drop(&mut self) {
        for group in &self.groups {
            match self.state {
                OpState::Open => group.proxy.unref(),
                OpState::Finalized | OpState::Consumed => group.proxy.completed_read(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::LazyTextureProxy;

    fn proxy(w: u32, h: u32) -> (Arc<LazyTextureProxy>, ProxyRef) {
        LazyTextureProxy::new(w, h).shared()
    }

    fn coverage() -> DrawParams {
        DrawParams::new().with_aa(AaType::Coverage)
    }

    fn draw(proxy: &ProxyRef, dst: Rect, params: &DrawParams) -> TextureDrawOp {
        TextureDrawOp::single(
            proxy.clone(),
            Rect::new(0.0, 0.0, 8.0, 8.0),
            dst,
            QuadAaFlags::ALL,
            SrcRectConstraint::Fast,
            params,
        )
    }

    fn identity_xform() -> Arc<ColorSpaceXform> {
        Arc::new(ColorSpaceXform::gamut([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]))
    }

    #[test]
    fn test_integral_rect_drops_coverage() {
        let (_, p) = proxy(8, 8);
        for matrix in [Matrix::IDENTITY, Matrix::translate(3.0, 4.0), Matrix::scale(2.0, 3.0)] {
            let op = draw(&p, Rect::new(1.0, 2.0, 5.0, 6.0), &coverage().with_view_matrix(matrix));
            assert_eq!(op.aa_type(), AaType::None);
            assert!(op.entries()[0].aa_flags().is_empty());
        }
        let op = draw(&p, Rect::new(1.5, 2.0, 5.0, 6.0), &coverage());
        assert_eq!(op.aa_type(), AaType::Coverage);
        assert_eq!(op.entries()[0].aa_flags(), QuadAaFlags::ALL);
    }

    #[test]
    fn test_coverage_without_flags_is_none() {
        let (_, p) = proxy(8, 8);
        let op = TextureDrawOp::single(
            p,
            Rect::new(0.0, 0.0, 8.0, 8.0),
            Rect::new(0.5, 0.5, 8.0, 8.0),
            QuadAaFlags::NONE,
            SrcRectConstraint::Fast,
            &coverage(),
        );
        assert_eq!(op.aa_type(), AaType::None);
    }

    #[test]
    fn test_msaa_forces_all_edges() {
        let (_, p) = proxy(8, 8);
        let op = TextureDrawOp::single(
            p,
            Rect::new(0.0, 0.0, 8.0, 8.0),
            Rect::new(0.0, 0.0, 8.0, 8.0),
            QuadAaFlags::LEFT,
            SrcRectConstraint::Fast,
            &DrawParams::new().with_aa(AaType::Msaa),
        );
        assert_eq!(op.entries()[0].aa_flags(), QuadAaFlags::ALL);
        assert!(op.uses_hw_aa());
        assert_eq!(op.bloated_bounds(), op.bounds());
    }

    #[test]
    fn test_unscaled_aligned_copy_drops_filter() {
        let (_, p) = proxy(32, 32);
        let params = DrawParams::new().with_filter(Filter::Bilinear);
        let src = Rect::new(0.5, 1.25, 10.0, 10.0);

        let op = TextureDrawOp::single(
            p.clone(),
            src,
            Rect::new(4.5, 7.25, 10.0, 10.0),
            QuadAaFlags::NONE,
            SrcRectConstraint::Fast,
            &params,
        );
        assert_eq!(op.filter(), Filter::Nearest);

        let scaled = TextureDrawOp::single(
            p.clone(),
            src,
            Rect::new(4.5, 7.25, 20.0, 10.0),
            QuadAaFlags::NONE,
            SrcRectConstraint::Fast,
            &params,
        );
        assert_eq!(scaled.filter(), Filter::Bilinear);

        let misaligned = TextureDrawOp::single(
            p,
            src,
            Rect::new(4.0, 7.25, 10.0, 10.0),
            QuadAaFlags::NONE,
            SrcRectConstraint::Fast,
            &params,
        );
        assert_eq!(misaligned.filter(), Filter::Bilinear);
    }

    #[test]
    fn test_strict_constraint_relaxed_without_filtering() {
        let (_, p) = proxy(32, 32);
        let nearest = TextureDrawOp::single(
            p.clone(),
            Rect::new(0.0, 0.0, 4.0, 4.0),
            Rect::new(0.0, 0.0, 8.0, 8.0),
            QuadAaFlags::NONE,
            SrcRectConstraint::Strict,
            &DrawParams::new(),
        );
        assert!(!nearest.has_domain());
        assert!(!nearest.entries()[0].has_domain());

        let bilinear = TextureDrawOp::single(
            p,
            Rect::new(0.0, 0.0, 4.0, 4.0),
            Rect::new(0.0, 0.0, 8.0, 8.0),
            QuadAaFlags::NONE,
            SrcRectConstraint::Strict,
            &DrawParams::new().with_filter(Filter::Bilinear),
        );
        assert!(bilinear.has_domain());
    }

    #[test]
    fn test_perspective_flag_and_bounds() {
        let (_, p) = proxy(8, 8);
        let op = draw(
            &p,
            Rect::new(0.0, 0.0, 10.0, 10.0),
            &DrawParams::new().with_view_matrix(Matrix::perspective(0.0, 0.0, 2.0)),
        );
        assert!(op.has_perspective());
        assert_eq!(op.bounds(), Rect::new(0.0, 0.0, 5.0, 5.0));
    }

    #[test]
    fn test_merge_none_into_coverage() {
        let (probe, p) = proxy(8, 8);
        let mut a = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new().with_filter(Filter::Bilinear));
        let mut b = draw(&p, Rect::new(10.5, 0.0, 4.0, 4.0), &coverage().with_filter(Filter::Bilinear));
        assert_eq!(a.aa_type(), AaType::None);
        assert_eq!(b.aa_type(), AaType::Coverage);
        assert_eq!(a.filter(), b.filter());
        assert_eq!(probe.ref_count(), 2);

        let a_quad = *a.entries()[0].quad();
        let b_quad = *b.entries()[0].quad();
        assert_eq!(a.combine(&mut b, &Caps::default()), CombineResult::Merged);
        assert_eq!(a.aa_type(), AaType::Coverage);
        assert_eq!(a.entries().len(), 2);
        assert_eq!(a.groups()[0].quad_count, 2);
        assert_eq!(*a.entries()[0].quad(), a_quad);
        assert_eq!(*a.entries()[1].quad(), b_quad);
        // Quads from the non-AA side keep no edge flags.
        assert!(a.entries()[0].aa_flags().is_empty());
        assert_eq!(a.bounds(), Rect::from_ltrb(0.0, 0.0, 14.5, 4.0));

        drop(b);
        assert_eq!(probe.ref_count(), 1);
        drop(a);
        assert_eq!(probe.ref_count(), 0);
    }

    #[test]
    fn test_distinct_paint_xforms_refuse() {
        let (_, p) = proxy(8, 8);
        let swap = Arc::new(ColorSpaceXform::gamut([0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]));
        let mut a = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new().with_paint_xform(identity_xform()));
        let mut b = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new().with_paint_xform(swap));
        assert_eq!(a.combine(&mut b, &Caps::default()), CombineResult::CannotCombine);

        let mut c = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new());
        assert_eq!(a.combine(&mut c, &Caps::default()), CombineResult::CannotCombine);
    }

    #[test]
    fn test_equal_xforms_by_value_merge() {
        let (_, p) = proxy(8, 8);
        let mut a = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new().with_texture_xform(identity_xform()));
        let mut b = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new().with_texture_xform(identity_xform()));
        assert_eq!(a.combine(&mut b, &Caps::default()), CombineResult::Merged);
    }

    #[test]
    fn test_aa_and_filter_mismatch_refuse() {
        let (_, p) = proxy(8, 8);
        let mut msaa = draw(&p, Rect::new(0.5, 0.0, 4.0, 4.0), &DrawParams::new().with_aa(AaType::Msaa));
        let mut cov = draw(&p, Rect::new(0.5, 0.0, 4.0, 4.0), &coverage());
        assert_eq!(msaa.combine(&mut cov, &Caps::default()), CombineResult::CannotCombine);

        let params = DrawParams::new().with_filter(Filter::MipMap);
        let mut mip = draw(&p, Rect::new(0.0, 0.0, 16.0, 16.0), &params);
        let mut nearest = draw(&p, Rect::new(0.0, 0.0, 16.0, 16.0), &DrawParams::new());
        assert_eq!(mip.filter(), Filter::MipMap);
        assert_eq!(mip.combine(&mut nearest, &Caps::default()), CombineResult::CannotCombine);
    }

    #[test]
    fn test_different_textures_may_chain() {
        let (_, p) = proxy(8, 8);
        let (_, q) = proxy(16, 16);
        let (_, r) = LazyTextureProxy::new(8, 8)
            .with_format(wgpu::TextureFormat::Bgra8Unorm)
            .shared();
        let mut a = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new());
        let mut b = draw(&q, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new());
        let mut c = draw(&r, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new());

        assert_eq!(a.combine(&mut b, &Caps::default()), CombineResult::MayChain);
        assert_eq!(a.entries().len(), 1);
        let no_dynamic = Caps {
            dynamic_texture_binding: false,
        };
        assert_eq!(a.combine(&mut b, &no_dynamic), CombineResult::CannotCombine);
        assert_eq!(a.combine(&mut c, &Caps::default()), CombineResult::CannotCombine);

        b.set_chained();
        let mut d = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new());
        assert_eq!(d.combine(&mut b, &Caps::default()), CombineResult::CannotCombine);
    }

    #[test]
    fn test_multi_group_ops_refuse() {
        let (_, a) = proxy(8, 8);
        let (_, b) = proxy(8, 8);
        let set = [a.clone(), b].map(|proxy| TextureSetEntry {
            proxy,
            src_rect: Rect::new(0.0, 0.0, 8.0, 8.0),
            dst_rect: Rect::new(0.0, 0.0, 8.0, 8.0),
            aa_flags: QuadAaFlags::NONE,
        });
        let mut batch = TextureDrawOp::batch(&set, &DrawParams::new());
        let mut single = draw(&a, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new());
        assert_eq!(single.combine(&mut batch, &Caps::default()), CombineResult::CannotCombine);
        assert_eq!(batch.combine(&mut single, &Caps::default()), CombineResult::CannotCombine);
    }

    fn set_entry(proxy: &ProxyRef, x: f32) -> TextureSetEntry {
        TextureSetEntry {
            proxy: proxy.clone(),
            src_rect: Rect::new(0.0, 0.0, 4.0, 4.0),
            dst_rect: Rect::new(x, 0.0, 4.0, 4.0),
            aa_flags: QuadAaFlags::NONE,
        }
    }

    #[test]
    fn test_batch_groups_only_consecutive() {
        let (probe_a, a) = proxy(8, 8);
        let (probe_b, b) = proxy(8, 8);

        let op = TextureDrawOp::batch(&[set_entry(&a, 0.0), set_entry(&b, 4.0), set_entry(&a, 8.0)], &DrawParams::new());
        let counts: Vec<usize> = op.groups().iter().map(|g| g.quad_count).collect();
        assert_eq!(counts, vec![1, 1, 1]);
        assert_eq!(probe_a.ref_count(), 2);
        assert_eq!(probe_b.ref_count(), 1);
        drop(op);

        let op = TextureDrawOp::batch(&[set_entry(&a, 0.0), set_entry(&a, 4.0), set_entry(&b, 8.0)], &DrawParams::new());
        let counts: Vec<usize> = op.groups().iter().map(|g| g.quad_count).collect();
        assert_eq!(counts, vec![2, 1]);
        assert_eq!(probe_a.ref_count(), 1);
        assert_eq!(op.bounds(), Rect::new(0.0, 0.0, 12.0, 4.0));
        let mut visited = Vec::new();
        op.visit_proxies(|p| visited.push(p.unique_id()));
        assert_eq!(visited, vec![a.unique_id(), b.unique_id()]);
        drop(op);
        assert_eq!(probe_a.ref_count(), 0);
        assert_eq!(probe_b.ref_count(), 0);
    }

    #[test]
    fn test_batch_simplifications() {
        let (_, a) = proxy(8, 8);
        let params = coverage().with_filter(Filter::Bilinear);

        // No entry asked for AA and every quad is an unscaled aligned copy.
        let op = TextureDrawOp::batch(&[set_entry(&a, 0.0), set_entry(&a, 4.0)], &params);
        assert_eq!(op.aa_type(), AaType::None);
        assert_eq!(op.filter(), Filter::Nearest);
        assert!(!op.has_domain());

        // Pixel-aligned entries lose their flags but the op keeps coverage.
        let mut aligned = set_entry(&a, 0.0);
        aligned.aa_flags = QuadAaFlags::ALL;
        let mut fractional = set_entry(&a, 4.5);
        fractional.aa_flags = QuadAaFlags::ALL;
        let op = TextureDrawOp::batch(&[aligned, fractional], &params);
        assert_eq!(op.aa_type(), AaType::Coverage);
        assert!(op.entries()[0].aa_flags().is_empty());
        assert_eq!(op.entries()[1].aa_flags(), QuadAaFlags::ALL);
        assert_eq!(op.filter(), Filter::Bilinear);

        // Rotation always needs filtering.
        let rotated = params.clone().with_view_matrix(Matrix::rotate(0.3));
        let op = TextureDrawOp::batch(&[set_entry(&a, 0.0)], &rotated);
        assert_eq!(op.filter(), Filter::Bilinear);
    }

    #[test]
    fn test_msaa_batch_without_aa_keeps_exact_corners_after_merge() {
        use crate::tessellate::{tessellate_quad, TessellationParams};
        use crate::texture::SurfaceOrigin;
        use crate::vertex::Position2dAaVertex;

        let (_, a) = proxy(8, 8);
        let msaa = DrawParams::new().with_aa(AaType::Msaa);
        let mut batch = TextureDrawOp::batch(&[set_entry(&a, 0.0)], &msaa);
        assert_eq!(batch.aa_type(), AaType::None);
        assert!(batch.entries()[0].aa_flags().is_empty());

        let mut op = draw(&a, Rect::new(4.5, 0.0, 4.0, 4.0), &coverage());
        assert_eq!(op.combine(&mut batch, &Caps::default()), CombineResult::Merged);
        assert_eq!(op.aa_type(), AaType::Coverage);
        assert!(op.entries()[1].aa_flags().is_empty());

        let params = TessellationParams {
            filter: Filter::Nearest,
            origin: SurfaceOrigin::TopLeft,
            texture_size: (8, 8),
        };
        let v = tessellate_quad::<Position2dAaVertex>(&op.entries()[1], &params);
        let positions: Vec<[f32; 2]> = v.iter().map(|v| v.position).collect();
        assert_eq!(positions, vec![[0.0, 0.0], [0.0, 4.0], [4.0, 0.0], [4.0, 4.0]]);
    }

    #[test]
    fn test_finalize_transfers_refs() {
        let (probe, p) = proxy(8, 8);
        let mut op = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new());
        assert_eq!(probe.ref_count(), 1);
        op.finalize();
        assert_eq!(op.state(), OpState::Finalized);
        assert_eq!(probe.ref_count(), 0);
        assert_eq!(probe.pending_reads(), 1);
        drop(op);
        assert_eq!(probe.pending_reads(), 0);
        assert_eq!(probe.release_calls(), 2);
    }

    #[test]
    fn test_drop_open_op_releases_ref() {
        let (probe, p) = proxy(8, 8);
        let op = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new());
        drop(op);
        assert_eq!(probe.ref_count(), 0);
        assert_eq!(probe.pending_reads(), 0);
        assert_eq!(probe.release_calls(), 1);
    }

    #[test]
    fn test_double_finalize_releases_once() {
        let (probe, p) = proxy(8, 8);
        let mut op = draw(&p, Rect::new(0.0, 0.0, 4.0, 4.0), &DrawParams::new());
        op.finalize();
        let second = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| op.finalize()));
        if cfg!(debug_assertions) {
            assert!(second.is_err());
        }
        assert_eq!(probe.release_calls(), 1);
        drop(op);
        assert_eq!(probe.release_calls(), 2);
        assert_eq!(probe.ref_count(), 0);
        assert_eq!(probe.pending_reads(), 0);
    }

    #[test]
    fn test_dump_format() {
        let (_, p) = proxy(8, 8);
        let op = TextureDrawOp::single(
            p.clone(),
            Rect::from_ltrb(0.0, 0.0, 4.0, 2.0),
            Rect::from_ltrb(1.0, 2.0, 3.0, 4.0),
            QuadAaFlags::NONE,
            SrcRectConstraint::Fast,
            &DrawParams::new().with_color(PackedColor(0x80ff_0000)),
        );
        let expected = format!(
            "# draws: 1\n\
             Proxy ID: {}, Filter: 0\n\
             0: Color: 0x80ff0000, TexRect [L: 0.00, T: 0.00, R: 4.00, B: 2.00] \
             Quad [(1.00, 2.00), (1.00, 4.00), (3.00, 2.00), (3.00, 4.00)]\n",
            p.unique_id()
        );
        assert_eq!(op.dump(), expected);
    }

    #[test]
    fn test_dump_restarts_index_per_group() {
        let (_, a) = proxy(8, 8);
        let (_, b) = proxy(8, 8);
        let op = TextureDrawOp::batch(&[set_entry(&a, 0.0), set_entry(&a, 4.0), set_entry(&b, 8.0)], &DrawParams::new());
        let dump = op.dump();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "# draws: 3");
        assert!(lines[1].starts_with(&format!("Proxy ID: {}", a.unique_id())));
        assert!(lines[2].starts_with("0: "));
        assert!(lines[3].starts_with("1: "));
        assert!(lines[4].starts_with(&format!("Proxy ID: {}", b.unique_id())));
        assert!(lines[5].starts_with("0: "));
    }
}
