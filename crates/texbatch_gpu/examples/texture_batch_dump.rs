//! Texture Batch Dump
//!
//! Records a handful of textured quads (a sprite row over one atlas, a second
//! texture that chains onto it, a strict bilinear draw and a tilted draw),
//! flushes them into a recording target and prints what was submitted.
//!
//! Batching knobs come from the environment:
//! `TEXBATCH_MAX_OP_LOOKBACK`, `TEXBATCH_DYNAMIC_TEXTURE_BINDING`,
//! `TEXBATCH_MAX_QUADS_PER_DRAW`. Use `RUST_LOG=texbatch_gpu=trace` to see
//! every combine decision.
//!
//! Run with: cargo run -p texbatch_gpu --example texture_batch_dump

use std::sync::Arc;

use texbatch_core::{Color, ColorSpaceXform, Matrix, QuadAaFlags, Rect};
use texbatch_gpu::{
    AaType, BatchConfig, DrawOpList, DrawParams, Filter, LazyTextureProxy, RecordingTarget, SrcRectConstraint,
    SurfaceOrigin, TextureBindings, TextureDrawOp, TextureSetEntry,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = BatchConfig::from_env();
    let mut list = DrawOpList::new(config);

    let (_, atlas) = LazyTextureProxy::new(256, 256).shared();
    let (_, photo) = LazyTextureProxy::new(640, 480)
        .with_origin(SurfaceOrigin::BottomLeft)
        .shared();

    // Sprite row: each cell merges into the first op.
    let sprite = DrawParams::new().with_aa(AaType::Coverage);
    for i in 0..4 {
        let x = i as f32 * 32.0;
        list.record(TextureDrawOp::single(
            atlas.clone(),
            Rect::new(x, 0.0, 32.0, 32.0),
            Rect::new(10.5 + x, 10.0, 32.0, 32.0),
            QuadAaFlags::ALL,
            SrcRectConstraint::Fast,
            &sprite,
        ));
    }

    // Different texture, same format: chains behind the sprite row.
    let outcome = list.record(TextureDrawOp::single(
        photo.clone(),
        Rect::new(0.0, 0.0, 640.0, 480.0),
        Rect::new(200.0, 10.0, 160.0, 120.0),
        QuadAaFlags::NONE,
        SrcRectConstraint::Fast,
        &DrawParams::new(),
    ));
    println!("photo op: {:?}", outcome);

    // Strict sampling of an atlas cell under a wide-gamut transform.
    let wide_gamut = Arc::new(ColorSpaceXform::gamut([
        1.2249, -0.2247, 0.0, -0.0420, 1.0419, 0.0, -0.0197, -0.0786, 1.0979,
    ]));
    println!("red through gamut transform: {:?}", wide_gamut.apply(Color::RED));
    list.record(TextureDrawOp::single(
        atlas.clone(),
        Rect::new(64.0, 64.0, 16.0, 16.0),
        Rect::new(10.0, 200.0, 64.0, 64.0),
        QuadAaFlags::NONE,
        SrcRectConstraint::Strict,
        &DrawParams::new()
            .with_filter(Filter::Bilinear)
            .with_texture_xform(wide_gamut),
    ));

    // One op over both textures, drawn through a perspective matrix.
    let tilted = DrawParams::new()
        .with_aa(AaType::Coverage)
        .with_view_matrix(Matrix::translate(400.0, 300.0).then(&Matrix::perspective(0.0005, 0.001, 1.0)));
    let set: Vec<TextureSetEntry> = [&atlas, &atlas, &photo]
        .into_iter()
        .enumerate()
        .map(|(i, proxy)| TextureSetEntry {
            proxy: proxy.clone(),
            src_rect: Rect::new(0.0, 0.0, 64.0, 64.0),
            dst_rect: Rect::new(i as f32 * 70.0, 0.0, 64.0, 64.0),
            aa_flags: QuadAaFlags::ALL,
        })
        .collect();
    list.record(TextureDrawOp::batch(&set, &tilted));

    println!("{}", list.dump());

    let mut target = RecordingTarget::new(list.config().max_quads_per_draw);
    let stats = list.flush(&mut target);
    for (i, submission) in target.submissions().iter().enumerate() {
        let textures = match &submission.textures {
            TextureBindings::Fixed(proxy) => format!("fixed {}", proxy.unique_id()),
            TextureBindings::PerMesh(proxies) => format!("{} per-mesh", proxies.len()),
        };
        println!(
            "draw {}: layout {:?} ({} bytes/vertex), {} meshes, {} quads, textures {}, msaa {}",
            i,
            submission.geometry.layout,
            submission.geometry.layout.stride(),
            submission.meshes.len(),
            submission.quad_count(),
            textures,
            submission.pipeline.hw_antialias
        );
    }
    println!(
        "{} draws, {} meshes, {} quads, {} skipped, {} vertex bytes",
        stats.draws,
        stats.meshes,
        stats.quads,
        stats.skipped_batches,
        target.vertex_bytes().len()
    );

    list.clear();
}
