//! Texture proxies
//!
//! Draw ops never own GPU textures. They hold shared [`ProxyRef`] handles and
//! drive the proxy's reference bookkeeping: a plain ref while the op is
//! recording, a pending read once the op is finalized.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use texbatch_core::Rect;

static NEXT_PROXY_ID: AtomicU32 = AtomicU32::new(1);

/// Stable unique identity of a texture proxy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(u32);

impl ProxyId {
    /// Allocate a fresh process-wide id
    pub fn next() -> Self {
        Self(NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row storage order of a texture
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SurfaceOrigin {
    #[default]
    TopLeft,
    /// Rows stored bottom-up; texture v coordinates are flipped
    BottomLeft,
}

/// Sampler target type (must match between chained ops)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureType {
    #[default]
    D2,
    Rectangle,
    External,
}

/// Texture filter mode
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Nearest = 0,
    Bilinear = 1,
    MipMap = 2,
}

impl Filter {
    /// Min/mag filter for a wgpu sampler
    pub fn min_mag_filter(self) -> wgpu::FilterMode {
        match self {
            Filter::Nearest => wgpu::FilterMode::Nearest,
            Filter::Bilinear | Filter::MipMap => wgpu::FilterMode::Linear,
        }
    }

    /// Mipmap filter for a wgpu sampler
    pub fn mipmap_filter(self) -> wgpu::FilterMode {
        match self {
            Filter::MipMap => wgpu::FilterMode::Linear,
            Filter::Nearest | Filter::Bilinear => wgpu::FilterMode::Nearest,
        }
    }
}

/// A lazily-backed texture shared between draw ops
pub trait TextureProxy: Send + Sync + fmt::Debug {
    fn unique_id(&self) -> ProxyId;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn origin(&self) -> SurfaceOrigin;

    fn format(&self) -> wgpu::TextureFormat;

    fn texture_type(&self) -> TextureType;

    /// Make sure the backing texture exists. Returns false when it could not
    /// be created.
    fn instantiate(&self) -> bool;

    fn add_ref(&self);

    fn unref(&self);

    fn add_pending_read(&self);

    fn completed_read(&self);

    /// The full texel rect of the texture
    fn worst_case_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width() as f32, self.height() as f32)
    }
}

/// Shared handle to a texture proxy
pub type ProxyRef = Arc<dyn TextureProxy>;

/// Counter-tracked proxy whose backing is created on first instantiate.
///
/// Used as the default proxy for CPU flush targets and as a probe in tests.
#[derive(Debug)]
pub struct LazyTextureProxy {
    id: ProxyId,
    width: u32,
    height: u32,
    origin: SurfaceOrigin,
    format: wgpu::TextureFormat,
    texture_type: TextureType,
    fail_instantiate: bool,
    instantiated: AtomicBool,
    refs: AtomicI32,
    pending_reads: AtomicI32,
    unref_calls: AtomicU32,
    completed_read_calls: AtomicU32,
}

impl LazyTextureProxy {
    pub fn new(width: u32, height: u32) -> Self {
        debug_assert!(width > 0 && height > 0, "texture must not be empty");
        Self {
            id: ProxyId::next(),
            width,
            height,
            origin: SurfaceOrigin::TopLeft,
            format: wgpu::TextureFormat::Rgba8Unorm,
            texture_type: TextureType::D2,
            fail_instantiate: false,
            instantiated: AtomicBool::new(false),
            refs: AtomicI32::new(0),
            pending_reads: AtomicI32::new(0),
            unref_calls: AtomicU32::new(0),
            completed_read_calls: AtomicU32::new(0),
        }
    }

    pub fn with_origin(mut self, origin: SurfaceOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_texture_type(mut self, texture_type: TextureType) -> Self {
        self.texture_type = texture_type;
        self
    }

    /// Make every `instantiate` call fail
    pub fn failing_instantiation(mut self) -> Self {
        self.fail_instantiate = true;
        self
    }

    /// Wrap in a shared handle, keeping a typed handle for inspection
    pub fn shared(self) -> (Arc<LazyTextureProxy>, ProxyRef) {
        let typed = Arc::new(self);
        let erased: ProxyRef = typed.clone();
        (typed, erased)
    }

    /// Outstanding plain refs held by draw ops
    pub fn ref_count(&self) -> i32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Outstanding pending reads registered by finalized draw ops
    pub fn pending_reads(&self) -> i32 {
        self.pending_reads.load(Ordering::Acquire)
    }

    /// Total decrements seen (unref + completed read)
    pub fn release_calls(&self) -> u32 {
        self.unref_calls.load(Ordering::Acquire) + self.completed_read_calls.load(Ordering::Acquire)
    }

    pub fn is_instantiated(&self) -> bool {
        self.instantiated.load(Ordering::Acquire)
    }
}

impl TextureProxy for LazyTextureProxy {
    fn unique_id(&self) -> ProxyId {
        self.id
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn origin(&self) -> SurfaceOrigin {
        self.origin
    }

    fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    fn texture_type(&self) -> TextureType {
        self.texture_type
    }

    fn instantiate(&self) -> bool {
        if self.fail_instantiate {
            return false;
        }
        self.instantiated.store(true, Ordering::Release);
        true
    }

    fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    fn unref(&self) {
        self.unref_calls.fetch_add(1, Ordering::AcqRel);
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unref without a matching ref");
    }

    fn add_pending_read(&self) {
        self.pending_reads.fetch_add(1, Ordering::AcqRel);
    }

    fn completed_read(&self) {
        self.completed_read_calls.fetch_add(1, Ordering::AcqRel);
        let prev = self.pending_reads.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "completed read without a pending read");
    }
}
