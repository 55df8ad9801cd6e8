//! Core geometry types
//!
//! Rectangles are stored as origin + size. Texture-space source rects and
//! device-space bounds both use [`Rect`]; callers that need edge values go
//! through [`Rect::left`] and friends or [`Rect::to_ltrb`].

/// 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Homogeneous 2D point (x, y, w)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub w: f32,
}

impl Default for Point3 {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }
}

impl Point3 {
    pub const fn new(x: f32, y: f32, w: f32) -> Self {
        Self { x, y, w }
    }

    /// Divide through by w
    pub fn project(&self) -> Point {
        let iw = 1.0 / self.w;
        Point::new(self.x * iw, self.y * iw)
    }
}

impl From<Point> for Point3 {
    fn from(p: Point) -> Self {
        Point3::new(p.x, p.y, 1.0)
    }
}

/// 2D size
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Convert to a Rect at the origin (0, 0)
    pub const fn to_rect(self) -> Rect {
        Rect {
            origin: Point::ZERO,
            size: self,
        }
    }
}

/// 2D rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        origin: Point::ZERO,
        size: Size::ZERO,
    };

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn from_ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn x(&self) -> f32 {
        self.origin.x
    }

    pub fn y(&self) -> f32 {
        self.origin.y
    }

    pub fn width(&self) -> f32 {
        self.size.width
    }

    pub fn height(&self) -> f32 {
        self.size.height
    }

    pub fn left(&self) -> f32 {
        self.origin.x
    }

    pub fn top(&self) -> f32 {
        self.origin.y
    }

    pub fn right(&self) -> f32 {
        self.origin.x + self.size.width
    }

    pub fn bottom(&self) -> f32 {
        self.origin.y + self.size.height
    }

    /// Edges as `[left, top, right, bottom]`
    pub fn to_ltrb(&self) -> [f32; 4] {
        [self.left(), self.top(), self.right(), self.bottom()]
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    /// True when the rect encloses no area (or is inverted)
    pub fn is_empty(&self) -> bool {
        !(self.size.width > 0.0 && self.size.height > 0.0)
    }

    /// True when left <= right and top <= bottom
    pub fn is_sorted(&self) -> bool {
        self.size.width >= 0.0 && self.size.height >= 0.0
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.x <= self.right()
            && point.y >= self.origin.y
            && point.y <= self.bottom()
    }

    /// Smallest rect enclosing both. An empty `self` is replaced by `other`.
    pub fn join(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_ltrb(
            self.left().min(other.left()),
            self.top().min(other.top()),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// True when the rects overlap or share an edge
    pub fn touches(&self, other: &Rect) -> bool {
        self.left() <= other.right()
            && other.left() <= self.right()
            && self.top() <= other.bottom()
            && other.top() <= self.bottom()
    }

    /// Offset the rect by a delta
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Rect {
            origin: Point::new(self.origin.x + dx, self.origin.y + dy),
            size: self.size,
        }
    }

    /// Grow the rect by a delta on every side
    pub fn outset(&self, dx: f32, dy: f32) -> Self {
        Rect::from_ltrb(
            self.left() - dx,
            self.top() - dy,
            self.right() + dx,
            self.bottom() + dy,
        )
    }
}
