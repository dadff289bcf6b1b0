/// Integer pixel position counted from the top-left corner of the image.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Point {
    /// Horizontal offset.
    pub x: usize,
    /// Vertical offset.
    pub y: usize,
}

impl Point {
    /// Create a point.
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Width/height pair in pixels (or in grid cells, depending on context).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Dimensions {
    /// Horizontal extent.
    pub width: usize,
    /// Vertical extent.
    pub height: usize,
}

impl Dimensions {
    /// Create a dimensions pair.
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Square dimensions.
    pub fn square(side: usize) -> Self {
        Self::new(side, side)
    }

    /// Number of cells covered.
    pub fn area(self) -> usize {
        self.width.saturating_mul(self.height)
    }

    /// Return `true` when the area is zero.
    pub fn is_empty(self) -> bool {
        self.area() == 0
    }

    /// Component-wise maximum of the two pairs.
    pub fn bound(self, other: Self) -> Self {
        Self::new(self.width.max(other.width), self.height.max(other.height))
    }
}

/// Axis-aligned rectangle `(left, top, width, height)` in non-negative
/// integer coordinates, counted from the top-left corner.
///
/// All operations are pure: they consume `self` by value and return a new
/// rectangle.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Rect {
    /// Leftmost column.
    pub left: usize,
    /// Topmost row.
    pub top: usize,
    /// Horizontal extent.
    pub width: usize,
    /// Vertical extent.
    pub height: usize,
}

impl Rect {
    /// Rectangle from a corner point and dimensions.
    pub fn new(point: Point, dims: Dimensions) -> Self {
        Self {
            left: point.x,
            top: point.y,
            width: dims.width,
            height: dims.height,
        }
    }

    /// Rectangle anchored at the origin.
    pub fn from_dims(dims: Dimensions) -> Self {
        Self::new(Point::default(), dims)
    }

    /// Top-left corner.
    pub fn point(self) -> Point {
        Point::new(self.left, self.top)
    }

    /// Extent of the rectangle.
    pub fn dims(self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// One past the rightmost column.
    pub fn right(self) -> usize {
        self.left + self.width
    }

    /// One past the bottommost row.
    pub fn bottom(self) -> usize {
        self.top + self.height
    }

    /// Number of pixels covered.
    pub fn area(self) -> usize {
        self.dims().area()
    }

    /// Return `true` when the area is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with `clipper`; empty (but positioned inside `clipper`)
    /// when the rectangles are disjoint.
    pub fn clip(self, clipper: Rect) -> Rect {
        let left = self.left.clamp(clipper.left, clipper.right());
        let top = self.top.clamp(clipper.top, clipper.bottom());
        let right = self.right().clamp(clipper.left, clipper.right());
        let bottom = self.bottom().clamp(clipper.top, clipper.bottom());
        Rect {
            left,
            top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Clip against an origin-anchored image of the given dimensions.
    pub fn clip_to(self, dims: Dimensions) -> Rect {
        self.clip(Rect::from_dims(dims))
    }

    /// Containment test.
    pub fn subset_of(self, other: Rect) -> bool {
        self.left >= other.left
            && self.top >= other.top
            && self.right() <= other.right()
            && self.bottom() <= other.bottom()
    }

    /// Area of the intersection with `other`.
    pub fn overlap(self, other: Rect) -> usize {
        let w = self
            .right()
            .min(other.right())
            .saturating_sub(self.left.max(other.left));
        let h = self
            .bottom()
            .min(other.bottom())
            .saturating_sub(self.top.max(other.top));
        w * h
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn bound(self, other: Rect) -> Rect {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        Rect {
            left,
            top,
            width: self.right().max(other.right()) - left,
            height: self.bottom().max(other.bottom()) - top,
        }
    }

    /// Grow by the given amounts per edge, saturating at the origin.
    pub fn extend(self, left: usize, top: usize, right: usize, bottom: usize) -> Rect {
        let new_left = self.left.saturating_sub(left);
        let new_top = self.top.saturating_sub(top);
        Rect {
            left: new_left,
            top: new_top,
            width: self.right() + right - new_left,
            height: self.bottom() + bottom - new_top,
        }
    }

    /// Grow by the same amount on every edge.
    pub fn extend_all(self, amount: usize) -> Rect {
        self.extend(amount, amount, amount, amount)
    }

    /// Lossless conversion to floating-point coordinates.
    pub fn to_float(self) -> RectF {
        RectF {
            left: self.left as f64,
            top: self.top as f64,
            width: self.width as f64,
            height: self.height as f64,
        }
    }
}

/// Floating-point rectangle, produced by [`Rect::to_float`] and consumed by
/// [`RectF::bounding_rect`]. Only exists to carry `scale` round trips.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RectF {
    /// Leftmost coordinate.
    pub left: f64,
    /// Topmost coordinate.
    pub top: f64,
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl RectF {
    /// Scale both corner and extent; negative factors are normalized so the
    /// extents stay non-negative.
    pub fn scale(self, sx: f64, sy: f64) -> RectF {
        let mut r = RectF {
            left: self.left * sx,
            top: self.top * sy,
            width: self.width * sx,
            height: self.height * sy,
        };
        if r.width < 0.0 {
            r.left += r.width;
            r.width = -r.width;
        }
        if r.height < 0.0 {
            r.top += r.height;
            r.height = -r.height;
        }
        r
    }

    /// Smallest integer rectangle containing `self`, with the negative
    /// quadrant cut away first.
    pub fn bounding_rect(self) -> Rect {
        let mut r = self;
        if r.left < 0.0 {
            r.width = (r.width + r.left).max(0.0);
            r.left = 0.0;
        }
        if r.top < 0.0 {
            r.height = (r.height + r.top).max(0.0);
            r.top = 0.0;
        }
        let left = r.left as usize;
        let top = r.top as usize;
        Rect {
            left,
            top,
            width: (r.left + r.width).ceil() as usize - left,
            height: (r.top + r.height).ceil() as usize - top,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(left: usize, top: usize, width: usize, height: usize) -> Rect {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    #[test]
    fn clip_is_idempotent_and_associative() {
        let a = rect(2, 3, 10, 8);
        let b = rect(5, 0, 4, 20);
        let c = rect(0, 4, 30, 3);

        assert_eq!(a.clip(b), a.clip(b).clip(b));
        assert_eq!(a.clip(b).clip(c), a.clip(c).clip(b));
    }

    #[test]
    fn clip_of_disjoint_rects_is_empty() {
        let a = rect(0, 0, 4, 4);
        let b = rect(10, 10, 4, 4);
        assert!(a.clip(b).is_empty());
        assert!(b.clip(a).is_empty());
    }

    #[test]
    fn bound_contains_both_operands() {
        let a = rect(2, 3, 4, 4);
        let b = rect(10, 1, 2, 9);
        let u = a.bound(b);
        assert!(a.subset_of(u));
        assert!(b.subset_of(u));
        assert_eq!(u, rect(2, 1, 10, 9));
    }

    #[test]
    fn overlap_matches_clip_area() {
        let a = rect(0, 0, 6, 6);
        let b = rect(4, 4, 6, 6);
        assert_eq!(a.overlap(b), 4);
        assert_eq!(a.overlap(b), a.clip(b).area());
        assert_eq!(a.overlap(rect(6, 0, 2, 2)), 0);
    }

    #[test]
    fn extend_saturates_at_origin() {
        let a = rect(1, 2, 3, 3);
        let e = a.extend(5, 5, 1, 0);
        assert_eq!(e, rect(0, 0, 5, 5));
    }

    #[test]
    fn scale_then_bounding_rect_covers_the_scaled_region() {
        let r = rect(3, 4, 5, 2).to_float().scale(0.4, 0.4).bounding_rect();
        // [1.2, 1.6; 2.0, 0.8] -> [1, 1; 3, 2]
        assert_eq!(r, rect(1, 1, 3, 2));
    }

    #[test]
    fn bounding_rect_clamps_negative_coordinates() {
        let f = RectF {
            left: -2.5,
            top: 1.5,
            width: 4.0,
            height: 1.0,
        };
        assert_eq!(f.bounding_rect(), rect(0, 1, 2, 2));
    }
}
