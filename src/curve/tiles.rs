use crate::curve::gilbert::GilbertWalk;
use crate::curve::spiral::HilbertSpiralWalk;
use crate::foundation::geom::{Dimensions, Point, Rect};

fn tile_rect(cell: (i64, i64), tile: Dimensions, image: Dimensions) -> Rect {
    Rect::new(
        Point::new(cell.0 as usize * tile.width, cell.1 as usize * tile.height),
        tile,
    )
    .clip_to(image)
}

/// Canonical tiles covering a region, in generalized-Hilbert order.
///
/// Emitted rectangles lie on the tile grid and are clipped to the image, so
/// they never overlap; edge tiles may be smaller than the grid.
#[derive(Debug)]
pub struct HilbertTiles {
    rect: Rect,
    image: Dimensions,
    tile: Dimensions,
    walk: Option<GilbertWalk>,
}

impl HilbertTiles {
    /// Tiles of the grid-aligned cover of `rect` within an `image`-sized
    /// node, walked in Hilbert order.
    pub fn new(rect: Rect, image: Dimensions, tile: Dimensions) -> Self {
        let walk = if rect.is_empty() || tile.is_empty() {
            None
        } else {
            let left = (rect.left / tile.width) as i64;
            let right = ((rect.right() - 1) / tile.width) as i64;
            let top = (rect.top / tile.height) as i64;
            let bottom = ((rect.bottom() - 1) / tile.height) as i64;
            Some(GilbertWalk::new(
                left,
                top,
                right - left + 1,
                bottom - top + 1,
            ))
        };
        Self {
            rect,
            image,
            tile,
            walk,
        }
    }

    /// The region being covered.
    pub fn rect(&self) -> Rect {
        self.rect
    }
}

impl Iterator for HilbertTiles {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        let cell = self.walk.as_mut()?.next()?;
        Some(tile_rect(cell, self.tile, self.image))
    }
}

/// Canonical tiles covering a region, spiralling outward from a central
/// point in blocks of `block` tiles, each block in Hilbert order.
///
/// This is the sink traversal: tiles near the point of interest are
/// requested first.
#[derive(Debug)]
pub struct HilbertSpiralTiles {
    rect: Rect,
    image: Dimensions,
    tile: Dimensions,
    walk: Option<HilbertSpiralWalk>,
}

impl HilbertSpiralTiles {
    /// Spiral-of-Hilbert-blocks cover of `rect`, centered on `centre` (in
    /// pixels, clamped to the region).
    pub fn new(
        rect: Rect,
        centre: Point,
        image: Dimensions,
        tile: Dimensions,
        block: Dimensions,
    ) -> Self {
        let walk = if rect.is_empty() || tile.is_empty() || block.is_empty() {
            None
        } else {
            let right = rect.right() - 1;
            let bottom = rect.bottom() - 1;
            let x_min = (rect.left / tile.width) as i64;
            let y_min = (rect.top / tile.height) as i64;
            let x_max = (right / tile.width) as i64;
            let y_max = (bottom / tile.height) as i64;
            let x_start = ((centre.x.min(right) / tile.width) as i64).clamp(x_min, x_max);
            let y_start = ((centre.y.min(bottom) / tile.height) as i64).clamp(y_min, y_max);
            Some(HilbertSpiralWalk::new(
                x_start,
                y_start,
                x_min,
                y_min,
                x_max,
                y_max,
                block.width as i64,
                block.height as i64,
            ))
        };
        Self {
            rect,
            image,
            tile,
            walk,
        }
    }

    /// The region being covered.
    pub fn rect(&self) -> Rect {
        self.rect
    }
}

impl Iterator for HilbertSpiralTiles {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        let cell = self.walk.as_mut()?.next()?;
        Some(tile_rect(cell, self.tile, self.image))
    }
}
