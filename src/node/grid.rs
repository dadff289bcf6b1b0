use crate::foundation::geom::{Dimensions, Rect};

/// Canonical tile grid of a node: the image extent plus the tile size the
/// node computes in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    image: Dimensions,
    tile: Dimensions,
}

impl TileGrid {
    /// Grid of `tile`-sized cells over an `image`-sized node.
    pub fn new(image: Dimensions, tile: Dimensions) -> Self {
        Self { image, tile }
    }

    /// Extent of the node.
    pub fn image(self) -> Dimensions {
        self.image
    }

    /// Canonical tile size.
    pub fn tile(self) -> Dimensions {
        self.tile
    }

    /// Return `true` when `rect` is a canonical tile: grid-aligned corner
    /// and exactly the tile extent clipped to the image.
    pub fn is_tile(self, rect: Rect) -> bool {
        if self.tile.is_empty() {
            return false;
        }
        if rect.left % self.tile.width != 0 || rect.top % self.tile.height != 0 {
            return false;
        }
        rect == Rect::new(rect.point(), self.tile).clip_to(self.image)
    }

    /// Convert a byte budget into a tile-slot count.
    ///
    /// Whole interior tiles are charged first, then the wider edge strip,
    /// then the remaining edge strip; the conversion is monotone
    /// non-decreasing in `bytes` and never exceeds the grid's tile count.
    pub fn slots_from_bytes(self, bytes_per_pixel: usize, mut bytes: usize) -> usize {
        let (iw, ih) = (self.image.width, self.image.height);
        let (tw, th) = (self.tile.width, self.tile.height);
        if tw == 0 || th == 0 || bytes_per_pixel == 0 {
            return 0;
        }

        let full_x = iw / tw;
        let full_y = ih / th;
        let full_tiles = full_x * full_y;
        let bytes_per_full_tile = bytes_per_pixel * self.tile.area();

        if bytes <= full_tiles * bytes_per_full_tile {
            return bytes / bytes_per_full_tile;
        }
        bytes -= full_tiles * bytes_per_full_tile;
        let mut slots = full_tiles;

        // Strips are charged at remainder x full-opposite-extent pixels, the
        // wider remainder first.
        let (larger_add, larger_other, larger_count, smaller_add, smaller_other, smaller_count) =
            if iw % tw >= ih % th {
                (iw % tw, ih, ih / th, ih % th, iw, iw / tw)
            } else {
                (ih % th, iw, iw / tw, iw % tw, ih, ih / th)
            };

        if larger_add > 0 {
            let strip = larger_add * larger_other * bytes_per_pixel;
            if bytes <= strip * larger_count {
                return slots + bytes / strip;
            }
            bytes -= strip * larger_count;
            slots += larger_count;
        }
        if smaller_add > 0 {
            let strip = smaller_add * smaller_other * bytes_per_pixel;
            let corner = if larger_add > 0 { 1 } else { 0 };
            return slots + (bytes / strip).min(smaller_count + corner);
        }
        slots
    }
}
