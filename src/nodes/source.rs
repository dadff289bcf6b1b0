use crate::foundation::error::{TileGraphError, TileGraphResult};
use crate::foundation::geom::{Dimensions, Rect};
use crate::node::{MemoryMode, OutNode, SharedOutNode, SharedTile};
use crate::tile::{PixelFormat, Tile};

/// A fully loaded source image.
///
/// Holds its entire output in memory (`FullMemory`), so its size is
/// reserved against the budget up front and tile requests are plain copies.
pub struct ImageSourceNode {
    image: Tile,
}

impl ImageSourceNode {
    /// Wrap a loaded image; its tile must be anchored at the origin.
    pub fn new(image: Tile) -> TileGraphResult<Self> {
        if image.rect().point() != Default::default() {
            return Err(TileGraphError::graph(
                "source images must be anchored at the origin",
            ));
        }
        Ok(Self { image })
    }

    /// The backing image.
    pub fn image(&self) -> &Tile {
        &self.image
    }
}

impl OutNode for ImageSourceNode {
    fn label(&self) -> &str {
        "image-source"
    }

    fn dimensions(&self) -> Dimensions {
        self.image.dims()
    }

    fn channels(&self) -> usize {
        self.image.channels()
    }

    fn format(&self) -> PixelFormat {
        self.image.format()
    }

    fn memory_mode(&self) -> MemoryMode {
        MemoryMode::FullMemory
    }

    fn input_count(&self) -> usize {
        0
    }

    fn input(&self, _: usize) -> &SharedOutNode {
        unreachable!("source nodes have no inputs")
    }

    fn raw_input_region(&self, _: usize, _: Rect) -> Rect {
        unreachable!("source nodes have no inputs")
    }

    fn compute(&self, _inputs: &[SharedTile], output: &mut Tile) -> TileGraphResult<()> {
        output.copy_overlap(&self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::geom::Point;

    fn gradient(dims: Dimensions) -> Tile {
        let mut tile = Tile::zeroed(Rect::from_dims(dims), 1, PixelFormat::U8);
        for y in 0..dims.height {
            for x in 0..dims.width {
                tile.set_value(x, y, 0, ((x + y) % 256) as f64);
            }
        }
        tile
    }

    #[test]
    fn rejects_offset_images() {
        let off = Tile::zeroed(
            Rect::new(Point::new(4, 0), Dimensions::new(8, 8)),
            1,
            PixelFormat::U8,
        );
        assert!(ImageSourceNode::new(off).is_err());
    }

    #[test]
    fn computes_any_sub_rectangle_of_the_image() {
        let node = ImageSourceNode::new(gradient(Dimensions::new(64, 64))).unwrap();
        let rect = Rect::new(Point::new(32, 16), Dimensions::new(16, 8));
        let mut out = Tile::zeroed(rect, 1, PixelFormat::U8);
        node.compute(&[], &mut out).unwrap();

        for y in 0..8 {
            for x in 0..16 {
                assert_eq!(out.value_at(x, y, 0), ((x + 32 + y + 16) % 256) as f64);
            }
        }
    }
}
