use crate::cache::TileCache;
use crate::foundation::error::{TileGraphError, TileGraphResult};
use crate::foundation::geom::{Dimensions, Rect};
use crate::node::{DurationEstimator, MemoryMode, OutNode, SharedOutNode, SharedTile};
use crate::tile::{PixelFormat, Tile};

/// Per-pixel linear map `factor * x + offset`, in the input's format.
///
/// A caching node: tiles land in its cache under whatever byte budget the
/// memory distribution assigns.
pub struct LinearMapNode {
    input: SharedOutNode,
    factor: f64,
    offset: f64,
    change_probability: f64,
    cache: TileCache,
    timing: DurationEstimator,
}

impl LinearMapNode {
    /// Map `input` through `factor * x + offset`.
    pub fn new(input: SharedOutNode, factor: f64, offset: f64) -> Self {
        Self {
            input,
            factor,
            offset,
            change_probability: 0.0,
            cache: TileCache::disabled(),
            timing: DurationEstimator::new(),
        }
    }

    /// Declare how likely the map's parameters are to be edited; feeds the
    /// annealer's wasted-bytes term.
    pub fn with_change_probability(mut self, probability: f64) -> Self {
        self.change_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl OutNode for LinearMapNode {
    fn label(&self) -> &str {
        "linear-map"
    }

    fn dimensions(&self) -> Dimensions {
        self.input.dimensions()
    }

    fn channels(&self) -> usize {
        self.input.channels()
    }

    fn format(&self) -> PixelFormat {
        self.input.format()
    }

    fn memory_mode(&self) -> MemoryMode {
        MemoryMode::AnyMemory
    }

    fn input_count(&self) -> usize {
        1
    }

    fn input(&self, _: usize) -> &SharedOutNode {
        &self.input
    }

    fn raw_input_region(&self, _: usize, out_rect: Rect) -> Rect {
        out_rect
    }

    fn cache(&self) -> Option<&TileCache> {
        Some(&self.cache)
    }

    fn timing(&self) -> Option<&DurationEstimator> {
        Some(&self.timing)
    }

    fn change_probability(&self) -> f64 {
        self.change_probability
    }

    fn compute(&self, inputs: &[SharedTile], output: &mut Tile) -> TileGraphResult<()> {
        let input = inputs
            .first()
            .ok_or_else(|| TileGraphError::kernel("linear map expects one input tile"))?;
        let out_rect = output.rect();
        if !out_rect.subset_of(input.rect()) {
            return Err(TileGraphError::kernel(
                "input tile does not cover the output region",
            ));
        }

        let channels = output.channels();
        let dx = out_rect.left - input.rect().left;
        let dy = out_rect.top - input.rect().top;
        for y in 0..out_rect.height {
            for x in 0..out_rect.width {
                for c in 0..channels {
                    let v = input.value_at(x + dx, y + dy, c);
                    output.set_value(x, y, c, self.factor * v + self.offset);
                }
            }
        }
        Ok(())
    }
}
