use crate::cache::TileCache;
use crate::foundation::error::{TileGraphError, TileGraphResult};
use crate::foundation::geom::{Dimensions, Rect};
use crate::node::{DurationEstimator, MemoryMode, OutNode, SharedOutNode, SharedTile};
use crate::tile::{PixelFormat, Tile};

/// 3x3 box mean over the input, clamped at the image border.
///
/// Needs a one-pixel apron around every output region, so its input region
/// is the extended rectangle clipped to the input. Flagged cache-important:
/// recomputing area filters is what the cache exists to avoid.
pub struct MeanFilterNode {
    input: SharedOutNode,
    change_probability: f64,
    cache: TileCache,
    timing: DurationEstimator,
}

impl MeanFilterNode {
    /// Smooth `input` with a 3x3 box mean.
    pub fn new(input: SharedOutNode) -> Self {
        Self {
            input,
            change_probability: 0.0,
            cache: TileCache::disabled(),
            timing: DurationEstimator::new(),
        }
    }

    /// Declare the filter's edit probability for the annealer.
    pub fn with_change_probability(mut self, probability: f64) -> Self {
        self.change_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl OutNode for MeanFilterNode {
    fn label(&self) -> &str {
        "mean-filter"
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
        out_rect.extend_all(1)
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

    fn is_cache_important(&self) -> bool {
        true
    }

    fn compute(&self, inputs: &[SharedTile], output: &mut Tile) -> TileGraphResult<()> {
        let input = inputs
            .first()
            .ok_or_else(|| TileGraphError::kernel("mean filter expects one input tile"))?;
        let in_rect = input.rect();
        let out_rect = output.rect();
        if out_rect.clip(in_rect) != out_rect {
            return Err(TileGraphError::kernel(
                "input tile does not cover the output region",
            ));
        }

        let channels = output.channels();
        for y in 0..out_rect.height {
            for x in 0..out_rect.width {
                let abs_x = out_rect.left + x;
                let abs_y = out_rect.top + y;
                // Neighborhood clamped to the available input pixels.
                let x_begin = abs_x.saturating_sub(1).max(in_rect.left);
                let y_begin = abs_y.saturating_sub(1).max(in_rect.top);
                let x_end = (abs_x + 2).min(in_rect.right());
                let y_end = (abs_y + 2).min(in_rect.bottom());
                let count = ((x_end - x_begin) * (y_end - y_begin)) as f64;

                for c in 0..channels {
                    let mut sum = 0.0;
                    for iy in y_begin..y_end {
                        for ix in x_begin..x_end {
                            sum += input.value_at(ix - in_rect.left, iy - in_rect.top, c);
                        }
                    }
                    output.set_value(x, y, c, sum / count);
                }
            }
        }
        Ok(())
    }
}
