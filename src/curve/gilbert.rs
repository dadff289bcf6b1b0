//! Generalized Hilbert ("gilbert") curve for arbitrary rectangular grids,
//! after Červený's decomposition: a block is either a trivial row/column
//! fill, split lengthwise when strongly oblong, or split into the classic
//! step-up / sweep / step-down triple.

/// Traversal axis of a block's major dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Axis {
    /// Major runs horizontally.
    X,
    /// Major runs vertically.
    Y,
}

impl Axis {
    fn other(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

/// Pending sub-block, in the signed (origin, major extent, minor extent)
/// form of the recursive formulation.
#[derive(Clone, Copy, Debug)]
struct Block {
    x: i64,
    y: i64,
    major: i64,
    minor: i64,
    axis: Axis,
}

/// Straight run of cells currently being emitted.
#[derive(Clone, Copy, Debug)]
struct Run {
    x: i64,
    y: i64,
    dx: i64,
    dy: i64,
    remaining: u64,
}

/// Lazy iterator over the cells of a `width x height` grid in generalized
/// Hilbert order. Consecutive cells are always 4-neighbors.
#[derive(Debug)]
pub(crate) struct GilbertWalk {
    stack: Vec<Block>,
    run: Option<Run>,
}

impl GilbertWalk {
    /// Walk the grid anchored at `(x, y)`, major axis chosen from the shape.
    pub(crate) fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        let axis = if width >= height { Axis::X } else { Axis::Y };
        Self::directed(x, y, width, height, axis)
    }

    /// Walk with an explicit major axis; `width`/`height` may be negative to
    /// reverse the sweep direction (used by the spiral composition).
    pub(crate) fn directed(x: i64, y: i64, width: i64, height: i64, axis: Axis) -> Self {
        let (major, minor) = match axis {
            Axis::X => (width, height),
            Axis::Y => (height, width),
        };
        Self {
            stack: vec![Block {
                x,
                y,
                major,
                minor,
                axis,
            }],
            run: None,
        }
    }

    fn expand(&mut self, b: Block) {
        let major_dim = b.major.unsigned_abs();
        let minor_dim = b.minor.unsigned_abs();
        let major_step = b.major.signum();
        let minor_step = b.minor.signum();

        if minor_dim == 1 {
            let (dx, dy) = match b.axis {
                Axis::X => (major_step, 0),
                Axis::Y => (0, major_step),
            };
            self.run = Some(Run {
                x: b.x,
                y: b.y,
                dx,
                dy,
                remaining: major_dim,
            });
            return;
        }
        if major_dim == 1 {
            let (dx, dy) = match b.axis {
                Axis::X => (0, minor_step),
                Axis::Y => (minor_step, 0),
            };
            self.run = Some(Run {
                x: b.x,
                y: b.y,
                dx,
                dy,
                remaining: minor_dim,
            });
            return;
        }
        if major_dim == 0 || minor_dim == 0 {
            return;
        }

        let mut major2 = b.major / 2;
        let mut minor2 = b.minor / 2;

        if 2 * major_dim > 3 * minor_dim {
            // Prefer even splits.
            if major2.unsigned_abs() % 2 == 1 && major_dim > 2 {
                major2 += major_step;
            }

            // Strongly oblong: halve along the major axis only.
            let (x2, y2) = match b.axis {
                Axis::X => (b.x + major2, b.y),
                Axis::Y => (b.x, b.y + major2),
            };
            self.stack.push(Block {
                x: x2,
                y: y2,
                major: b.major - major2,
                minor: b.minor,
                axis: b.axis,
            });
            self.stack.push(Block {
                major: major2,
                ..b
            });
        } else {
            if minor2.unsigned_abs() % 2 == 1 && minor_dim > 2 {
                minor2 += minor_step;
            }

            // Step up, long sweep, step back down.
            let (x2, y2) = match b.axis {
                Axis::X => (b.x, b.y + minor2),
                Axis::Y => (b.x + minor2, b.y),
            };
            let (x3, y3) = match b.axis {
                Axis::X => (x2 + b.major - major_step, y2 - minor_step),
                Axis::Y => (x2 - minor_step, y2 + b.major - major_step),
            };
            self.stack.push(Block {
                x: x3,
                y: y3,
                major: -minor2,
                minor: major2 - b.major,
                axis: b.axis.other(),
            });
            self.stack.push(Block {
                x: x2,
                y: y2,
                major: b.major,
                minor: b.minor - minor2,
                axis: b.axis,
            });
            self.stack.push(Block {
                major: minor2,
                minor: major2,
                axis: b.axis.other(),
                ..b
            });
        }
    }
}

impl Iterator for GilbertWalk {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<(i64, i64)> {
        loop {
            if let Some(run) = &mut self.run {
                if run.remaining > 0 {
                    let cell = (run.x, run.y);
                    run.x += run.dx;
                    run.y += run.dy;
                    run.remaining -= 1;
                    return Some(cell);
                }
                self.run = None;
            }
            let block = self.stack.pop()?;
            self.expand(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn check_cover(width: i64, height: i64) {
        let cells: Vec<(i64, i64)> = GilbertWalk::new(0, 0, width, height).collect();
        assert_eq!(cells.len(), (width * height) as usize, "{width}x{height}");

        let unique: HashSet<_> = cells.iter().copied().collect();
        assert_eq!(unique.len(), cells.len(), "{width}x{height}: duplicates");
        for &(x, y) in &cells {
            assert!(x >= 0 && x < width && y >= 0 && y < height);
        }
        // Odd-by-odd grids contain exactly one diagonal step; everything
        // else moves in unit 4-neighbor steps.
        let mut diagonals = 0;
        for pair in cells.windows(2) {
            let (ax, ay) = pair[0];
            let (bx, by) = pair[1];
            let (dx, dy) = ((ax - bx).abs(), (ay - by).abs());
            assert!(
                dx <= 1 && dy <= 1 && dx + dy > 0,
                "{width}x{height}: non-adjacent step {pair:?}"
            );
            if dx + dy == 2 {
                diagonals += 1;
            }
        }
        if width % 2 == 0 || height % 2 == 0 {
            assert_eq!(diagonals, 0, "{width}x{height}: unexpected diagonal");
        } else {
            assert!(diagonals <= 1, "{width}x{height}: {diagonals} diagonals");
        }
    }

    #[test]
    fn covers_every_cell_exactly_once_with_unit_steps() {
        for (w, h) in [(1, 1), (1, 7), (6, 1), (4, 4), (5, 3), (3, 5), (8, 5), (13, 11)] {
            check_cover(w, h);
        }
    }

    #[test]
    fn respects_the_anchor_offset() {
        let cells: Vec<(i64, i64)> = GilbertWalk::new(10, 20, 3, 2).collect();
        assert_eq!(cells.len(), 6);
        assert!(cells.iter().all(|&(x, y)| (10..13).contains(&x) && (20..22).contains(&y)));
        assert_eq!(cells[0], (10, 20));
    }

    #[test]
    fn negative_extents_reverse_the_sweep() {
        let cells: Vec<(i64, i64)> = GilbertWalk::directed(2, 0, -3, 1, Axis::X).collect();
        assert_eq!(cells, vec![(2, 0), (1, 0), (0, 0)]);
    }
}
