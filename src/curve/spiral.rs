//! Square spiral over a cell box, and the Hilbert-spiral composition used by
//! sink merge tasks: the spiral walks fixed-size blocks outward from a start
//! cell, and each block is swept by a directed gilbert walk so that entry
//! edges line up with the spiral's travel direction.

use crate::curve::gilbert::{Axis, GilbertWalk};

/// Which side of the spiral ring a cell was emitted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SpiralSide {
    Right,
    Bottom,
    Left,
    Top,
}

/// One spiral cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SpiralCell {
    pub(crate) side: SpiralSide,
    pub(crate) x: i64,
    pub(crate) y: i64,
}

fn clamped_dif(minuend: i64, subtrahend: i64, min: i64, max: i64) -> i64 {
    if minuend >= min + subtrahend {
        (minuend - subtrahend).min(max)
    } else {
        min
    }
}

/// Emit every cell of `[x_min, x_max] x [y_min, y_max]` exactly once,
/// spiralling outward from `(x_start, y_start)`.
pub(crate) fn simple_spiral(
    x_start: i64,
    y_start: i64,
    x_min: i64,
    y_min: i64,
    x_max: i64,
    y_max: i64,
    mut emit: impl FnMut(SpiralCell),
) {
    debug_assert!(x_min <= x_start && x_start <= x_max);
    debug_assert!(y_min <= y_start && y_start <= y_max);

    emit(SpiralCell {
        side: SpiralSide::Top,
        x: x_start,
        y: y_start,
    });
    let maximum = (x_start - x_min)
        .max(x_max - x_start)
        .max(y_start - y_min)
        .max(y_max - y_start)
        .max(0);

    for i in 1..=maximum {
        let x2 = x_start + i;
        let y2 = y_start + i;
        let right1 = x2 <= x_max;
        let bottom = y2 <= y_max;
        let left = x_start >= x_min + i;
        let top = y_start >= y_min + i;
        let right2 = x2 + 1 <= x_max;

        let x1c = clamped_dif(x_start + i64::from(left), i, x_min, x_max);
        let y1c = if y_start >= y_min + i { y_start - i } else { y_min };
        let y2c = y2.min(y_max);

        if right1 {
            for y in y_start..=y2c {
                emit(SpiralCell {
                    side: SpiralSide::Right,
                    x: x2,
                    y,
                });
            }
        }
        if bottom {
            let mut x = clamped_dif(x2, i64::from(right1), x_min, x_max);
            loop {
                emit(SpiralCell {
                    side: SpiralSide::Bottom,
                    x,
                    y: y2,
                });
                if x == x1c {
                    break;
                }
                x -= 1;
            }
        }
        if left {
            let x1 = x_start - i;
            let mut y = y2c;
            loop {
                emit(SpiralCell {
                    side: SpiralSide::Left,
                    x: x1,
                    y,
                });
                if y == y1c {
                    break;
                }
                y -= 1;
            }
        }
        if top {
            let y1 = y_start - i;
            let x2c = (x2 + 1 - i64::from(right2)).min(x_max);
            for x in x1c..=x2c {
                emit(SpiralCell {
                    side: SpiralSide::Top,
                    x,
                    y: y1,
                });
            }
        }
        if right2 {
            for y in y1c..y_start {
                emit(SpiralCell {
                    side: SpiralSide::Right,
                    x: x2 + 1,
                    y,
                });
            }
        }
    }
}

/// One spiral block expanded into directed-gilbert parameters.
#[derive(Clone, Copy, Debug)]
struct BlockWalk {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    axis: Axis,
}

/// Lazy iterator over the cells of `[x_min, x_max] x [y_min, y_max]`,
/// spiralling outward from `(x_start, y_start)` in blocks of
/// `block_width x block_height` cells, each block covered in gilbert order.
#[derive(Debug)]
pub(crate) struct HilbertSpiralWalk {
    blocks: std::vec::IntoIter<BlockWalk>,
    current: Option<GilbertWalk>,
}

impl HilbertSpiralWalk {
    pub(crate) fn new(
        x_start: i64,
        y_start: i64,
        x_min: i64,
        y_min: i64,
        x_max: i64,
        y_max: i64,
        block_width: i64,
        block_height: i64,
    ) -> Self {
        let mut blocks = Vec::new();
        if x_max >= x_min && y_max >= y_min && block_width > 0 && block_height > 0 {
            debug_assert!(x_min <= x_start && x_start <= x_max);
            debug_assert!(y_min <= y_start && y_start <= y_max);

            let x_max0 = x_max - x_min;
            let y_max0 = y_max - y_min;
            let width = x_max0 + 1;
            let height = y_max0 + 1;

            // The spiral ranges over whole blocks anchored at (x_min, y_min);
            // edge blocks are trimmed to the box.
            simple_spiral(
                (x_start - x_min) / block_width,
                (y_start - y_min) / block_height,
                0,
                0,
                x_max0 / block_width,
                y_max0 / block_height,
                |cell| {
                    let current_width =
                        ((cell.x + 1) * block_width).min(width) - cell.x * block_width;
                    let current_height =
                        ((cell.y + 1) * block_height).min(height) - cell.y * block_height;
                    let left = x_min + cell.x * block_width;
                    let top = y_min + cell.y * block_height;
                    blocks.push(match cell.side {
                        SpiralSide::Right | SpiralSide::Top => BlockWalk {
                            x: left,
                            y: top,
                            width: current_width,
                            height: current_height,
                            axis: if cell.side == SpiralSide::Right {
                                Axis::Y
                            } else {
                                Axis::X
                            },
                        },
                        SpiralSide::Bottom | SpiralSide::Left => BlockWalk {
                            x: left + current_width - 1,
                            y: top + current_height - 1,
                            width: -current_width,
                            height: -current_height,
                            axis: if cell.side == SpiralSide::Bottom {
                                Axis::X
                            } else {
                                Axis::Y
                            },
                        },
                    });
                },
            );
        }
        Self {
            blocks: blocks.into_iter(),
            current: None,
        }
    }
}

impl Iterator for HilbertSpiralWalk {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<(i64, i64)> {
        loop {
            if let Some(walk) = &mut self.current {
                if let Some(cell) = walk.next() {
                    return Some(cell);
                }
                self.current = None;
            }
            let b = self.blocks.next()?;
            self.current = Some(GilbertWalk::directed(b.x, b.y, b.width, b.height, b.axis));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn spiral_cells(
        start: (i64, i64),
        min: (i64, i64),
        max: (i64, i64),
    ) -> Vec<(i64, i64)> {
        let mut out = Vec::new();
        simple_spiral(start.0, start.1, min.0, min.1, max.0, max.1, |c| {
            out.push((c.x, c.y));
        });
        out
    }

    #[test]
    fn spiral_starts_at_the_start_cell_and_covers_the_box_once() {
        for (start, min, max) in [
            ((2, 2), (0, 0), (4, 4)),
            ((0, 0), (0, 0), (3, 2)),
            ((3, 1), (1, 0), (5, 6)),
            ((5, 6), (5, 6), (5, 6)),
        ] {
            let cells = spiral_cells(start, min, max);
            assert_eq!(cells[0], start);

            let expected = ((max.0 - min.0 + 1) * (max.1 - min.1 + 1)) as usize;
            assert_eq!(cells.len(), expected, "{start:?} {min:?} {max:?}");
            let unique: HashSet<_> = cells.iter().copied().collect();
            assert_eq!(unique.len(), cells.len(), "{start:?} {min:?} {max:?}");
            for &(x, y) in &cells {
                assert!(x >= min.0 && x <= max.0 && y >= min.1 && y <= max.1);
            }
        }
    }

    #[test]
    fn spiral_rings_grow_outward_from_the_start() {
        let cells = spiral_cells((2, 2), (0, 0), (4, 4));
        let ring = |(x, y): (i64, i64)| (x - 2).abs().max((y - 2).abs());
        let mut max_ring_seen = 0;
        for &c in &cells {
            // A cell of ring r may only appear once every ring < r has begun.
            assert!(ring(c) <= max_ring_seen + 1);
            max_ring_seen = max_ring_seen.max(ring(c));
        }
        assert_eq!(max_ring_seen, 2);
    }

    #[test]
    fn hilbert_spiral_covers_the_box_once() {
        let cells: Vec<(i64, i64)> =
            HilbertSpiralWalk::new(5, 4, 0, 0, 9, 7, 2, 2).collect();
        assert_eq!(cells.len(), 80);
        let unique: HashSet<_> = cells.iter().copied().collect();
        assert_eq!(unique.len(), cells.len());
        for &(x, y) in &cells {
            assert!((0..=9).contains(&x) && (0..=7).contains(&y));
        }
    }

    #[test]
    fn hilbert_spiral_with_unit_blocks_starts_at_the_start_cell() {
        let mut walk = HilbertSpiralWalk::new(3, 2, 0, 0, 5, 5, 1, 1);
        assert_eq!(walk.next(), Some((3, 2)));
    }

    #[test]
    fn hilbert_spiral_trims_edge_blocks() {
        // 5x5 box in 2x2 blocks: the rightmost/bottom blocks are 1 wide/tall.
        let cells: Vec<(i64, i64)> = HilbertSpiralWalk::new(0, 0, 0, 0, 4, 4, 2, 2).collect();
        assert_eq!(cells.len(), 25);
        let unique: HashSet<_> = cells.iter().copied().collect();
        assert_eq!(unique.len(), 25);
    }
}
