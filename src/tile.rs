//! Tiles: rectangular pixel regions with channels-major storage.

use crate::foundation::error::{TileGraphError, TileGraphResult};
use crate::foundation::geom::{Dimensions, Rect};

/// Element type of a tile buffer.
///
/// The engine is format-erased: nodes declare one of these formats and the
/// executor only ever needs the element width in bytes.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum PixelFormat {
    /// Unsigned 8-bit elements.
    U8,
    /// Unsigned 16-bit elements.
    U16,
    /// 32-bit float elements.
    F32,
}

impl PixelFormat {
    /// Width of one element in bytes.
    pub fn bytes_per_element(self) -> usize {
        match self {
            PixelFormat::U8 => 1,
            PixelFormat::U16 => 2,
            PixelFormat::F32 => 4,
        }
    }
}

/// Backing storage for a tile, tagged by element type.
#[derive(Clone, Debug, PartialEq)]
pub enum TileBuffer {
    /// 8-bit storage.
    U8(Vec<u8>),
    /// 16-bit storage.
    U16(Vec<u16>),
    /// Float storage.
    F32(Vec<f32>),
}

impl TileBuffer {
    fn zeroed(format: PixelFormat, len: usize) -> Self {
        match format {
            PixelFormat::U8 => TileBuffer::U8(vec![0; len]),
            PixelFormat::U16 => TileBuffer::U16(vec![0; len]),
            PixelFormat::F32 => TileBuffer::F32(vec![0.0; len]),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            TileBuffer::U8(v) => v.len(),
            TileBuffer::U16(v) => v.len(),
            TileBuffer::F32(v) => v.len(),
        }
    }

    /// Return `true` when the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of this buffer.
    pub fn format(&self) -> PixelFormat {
        match self {
            TileBuffer::U8(_) => PixelFormat::U8,
            TileBuffer::U16(_) => PixelFormat::U16,
            TileBuffer::F32(_) => PixelFormat::F32,
        }
    }
}

/// A rectangular region of an image plus its pixel data.
///
/// Storage is channels-major: element `(x, y, c)` lives at index
/// `channels * (x + width * y) + c`, with `x`/`y` local to the tile. Tiles
/// are immutable once published by a task and shared as `Arc<Tile>`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    rect: Rect,
    channels: usize,
    data: TileBuffer,
}

impl Tile {
    /// Zero-filled tile covering `rect`.
    pub fn zeroed(rect: Rect, channels: usize, format: PixelFormat) -> Self {
        Self {
            rect,
            channels,
            data: TileBuffer::zeroed(format, rect.area() * channels),
        }
    }

    /// Wrap an existing buffer; its length must equal `rect.area() * channels`.
    pub fn from_buffer(rect: Rect, channels: usize, data: TileBuffer) -> TileGraphResult<Self> {
        if data.len() != rect.area() * channels {
            return Err(TileGraphError::region(format!(
                "tile buffer holds {} elements, expected {}",
                data.len(),
                rect.area() * channels
            )));
        }
        Ok(Self {
            rect,
            channels,
            data,
        })
    }

    /// Region this tile covers, in image coordinates.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Extent of the tile.
    pub fn dims(&self) -> Dimensions {
        self.rect.dims()
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Element type.
    pub fn format(&self) -> PixelFormat {
        self.data.format()
    }

    /// Backing storage.
    pub fn buffer(&self) -> &TileBuffer {
        &self.data
    }

    /// Mutable backing storage.
    pub fn buffer_mut(&mut self) -> &mut TileBuffer {
        &mut self.data
    }

    /// Size of the pixel data in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len() * self.format().bytes_per_element()
    }

    fn index(&self, x: usize, y: usize, c: usize) -> usize {
        self.channels * (x + self.rect.width * y) + c
    }

    /// Read element `(x, y, c)` (tile-local coordinates) as `f64`.
    ///
    /// Integer formats are returned unnormalized. Panics when the
    /// coordinates are out of range.
    pub fn value_at(&self, x: usize, y: usize, c: usize) -> f64 {
        let i = self.index(x, y, c);
        match &self.data {
            TileBuffer::U8(v) => f64::from(v[i]),
            TileBuffer::U16(v) => f64::from(v[i]),
            TileBuffer::F32(v) => f64::from(v[i]),
        }
    }

    /// Write element `(x, y, c)`; integer formats round and clamp to their
    /// value range. Panics when the coordinates are out of range.
    pub fn set_value(&mut self, x: usize, y: usize, c: usize, value: f64) {
        let i = self.index(x, y, c);
        match &mut self.data {
            TileBuffer::U8(v) => v[i] = value.round().clamp(0.0, 255.0) as u8,
            TileBuffer::U16(v) => v[i] = value.round().clamp(0.0, 65535.0) as u16,
            TileBuffer::F32(v) => v[i] = value as f32,
        }
    }

    /// Copy the intersection of `other` into `self`, row by row.
    ///
    /// Channel counts and formats must match.
    pub fn copy_overlap(&mut self, other: &Tile) -> TileGraphResult<()> {
        if self.channels != other.channels {
            return Err(TileGraphError::region(format!(
                "cannot copy a tile with {} channels into a tile with {}",
                other.channels, self.channels
            )));
        }
        if self.format() != other.format() {
            return Err(TileGraphError::region(format!(
                "cannot copy a {:?} tile into a {:?} tile",
                other.format(),
                self.format()
            )));
        }

        let x_begin = self.rect.left.max(other.rect.left);
        let y_begin = self.rect.top.max(other.rect.top);
        let x_end = self.rect.right().min(other.rect.right());
        let y_end = self.rect.bottom().min(other.rect.bottom());
        if x_end <= x_begin || y_end <= y_begin {
            return Ok(());
        }

        let run = (x_end - x_begin) * self.channels;
        for y in y_begin..y_end {
            let dst = self.index(x_begin - self.rect.left, y - self.rect.top, 0);
            let src = other.index(x_begin - other.rect.left, y - other.rect.top, 0);
            match (&mut self.data, &other.data) {
                (TileBuffer::U8(d), TileBuffer::U8(s)) => {
                    d[dst..dst + run].copy_from_slice(&s[src..src + run]);
                }
                (TileBuffer::U16(d), TileBuffer::U16(s)) => {
                    d[dst..dst + run].copy_from_slice(&s[src..src + run]);
                }
                (TileBuffer::F32(d), TileBuffer::F32(s)) => {
                    d[dst..dst + run].copy_from_slice(&s[src..src + run]);
                }
                _ => unreachable!("formats checked above"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::geom::{Dimensions, Point};

    fn filled(rect: Rect, channels: usize, base: u8) -> Tile {
        let mut t = Tile::zeroed(rect, channels, PixelFormat::U8);
        for y in 0..rect.height {
            for x in 0..rect.width {
                for c in 0..channels {
                    let v = base as usize + x + 10 * y + 100 * c;
                    t.set_value(x, y, c, (v % 256) as f64);
                }
            }
        }
        t
    }

    #[test]
    fn from_buffer_validates_length() {
        let rect = Rect::from_dims(Dimensions::new(2, 2));
        assert!(Tile::from_buffer(rect, 3, TileBuffer::U8(vec![0; 12])).is_ok());
        assert!(Tile::from_buffer(rect, 3, TileBuffer::U8(vec![0; 11])).is_err());
    }

    #[test]
    fn copy_overlap_copies_exactly_the_intersection() {
        let mut dst = Tile::zeroed(Rect::from_dims(Dimensions::new(4, 4)), 2, PixelFormat::U8);
        let src = filled(Rect::new(Point::new(2, 2), Dimensions::new(4, 4)), 2, 1);

        dst.copy_overlap(&src).unwrap();

        // Intersection is [2, 2; 2, 2]: those pixels carry src values, the
        // rest stayed zero.
        for y in 0..4 {
            for x in 0..4 {
                for c in 0..2 {
                    let got = dst.value_at(x, y, c);
                    if x >= 2 && y >= 2 {
                        let want = src.value_at(x - 2, y - 2, c);
                        assert_eq!(got, want, "at ({x}, {y}, {c})");
                    } else {
                        assert_eq!(got, 0.0, "at ({x}, {y}, {c})");
                    }
                }
            }
        }
    }

    #[test]
    fn copy_overlap_rejects_channel_mismatch() {
        let mut dst = Tile::zeroed(Rect::from_dims(Dimensions::new(2, 2)), 1, PixelFormat::U8);
        let src = Tile::zeroed(Rect::from_dims(Dimensions::new(2, 2)), 3, PixelFormat::U8);
        assert!(dst.copy_overlap(&src).is_err());
    }

    #[test]
    fn copy_overlap_rejects_format_mismatch() {
        let mut dst = Tile::zeroed(Rect::from_dims(Dimensions::new(2, 2)), 1, PixelFormat::U8);
        let src = Tile::zeroed(Rect::from_dims(Dimensions::new(2, 2)), 1, PixelFormat::F32);
        assert!(dst.copy_overlap(&src).is_err());
    }

    #[test]
    fn set_value_clamps_integer_formats() {
        let mut t = Tile::zeroed(Rect::from_dims(Dimensions::new(1, 1)), 1, PixelFormat::U8);
        t.set_value(0, 0, 0, 300.0);
        assert_eq!(t.value_at(0, 0, 0), 255.0);
        t.set_value(0, 0, 0, -4.0);
        assert_eq!(t.value_at(0, 0, 0), 0.0);
    }
}
