use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub type ColorValue = u8; // Color channel value (0-255)
pub type ColorIdx = u8; // Index into a palette (0 = transparent)
pub type TileIdx = u16; // Index into a tileset's tile list (0 = empty)
pub type ColorRGB = (ColorValue, ColorValue, ColorValue);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ColorRGB", into = "ColorRGB")]
pub struct Color {
    pub r: ColorValue,
    pub g: ColorValue,
    pub b: ColorValue,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: ColorValue, g: ColorValue, b: ColorValue) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 0xFF]
    }

    pub fn from_rgba(px: [u8; 4]) -> Self {
        Self::new(px[0], px[1], px[2])
    }
}

impl From<ColorRGB> for Color {
    fn from((r, g, b): ColorRGB) -> Self {
        Color::new(r, g, b)
    }
}

impl From<Color> for ColorRGB {
    fn from(c: Color) -> Self {
        (c.r, c.g, c.b)
    }
}

bitflags! {
    /// Per-tile and per-sprite orientation and priority flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TileFlags: u16 {
        const FLIP_X = 0x8000;
        const FLIP_Y = 0x4000;
        /// Transpose the picture (swap axes) before flipping.
        const ROTATE = 0x2000;
        const PRIORITY = 0x1000;
    }
}

impl Default for TileFlags {
    fn default() -> Self {
        TileFlags::empty()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tile {
    pub index: TileIdx,
    pub flags: TileFlags,
}

impl Tile {
    pub const EMPTY: Tile = Tile {
        index: 0,
        flags: TileFlags::empty(),
    };

    pub fn new(index: TileIdx) -> Self {
        Self {
            index,
            flags: TileFlags::empty(),
        }
    }

    pub fn with_flags(index: TileIdx, flags: TileFlags) -> Self {
        Self { index, flags }
    }

    pub fn is_empty(&self) -> bool {
        self.index == 0
    }

    // Packed layout: low word is the index, high word the flags.
    pub fn from_bits(w: u32) -> Self {
        Self {
            index: (w & 0xFFFF) as TileIdx,
            flags: TileFlags::from_bits_truncate((w >> 16) as u16),
        }
    }

    pub fn to_bits(self) -> u32 {
        self.index as u32 | (self.flags.bits() as u32) << 16
    }
}

/// Rectangle with exclusive right/bottom edges.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_bits() {
        let tile = Tile::with_flags(37, TileFlags::FLIP_X | TileFlags::PRIORITY);
        assert_eq!(tile.to_bits(), 37 | 0x9000 << 16);
        assert_eq!(Tile::from_bits(tile.to_bits()), tile);
        assert!(Tile::from_bits(0x8000_0000).is_empty());
    }

    #[test]
    fn test_color_serializes_as_triple() {
        let json = serde_json::to_string(&Color::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let c: Color = serde_json::from_str("[255,0,128]").unwrap();
        assert_eq!(c, Color::new(255, 0, 128));
    }

    #[test]
    fn test_rect_edges_are_exclusive() {
        let r = Rect::new(2, 2, 4, 6);
        assert!(r.contains(2, 2));
        assert!(r.contains(3, 5));
        assert!(!r.contains(4, 2));
        assert!(!r.contains(2, 6));
        assert_eq!((r.width(), r.height()), (2, 4));
    }
}
