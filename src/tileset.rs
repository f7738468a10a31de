use serde::{Deserialize, Serialize};

use crate::{
    arena::Handle,
    common::{ColorIdx, TileIdx},
    error::{Error, Result},
    palette::Palette,
    sequence::SequencePack,
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileAttributes {
    #[serde(rename = "type", default)]
    pub tile_type: u8,
    #[serde(default)]
    pub priority: bool,
}

/// Fixed-size indexed tiles. Entry 0 is always blank; real tiles are
/// `1..=num_tiles`.
#[derive(Clone, Debug)]
pub struct Tileset {
    tile_width: usize,
    tile_height: usize,
    pixels: Vec<ColorIdx>,
    attributes: Vec<TileAttributes>,
    palette: Handle<Palette>,
    sequence_pack: Option<Handle<SequencePack>>,
}

impl Tileset {
    pub fn new(
        num_tiles: usize,
        tile_width: usize,
        tile_height: usize,
        palette: Handle<Palette>,
    ) -> Result<Self> {
        if num_tiles == 0 || tile_width == 0 || tile_height == 0 {
            return Err(Error::WrongSize(format!(
                "{} tiles of {}x{}",
                num_tiles, tile_width, tile_height
            )));
        }
        if num_tiles >= TileIdx::MAX as usize {
            return Err(Error::WrongSize(format!("{} tiles", num_tiles)));
        }
        Ok(Self {
            tile_width,
            tile_height,
            pixels: vec![0; (num_tiles + 1) * tile_width * tile_height],
            attributes: vec![TileAttributes::default(); num_tiles + 1],
            palette,
            sequence_pack: None,
        })
    }

    pub fn num_tiles(&self) -> usize {
        self.attributes.len() - 1
    }

    pub fn tile_width(&self) -> usize {
        self.tile_width
    }

    pub fn tile_height(&self) -> usize {
        self.tile_height
    }

    fn tile_size(&self) -> usize {
        self.tile_width * self.tile_height
    }

    fn check_entry(&self, entry: usize) -> Result<()> {
        if entry == 0 || entry > self.num_tiles() {
            return Err(Error::IdxPicture(entry));
        }
        Ok(())
    }

    /// Replaces the pixels of one tile; `data` rows are `pitch` bytes apart.
    pub fn set_pixels(&mut self, entry: usize, data: &[ColorIdx], pitch: usize) -> Result<()> {
        self.check_entry(entry)?;
        let (w, h) = (self.tile_width, self.tile_height);
        if pitch < w || data.len() < pitch * (h - 1) + w {
            return Err(Error::WrongSize(format!(
                "{} bytes with pitch {} for a {}x{} tile",
                data.len(),
                pitch,
                w,
                h
            )));
        }
        let base = entry * self.tile_size();
        for y in 0..h {
            self.pixels[base + y * w..base + (y + 1) * w]
                .copy_from_slice(&data[y * pitch..y * pitch + w]);
        }
        Ok(())
    }

    pub fn copy_tile(&mut self, src: usize, dst: usize) -> Result<()> {
        if src > self.num_tiles() {
            return Err(Error::IdxPicture(src));
        }
        self.check_entry(dst)?;
        let size = self.tile_size();
        self.pixels
            .copy_within(src * size..(src + 1) * size, dst * size);
        Ok(())
    }

    pub fn tile_pixels(&self, entry: usize) -> Option<&[ColorIdx]> {
        if entry > self.num_tiles() {
            return None;
        }
        let size = self.tile_size();
        Some(&self.pixels[entry * size..(entry + 1) * size])
    }

    /// Pixel of a tile in tile-local coordinates, 0 when out of range.
    pub fn pixel(&self, entry: usize, x: usize, y: usize) -> ColorIdx {
        if x >= self.tile_width || y >= self.tile_height {
            return 0;
        }
        self.pixels
            .get(entry * self.tile_size() + y * self.tile_width + x)
            .copied()
            .unwrap_or(0)
    }

    pub fn attributes(&self, entry: usize) -> Option<TileAttributes> {
        self.attributes.get(entry).copied()
    }

    pub fn set_attributes(&mut self, entry: usize, attributes: TileAttributes) -> Result<()> {
        self.check_entry(entry)?;
        self.attributes[entry] = attributes;
        Ok(())
    }

    pub fn palette(&self) -> Handle<Palette> {
        self.palette
    }

    pub fn set_palette(&mut self, palette: Handle<Palette>) {
        self.palette = palette;
    }

    pub fn sequence_pack(&self) -> Option<Handle<SequencePack>> {
        self.sequence_pack
    }

    pub fn set_sequence_pack(&mut self, pack: Option<Handle<SequencePack>>) {
        self.sequence_pack = pack;
    }
}
