use crate::{
    arena::Handle,
    common::ColorIdx,
    error::{Error, Result},
    palette::Palette,
};

/// Raw pixel buffer. Rows are `pitch` bytes apart, padded to 4 bytes.
#[derive(Clone, Debug)]
pub struct Bitmap {
    width: usize,
    height: usize,
    bpp: u8,
    pitch: usize,
    data: Vec<u8>,
    palette: Option<Handle<Palette>>,
}

impl Bitmap {
    pub fn new(width: usize, height: usize, bpp: u8) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::WrongSize(format!("bitmap {}x{}", width, height)));
        }
        if ![8, 16, 24, 32].contains(&bpp) {
            return Err(Error::Unsupported(format!("{} bits per pixel", bpp)));
        }
        let pitch = ((width * bpp as usize / 8) + 3) & !3;
        Ok(Self {
            width,
            height,
            bpp,
            pitch,
            data: vec![0; pitch * height],
            palette: None,
        })
    }

    /// Builds an 8bpp bitmap from tightly packed indexed pixels.
    pub fn from_indexed(width: usize, height: usize, pixels: &[ColorIdx]) -> Result<Self> {
        let mut bitmap = Self::new(width, height, 8)?;
        if pixels.len() < width * height {
            return Err(Error::WrongSize(format!(
                "{} pixels for a {}x{} bitmap",
                pixels.len(),
                width,
                height
            )));
        }
        for (y, src) in pixels.chunks_exact(width).take(height).enumerate() {
            let start = y * bitmap.pitch;
            bitmap.data[start..start + width].copy_from_slice(src);
        }
        Ok(bitmap)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bpp(&self) -> u8 {
        self.bpp
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        Some(&self.data[y * self.pitch..(y + 1) * self.pitch])
    }

    pub fn row_mut(&mut self, y: usize) -> Option<&mut [u8]> {
        if y >= self.height {
            return None;
        }
        Some(&mut self.data[y * self.pitch..(y + 1) * self.pitch])
    }

    /// Palette index at (x, y) of an 8bpp bitmap.
    pub fn pixel(&self, x: usize, y: usize) -> Option<ColorIdx> {
        if self.bpp != 8 || x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y * self.pitch + x])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, value: ColorIdx) -> Result<()> {
        if self.bpp != 8 {
            return Err(Error::Unsupported(format!(
                "pixel write on {}bpp bitmap",
                self.bpp
            )));
        }
        if x >= self.width || y >= self.height {
            return Err(Error::WrongSize(format!(
                "pixel ({}, {}) outside {}x{} bitmap",
                x, y, self.width, self.height
            )));
        }
        self.data[y * self.pitch + x] = value;
        Ok(())
    }

    pub fn palette(&self) -> Option<Handle<Palette>> {
        self.palette
    }

    pub fn set_palette(&mut self, palette: Option<Handle<Palette>>) {
        self.palette = palette;
    }
}
