use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    arena::Handle,
    bitmap::Bitmap,
    common::ColorIdx,
    error::{Error, Result},
    palette::Palette,
};

/// Named rectangle cut from the spriteset bitmap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteEntry {
    pub name: String,
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

#[derive(Clone, Debug)]
pub struct Spriteset {
    bitmap: Bitmap,
    entries: Vec<SpriteEntry>,
    names: HashMap<String, usize>,
    palette: Handle<Palette>,
}

impl Spriteset {
    /// Takes ownership of an 8bpp bitmap with an attached palette.
    pub fn new(bitmap: Bitmap, entries: Vec<SpriteEntry>) -> Result<Self> {
        if bitmap.bpp() != 8 {
            return Err(Error::Unsupported(format!(
                "{}bpp spriteset bitmap",
                bitmap.bpp()
            )));
        }
        let palette = bitmap.palette().ok_or(Error::RefPalette)?;
        let mut names = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            check_rect(&bitmap, entry)?;
            names.entry(entry.name.clone()).or_insert(i);
        }
        Ok(Self {
            bitmap,
            entries,
            names,
            palette,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn entries(&self) -> &[SpriteEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Result<&SpriteEntry> {
        self.entries.get(index).ok_or(Error::IdxPicture(index))
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Replaces one entry's rectangle, keeping its name.
    pub fn set_entry_rect(&mut self, index: usize, x: usize, y: usize, w: usize, h: usize) -> Result<()> {
        let name = self.entry(index)?.name.clone();
        let entry = SpriteEntry { name, x, y, w, h };
        check_rect(&self.bitmap, &entry)?;
        self.entries[index] = entry;
        Ok(())
    }

    /// Pixel of entry `index` in entry-local coordinates.
    pub(crate) fn pixel(&self, index: usize, x: usize, y: usize) -> ColorIdx {
        match self.entries.get(index) {
            Some(e) if x < e.w && y < e.h => self.bitmap.pixel(e.x + x, e.y + y).unwrap_or(0),
            _ => 0,
        }
    }

    pub fn palette(&self) -> Handle<Palette> {
        self.palette
    }
}

fn check_rect(bitmap: &Bitmap, entry: &SpriteEntry) -> Result<()> {
    let inside = entry.w > 0
        && entry.h > 0
        && entry.x + entry.w <= bitmap.width()
        && entry.y + entry.h <= bitmap.height();
    if !inside {
        return Err(Error::WrongSize(format!(
            "sprite '{}' ({}, {}, {}x{}) outside {}x{} bitmap",
            entry.name,
            entry.x,
            entry.y,
            entry.w,
            entry.h,
            bitmap.width(),
            bitmap.height()
        )));
    }
    Ok(())
}
