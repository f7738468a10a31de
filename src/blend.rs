use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::common::Color;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum BlendMode {
    #[default]
    None = 0,
    /// One third source, two thirds destination.
    Mix25 = 1,
    Mix50 = 2,
    /// Two thirds source, one third destination.
    Mix75 = 3,
    Add = 4,
    Sub = 5,
    Mod = 6,
    Custom = 7,
}

const TABLE_SIZE: usize = 1 << 16;
const NUM_TABLES: usize = 7;

/// Blends one channel of `src` over `dst`.
pub fn blend_channel(mode: BlendMode, src: u8, dst: u8) -> u8 {
    let (a, b) = (src as u32, dst as u32);
    match mode {
        BlendMode::None | BlendMode::Custom => src,
        BlendMode::Mix25 => ((a + b + b) / 3) as u8,
        BlendMode::Mix50 => ((a + b) >> 1) as u8,
        BlendMode::Mix75 => ((a + a + b) / 3) as u8,
        BlendMode::Add => (a + b).min(255) as u8,
        BlendMode::Sub => a.saturating_sub(b) as u8,
        BlendMode::Mod => (a * b / 255) as u8,
    }
}

/// Precomputed 256x256 lookup per blend mode, indexed by `src << 8 | dst`.
pub struct BlendTables {
    tables: Vec<Box<[u8]>>,
}

impl Default for BlendTables {
    fn default() -> Self {
        Self::new()
    }
}

impl BlendTables {
    pub fn new() -> Self {
        let modes = [
            BlendMode::Mix25,
            BlendMode::Mix50,
            BlendMode::Mix75,
            BlendMode::Add,
            BlendMode::Sub,
            BlendMode::Mod,
            BlendMode::Custom,
        ];
        let tables = modes
            .iter()
            .map(|&mode| build_table(|a, b| blend_channel(mode, a, b)))
            .collect();
        Self { tables }
    }

    /// Bakes a per-channel `(src, dst) -> out` function into the custom table.
    pub fn set_custom(&mut self, f: impl Fn(u8, u8) -> u8) {
        self.tables[NUM_TABLES - 1] = build_table(f);
    }

    pub fn table(&self, mode: BlendMode) -> Option<&[u8]> {
        match mode {
            BlendMode::None => None,
            m => self.tables.get(m as usize - 1).map(|t| &t[..]),
        }
    }

    pub fn blend(&self, mode: BlendMode, src: u8, dst: u8) -> u8 {
        match self.table(mode) {
            Some(table) => table[(src as usize) << 8 | dst as usize],
            None => src,
        }
    }
}

fn build_table(f: impl Fn(u8, u8) -> u8) -> Box<[u8]> {
    let mut table = vec![0; TABLE_SIZE];
    for a in 0..=255u8 {
        for b in 0..=255u8 {
            table[(a as usize) << 8 | b as usize] = f(a, b);
        }
    }
    table.into_boxed_slice()
}

/// Writes `color` into an RGBA destination pixel, blended through `table`.
pub fn put_pixel(table: Option<&[u8]>, color: Color, dst: &mut [u8]) {
    match table {
        None => dst[..4].copy_from_slice(&color.to_rgba()),
        Some(t) => {
            dst[0] = t[(color.r as usize) << 8 | dst[0] as usize];
            dst[1] = t[(color.g as usize) << 8 | dst[1] as usize];
            dst[2] = t[(color.b as usize) << 8 | dst[2] as usize];
            dst[3] = 0xFF;
        }
    }
}
