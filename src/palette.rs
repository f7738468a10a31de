use serde::{Deserialize, Serialize};

use crate::{
    blend::{blend_channel, BlendMode},
    common::{Color, ColorIdx},
    error::{Error, Result},
};

pub const MAX_PALETTE_ENTRIES: usize = 256;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    #[serde(default)]
    pub name: String,
    colors: Vec<Color>,
}

/// Linear interpolation between two channel values, `factor` 0 = `a`, 255 = `b`.
pub fn mix_channel(a: u8, b: u8, factor: u8) -> u8 {
    let (a, b, f) = (a as u32, b as u32, factor as u32);
    ((a * (255 - f) + b * f + 127) / 255) as u8
}

pub fn mix_color(a: Color, b: Color, factor: u8) -> Color {
    Color::new(
        mix_channel(a.r, b.r, factor),
        mix_channel(a.g, b.g, factor),
        mix_channel(a.b, b.b, factor),
    )
}

fn check_entries(entries: usize) -> Result<()> {
    if entries == 0 || entries > MAX_PALETTE_ENTRIES {
        return Err(Error::WrongSize(format!(
            "palette must have 1-{} entries, got {}",
            MAX_PALETTE_ENTRIES, entries
        )));
    }
    Ok(())
}

impl Palette {
    /// Creates a palette with every entry black.
    pub fn new(entries: usize) -> Result<Self> {
        check_entries(entries)?;
        Ok(Self {
            name: String::new(),
            colors: vec![Color::BLACK; entries],
        })
    }

    pub fn from_colors(name: &str, colors: Vec<Color>) -> Result<Self> {
        check_entries(colors.len())?;
        Ok(Self {
            name: name.to_string(),
            colors,
        })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn color(&self, idx: ColorIdx) -> Option<Color> {
        self.colors.get(idx as usize).copied()
    }

    pub fn set_color(&mut self, idx: usize, color: Color) -> Result<()> {
        let entries = self.colors.len();
        let entry = self.colors.get_mut(idx).ok_or_else(|| {
            Error::WrongSize(format!("color {} outside palette of {}", idx, entries))
        })?;
        *entry = color;
        Ok(())
    }

    /// Sets every entry to the interpolation between `src1` and `src2`.
    pub fn mix(&mut self, src1: &Palette, src2: &Palette, factor: u8) -> Result<()> {
        if src1.len() != src2.len() || self.len() < src1.len() {
            return Err(Error::WrongSize(format!(
                "cannot mix palettes of {} and {} entries into {}",
                src1.len(),
                src2.len(),
                self.len()
            )));
        }
        for (dst, (&a, &b)) in self
            .colors
            .iter_mut()
            .zip(src1.colors.iter().zip(src2.colors.iter()))
        {
            *dst = mix_color(a, b, factor);
        }
        Ok(())
    }

    pub fn add_color(&mut self, color: Color, first: usize, count: usize) -> Result<()> {
        self.edit_range(BlendMode::Add, color, first, count)
    }

    pub fn sub_color(&mut self, color: Color, first: usize, count: usize) -> Result<()> {
        self.edit_range(BlendMode::Sub, color, first, count)
    }

    pub fn mul_color(&mut self, color: Color, first: usize, count: usize) -> Result<()> {
        self.edit_range(BlendMode::Mod, color, first, count)
    }

    fn edit_range(&mut self, mode: BlendMode, color: Color, first: usize, count: usize) -> Result<()> {
        let end = first
            .checked_add(count)
            .filter(|&end| end <= self.colors.len())
            .ok_or_else(|| {
                Error::WrongSize(format!(
                    "range {}+{} outside palette of {}",
                    first,
                    count,
                    self.colors.len()
                ))
            })?;
        for c in &mut self.colors[first..end] {
            c.r = blend_channel(mode, c.r, color.r);
            c.g = blend_channel(mode, c.g, color.g);
            c.b = blend_channel(mode, c.b, color.b);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn ramp(name: &str, f: impl Fn(u8) -> Color) -> Palette {
        Palette::from_colors(name, (0..16).map(|i| f(i * 17)).collect()).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_sizes() {
        assert_eq!(Palette::new(0).unwrap_err().kind(), ErrorKind::WrongSize);
        assert_eq!(Palette::new(257).unwrap_err().kind(), ErrorKind::WrongSize);
        let pal = Palette::new(256).unwrap();
        assert_eq!(pal.len(), 256);
        assert!(pal.colors().iter().all(|&c| c == Color::BLACK));
    }

    #[test]
    fn test_set_color_out_of_range_fails() {
        let mut pal = Palette::new(16).unwrap();
        pal.set_color(15, Color::WHITE).unwrap();
        assert_eq!(pal.color(15), Some(Color::WHITE));
        assert!(pal.set_color(16, Color::WHITE).is_err());
        assert_eq!(pal.color(16), None);
    }

    #[test]
    fn test_mix_endpoints_and_monotonic() {
        let a = ramp("a", |v| Color::new(v, 255 - v, 3));
        let b = ramp("b", |v| Color::new(255 - v, v / 2, 250));
        let mut out = Palette::new(16).unwrap();

        out.mix(&a, &b, 0).unwrap();
        assert_eq!(out.colors(), a.colors());
        out.mix(&a, &b, 255).unwrap();
        assert_eq!(out.colors(), b.colors());

        for i in 0..16 {
            let (ca, cb) = (a.colors()[i], b.colors()[i]);
            let mut prev = ca.r;
            for f in 0..=255u8 {
                let r = mix_color(ca, cb, f).r;
                if cb.r >= ca.r {
                    assert!(r >= prev && r <= cb.r);
                } else {
                    assert!(r <= prev && r >= cb.r);
                }
                prev = r;
            }
        }
    }

    #[test]
    fn test_mix_rejects_mismatched_sizes() {
        let a = Palette::new(16).unwrap();
        let b = Palette::new(8).unwrap();
        let mut out = Palette::new(16).unwrap();
        assert!(out.mix(&a, &b, 10).is_err());
    }

    #[test]
    fn test_fade_ops_clamp() {
        let mut pal = Palette::new(4).unwrap();
        pal.set_color(1, Color::new(200, 100, 10)).unwrap();
        pal.set_color(2, Color::new(200, 100, 10)).unwrap();

        pal.add_color(Color::new(100, 100, 100), 1, 1).unwrap();
        assert_eq!(pal.color(1), Some(Color::new(255, 200, 110)));

        pal.sub_color(Color::new(50, 150, 50), 2, 2).unwrap();
        assert_eq!(pal.color(2), Some(Color::new(150, 0, 0)));
        assert_eq!(pal.color(3), Some(Color::BLACK));

        pal.mul_color(Color::new(255, 0, 128), 1, 1).unwrap();
        assert_eq!(pal.color(1), Some(Color::new(255, 0, 55)));
        assert_eq!(pal.color(0), Some(Color::BLACK));
    }

    #[test]
    fn test_fade_range_checked() {
        let mut pal = Palette::new(4).unwrap();
        assert!(pal.add_color(Color::WHITE, 3, 2).is_err());
        assert!(pal.add_color(Color::WHITE, usize::MAX, 2).is_err());
        assert!(pal.add_color(Color::WHITE, 0, 4).is_ok());
    }
}
