use serde::{Deserialize, Serialize};

use crate::{
    arena::Handle,
    bitmap::Bitmap,
    blend::BlendMode,
    common::{Rect, TileFlags, TileIdx},
    error::{Error, Result},
    objects::ObjectList,
    palette::Palette,
    spriteset::Spriteset,
    tilemap::Tilemap,
    tileset::Tileset,
};

/// Rotation (degrees) around (dx, dy) in screen space, then scaling.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub angle: f32,
    pub dx: f32,
    pub dy: f32,
    pub sx: f32,
    pub sy: f32,
}

/// Source displacement for one destination pixel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelMap {
    pub dx: i16,
    pub dy: i16,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LayerMode {
    #[default]
    Normal,
    Scaling {
        sx: f32,
        sy: f32,
    },
    Affine(Affine),
    /// One entry per framebuffer pixel, row-major.
    PixelMap(Vec<PixelMap>),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LayerSource {
    #[default]
    None,
    Tiles {
        tileset: Handle<Tileset>,
        tilemap: Handle<Tilemap>,
    },
    Bitmap(Handle<Bitmap>),
    /// Objects drawn with pictures of `spriteset`; scroll only, no wrapping.
    Objects {
        list: Handle<ObjectList>,
        spriteset: Handle<Spriteset>,
    },
}

/// World-position multiplier used by `Scene::set_world_position`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parallax {
    pub factor_x: f32,
    pub factor_y: f32,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Default for Parallax {
    fn default() -> Self {
        Self {
            factor_x: 1.0,
            factor_y: 1.0,
            offset_x: 0,
            offset_y: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TileInfo {
    pub index: TileIdx,
    pub flags: TileFlags,
    pub row: usize,
    pub col: usize,
    pub xoffset: usize,
    pub yoffset: usize,
    /// Palette index of the pixel under the queried point.
    pub color: u8,
    pub tile_type: u8,
    pub empty: bool,
}

#[derive(Clone, Debug)]
pub struct Layer {
    source: LayerSource,
    palette: Option<Handle<Palette>>,
    screen: (i32, i32),
    width: i32,
    height: i32,
    hstart: i32,
    vstart: i32,
    mode: LayerMode,
    column_offsets: Option<Vec<i32>>,
    clip: Rect,
    mosaic: Option<(i32, i32)>,
    blend: BlendMode,
    priority: bool,
    parent: Option<usize>,
    parallax: Parallax,
    enabled: bool,
}

impl Layer {
    pub fn new(screen_width: usize, screen_height: usize) -> Self {
        let screen = (screen_width as i32, screen_height as i32);
        Self {
            source: LayerSource::None,
            palette: None,
            screen,
            width: 0,
            height: 0,
            hstart: 0,
            vstart: 0,
            mode: LayerMode::Normal,
            column_offsets: None,
            clip: Rect::new(0, 0, screen.0, screen.1),
            mosaic: None,
            blend: BlendMode::None,
            priority: false,
            parent: None,
            parallax: Parallax::default(),
            enabled: false,
        }
    }

    /// Binds a new source of `width` x `height` pixels and enables the layer.
    pub(crate) fn bind(&mut self, source: LayerSource, width: usize, height: usize) {
        self.source = source;
        self.width = width as i32;
        self.height = height as i32;
        self.hstart = self.hstart.rem_euclid(self.width.max(1));
        self.vstart = self.vstart.rem_euclid(self.height.max(1));
        self.enabled = source != LayerSource::None;
    }

    pub fn source(&self) -> LayerSource {
        self.source
    }

    pub fn palette(&self) -> Option<Handle<Palette>> {
        self.palette
    }

    pub fn set_palette(&mut self, palette: Option<Handle<Palette>>) {
        self.palette = palette;
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    pub fn height(&self) -> usize {
        self.height as usize
    }

    pub fn position(&self) -> (i32, i32) {
        (self.hstart, self.vstart)
    }

    /// Scroll position, wrapped into the layer size.
    pub fn set_position(&mut self, hstart: i32, vstart: i32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::RefTilemap);
        }
        self.hstart = hstart.rem_euclid(self.width);
        self.vstart = vstart.rem_euclid(self.height);
        Ok(())
    }

    pub fn mode(&self) -> &LayerMode {
        &self.mode
    }

    pub fn set_scaling(&mut self, sx: f32, sy: f32) -> Result<()> {
        if !(sx > 0.0 && sy > 0.0) {
            return Err(Error::WrongSize(format!("scaling {}x{}", sx, sy)));
        }
        self.mode = LayerMode::Scaling { sx, sy };
        Ok(())
    }

    pub fn set_affine(&mut self, affine: Affine) -> Result<()> {
        if affine.sx == 0.0 || affine.sy == 0.0 {
            return Err(Error::WrongSize(format!(
                "affine scale {}x{}",
                affine.sx, affine.sy
            )));
        }
        self.mode = LayerMode::Affine(affine);
        Ok(())
    }

    pub fn set_pixel_map(&mut self, table: Vec<PixelMap>) -> Result<()> {
        let expected = (self.screen.0 * self.screen.1) as usize;
        if table.len() != expected {
            return Err(Error::WrongSize(format!(
                "pixel map of {} entries, expected {}",
                table.len(),
                expected
            )));
        }
        self.mode = LayerMode::PixelMap(table);
        Ok(())
    }

    pub fn reset_mode(&mut self) {
        self.mode = LayerMode::Normal;
    }

    pub fn column_offsets(&self) -> Option<&[i32]> {
        self.column_offsets.as_deref()
    }

    pub fn set_column_offsets(&mut self, offsets: Option<Vec<i32>>) {
        self.column_offsets = offsets;
    }

    pub fn clip(&self) -> Rect {
        self.clip
    }

    /// Out-of-screen edges fall back to the screen border.
    pub fn set_clip(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        let (w, h) = self.screen;
        let pick = |v: i32, max: i32, fallback: i32| if (0..=max).contains(&v) { v } else { fallback };
        self.clip = Rect::new(pick(x1, w, 0), pick(y1, h, 0), pick(x2, w, w), pick(y2, h, h));
    }

    pub fn disable_clip(&mut self) {
        self.clip = Rect::new(0, 0, self.screen.0, self.screen.1);
    }

    pub fn mosaic(&self) -> Option<(i32, i32)> {
        self.mosaic
    }

    pub fn set_mosaic(&mut self, width: i32, height: i32) -> Result<()> {
        if width <= 0 || height <= 0 {
            return Err(Error::WrongSize(format!("mosaic {}x{}", width, height)));
        }
        self.mosaic = Some((width, height));
        Ok(())
    }

    pub fn disable_mosaic(&mut self) {
        self.mosaic = None;
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    pub fn set_blend(&mut self, blend: BlendMode) {
        self.blend = blend;
    }

    pub fn priority(&self) -> bool {
        self.priority
    }

    pub fn set_priority(&mut self, priority: bool) {
        self.priority = priority;
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<usize>) {
        self.parent = parent;
    }

    pub fn parallax(&self) -> Parallax {
        self.parallax
    }

    pub fn set_parallax(&mut self, parallax: Parallax) {
        self.parallax = parallax;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled && self.source != LayerSource::None;
    }

    /// Layer-space point sampled by screen pixel (`x`, `line`), wrapped into
    /// the layer. `column_width` is the width covered by one column offset.
    pub fn source_point(&self, x: i32, line: i32, column_width: i32) -> (i32, i32) {
        let (x, line) = match self.mosaic {
            Some((mw, mh)) => (x - (x - self.clip.x1).rem_euclid(mw), line - line.rem_euclid(mh)),
            None => (x, line),
        };
        let column_offset = |x: i32| -> i64 {
            let Some(offsets) = &self.column_offsets else {
                return 0;
            };
            let column = (self.hstart.rem_euclid(column_width.max(1)) + x) / column_width.max(1);
            offsets.get(column as usize).copied().map_or(0, i64::from)
        };
        let (hstart, vstart) = (i64::from(self.hstart), i64::from(self.vstart));
        let (x64, line64) = (i64::from(x), i64::from(line));
        let (sx, sy): (i64, i64) = match &self.mode {
            LayerMode::Normal => (hstart + x64, vstart + line64 + column_offset(x)),
            LayerMode::Scaling { sx, sy } => (
                hstart + (x as f32 / sx).floor() as i64,
                vstart + ((line64 + column_offset(x)) as f32 / sy).floor() as i64,
            ),
            LayerMode::Affine(a) => {
                let (px, py) = ((hstart + x64) as f32 - a.dx, (vstart + line64) as f32 - a.dy);
                let (sin, cos) = (-a.angle).to_radians().sin_cos();
                let rx = px * cos - py * sin;
                let ry = px * sin + py * cos;
                (
                    (rx / a.sx + a.dx).floor() as i64,
                    (ry / a.sy + a.dy).floor() as i64,
                )
            }
            LayerMode::PixelMap(table) => {
                let m = table
                    .get((line * self.screen.0 + x) as usize)
                    .copied()
                    .unwrap_or_default();
                (hstart + i64::from(m.dx), vstart + i64::from(m.dy))
            }
        };
        (
            sx.rem_euclid(i64::from(self.width.max(1))) as i32,
            sy.rem_euclid(i64::from(self.height.max(1))) as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn layer(width: usize, height: usize) -> Layer {
        let mut layer = Layer::new(8, 4);
        layer.width = width as i32;
        layer.height = height as i32;
        layer
    }

    #[test]
    fn test_position_wraps() {
        let mut l = layer(64, 32);
        l.set_position(70, -1).unwrap();
        assert_eq!(l.position(), (6, 31));
        assert_eq!(
            Layer::new(8, 4).set_position(1, 1).unwrap_err().kind(),
            ErrorKind::RefTilemap
        );
    }

    #[test]
    fn test_modes_are_exclusive() {
        let mut l = layer(64, 32);
        l.set_scaling(2.0, 2.0).unwrap();
        l.set_affine(Affine {
            angle: 90.0,
            dx: 0.0,
            dy: 0.0,
            sx: 1.0,
            sy: 1.0,
        })
        .unwrap();
        assert!(matches!(l.mode(), LayerMode::Affine(_)));
        l.set_pixel_map(vec![PixelMap::default(); 32]).unwrap();
        assert!(matches!(l.mode(), LayerMode::PixelMap(_)));
        l.reset_mode();
        assert_eq!(l.mode(), &LayerMode::Normal);

        assert!(l.set_scaling(0.0, 1.0).is_err());
        assert!(l.set_pixel_map(vec![PixelMap::default(); 31]).is_err());
        assert_eq!(l.mode(), &LayerMode::Normal);
    }

    #[test]
    fn test_clip_falls_back_to_screen() {
        let mut l = layer(64, 32);
        assert_eq!(l.clip(), Rect::new(0, 0, 8, 4));
        l.set_clip(2, 1, 6, 3);
        assert_eq!(l.clip(), Rect::new(2, 1, 6, 3));
        l.set_clip(-5, 1, 99, 3);
        assert_eq!(l.clip(), Rect::new(0, 1, 8, 3));
        l.disable_clip();
        assert_eq!(l.clip(), Rect::new(0, 0, 8, 4));
    }

    #[test]
    fn test_normal_and_column_offsets() {
        let mut l = layer(64, 32);
        l.set_position(60, 30).unwrap();
        assert_eq!(l.source_point(0, 0, 8), (60, 30));
        assert_eq!(l.source_point(5, 3, 8), (1, 1));

        l.set_position(0, 0).unwrap();
        l.set_column_offsets(Some(vec![0, 10]));
        assert_eq!(l.source_point(7, 0, 8), (7, 0));
        assert_eq!(l.source_point(8, 0, 8), (8, 10));
    }

    #[test]
    fn test_scaling_and_pixel_map() {
        let mut l = layer(64, 32);
        l.set_scaling(2.0, 2.0).unwrap();
        assert_eq!(l.source_point(5, 3, 8), (2, 1));

        let mut table = vec![PixelMap::default(); 32];
        table[8 + 3] = PixelMap { dx: -4, dy: 2 };
        l.set_pixel_map(table).unwrap();
        assert_eq!(l.source_point(3, 1, 8), (60, 2));
        assert_eq!(l.source_point(4, 1, 8), (0, 0));
    }

    #[test]
    fn test_affine_rotation() {
        let mut l = layer(64, 64);
        l.set_affine(Affine {
            angle: 90.0,
            dx: 0.0,
            dy: 0.0,
            sx: 1.0,
            sy: 1.0,
        })
        .unwrap();
        // Sampling rotates by -90 degrees: (0, 4) -> (4, 0)
        let (x, y) = l.source_point(0, 4, 8);
        assert!((x - 4).abs() <= 1 && (y == 0 || y == 63));
    }

    #[test]
    fn test_mosaic_snaps_to_blocks() {
        let mut l = layer(64, 32);
        l.set_mosaic(4, 2).unwrap();
        assert_eq!(l.source_point(3, 1, 8), (0, 0));
        assert_eq!(l.source_point(5, 3, 8), (4, 2));
        assert!(l.set_mosaic(0, 2).is_err());
    }
}
