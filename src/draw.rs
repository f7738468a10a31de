use log::warn;

use crate::{
    arena::Handle,
    blend::{put_pixel, BlendMode},
    common::{Color, Tile, TileFlags},
    layer::{Layer, LayerSource},
    palette::Palette,
    scene::Scene,
    tileset::Tileset,
};

const BYTES_PER_PIXEL: usize = 4;

/// Per-line scratch space reused across scanlines.
pub(crate) struct LineBuffers {
    /// Sprite owning each pixel, for collision detection.
    collision: Vec<Option<u16>>,
    /// Pixels of priority tiles from regular layers, drawn above sprites.
    priority: Vec<Option<(Color, BlendMode)>>,
    hits: Vec<usize>,
}

impl LineBuffers {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            collision: vec![None; width],
            priority: vec![None; width],
            hits: vec![],
        }
    }
}

/// Palette index of `tile` at tile-local (`x`, `y`), honoring its flip and rotate flags.
pub(crate) fn tile_pixel(tileset: &Tileset, tile: Tile, x: usize, y: usize) -> u8 {
    let (w, h) = (tileset.tile_width(), tileset.tile_height());
    let (mut x, mut y) = (x, y);
    if tile.flags.contains(TileFlags::FLIP_X) {
        x = w - 1 - x;
    }
    if tile.flags.contains(TileFlags::FLIP_Y) {
        y = h - 1 - y;
    }
    if tile.flags.contains(TileFlags::ROTATE) {
        (x, y) = (y, x);
    }
    tileset.pixel(tile.index as usize, x, y)
}

/// Composites scanline `line` of `scene` into `out` (one RGBA row).
pub(crate) fn draw_scanline(scene: &mut Scene, line: usize, out: &mut [u8], buffers: &mut LineBuffers) {
    scene.sync_layer_parents();
    draw_background(scene, line, out);

    buffers.collision.fill(None);
    buffers.priority.fill(None);
    buffers.hits.clear();

    let line = line as i32;
    for (n, layer) in scene.layers().iter().enumerate() {
        if layer.is_enabled() && !layer.priority() {
            draw_layer(scene, n, layer, line, out, &mut buffers.priority);
        }
    }
    draw_sprites(scene, line, out, false, buffers);
    for (n, layer) in scene.layers().iter().enumerate() {
        if layer.is_enabled() && layer.priority() {
            draw_layer(scene, n, layer, line, out, &mut buffers.priority);
        }
    }
    for (x, px) in buffers.priority.iter().enumerate() {
        if let Some((color, mode)) = px {
            let dst = &mut out[x * BYTES_PER_PIXEL..][..BYTES_PER_PIXEL];
            put_pixel(scene.blend_tables().table(*mode), *color, dst);
        }
    }
    draw_sprites(scene, line, out, true, buffers);

    for &sprite in &buffers.hits {
        scene.mark_collision(sprite);
    }
}

/// Background color across the line, then the background bitmap's row
/// `line` from the left edge. The bitmap is not repeated.
fn draw_background(scene: &Scene, line: usize, out: &mut [u8]) {
    let width = scene.width();
    if let Some(color) = scene.bg_color() {
        let rgba = color.to_rgba();
        for px in out[..width * BYTES_PER_PIXEL].chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
    }
    let Some(handle) = scene.bg_bitmap() else {
        return;
    };
    let bitmap = match scene.resources.bitmap(handle) {
        Ok(bitmap) => bitmap,
        Err(e) => {
            warn!("Background bitmap skipped: {}", e);
            return;
        }
    };
    let palette = scene
        .bg_palette()
        .or(bitmap.palette())
        .and_then(|p| scene.resources.palette(p).ok());
    let Some(palette) = palette else {
        warn!("Background bitmap has no palette");
        return;
    };
    if line >= bitmap.height() {
        return;
    }
    for x in 0..width.min(bitmap.width()) {
        let idx = bitmap.pixel(x, line).unwrap_or(0);
        let color = palette.color(idx).unwrap_or_default();
        out[x * BYTES_PER_PIXEL..][..BYTES_PER_PIXEL].copy_from_slice(&color.to_rgba());
    }
}

fn layer_palette<'a>(scene: &'a Scene, layer: &Layer, fallback: Option<Handle<Palette>>) -> Option<&'a Palette> {
    layer
        .palette()
        .or(fallback)
        .and_then(|p| scene.resources.palette(p).ok())
}

fn draw_layer(
    scene: &Scene,
    n: usize,
    layer: &Layer,
    line: i32,
    out: &mut [u8],
    priority: &mut [Option<(Color, BlendMode)>],
) {
    let clip = layer.clip();
    if line < clip.y1 || line >= clip.y2 {
        return;
    }
    let x_range = clip.x1.max(0)..clip.x2.min(scene.width() as i32);
    let table = scene.blend_tables().table(layer.blend());

    match layer.source() {
        LayerSource::None => {}
        LayerSource::Tiles { tileset, tilemap } => {
            let (Ok(ts), Ok(map)) = (scene.resources.tileset(tileset), scene.resources.tilemap(tilemap))
            else {
                warn!("Layer {} skipped: tileset or tilemap was deleted", n);
                return;
            };
            let Some(palette) = layer_palette(scene, layer, Some(ts.palette())) else {
                warn!("Layer {} skipped: palette was deleted", n);
                return;
            };
            let (tw, th) = (ts.tile_width(), ts.tile_height());
            for x in x_range {
                let (lx, ly) = layer.source_point(x, line, tw as i32);
                let (lx, ly) = (lx as usize, ly as usize);
                let tile = map.tile_wrapped(ly / th, lx / tw);
                if tile.is_empty() {
                    continue;
                }
                let idx = tile_pixel(ts, tile, lx % tw, ly % th);
                let Some(color) = palette.color(idx).filter(|_| idx != 0) else {
                    continue;
                };
                let lifted = tile.flags.contains(TileFlags::PRIORITY)
                    || ts.attributes(tile.index as usize).is_some_and(|a| a.priority);
                if lifted && !layer.priority() {
                    priority[x as usize] = Some((color, layer.blend()));
                } else {
                    put_pixel(table, color, &mut out[x as usize * BYTES_PER_PIXEL..][..BYTES_PER_PIXEL]);
                }
            }
        }
        LayerSource::Bitmap(handle) => {
            let Ok(bitmap) = scene.resources.bitmap(handle) else {
                warn!("Layer {} skipped: bitmap was deleted", n);
                return;
            };
            let Some(palette) = layer_palette(scene, layer, bitmap.palette()) else {
                warn!("Layer {} skipped: bitmap has no palette", n);
                return;
            };
            for x in x_range {
                let (lx, ly) = layer.source_point(x, line, 1);
                let idx = bitmap.pixel(lx as usize, ly as usize).unwrap_or(0);
                if idx == 0 {
                    continue;
                }
                if let Some(color) = palette.color(idx) {
                    put_pixel(table, color, &mut out[x as usize * BYTES_PER_PIXEL..][..BYTES_PER_PIXEL]);
                }
            }
        }
        LayerSource::Objects { list, spriteset } => {
            let (Ok(objects), Ok(ss)) = (scene.resources.object_list(list), scene.resources.spriteset(spriteset))
            else {
                warn!("Layer {} skipped: object list or spriteset was deleted", n);
                return;
            };
            let Some(palette) = layer_palette(scene, layer, Some(ss.palette())) else {
                warn!("Layer {} skipped: palette was deleted", n);
                return;
            };
            let (hstart, vstart) = layer.position();
            let (hstart, y) = (i64::from(hstart), i64::from(vstart) + i64::from(line));
            let (x1, x2) = (hstart + i64::from(x_range.start), hstart + i64::from(x_range.end));
            for object in objects.objects() {
                if !object.visible || !object.in_line(x1, x2, y) {
                    continue;
                }
                let mut v = (y - i64::from(object.y)) as usize;
                if object.flags.contains(TileFlags::FLIP_Y) {
                    v = object.height - 1 - v;
                }
                let lifted = object.flags.contains(TileFlags::PRIORITY) && !layer.priority();
                for x in x_range.clone() {
                    let u = hstart + i64::from(x) - i64::from(object.x);
                    if u < 0 || u >= object.width as i64 {
                        continue;
                    }
                    let mut u = u as usize;
                    if object.flags.contains(TileFlags::FLIP_X) {
                        u = object.width - 1 - u;
                    }
                    let idx = ss.pixel(object.gid, u, v);
                    let Some(color) = palette.color(idx).filter(|_| idx != 0) else {
                        continue;
                    };
                    if lifted {
                        priority[x as usize] = Some((color, layer.blend()));
                    } else {
                        put_pixel(table, color, &mut out[x as usize * BYTES_PER_PIXEL..][..BYTES_PER_PIXEL]);
                    }
                }
            }
        }
    }
}

fn draw_sprites(scene: &Scene, line: i32, out: &mut [u8], priority: bool, buffers: &mut LineBuffers) {
    let width = scene.width() as i32;
    let masked_line = scene
        .sprite_mask()
        .is_some_and(|(top, bottom)| line >= top && line <= bottom);

    for (i, sprite) in scene.sprites().iter().enumerate() {
        if !sprite.is_enabled() || sprite.flags().contains(TileFlags::PRIORITY) != priority {
            continue;
        }
        if masked_line && sprite.masked() {
            continue;
        }
        let Some(ss) = sprite.spriteset().and_then(|h| scene.resources.spriteset(h).ok()) else {
            warn!("Sprite {} skipped: spriteset was deleted", i);
            continue;
        };
        let Ok(entry) = ss.entry(sprite.picture()) else {
            continue;
        };
        let (dw, dh) = sprite.screen_size(entry.w, entry.h);
        let (sx, sy) = sprite.position();
        let (sx, sy) = (i64::from(sx), i64::from(sy));
        let v = i64::from(line) - sy;
        if v < 0 || v >= i64::from(dh) || sx >= i64::from(width) || sx + i64::from(dw) <= 0 {
            continue;
        }
        let v = v as i32;
        let Some(palette) = sprite
            .palette()
            .or(Some(ss.palette()))
            .and_then(|p| scene.resources.palette(p).ok())
        else {
            warn!("Sprite {} skipped: palette was deleted", i);
            continue;
        };
        let table = scene.blend_tables().table(sprite.blend());

        let first = (-sx).max(0) as i32;
        for u in first..dw {
            let x = sx + i64::from(u);
            if x >= i64::from(width) {
                break;
            }
            let (px, py) = sprite.picture_coords(entry.w, entry.h, u, v);
            let idx = ss.pixel(sprite.picture(), px, py);
            if idx == 0 {
                continue;
            }
            let Some(color) = palette.color(idx) else {
                continue;
            };
            let x = x as usize;
            put_pixel(table, color, &mut out[x * BYTES_PER_PIXEL..][..BYTES_PER_PIXEL]);
            if sprite.collision_enabled() {
                match buffers.collision[x] {
                    Some(other) => {
                        buffers.hits.push(other as usize);
                        buffers.hits.push(i);
                    }
                    None => buffers.collision[x] = Some(i as u16),
                }
            }
        }
    }
}
