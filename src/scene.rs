use log::{debug, warn};

use crate::{
    animation::{Animation, AnimationState, AnimationTarget, FrameChange},
    arena::Handle,
    bitmap::Bitmap,
    blend::{BlendMode, BlendTables},
    common::{Color, TileFlags, TileIdx},
    config::EngineConfig,
    draw::tile_pixel,
    error::{Error, ErrorKind, LastError, Result},
    layer::{Affine, Layer, LayerSource, PixelMap, TileInfo},
    objects::ObjectList,
    palette::Palette,
    resources::Resources,
    sequence::{Sequence, SequenceData},
    sprite::Sprite,
    spriteset::Spriteset,
    tilemap::Tilemap,
    tileset::Tileset,
};

/// Everything a raster callback may change between scanlines: resources,
/// layer/sprite/animation slots and the background.
pub struct Scene {
    pub resources: Resources,
    width: usize,
    height: usize,
    layers: Vec<Layer>,
    sprites: Vec<Sprite>,
    animations: Vec<Animation>,
    bg_color: Option<Color>,
    bg_bitmap: Option<Handle<Bitmap>>,
    bg_palette: Option<Handle<Palette>>,
    blend_tables: BlendTables,
    sprite_mask: Option<(i32, i32)>,
    world: (i32, i32),
    last_error: LastError,
    last_time: Option<u32>,
}

enum Effect {
    Palette(Handle<Palette>, Vec<(usize, Color)>),
    Tileset {
        layer: usize,
        target: TileIdx,
        changes: Vec<FrameChange>,
    },
    Tilemap {
        layer: usize,
        changes: Vec<FrameChange>,
    },
    Sprite {
        sprite: usize,
        changes: Vec<FrameChange>,
    },
}

impl Scene {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let (w, h) = (config.width, config.height);
        Ok(Self {
            resources: Resources::new(),
            width: w,
            height: h,
            layers: (0..config.layers).map(|_| Layer::new(w, h)).collect(),
            sprites: vec![Sprite::default(); config.sprites],
            animations: vec![Animation::default(); config.animations],
            bg_color: Some(Color::BLACK),
            bg_bitmap: None,
            bg_palette: None,
            blend_tables: BlendTables::new(),
            sprite_mask: None,
            world: (0, 0),
            last_error: LastError::default(),
            last_time: None,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn last_error(&self) -> ErrorKind {
        self.last_error.get()
    }

    pub fn set_last_error(&self, kind: ErrorKind) {
        self.last_error.set(kind);
    }

    pub fn blend_tables(&self) -> &BlendTables {
        &self.blend_tables
    }

    /// Installs the per-channel `(src, dst) -> out` function used by `BlendMode::Custom`.
    pub fn set_custom_blend_function(&mut self, f: impl Fn(u8, u8) -> u8) {
        self.blend_tables.set_custom(f);
    }

    // Layers

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, nlayer: usize) -> Result<&Layer> {
        self.last_error
            .record(self.layers.get(nlayer).ok_or(Error::IdxLayer(nlayer)))
    }

    fn with_layer<T>(&mut self, nlayer: usize, f: impl FnOnce(&mut Layer) -> Result<T>) -> Result<T> {
        let result = match self.layers.get_mut(nlayer) {
            Some(layer) => f(layer),
            None => Err(Error::IdxLayer(nlayer)),
        };
        self.last_error.record(result)
    }

    /// Binds a tilemap, drawn with `tileset` or else the tilemap's own tileset.
    pub fn set_layer(
        &mut self,
        nlayer: usize,
        tileset: Option<Handle<Tileset>>,
        tilemap: Handle<Tilemap>,
    ) -> Result<()> {
        let bound = self.tiles_size(tileset, tilemap);
        self.with_layer(nlayer, |layer| {
            let (tileset, width, height) = bound?;
            layer.bind(LayerSource::Tiles { tileset, tilemap }, width, height);
            debug!("Layer {} bound to tilemap {:?}", nlayer, tilemap);
            Ok(())
        })
    }

    fn tiles_size(
        &self,
        tileset: Option<Handle<Tileset>>,
        tilemap: Handle<Tilemap>,
    ) -> Result<(Handle<Tileset>, usize, usize)> {
        let map = self.resources.tilemap(tilemap)?;
        let tileset = tileset.or(map.tileset()).ok_or(Error::RefTileset)?;
        let ts = self.resources.tileset(tileset)?;
        Ok((
            tileset,
            map.cols() * ts.tile_width(),
            map.rows() * ts.tile_height(),
        ))
    }

    pub fn set_layer_tilemap(&mut self, nlayer: usize, tilemap: Handle<Tilemap>) -> Result<()> {
        self.set_layer(nlayer, None, tilemap)
    }

    pub fn set_layer_bitmap(&mut self, nlayer: usize, bitmap: Handle<Bitmap>) -> Result<()> {
        let size = self.resources.bitmap(bitmap).and_then(|b| {
            if b.bpp() != 8 {
                return Err(Error::Unsupported(format!("{}bpp layer bitmap", b.bpp())));
            }
            Ok((b.width(), b.height()))
        });
        self.with_layer(nlayer, |layer| {
            let (w, h) = size?;
            layer.bind(LayerSource::Bitmap(bitmap), w, h);
            Ok(())
        })
    }

    /// Binds an object list; the layer spans every object from the origin.
    pub fn set_layer_objects(
        &mut self,
        nlayer: usize,
        list: Handle<ObjectList>,
        spriteset: Handle<Spriteset>,
    ) -> Result<()> {
        let size = self
            .resources
            .spriteset(spriteset)
            .and_then(|_| self.resources.object_list(list))
            .map(|objects| objects.extent());
        self.with_layer(nlayer, |layer| {
            let (w, h) = size?;
            layer.bind(LayerSource::Objects { list, spriteset }, w, h);
            debug!("Layer {} bound to object list {:?}", nlayer, list);
            Ok(())
        })
    }

    pub fn set_layer_palette(&mut self, nlayer: usize, palette: Handle<Palette>) -> Result<()> {
        let valid = self.resources.palette(palette).map(|_| ());
        self.with_layer(nlayer, |layer| {
            valid?;
            layer.set_palette(Some(palette));
            Ok(())
        })
    }

    pub fn set_layer_position(&mut self, nlayer: usize, hstart: i32, vstart: i32) -> Result<()> {
        self.with_layer(nlayer, |layer| layer.set_position(hstart, vstart))
    }

    pub fn set_layer_scaling(&mut self, nlayer: usize, sx: f32, sy: f32) -> Result<()> {
        self.with_layer(nlayer, |layer| layer.set_scaling(sx, sy))
    }

    pub fn set_layer_affine_transform(&mut self, nlayer: usize, affine: Affine) -> Result<()> {
        self.with_layer(nlayer, |layer| layer.set_affine(affine))
    }

    pub fn set_layer_transform(
        &mut self,
        nlayer: usize,
        angle: f32,
        dx: f32,
        dy: f32,
        sx: f32,
        sy: f32,
    ) -> Result<()> {
        self.set_layer_affine_transform(nlayer, Affine { angle, dx, dy, sx, sy })
    }

    pub fn set_layer_pixel_mapping(&mut self, nlayer: usize, table: Vec<PixelMap>) -> Result<()> {
        self.with_layer(nlayer, |layer| layer.set_pixel_map(table))
    }

    pub fn reset_layer_mode(&mut self, nlayer: usize) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            layer.reset_mode();
            Ok(())
        })
    }

    pub fn set_layer_column_offset(&mut self, nlayer: usize, offsets: Option<Vec<i32>>) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            layer.set_column_offsets(offsets);
            Ok(())
        })
    }

    pub fn set_layer_clip(&mut self, nlayer: usize, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            layer.set_clip(x1, y1, x2, y2);
            Ok(())
        })
    }

    pub fn disable_layer_clip(&mut self, nlayer: usize) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            layer.disable_clip();
            Ok(())
        })
    }

    pub fn set_layer_mosaic(&mut self, nlayer: usize, width: i32, height: i32) -> Result<()> {
        self.with_layer(nlayer, |layer| layer.set_mosaic(width, height))
    }

    pub fn disable_layer_mosaic(&mut self, nlayer: usize) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            layer.disable_mosaic();
            Ok(())
        })
    }

    pub fn set_layer_blend_mode(&mut self, nlayer: usize, mode: BlendMode) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            layer.set_blend(mode);
            Ok(())
        })
    }

    /// A priority layer draws above regular sprites.
    pub fn set_layer_priority(&mut self, nlayer: usize, priority: bool) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            layer.set_priority(priority);
            Ok(())
        })
    }

    /// The layer follows `parent`'s scroll position on every scanline.
    pub fn set_layer_parent(&mut self, nlayer: usize, parent: usize) -> Result<()> {
        let count = self.layers.len();
        self.with_layer(nlayer, |layer| {
            if parent >= count || parent == nlayer {
                return Err(Error::IdxLayer(parent));
            }
            layer.set_parent(Some(parent));
            Ok(())
        })
    }

    pub fn disable_layer_parent(&mut self, nlayer: usize) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            layer.set_parent(None);
            Ok(())
        })
    }

    pub fn set_layer_parallax_factor(&mut self, nlayer: usize, x: f32, y: f32) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            let mut parallax = layer.parallax();
            parallax.factor_x = x;
            parallax.factor_y = y;
            layer.set_parallax(parallax);
            Ok(())
        })
    }

    pub fn enable_layer(&mut self, nlayer: usize) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            if layer.source() == LayerSource::None {
                return Err(Error::RefTilemap);
            }
            layer.set_enabled(true);
            Ok(())
        })
    }

    /// Stops drawing the layer; its binding and settings are kept.
    pub fn disable_layer(&mut self, nlayer: usize) -> Result<()> {
        self.with_layer(nlayer, |layer| {
            layer.set_enabled(false);
            Ok(())
        })
    }

    /// Tile under layer-space point (`x`, `y`), wrapped into the layer.
    pub fn get_layer_tile(&self, nlayer: usize, x: i32, y: i32) -> Result<TileInfo> {
        let result = self.layer_tile(nlayer, x, y);
        self.last_error.record(result)
    }

    fn layer_tile(&self, nlayer: usize, x: i32, y: i32) -> Result<TileInfo> {
        let layer = self.layers.get(nlayer).ok_or(Error::IdxLayer(nlayer))?;
        let LayerSource::Tiles { tileset, tilemap } = layer.source() else {
            return Err(Error::RefTilemap);
        };
        let ts = self.resources.tileset(tileset)?;
        let map = self.resources.tilemap(tilemap)?;
        let xpos = x.rem_euclid(layer.width() as i32) as usize;
        let ypos = y.rem_euclid(layer.height() as i32) as usize;
        let (row, col) = (ypos / ts.tile_height(), xpos / ts.tile_width());
        let (xoffset, yoffset) = (xpos % ts.tile_width(), ypos % ts.tile_height());
        let tile = map.get_tile(row, col)?;
        Ok(TileInfo {
            index: tile.index,
            flags: tile.flags,
            row,
            col,
            xoffset,
            yoffset,
            color: tile_pixel(ts, tile, xoffset, yoffset),
            tile_type: ts
                .attributes(tile.index as usize)
                .map_or(0, |a| a.tile_type),
            empty: tile.is_empty(),
        })
    }

    /// Positions every bound layer at `world * factor - offset` and moves
    /// world-space sprites along.
    pub fn set_world_position(&mut self, x: i32, y: i32) {
        self.world = (x, y);
        for layer in &mut self.layers {
            if layer.source() == LayerSource::None {
                continue;
            }
            let p = layer.parallax();
            let lx = ((x as f32 * p.factor_x) as i32).saturating_sub(p.offset_x);
            let ly = ((y as f32 * p.factor_y) as i32).saturating_sub(p.offset_y);
            if let Err(e) = layer.set_position(lx, ly) {
                warn!("World position not applied: {}", e);
            }
        }
        for sprite in &mut self.sprites {
            sprite.follow_world(self.world);
        }
    }

    pub fn world_position(&self) -> (i32, i32) {
        self.world
    }

    /// Copies parent positions into child layers.
    pub(crate) fn sync_layer_parents(&mut self) {
        for i in 0..self.layers.len() {
            let Some(parent) = self.layers[i].parent() else {
                continue;
            };
            if self.layers[i].source() == LayerSource::None {
                continue;
            }
            let (h, v) = self.layers[parent].position();
            if let Err(e) = self.layers[i].set_position(h, v) {
                warn!("Layer {} not synced to parent {}: {}", i, parent, e);
            }
        }
    }

    // Sprites

    pub fn num_sprites(&self) -> usize {
        self.sprites.len()
    }

    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn sprite(&self, nsprite: usize) -> Result<&Sprite> {
        self.last_error
            .record(self.sprites.get(nsprite).ok_or(Error::IdxSprite(nsprite)))
    }

    fn with_sprite<T>(&mut self, nsprite: usize, f: impl FnOnce(&mut Sprite) -> Result<T>) -> Result<T> {
        let result = match self.sprites.get_mut(nsprite) {
            Some(sprite) => f(sprite),
            None => Err(Error::IdxSprite(nsprite)),
        };
        self.last_error.record(result)
    }

    /// Binds a spriteset, shows picture 0 and enables the sprite.
    pub fn config_sprite(&mut self, nsprite: usize, spriteset: Handle<Spriteset>, flags: TileFlags) -> Result<()> {
        let valid = self.resources.spriteset(spriteset).map(|_| ());
        self.with_sprite(nsprite, |sprite| {
            valid?;
            sprite.configure(spriteset, flags);
            Ok(())
        })
    }

    pub fn set_sprite_set(&mut self, nsprite: usize, spriteset: Handle<Spriteset>) -> Result<()> {
        let flags = self.sprites.get(nsprite).map(|s| s.flags()).unwrap_or_default();
        self.config_sprite(nsprite, spriteset, flags)
    }

    pub fn set_sprite_picture(&mut self, nsprite: usize, picture: usize) -> Result<()> {
        let spriteset = self.sprites.get(nsprite).and_then(|s| s.spriteset());
        let check = spriteset
            .ok_or(Error::RefSpriteset)
            .and_then(|h| self.resources.spriteset(h))
            .and_then(|ss| ss.entry(picture).map(|_| ()));
        self.with_sprite(nsprite, |sprite| {
            check?;
            sprite.set_picture(picture);
            Ok(())
        })
    }

    /// Picture size of the sprite's current spriteset entry.
    pub fn get_sprite_info(&self, nsprite: usize) -> Result<(usize, usize)> {
        let result = self
            .sprites
            .get(nsprite)
            .ok_or(Error::IdxSprite(nsprite))
            .and_then(|s| {
                let ss = self
                    .resources
                    .spriteset(s.spriteset().ok_or(Error::RefSpriteset)?)?;
                let e = ss.entry(s.picture())?;
                Ok((e.w, e.h))
            });
        self.last_error.record(result)
    }

    pub fn set_sprite_palette(&mut self, nsprite: usize, palette: Option<Handle<Palette>>) -> Result<()> {
        let valid = match palette {
            Some(p) => self.resources.palette(p).map(|_| ()),
            None => Ok(()),
        };
        self.with_sprite(nsprite, |sprite| {
            valid?;
            sprite.set_palette(palette);
            Ok(())
        })
    }

    pub fn set_sprite_position(&mut self, nsprite: usize, x: i32, y: i32) -> Result<()> {
        self.with_sprite(nsprite, |sprite| {
            sprite.set_position(x, y);
            Ok(())
        })
    }

    /// Places the sprite in world space; its screen position follows
    /// `set_world_position` until `set_sprite_position` is called.
    pub fn set_sprite_world_position(&mut self, nsprite: usize, x: i32, y: i32) -> Result<()> {
        let origin = self.world;
        self.with_sprite(nsprite, |sprite| {
            sprite.set_world_position(x, y, origin);
            Ok(())
        })
    }

    pub fn set_sprite_scaling(&mut self, nsprite: usize, sx: f32, sy: f32) -> Result<()> {
        self.with_sprite(nsprite, |sprite| sprite.set_scaling(sx, sy))
    }

    pub fn reset_sprite_scaling(&mut self, nsprite: usize) -> Result<()> {
        self.with_sprite(nsprite, |sprite| {
            sprite.reset_scaling();
            Ok(())
        })
    }

    pub fn set_sprite_flags(&mut self, nsprite: usize, flags: TileFlags) -> Result<()> {
        self.with_sprite(nsprite, |sprite| {
            sprite.set_flags(flags);
            Ok(())
        })
    }

    pub fn enable_sprite_flag(&mut self, nsprite: usize, flag: TileFlags, enable: bool) -> Result<()> {
        self.with_sprite(nsprite, |sprite| {
            sprite.enable_flag(flag, enable);
            Ok(())
        })
    }

    pub fn set_sprite_blend_mode(&mut self, nsprite: usize, mode: BlendMode) -> Result<()> {
        self.with_sprite(nsprite, |sprite| {
            sprite.set_blend(mode);
            Ok(())
        })
    }

    pub fn enable_sprite_collision(&mut self, nsprite: usize, enable: bool) -> Result<()> {
        self.with_sprite(nsprite, |sprite| {
            sprite.enable_collision(enable);
            Ok(())
        })
    }

    pub fn get_sprite_collision(&self, nsprite: usize) -> Result<bool> {
        self.sprite(nsprite).map(|s| s.collision())
    }

    pub fn enable_sprite(&mut self, nsprite: usize) -> Result<()> {
        self.with_sprite(nsprite, |sprite| {
            if sprite.spriteset().is_none() {
                return Err(Error::RefSpriteset);
            }
            sprite.enable();
            Ok(())
        })
    }

    pub fn disable_sprite(&mut self, nsprite: usize) -> Result<()> {
        self.with_sprite(nsprite, |sprite| {
            sprite.disable();
            Ok(())
        })
    }

    /// First disabled sprite slot.
    pub fn get_available_sprite(&self) -> Option<usize> {
        self.sprites.iter().position(|s| !s.is_enabled())
    }

    /// Masked sprites are hidden on lines `top..=bottom`.
    pub fn set_sprites_mask_region(&mut self, top: i32, bottom: i32) {
        self.sprite_mask = if top <= bottom { Some((top, bottom)) } else { None };
    }

    pub fn sprite_mask(&self) -> Option<(i32, i32)> {
        self.sprite_mask
    }

    pub fn enable_sprite_masking(&mut self, nsprite: usize, enable: bool) -> Result<()> {
        self.with_sprite(nsprite, |sprite| {
            sprite.set_masked(enable);
            Ok(())
        })
    }

    pub(crate) fn reset_collisions(&mut self) {
        for sprite in &mut self.sprites {
            sprite.set_collision(false);
        }
    }

    pub(crate) fn mark_collision(&mut self, nsprite: usize) {
        if let Some(sprite) = self.sprites.get_mut(nsprite) {
            sprite.set_collision(true);
        }
    }

    // Animations

    pub fn num_animations(&self) -> usize {
        self.animations.len()
    }

    pub fn animation(&self, index: usize) -> Result<&Animation> {
        self.last_error
            .record(self.animations.get(index).ok_or(Error::IdxAnimation(index)))
    }

    fn check_sequence(&self, sequence: Handle<Sequence>, cycle: bool) -> Result<()> {
        let seq = self.resources.sequence(sequence)?;
        if seq.is_cycle() != cycle {
            return Err(Error::WrongFormat(format!(
                "sequence '{}' is not a {}",
                seq.name,
                if cycle { "color cycle" } else { "frame sequence" }
            )));
        }
        Ok(())
    }

    fn start_animation(
        &mut self,
        index: usize,
        target: AnimationTarget,
        sequence: Handle<Sequence>,
        blend: bool,
        check: Result<Option<Palette>>,
    ) -> Result<()> {
        let result = match self.animations.get_mut(index) {
            None => Err(Error::IdxAnimation(index)),
            Some(anim) => check.map(|source| {
                anim.activate(target, sequence, blend, source);
                debug!("Animation {} started on {:?}", index, target);
            }),
        };
        self.last_error.record(result)
    }

    /// Color-cycles `palette`; `blend` interpolates between steps.
    pub fn set_palette_animation(
        &mut self,
        index: usize,
        palette: Handle<Palette>,
        sequence: Handle<Sequence>,
        blend: bool,
    ) -> Result<()> {
        let check = self
            .check_sequence(sequence, true)
            .and_then(|_| self.resources.palette(palette).cloned());
        self.start_animation(index, AnimationTarget::Palette(palette), sequence, blend, check.map(Some))
    }

    /// Replaces the colors the cycle reads from.
    pub fn set_palette_animation_source(&mut self, index: usize, palette: Handle<Palette>) -> Result<()> {
        let source = self.resources.palette(palette).cloned();
        let result = match self.animations.get_mut(index) {
            None => Err(Error::IdxAnimation(index)),
            Some(anim) => source.map(|p| anim.set_source(p)),
        };
        self.last_error.record(result)
    }

    pub fn set_tileset_animation(&mut self, index: usize, nlayer: usize, sequence: Handle<Sequence>) -> Result<()> {
        let check = self.check_layer_tiles(nlayer).and_then(|_| self.check_sequence(sequence, false));
        self.start_animation(index, AnimationTarget::Tileset { layer: nlayer }, sequence, false, check.map(|_| None))
    }

    pub fn set_tilemap_animation(&mut self, index: usize, nlayer: usize, sequence: Handle<Sequence>) -> Result<()> {
        let check = self.check_layer_tiles(nlayer).and_then(|_| self.check_sequence(sequence, false));
        self.start_animation(index, AnimationTarget::Tilemap { layer: nlayer }, sequence, false, check.map(|_| None))
    }

    pub fn set_sprite_animation(&mut self, index: usize, nsprite: usize, sequence: Handle<Sequence>) -> Result<()> {
        let check = if nsprite < self.sprites.len() {
            self.check_sequence(sequence, false)
        } else {
            Err(Error::IdxSprite(nsprite))
        };
        self.start_animation(index, AnimationTarget::Sprite { sprite: nsprite }, sequence, false, check.map(|_| None))
    }

    fn check_layer_tiles(&self, nlayer: usize) -> Result<()> {
        let layer = self.layers.get(nlayer).ok_or(Error::IdxLayer(nlayer))?;
        match layer.source() {
            LayerSource::Tiles { .. } => Ok(()),
            _ => Err(Error::RefTilemap),
        }
    }

    /// Overrides every step delay of the animation until it is restarted;
    /// `None` goes back to the sequence delays.
    pub fn set_animation_delay(&mut self, index: usize, delay: Option<u32>) -> Result<()> {
        let result = match self.animations.get_mut(index) {
            None => Err(Error::IdxAnimation(index)),
            Some(_) if delay == Some(0) => Err(Error::WrongSize("animation delay 0".to_string())),
            Some(anim) => {
                anim.set_delay(delay);
                Ok(())
            }
        };
        self.last_error.record(result)
    }

    pub fn get_animation_state(&self, index: usize) -> Result<AnimationState> {
        self.animation(index).map(|a| a.state())
    }

    pub fn disable_animation(&mut self, index: usize) -> Result<()> {
        let result = match self.animations.get_mut(index) {
            Some(anim) => {
                anim.disable();
                Ok(())
            }
            None => Err(Error::IdxAnimation(index)),
        };
        self.last_error.record(result)
    }

    /// First inactive animation slot.
    pub fn get_available_animation(&self) -> Option<usize> {
        self.animations.iter().position(|a| !a.is_active())
    }

    /// Advances every active animation to timestamp `time`.
    pub(crate) fn update_animations(&mut self, time: u32) {
        let dt = self.last_time.map_or(0, |last| time.saturating_sub(last));
        self.last_time = Some(time);

        for i in 0..self.animations.len() {
            if let Some(effect) = self.tick_animation(i, dt) {
                self.apply_effect(i, effect);
            }
        }
    }

    fn tick_animation(&mut self, i: usize, dt: u32) -> Option<Effect> {
        let anim = &mut self.animations[i];
        if !anim.is_active() {
            return None;
        }
        let (Some(target), Some(seq)) = (
            anim.target(),
            anim.sequence().and_then(|h| self.resources.sequence(h).ok()),
        ) else {
            warn!("Animation {} lost its sequence, disabling", i);
            anim.disable();
            return None;
        };
        let effect = match (&seq.data, target) {
            (SequenceData::Cycle { strips }, AnimationTarget::Palette(palette)) => {
                Effect::Palette(palette, anim.tick_palette(strips, dt))
            }
            (SequenceData::Frames { frames }, AnimationTarget::Tileset { layer }) => Effect::Tileset {
                layer,
                target: seq.target,
                changes: anim.tick_frames(frames, seq.loops, dt),
            },
            (SequenceData::Frames { frames }, AnimationTarget::Tilemap { layer }) => Effect::Tilemap {
                layer,
                changes: anim.tick_frames(frames, seq.loops, dt),
            },
            (SequenceData::Frames { frames }, AnimationTarget::Sprite { sprite }) => Effect::Sprite {
                sprite,
                changes: anim.tick_frames(frames, seq.loops, dt),
            },
            _ => {
                warn!("Animation {} sequence does not fit its target", i);
                anim.disable();
                return None;
            }
        };
        Some(effect)
    }

    fn apply_effect(&mut self, i: usize, effect: Effect) {
        let applied = match effect {
            Effect::Palette(handle, writes) => self.resources.palette_mut(handle).and_then(|pal| {
                for (idx, color) in writes {
                    if idx < pal.len() {
                        pal.set_color(idx, color)?;
                    }
                }
                Ok(())
            }),
            Effect::Tileset { layer, target, changes } => self.layer_tileset(layer).and_then(|ts| {
                let ts = self.resources.tileset_mut(ts)?;
                for change in changes {
                    ts.copy_tile(change.index as usize, target as usize)?;
                }
                Ok(())
            }),
            Effect::Tilemap { layer, changes } => self.layer_tilemap(layer).and_then(|tm| {
                let map = self.resources.tilemap_mut(tm)?;
                for change in changes {
                    if let Some(prev) = change.prev {
                        map.replace_tiles(prev, change.index);
                    }
                }
                Ok(())
            }),
            Effect::Sprite { sprite, changes } => match changes.last() {
                Some(change) => self.animate_sprite(sprite, change.index as usize),
                None => Ok(()),
            },
        };
        if let Err(e) = applied {
            warn!("Animation {} disabled: {}", i, e);
            self.animations[i].disable();
        }
    }

    /// Picture change driven by an animation; leaves the last-error record alone.
    fn animate_sprite(&mut self, nsprite: usize, picture: usize) -> Result<()> {
        let sprite = self.sprites.get(nsprite).ok_or(Error::IdxSprite(nsprite))?;
        let ss = self
            .resources
            .spriteset(sprite.spriteset().ok_or(Error::RefSpriteset)?)?;
        ss.entry(picture)?;
        self.sprites[nsprite].set_picture(picture);
        Ok(())
    }

    fn layer_tileset(&self, nlayer: usize) -> Result<Handle<Tileset>> {
        match self.layers.get(nlayer).map(|l| l.source()) {
            Some(LayerSource::Tiles { tileset, .. }) => Ok(tileset),
            Some(_) => Err(Error::RefTileset),
            None => Err(Error::IdxLayer(nlayer)),
        }
    }

    fn layer_tilemap(&self, nlayer: usize) -> Result<Handle<Tilemap>> {
        match self.layers.get(nlayer).map(|l| l.source()) {
            Some(LayerSource::Tiles { tilemap, .. }) => Ok(tilemap),
            Some(_) => Err(Error::RefTilemap),
            None => Err(Error::IdxLayer(nlayer)),
        }
    }

    // Background

    pub fn bg_color(&self) -> Option<Color> {
        self.bg_color
    }

    pub fn set_bg_color(&mut self, color: Color) {
        self.bg_color = Some(color);
    }

    pub fn disable_bg_color(&mut self) {
        self.bg_color = None;
    }

    pub fn set_bg_color_from_tilemap(&mut self, tilemap: Handle<Tilemap>) -> Result<()> {
        let result = self.resources.tilemap(tilemap).map(|m| m.bg_color());
        if let Ok(Some(color)) = result {
            self.bg_color = Some(color);
        }
        self.last_error.record(result.map(|_| ()))
    }

    pub fn bg_bitmap(&self) -> Option<Handle<Bitmap>> {
        self.bg_bitmap
    }

    /// Sets the background bitmap, taking its palette as the background palette.
    pub fn set_bg_bitmap(&mut self, bitmap: Option<Handle<Bitmap>>) -> Result<()> {
        let result = match bitmap {
            None => {
                self.bg_bitmap = None;
                Ok(())
            }
            Some(h) => self.resources.bitmap(h).map(|b| b.palette()).map(|palette| {
                self.bg_bitmap = Some(h);
                if palette.is_some() {
                    self.bg_palette = palette;
                }
            }),
        };
        self.last_error.record(result)
    }

    pub fn bg_palette(&self) -> Option<Handle<Palette>> {
        self.bg_palette
    }

    pub fn set_bg_palette(&mut self, palette: Handle<Palette>) -> Result<()> {
        let result = self.resources.palette(palette).map(|_| {
            self.bg_palette = Some(palette);
        });
        self.last_error.record(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bitmap::Bitmap,
        common::Tile,
        sequence::{ColorStrip, SequenceFrame, StripDirection},
        spriteset::SpriteEntry,
    };

    fn scene() -> Scene {
        Scene::new(&EngineConfig {
            width: 32,
            height: 16,
            layers: 2,
            sprites: 4,
            animations: 2,
        })
        .unwrap()
    }

    fn tiles(scene: &mut Scene) -> (Handle<Tileset>, Handle<Tilemap>) {
        let pal = scene.resources.add_palette(Palette::new(16).unwrap());
        let mut ts = Tileset::new(4, 8, 8, pal).unwrap();
        for i in 1..=4 {
            ts.set_pixels(i, &[i as u8; 64], 8).unwrap();
        }
        let ts = scene.resources.add_tileset(ts);
        let map_tiles = (0..8).map(|i| Tile::new(i % 5)).collect();
        let map = scene
            .resources
            .add_tilemap(Tilemap::new(2, 4, map_tiles, Some(Color::new(1, 2, 3)), Some(ts)).unwrap());
        (ts, map)
    }

    #[test]
    fn test_slot_errors_are_recorded() {
        let mut scene = scene();
        assert_eq!(scene.last_error(), ErrorKind::Ok);
        assert!(scene.set_layer_position(5, 0, 0).is_err());
        assert_eq!(scene.last_error(), ErrorKind::IdxLayer);
        assert!(scene.set_sprite_position(9, 0, 0).is_err());
        assert_eq!(scene.last_error(), ErrorKind::IdxSprite);
        assert!(scene.disable_animation(2).is_err());
        assert_eq!(scene.last_error(), ErrorKind::IdxAnimation);
        scene.set_sprite_position(0, 1, 1).unwrap();
        assert_eq!(scene.last_error(), ErrorKind::Ok);
        scene.set_last_error(ErrorKind::WrongFormat);
        assert_eq!(scene.last_error(), ErrorKind::WrongFormat);
    }

    #[test]
    fn test_set_layer_uses_tilemap_tileset() {
        let mut scene = scene();
        let (_, map) = tiles(&mut scene);
        scene.set_layer_tilemap(0, map).unwrap();
        let layer = scene.layer(0).unwrap();
        assert!(layer.is_enabled());
        assert_eq!((layer.width(), layer.height()), (32, 16));

        scene.set_layer_position(0, 40, -2).unwrap();
        assert_eq!(scene.layer(0).unwrap().position(), (8, 14));
        assert!(scene.set_layer_position(1, 0, 0).is_err());
        assert_eq!(scene.last_error(), ErrorKind::RefTilemap);
    }

    #[test]
    fn test_stale_tilemap_rejected() {
        let mut scene = scene();
        let (_, map) = tiles(&mut scene);
        scene.resources.delete_tilemap(map).unwrap();
        assert!(scene.set_layer_tilemap(0, map).is_err());
        assert_eq!(scene.last_error(), ErrorKind::RefTilemap);
        assert!(!scene.layer(0).unwrap().is_enabled());
    }

    #[test]
    fn test_get_layer_tile() {
        let mut scene = scene();
        let (ts, map) = tiles(&mut scene);
        scene
            .resources
            .tileset_mut(ts)
            .unwrap()
            .set_attributes(
                2,
                crate::tileset::TileAttributes {
                    tile_type: 9,
                    priority: false,
                },
            )
            .unwrap();
        scene.set_layer(0, Some(ts), map).unwrap();

        let info = scene.get_layer_tile(0, 17, 3).unwrap();
        assert_eq!((info.row, info.col, info.index), (0, 2, 2));
        assert_eq!((info.xoffset, info.yoffset), (1, 3));
        assert_eq!(info.color, 2);
        assert_eq!(info.tile_type, 9);

        let wrapped = scene.get_layer_tile(0, -32, 0).unwrap();
        assert!(wrapped.empty);
        assert!(scene.get_layer_tile(1, 0, 0).is_err());
    }

    #[test]
    fn test_parent_and_world_position() {
        let mut scene = scene();
        let (_, map) = tiles(&mut scene);
        scene.set_layer_tilemap(0, map).unwrap();
        scene.set_layer_tilemap(1, map).unwrap();
        scene.set_layer_parallax_factor(1, 0.5, 0.5).unwrap();

        scene.set_world_position(10, 4);
        assert_eq!(scene.layer(0).unwrap().position(), (10, 4));
        assert_eq!(scene.layer(1).unwrap().position(), (5, 2));

        scene.set_layer_parent(1, 0).unwrap();
        scene.sync_layer_parents();
        assert_eq!(scene.layer(1).unwrap().position(), (10, 4));
        assert!(scene.set_layer_parent(1, 1).is_err());
    }

    #[test]
    fn test_unbound_child_layer_is_not_synced() {
        let mut scene = scene();
        let (_, map) = tiles(&mut scene);
        scene.set_layer_tilemap(0, map).unwrap();
        scene.set_layer_position(0, 3, 3).unwrap();
        scene.set_layer_parent(1, 0).unwrap();
        scene.sync_layer_parents();
        assert_eq!(scene.layer(1).unwrap().position(), (0, 0));
        assert_eq!(scene.last_error(), ErrorKind::Ok);
    }

    fn spriteset(scene: &mut Scene) -> Handle<Spriteset> {
        let pal = scene.resources.add_palette(Palette::new(4).unwrap());
        let mut bitmap = Bitmap::from_indexed(8, 4, &[1; 32]).unwrap();
        bitmap.set_palette(Some(pal));
        let entries = vec![
            SpriteEntry { name: "a".into(), x: 0, y: 0, w: 4, h: 4 },
            SpriteEntry { name: "b".into(), x: 4, y: 0, w: 4, h: 2 },
        ];
        scene.resources.add_spriteset(Spriteset::new(bitmap, entries).unwrap())
    }

    #[test]
    fn test_sprite_picture_checked() {
        let mut scene = scene();
        assert!(scene.set_sprite_picture(0, 0).is_err());
        assert_eq!(scene.last_error(), ErrorKind::RefSpriteset);

        let ss = spriteset(&mut scene);
        scene.config_sprite(0, ss, TileFlags::empty()).unwrap();
        scene.set_sprite_picture(0, 1).unwrap();
        assert_eq!(scene.get_sprite_info(0).unwrap(), (4, 2));
        assert!(scene.set_sprite_picture(0, 2).is_err());
        assert_eq!(scene.last_error(), ErrorKind::IdxPicture);

        assert_eq!(scene.get_available_sprite(), Some(1));
        scene.disable_sprite(0).unwrap();
        assert_eq!(scene.get_available_sprite(), Some(0));
        scene.enable_sprite(0).unwrap();
        assert!(scene.sprite(0).unwrap().is_enabled());
    }

    #[test]
    fn test_sprite_animation_drives_picture() {
        let mut scene = scene();
        let ss = spriteset(&mut scene);
        scene.config_sprite(2, ss, TileFlags::empty()).unwrap();
        let frames = vec![
            SequenceFrame { index: 1, delay: 10 },
            SequenceFrame { index: 0, delay: 10 },
        ];
        let seq = scene.resources.add_sequence(Sequence::frames("blink", 0, frames, 1).unwrap());
        scene.set_sprite_animation(0, 2, seq).unwrap();
        assert_eq!(scene.get_available_animation(), Some(1));

        scene.update_animations(100);
        assert_eq!(scene.sprite(2).unwrap().picture(), 1);
        scene.update_animations(110);
        assert_eq!(scene.sprite(2).unwrap().picture(), 0);
        scene.update_animations(120);
        assert_eq!(scene.get_animation_state(0).unwrap(), AnimationState::Inactive);
        assert_eq!(scene.sprite(2).unwrap().picture(), 0);
    }

    #[test]
    fn test_sprite_animation_keeps_last_error() {
        let mut scene = scene();
        let ss = spriteset(&mut scene);
        scene.config_sprite(0, ss, TileFlags::empty()).unwrap();
        let frames = vec![SequenceFrame { index: 1, delay: 1 }, SequenceFrame { index: 0, delay: 1 }];
        let seq = scene.resources.add_sequence(Sequence::frames("blink", 0, frames, 0).unwrap());
        scene.set_sprite_animation(0, 0, seq).unwrap();

        assert!(scene.set_layer_position(7, 0, 0).is_err());
        scene.update_animations(0);
        scene.update_animations(1);
        assert_eq!(scene.sprite(0).unwrap().picture(), 0);
        assert_eq!(scene.last_error(), ErrorKind::IdxLayer);
    }

    #[test]
    fn test_animation_delay_override() {
        let mut scene = scene();
        let ss = spriteset(&mut scene);
        scene.config_sprite(0, ss, TileFlags::empty()).unwrap();
        let frames = vec![SequenceFrame { index: 1, delay: 10 }, SequenceFrame { index: 0, delay: 10 }];
        let seq = scene.resources.add_sequence(Sequence::frames("blink", 0, frames, 0).unwrap());
        scene.set_sprite_animation(0, 0, seq).unwrap();
        scene.set_animation_delay(0, Some(1)).unwrap();
        assert_eq!(scene.animation(0).unwrap().delay(), Some(1));

        scene.update_animations(100);
        assert_eq!(scene.sprite(0).unwrap().picture(), 1);
        scene.update_animations(101);
        assert_eq!(scene.sprite(0).unwrap().picture(), 0);

        assert!(scene.set_animation_delay(0, Some(0)).is_err());
        assert_eq!(scene.last_error(), ErrorKind::WrongSize);
        assert!(scene.set_animation_delay(2, None).is_err());
        assert_eq!(scene.last_error(), ErrorKind::IdxAnimation);
    }

    #[test]
    fn test_sprite_world_position() {
        let mut scene = scene();
        scene.set_world_position(10, 4);
        scene.set_sprite_world_position(0, 50, 20).unwrap();
        assert_eq!(scene.sprite(0).unwrap().position(), (40, 16));

        scene.set_world_position(20, 0);
        assert_eq!(scene.sprite(0).unwrap().position(), (30, 20));
        assert_eq!(scene.world_position(), (20, 0));

        scene.set_sprite_position(0, 1, 1).unwrap();
        scene.set_world_position(0, 0);
        assert_eq!(scene.sprite(0).unwrap().position(), (1, 1));
        assert!(scene.set_sprite_world_position(4, 0, 0).is_err());
        assert_eq!(scene.last_error(), ErrorKind::IdxSprite);
    }

    #[test]
    fn test_object_layer_binding() {
        let mut scene = scene();
        let ss = spriteset(&mut scene);
        let mut objects = ObjectList::new();
        objects
            .add_sprite(scene.resources.spriteset(ss).unwrap(), "b", 1, 40, 10)
            .unwrap();
        let list = scene.resources.add_object_list(objects);

        let stale = scene.resources.add_object_list(ObjectList::new());
        scene.resources.delete_object_list(stale).unwrap();
        assert!(scene.set_layer_objects(0, stale, ss).is_err());
        assert_eq!(scene.last_error(), ErrorKind::RefList);

        scene.set_layer_objects(0, list, ss).unwrap();
        let layer = scene.layer(0).unwrap();
        assert!(layer.is_enabled());
        assert_eq!((layer.width(), layer.height()), (44, 12));
        assert!(scene.get_layer_tile(0, 0, 0).is_err());
        let frames = vec![SequenceFrame { index: 1, delay: 1 }];
        let seq = scene.resources.add_sequence(Sequence::frames("s", 0, frames, 0).unwrap());
        assert!(scene.set_tilemap_animation(0, 0, seq).is_err());
    }

    #[test]
    fn test_tilemap_animation_replaces_tiles() {
        let mut scene = scene();
        let (_, map) = tiles(&mut scene);
        scene.set_layer_tilemap(0, map).unwrap();
        let frames = vec![
            SequenceFrame { index: 1, delay: 1 },
            SequenceFrame { index: 3, delay: 1 },
        ];
        let seq = scene.resources.add_sequence(Sequence::frames("flow", 0, frames, 0).unwrap());
        scene.set_tilemap_animation(1, 0, seq).unwrap();

        scene.update_animations(0);
        scene.update_animations(1);
        let tm = scene.resources.tilemap(map).unwrap();
        assert_eq!(tm.get_tile(0, 1).unwrap().index, 3);
        assert_eq!(tm.get_tile(1, 2).unwrap().index, 3);
        assert_eq!(tm.get_tile(1, 1).unwrap().index, 0);

        scene.disable_animation(1).unwrap();
        scene.update_animations(2);
        assert_eq!(scene.resources.tilemap(map).unwrap().get_tile(0, 1).unwrap().index, 3);
    }

    #[test]
    fn test_tileset_animation_copies_into_target() {
        let mut scene = scene();
        let (ts, map) = tiles(&mut scene);
        scene.set_layer_tilemap(0, map).unwrap();
        let frames = vec![
            SequenceFrame { index: 2, delay: 1 },
            SequenceFrame { index: 3, delay: 1 },
        ];
        let seq = scene.resources.add_sequence(Sequence::frames("glow", 4, frames, 0).unwrap());
        scene.set_tileset_animation(0, 0, seq).unwrap();

        scene.update_animations(0);
        assert_eq!(scene.resources.tileset(ts).unwrap().tile_pixels(4), Some(&[2; 64][..]));
        scene.update_animations(1);
        assert_eq!(scene.resources.tileset(ts).unwrap().tile_pixels(4), Some(&[3; 64][..]));
    }

    #[test]
    fn test_palette_animation_requires_cycle() {
        let mut scene = scene();
        let pal = scene.resources.add_palette(Palette::new(8).unwrap());
        let frames = scene.resources.add_sequence(
            Sequence::frames("f", 0, vec![SequenceFrame { index: 0, delay: 1 }], 0).unwrap(),
        );
        assert!(scene.set_palette_animation(0, pal, frames, false).is_err());
        assert_eq!(scene.last_error(), ErrorKind::WrongFormat);

        let strip = ColorStrip { first: 0, count: 2, delay: 5, dir: StripDirection::Forward };
        let cycle = scene.resources.add_sequence(Sequence::cycle("c", vec![strip]).unwrap());
        scene.resources.palette_mut(pal).unwrap().set_color(0, Color::WHITE).unwrap();
        scene.set_palette_animation(0, pal, cycle, false).unwrap();

        scene.update_animations(0);
        scene.update_animations(5);
        let p = scene.resources.palette(pal).unwrap();
        assert_eq!(p.color(0), Some(Color::BLACK));
        assert_eq!(p.color(1), Some(Color::WHITE));
    }

    #[test]
    fn test_bg_color_from_tilemap() {
        let mut scene = scene();
        let (_, map) = tiles(&mut scene);
        scene.set_bg_color_from_tilemap(map).unwrap();
        assert_eq!(scene.bg_color(), Some(Color::new(1, 2, 3)));
        scene.disable_bg_color();
        assert_eq!(scene.bg_color(), None);
    }
}
