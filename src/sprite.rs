use crate::{
    arena::Handle,
    blend::BlendMode,
    common::TileFlags,
    error::{Error, Result},
    palette::Palette,
    spriteset::Spriteset,
};

#[derive(Clone, Debug)]
pub struct Sprite {
    spriteset: Option<Handle<Spriteset>>,
    picture: usize,
    palette: Option<Handle<Palette>>,
    x: i32,
    y: i32,
    /// World-space position, tracked against `Scene::set_world_position`.
    world: Option<(i32, i32)>,
    sx: f32,
    sy: f32,
    flags: TileFlags,
    blend: BlendMode,
    collision_enabled: bool,
    collision: bool,
    masked: bool,
    enabled: bool,
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            spriteset: None,
            picture: 0,
            palette: None,
            x: 0,
            y: 0,
            world: None,
            sx: 1.0,
            sy: 1.0,
            flags: TileFlags::empty(),
            blend: BlendMode::None,
            collision_enabled: false,
            collision: false,
            masked: false,
            enabled: false,
        }
    }
}

impl Sprite {
    pub(crate) fn configure(&mut self, spriteset: Handle<Spriteset>, flags: TileFlags) {
        self.spriteset = Some(spriteset);
        self.flags = flags;
        self.picture = 0;
        self.enabled = true;
    }

    pub fn spriteset(&self) -> Option<Handle<Spriteset>> {
        self.spriteset
    }

    pub fn picture(&self) -> usize {
        self.picture
    }

    pub(crate) fn set_picture(&mut self, picture: usize) {
        self.picture = picture;
    }

    /// Palette override; `None` draws with the spriteset palette.
    pub fn palette(&self) -> Option<Handle<Palette>> {
        self.palette
    }

    pub fn set_palette(&mut self, palette: Option<Handle<Palette>>) {
        self.palette = palette;
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Screen position; leaves world space.
    pub fn set_position(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
        self.world = None;
    }

    pub fn world_position(&self) -> Option<(i32, i32)> {
        self.world
    }

    pub(crate) fn set_world_position(&mut self, x: i32, y: i32, origin: (i32, i32)) {
        self.world = Some((x, y));
        self.follow_world(origin);
    }

    /// Recomputes the screen position of a world-space sprite.
    pub(crate) fn follow_world(&mut self, origin: (i32, i32)) {
        if let Some((x, y)) = self.world {
            self.x = x.saturating_sub(origin.0);
            self.y = y.saturating_sub(origin.1);
        }
    }

    pub fn scaling(&self) -> (f32, f32) {
        (self.sx, self.sy)
    }

    pub fn set_scaling(&mut self, sx: f32, sy: f32) -> Result<()> {
        if !(sx > 0.0 && sy > 0.0) {
            return Err(Error::WrongSize(format!("sprite scaling {}x{}", sx, sy)));
        }
        self.sx = sx;
        self.sy = sy;
        Ok(())
    }

    pub fn reset_scaling(&mut self) {
        self.sx = 1.0;
        self.sy = 1.0;
    }

    pub fn flags(&self) -> TileFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: TileFlags) {
        self.flags = flags;
    }

    pub fn enable_flag(&mut self, flag: TileFlags, enable: bool) {
        self.flags.set(flag, enable);
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    pub fn set_blend(&mut self, blend: BlendMode) {
        self.blend = blend;
    }

    pub fn collision_enabled(&self) -> bool {
        self.collision_enabled
    }

    pub fn enable_collision(&mut self, enable: bool) {
        self.collision_enabled = enable;
        if !enable {
            self.collision = false;
        }
    }

    /// Whether opaque pixels overlapped another collision-enabled sprite
    /// during the most recent frame.
    pub fn collision(&self) -> bool {
        self.collision
    }

    pub(crate) fn set_collision(&mut self, collision: bool) {
        self.collision = collision;
    }

    pub fn masked(&self) -> bool {
        self.masked
    }

    pub fn set_masked(&mut self, masked: bool) {
        self.masked = masked;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Removes the sprite from compositing; the slot keeps its settings.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.collision = false;
    }

    pub(crate) fn enable(&mut self) {
        self.enabled = self.spriteset.is_some();
    }

    /// On-screen size of a `w` x `h` picture after rotation and scaling.
    pub fn screen_size(&self, w: usize, h: usize) -> (i32, i32) {
        let (ow, oh) = self.oriented(w, h);
        (
            (ow as f32 * self.sx).round() as i32,
            (oh as f32 * self.sy).round() as i32,
        )
    }

    fn oriented(&self, w: usize, h: usize) -> (usize, usize) {
        if self.flags.contains(TileFlags::ROTATE) {
            (h, w)
        } else {
            (w, h)
        }
    }

    /// Picture-local pixel shown at offset (`u`, `v`) from the sprite origin.
    pub fn picture_coords(&self, w: usize, h: usize, u: i32, v: i32) -> (usize, usize) {
        let (ow, oh) = self.oriented(w, h);
        let (dw, dh) = self.screen_size(w, h);
        let mut ou = (u as usize * ow / dw.max(1) as usize).min(ow - 1);
        let mut ov = (v as usize * oh / dh.max(1) as usize).min(oh - 1);
        if self.flags.contains(TileFlags::FLIP_X) {
            ou = ow - 1 - ou;
        }
        if self.flags.contains(TileFlags::FLIP_Y) {
            ov = oh - 1 - ov;
        }
        if self.flags.contains(TileFlags::ROTATE) {
            (ov, ou)
        } else {
            (ou, ov)
        }
    }
}
