use crate::{
    common::TileFlags,
    error::{Error, Result},
    spriteset::Spriteset,
};

/// Item placed in layer space, drawn with one picture of the layer's spriteset.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    pub id: u16,
    /// Spriteset picture index.
    pub gid: usize,
    pub x: i32,
    pub y: i32,
    pub width: usize,
    pub height: usize,
    pub flags: TileFlags,
    pub visible: bool,
}

impl ObjectInfo {
    fn right(&self) -> i64 {
        i64::from(self.x) + self.width as i64
    }

    fn bottom(&self) -> i64 {
        i64::from(self.y) + self.height as i64
    }

    /// Whether row `y` of layer space crosses the object within columns `x1..x2`.
    pub(crate) fn in_line(&self, x1: i64, x2: i64, y: i64) -> bool {
        y >= i64::from(self.y) && y < self.bottom() && x1 < self.right() && x2 > i64::from(self.x)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectList {
    objects: Vec<ObjectInfo>,
}

impl ObjectList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: ObjectInfo) -> Result<()> {
        if object.width == 0 || object.height == 0 {
            return Err(Error::WrongSize(format!(
                "object {} is {}x{}",
                object.id, object.width, object.height
            )));
        }
        self.objects.push(object);
        Ok(())
    }

    /// Adds the picture `name` of `spriteset`, sized to the picture.
    pub fn add_sprite(&mut self, spriteset: &Spriteset, name: &str, id: u16, x: i32, y: i32) -> Result<()> {
        let gid = spriteset.find(name).ok_or(Error::RefSpriteset)?;
        let entry = spriteset.entry(gid)?;
        self.add(ObjectInfo {
            id,
            gid,
            x,
            y,
            width: entry.w,
            height: entry.h,
            flags: TileFlags::empty(),
            visible: true,
        })
    }

    pub fn objects(&self) -> &[ObjectInfo] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects overlapping the `width` x `height` region at (`x`, `y`).
    pub fn in_region(&self, x: i32, y: i32, width: usize, height: usize) -> impl Iterator<Item = &ObjectInfo> {
        let (x1, y1) = (i64::from(x), i64::from(y));
        let (x2, y2) = (x1 + width as i64, y1 + height as i64);
        self.objects
            .iter()
            .filter(move |o| x1 < o.right() && x2 > i64::from(o.x) && y1 < o.bottom() && y2 > i64::from(o.y))
    }

    /// Layer size covering every object from the origin; at least 1x1.
    pub fn extent(&self) -> (usize, usize) {
        let (w, h) = self
            .objects
            .iter()
            .fold((1, 1), |(w, h), o| (w.max(o.right()), h.max(o.bottom())));
        (w.min(i32::MAX as i64) as usize, h.min(i32::MAX as i64) as usize)
    }
}
