use log::debug;

use crate::{
    arena::{Arena, Handle},
    bitmap::Bitmap,
    error::{Error, Result},
    objects::ObjectList,
    palette::Palette,
    sequence::{Sequence, SequencePack},
    spriteset::Spriteset,
    tilemap::Tilemap,
    tileset::Tileset,
};

/// Owner of every resource. Slots refer to resources by handle only.
#[derive(Default)]
pub struct Resources {
    palettes: Arena<Palette>,
    bitmaps: Arena<Bitmap>,
    tilesets: Arena<Tileset>,
    tilemaps: Arena<Tilemap>,
    spritesets: Arena<Spriteset>,
    sequences: Arena<Sequence>,
    sequence_packs: Arena<SequencePack>,
    object_lists: Arena<ObjectList>,
}

macro_rules! impl_resource {
    ($ty:ident, $field:ident, $err:expr, $get:ident, $get_mut:ident, $add:ident, $delete:ident) => {
        pub fn $get(&self, handle: Handle<$ty>) -> Result<&$ty> {
            self.$field.get(handle).ok_or($err)
        }

        pub fn $get_mut(&mut self, handle: Handle<$ty>) -> Result<&mut $ty> {
            self.$field.get_mut(handle).ok_or($err)
        }

        pub fn $add(&mut self, value: $ty) -> Handle<$ty> {
            self.$field.insert(value)
        }

        pub fn $delete(&mut self, handle: Handle<$ty>) -> Result<$ty> {
            let value = self.$field.remove(handle).ok_or($err)?;
            debug!("Deleted {} {:?}", stringify!($ty), handle);
            Ok(value)
        }
    };
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    impl_resource!(Palette, palettes, Error::RefPalette, palette, palette_mut, add_palette, delete_palette);
    impl_resource!(Bitmap, bitmaps, Error::RefBitmap, bitmap, bitmap_mut, add_bitmap, delete_bitmap);
    impl_resource!(Tileset, tilesets, Error::RefTileset, tileset, tileset_mut, add_tileset, delete_tileset);
    impl_resource!(Tilemap, tilemaps, Error::RefTilemap, tilemap, tilemap_mut, add_tilemap, delete_tilemap);
    impl_resource!(Spriteset, spritesets, Error::RefSpriteset, spriteset, spriteset_mut, add_spriteset, delete_spriteset);
    impl_resource!(Sequence, sequences, Error::RefSequence, sequence, sequence_mut, add_sequence, delete_sequence);
    impl_resource!(ObjectList, object_lists, Error::RefObjectList, object_list, object_list_mut, add_object_list, delete_object_list);

    pub fn sequence_pack(&self, handle: Handle<SequencePack>) -> Result<&SequencePack> {
        self.sequence_packs.get(handle).ok_or(Error::RefSequencePack)
    }

    pub fn add_sequence_pack(&mut self, pack: SequencePack) -> Handle<SequencePack> {
        self.sequence_packs.insert(pack)
    }

    /// Adds a sequence to a pack, registering it under its own name.
    pub fn add_sequence_to_pack(
        &mut self,
        pack: Handle<SequencePack>,
        sequence: Handle<Sequence>,
    ) -> Result<()> {
        let name = self.sequence(sequence)?.name.clone();
        let pack = self
            .sequence_packs
            .get_mut(pack)
            .ok_or(Error::RefSequencePack)?;
        pack.add(&name, sequence);
        Ok(())
    }

    pub fn find_sequence(&self, pack: Handle<SequencePack>, name: &str) -> Result<Handle<Sequence>> {
        self.sequence_pack(pack)?
            .find(name)
            .filter(|&h| self.sequences.contains(h))
            .ok_or(Error::RefSequence)
    }

    /// Deletes the pack together with the sequences it holds.
    pub fn delete_sequence_pack(&mut self, handle: Handle<SequencePack>) -> Result<()> {
        let pack = self
            .sequence_packs
            .remove(handle)
            .ok_or(Error::RefSequencePack)?;
        for &seq in pack.sequences() {
            self.sequences.remove(seq);
        }
        debug!("Deleted sequence pack '{}'", pack.name);
        Ok(())
    }

    pub fn clone_palette(&mut self, handle: Handle<Palette>) -> Result<Handle<Palette>> {
        let copy = self.palette(handle)?.clone();
        Ok(self.palettes.insert(copy))
    }

    /// Deep copy, including the attached palette.
    pub fn clone_bitmap(&mut self, handle: Handle<Bitmap>) -> Result<Handle<Bitmap>> {
        let mut copy = self.bitmap(handle)?.clone();
        if let Some(pal) = copy.palette() {
            copy.set_palette(Some(self.clone_palette(pal)?));
        }
        Ok(self.bitmaps.insert(copy))
    }

    /// Deep copy of pixels and palette; the sequence pack stays shared.
    pub fn clone_tileset(&mut self, handle: Handle<Tileset>) -> Result<Handle<Tileset>> {
        let mut copy = self.tileset(handle)?.clone();
        copy.set_palette(self.clone_palette(copy.palette())?);
        Ok(self.tilesets.insert(copy))
    }

    pub fn clone_tilemap(&mut self, handle: Handle<Tilemap>) -> Result<Handle<Tilemap>> {
        let copy = self.tilemap(handle)?.clone();
        Ok(self.tilemaps.insert(copy))
    }

    pub fn clone_spriteset(&mut self, handle: Handle<Spriteset>) -> Result<Handle<Spriteset>> {
        let (mut bitmap, entries, pal) = {
            let src = self.spriteset(handle)?;
            (src.bitmap().clone(), src.entries().to_vec(), src.palette())
        };
        bitmap.set_palette(Some(self.clone_palette(pal)?));
        let copy = Spriteset::new(bitmap, entries)?;
        Ok(self.spritesets.insert(copy))
    }

    pub fn clone_sequence(&mut self, handle: Handle<Sequence>) -> Result<Handle<Sequence>> {
        let copy = self.sequence(handle)?.clone();
        Ok(self.sequences.insert(copy))
    }

    pub fn clone_object_list(&mut self, handle: Handle<ObjectList>) -> Result<Handle<ObjectList>> {
        let copy = self.object_list(handle)?.clone();
        Ok(self.object_lists.insert(copy))
    }

    /// Bounds-checked block copy between tilemaps, which may be the same one.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_tiles(
        &mut self,
        src: Handle<Tilemap>,
        src_row: usize,
        src_col: usize,
        rows: usize,
        cols: usize,
        dst: Handle<Tilemap>,
        dst_row: usize,
        dst_col: usize,
    ) -> Result<()> {
        let block = self.tilemap(src)?.block(src_row, src_col, rows, cols)?;
        self.tilemap_mut(dst)?
            .set_block(dst_row, dst_col, rows, cols, &block)
    }

    /// Applies `mix` with the two sources and destination all held here.
    pub fn mix_palettes(
        &mut self,
        src1: Handle<Palette>,
        src2: Handle<Palette>,
        dst: Handle<Palette>,
        factor: u8,
    ) -> Result<()> {
        let a = self.palette(src1)?.clone();
        let b = self.palette(src2)?.clone();
        self.palette_mut(dst)?.mix(&a, &b, factor)
    }

    pub fn palettes(&self) -> impl Iterator<Item = (Handle<Palette>, &Palette)> {
        self.palettes.iter()
    }

    pub fn tilesets(&self) -> impl Iterator<Item = (Handle<Tileset>, &Tileset)> {
        self.tilesets.iter()
    }

    pub fn tilemaps(&self) -> impl Iterator<Item = (Handle<Tilemap>, &Tilemap)> {
        self.tilemaps.iter()
    }

    pub fn spritesets(&self) -> impl Iterator<Item = (Handle<Spriteset>, &Spriteset)> {
        self.spritesets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::{Color, Tile},
        error::ErrorKind,
        sequence::SequenceFrame,
    };

    #[test]
    fn test_deleted_handles_fail_with_ref_errors() {
        let mut res = Resources::new();
        let pal = res.add_palette(Palette::new(4).unwrap());
        let ts = res.add_tileset(Tileset::new(2, 8, 8, pal).unwrap());
        let map = res.add_tilemap(Tilemap::new(2, 2, vec![], None, Some(ts)).unwrap());

        res.delete_tileset(ts).unwrap();
        assert_eq!(res.tileset(ts).unwrap_err().kind(), ErrorKind::RefTileset);
        assert!(res.delete_tileset(ts).is_err());
        assert!(res.tilemap(map).is_ok());

        res.delete_palette(pal).unwrap();
        assert_eq!(res.palette(pal).unwrap_err().kind(), ErrorKind::RefPalette);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut res = Resources::new();
        let pal = res.add_palette(Palette::new(4).unwrap());
        let ts = res.add_tileset(Tileset::new(1, 2, 2, pal).unwrap());
        let copy = res.clone_tileset(ts).unwrap();

        res.tileset_mut(copy).unwrap().set_pixels(1, &[3; 4], 2).unwrap();
        assert_eq!(res.tileset(ts).unwrap().tile_pixels(1), Some(&[0; 4][..]));

        let copy_pal = res.tileset(copy).unwrap().palette();
        assert_ne!(copy_pal, pal);
        res.palette_mut(copy_pal)
            .unwrap()
            .set_color(0, Color::WHITE)
            .unwrap();
        assert_eq!(res.palette(pal).unwrap().color(0), Some(Color::BLACK));
    }

    #[test]
    fn test_copy_tiles_between_maps() {
        let mut res = Resources::new();
        let tiles = (1..=9).map(Tile::new).collect();
        let a = res.add_tilemap(Tilemap::new(3, 3, tiles, None, None).unwrap());
        let b = res.add_tilemap(Tilemap::new(2, 2, vec![], None, None).unwrap());

        res.copy_tiles(a, 1, 1, 2, 2, b, 0, 0).unwrap();
        assert_eq!(res.tilemap(b).unwrap().get_tile(1, 1).unwrap(), Tile::new(9));
        assert!(res.copy_tiles(a, 0, 0, 3, 3, b, 0, 0).is_err());
        assert!(res.copy_tiles(a, 2, 2, 2, 1, b, 0, 0).is_err());
    }

    #[test]
    fn test_pack_owns_sequences() {
        let mut res = Resources::new();
        let frames = vec![SequenceFrame { index: 1, delay: 2 }];
        let seq = res.add_sequence(Sequence::frames("spin", 0, frames, 0).unwrap());
        let pack = res.add_sequence_pack(SequencePack::new("coins"));
        res.add_sequence_to_pack(pack, seq).unwrap();

        assert_eq!(res.find_sequence(pack, "spin").unwrap(), seq);
        assert_eq!(
            res.find_sequence(pack, "nope").unwrap_err().kind(),
            ErrorKind::RefSequence
        );

        res.delete_sequence_pack(pack).unwrap();
        assert!(res.sequence(seq).is_err());
        assert_eq!(
            res.find_sequence(pack, "spin").unwrap_err().kind(),
            ErrorKind::RefSequencePack
        );
    }
}
