use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use hashbrown::HashMap;
use itertools::Itertools;
use json_pretty_compact::PrettyCompactFormatter;
use log::{info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Serializer;

use crate::{
    arena::Handle,
    bitmap::Bitmap,
    blend::BlendMode,
    common::{Color, Rect, Tile, TileFlags},
    config::EngineConfig,
    engine::Engine,
    error::{Error, Result},
    framebuffer::Framebuffer,
    layer::Parallax,
    palette::Palette,
    resources::Resources,
    scene::Scene,
    sequence::{Sequence, SequencePack},
    spriteset::{SpriteEntry, Spriteset},
    tilemap::Tilemap,
    tileset::{TileAttributes, Tileset},
};

fn io_error(path: &Path, e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => Error::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    }
}

pub fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    info!("Saving {}", path.display());
    let formatter = PrettyCompactFormatter::new();
    let mut data_bytes = vec![];
    let mut ser = Serializer::with_formatter(&mut data_bytes, formatter);
    data.serialize(&mut ser)
        .map_err(|e| Error::WrongFormat(format!("{}: {}", path.display(), e)))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    fs::write(path, &data_bytes).map_err(|e| io_error(path, e))?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    info!("Loading {}", path.display());
    let data_bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let data: T = serde_json::from_slice(&data_bytes)
        .map_err(|e| Error::WrongFormat(format!("{}: {}", path.display(), e)))?;
    Ok(data)
}

pub fn load_palette(path: &Path) -> Result<Palette> {
    let pal: Palette = load_json(path)?;
    Palette::from_colors(&pal.name, pal.colors().to_vec())
}

pub fn save_palette(path: &Path, palette: &Palette) -> Result<()> {
    save_json(path, palette)
}

fn png_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::WrongFormat(format!("{}: {}", path.display(), e))
}

/// Reads an 8-bit indexed PNG; its PLTE chunk becomes the returned palette.
pub fn read_indexed_png(path: &Path) -> Result<(Bitmap, Palette)> {
    info!("Loading {}", path.display());
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info().map_err(|e| png_error(path, e))?;

    let info = reader.info();
    if info.color_type != png::ColorType::Indexed || info.bit_depth != png::BitDepth::Eight {
        return Err(Error::Unsupported(format!(
            "{}: {:?} {:?} image, expected 8-bit indexed",
            path.display(),
            info.bit_depth,
            info.color_type
        )));
    }
    let colors = info
        .palette
        .as_ref()
        .map(|plte| {
            plte.chunks_exact(3)
                .map(|c| Color::new(c[0], c[1], c[2]))
                .collect_vec()
        })
        .ok_or_else(|| Error::WrongFormat(format!("{}: missing palette", path.display())))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf).map_err(|e| png_error(path, e))?;
    let (width, height) = (frame.width as usize, frame.height as usize);
    let mut bitmap = Bitmap::new(width, height, 8)?;
    for y in 0..height {
        let src = &buf[y * frame.line_size..][..width];
        if let Some(row) = bitmap.row_mut(y) {
            row[..width].copy_from_slice(src);
        }
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((bitmap, Palette::from_colors(&name, colors)?))
}

/// Writes an 8bpp bitmap as an indexed PNG with `palette` as its PLTE chunk.
pub fn write_indexed_png(path: &Path, bitmap: &Bitmap, palette: &Palette) -> Result<()> {
    info!("Saving {}", path.display());
    if bitmap.bpp() != 8 {
        return Err(Error::Unsupported(format!("{}bpp bitmap", bitmap.bpp())));
    }
    let plte = palette
        .colors()
        .iter()
        .flat_map(|c| [c.r, c.g, c.b])
        .collect_vec();
    let data = (0..bitmap.height())
        .filter_map(|y| bitmap.row(y))
        .flat_map(|row| row[..bitmap.width()].iter().copied())
        .collect_vec();

    let file = create_file(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), bitmap.width() as u32, bitmap.height() as u32);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(plte);
    let mut writer = encoder.write_header().map_err(|e| png_error(path, e))?;
    writer.write_image_data(&data).map_err(|e| png_error(path, e))?;
    Ok(())
}

/// Writes a composited frame as an RGBA PNG.
pub fn write_frame_png(path: &Path, frame: &Framebuffer) -> Result<()> {
    info!("Saving {}", path.display());
    let file = create_file(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width() as u32, frame.height() as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(|e| png_error(path, e))?;
    writer
        .write_image_data(&frame.to_rgba())
        .map_err(|e| png_error(path, e))?;
    Ok(())
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    File::create(path).map_err(|e| io_error(path, e))
}

#[derive(Serialize, Deserialize)]
struct TilesetFile {
    name: String,
    tile_width: usize,
    tile_height: usize,
    palette: String,
    tiles: Vec<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<TileAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequences: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TilemapFile {
    name: String,
    rows: usize,
    cols: usize,
    tileset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bg_color: Option<Color>,
    tiles: Vec<u32>,
}

#[derive(Serialize, Deserialize)]
struct SpritesetFile {
    name: String,
    bitmap: String,
    sprites: Vec<SpriteEntry>,
}

#[derive(Serialize, Deserialize)]
struct SequencePackFile {
    name: String,
    sequences: Vec<Sequence>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerSetup {
    pub layer: usize,
    pub tilemap: Option<String>,
    pub bitmap: Option<String>,
    pub x: i32,
    pub y: i32,
    pub blend: BlendMode,
    pub priority: bool,
    pub clip: Option<Rect>,
    pub mosaic: Option<(i32, i32)>,
    pub scaling: Option<(f32, f32)>,
    pub parallax: Option<Parallax>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteSetup {
    pub sprite: usize,
    pub spriteset: String,
    /// Picture name inside the spriteset; the first picture when absent.
    pub picture: Option<String>,
    pub x: i32,
    pub y: i32,
    pub flags: u16,
    pub blend: BlendMode,
    pub collision: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnimationTargetSetup {
    Palette {
        palette: String,
        #[serde(default)]
        blend: bool,
    },
    Tileset {
        layer: usize,
    },
    Tilemap {
        layer: usize,
    },
    Sprite {
        sprite: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationSetup {
    pub animation: usize,
    pub pack: String,
    pub sequence: String,
    pub target: AnimationTargetSetup,
}

/// Contents of a project's `scene.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneFile {
    pub config: EngineConfig,
    pub bg_color: Option<Color>,
    pub layers: Vec<LayerSetup>,
    pub sprites: Vec<SpriteSetup>,
    pub animations: Vec<AnimationSetup>,
}

/// Resources of a project directory, addressed by file name.
pub struct Project {
    dir: PathBuf,
    pub palettes: HashMap<String, Handle<Palette>>,
    pub bitmaps: HashMap<String, Handle<Bitmap>>,
    pub tilesets: HashMap<String, Handle<Tileset>>,
    pub tilemaps: HashMap<String, Handle<Tilemap>>,
    pub spritesets: HashMap<String, Handle<Spriteset>>,
    pub sequence_packs: HashMap<String, Handle<SequencePack>>,
}

fn file_names(dir: &Path, ext: &str) -> Result<Vec<String>> {
    let pattern = format!("{}/*.{}", dir.display(), ext);
    let paths = glob::glob(&pattern).map_err(|e| Error::WrongFormat(e.to_string()))?;
    let mut names = vec![];
    for entry in paths {
        let path = entry.map_err(|e| Error::Io {
            path: e.path().to_path_buf(),
            message: e.to_string(),
        })?;
        if let Some(stem) = path.file_stem() {
            names.push(stem.to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn name_of<T>(map: &HashMap<String, Handle<T>>, handle: Handle<T>, err: Error) -> Result<&str> {
    map.iter()
        .find(|(_, &h)| h == handle)
        .map(|(name, _)| name.as_str())
        .ok_or(err)
}

impl Project {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            palettes: HashMap::new(),
            bitmaps: HashMap::new(),
            tilesets: HashMap::new(),
            tilemaps: HashMap::new(),
            spritesets: HashMap::new(),
            sequence_packs: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, kind: &str, name: &str, ext: &str) -> PathBuf {
        self.dir.join(kind).join(format!("{}.{}", name, ext))
    }

    /// Loads every resource file found in the project directory.
    pub fn load(res: &mut Resources, dir: &Path) -> Result<Self> {
        let mut project = Self::new(dir);
        for name in file_names(&dir.join("Palettes"), "json")? {
            project.load_palette(res, &name)?;
        }
        for name in file_names(&dir.join("Bitmaps"), "png")? {
            project.load_bitmap(res, &name)?;
        }
        for name in file_names(&dir.join("Sequences"), "json")? {
            project.load_sequence_pack(res, &name)?;
        }
        for name in file_names(&dir.join("Tilesets"), "json")? {
            project.load_tileset(res, &name)?;
        }
        for name in file_names(&dir.join("Tilemaps"), "json")? {
            project.load_tilemap(res, &name)?;
        }
        for name in file_names(&dir.join("Spritesets"), "json")? {
            project.load_spriteset(res, &name)?;
        }
        info!(
            "Loaded project {}: {} tilesets, {} tilemaps, {} spritesets",
            dir.display(),
            project.tilesets.len(),
            project.tilemaps.len(),
            project.spritesets.len()
        );
        Ok(project)
    }

    pub fn load_palette(&mut self, res: &mut Resources, name: &str) -> Result<Handle<Palette>> {
        if let Some(&h) = self.palettes.get(name) {
            return Ok(h);
        }
        let pal = load_palette(&self.path("Palettes", name, "json"))?;
        let h = res.add_palette(pal);
        self.palettes.insert(name.to_string(), h);
        Ok(h)
    }

    pub fn load_bitmap(&mut self, res: &mut Resources, name: &str) -> Result<Handle<Bitmap>> {
        if let Some(&h) = self.bitmaps.get(name) {
            return Ok(h);
        }
        let (mut bitmap, palette) = read_indexed_png(&self.path("Bitmaps", name, "png"))?;
        bitmap.set_palette(Some(res.add_palette(palette)));
        let h = res.add_bitmap(bitmap);
        self.bitmaps.insert(name.to_string(), h);
        Ok(h)
    }

    pub fn load_sequence_pack(&mut self, res: &mut Resources, name: &str) -> Result<Handle<SequencePack>> {
        if let Some(&h) = self.sequence_packs.get(name) {
            return Ok(h);
        }
        let file: SequencePackFile = load_json(&self.path("Sequences", name, "json"))?;
        for seq in &file.sequences {
            seq.validate()?;
        }
        let pack = res.add_sequence_pack(SequencePack::new(&file.name));
        for seq in file.sequences {
            let seq = res.add_sequence(seq);
            res.add_sequence_to_pack(pack, seq)?;
        }
        self.sequence_packs.insert(name.to_string(), pack);
        Ok(pack)
    }

    pub fn load_tileset(&mut self, res: &mut Resources, name: &str) -> Result<Handle<Tileset>> {
        if let Some(&h) = self.tilesets.get(name) {
            return Ok(h);
        }
        let file: TilesetFile = load_json(&self.path("Tilesets", name, "json"))?;
        let palette = self.load_palette(res, &file.palette)?;
        let mut tileset = Tileset::new(file.tiles.len(), file.tile_width, file.tile_height, palette)?;
        for (i, pixels) in file.tiles.iter().enumerate() {
            tileset.set_pixels(i + 1, pixels, file.tile_width)?;
        }
        if file.attributes.len() > file.tiles.len() {
            return Err(Error::WrongSize(format!(
                "{} attributes for {} tiles",
                file.attributes.len(),
                file.tiles.len()
            )));
        }
        for (i, attr) in file.attributes.into_iter().enumerate() {
            tileset.set_attributes(i + 1, attr)?;
        }
        if let Some(pack) = &file.sequences {
            tileset.set_sequence_pack(Some(self.load_sequence_pack(res, pack)?));
        }
        let h = res.add_tileset(tileset);
        self.tilesets.insert(name.to_string(), h);
        Ok(h)
    }

    pub fn load_tilemap(&mut self, res: &mut Resources, name: &str) -> Result<Handle<Tilemap>> {
        if let Some(&h) = self.tilemaps.get(name) {
            return Ok(h);
        }
        let file: TilemapFile = load_json(&self.path("Tilemaps", name, "json"))?;
        let tileset = match &file.tileset {
            Some(ts) => Some(self.load_tileset(res, ts)?),
            None => None,
        };
        let tiles = file.tiles.iter().map(|&w| Tile::from_bits(w)).collect();
        let map = Tilemap::new(file.rows, file.cols, tiles, file.bg_color, tileset)?;
        let h = res.add_tilemap(map);
        self.tilemaps.insert(name.to_string(), h);
        Ok(h)
    }

    pub fn load_spriteset(&mut self, res: &mut Resources, name: &str) -> Result<Handle<Spriteset>> {
        if let Some(&h) = self.spritesets.get(name) {
            return Ok(h);
        }
        let file: SpritesetFile = load_json(&self.path("Spritesets", name, "json"))?;
        let bitmap = self.load_bitmap(res, &file.bitmap)?;
        let spriteset = Spriteset::new(res.bitmap(bitmap)?.clone(), file.sprites)?;
        let h = res.add_spriteset(spriteset);
        self.spritesets.insert(name.to_string(), h);
        Ok(h)
    }

    pub fn save_palette(&self, res: &Resources, name: &str) -> Result<()> {
        let h = *self.palettes.get(name).ok_or(Error::RefPalette)?;
        let mut pal = res.palette(h)?.clone();
        pal.name = name.to_string();
        save_palette(&self.path("Palettes", name, "json"), &pal)
    }

    pub fn save_bitmap(&self, res: &Resources, name: &str) -> Result<()> {
        let h = *self.bitmaps.get(name).ok_or(Error::RefBitmap)?;
        let bitmap = res.bitmap(h)?;
        let palette = res.palette(bitmap.palette().ok_or(Error::RefPalette)?)?;
        write_indexed_png(&self.path("Bitmaps", name, "png"), bitmap, palette)
    }

    pub fn save_sequence_pack(&self, res: &Resources, name: &str) -> Result<()> {
        let h = *self.sequence_packs.get(name).ok_or(Error::RefSequencePack)?;
        let pack = res.sequence_pack(h)?;
        let sequences = pack
            .sequences()
            .iter()
            .map(|&s| res.sequence(s).cloned())
            .collect::<Result<Vec<_>>>()?;
        let file = SequencePackFile {
            name: pack.name.clone(),
            sequences,
        };
        save_json(&self.path("Sequences", name, "json"), &file)
    }

    pub fn save_tileset(&self, res: &Resources, name: &str) -> Result<()> {
        let h = *self.tilesets.get(name).ok_or(Error::RefTileset)?;
        let ts = res.tileset(h)?;
        let n = ts.num_tiles();
        let file = TilesetFile {
            name: name.to_string(),
            tile_width: ts.tile_width(),
            tile_height: ts.tile_height(),
            palette: name_of(&self.palettes, ts.palette(), Error::RefPalette)?.to_string(),
            tiles: (1..=n)
                .map(|i| ts.tile_pixels(i).map(|p| p.to_vec()).unwrap_or_default())
                .collect(),
            attributes: (1..=n).map(|i| ts.attributes(i).unwrap_or_default()).collect(),
            sequences: match ts.sequence_pack() {
                Some(p) => Some(name_of(&self.sequence_packs, p, Error::RefSequencePack)?.to_string()),
                None => None,
            },
        };
        save_json(&self.path("Tilesets", name, "json"), &file)
    }

    pub fn save_tilemap(&self, res: &Resources, name: &str) -> Result<()> {
        let h = *self.tilemaps.get(name).ok_or(Error::RefTilemap)?;
        let map = res.tilemap(h)?;
        let file = TilemapFile {
            name: name.to_string(),
            rows: map.rows(),
            cols: map.cols(),
            tileset: match map.tileset() {
                Some(ts) => Some(name_of(&self.tilesets, ts, Error::RefTileset)?.to_string()),
                None => None,
            },
            bg_color: map.bg_color(),
            tiles: map.tiles().iter().map(|t| t.to_bits()).collect(),
        };
        save_json(&self.path("Tilemaps", name, "json"), &file)
    }

    /// Saves the spriteset and its bitmap, written under the spriteset's name.
    pub fn save_spriteset(&self, res: &Resources, name: &str) -> Result<()> {
        let h = *self.spritesets.get(name).ok_or(Error::RefSpriteset)?;
        let ss = res.spriteset(h)?;
        write_indexed_png(
            &self.path("Bitmaps", name, "png"),
            ss.bitmap(),
            res.palette(ss.palette())?,
        )?;
        let file = SpritesetFile {
            name: name.to_string(),
            bitmap: name.to_string(),
            sprites: ss.entries().to_vec(),
        };
        save_json(&self.path("Spritesets", name, "json"), &file)
    }

    /// Writes every resource registered in the project.
    pub fn save(&self, res: &Resources) -> Result<()> {
        for name in self.palettes.keys().sorted() {
            self.save_palette(res, name)?;
        }
        for name in self.bitmaps.keys().sorted() {
            self.save_bitmap(res, name)?;
        }
        for name in self.sequence_packs.keys().sorted() {
            self.save_sequence_pack(res, name)?;
        }
        for name in self.tilesets.keys().sorted() {
            self.save_tileset(res, name)?;
        }
        for name in self.tilemaps.keys().sorted() {
            self.save_tilemap(res, name)?;
        }
        for name in self.spritesets.keys().sorted() {
            self.save_spriteset(res, name)?;
        }
        Ok(())
    }

    /// Applies a scene description to `scene`, resolving names through this project.
    pub fn apply_scene(&self, scene: &mut Scene, file: &SceneFile) -> Result<()> {
        match file.bg_color {
            Some(color) => scene.set_bg_color(color),
            None => scene.disable_bg_color(),
        }
        for setup in &file.layers {
            self.apply_layer(scene, setup)?;
        }
        for setup in &file.sprites {
            let ss = *self.spritesets.get(&setup.spriteset).ok_or(Error::RefSpriteset)?;
            let n = setup.sprite;
            scene.config_sprite(n, ss, TileFlags::from_bits_truncate(setup.flags))?;
            if let Some(picture) = &setup.picture {
                let index = scene
                    .resources
                    .spriteset(ss)?
                    .find(picture)
                    .ok_or(Error::IdxPicture(0))?;
                scene.set_sprite_picture(n, index)?;
            }
            scene.set_sprite_position(n, setup.x, setup.y)?;
            scene.set_sprite_blend_mode(n, setup.blend)?;
            scene.enable_sprite_collision(n, setup.collision)?;
        }
        for setup in &file.animations {
            let pack = *self.sequence_packs.get(&setup.pack).ok_or(Error::RefSequencePack)?;
            let seq = scene.resources.find_sequence(pack, &setup.sequence)?;
            let n = setup.animation;
            match &setup.target {
                AnimationTargetSetup::Palette { palette, blend } => {
                    let pal = *self.palettes.get(palette).ok_or(Error::RefPalette)?;
                    scene.set_palette_animation(n, pal, seq, *blend)?;
                }
                AnimationTargetSetup::Tileset { layer } => scene.set_tileset_animation(n, *layer, seq)?,
                AnimationTargetSetup::Tilemap { layer } => scene.set_tilemap_animation(n, *layer, seq)?,
                AnimationTargetSetup::Sprite { sprite } => scene.set_sprite_animation(n, *sprite, seq)?,
            }
        }
        Ok(())
    }

    fn apply_layer(&self, scene: &mut Scene, setup: &LayerSetup) -> Result<()> {
        let n = setup.layer;
        match (&setup.tilemap, &setup.bitmap) {
            (Some(map), _) => {
                let map = *self.tilemaps.get(map).ok_or(Error::RefTilemap)?;
                scene.set_layer_tilemap(n, map)?;
            }
            (None, Some(bitmap)) => {
                let bitmap = *self.bitmaps.get(bitmap).ok_or(Error::RefBitmap)?;
                scene.set_layer_bitmap(n, bitmap)?;
            }
            (None, None) => {
                warn!("Layer {} setup has no tilemap or bitmap", n);
                return Ok(());
            }
        }
        scene.set_layer_position(n, setup.x, setup.y)?;
        scene.set_layer_blend_mode(n, setup.blend)?;
        scene.set_layer_priority(n, setup.priority)?;
        if let Some(clip) = setup.clip {
            scene.set_layer_clip(n, clip.x1, clip.y1, clip.x2, clip.y2)?;
        }
        if let Some((w, h)) = setup.mosaic {
            scene.set_layer_mosaic(n, w, h)?;
        }
        if let Some((sx, sy)) = setup.scaling {
            scene.set_layer_scaling(n, sx, sy)?;
        }
        if let Some(parallax) = setup.parallax {
            scene.set_layer_parallax_factor(n, parallax.factor_x, parallax.factor_y)?;
        }
        Ok(())
    }
}

/// Builds an engine from `dir/scene.json` and the resources beside it.
pub fn load_project(dir: &Path) -> Result<(Engine, Project)> {
    let file: SceneFile = load_json(&dir.join("scene.json"))?;
    let mut engine = Engine::new(file.config.clone())?;
    let project = Project::load(&mut engine.scene.resources, dir)?;
    project.apply_scene(&mut engine.scene, &file)?;
    Ok((engine, project))
}

pub fn save_project(dir: &Path, res: &Resources, project: &Project, scene: &SceneFile) -> Result<()> {
    let target = Project {
        dir: dir.to_path_buf(),
        palettes: project.palettes.clone(),
        bitmaps: project.bitmaps.clone(),
        tilesets: project.tilesets.clone(),
        tilemaps: project.tilemaps.clone(),
        spritesets: project.spritesets.clone(),
        sequence_packs: project.sequence_packs.clone(),
    };
    target.save(res)?;
    save_json(&dir.join("scene.json"), scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        sequence::{SequenceData, SequenceFrame},
    };

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_palette(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::FileNotFound);

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        assert_eq!(load_palette(&bad).unwrap_err().kind(), ErrorKind::WrongFormat);

        let empty = dir.path().join("empty.json");
        fs::write(&empty, r#"{"name": "x", "colors": []}"#).unwrap();
        assert_eq!(load_palette(&empty).unwrap_err().kind(), ErrorKind::WrongSize);
    }

    #[test]
    fn test_indexed_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        let bitmap = Bitmap::from_indexed(3, 2, &[0, 1, 2, 2, 1, 0]).unwrap();
        let palette = Palette::from_colors("pic", vec![Color::BLACK, Color::WHITE, Color::new(1, 2, 3)]).unwrap();

        write_indexed_png(&path, &bitmap, &palette).unwrap();
        let (loaded, loaded_pal) = read_indexed_png(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (3, 2));
        assert_eq!(loaded.pixel(2, 0), Some(2));
        assert_eq!(loaded.pixel(0, 1), Some(2));
        assert_eq!(loaded_pal.colors(), palette.colors());
    }

    #[test]
    fn test_rgba_png_rejected_as_bitmap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        write_frame_png(&path, &Framebuffer::new(2, 2)).unwrap();
        assert_eq!(read_indexed_png(&path).unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_invalid_sequence_pack_allocates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let walk = Sequence::frames("walk", 0, vec![SequenceFrame { index: 1, delay: 2 }], 0).unwrap();
        let empty = Sequence {
            name: "empty".into(),
            target: 0,
            loops: 0,
            data: SequenceData::Frames { frames: vec![] },
        };
        let file = SequencePackFile {
            name: "broken".into(),
            sequences: vec![walk.clone(), empty],
        };
        save_json(&dir.path().join("Sequences").join("broken.json"), &file).unwrap();

        let mut res = Resources::new();
        let mut project = Project::new(dir.path());
        assert!(project.load_sequence_pack(&mut res, "broken").is_err());
        assert!(project.sequence_packs.is_empty());
        assert_eq!(res.add_sequence(walk).index(), 0);
        assert_eq!(res.add_sequence_pack(SequencePack::new("next")).index(), 0);
    }

    #[test]
    fn test_scene_file_defaults() {
        let file: SceneFile = serde_json::from_str(
            r#"{"layers": [{"layer": 1, "tilemap": "sky", "blend": 2}],
                "animations": [{"animation": 0, "pack": "p", "sequence": "s",
                                "target": {"kind": "sprite", "sprite": 3}}]}"#,
        )
        .unwrap();
        assert_eq!(file.config, EngineConfig::default());
        assert_eq!(file.layers[0].blend, BlendMode::Mix50);
        assert_eq!(file.layers[0].x, 0);
        assert_eq!(file.animations[0].target, AnimationTargetSetup::Sprite { sprite: 3 });
    }
}
