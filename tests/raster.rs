//! Whole-frame rendering: raster callbacks, blending, collisions and animations.

use std::{cell::RefCell, rc::Rc};

use retro_raster::{
    animation::AnimationState,
    bitmap::Bitmap,
    palette::Palette,
    scene::Scene,
    sequence::{Sequence, SequenceFrame},
    spriteset::{SpriteEntry, Spriteset},
    tilemap::Tilemap,
    tileset::Tileset,
    BlendMode, Color, Engine, EngineConfig, Handle, Tile, TileFlags,
};

const COLORS: [Color; 5] = [
    Color::new(0, 0, 0),
    Color::new(255, 0, 0),
    Color::new(0, 255, 0),
    Color::new(0, 0, 255),
    Color::new(255, 255, 0),
];

/// 8x8 tiles, tile N filled with color N; map columns cycle through tiles 1-4.
fn striped_tilemap(scene: &mut Scene, rows: usize, cols: usize) -> Handle<Tilemap> {
    let pal = scene
        .resources
        .add_palette(Palette::from_colors("stripes", COLORS.to_vec()).unwrap());
    let mut ts = Tileset::new(4, 8, 8, pal).unwrap();
    for i in 1..=4 {
        ts.set_pixels(i, &[i as u8; 64], 8).unwrap();
    }
    let ts = scene.resources.add_tileset(ts);
    let tiles = (0..rows * cols)
        .map(|i| Tile::new((i % cols % 4) as u16 + 1))
        .collect();
    scene
        .resources
        .add_tilemap(Tilemap::new(rows, cols, tiles, None, Some(ts)).unwrap())
}

#[test]
fn raster_callback_scrolls_layer_bands() {
    let mut engine = Engine::new(EngineConfig {
        width: 400,
        height: 240,
        layers: 2,
        ..Default::default()
    })
    .unwrap();
    let map = striped_tilemap(&mut engine.scene, 32, 64);
    engine.scene.set_layer_tilemap(0, map).unwrap();
    engine.scene.set_layer_tilemap(1, map).unwrap();

    let positions = Rc::new(RefCell::new(vec![]));
    let recorded = positions.clone();
    engine.set_raster_callback(move |scene, line| {
        match line {
            0 => scene.set_layer_position(1, 0, 0).unwrap(),
            1 => scene.set_layer_position(1, 8, 0).unwrap(),
            32 => scene.set_layer_position(1, 16, 0).unwrap(),
            _ => {}
        }
        recorded.borrow_mut().push(scene.layer(1).unwrap().position().0);
    });
    engine.draw_frame(0).unwrap();

    let positions = positions.borrow();
    assert_eq!(positions.len(), 240);
    let changes: Vec<usize> = (1..positions.len())
        .filter(|&line| positions[line] != positions[line - 1])
        .collect();
    assert_eq!(changes, vec![1, 32]);

    let fb = engine.framebuffer();
    assert_eq!(fb.pixel(0, 0), Some(COLORS[1]));
    assert_eq!(fb.pixel(0, 1), Some(COLORS[2]));
    assert_eq!(fb.pixel(0, 31), Some(COLORS[2]));
    assert_eq!(fb.pixel(0, 32), Some(COLORS[3]));
    assert_eq!(fb.pixel(0, 239), Some(COLORS[3]));
}

#[test]
fn mix50_layer_over_background() {
    let mut engine = Engine::new(EngineConfig {
        width: 16,
        height: 8,
        layers: 1,
        ..Default::default()
    })
    .unwrap();
    let map = striped_tilemap(&mut engine.scene, 1, 1);
    engine.scene.set_layer_tilemap(0, map).unwrap();
    engine.scene.set_layer_blend_mode(0, BlendMode::Mix50).unwrap();
    engine.scene.set_bg_color(Color::new(0, 0, 255));
    engine.draw_frame(0).unwrap();

    let px = engine.framebuffer().pixel(5, 5).unwrap();
    assert!(px.r == 127 || px.r == 128);
    assert_eq!(px.g, 0);
    assert!(px.b == 127 || px.b == 128);
}

fn dot_spriteset(scene: &mut Scene, pictures: usize) -> Handle<Spriteset> {
    let pal = scene
        .resources
        .add_palette(Palette::from_colors("dots", COLORS.to_vec()).unwrap());
    let pixels: Vec<u8> = (0..pictures * 2 * 2).map(|i| (i / 4 % 4) as u8 + 1).collect();
    let mut bitmap = Bitmap::from_indexed(2, pictures * 2, &pixels).unwrap();
    bitmap.set_palette(Some(pal));
    let entries = (0..pictures)
        .map(|i| SpriteEntry {
            name: format!("dot{}", i),
            x: 0,
            y: i * 2,
            w: 2,
            h: 2,
        })
        .collect();
    scene
        .resources
        .add_spriteset(Spriteset::new(bitmap, entries).unwrap())
}

#[test]
fn sprite_collision_follows_overlap() {
    let mut engine = Engine::new(EngineConfig {
        width: 16,
        height: 8,
        ..Default::default()
    })
    .unwrap();
    let ss = dot_spriteset(&mut engine.scene, 1);
    for (n, x) in [(0, 0), (1, 8)] {
        engine.scene.config_sprite(n, ss, TileFlags::empty()).unwrap();
        engine.scene.set_sprite_position(n, x, 2).unwrap();
        engine.scene.enable_sprite_collision(n, true).unwrap();
    }

    engine.draw_frame(0).unwrap();
    assert!(!engine.scene.get_sprite_collision(0).unwrap());
    assert!(!engine.scene.get_sprite_collision(1).unwrap());

    engine.scene.set_sprite_position(1, 1, 3).unwrap();
    engine.draw_frame(1).unwrap();
    assert!(engine.scene.get_sprite_collision(0).unwrap());
    assert!(engine.scene.get_sprite_collision(1).unwrap());

    engine.scene.set_sprite_position(1, 8, 2).unwrap();
    engine.draw_frame(2).unwrap();
    assert!(!engine.scene.get_sprite_collision(0).unwrap());
}

#[test]
fn one_shot_sprite_animation_visits_each_frame() {
    let mut engine = Engine::new(EngineConfig {
        width: 8,
        height: 4,
        ..Default::default()
    })
    .unwrap();
    let ss = dot_spriteset(&mut engine.scene, 3);
    engine.scene.config_sprite(0, ss, TileFlags::empty()).unwrap();
    let frames = [2, 0, 1]
        .into_iter()
        .map(|index| SequenceFrame { index, delay: 2 })
        .collect();
    let seq = engine
        .scene
        .resources
        .add_sequence(Sequence::frames("walk", 0, frames, 1).unwrap());
    engine.scene.set_sprite_animation(0, 0, seq).unwrap();

    let visited = Rc::new(RefCell::new(vec![]));
    let recorded = visited.clone();
    engine.set_frame_callback(move |scene, _| {
        let picture = scene.sprite(0).unwrap().picture();
        let mut visited = recorded.borrow_mut();
        if visited.last() != Some(&picture) {
            visited.push(picture);
        }
    });
    for time in 0..12 {
        engine.draw_frame(time).unwrap();
    }

    assert_eq!(*visited.borrow(), vec![2, 0, 1]);
    assert_eq!(
        engine.scene.get_animation_state(0).unwrap(),
        AnimationState::Inactive
    );
}
