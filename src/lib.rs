//! Scanline-based 2D tile and sprite compositor with per-line raster effects.

pub mod animation;
pub mod arena;
pub mod bitmap;
pub mod blend;
pub mod common;
pub mod config;
mod draw;
pub mod engine;
pub mod error;
pub mod framebuffer;
pub mod layer;
pub mod objects;
pub mod palette;
pub mod persist;
pub mod resources;
pub mod scene;
pub mod sequence;
pub mod sprite;
pub mod spriteset;
pub mod tilemap;
pub mod tileset;

pub use arena::Handle;
pub use blend::BlendMode;
pub use common::{Color, Rect, Tile, TileFlags};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use scene::Scene;
