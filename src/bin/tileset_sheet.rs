use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;

use retro_raster::{bitmap::Bitmap, persist::Project, resources::Resources};

/// Exports a project tileset as an indexed PNG sheet.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    project: PathBuf,

    /// Tileset name (file stem under Tilesets/)
    #[arg(long)]
    tileset: String,

    #[arg(long, default_value_t = 16)]
    columns: usize,

    #[arg(long)]
    output: PathBuf,
}

pub fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    ensure!(args.columns > 0, "--columns must be positive");

    let mut res = Resources::new();
    let mut project = Project::new(&args.project);
    let handle = project
        .load_tileset(&mut res, &args.tileset)
        .with_context(|| format!("Unable to load tileset {}", args.tileset))?;
    let tileset = res.tileset(handle)?;
    let (tw, th) = (tileset.tile_width(), tileset.tile_height());
    let count = tileset.num_tiles();
    let rows = count.div_ceil(args.columns);

    let mut sheet = Bitmap::new(args.columns * tw, rows * th, 8)?;
    for entry in 1..=count {
        let (col, row) = ((entry - 1) % args.columns, (entry - 1) / args.columns);
        for y in 0..th {
            for x in 0..tw {
                sheet.set_pixel(col * tw + x, row * th + y, tileset.pixel(entry, x, y))?;
            }
        }
    }
    let palette = res.palette(tileset.palette())?;
    retro_raster::persist::write_indexed_png(&args.output, &sheet, palette)?;
    Ok(())
}
