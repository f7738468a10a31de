use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use retro_raster::{
    config::{get_global_config_path, GlobalConfig},
    persist,
};

/// Renders frames of a project scene to PNG files.
#[derive(Parser, Debug)]
struct Args {
    /// Project directory; defaults to the one stored in the global config
    #[arg(long)]
    project: Option<PathBuf>,

    /// Remember `--project` in the global config
    #[arg(long)]
    save_project_dir: bool,

    /// Directory receiving frame_NNNN.png files
    #[arg(long, default_value = "frames")]
    output: PathBuf,

    #[arg(long, default_value_t = 1)]
    frames: u32,

    /// Time units between consecutive frames
    #[arg(long, default_value_t = 1)]
    time_step: u32,
}

fn frame_time(frame: u32, time_step: u32) -> Result<u32> {
    match frame.checked_mul(time_step) {
        Some(time) => Ok(time),
        None => bail!("Frame {} time overflows with --time-step {}", frame, time_step),
    }
}

pub fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config_path = get_global_config_path()?;
    let mut global_config = GlobalConfig::load(&config_path)?;
    if let Some(dir) = &args.project {
        if args.save_project_dir {
            global_config.set_project_dir(dir.clone());
            global_config.save(&config_path)?;
        }
    }
    let project_dir = match args.project.as_ref().or(global_config.project_dir.as_ref()) {
        Some(dir) => global_config.resolve(dir),
        None => bail!("Project directory not set."),
    };

    let (mut engine, _project) = persist::load_project(&project_dir)
        .with_context(|| format!("Unable to load project {}", project_dir.display()))?;

    for frame in 0..args.frames {
        engine.draw_frame(frame_time(frame, args.time_step)?)?;
        let path = args.output.join(format!("frame_{:04}.png", frame));
        persist::write_frame_png(&path, engine.framebuffer())?;
    }
    info!("Rendered {} frames into {}", args.frames, args.output.display());
    Ok(())
}
