use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

use ortho_tiler::cli::{Args, Command};
use ortho_tiler::config::{MergeConfig, TilingConfig};
use ortho_tiler::error::{Result, TilerError};
use ortho_tiler::pipeline;

fn main() {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    if let Err(e) = run(args) {
        error!("{} ({:?} error)", e, e.kind());
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        if n_threads == 0 {
            return Err(TilerError::InvalidThreadCount(n_threads));
        }
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
        {
            warn!("Could not configure thread pool: {}", e);
        } else {
            info!("Using {} threads", n_threads);
        }
    } else {
        info!("Using all available threads");
    }

    match args.command {
        Command::Tile(tile_args) => {
            info!("=== Raster Tiling ===");
            let config = TilingConfig::from(tile_args);
            pipeline::run_tiling(&config)?;
        }
        Command::Merge(merge_args) => {
            info!("=== Detection Merge ===");
            let config = MergeConfig::from(merge_args);
            pipeline::run_merge(&config)?;
        }
    }

    info!("=== Done! ===");
    Ok(())
}
