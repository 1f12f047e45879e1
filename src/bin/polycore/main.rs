//! polycore - terminal polyphonic synthesizer
//!
//! Run with: cargo run --release [voices] [mono|poly|unison]
//!
//! Logs go to polycore.log; set RUST_LOG to change the level.

mod app;
mod keyboard;
mod ui;

use std::fs::File;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use polycore::{EngineConfig, SynthMode};

use app::App;

const LOG_FILE: &str = "polycore.log";

fn init_logging() -> EyreResult<()> {
    let file = File::create(LOG_FILE).wrap_err_with(|| format!("failed to create {LOG_FILE}"))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn parse_args() -> EyreResult<EngineConfig> {
    let mut config = EngineConfig::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "mono" => config.mode = SynthMode::Mono,
            "poly" => config.mode = SynthMode::Poly,
            "unison" => config.mode = SynthMode::Unison,
            voices => {
                config.max_voices = voices
                    .parse()
                    .map_err(|_| eyre!("expected a voice count or mode, got {voices:?}"))?;
            }
        }
    }
    Ok(config)
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    init_logging()?;

    let config = parse_args()?;
    App::new(config).run()
}
