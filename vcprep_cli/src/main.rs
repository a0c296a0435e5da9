//! `vcprep`: build a voice-conversion dataset from a speaker corpus.

mod args;
mod logging;

use anyhow::{Context, Result};
use tracing::info;
use vcprep_core::SpectrogramExtractor;
use vcprep_tools::manifest_to_jsonl;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Some(args) = args::parse(std::env::args_os())? else {
        return Ok(());
    };
    let log = logging::init(args.log_dir.as_deref())?;

    let config = args.pipeline_config();
    let extractor = SpectrogramExtractor::new(args.feature_config())?;
    let summary = vcprep_core::run(&config, &extractor).context("dataset build failed")?;
    info!(
        "dataset written to {} (seed {}): {} train, {} in_test, {} out_test, {} mel dims",
        config.output_dir.display(),
        summary.seed,
        summary.train,
        summary.in_test,
        summary.out_test,
        summary.feature_dim
    );

    if let Some(jsonl) = &args.jsonl {
        manifest_to_jsonl::convert(&config.output_dir, jsonl)
            .with_context(|| format!("failed to export {}", jsonl.display()))?;
    }

    if let Some(path) = log.log_path() {
        info!("run log: {}", path.display());
    }
    log.close();
    Ok(())
}
