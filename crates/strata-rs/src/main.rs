//! Command-line entry point: resolve a layered config and print it.

use anyhow::Context;
use clap::Parser;
use log::info;
use strata_rs::config::{ConfigLoader, ConfigMerger, MergerOptions};
use strata_rs::{ResolveRequest, init_logging, render, resolve};

/// Command-line options for the resolver.
#[derive(Parser)]
#[command(name = "strata", version, about = "Resolve layered configuration documents")]
struct Cli {
    /// Base config document
    #[arg(short, long)]
    base: Option<String>,
    /// User config document layered over the base
    #[arg(long)]
    conf_file: Option<String>,
    /// Directory receiving the override snapshots
    #[arg(long, default_value = ".")]
    output_dir: String,
    /// Skip worker-count normalization
    #[arg(long)]
    no_normalize: bool,
    /// Explicit overrides such as `d.d2=3`
    #[arg(value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    info!(
        "starting strata (base_set={}, conf_file_set={}, overrides={})",
        cli.base.is_some(),
        cli.conf_file.is_some(),
        cli.overrides.len()
    );

    let loader =
        ConfigLoader::from_current_dir().context("failed to resolve current working directory")?;
    let mut options = MergerOptions::default();
    if cli.no_normalize {
        options = options.without_jobs_normalization();
    }
    let merger = ConfigMerger::new(loader).with_options(options);

    let request = ResolveRequest {
        base: cli.base,
        user_conf: cli.conf_file,
        assignments: cli.overrides,
        output_dir: cli.output_dir,
    };
    let resolution = resolve(&merger, &request)?;
    print!("{}", render(&resolution.config)?);
    info!(
        "finished (snapshots={}, output_dir={})",
        resolution.written.len(),
        request.output_dir
    );
    Ok(())
}
