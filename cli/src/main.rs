//! `domsim`: compute a pairwise similarity matrix for a list of domains.

mod args;

use std::io::{self, Read};

use anyhow::{Context, Result};
use clap::Parser;
use domsim_embeddings::KeyPolicy;
use domsim_pipeline::Pipeline;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Command, KeyArgs, RunArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the run report.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Key(args) => print_key(args),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.to_config().context("invalid configuration")?;
    info!(model = %config.model, min_text_length = config.min_text_length, "starting similarity run");

    let pipeline = Pipeline::from_config(config)
        .await
        .context("failed to set up pipeline")?;
    let report = pipeline
        .run(&args.domains)
        .await
        .with_context(|| format!("similarity run over {} failed", args.domains.display()))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_key(args: KeyArgs) -> Result<()> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read text from stdin")?;
            text
        }
    };

    let policy = if args.raw {
        KeyPolicy::Raw
    } else {
        KeyPolicy::Normalized
    };
    println!("{}", policy.key_for(&args.model, &text));
    Ok(())
}
