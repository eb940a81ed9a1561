use anyhow::{Context, Result};
use clap::Parser;

use tagquest::app::{Cli, run};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    let start = std::time::Instant::now();
    let Some(summary) = run(&cli)? else {
        tracing::info!("Check passed");
        return Ok(());
    };

    let elapsed = start.elapsed();
    tracing::info!(
        "Done! Scanned {} records, written {} matches in {:.2}s ({} records/s)",
        summary.records,
        summary.matches,
        elapsed.as_secs_f64(),
        (summary.records as f64 / elapsed.as_secs_f64()) as u64
    );

    Ok(())
}
