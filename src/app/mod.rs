use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::bounded;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use time::{Date, OffsetDateTime};

use crate::config::{DEFAULT_BATCH_SIZE, QuestsConfig, RuntimeConfig};
use crate::dsl::parse_iso_date;
use crate::pipeline::{LineBatch, RecordProcessor};
use crate::quest::QuestCatalog;
use crate::sinks::{JsonlSink, MatchSink, QuestMatch};
use crate::utils::ScanProgress;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Quest catalog (YAML)
    #[arg(short, long, env = "TAGQUEST_QUESTS")]
    pub quests: PathBuf,

    /// Element records, one JSON object per line ("-" for stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output file for matches ("-" for stdout)
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Reference date for relative dates (default: today, UTC)
    #[arg(long, env = "TAGQUEST_DATE", value_parser = parse_reference_date)]
    pub date: Option<Date>,

    /// Only run quests enabled in this country (ISO 3166-1 alpha-2)
    #[arg(long)]
    pub country: Option<String>,

    /// Fail on the first quest whose filter does not compile
    #[arg(long)]
    pub strict: bool,

    /// Compile the catalog and exit
    #[arg(long)]
    pub check: bool,

    /// Records per work batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Number of threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn parse_reference_date(value: &str) -> Result<Date, String> {
    parse_iso_date(value).ok_or_else(|| format!("invalid date '{value}', expected YYYY-MM-DD"))
}

impl Cli {
    pub fn runtime_config(&self) -> RuntimeConfig {
        let reference_date = self
            .date
            .unwrap_or_else(|| OffsetDateTime::now_utc().date());
        RuntimeConfig {
            country: self.country.clone(),
            strict: self.strict || self.check,
            batch_size: self.batch_size.max(1),
            ..RuntimeConfig::new(reference_date)
        }
    }
}

pub type SinkHandle = Arc<Mutex<Box<dyn MatchSink + Send>>>;

/// Totals of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub records: u64,
    pub malformed: u64,
    pub matches: u64,
}

pub fn load_catalog(path: &Path, runtime: &RuntimeConfig) -> Result<QuestCatalog> {
    let config = QuestsConfig::load(path)
        .with_context(|| format!("Config: Failed to load quest catalog {:?}", path))?;
    let mut catalog = QuestCatalog::compile(&config, runtime.strict)?;

    if let Some(country) = &runtime.country {
        catalog.retain_country(country);
    }

    tracing::info!(
        "Quests: {} compiled, {} skipped",
        catalog.len(),
        catalog.skipped().len()
    );
    Ok(catalog)
}

pub fn init_sink(output: &Path) -> Result<Box<dyn MatchSink + Send>> {
    if output == Path::new("-") {
        tracing::info!("Sink: jsonl -> stdout");
        Ok(Box::new(JsonlSink::stdout()?))
    } else {
        tracing::info!("Sink: jsonl -> {:?}", output);
        let sink = JsonlSink::new(output)
            .with_context(|| format!("CLI: Failed to create output file {:?}", output))?;
        Ok(Box::new(sink))
    }
}

pub fn open_input(input: &Path) -> Result<Box<dyn BufRead + Send>> {
    if input == Path::new("-") {
        let stdin: Box<dyn Read + Send> = Box::new(std::io::stdin());
        return Ok(Box::new(BufReader::new(stdin)));
    }
    let file = File::open(input)
        .with_context(|| format!("CLI: Failed to open input file {:?}", input))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Splits a line reader into batches of at most `batch_size` lines.
pub struct LineBatches<R> {
    reader: R,
    batch_size: usize,
    next_line: usize,
    done: bool,
}

impl<R: BufRead> LineBatches<R> {
    pub fn new(reader: R, batch_size: usize) -> Self {
        Self {
            reader,
            batch_size: batch_size.max(1),
            next_line: 1,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for LineBatches<R> {
    type Item = std::io::Result<LineBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = LineBatch {
            first_line: self.next_line,
            lines: Vec::with_capacity(self.batch_size),
        };
        while batch.lines.len() < self.batch_size {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(_) => {
                    self.next_line += 1;
                    batch.lines.push(line);
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }

        if batch.lines.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

/// Evaluate every record of `reader` in parallel and write the matches to `sink`.
///
/// Batches are evaluated on the rayon pool; a single writer thread owns the sink.
pub fn scan_records<R>(
    reader: R,
    processor: Arc<RecordProcessor>,
    sink: SinkHandle,
    batch_size: usize,
    show_progress: bool,
) -> Result<ScanSummary>
where
    R: BufRead + Send,
{
    let (tx, rx) = bounded::<Vec<QuestMatch>>(64);
    let progress = Arc::new(ScanProgress::new("Scanning", 100_000, show_progress));

    let sink_handle = sink.clone();
    let writer = std::thread::spawn(move || -> Result<u64> {
        let mut sink = sink_handle
            .lock()
            .map_err(|_| anyhow!("Pipeline: Sink lock poisoned"))?;
        let mut match_count = 0u64;
        for batch in rx {
            for row in batch {
                sink.add_match(row)?;
                match_count += 1;
            }
        }
        Ok(match_count)
    });

    let worker_progress = Arc::clone(&progress);
    let scan_result = LineBatches::new(reader, batch_size)
        .par_bridge()
        .try_for_each(|batch_result| -> Result<()> {
            let batch = batch_result.context("Pipeline: Failed to read input")?;
            let outcome = processor.process_batch(batch);
            worker_progress.add(outcome.records, outcome.malformed);

            if !outcome.matches.is_empty() {
                tx.send(outcome.matches)
                    .map_err(|err| anyhow!("Pipeline: Failed to send match batch: {}", err))?;
            }
            Ok(())
        });

    drop(tx);

    // Get writer thread result - it contains the root cause if there was an error
    let writer_join = writer.join();

    // Check writer thread first - it has the real error if the channel disconnected
    let match_count = match writer_join {
        Ok(Ok(result)) => result,
        Ok(Err(writer_err)) => {
            return if scan_result.is_err() {
                Err(writer_err
                    .context("Pipeline: Sink writer thread failed (caused channel disconnect)"))
            } else {
                Err(writer_err)
            };
        }
        Err(panic_payload) => {
            let panic_msg = panic_payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            return Err(anyhow!(
                "Pipeline: Sink writer thread panicked: {}",
                panic_msg
            ));
        }
    };

    // Only check scan_result if writer succeeded
    scan_result?;

    progress.finish();
    Ok(ScanSummary {
        records: progress.records(),
        malformed: progress.malformed(),
        matches: match_count,
    })
}

/// Run the whole command: load, compile, scan, finish the sink.
pub fn run(cli: &Cli) -> Result<Option<ScanSummary>> {
    let runtime = cli.runtime_config();
    tracing::info!("Reference date: {}", runtime.reference_date);

    let catalog = Arc::new(load_catalog(&cli.quests, &runtime)?);
    if cli.check {
        for quest in catalog.quests() {
            tracing::info!("{}: {}", quest.name, quest.query);
        }
        return Ok(None);
    }

    let input = cli
        .input
        .as_deref()
        .context("CLI: --input is required unless --check is given")?;
    if catalog.is_empty() {
        tracing::warn!("Quests: No quest left to run");
    }

    let reader = open_input(input)?;
    let sink = init_sink(&cli.output)?;
    let sink_handle: SinkHandle = Arc::new(Mutex::new(sink));

    let processor = Arc::new(RecordProcessor::new(catalog, runtime.reference_date));
    let summary = scan_records(
        reader,
        processor,
        sink_handle.clone(),
        runtime.batch_size,
        cli.verbose,
    )?;

    {
        let mut sink = sink_handle
            .lock()
            .map_err(|_| anyhow!("Pipeline: Sink lock poisoned"))?;
        sink.finish().context("Pipeline: Failed to finalize sink")?;
    }

    if summary.malformed > 0 {
        tracing::warn!(
            "Pipeline: {} malformed record(s) skipped",
            summary.malformed
        );
    }
    Ok(Some(summary))
}
