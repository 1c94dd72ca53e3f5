//! CLI entrypoint for goldval tooling.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use goldval_core::structured_log::{LogEmitter, validate_log_line};
use goldval_core::{Action, Comparator, ElementFormat, GoldenConfig};
use goldval_harness::{GoldenReport, GoldenRunner, SyntheticBuffer, SyntheticProvider};
use goldval_store::FileStore;

/// Golden-value signature tooling.
#[derive(Debug, Parser)]
#[command(name = "goldval")]
#[command(about = "Golden-value signature regression tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drive the synthetic scene against a file-backed reference store.
    Run {
        /// Reference store JSON file (created when missing).
        #[arg(long)]
        store: PathBuf,
        /// Test name; part of the store key.
        #[arg(long, default_value = "synthetic")]
        test: String,
        /// Number of loops to run.
        #[arg(long, default_value_t = 8)]
        loops: u32,
        /// Optional JSON config file; `GOLDVAL_*` variables are applied on top.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Action override (`check`, `store` or `skip`).
        #[arg(long)]
        action: Option<String>,
        /// Pixel value written at the scene origin on every loop, to simulate drift.
        #[arg(long)]
        drift: Option<u32>,
        /// Directory for `<test>.json` and `<test>.md` reports.
        #[arg(long)]
        report_dir: Option<PathBuf>,
        /// JSONL log output path.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Validate a JSONL log file against the log schema.
    ValidateLog {
        /// Log file path.
        #[arg(long)]
        log: PathBuf,
    },
    /// List the tables of a reference store, verifying its digests.
    InspectStore {
        /// Reference store JSON file.
        #[arg(long)]
        store: PathBuf,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Render a JSON run report as markdown.
    RenderReport {
        /// Report JSON path.
        #[arg(long)]
        report: PathBuf,
        /// Output markdown path (stdout when omitted).
        #[arg(long)]
        output_md: Option<PathBuf>,
    },
}

fn scene() -> SyntheticProvider {
    SyntheticProvider::new()
        .with_buffer(SyntheticBuffer::patterned(32, 32, ElementFormat::R8G8B8A8, 7).with_display(1))
        .with_buffer(SyntheticBuffer::patterned(32, 32, ElementFormat::Z24S8, 11))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            store,
            test,
            loops,
            config,
            action,
            drift,
            report_dir,
            log,
        } => {
            let mut golden = match &config {
                Some(path) => GoldenConfig::from_file(path)?,
                None => GoldenConfig::default(),
            };
            golden.apply_env_overrides()?;
            if let Some(raw) = action {
                golden.action = Action::from_str_loose(&raw)
                    .ok_or_else(|| format!("unknown action '{raw}'"))?;
            }

            let reference = FileStore::open(&store)?;
            let emitter = match &log {
                Some(path) => LogEmitter::to_file(path, &test, "cli")?,
                None => LogEmitter::discard(),
            };
            let mut provider = scene();
            let mut comparator =
                Comparator::bind_with_logger(&golden, &test, &mut provider, &reference, emitter)?;
            eprintln!(
                "{} {} loops of '{test}' ({} record words) against {}",
                golden.action.as_str(),
                loops,
                comparator.layout().total_len(),
                store.display()
            );
            let outcome = GoldenRunner::new(&test, loops).run(&mut comparator, |loop_index, provider| {
                if let Some(buffer) = provider.buffer_mut(0) {
                    // Loop-dependent content keeps consecutive rows distinct.
                    buffer.set(1, 1, 0, loop_index & 0xFF);
                    if let Some(value) = drift {
                        buffer.set(0, 0, 0, value);
                    }
                }
            });
            comparator.unbind()?;

            let report = GoldenReport::from_outcome(format!("goldval run: {test}"), &outcome);
            if let Some(dir) = report_dir {
                report.write_to(&dir, &test)?;
                eprintln!("Report written to {}", dir.display());
            } else {
                println!("{}", report.to_markdown());
            }
            outcome.status()?;
        }
        Command::ValidateLog { log } => {
            let content = std::fs::read_to_string(&log)?;
            let mut invalid = 0usize;
            let mut total = 0usize;
            for (i, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                total += 1;
                if let Err(errors) = validate_log_line(line, i + 1) {
                    invalid += 1;
                    for err in errors {
                        eprintln!("{err}");
                    }
                }
            }
            eprintln!("{total} lines, {invalid} invalid");
            if invalid > 0 {
                return Err(format!("{invalid} invalid log lines in {}", log.display()).into());
            }
        }
        Command::InspectStore { store, json } => {
            let reference = FileStore::open(&store)?;
            let tables = reference.tables();
            if json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                println!("| Handle | Test | Config | Mask | Record len | Rows | Row span |");
                println!("|--------|------|--------|------|------------|------|----------|");
                for (handle, table) in tables.iter().enumerate() {
                    let span = match (table.first_row, table.last_row) {
                        (Some(first), Some(last)) => format!("{first}..={last}"),
                        _ => "-".to_string(),
                    };
                    println!(
                        "| {handle} | {} | {} | {:#x} | {} | {} | {span} |",
                        table.key.test_name,
                        table.key.config_name,
                        table.key.algorithm_mask,
                        table.key.record_len,
                        table.rows,
                    );
                }
            }
        }
        Command::RenderReport { report, output_md } => {
            let json = std::fs::read_to_string(&report)?;
            let parsed = GoldenReport::from_json(&json)?;
            let md = parsed.to_markdown();
            match output_md {
                Some(path) => {
                    std::fs::write(&path, md)?;
                    eprintln!("Markdown written to {}", path.display());
                }
                None => println!("{md}"),
            }
        }
    }

    Ok(())
}
