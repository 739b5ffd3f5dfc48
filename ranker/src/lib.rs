use anyhow::{anyhow, bail, Context, Result};
use billrank_core::measure::MeasureId;
use billrank_core::persist::{save_meta, RunMeta, StorePaths};
use billrank_core::ranker::{explain_text, Explanation};
use billrank_core::settings::Settings;
use billrank_core::{BillFilter, BillRow, BillStore, MemoryBillStore, RankSummary, Ranker, RankingTerms, SledBillStore};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "billrank", version)]
#[command(about = "Score California bills against positive and negative term dictionaries", long_about = None)]
pub struct Cli {
    /// Settings file (TOML); BILLRANK__* environment variables override it
    #[arg(long, global = true, default_value = "billrank.toml")]
    pub config: PathBuf,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rank bills; by default only bills changed since the last run
    Rank {
        /// Rank every bill in the store
        #[arg(long, conflicts_with = "bill")]
        all: bool,
        /// Rank a single bill, e.g. AB12 or "SB 4"
        #[arg(long)]
        bill: Option<String>,
        /// Stop after this many bills
        #[arg(long)]
        limit: Option<usize>,
        /// Worker threads (overrides settings)
        #[arg(long)]
        workers: Option<usize>,
        /// Score without writing anything back
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Load bill descriptors from a JSON/JSONL file or a directory of them
    Import {
        #[arg(long)]
        input: PathBuf,
    },
    /// Show the per-term matches behind one bill's score
    Explain {
        /// Lob file to score directly
        #[arg(long, conflicts_with = "bill", required_unless_present = "bill")]
        file: Option<PathBuf>,
        /// Bill whose stored lob should be scored
        #[arg(long)]
        bill: Option<String>,
        /// Print JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print stored scores
    Show {
        #[arg(long)]
        bill: Option<String>,
    },
}

impl Cli {
    /// Default log directive when RUST_LOG is unset.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// One bill as described by an import file.
#[derive(Debug, Deserialize)]
pub struct InputBill {
    pub measure_type: String,
    pub measure_num: String,
    pub bill_version_id: String,
    pub lob: String,
    #[serde(default)]
    pub bill_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: String,
}

impl InputBill {
    fn into_row(self) -> Result<BillRow> {
        let measure = MeasureId::parse(&format!("{} {}", self.measure_type, self.measure_num))?;
        let mut row = BillRow::new(measure, self.bill_version_id, self.lob);
        row.bill_id = self.bill_id;
        row.author = self.author;
        row.title = self.title;
        Ok(row)
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(Some(cli.config.as_path())).context("loading settings")?;
    match cli.command {
        Commands::Rank { all, bill, limit, workers, dry_run } => {
            let filter = select(all, bill.as_deref())?;
            let store = open_store(&settings)?;
            let cancel = interrupt_flag();
            let summary = rank(&settings, &store, &filter, limit, workers, dry_run, &cancel)?;
            println!("scored {} bills, skipped {}{}", summary.scored(), summary.skipped(), if summary.cancelled { " (cancelled)" } else { "" });
            if dry_run {
                for result in summary.results() {
                    println!("{}\t{:+}\t{:+}", result.measure, result.positive_score, result.negative_score);
                }
            }
        }
        Commands::Import { input } => {
            let count = import(&open_store(&settings)?, &input)?;
            println!("imported {count} bills");
        }
        Commands::Explain { file, bill, json } => {
            let terms = load_terms(&settings)?;
            let explanation = match (file, bill) {
                (Some(file), _) => explain_file(&terms, &file)?,
                (None, Some(bill)) => explain_bill(&terms, &open_store(&settings)?, &bill)?,
                (None, None) => bail!("explain needs --file or --bill"),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&explanation)?);
            } else {
                print_explanation(&explanation);
            }
        }
        Commands::Show { bill } => {
            let store = open_store(&settings)?;
            let filter = select(bill.is_none(), bill.as_deref())?;
            for row in store.bills_to_rank(&filter)? {
                println!(
                    "{}\t{:+}\t{:+}\t{}\t{}",
                    row.measure,
                    row.positive_score,
                    row.negative_score,
                    if row.needs_ranking() { "stale" } else { "current" },
                    row.title
                );
            }
        }
    }
    Ok(())
}

fn select(all: bool, bill: Option<&str>) -> Result<BillFilter> {
    Ok(match bill {
        Some(bill) => BillFilter::Single(MeasureId::parse(bill)?),
        None if all => BillFilter::All,
        None => BillFilter::Changed,
    })
}

pub fn open_store(settings: &Settings) -> Result<SledBillStore> {
    let paths = StorePaths::new(&settings.store_root);
    fs::create_dir_all(&paths.root)?;
    SledBillStore::open(paths.bills_db(), &settings.lob_root)
        .with_context(|| format!("opening bill store under {}", paths.root.display()))
}

pub fn load_terms(settings: &Settings) -> Result<RankingTerms> {
    Ok(RankingTerms::load(&settings.positive_terms, &settings.negative_terms)?)
}

/// Rank the selected bills and record the run.
pub fn rank(
    settings: &Settings,
    store: &SledBillStore,
    filter: &BillFilter,
    limit: Option<usize>,
    workers: Option<usize>,
    dry_run: bool,
    cancel: &AtomicBool,
) -> Result<RankSummary> {
    // Dictionaries load before any bill is selected.
    let terms = load_terms(settings)?;
    let bills = store.bills_to_rank(filter)?;
    if let BillFilter::Single(measure) = filter {
        if bills.is_empty() {
            bail!("no bill row for {measure}");
        }
    }
    match filter {
        BillFilter::All => tracing::info!(bills = bills.len(), "ranking all bills"),
        BillFilter::Single(measure) => tracing::info!(%measure, "ranking single bill"),
        BillFilter::Changed => tracing::info!(bills = bills.len(), "bills changed since the last run"),
    }

    let ranker = Ranker::new(&terms)
        .workers(workers.unwrap_or(settings.workers))
        .batch_size(settings.batch_size)
        .limit(limit);
    if dry_run {
        let scratch = MemoryBillStore::with_lob_root(&settings.lob_root);
        for bill in &bills {
            scratch.upsert_bill(bill.clone())?;
        }
        return Ok(ranker.rank_all(&scratch, &bills, cancel)?);
    }

    let summary = ranker.rank_all(store, &bills, cancel)?;
    store.flush()?;
    save_meta(&StorePaths::new(&settings.store_root), &RunMeta::from_summary(&summary, settings.session()))?;
    Ok(summary)
}

/// Flag raised by the first Ctrl-C so a bulk run stops after its current batch.
/// A second Ctrl-C exits at once.
pub fn interrupt_flag() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let spawned = std::thread::Builder::new().name("billrank-signal".into()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!(error = %err, "Ctrl-C handling unavailable");
                return;
            }
        };
        runtime.block_on(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            flag.store(true, Ordering::Relaxed);
            tracing::warn!("interrupted; stopping after the current batch");
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "Ctrl-C handling unavailable");
    }
    cancel
}

/// Upsert every bill described under `input`. Returns the number imported.
pub fn import(store: &SledBillStore, input: &Path) -> Result<usize> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("import input {} does not exist", input.display());
    }

    let mut count = 0;
    for file in files {
        let bills = read_bills(&file).with_context(|| format!("reading {}", file.display()))?;
        for bill in bills {
            store.upsert_bill(bill.into_row()?)?;
            count += 1;
        }
    }
    store.flush()?;
    tracing::info!(count, input = %input.display(), "import complete");
    Ok(count)
}

fn read_bills(file: &Path) -> Result<Vec<InputBill>> {
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut bills = Vec::new();
        for line in BufReader::new(File::open(file)?).lines() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            bills.push(serde_json::from_str(&line)?);
        }
        return Ok(bills);
    }
    let json: serde_json::Value = serde_json::from_reader(BufReader::new(File::open(file)?))?;
    Ok(match json {
        serde_json::Value::Array(_) => serde_json::from_value(json)?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => bail!("{} holds neither a bill object nor an array of bills", file.display()),
    })
}

/// Score a lob file without touching stored scores.
pub fn explain_file(terms: &RankingTerms, file: &Path) -> Result<Explanation> {
    let raw = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    Ok(explain_text(&String::from_utf8_lossy(&raw), terms))
}

/// Score a stored bill's lob without touching its scores.
pub fn explain_bill(terms: &RankingTerms, store: &dyn BillStore, bill: &str) -> Result<Explanation> {
    let measure = MeasureId::parse(bill)?;
    let row = store.get_bill(&measure)?.ok_or_else(|| anyhow!("no bill row for {measure}"))?;
    let raw = store.read_bill_text(&row.lob_path)?;
    Ok(explain_text(&String::from_utf8_lossy(&raw), terms))
}

fn print_explanation(explanation: &Explanation) {
    println!("{} tokens", explanation.tokens);
    for (label, hits, total) in [
        ("Positive", &explanation.positive, explanation.score.positive()),
        ("Negative", &explanation.negative, explanation.score.negative()),
    ] {
        println!("{label}: {total}");
        for hit in hits {
            println!("   {} instances of {} ({}), worth = {}", hit.count, hit.key, hit.weight, hit.worth());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_defaults_to_changed_bills() {
        let cli = Cli::try_parse_from(["billrank", "rank"]).unwrap();
        match cli.command {
            Commands::Rank { all, bill, .. } => assert_eq!(select(all, bill.as_deref()).unwrap(), BillFilter::Changed),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rank_single_bill_parses_measure() {
        let cli = Cli::try_parse_from(["billrank", "rank", "--bill", "ab383"]).unwrap();
        match cli.command {
            Commands::Rank { all, bill, .. } => {
                assert_eq!(select(all, bill.as_deref()).unwrap(), BillFilter::Single(MeasureId::new("AB", 383)))
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn all_and_bill_conflict() {
        assert!(Cli::try_parse_from(["billrank", "rank", "--all", "--bill", "AB1"]).is_err());
    }

    #[test]
    fn explain_requires_a_source() {
        assert!(Cli::try_parse_from(["billrank", "explain"]).is_err());
        assert!(Cli::try_parse_from(["billrank", "explain", "--file", "x.html"]).is_ok());
    }

    #[test]
    fn verbosity_maps_to_log_level() {
        let cli = Cli::try_parse_from(["billrank", "-vv", "show"]).unwrap();
        assert_eq!(cli.log_directive(), "trace");
    }
}
