use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::Parser;
use log::info;

use jak_cohort::dummy::{DEFAULT_SEED, DummyDataGenerator};
use jak_cohort::study::build_dataset;
use jak_cohort::{
    DatasetConfig, PatientTables, StudyCodelists, StudyDates, evaluate_dataset, load_tables,
    write_output,
};

/// Build the baricitinib study dataset from EHR record tables
#[derive(Parser, Debug)]
#[command(name = "jak-cohort", version, about)]
struct Args {
    /// Directory of record tables (`<table>.parquet` or `<table>/`)
    #[arg(long, value_name = "DIR", required_unless_present = "dummy")]
    data_dir: Option<PathBuf>,

    /// Directory of codelist CSV files
    #[arg(long, value_name = "DIR", default_value = "codelists")]
    codelists: PathBuf,

    /// JSON file with the study start and end dates (defaults apply when absent)
    #[arg(long, value_name = "FILE")]
    study_dates: Option<PathBuf>,

    /// Output file; written as CSV when it ends in `.csv`, Parquet otherwise
    #[arg(long, short, value_name = "FILE", default_value = "output/dataset.parquet")]
    output: PathBuf,

    /// Generate a synthetic population of this size instead of reading tables
    #[arg(long, value_name = "N")]
    dummy: Option<usize>,

    /// Seed for the synthetic population
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Worker threads for evaluation (defaults to the number of CPUs)
    #[arg(long)]
    threads: Option<usize>,

    /// Rows per record batch when reading Parquet
    #[arg(long)]
    batch_size: Option<usize>,

    /// Show a progress bar while evaluating patients
    #[arg(long)]
    progress: bool,

    /// Table that may be missing from the data directory (repeatable)
    #[arg(long = "optional-table", value_name = "TABLE")]
    optional_tables: Vec<String>,
}

impl Args {
    fn config(&self) -> DatasetConfig {
        let mut config = DatasetConfig::new().with_progress(self.progress);
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        for table in &self.optional_tables {
            config = config.with_optional_table(table);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let start = Instant::now();
    let config = args.config();

    let dates = match &args.study_dates {
        Some(path) => StudyDates::from_json_file(path)
            .with_context(|| format!("Failed to load study dates from {}", path.display()))?,
        None => StudyDates::default(),
    };
    info!("Study period: {dates}");

    let codelists = StudyCodelists::load(&args.codelists)
        .with_context(|| format!("Failed to load codelists from {}", args.codelists.display()))?;
    let dataset =
        build_dataset(&codelists, &dates).context("Failed to build the dataset definition")?;

    let data = match (args.dummy, &args.data_dir) {
        (Some(population), _) => DummyDataGenerator::new(population)
            .with_seed(args.seed)
            .generate(&codelists, &dates),
        (None, Some(dir)) => load_tables(dir, &dataset.required_tables(), &config)
            .await
            .with_context(|| format!("Failed to load record tables from {}", dir.display()))?,
        (None, None) => bail!("either --data-dir or --dummy is required"),
    };

    let tables = PatientTables::group(data).context("Failed to group records by patient")?;
    let frame = evaluate_dataset(&dataset, &tables, &config).context("Failed to evaluate dataset")?;
    write_output(&frame, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(
        "Wrote {} rows and {} variables to {} in {:?}",
        frame.len(),
        frame.columns.len(),
        args.output.display(),
        start.elapsed()
    );
    Ok(())
}
