use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use kira_assembly_metadata::app::{App, RunMode, RunOptions};
use kira_assembly_metadata::biosample::BiosampleHttpClient;
use kira_assembly_metadata::config::{ConfigLoader, ConfigOverrides};
use kira_assembly_metadata::domain::HealColumn;
use kira_assembly_metadata::error::KiraError;
use kira_assembly_metadata::heal::{HealOptions, HealScope};
use kira_assembly_metadata::output::{JsonOutput, OutputMode, SummaryOutput};
use kira_assembly_metadata::summary::DatasetsCliClient;
use kira_assembly_metadata::taxonomy::TaxonomyHttpClient;

#[derive(Parser)]
#[command(name = "kira-am")]
#[command(about = "Incremental NCBI assembly metadata ledger with lineage, biome and coordinates")]
#[command(
    long_about = "Reads assembly accessions from INPUT_FILE and appends one enriched row per genome \
summary record to OUTPUT_FILE. Accessions already in the ledger are skipped, so an interrupted run \
can simply be restarted. A filtered_<OUTPUT_FILE> view with only geolocated rows is rebuilt at the \
end of every run.\n\nDo not run two instances against the same ledger at once."
)]
#[command(version, author)]
struct Cli {
    /// TSV whose first column holds assembly accessions.
    input_file: Utf8PathBuf,

    /// Ledger TSV to append to (created if missing).
    output_file: Utf8PathBuf,

    /// Previous output whose accessions count as already processed.
    #[arg(long)]
    resume: Option<Utf8PathBuf>,

    /// Treat the first input line as data even if it looks like a header.
    #[arg(long)]
    no_input_header: bool,

    /// Contact email sent with E-utilities requests.
    #[arg(long)]
    email: Option<String>,

    /// Seconds to sleep after every E-utilities call.
    #[arg(long)]
    delay: Option<f64>,

    /// Heal unresolved fields in the ledger after ingesting.
    #[arg(long)]
    retry_missing: bool,

    /// Only heal the existing ledger; the input file is not read.
    #[arg(long)]
    retry_only: bool,

    /// Columns to heal (default: all).
    #[arg(long, value_enum, value_delimiter = ',')]
    retry_columns: Vec<HealColumn>,

    /// Log only rows that actually improved while healing.
    #[arg(long)]
    retry_changed_only: bool,

    /// JSON config file (default: ./kira-am.json when present).
    #[arg(long)]
    config: Option<String>,

    /// Print the run report as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InputNotFound(_)
        | KiraError::InputRead { .. }
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::InvalidDelay(_) => 2,
        KiraError::MissingTool(_)
        | KiraError::SummaryCommand { .. }
        | KiraError::EntrezHttp(_)
        | KiraError::EntrezStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let overrides = ConfigOverrides {
        email: cli.email.clone(),
        delay_secs: cli.delay,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), &overrides)?;

    let summary = DatasetsCliClient::new(&config);
    if !cli.retry_only && !summary.tools_available() {
        warn!("datasets/dataformat not found on PATH; every summary lookup will fail");
    }
    let lineage = TaxonomyHttpClient::new(&config)?;
    let biosample = BiosampleHttpClient::new(&config)?;
    let app = App::new(summary, lineage, biosample);

    let mode = if cli.retry_only {
        RunMode::HealOnly
    } else {
        RunMode::Ingest {
            heal_after: cli.retry_missing,
        }
    };
    let options = RunOptions {
        input: cli.input_file,
        output: cli.output_file,
        resume: cli.resume,
        detect_input_header: !cli.no_input_header,
        mode,
        heal: HealOptions {
            scope: HealScope::from_columns(cli.retry_columns),
            changed_only: cli.retry_changed_only,
        },
    };

    let report = app.run(&options)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&report).into_diagnostic()?,
        OutputMode::Human => SummaryOutput::print_run(&report).into_diagnostic()?,
    }
    Ok(())
}
