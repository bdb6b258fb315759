//! lipid-morph - Lipid droplet morphometry CLI
//!
//! Command-line interface for consolidating droplet measurements and
//! comparing cohorts against a control baseline.

use clap::{Parser, Subcommand, ValueEnum};
use lipid_morph::consolidate::{
    consolidate_cohort, merge_cohort, merge_specimen_files, strip_dir, summarize_dir, FileLayout,
};
use lipid_morph::data::SummaryTable;
use lipid_morph::error::Result;
use lipid_morph::model::{evaluate_deviations, fit_baseline, BaselineConfig};
use lipid_morph::pipeline::{
    run, ModelReport, RunConfig, BASELINE_FIT_FILE, COMPARISON_FILE, DEVIATIONS_FILE,
};
use lipid_morph::test::compare_cohorts;
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Output format for reports printed to stdout.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Yaml,
}

/// Lipid droplet morphometry pipeline
#[derive(Parser)]
#[command(name = "lipid-morph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge coordinate and descriptor sources into one table per specimen
    Merge {
        /// Cohort directory with one folder per specimen
        #[arg(short, long, conflicts_with = "specimen")]
        root: Option<PathBuf>,

        /// A single specimen folder
        #[arg(short, long)]
        specimen: Option<PathBuf>,

        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Tag merged specimen tables and concatenate them into a cohort table
    Consolidate {
        /// Cohort directory with one folder per specimen
        #[arg(short, long)]
        root: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Imaging session recorded on every row
        #[arg(long)]
        session_id: Option<String>,

        /// Name of the merged table inside each specimen folder
        #[arg(long, default_value = "merged.csv")]
        merged_file: String,
    },

    /// Drop coordinate columns and duplicate rows from consolidated tables
    Strip {
        /// Directory of tagged specimen tables
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Reduce each specimen table to one summary row
    Summarize {
        /// Directory of specimen tables
        #[arg(short, long)]
        input: PathBuf,

        /// Output path for the summary CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Fit the baseline model on a control summary table
    Fit {
        /// Control summary CSV
        #[arg(short, long)]
        control: PathBuf,

        /// Output path for the per-specimen fit CSV
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Evaluate an experimental summary against a control baseline and compare
    Compare {
        /// Control summary CSV
        #[arg(short, long)]
        control: PathBuf,

        /// Experimental summary CSV
        #[arg(short, long)]
        experimental: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Run the full analysis from a YAML configuration file
    Run {
        /// Path to run configuration YAML
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print an example run configuration
    Example,
}

#[derive(clap::Args)]
struct LayoutArgs {
    /// Coordinate source inside each specimen folder
    #[arg(long, default_value = "coordinates.csv")]
    coordinates_file: String,

    /// Descriptor source inside each specimen folder
    #[arg(long, default_value = "results.csv")]
    descriptors_file: String,

    /// Merged table written inside each specimen folder
    #[arg(long, default_value = "merged.csv")]
    merged_file: String,
}

impl From<LayoutArgs> for FileLayout {
    fn from(args: LayoutArgs) -> Self {
        FileLayout {
            coordinates_file: args.coordinates_file,
            descriptors_file: args.descriptors_file,
            merged_file: args.merged_file,
        }
    }
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Upper bound on the number of spline basis functions
    #[arg(long, default_value = "10")]
    basis_size: usize,

    /// Fewest usable control specimens accepted
    #[arg(long, default_value = "10")]
    min_specimens: usize,
}

impl From<ModelArgs> for BaselineConfig {
    fn from(args: ModelArgs) -> Self {
        BaselineConfig {
            basis_size: args.basis_size,
            min_specimens: args.min_specimens,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Merge {
            root,
            specimen,
            layout,
        } => cmd_merge(root.as_deref(), specimen.as_deref(), &layout.into()),

        Commands::Consolidate {
            root,
            output,
            session_id,
            merged_file,
        } => cmd_consolidate(&root, &output, session_id.as_deref(), &merged_file),

        Commands::Strip { input, output } => cmd_strip(&input, &output),

        Commands::Summarize { input, output } => cmd_summarize(&input, &output),

        Commands::Fit {
            control,
            output,
            model,
            format,
        } => cmd_fit(&control, &output, &model.into(), format),

        Commands::Compare {
            control,
            experimental,
            output,
            model,
            format,
        } => cmd_compare(&control, &experimental, &output, &model.into(), format),

        Commands::Run { config } => cmd_run(&config),

        Commands::Example => cmd_example(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Cohort name of a summary file: its parent folder, else its stem.
fn summary_cohort(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .or_else(|| path.file_stem())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_report<T: serde::Serialize>(report: &T, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
        Format::Yaml => println!("{}", serde_yaml::to_string(report)?),
        Format::Text => {}
    }
    Ok(())
}

fn cmd_merge(root: Option<&Path>, specimen: Option<&Path>, layout: &FileLayout) -> Result<()> {
    match (root, specimen) {
        (_, Some(dir)) => {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.display().to_string());
            let report = merge_specimen_files(
                &name,
                &dir.join(&layout.coordinates_file),
                &dir.join(&layout.descriptors_file),
                &dir.join(&layout.merged_file),
            )?;
            eprintln!(
                "Merged {} droplets for '{}' ({} unmatched)",
                report.n_merged,
                name,
                report.n_unmatched()
            );
        }
        (Some(root), None) => {
            let report = merge_cohort(root, layout)?;
            eprintln!(
                "Merged {} specimens in '{}'",
                report.merged.len(),
                report.cohort
            );
            for failure in &report.failed {
                eprintln!("  skipped {}", failure);
            }
        }
        (None, None) => {
            return Err(lipid_morph::error::MorphError::InvalidParameter(
                "either --root or --specimen is required".to_string(),
            ))
        }
    }
    Ok(())
}

fn cmd_consolidate(root: &Path, output: &Path, session_id: Option<&str>, merged_file: &str) -> Result<()> {
    let report = consolidate_cohort(root, output, merged_file, session_id)?;
    eprintln!(
        "Consolidated {} specimens ({} rows) into {}",
        report.specimens.len(),
        report.n_rows,
        report.cohort_table.display()
    );
    for failure in &report.skipped {
        eprintln!("  skipped {}", failure);
    }
    Ok(())
}

fn cmd_strip(input: &Path, output: &Path) -> Result<()> {
    let report = strip_dir(input, output)?;
    eprintln!(
        "Stripped {} tables: {} rows -> {} rows",
        report.files.len(),
        report.rows_before,
        report.rows_after
    );
    Ok(())
}

fn cmd_summarize(input: &Path, output: &Path) -> Result<()> {
    let summary = summarize_dir(input)?;
    summary.to_csv(output)?;
    eprintln!("Wrote {} specimen summaries to {:?}", summary.len(), output);
    Ok(())
}

fn cmd_fit(control: &Path, output: &Path, config: &BaselineConfig, format: Format) -> Result<()> {
    let summary = SummaryTable::from_csv(control)?;
    let model = fit_baseline(&summary, &summary_cohort(control), config)?;
    model.to_csv(output)?;

    let report = ModelReport::from(&model);
    if let Format::Text = format {
        println!("Baseline model for cohort '{}'", report.cohort);
        println!("  Specimens:          {}", report.n_specimens);
        println!("  Basis functions:    {}", report.n_basis);
        println!("  Smoothing lambda:   {:.4e}", report.lambda);
        println!("  Effective df:       {:.2}", report.edf);
        println!("  GCV:                {:.4e}", report.gcv);
        println!("  R²:                 {:.4}", report.r_squared);
        println!(
            "  ln(area_sum) range: [{:.3}, {:.3}]",
            report.log_area_range.0, report.log_area_range.1
        );
    }
    print_report(&report, format)
}

fn cmd_compare(
    control: &Path,
    experimental: &Path,
    output: &Path,
    config: &BaselineConfig,
    format: Format,
) -> Result<()> {
    let control_summary = SummaryTable::from_csv(control)?;
    let experimental_summary = SummaryTable::from_csv(experimental)?;

    let control_cohort = summary_cohort(control);
    let experimental_cohort = summary_cohort(experimental);

    let model = fit_baseline(&control_summary, &control_cohort, config)?;
    model.to_csv(output.join(BASELINE_FIT_FILE))?;

    let deviations = evaluate_deviations(&model, &experimental_summary, &experimental_cohort)?;
    deviations.to_csv(output.join(DEVIATIONS_FILE))?;

    let comparison = compare_cohorts(
        &control_cohort,
        model.residuals(),
        &experimental_cohort,
        &deviations.values(),
    )?;
    comparison.to_csv(output.join(COMPARISON_FILE))?;

    if let Format::Text = format {
        print!("{}", comparison);
        if deviations.n_extrapolated() > 0 {
            println!(
                "{} experimental specimens were extrapolated beyond the control range",
                deviations.n_extrapolated()
            );
        }
    }
    print_report(&comparison, format)
}

fn cmd_run(config_path: &Path) -> Result<()> {
    let config = RunConfig::from_file(config_path)?;
    let report = run(&config)?;
    print!("{}", report.comparison);
    eprintln!("Outputs written to {:?}", config.output_dir);
    Ok(())
}

fn cmd_example() -> Result<()> {
    print!("{}", RunConfig::example().to_yaml()?);
    Ok(())
}
