//! Running the full baseline-versus-experimental analysis.

use crate::consolidate::{
    cohort_name, consolidate_specimens, list_specimen_dirs, merge_cohort_into, merged_path,
    strip_files, summarize_files, CohortMergeReport, ConsolidationReport, FileLayout, StripReport,
};
use crate::data::{ensure_dir, prepare_output_file, SummaryTable};
use crate::error::{MorphError, Result};
use crate::model::{evaluate_deviations, fit_baseline, BaselineConfig, BaselineModel};
use crate::test::{compare_cohorts, ComparisonResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-cohort directory for the control cohort's intermediate files.
pub const CONTROL_DIR: &str = "control";
/// Per-cohort directory for the experimental cohort's intermediate files.
pub const EXPERIMENTAL_DIR: &str = "experimental";

pub const MERGED_DIR: &str = "merged";
pub const CONSOLIDATED_DIR: &str = "consolidated";
pub const STRIPPED_DIR: &str = "stripped";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const BASELINE_FIT_FILE: &str = "baseline_fit.csv";
pub const DEVIATIONS_FILE: &str = "deviations.csv";
pub const COMPARISON_FILE: &str = "comparison.csv";
pub const REPORT_FILE: &str = "comparison.yaml";

fn default_true() -> bool {
    true
}

fn default_name() -> String {
    "lipid-morph".to_string()
}

/// Where a cohort's specimen folders live and how to tag them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortConfig {
    /// Directory with one folder per specimen.
    pub root: PathBuf,
    /// Imaging session recorded on every row.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Merge the raw sources first; disable when each specimen folder already
    /// holds its merged table.
    #[serde(default = "default_true")]
    pub merge: bool,
}

impl CohortConfig {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            session_id: None,
            merge: true,
        }
    }
}

/// Configuration of a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Directory receiving every output.
    pub output_dir: PathBuf,
    #[serde(default)]
    pub layout: FileLayout,
    /// Cohort the baseline is fitted on.
    pub control: CohortConfig,
    /// Cohort evaluated against the baseline.
    pub experimental: CohortConfig,
    #[serde(default)]
    pub model: BaselineConfig,
}

impl RunConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(MorphError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(MorphError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// A complete example configuration.
    pub fn example() -> Self {
        Self {
            name: "baseline-vs-treated".to_string(),
            output_dir: PathBuf::from("out"),
            layout: FileLayout::default(),
            control: CohortConfig {
                session_id: Some("2024-01-10".to_string()),
                ..CohortConfig::new("data/control")
            },
            experimental: CohortConfig::new("data/treated"),
            model: BaselineConfig::default(),
        }
    }
}

/// What happened to one cohort on its way to a summary table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortReport {
    pub cohort: String,
    /// Absent when merging was disabled.
    pub merge: Option<CohortMergeReport>,
    pub consolidation: ConsolidationReport,
    pub strip: StripReport,
    /// Specimens in the summary table.
    pub n_summarized: usize,
    pub summary_file: PathBuf,
}

/// Diagnostics of the fitted baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub cohort: String,
    pub n_specimens: usize,
    pub n_basis: usize,
    pub lambda: f64,
    pub edf: f64,
    pub gcv: f64,
    pub r_squared: f64,
    /// Control range of `ln(area_sum)`.
    pub log_area_range: (f64, f64),
    pub skipped: Vec<String>,
}

impl From<&BaselineModel> for ModelReport {
    fn from(model: &BaselineModel) -> Self {
        ModelReport {
            cohort: model.cohort.clone(),
            n_specimens: model.n_specimens(),
            n_basis: model.n_basis(),
            lambda: model.lambda,
            edf: model.edf,
            gcv: model.gcv,
            r_squared: model.r_squared(),
            log_area_range: model.log_range(),
            skipped: model.skipped.clone(),
        }
    }
}

/// Everything a run produced, serialized next to the comparison table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    /// RFC 3339 timestamp.
    pub generated_at: String,
    pub control: CohortReport,
    pub experimental: CohortReport,
    pub model: ModelReport,
    pub n_deviations: usize,
    /// Experimental specimens outside the control area range.
    pub n_extrapolated: usize,
    pub comparison: ComparisonResult,
}

impl RunReport {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(MorphError::from)
    }

    /// Write the report as YAML.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        prepare_output_file(path)?;
        fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}

/// Take one cohort from specimen folders to a summary table under `work_dir`.
///
/// Stages run in order: merge (optional), consolidate, strip, summarize.
/// Each stage reads exactly the files the previous stage wrote in this call,
/// so leftovers of earlier runs in `work_dir` never reach the summary.
/// Merged tables go to `work_dir/merged`; the specimen folders are only read.
pub fn process_cohort(
    config: &CohortConfig,
    layout: &FileLayout,
    work_dir: &Path,
) -> Result<(CohortReport, SummaryTable)> {
    let cohort = cohort_name(&config.root);
    tracing::info!("Processing cohort '{}' from {}", cohort, config.root.display());

    let (merge, sources) = if config.merge {
        let merged_dir = work_dir.join(MERGED_DIR);
        let merge = merge_cohort_into(&config.root, layout, &merged_dir)?;
        let sources: Vec<(String, PathBuf)> = merge
            .merged
            .iter()
            .map(|r| (r.specimen.clone(), merged_path(&merged_dir, &r.specimen)))
            .collect();
        (Some(merge), sources)
    } else {
        let sources: Vec<(String, PathBuf)> = list_specimen_dirs(&config.root)?
            .into_iter()
            .map(|(name, dir)| {
                let source = dir.join(&layout.merged_file);
                (name, source)
            })
            .collect();
        (None, sources)
    };

    let consolidation = consolidate_specimens(
        &cohort,
        &sources,
        work_dir.join(CONSOLIDATED_DIR),
        config.session_id.as_deref(),
    )?;

    let strip = strip_files(&consolidation.specimen_files, work_dir.join(STRIPPED_DIR))?;

    let summary = summarize_files(&strip.files)?;
    let summary_file = work_dir.join(SUMMARY_FILE);
    summary.to_csv(&summary_file)?;
    tracing::info!("Summarized {} specimens of cohort '{}'", summary.len(), cohort);

    let report = CohortReport {
        cohort,
        merge,
        consolidation,
        strip,
        n_summarized: summary.len(),
        summary_file,
    };
    Ok((report, summary))
}

/// Run the whole analysis: summarize both cohorts, fit the baseline on the
/// control cohort, evaluate the experimental cohort against it and compare
/// residuals with deviations.
pub fn run(config: &RunConfig) -> Result<RunReport> {
    let out = &config.output_dir;
    ensure_dir(out)?;
    tracing::info!("Starting run '{}' into {}", config.name, out.display());

    let (control, control_summary) =
        process_cohort(&config.control, &config.layout, &out.join(CONTROL_DIR))?;
    let (experimental, experimental_summary) =
        process_cohort(&config.experimental, &config.layout, &out.join(EXPERIMENTAL_DIR))?;

    let model = fit_baseline(&control_summary, &control.cohort, &config.model)?;
    model.to_csv(out.join(BASELINE_FIT_FILE))?;

    let deviations = evaluate_deviations(&model, &experimental_summary, &experimental.cohort)?;
    deviations.to_csv(out.join(DEVIATIONS_FILE))?;

    let comparison = compare_cohorts(
        &control.cohort,
        model.residuals(),
        &experimental.cohort,
        &deviations.values(),
    )?;
    comparison.to_csv(out.join(COMPARISON_FILE))?;

    let report = RunReport {
        name: config.name.clone(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        model: ModelReport::from(&model),
        n_deviations: deviations.len(),
        n_extrapolated: deviations.n_extrapolated(),
        control,
        experimental,
        comparison,
    };
    report.to_file(out.join(REPORT_FILE))?;
    tracing::info!("Run '{}' finished", config.name);
    Ok(report)
}
