use crate::config::ConfigError;
use crate::config::InferenceConfig;
use crate::error::ProbeError;
use crate::error::ResultSource;
use crate::error::StageError;
use crate::inference::cache::fingerprint;
use crate::inference::cache::FingerprintCache;
use crate::inference::candidate::profile_grid;
use crate::inference::candidate::HeaderCandidateDetector;
use crate::inference::hierarchy::HierarchyAnalyzer;
use crate::inference::params::ParameterSynthesizer;
use crate::inference::params::ParseParameters;
use crate::inference::pattern::SemanticPatternMatcher;
use crate::inference::profile::RowProfile;
use crate::inference::profile::RowProfiler;
use crate::inference::shape::TableShape;
use crate::inference::shape::TableShapeClassifier;
use crate::inference::validation::ValidationLoop;
use crate::spreadsheet::grid::Grid;
use crate::spreadsheet::FileSystemOpener;
use crate::spreadsheet::SourceOpener;
use crate::spreadsheet::TabularSource;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

/// Entry point of the inference pipeline.
///
/// An `Inferencer` is `Sync` when its opener is, so one instance (and its
/// cache) can serve concurrent callers.
///
/// # Example
///
/// ```no_run
/// use sheet_probe::{InferenceConfig, Inferencer};
///
/// let inferencer = Inferencer::new(InferenceConfig::default())?;
/// let params = inferencer.infer_parse_parameters("report.xlsx", None)?;
/// println!("skip {:?}, header {:?}", params.skip_rows, params.header);
/// # Ok::<(), sheet_probe::ProbeError>(())
/// ```
pub struct Inferencer<O: SourceOpener = FileSystemOpener> {
    opener: O,
    config: InferenceConfig,
    matcher: SemanticPatternMatcher,
    cache: Arc<FingerprintCache>,
}

impl Inferencer<FileSystemOpener> {
    /// Creates an inferencer reading from the local file system.
    pub fn new(config: InferenceConfig) -> Result<Inferencer<FileSystemOpener>, ProbeError> {
        Inferencer::with_opener(FileSystemOpener, config)
    }
}

impl<O: SourceOpener> Inferencer<O> {
    /// Creates an inferencer reading through `opener`; the configuration is validated first.
    pub fn with_opener(opener: O, config: InferenceConfig) -> Result<Inferencer<O>, ProbeError> {
        config.validate()?;
        let matcher = match &config.semantic_dictionary {
            Some(dictionary) => SemanticPatternMatcher::new(dictionary).map_err(ConfigError::InvalidPattern)?,
            None => SemanticPatternMatcher::default(),
        };
        Ok(Inferencer {
            opener,
            config,
            matcher,
            cache: Arc::new(FingerprintCache::new()),
        })
    }

    /// Shares `cache` with this inferencer, e.g. one loaded from disk.
    pub fn with_cache(mut self, cache: Arc<FingerprintCache>) -> Inferencer<O> {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<FingerprintCache> {
        &self.cache
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Infers skip-row and header parameters for `path`.
    ///
    /// # Arguments
    /// * `path` - Workbook or delimited file to inspect
    /// * `sheet` - Sheet name or glob pattern; `None` selects the first sheet
    ///
    /// # Errors
    /// Fails only with [`ProbeError::SourceUnavailable`] when the file or sheet
    /// cannot be read; any later failure yields the safe default (`header = 0`,
    /// zero confidence) with an explanatory warning.
    pub fn infer_parse_parameters<P: AsRef<Path>>(&self, path: P, sheet: Option<&str>) -> Result<ParseParameters, ProbeError> {
        self.infer(path.as_ref(), sheet)
    }

    /// Profiles of the non-empty sampled rows, keyed by row index.
    pub fn get_row_profiles<P: AsRef<Path>>(&self, path: P, sheet: Option<&str>) -> Result<Vec<(usize, RowProfile)>, ProbeError> {
        let (_, grid) = self.sample(path.as_ref(), sheet)?;
        let profiler = RowProfiler::new(&self.matcher, self.config.header.likely_header_cutoff);
        Ok(profile_grid(&grid, &profiler)
            .into_iter()
            .enumerate()
            .filter(|(_, profile)| profile.non_empty_count > 0)
            .collect())
    }

    /// Shape classification of the sampled window.
    pub fn get_table_shape<P: AsRef<Path>>(&self, path: P, sheet: Option<&str>) -> Result<TableShape, ProbeError> {
        let (_, grid) = self.sample(path.as_ref(), sheet)?;
        Ok(TableShapeClassifier::classify(&grid))
    }

    #[instrument(level = "debug", skip(self, path), fields(path = %path.display()))]
    fn infer(&self, path: &Path, sheet: Option<&str>) -> Result<ParseParameters, ProbeError> {
        let started = Instant::now();
        let stat = self.opener.stat(path).or_unavailable(path)?;
        let fingerprint = fingerprint(path, &stat, sheet);
        if let Some(params) = self.cache.get(&fingerprint) {
            info!(%fingerprint, "cache hit");
            return Ok(params);
        }

        let (mut source, grid) = self.sample(path, sheet)?;
        match self.run_pipeline(source.as_mut(), &grid, started) {
            Ok(params) => {
                info!(
                    skip_rows = ?params.skip_rows,
                    header = ?params.header,
                    confidence = params.confidence,
                    warnings = params.warnings.len(),
                    "inferred parse parameters"
                );
                self.cache.set(fingerprint, params.clone());
                Ok(params)
            }
            Err(error) => {
                warn!(%error, "inference degraded to safe default");
                Ok(ParseParameters::safe_default(format!("Inference failed ({error}); using header=0")))
            }
        }
    }

    /// Opens the sheet and reads the sample window.
    fn sample(&self, path: &Path, sheet: Option<&str>) -> Result<(Box<dyn TabularSource>, Grid), ProbeError> {
        let mut source = self.opener.open(path, sheet).or_unavailable(path)?;
        let sampling = &self.config.sampling;
        let grid = source.read_window(sampling.max_rows, sampling.max_cols).or_unavailable(path)?;
        debug!(sheet = source.sheet_name(), rows = grid.height(), cols = grid.width(), "sampled grid");
        Ok((source, grid))
    }

    fn run_pipeline(&self, source: &mut dyn TabularSource, grid: &Grid, started: Instant) -> Result<ParseParameters, StageError> {
        let config = &self.config;
        self.check_budget("sampling", started)?;

        let mut degraded = Vec::new();
        let merged = source.merged_regions().unwrap_or_else(|error| {
            warn!(%error, "merged regions unavailable");
            degraded.push(format!("Merged cells could not be read ({error}); hierarchy detection ignores them"));
            Vec::new()
        });
        self.check_budget("merged_regions", started)?;

        let profiler = RowProfiler::new(&self.matcher, config.header.likely_header_cutoff);
        let profiles = profile_grid(grid, &profiler);
        let candidates = HeaderCandidateDetector::new(&config.header).detect(&profiles);
        self.check_budget("candidates", started)?;

        let fallback_row = grid.first_non_empty_row().unwrap_or(0);
        let decision = HierarchyAnalyzer::new(&config.hierarchy).analyze(&candidates, &merged, fallback_row);
        let shape = TableShapeClassifier::classify(grid);
        debug!(table_type = %shape.table_type, numeric_ratio = shape.numeric_ratio, "classified shape");

        let mut params = ParameterSynthesizer::synthesize(grid, &merged, &decision, &shape);
        params.warnings.extend(degraded);
        self.check_budget("synthesis", started)?;

        let (params, outcome) = ValidationLoop::new(&config.validation)?.run(source, params);
        debug!(passed = outcome.passed, score = outcome.score, attempts = outcome.attempts, "validated parameters");
        self.check_budget("validation", started)?;
        Ok(params)
    }

    fn check_budget(&self, stage: &'static str, started: Instant) -> Result<(), StageError> {
        let elapsed_ms = started.elapsed().as_millis();
        if elapsed_ms >= u128::from(self.config.time_budget_ms) {
            return Err(StageError::BudgetExceeded {
                stage,
                budget_ms: self.config.time_budget_ms,
                elapsed_ms,
            });
        }
        Ok(())
    }
}
