use crate::config::ValidationConfig;
use crate::inference::params::ParseParameters;
use crate::inference::params::RowSelection;
use crate::spreadsheet::grid::TrialParse;
use crate::spreadsheet::TabularSource;
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

/// Share of placeholder labels above which the header is shifted down.
const PLACEHOLDER_DOMINANCE: f64 = 0.5;

/// Quality checks of one trial parse.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ValidationChecks {
    pub has_data: bool,
    pub has_columns: bool,
    pub no_unnamed_columns: bool,
    pub reasonable_column_count: bool,
}

impl ValidationChecks {
    /// Fraction of satisfied checks.
    pub fn score(&self) -> f64 {
        let checks = [self.has_data, self.has_columns, self.no_unnamed_columns, self.reasonable_column_count];
        checks.iter().filter(|check| **check).count() as f64 / checks.len() as f64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub score: f64,
    /// Checks of the last trial
    pub checks: ValidationChecks,
    /// Parameters that replaced the input, if any
    pub adjusted: Option<ParseParameters>,
    /// Trial parses performed
    pub attempts: usize,
}

/// Trial-parses candidate parameters and self-corrects within a fixed retry bound.
pub struct ValidationLoop<'c> {
    config: &'c ValidationConfig,
    placeholder: Regex,
}

impl<'c> ValidationLoop<'c> {
    pub fn new(config: &'c ValidationConfig) -> Result<ValidationLoop<'c>, regex::Error> {
        let placeholder = Regex::new(&config.placeholder_pattern)?;
        Ok(ValidationLoop { config, placeholder })
    }

    /// Evaluates a trial parse, returning its checks and the share of placeholder labels.
    pub fn evaluate(&self, trial: &TrialParse) -> (ValidationChecks, f64) {
        if !trial.ok {
            return (ValidationChecks::default(), 0.0);
        }
        let labels = &trial.column_labels;
        let placeholders = labels.iter().filter(|label| self.placeholder.is_match(label)).count();
        let placeholder_ratio = if labels.is_empty() { 0.0 } else { placeholders as f64 / labels.len() as f64 };
        let checks = ValidationChecks {
            has_data: trial.row_count > 0,
            has_columns: !labels.is_empty(),
            no_unnamed_columns: placeholders == 0,
            reasonable_column_count: (self.config.min_columns..=self.config.max_columns).contains(&labels.len()),
        };
        (checks, placeholder_ratio)
    }

    /// Validates `params` against `source`, retrying at most `max_retries` times after remediation.
    ///
    /// Falls back to `header = 0` with zero confidence when the checks keep
    /// failing or no remediation applies.
    pub fn run(&self, source: &mut dyn TabularSource, params: ParseParameters) -> (ParseParameters, ValidationOutcome) {
        let mut current = params.clone();
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            let (checks, placeholder_ratio) = match source.trial_parse(&current, self.config.row_cap) {
                Ok(trial) => self.evaluate(&trial),
                Err(error) => {
                    warn!(%error, "trial parse failed");
                    (ValidationChecks::default(), 0.0)
                }
            };
            let score = checks.score();
            let passed = score >= self.config.pass_ratio;
            debug!(attempt = attempts, score, passed, checks = ?checks, "trial parse validated");

            if passed {
                let adjusted = (current != params).then(|| current.clone());
                if adjusted.is_some() {
                    current.warnings.push(format!(
                        "Parameters were adjusted after {} failed trial parse(s)",
                        attempts - 1
                    ));
                }
                let outcome = ValidationOutcome { passed, score, checks, adjusted, attempts };
                return (current, outcome);
            }

            let remedy = if attempts > self.config.max_retries {
                None
            } else {
                remediate(&current, &checks, placeholder_ratio)
            };
            match remedy {
                Some(next) => current = next,
                None => {
                    let fallback = ParseParameters::safe_default(format!(
                        "Validation failed after {attempts} trial parse(s) (score {score:.2}); falling back to header=0"
                    ));
                    warn!(attempts, score, "validation fell back to safe default");
                    let outcome = ValidationOutcome {
                        passed: false,
                        score,
                        checks,
                        adjusted: Some(fallback.clone()),
                        attempts,
                    };
                    return (fallback, outcome);
                }
            }
        }
    }
}

/// Shifts the header down when placeholders dominate; drops the first skipped row when no data was read.
fn remediate(params: &ParseParameters, checks: &ValidationChecks, placeholder_ratio: f64) -> Option<ParseParameters> {
    let mut next = params.clone();
    if placeholder_ratio > PLACEHOLDER_DOMINANCE {
        next.header = next.header.as_ref().map(|header| header.shift_header(1));
    }
    if !checks.has_data {
        next.skip_rows = match next.skip_rows.take() {
            Some(RowSelection::Single(count)) if count > 1 => Some(RowSelection::Single(count - 1)),
            Some(RowSelection::Multiple(mut rows)) if rows.len() > 1 => {
                rows.remove(0);
                Some(RowSelection::Multiple(rows))
            }
            _ => None,
        };
    }
    (next != *params).then_some(next)
}
