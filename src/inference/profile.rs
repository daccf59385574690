use crate::inference::pattern::SemanticPatternMatcher;
use crate::spreadsheet::cell::CellValue;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::warn;

// Additive header-likelihood bonuses: (threshold, bonus), strongest first.
const TEXT_RATIO_BONUSES: [(f64, f64); 2] = [(0.7, 0.30), (0.5, 0.20)];
const DIVERSITY_BONUSES: [(f64, f64); 2] = [(0.8, 0.25), (0.6, 0.15)];
const SEMANTIC_BONUSES: [(f64, f64); 2] = [(0.8, 0.20), (0.5, 0.10)];
const TEXT_LENGTH_BONUSES: [((f64, f64), f64); 2] = [((3.0, 15.0), 0.15), ((2.0, 20.0), 0.10)];
const NON_EMPTY_BONUS: (f64, f64) = (0.5, 0.10);

static DATE_LIKE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\d{4}[-/.]\d{1,2}[-/.]\d{1,2}(?:[ T]\d{1,2}:\d{2}(?::\d{2})?)?$",
        r"^\d{1,2}[-/.]\d{1,2}[-/.]\d{4}$",
        r"(?i)^(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.? \d{1,2},? \d{4}$",
        r"^\d{4}年\d{1,2}月(?:\d{1,2}日)?$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Hardcode regex pattern"))
    .collect()
});

/// A profiling step produced a value that cannot be scored
#[derive(Error, Debug, PartialEq)]
pub enum ScoringAnomaly {
    #[error("Non-finite number in column {col}")]
    NonFiniteNumber { col: usize },

    #[error("Non-finite score '{name}'")]
    NonFiniteScore { name: &'static str },
}

/// Feature vector of one grid row and its header likelihood.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RowProfile {
    pub non_empty_count: usize,
    /// Distinct stripped string forms
    pub unique_count: usize,
    pub numeric_count: usize,
    pub text_count: usize,
    /// Date cells and date-like text; these also count as text
    pub date_count: usize,
    /// unique_count / non_empty_count
    pub pattern_diversity: f64,
    pub semantic_scores: BTreeMap<String, f64>,
    pub text_ratio: f64,
    pub avg_text_length: f64,
    pub non_empty_ratio: f64,
    pub has_repeated_values: bool,
    pub header_confidence: f64,
    pub is_likely_header: bool,
}

impl RowProfile {
    pub fn max_semantic_score(&self) -> f64 {
        self.semantic_scores.values().copied().fold(0.0, f64::max)
    }
}

/// Turns grid rows into [`RowProfile`]s.
pub struct RowProfiler<'m> {
    matcher: &'m SemanticPatternMatcher,
    likely_header_cutoff: f64,
}

impl<'m> RowProfiler<'m> {
    pub fn new(matcher: &'m SemanticPatternMatcher, likely_header_cutoff: f64) -> RowProfiler<'m> {
        RowProfiler { matcher, likely_header_cutoff }
    }

    /// Profiles one row; an all-empty row yields the zero profile.
    pub fn profile(&self, row: &[CellValue]) -> Result<RowProfile, ScoringAnomaly> {
        let cells: Vec<(usize, &CellValue)> = row.iter().enumerate().filter(|(_, cell)| !cell.is_empty()).collect();
        if cells.is_empty() {
            return Ok(RowProfile::default());
        }
        if let Some((col, _)) = cells.iter().find(|(_, cell)| matches!(cell, CellValue::Number(number) if !number.is_finite())) {
            return Err(ScoringAnomaly::NonFiniteNumber { col: *col });
        }

        let texts: Vec<String> = cells.iter().map(|(_, cell)| cell.stripped()).collect();
        let non_empty_count = cells.len();
        let unique_count = texts.iter().collect::<HashSet<_>>().len();
        let numeric_count = cells.iter().filter(|(_, cell)| cell.is_numeric_like()).count();
        let text_count = non_empty_count - numeric_count;
        let date_count = cells
            .iter()
            .zip(&texts)
            .filter(|((_, cell), text)| matches!(cell, CellValue::DateTime(_)) || is_date_like(text))
            .count();

        let pattern_diversity = unique_count as f64 / non_empty_count as f64;
        let semantic_scores = self.matcher.score(&texts.join(" "));
        let text_ratio = text_count as f64 / non_empty_count as f64;
        let avg_text_length = texts.iter().map(|text| text.chars().count()).sum::<usize>() as f64 / non_empty_count as f64;
        let non_empty_ratio = non_empty_count as f64 / row.len().max(1) as f64;

        let mut profile = RowProfile {
            non_empty_count,
            unique_count,
            numeric_count,
            text_count,
            date_count,
            pattern_diversity,
            semantic_scores,
            text_ratio,
            avg_text_length,
            non_empty_ratio,
            has_repeated_values: unique_count < non_empty_count,
            header_confidence: 0.0,
            is_likely_header: false,
        };
        profile.header_confidence = header_confidence(&profile)?;
        profile.is_likely_header = profile.header_confidence > self.likely_header_cutoff;
        Ok(profile)
    }

    /// Profiles one row, recovering an anomaly as the zero profile.
    pub fn profile_or_zero(&self, row_index: usize, row: &[CellValue]) -> RowProfile {
        self.profile(row).unwrap_or_else(|anomaly| {
            warn!(row = row_index, %anomaly, "row scored as zero confidence");
            RowProfile::default()
        })
    }
}

fn header_confidence(profile: &RowProfile) -> Result<f64, ScoringAnomaly> {
    let tiered = |value: f64, bonuses: &[(f64, f64)]| {
        bonuses.iter().find(|(threshold, _)| value > *threshold).map(|(_, bonus)| *bonus).unwrap_or(0.0)
    };
    let length_bonus = TEXT_LENGTH_BONUSES
        .iter()
        .find(|((low, high), _)| (*low..=*high).contains(&profile.avg_text_length))
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0.0);

    let score = tiered(profile.text_ratio, &TEXT_RATIO_BONUSES)
        + tiered(profile.pattern_diversity, &DIVERSITY_BONUSES)
        + tiered(profile.max_semantic_score(), &SEMANTIC_BONUSES)
        + length_bonus
        + tiered(profile.non_empty_ratio, &[NON_EMPTY_BONUS]);
    if score.is_finite() {
        Ok(score.clamp(0.0, 1.0))
    } else {
        Err(ScoringAnomaly::NonFiniteScore { name: "header_confidence" })
    }
}

/// Recognizes common date spellings such as `2023-01-01`, `01/01/2023`, `Jan 1, 2023` and `2023年1月1日`.
pub fn is_date_like(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && DATE_LIKE.iter().any(|pattern| pattern.is_match(text))
}
