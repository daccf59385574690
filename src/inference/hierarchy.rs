//! Single vs. multi-row header decision.
//!
//! The two best candidates, taken in row order, are compared on five factors;
//! a weighted score above the threshold plus a merged cell spanning at least
//! two columns on the upper row makes the header hierarchical.

use crate::config::HierarchyConfig;
use crate::inference::candidate::HeaderCandidate;
use crate::inference::params::RowSelection;
use crate::inference::profile::RowProfile;
use crate::inference::profile::ScoringAnomaly;
use crate::spreadsheet::grid::MergedRegion;
use serde::Serialize;
use std::fmt::Display;
use tracing::debug;
use tracing::warn;

/// Upper bound on the lower/upper unique-count ratio.
const UNIQUE_RATIO_CAP: f64 = 3.0;
/// Position score lost per row beyond a one-row gap.
const POSITION_DECAY: f64 = 0.2;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    Single,
    Hierarchical,
    Fallback,
}

impl Display for StructureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StructureType::Single => "single",
            StructureType::Hierarchical => "hierarchical",
            StructureType::Fallback => "fallback",
        };
        write!(f, "{name}")
    }
}

/// Unweighted factor scores of an (upper, lower) candidate pair, each in [0, 1].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HierarchyFactors {
    pub text_length: f64,
    pub unique_count: f64,
    pub semantic: f64,
    pub position: f64,
    pub complexity: f64,
}

impl HierarchyFactors {
    /// Computes all five factors for `upper` above `lower`.
    pub fn between(upper: &RowProfile, upper_row: usize, lower: &RowProfile, lower_row: usize) -> HierarchyFactors {
        HierarchyFactors {
            text_length: text_length_hierarchy(upper, lower),
            unique_count: unique_count_hierarchy(upper, lower),
            semantic: semantic_relationship(upper, lower),
            position: position_appropriateness(lower_row.saturating_sub(upper_row)),
            complexity: if lower.pattern_diversity > upper.pattern_diversity { 1.0 } else { 0.0 },
        }
    }

    pub fn weighted(&self, config: &HierarchyConfig) -> Result<f64, ScoringAnomaly> {
        let weights = &config.weights;
        let score = self.text_length * weights.text_length
            + self.unique_count * weights.unique_count
            + self.semantic * weights.semantic
            + self.position * weights.position
            + self.complexity * weights.complexity;
        if score.is_finite() {
            Ok(score)
        } else {
            Err(ScoringAnomaly::NonFiniteScore { name: "hierarchy_score" })
        }
    }
}

fn text_length_hierarchy(upper: &RowProfile, lower: &RowProfile) -> f64 {
    if lower.avg_text_length > upper.avg_text_length {
        1.0
    } else if upper.avg_text_length > 0.0 {
        0.5 * lower.avg_text_length / upper.avg_text_length
    } else {
        0.0
    }
}

/// 0.5 when the lower row has barely more distinct values, rising to 1.0 at three times as many.
fn unique_count_hierarchy(upper: &RowProfile, lower: &RowProfile) -> f64 {
    if lower.unique_count <= upper.unique_count || upper.unique_count == 0 {
        return 0.0;
    }
    let ratio = (lower.unique_count as f64 / upper.unique_count as f64).min(UNIQUE_RATIO_CAP);
    0.5 + 0.5 * (ratio - 1.0) / (UNIQUE_RATIO_CAP - 1.0)
}

/// Shared categories with differing strengths score 1.0, with equal strengths 0.5.
fn semantic_relationship(upper: &RowProfile, lower: &RowProfile) -> f64 {
    let shared: Vec<f64> = upper
        .semantic_scores
        .iter()
        .filter_map(|(category, strength)| {
            lower.semantic_scores.get(category).map(|other| {
                if (strength - other).abs() > f64::EPSILON { 1.0 } else { 0.5 }
            })
        })
        .collect();
    if shared.is_empty() {
        0.0
    } else {
        shared.iter().sum::<f64>() / shared.len() as f64
    }
}

fn position_appropriateness(gap: usize) -> f64 {
    match gap {
        0 => 0.0,
        gap => (1.0 - POSITION_DECAY * (gap - 1) as f64).max(0.0),
    }
}

/// Outcome of the hierarchy analysis.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HierarchyDecision {
    pub is_multi_level: bool,
    pub confidence: f64,
    pub structure_type: StructureType,
    /// Absolute sheet rows
    pub recommended_header: RowSelection,
    /// (upper, lower) rows that were compared, if two candidates existed
    pub pair: Option<(usize, usize)>,
    pub factors: HierarchyFactors,
    /// Weighted factor score of the pair
    pub hierarchy_score: f64,
    /// Widest merged span on the upper row, when at least two columns wide
    pub merged_upper_span: Option<usize>,
}

impl HierarchyDecision {
    /// Decision used when no row qualifies as a header.
    pub fn fallback(row: usize) -> HierarchyDecision {
        HierarchyDecision {
            is_multi_level: false,
            confidence: 0.0,
            structure_type: StructureType::Fallback,
            recommended_header: RowSelection::Single(row),
            pair: None,
            factors: HierarchyFactors::default(),
            hierarchy_score: 0.0,
            merged_upper_span: None,
        }
    }
}

pub struct HierarchyAnalyzer<'c> {
    config: &'c HierarchyConfig,
}

impl<'c> HierarchyAnalyzer<'c> {
    pub fn new(config: &'c HierarchyConfig) -> HierarchyAnalyzer<'c> {
        HierarchyAnalyzer { config }
    }

    /// Decides between a single and a hierarchical header.
    ///
    /// # Arguments
    /// * `candidates` - Ranked candidates, best first
    /// * `merged` - Every merged region of the sheet
    /// * `fallback_row` - Header row used when there is no candidate
    pub fn analyze(&self, candidates: &[HeaderCandidate<'_>], merged: &[MergedRegion], fallback_row: usize) -> HierarchyDecision {
        let Some(best) = candidates.first() else {
            debug!(fallback_row, "no header candidate");
            return HierarchyDecision::fallback(fallback_row);
        };
        let mut decision = HierarchyDecision {
            is_multi_level: false,
            confidence: best.confidence(),
            structure_type: StructureType::Single,
            recommended_header: RowSelection::Single(best.row_index),
            pair: None,
            factors: HierarchyFactors::default(),
            hierarchy_score: 0.0,
            merged_upper_span: None,
        };
        let Some(second) = candidates.get(1) else {
            return decision;
        };

        let (upper, lower) = if best.row_index < second.row_index { (best, second) } else { (second, best) };
        let factors = HierarchyFactors::between(upper.profile, upper.row_index, lower.profile, lower.row_index);
        let score = factors.weighted(self.config).unwrap_or_else(|anomaly| {
            warn!(upper = upper.row_index, lower = lower.row_index, %anomaly, "pair scored as zero");
            0.0
        });
        let merged_upper_span = merged
            .iter()
            .filter(|region| region.covers_row(upper.row_index))
            .map(MergedRegion::span_cols)
            .filter(|span| *span >= 2)
            .max();

        decision.pair = Some((upper.row_index, lower.row_index));
        decision.factors = factors;
        decision.hierarchy_score = score;
        decision.merged_upper_span = merged_upper_span;
        if score > self.config.threshold && merged_upper_span.is_some() {
            decision.is_multi_level = true;
            decision.confidence = score;
            decision.structure_type = StructureType::Hierarchical;
            decision.recommended_header = RowSelection::Multiple(vec![upper.row_index, lower.row_index]);
        }
        debug!(
            structure = %decision.structure_type,
            header = ?decision.recommended_header,
            score,
            merged_upper_span = ?merged_upper_span,
            "hierarchy decided"
        );
        decision
    }
}
