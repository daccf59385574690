//! Parse parameters and their synthesis from the upstream analyses.

use crate::inference::hierarchy::HierarchyDecision;
use crate::inference::hierarchy::StructureType;
use crate::inference::shape::TableShape;
use crate::spreadsheet::grid::Grid;
use crate::spreadsheet::grid::MergedRegion;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Decisions below this confidence produce an "uncertain" warning.
const LOW_CONFIDENCE: f64 = 0.5;

/// A row selection: a single index/count, or a strictly increasing list of indexes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowSelection {
    Single(usize),
    Multiple(Vec<usize>),
}

impl RowSelection {
    /// Rows removed when used as `skip_rows`: an integer drops the first n rows.
    pub fn skipped_rows(&self) -> Vec<usize> {
        match self {
            RowSelection::Single(count) => (0..*count).collect(),
            RowSelection::Multiple(rows) => rows.to_owned(),
        }
    }

    /// Rows read as labels when used as `header`.
    pub fn header_rows(&self) -> Vec<usize> {
        match self {
            RowSelection::Single(row) => vec![*row],
            RowSelection::Multiple(rows) => rows.to_owned(),
        }
    }

    /// Adds `offset` to every header row.
    pub(crate) fn shift_header(&self, offset: usize) -> RowSelection {
        match self {
            RowSelection::Single(row) => RowSelection::Single(row + offset),
            RowSelection::Multiple(rows) => RowSelection::Multiple(rows.iter().map(|row| row + offset).collect()),
        }
    }
}

/// Parameters a dataframe reader needs to load the table cleanly.
///
/// `header` indexes are relative to the rows left after `skip_rows` is applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParseParameters {
    pub skip_rows: Option<RowSelection>,
    pub header: Option<RowSelection>,
    pub confidence: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
}

impl ParseParameters {
    /// `header = 0`, nothing skipped, zero confidence.
    pub fn safe_default(warning: impl Into<String>) -> ParseParameters {
        ParseParameters {
            skip_rows: None,
            header: Some(RowSelection::Single(0)),
            confidence: 0.0,
            warnings: vec![warning.into()],
            tips: Vec::new(),
        }
    }

    /// Header rows as absolute indexes of the original sheet.
    pub fn header_absolute(&self) -> Vec<usize> {
        let skipped: HashSet<usize> = self.skip_rows.as_ref().map(RowSelection::skipped_rows).unwrap_or_default().into_iter().collect();
        let header_rows = self.header.as_ref().map(RowSelection::header_rows).unwrap_or_default();
        let mut kept = (0..).filter(|row| !skipped.contains(row));
        let mut absolute = Vec::with_capacity(header_rows.len());
        let mut position = 0usize;
        let mut current = kept.next();
        for relative in header_rows {
            while position < relative {
                current = kept.next();
                position += 1;
            }
            absolute.extend(current);
        }
        absolute
    }

    /// `true` when no absolute row is both skipped and used as a header.
    pub fn is_consistent(&self) -> bool {
        let skipped: HashSet<usize> = self.skip_rows.as_ref().map(RowSelection::skipped_rows).unwrap_or_default().into_iter().collect();
        self.header_absolute().iter().all(|row| !skipped.contains(row))
    }
}

/// Turns analysis results into concrete [`ParseParameters`].
pub struct ParameterSynthesizer;

impl ParameterSynthesizer {
    /// Skips every row above the first header row and re-bases header indexes on the remaining rows.
    pub fn synthesize(
        grid: &Grid,
        merged: &[MergedRegion],
        decision: &HierarchyDecision,
        shape: &TableShape,
    ) -> ParseParameters {
        let header_rows = decision.recommended_header.header_rows();
        let first_header = header_rows.iter().copied().min().unwrap_or(0);
        let first_non_empty = grid.first_non_empty_row().unwrap_or(0);

        let skip_rows = (first_header > 0).then(|| RowSelection::Multiple((0..first_header).collect()));
        let header = match &decision.recommended_header {
            RowSelection::Single(row) => RowSelection::Single(row - first_header),
            RowSelection::Multiple(rows) => RowSelection::Multiple(rows.iter().map(|row| row - first_header).collect()),
        };

        let mut warnings = Vec::new();
        if !merged.is_empty() {
            warnings.push(format!(
                "Detected {} merged cell range(s); merged header cells are forward-filled when read",
                merged.len()
            ));
        }
        if grid.irregular_rows() > 0 {
            warnings.push(format!(
                "{} sampled row(s) had inconsistent widths and were padded or truncated",
                grid.irregular_rows()
            ));
        }
        match decision.structure_type {
            StructureType::Hierarchical => warnings.push(format!(
                "Multi-row header {:?} produces hierarchical columns; upper labels are joined with '_'",
                header_rows
            )),
            StructureType::Single if decision.merged_upper_span.is_none() && decision.hierarchy_score > LOW_CONFIDENCE => {
                warnings.push("Rows above the header look like an upper header level, but no merged cells confirm it".to_owned());
            }
            StructureType::Fallback => {
                warnings.push("No row looked like a header; the first non-empty row is used".to_owned())
            }
            _ => (),
        }
        if decision.confidence < LOW_CONFIDENCE && decision.structure_type != StructureType::Fallback {
            warnings.push(format!("Header detection is uncertain (confidence {:.2})", decision.confidence));
        }

        let mut tips = vec![match decision.structure_type {
            StructureType::Single => format!("Single header row at sheet row {}", first_header),
            StructureType::Hierarchical => format!("Hierarchical header spanning sheet rows {:?}", header_rows),
            StructureType::Fallback => format!("Fallback header at sheet row {}", first_header),
        }];
        if first_header > 0 {
            let preamble = first_header - first_non_empty.min(first_header);
            tips.push(format!(
                "Skipping {} leading row(s): {} blank, {} title/preamble",
                first_header,
                first_header - preamble,
                preamble
            ));
        }
        tips.push(format!("Table shape: {} (confidence {:.1})", shape.table_type, shape.confidence));

        let params = ParseParameters {
            skip_rows,
            header: Some(header),
            confidence: decision.confidence,
            warnings,
            tips,
        };
        debug!(skip_rows = ?params.skip_rows, header = ?params.header, confidence = params.confidence, "synthesized parameters");
        params
    }
}
