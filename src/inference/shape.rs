use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::grid::is_empty_row;
use crate::spreadsheet::grid::Grid;
use serde::Serialize;
use std::fmt::Display;

/// Numeric share above which the last rows count as an aggregate (totals) block.
const AGGREGATE_NUMERIC_RATIO: f64 = 0.7;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    SummaryTable,
    DetailTable,
    MixedTable,
    Unknown,
    Empty,
}

impl Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TableType::SummaryTable => "summary_table",
            TableType::DetailTable => "detail_table",
            TableType::MixedTable => "mixed_table",
            TableType::Unknown => "unknown",
            TableType::Empty => "empty",
        };
        write!(f, "{name}")
    }
}

/// Overall sheet classification with its supporting ratios.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableShape {
    pub table_type: TableType,
    pub confidence: f64,
    /// Numeric share of the non-empty cells
    pub numeric_ratio: f64,
    /// Text share of the non-empty cells
    pub text_ratio: f64,
    /// The last two non-empty rows are mostly numeric
    pub has_trailing_aggregate: bool,
}

pub struct TableShapeClassifier;

impl TableShapeClassifier {
    /// Classifies the grid; the first matching rule wins.
    pub fn classify(grid: &Grid) -> TableShape {
        let (numeric, total) = numeric_share(grid.rows().iter().map(Vec::as_slice));
        if total == 0 {
            return TableShape {
                table_type: TableType::Empty,
                confidence: 1.0,
                numeric_ratio: 0.0,
                text_ratio: 0.0,
                has_trailing_aggregate: false,
            };
        }

        let numeric_ratio = numeric as f64 / total as f64;
        let text_ratio = 1.0 - numeric_ratio;
        let trailing: Vec<&[CellValue]> = grid
            .rows()
            .iter()
            .rev()
            .filter(|row| !is_empty_row(row))
            .take(2)
            .map(Vec::as_slice)
            .collect();
        let has_trailing_aggregate = trailing.len() == 2 && {
            let (numeric, total) = numeric_share(trailing.into_iter());
            numeric as f64 / total as f64 > AGGREGATE_NUMERIC_RATIO
        };

        let (table_type, confidence) = if numeric_ratio > 0.6 && has_trailing_aggregate {
            (TableType::SummaryTable, 0.8)
        } else if text_ratio > 0.6 {
            (TableType::DetailTable, 0.7)
        } else if numeric_ratio > 0.3 && numeric_ratio < 0.7 {
            (TableType::MixedTable, 0.6)
        } else {
            (TableType::Unknown, 0.3)
        };
        TableShape {
            table_type,
            confidence,
            numeric_ratio,
            text_ratio,
            has_trailing_aggregate,
        }
    }
}

/// (numeric cells, non-empty cells)
fn numeric_share<'a>(rows: impl Iterator<Item = &'a [CellValue]>) -> (usize, usize) {
    rows.flat_map(|row| row.iter())
        .filter(|cell| !cell.is_empty())
        .fold((0, 0), |(numeric, total), cell| {
            (numeric + usize::from(cell.is_numeric_like()), total + 1)
        })
}
