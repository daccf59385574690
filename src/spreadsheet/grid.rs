use crate::inference::params::RowSelection;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::range_to_indexes;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;

/// A bounded, rectangular sample of raw cell values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<CellValue>>,
    width: usize,
    irregular_rows: usize,
}

impl Grid {
    /// Builds a grid from possibly ragged rows; short rows are padded with `Empty`.
    pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Grid {
        Self::bounded(rows, usize::MAX, usize::MAX)
    }

    /// Builds a grid from ragged rows, keeping at most `max_rows` × `max_cols`.
    ///
    /// Non-empty rows whose width differs from the widest row are counted as
    /// irregular before being padded or truncated; zero-length rows (blank lines) are not.
    pub fn bounded(mut rows: Vec<Vec<CellValue>>, max_rows: usize, max_cols: usize) -> Grid {
        rows.truncate(max_rows);
        let natural_width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let irregular_rows = rows
            .iter()
            .filter(|row| !row.is_empty() && row.len() != natural_width)
            .count();
        let width = natural_width.min(max_cols);
        for row in rows.iter_mut() {
            row.resize(width, CellValue::Empty);
        }
        Grid { rows, width, irregular_rows }
    }

    /// Builds a dense grid from sparse positioned cells, keeping at most `max_rows` × `max_cols`.
    pub fn from_cells(cells: Vec<Cell>, max_rows: usize, max_cols: usize) -> Grid {
        let cells: Vec<Cell> = cells
            .into_iter()
            .filter(|cell| cell.row < max_rows && cell.col < max_cols)
            .collect();
        let height = cells.iter().map(|cell| cell.row + 1).max().unwrap_or(0);
        let width = cells.iter().map(|cell| cell.col + 1).max().unwrap_or(0);
        let mut rows = vec![vec![CellValue::Empty; width]; height];
        for cell in cells {
            rows[cell.row][cell.col] = cell.value;
        }
        Grid { rows, width, irregular_rows: 0 }
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[CellValue]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows that were padded or truncated to make the grid rectangular.
    pub fn irregular_rows(&self) -> usize {
        self.irregular_rows
    }

    /// Returns `true` when no cell in the grid holds a value.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| is_empty_row(row))
    }

    /// Index of the first row containing at least one value.
    pub fn first_non_empty_row(&self) -> Option<usize> {
        self.rows.iter().position(|row| !is_empty_row(row))
    }
}

pub(crate) fn is_empty_row(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_empty)
}

/// A merged cell range, 0-based and inclusive on both ends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergedRegion {
    pub min_row: usize,
    pub max_row: usize,
    pub min_col: usize,
    pub max_col: usize,
}

impl MergedRegion {
    pub fn new(min_row: usize, max_row: usize, min_col: usize, max_col: usize) -> MergedRegion {
        MergedRegion {
            min_row: min_row.min(max_row),
            max_row: min_row.max(max_row),
            min_col: min_col.min(max_col),
            max_col: min_col.max(max_col),
        }
    }

    /// Parses an A1-style range such as "A1:C1".
    pub fn parse(range: &str) -> Option<MergedRegion> {
        let ((min_row, min_col), (max_row, max_col)) = range_to_indexes(range)?;
        Some(MergedRegion { min_row, max_row, min_col, max_col })
    }

    pub fn span_rows(&self) -> usize {
        self.max_row - self.min_row + 1
    }

    pub fn span_cols(&self) -> usize {
        self.max_col - self.min_col + 1
    }

    pub fn covers_row(&self, row: usize) -> bool {
        (self.min_row..=self.max_row).contains(&row)
    }

    /// Returns the A1-style range, e.g. "A1:B1".
    pub fn reference(&self) -> String {
        format!(
            "{}:{}",
            index_to_reference(self.min_row, self.min_col),
            index_to_reference(self.max_row, self.max_col)
        )
    }
}

/// Outcome of a row-capped trial parse.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrialParse {
    pub ok: bool,
    pub column_labels: Vec<String>,
    pub row_count: usize,
}

/// Column labels pandas-style readers synthesize for missing header text.
pub(crate) const PLACEHOLDER_PREFIX: &str = "Unnamed: ";

/// Parses `grid` the way a dataframe reader would with the given skip/header parameters.
///
/// Integer `skip_rows` drops the first n rows, a list drops those absolute rows.
/// Header indexes are relative to the remaining rows; data rows are the
/// non-empty rows after the last header row, capped at `row_cap`.
pub fn trial_parse(
    grid: &Grid,
    skip_rows: Option<&RowSelection>,
    header: Option<&RowSelection>,
    row_cap: usize,
) -> TrialParse {
    let skipped: HashSet<usize> = skip_rows.map(RowSelection::skipped_rows).unwrap_or_default().into_iter().collect();
    let view: Vec<&[CellValue]> = grid
        .rows()
        .iter()
        .enumerate()
        .filter(|(index, _)| !skipped.contains(index))
        .map(|(_, row)| row.as_slice())
        .collect();

    let header_rows = header.map(RowSelection::header_rows).unwrap_or_default();
    if header_rows.iter().any(|row| *row >= view.len()) {
        return TrialParse::default();
    }

    let data_start = header_rows.iter().max().map(|row| row + 1).unwrap_or(0);
    let data: Vec<&[CellValue]> = view[data_start..]
        .iter()
        .filter(|row| !is_empty_row(row))
        .take(row_cap)
        .copied()
        .collect();

    let width = header_rows
        .iter()
        .map(|row| view[*row])
        .chain(data.iter().copied())
        .map(|row| row.iter().rposition(|cell| !cell.is_empty()).map(|col| col + 1).unwrap_or(0))
        .max()
        .unwrap_or(0);

    let column_labels = match header_rows.as_slice() {
        [] => (0..width).map(|col| col.to_string()).collect(),
        [row] => (0..width)
            .map(|col| match view[*row].get(col).map(CellValue::stripped) {
                Some(label) if !label.is_empty() => label,
                _ => format!("{PLACEHOLDER_PREFIX}{col}"),
            })
            .collect(),
        rows => multi_level_labels(rows.iter().map(|row| view[*row]).collect(), width),
    };

    TrialParse {
        ok: true,
        column_labels,
        row_count: data.len(),
    }
}

/// Upper levels inherit the last label to their left (merged header behaviour);
/// the bottom level is taken as is. Levels are joined with "_".
fn multi_level_labels(levels: Vec<&[CellValue]>, width: usize) -> Vec<String> {
    let last_level = levels.len() - 1;
    let mut filled: Vec<Vec<Option<String>>> = Vec::with_capacity(levels.len());
    for (level, row) in levels.iter().enumerate() {
        let mut previous = None::<String>;
        let labels = (0..width)
            .map(|col| {
                let label = row.get(col).map(CellValue::stripped).filter(|label| !label.is_empty());
                if level < last_level {
                    if label.is_some() {
                        previous = label.clone();
                    }
                    previous.clone()
                } else {
                    label
                }
            })
            .collect();
        filled.push(labels);
    }

    (0..width)
        .map(|col| {
            filled
                .iter()
                .enumerate()
                .map(|(level, labels)| match &labels[col] {
                    Some(label) => label.to_owned(),
                    None => format!("{PLACEHOLDER_PREFIX}{col}_level_{level}"),
                })
                .collect::<Vec<_>>()
                .join("_")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> CellValue {
        CellValue::from(value)
    }

    fn grid(rows: Vec<Vec<CellValue>>) -> Grid {
        Grid::from_rows(rows)
    }

    #[test]
    fn ragged_rows_are_padded_and_counted() {
        let grid = Grid::bounded(
            vec![vec![text("Title")], vec![text("a"), text("b"), text("c")], vec![]],
            10,
            2,
        );
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.irregular_rows(), 1);
        assert!(grid.rows().iter().all(|row| row.len() == 2));
        assert_eq!(grid.first_non_empty_row(), Some(0));
    }

    #[test]
    fn sparse_cells_become_dense_rows() {
        let cells = vec![
            Cell { row: 2, col: 1, value: text("x") },
            Cell { row: 30, col: 0, value: text("outside") },
        ];
        let grid = Grid::from_cells(cells, 20, 30);
        assert_eq!((grid.height(), grid.width()), (3, 2));
        assert_eq!(grid.first_non_empty_row(), Some(2));
        assert!(Grid::from_cells(Vec::new(), 20, 30).is_empty());
    }

    #[test]
    fn merged_region_geometry() {
        let region = MergedRegion::parse("A1:C2").unwrap();
        assert_eq!((region.span_rows(), region.span_cols()), (2, 3));
        assert!(region.covers_row(1));
        assert!(!region.covers_row(2));
        assert_eq!(region.reference(), "A1:C2");
    }

    #[test]
    fn single_header_after_skipped_rows() {
        let grid = grid(vec![
            vec![CellValue::Empty, CellValue::Empty],
            vec![text("Report"), CellValue::Empty],
            vec![text("Name"), CellValue::Empty],
            vec![text("Alice"), CellValue::from(90)],
            vec![CellValue::Empty, CellValue::Empty],
            vec![text("Bob"), CellValue::from(80)],
        ]);
        let parse = trial_parse(&grid, Some(&RowSelection::Multiple(vec![0, 1])), Some(&RowSelection::Single(0)), 5);
        assert!(parse.ok);
        assert_eq!(parse.column_labels, vec!["Name", "Unnamed: 1"]);
        assert_eq!(parse.row_count, 2);

        let parse = trial_parse(&grid, Some(&RowSelection::Single(2)), Some(&RowSelection::Single(0)), 1);
        assert_eq!(parse.column_labels, vec!["Name", "Unnamed: 1"]);
        assert_eq!(parse.row_count, 1);
    }

    #[test]
    fn multi_level_header_forward_fills_upper_levels() {
        let grid = grid(vec![
            vec![text("Sales"), CellValue::Empty, text("Finance")],
            vec![text("ProductA"), text("ProductB"), CellValue::Empty],
            vec![CellValue::from(100), CellValue::from(200), CellValue::from(1000)],
        ]);
        let parse = trial_parse(&grid, None, Some(&RowSelection::Multiple(vec![0, 1])), 5);
        assert_eq!(
            parse.column_labels,
            vec!["Sales_ProductA", "Sales_ProductB", "Finance_Unnamed: 2_level_1"]
        );
        assert_eq!(parse.row_count, 1);
    }

    #[test]
    fn header_beyond_data_fails() {
        let grid = grid(vec![vec![text("only")]]);
        let parse = trial_parse(&grid, None, Some(&RowSelection::Single(3)), 5);
        assert!(!parse.ok);
        assert!(parse.column_labels.is_empty());
    }

    #[test]
    fn no_header_uses_positions_and_drops_trailing_empty_columns() {
        let grid = grid(vec![vec![CellValue::from(1), CellValue::from(2), CellValue::Empty]]);
        let parse = trial_parse(&grid, None, None, 5);
        assert_eq!(parse.column_labels, vec!["0", "1"]);
        assert_eq!(parse.row_count, 1);
    }
}
