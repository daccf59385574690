use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::grid::Grid;
use crate::spreadsheet::grid::MergedRegion;
use crate::spreadsheet::sheet_structure;
use crate::spreadsheet::SheetStructure;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::TabularSource;
use ::csv::ReaderBuilder;
use encoding_rs::Encoding;
use encoding_rs::GB18030;
use encoding_rs::UTF_8;
use std::ffi::OsStr;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Upper bound on the bytes sampled from a delimited file.
const MAX_SAMPLE_BYTES: u64 = 4 * 1024 * 1024;

/// A delimited text file (CSV, TSV) exposed as a single sheet without merged cells
pub struct CsvSource {
    name: String,
    delimiter: u8,
    text: String,
}

impl CsvSource {
    /// Opens `path`, decoding it by BOM, else as UTF-8, else as GB18030.
    pub fn open(path: &Path) -> Result<CsvSource, SpreadsheetError> {
        let mut bytes = Vec::new();
        File::open(path)?.take(MAX_SAMPLE_BYTES).read_to_end(&mut bytes)?;
        if bytes.len() as u64 == MAX_SAMPLE_BYTES {
            // Drop the partial last line.
            if let Some(end) = bytes.iter().rposition(|byte| *byte == b'\n') {
                bytes.truncate(end + 1);
            }
        }

        let text = decode(&bytes);
        let extension = path.extension().and_then(OsStr::to_str).map(str::to_ascii_lowercase);
        let delimiter = match extension.as_deref() {
            Some("tsv") => b'\t',
            Some("txt") => sniff_delimiter(&text),
            _ => b',',
        };
        let name = path
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_owned();
        debug!(file = %path.display(), delimiter = ?(delimiter as char), "opened delimited file");
        Ok(CsvSource { name, delimiter, text })
    }

    /// Reads up to `max_rows` physical rows; blank lines are kept as empty rows so indexes match the file.
    fn records(&self, max_rows: usize) -> Result<Vec<Vec<CellValue>>, SpreadsheetError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(self.text.as_bytes());
        // The csv reader silently drops blank lines.
        let mut records = reader.records();
        let mut rows = Vec::new();
        for blank in blank_lines(&self.text).into_iter().take(max_rows) {
            if blank {
                rows.push(Vec::new());
                continue;
            }
            match records.next() {
                Some(record) => rows.push(record?.iter().map(to_cell_value).collect()),
                None => break,
            }
        }
        Ok(rows)
    }

    pub(crate) fn describe(&self) -> Result<SheetStructure, SpreadsheetError> {
        let grid = Grid::from_rows(self.records(usize::MAX)?);
        let max_row = grid.rows().iter().rposition(|row| row.iter().any(|cell| !cell.is_empty()));
        let max_col = grid
            .rows()
            .iter()
            .filter_map(|row| row.iter().rposition(|cell| !cell.is_empty()))
            .max();
        Ok(sheet_structure(&self.name, max_row.zip(max_col), &[]))
    }
}

impl TabularSource for CsvSource {
    fn sheet_name(&self) -> &str {
        &self.name
    }

    fn read_window(&mut self, max_rows: usize, max_cols: usize) -> Result<Grid, SpreadsheetError> {
        let rows = self.records(max_rows)?;
        Ok(Grid::bounded(rows, max_rows, max_cols))
    }

    fn merged_regions(&mut self) -> Result<Vec<MergedRegion>, SpreadsheetError> {
        Ok(Vec::new())
    }
}

fn decode(bytes: &[u8]) -> String {
    if let Some((encoding, bom_length)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_length..]);
        return text.into_owned();
    }
    match UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(text) => text.into_owned(),
        None => GB18030.decode_without_bom_handling(bytes).0.into_owned(),
    }
}

/// Flags each record line of `text` as blank or not; newlines inside quoted fields do not end a line.
fn blank_lines(text: &str) -> Vec<bool> {
    let mut lines = Vec::new();
    let mut in_quotes = false;
    let mut blank = true;
    for character in text.chars() {
        match character {
            '"' => {
                in_quotes = !in_quotes;
                blank = false;
            }
            '\n' if !in_quotes => {
                lines.push(blank);
                blank = true;
            }
            '\r' => (),
            _ => blank = false,
        }
    }
    if !blank {
        lines.push(false);
    }
    lines
}

/// Tab wins when the first line has tabs but no commas.
fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.contains('\t') && !first_line.contains(',') {
        b'\t'
    } else {
        b','
    }
}

fn to_cell_value(field: &str) -> CellValue {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(number) if number.is_finite() => CellValue::Number(number),
        _ => CellValue::Text(field.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file(suffix: &str, bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn reads_typed_ragged_rows() {
        let file = file(".csv", "\u{feff}Report\n,\nName,Age\nAlice,30\nBob,NaN\n".as_bytes());
        let mut source = CsvSource::open(file.path()).unwrap();
        let grid = source.read_window(20, 30).unwrap();
        assert_eq!(grid.height(), 5);
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.irregular_rows(), 1);
        assert_eq!(grid.rows()[0][0], CellValue::from("Report"));
        assert!(grid.rows()[1].iter().all(CellValue::is_empty));
        assert_eq!(grid.rows()[3][1], CellValue::Number(30.0));
        assert_eq!(grid.rows()[4][1], CellValue::from("NaN"));
        assert!(source.merged_regions().unwrap().is_empty());
    }

    #[test]
    fn blank_lines_keep_their_row_index() {
        let file = file(".csv", b"\n\r\nReport Title\n\nName,Age\n\"multi\nline\",30\n\nBob,25");
        let mut source = CsvSource::open(file.path()).unwrap();
        let grid = source.read_window(20, 30).unwrap();
        assert_eq!(grid.height(), 8);
        for blank in [0, 1, 3, 6] {
            assert!(grid.rows()[blank].iter().all(CellValue::is_empty), "row {blank}");
        }
        assert_eq!(grid.rows()[2][0], CellValue::from("Report Title"));
        assert_eq!(grid.rows()[4][0], CellValue::from("Name"));
        assert_eq!(grid.rows()[5][0], CellValue::from("multi\nline"));
        assert_eq!(grid.rows()[7][1], CellValue::Number(25.0));
        assert_eq!(grid.irregular_rows(), 1);

        let grid = source.read_window(3, 30).unwrap();
        assert_eq!(grid.height(), 3);
    }

    #[test]
    fn quoted_newlines_are_not_record_breaks() {
        assert_eq!(blank_lines("a\n\n\"x\n\ny\"\n"), vec![false, true, false]);
        assert_eq!(blank_lines("\r\n,\nlast"), vec![true, false, false]);
        assert!(blank_lines("").is_empty());
    }

    #[test]
    fn tab_separated_and_gb18030() {
        let (bytes, _, _) = GB18030.encode("姓名\t年龄\n张三\t28\n");
        let file = file(".tsv", &bytes);
        let mut source = CsvSource::open(file.path()).unwrap();
        let grid = source.read_window(1, 30).unwrap();
        assert_eq!(grid.rows(), &[vec![CellValue::from("姓名"), CellValue::from("年龄")]]);
    }

    #[test]
    fn sniffs_tabs_in_txt_files() {
        assert_eq!(sniff_delimiter("a\tb\n1\t2"), b'\t');
        assert_eq!(sniff_delimiter("a,b\tc"), b',');
    }

    #[test]
    fn describes_extent() {
        let file = file(".csv", b"a,b,c\n1,2\n");
        let structure = CsvSource::open(file.path()).unwrap().describe().unwrap();
        assert_eq!(structure.used_range.as_deref(), Some("A1:C2"));
        assert!(structure.merged.is_empty());
    }
}
