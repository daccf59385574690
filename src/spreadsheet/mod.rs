//! Tabular-source layer: opens worksheets and delimited files, samples bounded
//! grids, reports merged regions and performs row-capped trial parses.

pub mod cell;
pub mod csv;
pub mod grid;
pub(crate) mod reference;
pub mod xlsx;

use crate::inference::params::ParseParameters;
use crate::spreadsheet::csv::CsvSource;
use crate::spreadsheet::grid::Grid;
use crate::spreadsheet::grid::MergedRegion;
use crate::spreadsheet::grid::TrialParse;
use crate::spreadsheet::xlsx::XlsxSource;
use serde::Serialize;
use std::ffi::OsStr;
use std::path::Path;
use std::time::SystemTime;
use thiserror::Error;

/// Widest row a trial parse will look at.
pub(crate) const TRIAL_MAX_COLS: usize = 512;

/// Extra rows read by a trial parse to step over blank rows between data rows.
const TRIAL_SLACK_ROWS: usize = 64;

/// Errors raised while opening or reading a tabular source
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Cannot detect file format for '{name}'")]
    UnsupportedFormat { name: String },

    #[error("Sheet '{sheet}' not found in '{file}'")]
    SheetNotFound { file: String, sheet: String },

    #[error("Spreadsheet '{0}' contains no sheets")]
    EmptyWorkbook(String),

    #[error("Missing part '{0}' in spreadsheet package")]
    MissingPart(String),

    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    CsvError(#[from] ::csv::Error),

    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),
}

/// Size and modification time of a source file, used for fingerprinting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: SystemTime,
}

/// An opened sheet. Underlying file handles are released when the value is dropped.
pub trait TabularSource {
    /// Name of the selected sheet
    fn sheet_name(&self) -> &str;

    /// Reads at most `max_rows` × `max_cols` cells from the top-left corner of the sheet.
    fn read_window(&mut self, max_rows: usize, max_cols: usize) -> Result<Grid, SpreadsheetError>;

    /// Returns every merged region of the sheet, not limited to any sampled window.
    fn merged_regions(&mut self) -> Result<Vec<MergedRegion>, SpreadsheetError>;

    /// Parses the sheet with the given parameters, reading at most `row_cap` data rows.
    fn trial_parse(&mut self, params: &ParseParameters, row_cap: usize) -> Result<TrialParse, SpreadsheetError> {
        let skipped = params.skip_rows.as_ref().map(|skip| skip.skipped_rows().len()).unwrap_or(0);
        let header_end = params.header.as_ref().and_then(|header| header.header_rows().into_iter().max()).map(|row| row + 1).unwrap_or(0);
        let max_rows = skipped + header_end + row_cap + TRIAL_SLACK_ROWS;
        let grid = self.read_window(max_rows, TRIAL_MAX_COLS)?;
        Ok(grid::trial_parse(&grid, params.skip_rows.as_ref(), params.header.as_ref(), row_cap))
    }
}

/// Opens tabular sources and reports file metadata.
pub trait SourceOpener: Send + Sync {
    /// Opens `path`, selecting `sheet` (or the first sheet when `None`).
    fn open(&self, path: &Path, sheet: Option<&str>) -> Result<Box<dyn TabularSource>, SpreadsheetError>;

    /// Returns size and modification time of `path`.
    fn stat(&self, path: &Path) -> Result<FileStat, SpreadsheetError> {
        let metadata = std::fs::metadata(path)?;
        Ok(FileStat {
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }
}

/// Supported source formats, detected from the file extension
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SourceFormat {
    Xlsx,
    Delimited,
}

impl SourceFormat {
    /// Detects the format from the file extension (case-insensitive).
    ///
    /// Supported formats:
    /// - `.xlsx`, `.xlsm`, `.xltx`, `.xltm` - Office Open XML workbooks
    /// - `.csv`, `.tsv`, `.txt` - delimited text
    pub(crate) fn detect(path: &Path) -> Result<SourceFormat, SpreadsheetError> {
        let extension = path.extension().and_then(OsStr::to_str).map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("xlsx") | Some("xlsm") | Some("xltx") | Some("xltm") => Ok(SourceFormat::Xlsx),
            Some("csv") | Some("tsv") | Some("txt") => Ok(SourceFormat::Delimited),
            _ => Err(SpreadsheetError::UnsupportedFormat {
                name: path.to_string_lossy().to_string(),
            }),
        }
    }
}

/// Opens files from the local file system, dispatching on the file extension.
#[derive(Copy, Clone, Debug, Default)]
pub struct FileSystemOpener;

impl SourceOpener for FileSystemOpener {
    fn open(&self, path: &Path, sheet: Option<&str>) -> Result<Box<dyn TabularSource>, SpreadsheetError> {
        match SourceFormat::detect(path)? {
            SourceFormat::Xlsx => Ok(Box::new(XlsxSource::open(path, sheet)?)),
            SourceFormat::Delimited => Ok(Box::new(CsvSource::open(path)?)),
        }
    }
}

/// Layout summary of one sheet
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SheetStructure {
    pub name: String,
    /// Used range such as "A1:D20", `None` for an empty sheet
    pub used_range: Option<String>,
    pub rows: usize,
    pub cols: usize,
    /// Merged ranges such as "A1:B1"
    pub merged: Vec<String>,
}

/// Layout summary of every sheet in a file
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkbookStructure {
    pub file: String,
    pub sheets: Vec<SheetStructure>,
}

/// Lists the sheets of `path` with their used ranges, extents and merged ranges.
///
/// # Arguments
///
/// * `path` - Path to an `.xlsx`-family workbook or a delimited text file
///
/// # Errors
///
/// Returns an error if the format is unsupported or the file cannot be read.
pub fn describe_structure<P: AsRef<Path>>(path: P) -> Result<WorkbookStructure, SpreadsheetError> {
    let path = path.as_ref();
    let sheets = match SourceFormat::detect(path)? {
        SourceFormat::Xlsx => XlsxSource::describe(path)?,
        SourceFormat::Delimited => vec![CsvSource::open(path)?.describe()?],
    };
    Ok(WorkbookStructure {
        file: path.to_string_lossy().to_string(),
        sheets,
    })
}

/// Builds a structure entry from the extent of the non-empty cells.
pub(crate) fn sheet_structure(name: &str, extent: Option<(usize, usize)>, merged: &[MergedRegion]) -> SheetStructure {
    let (rows, cols) = extent.map(|(max_row, max_col)| (max_row + 1, max_col + 1)).unwrap_or((0, 0));
    SheetStructure {
        name: name.to_owned(),
        used_range: extent.map(|(max_row, max_col)| MergedRegion::new(0, max_row, 0, max_col).reference()),
        rows,
        cols,
        merged: merged.iter().map(MergedRegion::reference).collect(),
    }
}
