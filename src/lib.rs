//! # Sheet Probe
//!
//! Infers how to parse semi-structured spreadsheet and CSV tables: which leading
//! rows to skip and which row (or rows) form the header.
//!
//! ## Features
//!
//! - **Multi-format support**: Excel workbooks (`.xlsx`, `.xlsm`, `.xltx`, `.xltm`)
//!   and delimited text (`.csv`, `.tsv`, `.txt`)
//! - **Header scoring**: Rows are profiled for text ratio, uniqueness, type
//!   diversity and semantic vocabulary (English and Chinese)
//! - **Multi-level headers**: Merged upper cells are recognised as hierarchical headers
//! - **Self-correction**: Every result is trial-parsed and adjusted within a bounded number of retries
//! - **Never fails on content**: Anything past opening the file degrades to `header = 0`
//!   with an explanatory warning
//! - **Fingerprint cache**: Results are memoised per file version and sheet, and can be
//!   persisted as JSON
//!
//! ## Usage
//!
//! ```no_run
//! use sheet_probe::{InferenceConfig, Inferencer};
//!
//! let inferencer = Inferencer::new(InferenceConfig::default())?;
//! let params = inferencer.infer_parse_parameters("sales.xlsx", Some("2024*"))?;
//! for warning in &params.warnings {
//!     eprintln!("{warning}");
//! }
//! # Ok::<(), sheet_probe::ProbeError>(())
//! ```
pub mod config;
pub mod error;
pub(crate) mod helpers;
pub mod inference;
pub mod spreadsheet;

pub use config::InferenceConfig;
pub use error::ProbeError;
pub use inference::cache::FingerprintCache;
pub use inference::hierarchy::StructureType;
pub use inference::orchestrator::Inferencer;
pub use inference::params::ParseParameters;
pub use inference::params::RowSelection;
pub use inference::profile::RowProfile;
pub use inference::shape::TableShape;
pub use inference::shape::TableType;
pub use spreadsheet::cell::CellValue;
pub use spreadsheet::describe_structure;
pub use spreadsheet::grid::Grid;
pub use spreadsheet::grid::MergedRegion;
pub use spreadsheet::FileSystemOpener;
pub use spreadsheet::SourceOpener;
pub use spreadsheet::SpreadsheetError;
pub use spreadsheet::TabularSource;
