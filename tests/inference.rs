mod common;

use common::people;
use common::BLANK;
use sheet_probe::spreadsheet::grid::TrialParse;
use sheet_probe::spreadsheet::FileStat;
use sheet_probe::CellValue;
use sheet_probe::FingerprintCache;
use sheet_probe::Grid;
use sheet_probe::InferenceConfig;
use sheet_probe::Inferencer;
use sheet_probe::MergedRegion;
use sheet_probe::ParseParameters;
use sheet_probe::ProbeError;
use sheet_probe::RowSelection;
use sheet_probe::SourceOpener;
use sheet_probe::SpreadsheetError;
use sheet_probe::TabularSource;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

fn inferencer() -> Inferencer {
    Inferencer::new(InferenceConfig::default()).unwrap()
}

#[test]
fn single_header_without_merges() {
    let file = common::xlsx(&people(), &[]);
    let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!(params.skip_rows, None);
    assert_eq!(params.header, Some(RowSelection::Single(0)));
    assert!(params.confidence > 0.5);
    assert!(params.tips[0].starts_with("Single header row"));
    assert!(params.is_consistent());
}

#[test]
fn merged_upper_row_makes_a_hierarchical_header() {
    let file = common::xlsx(
        &[
            &["Sales", "", "Finance"],
            &["ProductA", "ProductB", "Revenue"],
            &["100", "200", "1000"],
        ],
        &["A1:B1"],
    );
    let params = inferencer().infer_parse_parameters(file.path(), Some("Sheet1")).unwrap();
    assert_eq!(params.skip_rows, None);
    assert_eq!(params.header, Some(RowSelection::Multiple(vec![0, 1])));
    assert!(params.tips[0].starts_with("Hierarchical header"));
    assert!(params.warnings.iter().any(|warning| warning.contains("merged cell")));
}

#[test]
fn repeated_upper_labels_under_a_merge_form_a_hierarchy() {
    let file = common::xlsx(
        &[
            &["Sales", "Sales", "Finance"],
            &["ProductA", "ProductB", "Revenue"],
            &["100", "200", "1000"],
        ],
        &["A1:B1"],
    );
    let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!(params.skip_rows, None);
    assert_eq!(params.header, Some(RowSelection::Multiple(vec![0, 1])));
    assert!((params.confidence - 0.7875).abs() < 1e-6);
    assert!(params.tips[0].starts_with("Hierarchical header"));
}

#[test]
fn leading_blanks_and_title_are_skipped() {
    let file = common::xlsx(
        &[&["", ""], &["", ""], &["Report Title", ""], &["Name", "Score"], &["Alice", "90"]],
        &[],
    );
    let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!(params.skip_rows, Some(RowSelection::Multiple(vec![0, 1, 2])));
    assert_eq!(params.header, Some(RowSelection::Single(0)));
    assert_eq!(params.header_absolute(), vec![3]);
    assert!(params.tips.iter().any(|tip| tip.contains("2 blank, 1 title/preamble")));
}

#[test]
fn skip_rows_track_leading_blank_rows() {
    for blanks in 0..=5 {
        let mut rows = vec![BLANK; blanks];
        rows.extend(people());
        let file = common::xlsx(&rows, &[]);
        let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
        let skipped = params.skip_rows.as_ref().map(RowSelection::skipped_rows).unwrap_or_default();
        assert_eq!(skipped.len(), blanks, "with {blanks} leading blank rows");
        assert_eq!(params.header, Some(RowSelection::Single(0)));
    }
}

#[test]
fn skip_rows_track_blank_lines_in_delimited_text() {
    for blanks in 0..=5 {
        let content = format!("{}Name,Age\nAlice,30\nBob,25\n", "\n".repeat(blanks));
        let file = common::text_file(".csv", &content);
        let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
        let skipped = params.skip_rows.as_ref().map(RowSelection::skipped_rows).unwrap_or_default();
        assert_eq!(skipped, (0..blanks).collect::<Vec<_>>(), "with {blanks} blank lines");
        assert_eq!(params.header, Some(RowSelection::Single(0)));
    }
}

#[test]
fn blank_lines_and_title_in_delimited_text() {
    let file = common::text_file(".csv", "\n\nReport Title\nName,Score\nAlice,90\n");
    let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!(params.skip_rows, Some(RowSelection::Multiple(vec![0, 1, 2])));
    assert_eq!(params.header, Some(RowSelection::Single(0)));

    let file = common::text_file(".csv", "Name,Age\n\nAlice,30\n\nBob,25\n");
    let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!((params.skip_rows, params.header), (None, Some(RowSelection::Single(0))));
}

#[test]
fn second_call_is_a_cache_hit() {
    let file = common::xlsx(&people(), &[]);
    let before = std::fs::read(file.path()).unwrap();
    let inferencer = inferencer();
    let first = inferencer.infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!(inferencer.cache().len(), 1);
    let second = inferencer.infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!(first, second);
    assert_eq!(inferencer.cache().len(), 1);
    assert_eq!(std::fs::read(file.path()).unwrap(), before);
}

#[test]
fn changed_file_gets_a_new_fingerprint() {
    let file = common::xlsx(&people(), &[]);
    let inferencer = inferencer();
    let first = inferencer.infer_parse_parameters(file.path(), None).unwrap();

    let mut rows = vec![BLANK, BLANK];
    rows.extend(people());
    std::fs::write(file.path(), common::xlsx_bytes(&rows, &[])).unwrap();
    let second = inferencer.infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!(first.skip_rows, None);
    assert_eq!(second.skip_rows, Some(RowSelection::Multiple(vec![0, 1])));
    assert_eq!(inferencer.cache().len(), 2);
}

#[test]
fn sheets_are_cached_separately() {
    let file = common::xlsx(&people(), &[]);
    let inferencer = inferencer();
    inferencer.infer_parse_parameters(file.path(), None).unwrap();
    inferencer.infer_parse_parameters(file.path(), Some("Sheet1")).unwrap();
    assert_eq!(inferencer.cache().len(), 2);
}

#[test]
fn concurrent_callers_share_one_cache() {
    let file = common::xlsx(&people(), &[]);
    let inferencer = inferencer();
    let results: Vec<ParseParameters> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| inferencer.infer_parse_parameters(file.path(), None).unwrap()))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(inferencer.cache().len(), 1);
}

#[test]
fn persisted_cache_serves_a_new_inferencer() {
    let file = common::xlsx(&people(), &[]);
    let first = inferencer();
    let params = first.infer_parse_parameters(file.path(), None).unwrap();

    let cache_file = tempfile::NamedTempFile::new().unwrap();
    first.cache().save(cache_file.path()).unwrap();
    let loaded = Arc::new(FingerprintCache::load(cache_file.path()).unwrap());
    let second = inferencer().with_cache(Arc::clone(&loaded));
    assert_eq!(second.infer_parse_parameters(file.path(), None).unwrap(), params);
    assert_eq!(loaded.len(), 1);
}

#[test]
fn delimited_text_is_inferred() {
    let file = common::text_file(".csv", ",\n,\nName,Age\nAlice,30\nBob,25\n");
    let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!(params.skip_rows, Some(RowSelection::Multiple(vec![0, 1])));
    assert_eq!(params.header, Some(RowSelection::Single(0)));

    let file = common::text_file(".tsv", "Name\tAge\nAlice\t30\n");
    let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!((params.skip_rows, params.header), (None, Some(RowSelection::Single(0))));
}

#[test]
fn unreadable_sources_are_the_only_errors() {
    let inferencer = inferencer();
    let missing = inferencer.infer_parse_parameters("/definitely/missing.xlsx", None);
    assert!(matches!(missing, Err(ProbeError::SourceUnavailable { .. })));

    let unsupported = common::text_file(".pdf", "%PDF-1.4");
    assert!(matches!(
        inferencer.infer_parse_parameters(unsupported.path(), None),
        Err(ProbeError::SourceUnavailable { source: SpreadsheetError::UnsupportedFormat { .. }, .. })
    ));

    let workbook = common::xlsx(&people(), &[]);
    assert!(matches!(
        inferencer.infer_parse_parameters(workbook.path(), Some("Nope")),
        Err(ProbeError::SourceUnavailable { source: SpreadsheetError::SheetNotFound { .. }, .. })
    ));
    assert!(inferencer.cache().is_empty());
}

#[test]
fn empty_sheet_degrades_to_safe_default() {
    let file = common::xlsx(&[], &[]);
    let params = inferencer().infer_parse_parameters(file.path(), None).unwrap();
    assert_eq!(params.header, Some(RowSelection::Single(0)));
    assert_eq!(params.skip_rows, None);
    assert_eq!(params.confidence, 0.0);
    assert!(!params.warnings.is_empty());
}

#[test]
fn diagnostics_follow_the_sample() {
    let file = common::xlsx(
        &[&["", ""], &["", ""], &["Report Title", ""], &["Name", "Score"], &["Alice", "90"]],
        &[],
    );
    let inferencer = inferencer();
    let profiles = inferencer.get_row_profiles(file.path(), None).unwrap();
    assert_eq!(profiles.iter().map(|(row, _)| *row).collect::<Vec<_>>(), vec![2, 3, 4]);
    let (_, header) = &profiles[1];
    assert!(header.is_likely_header);
    assert!(header.header_confidence > profiles[2].1.header_confidence);
    assert!(inferencer.get_table_shape(file.path(), None).is_ok());
    assert!(inferencer.cache().is_empty());
}

#[test]
fn custom_configuration_is_loaded_from_json() {
    let file = common::text_file(".json", r#"{"validation": {"max_retries": 2}, "time_budget_ms": 5000}"#);
    let config = InferenceConfig::from_json_file(file.path()).unwrap();
    let inferencer = Inferencer::new(config).unwrap();
    assert_eq!(inferencer.config().validation.max_retries, 2);
    assert_eq!(inferencer.config().sampling.max_rows, 20);

    let bad = common::text_file(".json", r#"{"hierarchy": {"weights": {"text_length": 0.9}}}"#);
    let config = InferenceConfig::from_json_file(bad.path()).unwrap();
    assert!(matches!(Inferencer::new(config), Err(ProbeError::ConfigError(_))));
}

/// Source whose trial parses always produce placeholder labels and no data
struct PlaceholderSource;

impl TabularSource for PlaceholderSource {
    fn sheet_name(&self) -> &str {
        "placeholders"
    }

    fn read_window(&mut self, max_rows: usize, max_cols: usize) -> Result<Grid, SpreadsheetError> {
        let rows = people()
            .iter()
            .map(|row| row.iter().map(|cell| CellValue::from(*cell)).collect())
            .collect();
        Ok(Grid::bounded(rows, max_rows, max_cols))
    }

    fn merged_regions(&mut self) -> Result<Vec<MergedRegion>, SpreadsheetError> {
        Ok(Vec::new())
    }

    fn trial_parse(&mut self, _: &ParseParameters, _: usize) -> Result<TrialParse, SpreadsheetError> {
        Ok(TrialParse {
            ok: true,
            column_labels: vec!["Unnamed: 0".to_owned(), "Unnamed: 1".to_owned(), "Total".to_owned()],
            row_count: 0,
        })
    }
}

struct PlaceholderOpener;

impl SourceOpener for PlaceholderOpener {
    fn open(&self, _: &Path, _: Option<&str>) -> Result<Box<dyn TabularSource>, SpreadsheetError> {
        Ok(Box::new(PlaceholderSource))
    }

    fn stat(&self, _: &Path) -> Result<FileStat, SpreadsheetError> {
        Ok(FileStat { size: 0, modified: SystemTime::UNIX_EPOCH })
    }
}

#[test]
fn failed_validation_retries_once_then_falls_back() {
    let inferencer = Inferencer::with_opener(PlaceholderOpener, InferenceConfig::default()).unwrap();
    let params = inferencer.infer_parse_parameters("in-memory", None).unwrap();
    assert_eq!(params.header, Some(RowSelection::Single(0)));
    assert_eq!(params.skip_rows, None);
    assert_eq!(params.confidence, 0.0);
    assert!(params.warnings[0].contains("after 2 trial parse(s)"));
}
