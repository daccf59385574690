use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::grid::Grid;
use crate::spreadsheet::grid::MergedRegion;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet_structure;
use crate::spreadsheet::SheetStructure;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::TabularSource;
use glob::Pattern;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::ops::ControlFlow;
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

// XML tag names for parsing Office Open XML workbooks
const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");  // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");         // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");   // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");       // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                  // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_SHEET: QName = QName(b"sheet");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");
const TAG_MERGE_CELL: QName = QName(b"mergeCell");

/// A cell as stored in the worksheet part, before shared strings are resolved
struct RawCell {
    row: usize,
    col: usize,
    kind: CellType,
    value: String,
}

/// One worksheet of an Office Open XML workbook
pub struct XlsxSource {
    file_name: String,
    zip: ZipArchive<BufReader<File>>,
    /// Cell kinds indexed by style id
    number_formats: Vec<CellType>,
    sheet_name: String,
    /// Path of the worksheet part inside the package
    zip_path: String,
}

impl XlsxSource {
    /// Opens `path` and selects `sheet`.
    ///
    /// The sheet is matched by exact name first, then as a glob pattern;
    /// `None` selects the first sheet of the workbook.
    pub fn open(path: &Path, sheet: Option<&str>) -> Result<XlsxSource, SpreadsheetError> {
        let file_name = path.to_string_lossy().to_string();
        let (zip, number_formats, sheets) = open_package(path)?;
        let (sheet_name, zip_path) = select_sheet(&file_name, sheets, sheet)?;
        debug!(file = %file_name, sheet = %sheet_name, "opened worksheet");
        Ok(XlsxSource {
            file_name,
            zip,
            number_formats,
            sheet_name,
            zip_path,
        })
    }

    /// Describes every sheet of the workbook at `path`.
    pub(crate) fn describe(path: &Path) -> Result<Vec<SheetStructure>, SpreadsheetError> {
        let (zip, number_formats, sheets) = open_package(path)?;
        let mut source = XlsxSource {
            file_name: path.to_string_lossy().to_string(),
            zip,
            number_formats,
            sheet_name: String::new(),
            zip_path: String::new(),
        };
        let mut structures = Vec::with_capacity(sheets.len());
        for (name, zip_path) in sheets {
            source.sheet_name = name;
            source.zip_path = zip_path;
            let mut extent = None::<(usize, usize)>;
            let merged = source.scan_sheet(
                |cell| {
                    let (max_row, max_col) = extent.unwrap_or((0, 0));
                    extent = Some((max_row.max(cell.row), max_col.max(cell.col)));
                    ControlFlow::Continue(())
                },
                true,
            )?;
            structures.push(sheet_structure(&source.sheet_name, extent, &merged));
        }
        Ok(structures)
    }

    /// Streams the worksheet part, handing each non-empty cell to `visit`.
    ///
    /// Once `visit` breaks, remaining cells are skipped; merged regions are
    /// still collected when `with_merges` is set, since `<mergeCells>` follows `<sheetData>`.
    fn scan_sheet<F>(&mut self, mut visit: F, with_merges: bool) -> Result<Vec<MergedRegion>, SpreadsheetError>
    where
        F: FnMut(RawCell) -> ControlFlow<()>,
    {
        let number_formats = &self.number_formats;
        let mut reader = self.zip.xml_reader(&self.zip_path)?
            .ok_or_else(|| SpreadsheetError::MissingPart(self.zip_path.to_owned()))?;

        let mut merged = Vec::<MergedRegion>::new();
        let mut visiting = true;
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        match_xml_events!(reader => {
            Event::End(event) if event.name() == TAG_ROW => {
                row_count += 1;
                col_count = 0;
            }
            Event::Start(event) if visiting && event.name() == TAG_ROW => {
                if let Some(number) = event.parse_attribute_value::<usize>("r")? {
                    row_count = number.saturating_sub(1);
                }
            }
            Event::Start(event) if visiting && event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                kind = event.get_attribute_value("t")?.map(|t| {
                    match t.as_ref() {
                        "inlineStr" | "str" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                if let Some(format_id) = event.get_attribute_value("s")? {
                    if kind == CellType::Number && !format_id.is_empty() {
                        let index = format_id.parse::<usize>()?;
                        kind = number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
                value.clear();
            }
            Event::Start(event) if visiting && kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if visiting && kind != CellType::Empty && event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if visiting && event.name() == TAG_CELL => {
                if kind != CellType::Empty && !value.is_empty() {
                    let cell = RawCell { row, col, kind, value: std::mem::take(&mut value) };
                    if visit(cell).is_break() {
                        visiting = false;
                        if !with_merges {
                            break;
                        }
                    }
                }
                kind = CellType::default();
            }
            Event::Start(event) if with_merges && event.name() == TAG_MERGE_CELL => {
                if let Some(range) = event.get_attribute_value("ref")? {
                    merged.extend(MergedRegion::parse(&range));
                }
            }
        });
        Ok(merged)
    }

    /// Loads the shared strings whose indexes appear in `indexes`.
    ///
    /// Shared strings live in a separate part and are referenced by index,
    /// so only the entries used by the sampled cells are kept.
    fn load_shared_strings(&mut self, mut indexes: HashSet<usize>) -> Result<HashMap<usize, String>, SpreadsheetError> {
        let mut shared_strings = HashMap::<usize, String>::new();
        if indexes.is_empty() {
            return Ok(shared_strings);
        }
        let mut reader = match self.zip.xml_reader("xl/sharedStrings.xml")? {
            Some(reader) => reader,
            None => return Ok(shared_strings),
        };

        let mut id = 0usize;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
                if indexes.remove(&id) {
                    let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
                    shared_strings.insert(id, string);
                }
                if indexes.is_empty() {
                    break;
                }
                id += 1;
            }
        });
        Ok(shared_strings)
    }
}

impl TabularSource for XlsxSource {
    fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn read_window(&mut self, max_rows: usize, max_cols: usize) -> Result<Grid, SpreadsheetError> {
        let mut raw_cells = Vec::<RawCell>::new();
        self.scan_sheet(
            |cell| {
                if cell.row >= max_rows {
                    ControlFlow::Break(())
                } else {
                    if cell.col < max_cols {
                        raw_cells.push(cell);
                    }
                    ControlFlow::Continue(())
                }
            },
            false,
        )?;

        let indexes = raw_cells
            .iter()
            .filter(|cell| cell.kind == CellType::SharedString)
            .filter_map(|cell| cell.value.trim().parse::<usize>().ok())
            .collect::<HashSet<_>>();
        let lookup = self.load_shared_strings(indexes)?;
        let cells = raw_cells
            .into_iter()
            .map(|cell| Cell {
                row: cell.row,
                col: cell.col,
                value: cell.kind.to_value(&cell.value, &lookup),
            })
            .collect();
        let grid = Grid::from_cells(cells, max_rows, max_cols);
        debug!(file = %self.file_name, sheet = %self.sheet_name, rows = grid.height(), cols = grid.width(), "sampled window");
        Ok(grid)
    }

    fn merged_regions(&mut self) -> Result<Vec<MergedRegion>, SpreadsheetError> {
        self.scan_sheet(|_| ControlFlow::Break(()), true)
    }
}

/// Opens the package and loads sheet list and number formats.
fn open_package(path: &Path) -> Result<(ZipArchive<BufReader<File>>, Vec<CellType>, Vec<(String, String)>), SpreadsheetError> {
    let file_name = path.to_string_lossy().to_string();
    let mut zip = ZipArchive::new(BufReader::new(File::open(path)?))?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    if sheets.is_empty() {
        Err(SpreadsheetError::EmptyWorkbook(file_name))?
    }
    let number_formats = load_number_formats(&mut zip, is_1904)?;
    Ok((zip, number_formats, sheets))
}

/// Picks the requested sheet: exact name, then glob pattern, then the first sheet when unspecified.
fn select_sheet(file_name: &str, sheets: Vec<(String, String)>, sheet: Option<&str>) -> Result<(String, String), SpreadsheetError> {
    let Some(wanted) = sheet else {
        return sheets
            .into_iter()
            .next()
            .ok_or_else(|| SpreadsheetError::EmptyWorkbook(file_name.to_owned()));
    };
    if let Some(found) = sheets.iter().find(|(name, _)| name == wanted) {
        return Ok(found.clone());
    }
    let pattern = Pattern::new(wanted)?;
    sheets
        .into_iter()
        .find(|(name, _)| pattern.matches(name))
        .ok_or_else(|| SpreadsheetError::SheetNotFound {
            file: file_name.to_owned(),
            sheet: wanted.to_owned(),
        })
}

/// Loads worksheet relationships, mapping relationship ids to part paths.
fn load_relationships(zip: &mut ZipArchive<BufReader<File>>, path: &str) -> Result<HashMap<String, String>, SpreadsheetError> {
    let mut reader = zip.xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::MissingPart(path.to_owned()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Only worksheet relationships
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Normalizes a relationship target to a path inside the package.
fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Loads sheet names with their part paths, and whether the workbook uses the 1904 date system.
fn load_workbook(zip: &mut ZipArchive<BufReader<File>>) -> Result<(Vec<(String, String)>, bool), SpreadsheetError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::MissingPart("xl/workbook.xml".to_owned()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<String>;
            let mut id = None::<String>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.unescape_value()?.to_string());
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.unescape_value()?.to_string());
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&id) {
                    sheets.push((name, path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads cell kinds indexed by style id from `xl/styles.xml`.
///
/// Custom formats are inspected for date/time tokens; built-in ids are looked up directly.
fn load_number_formats(zip: &mut ZipArchive<BufReader<File>>, is_1904: bool) -> Result<Vec<CellType>, SpreadsheetError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
        }
        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.map(|id| id.to_string()).unwrap_or_default();
            format_indexes.push(id);
        }
    });

    Ok(format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect())
}

/// Reads string content up to `end_tag`, skipping phonetic runs.
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, SpreadsheetError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellValue;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const WORKBOOK: &str = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr/><sheets><sheet name="Summary" sheetId="1" r:id="rId1"/><sheet name="Data 2024" sheetId="2" r:id="rId2"/></sheets></workbook>"#;
    const RELS: &str = r#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/></Relationships>"#;
    const STYLES: &str = r#"<styleSheet><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy/mm/dd"/></numFmts><cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="14"/><xf numFmtId="164"/></cellXfs></styleSheet>"#;
    const SHARED: &str = r#"<sst><si><t>Name</t></si><si><r><t>Da</t></r><r><t>te</t></r><rPh><t>ignored</t></rPh></si><si><t>Sales</t></si></sst>"#;
    const SHEET1: &str = r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>2</v></c></row><row r="2"><c r="A2" t="s"><v>0</v></c><c r="B2" t="s"><v>1</v></c><c r="C2" t="inlineStr"><is><t>Flag</t></is></c></row><row r="3"><c r="A3"><v>42</v></c><c r="B3" s="1"><v>45292</v></c><c r="C3" t="b"><v>1</v></c></row><row r="4"><c r="A4"><v>7</v></c><c r="B4" s="2"><v>45293.5</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="A1:C1"/></mergeCells></worksheet>"#;
    const SHEET2: &str = r#"<worksheet><sheetData/></worksheet>"#;

    fn workbook() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in [
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELS),
            ("xl/styles.xml", STYLES),
            ("xl/sharedStrings.xml", SHARED),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/sheet2.xml", SHEET2),
        ] {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        file.write_all(&writer.finish().unwrap().into_inner()).unwrap();
        file
    }

    #[test]
    fn reads_typed_window() {
        let file = workbook();
        let mut source = XlsxSource::open(file.path(), None).unwrap();
        assert_eq!(source.sheet_name(), "Summary");
        let grid = source.read_window(20, 30).unwrap();
        assert_eq!((grid.height(), grid.width()), (4, 3));
        let rows = grid.rows();
        assert_eq!(rows[0][0], CellValue::from("Sales"));
        assert_eq!(rows[0][1], CellValue::Empty);
        assert_eq!(rows[1][1], CellValue::from("Date"));
        assert_eq!(rows[1][2], CellValue::from("Flag"));
        assert_eq!(rows[2][0], CellValue::Number(42.0));
        assert_eq!(rows[2][1].to_string(), "2024-01-01 00:00:00");
        assert_eq!(rows[2][2], CellValue::from("TRUE"));
        assert_eq!(rows[3][1].to_string(), "2024-01-02 12:00:00");
    }

    #[test]
    fn window_is_bounded() {
        let file = workbook();
        let mut source = XlsxSource::open(file.path(), None).unwrap();
        let grid = source.read_window(2, 1).unwrap();
        assert_eq!((grid.height(), grid.width()), (2, 1));
    }

    #[test]
    fn merged_regions_cover_the_whole_sheet() {
        let file = workbook();
        let mut source = XlsxSource::open(file.path(), Some("Summary")).unwrap();
        assert_eq!(source.merged_regions().unwrap(), vec![MergedRegion::new(0, 0, 0, 2)]);
    }

    #[test]
    fn sheets_are_selected_by_name_or_pattern() {
        let file = workbook();
        let source = XlsxSource::open(file.path(), Some("Data*")).unwrap();
        assert_eq!(source.sheet_name(), "Data 2024");
        assert!(matches!(
            XlsxSource::open(file.path(), Some("Missing")),
            Err(SpreadsheetError::SheetNotFound { .. })
        ));
    }

    #[test]
    fn describes_all_sheets() {
        let file = workbook();
        let structures = XlsxSource::describe(file.path()).unwrap();
        assert_eq!(structures.len(), 2);
        assert_eq!(structures[0].used_range.as_deref(), Some("A1:C4"));
        assert_eq!(structures[0].merged, vec!["A1:C1"]);
        assert_eq!(structures[1].rows, 0);
    }
}
