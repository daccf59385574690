use crate::spreadsheet::reference::index_to_reference;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fmt::Display;

/// A raw cell value as sampled from a worksheet or delimited file.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Returns `true` for `Empty` and for text that is blank after trimming.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Returns the trimmed string form used for uniqueness and length statistics.
    pub fn stripped(&self) -> String {
        self.to_string().trim().to_owned()
    }

    /// Classifies text as a number: numeric cells, or text made only of digits once `.`, `-` and `,` are removed.
    pub fn is_numeric_like(&self) -> bool {
        match self {
            CellValue::Number(_) => true,
            CellValue::Text(text) => {
                let digits: String = text.trim().chars().filter(|c| !matches!(c, '.' | '-' | ',')).collect();
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            }
            _ => false,
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => write!(f, "{}", *number as i64),
            CellValue::Number(number) => write!(f, "{number}"),
            CellValue::Text(text) => write!(f, "{text}"),
            CellValue::DateTime(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::DateTime(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// A positioned cell (0-based coordinates).
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub value: CellValue,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }
}

/// Storage kinds of Office Open XML cells, resolved from the `t` attribute and the cell style.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    Boolean,
    Number,
    /// Serial date/time counted from the 1900 epoch
    NumberDateTime1900,
    /// Serial date/time counted from the 1904 epoch
    NumberDateTime1904,
    IsoDateTime,
    InlineString,
    SharedString,
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs that denote dates or times.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "14" | "15" | "16" | "17" | "18" | "19" | "20" | "21" | "22" | "45" | "46" | "47" => {
                Some(Self::date_time(is_1904))
            }
            _ => None,
        }
    }

    /// Parses custom number format codes; any year/day or hour/second token marks a date/time.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_color = false;
        let mut is_date_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_color => is_literal = true,

                ']' if is_color => is_color = false,
                '[' if !is_literal => is_color = true,
                _ if is_literal || is_color => (),

                'Y' | 'y' | 'D' | 'd' | 'H' | 'h' | 'S' | 's' => is_date_time = true,
                _ => (),
            }
        }

        if is_date_time {
            Self::date_time(is_1904)
        } else {
            Self::Number
        }
    }

    fn date_time(is_1904: bool) -> Self {
        if is_1904 {
            Self::NumberDateTime1904
        } else {
            Self::NumberDateTime1900
        }
    }

    /// Converts the raw XML text of a cell into a typed value.
    ///
    /// Shared-string cells hold an index into `shared_strings`; unknown indexes read as empty.
    pub(crate) fn to_value(self, raw: &str, shared_strings: &HashMap<usize, String>) -> CellValue {
        match self {
            CellType::Empty => CellValue::Empty,
            CellType::Boolean => CellValue::Text(if raw == "1" { "TRUE" } else { "FALSE" }.to_owned()),
            CellType::Number => to_number(raw),
            CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => {
                let is_1904 = self == CellType::NumberDateTime1904;
                match raw.trim().parse::<f64>().ok().and_then(|serial| serial_to_datetime(serial, is_1904)) {
                    Some(datetime) => CellValue::DateTime(datetime),
                    None => to_number(raw),
                }
            }
            CellType::IsoDateTime => parse_iso_datetime(raw)
                .map(CellValue::DateTime)
                .unwrap_or_else(|| CellValue::Text(raw.to_owned())),
            CellType::SharedString => raw
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|index| shared_strings.get(&index))
                .map(|text| CellValue::Text(text.to_owned()))
                .unwrap_or_default(),
            CellType::InlineString | CellType::Error => CellValue::Text(raw.to_owned()),
        }
    }
}

fn to_number(raw: &str) -> CellValue {
    match raw.trim().parse::<f64>() {
        Ok(number) => CellValue::Number(number),
        Err(_) => CellValue::Text(raw.to_owned()),
    }
}

fn parse_iso_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))
}

/// Converts an Excel serial number to a date/time.
/// Serials below 60 are shifted by one day for the Lotus 1-2-3 leap year bug.
pub(crate) fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_466.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let seconds = (serial.fract() * 86_400f64).round() as i64;
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    base.checked_add_signed(Duration::days(days + offset))?
        .checked_add_signed(Duration::seconds(seconds))
}
