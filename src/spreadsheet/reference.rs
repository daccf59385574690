//! Conversions between A1-style references and 0-based (row, col) indexes.

/// Converts column letters ("A", "AB") to a 0-based column index.
pub(crate) fn col_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.bytes().all(|byte| byte.is_ascii_alphabetic()) {
        return None;
    }
    letters
        .bytes()
        .map(|byte| (byte.to_ascii_uppercase() - b'A') as usize + 1)
        .try_fold(0usize, |index, digit| index.checked_mul(26)?.checked_add(digit))
        .map(|column| column - 1)
}

/// Converts a 1-based row number ("12") to a 0-based row index.
pub(crate) fn row_to_index(digits: &str) -> Option<usize> {
    digits.parse::<usize>().ok().filter(|row| *row > 0).map(|row| row - 1)
}

/// Converts a 0-based column index to column letters.
pub(crate) fn index_to_col(col: usize) -> String {
    let mut column = col + 1;
    let mut letters = Vec::new();
    while column > 0 {
        column -= 1;
        letters.push(b'A' + (column % 26) as u8);
        column /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Converts 0-based (row, col) to an A1-style reference.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", index_to_col(col), row + 1)
}

/// Parses an A1-style reference into 0-based (row, col); `$` anchors are ignored.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    Some((row_to_index(digits)?, col_to_index(letters)?))
}

/// Parses "A1:C3" (or a single "B2") into inclusive ((min_row, min_col), (max_row, max_col)).
pub(crate) fn range_to_indexes(range: &str) -> Option<((usize, usize), (usize, usize))> {
    let (first, last) = range.split_once(':').unwrap_or((range, range));
    let (row_a, col_a) = reference_to_index(first.trim())?;
    let (row_b, col_b) = reference_to_index(last.trim())?;
    Some(((row_a.min(row_b), col_a.min(col_b)), (row_a.max(row_b), col_a.max(col_b))))
}
