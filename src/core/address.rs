//! Cell addressing: (row, col) ↔ A1 text and textual offsetting of the
//! references found inside formula strings.
//!
//! Rows and columns are zero-based everywhere in the crate; the A1 text uses
//! column letters and a one-based row number.

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Largest column index a worksheet can hold (XFD).
pub const MAX_COL: u16 = 16_383;
/// Largest row index a worksheet can hold.
pub const MAX_ROW: u32 = 1_048_575;

/// One or two letters followed by digits, standing alone.
fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b([A-Za-z]{1,2})([0-9]+)\b").expect("reference pattern is valid")
    })
}

/// Convert a column index to its letters
///
/// Examples:
/// - 0 → A
/// - 25 → Z
/// - 26 → AA
pub fn column_letter(index: u16) -> String {
    let mut result = String::new();
    let mut idx = index as u32;

    loop {
        let remainder = idx % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }

    result
}

/// Convert column letters (case-insensitive) back to an index.
pub fn column_index(letters: &str) -> Option<u16> {
    if letters.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        value = value * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        if value > MAX_COL as u32 + 1 {
            return None;
        }
    }
    Some((value - 1) as u16)
}

/// `to_reference(2, 1)` → `"B3"`
pub fn to_reference(row: u32, col: u16) -> String {
    format!("{}{}", column_letter(col), row + 1)
}

/// Parse `B3` (or `$B$3`) into `(2, 1)`.
pub fn parse_reference(reference: &str) -> Option<(u32, u16)> {
    let text = reference.trim().replace('$', "");
    let split = text.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = text.split_at(split);
    let col = column_index(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 || row - 1 > MAX_ROW {
        return None;
    }
    Some((row - 1, col))
}

fn apply_offset(row: u32, col: u16, row_offset: i64, col_offset: i64) -> Option<(u32, u16)> {
    let row = row as i64 + row_offset;
    let col = col as i64 + col_offset;
    if row < 0 || col < 0 || row > MAX_ROW as i64 || col > MAX_COL as i64 {
        return None;
    }
    Some((row as u32, col as u16))
}

/// Shift one reference. Returns `None` for text that is not a reference or
/// when the shifted position falls off the grid.
pub fn offset_reference(reference: &str, row_offset: i64, col_offset: i64) -> Option<String> {
    let (row, col) = parse_reference(reference)?;
    let (row, col) = apply_offset(row, col, row_offset, col_offset)?;
    Some(to_reference(row, col))
}

/// Shift every reference-looking token in `formula` by the given offsets.
///
/// Purely textual: absolute markers are not honoured and no grammar is
/// parsed. A token whose shifted position would leave the grid is kept as is.
pub fn offset_formula(formula: &str, row_offset: i64, col_offset: i64) -> String {
    if row_offset == 0 && col_offset == 0 {
        return formula.to_string();
    }
    reference_pattern()
        .replace_all(formula, |caps: &Captures| {
            let whole = &caps[0];
            offset_reference(whole, row_offset, col_offset).unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

/// Move references whose row lies in `first_row..=last_row` by `delta` rows.
///
/// Used when a run of rows is physically shifted so that formulas keep
/// pointing at the content that moved.
pub fn shift_formula_rows(formula: &str, first_row: u32, last_row: u32, delta: i64) -> String {
    if delta == 0 {
        return formula.to_string();
    }
    reference_pattern()
        .replace_all(formula, |caps: &Captures| {
            let whole = &caps[0];
            match parse_reference(whole) {
                Some((row, _)) if row >= first_row && row <= last_row => {
                    offset_reference(whole, delta, 0).unwrap_or_else(|| whole.to_string())
                }
                _ => whole.to_string(),
            }
        })
        .into_owned()
}
