use crate::core::address::{parse_reference, to_reference, MAX_COL, MAX_ROW};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive rectangle of cells, zero-based.
///
/// Serialized as A1 text (`"A3:C4"`, or `"B2"` for a single cell); the
/// explicit `{first_row, first_col, last_row, last_col}` map form is accepted
/// as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr", into = "String")]
pub struct CellRange {
    pub first_row: u32,
    pub first_col: u16,
    pub last_row: u32,
    pub last_col: u16,
}

impl CellRange {
    pub fn new(first_row: u32, first_col: u16, last_row: u32, last_col: u16) -> Self {
        Self {
            first_row: first_row.min(last_row),
            first_col: first_col.min(last_col),
            last_row: first_row.max(last_row),
            last_col: first_col.max(last_col),
        }
    }

    pub fn cell(row: u32, col: u16) -> Self {
        Self::new(row, col, row, col)
    }

    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(':');
        let first = parse_reference(parts.next()?)?;
        let last = match parts.next() {
            Some(p) => parse_reference(p)?,
            None => first,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(first.0, first.1, last.0, last.1))
    }

    pub fn height(&self) -> u32 {
        self.last_row - self.first_row + 1
    }

    pub fn width(&self) -> u16 {
        self.last_col - self.first_col + 1
    }

    pub fn is_single_cell(&self) -> bool {
        self.first_row == self.last_row && self.first_col == self.last_col
    }

    pub fn contains_cell(&self, row: u32, col: u16) -> bool {
        row >= self.first_row && row <= self.last_row && col >= self.first_col && col <= self.last_col
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &CellRange) -> bool {
        self.contains_cell(other.first_row, other.first_col)
            && self.contains_cell(other.last_row, other.last_col)
    }

    pub fn intersects(&self, other: &CellRange) -> bool {
        self.first_row <= other.last_row
            && other.first_row <= self.last_row
            && self.first_col <= other.last_col
            && other.first_col <= self.last_col
    }

    /// Shift by signed offsets; `None` when any corner leaves the grid.
    pub fn offset(&self, row_offset: i64, col_offset: i64) -> Option<CellRange> {
        let first_row = self.first_row as i64 + row_offset;
        let last_row = self.last_row as i64 + row_offset;
        let first_col = self.first_col as i64 + col_offset;
        let last_col = self.last_col as i64 + col_offset;
        if first_row < 0 || first_col < 0 || last_row > MAX_ROW as i64 || last_col > MAX_COL as i64 {
            return None;
        }
        Some(CellRange {
            first_row: first_row as u32,
            first_col: first_col as u16,
            last_row: last_row as u32,
            last_col: last_col as u16,
        })
    }

    pub fn rows(&self) -> std::ops::RangeInclusive<u32> {
        self.first_row..=self.last_row
    }

    pub fn cols(&self) -> std::ops::RangeInclusive<u16> {
        self.first_col..=self.last_col
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            f.write_str(&to_reference(self.first_row, self.first_col))
        } else {
            write!(
                f,
                "{}:{}",
                to_reference(self.first_row, self.first_col),
                to_reference(self.last_row, self.last_col)
            )
        }
    }
}

impl From<CellRange> for String {
    fn from(range: CellRange) -> Self {
        range.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Text(String),
    Coords {
        first_row: u32,
        first_col: u16,
        last_row: u32,
        last_col: u16,
    },
}

impl TryFrom<RangeRepr> for CellRange {
    type Error = String;

    fn try_from(repr: RangeRepr) -> Result<Self, Self::Error> {
        match repr {
            RangeRepr::Text(text) => {
                CellRange::parse(&text).ok_or_else(|| format!("invalid cell range '{text}'"))
            }
            RangeRepr::Coords {
                first_row,
                first_col,
                last_row,
                last_col,
            } => Ok(CellRange::new(first_row, first_col, last_row, last_col)),
        }
    }
}
