use super::cell::{Cell, CellValue};
use super::range::CellRange;
use super::style::CellStyle;
use crate::core::address::shift_formula_rows;
use std::collections::BTreeMap;

/// A row: optional custom height plus its populated cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub height: Option<f64>,
    cells: BTreeMap<u16, Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, col: u16) -> Option<&Cell> {
        self.cells.get(&col)
    }

    pub fn cell_mut(&mut self, col: u16) -> Option<&mut Cell> {
        self.cells.get_mut(&col)
    }

    pub fn ensure_cell(&mut self, col: u16) -> &mut Cell {
        self.cells.entry(col).or_default()
    }

    pub fn insert_cell(&mut self, col: u16, cell: Cell) {
        self.cells.insert(col, cell);
    }

    pub fn remove_cell(&mut self, col: u16) -> Option<Cell> {
        self.cells.remove(&col)
    }

    pub fn cells(&self) -> impl Iterator<Item = (u16, &Cell)> {
        self.cells.iter().map(|(c, cell)| (*c, cell))
    }

    pub fn last_col(&self) -> Option<u16> {
        self.cells.keys().next_back().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// In-memory worksheet: sparse rows, column widths and merged regions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Worksheet {
    name: String,
    rows: BTreeMap<u32, Row>,
    column_widths: BTreeMap<u16, f64>,
    merged: Vec<CellRange>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn row(&self, row: u32) -> Option<&Row> {
        self.rows.get(&row)
    }

    pub fn row_mut(&mut self, row: u32) -> Option<&mut Row> {
        self.rows.get_mut(&row)
    }

    pub fn ensure_row(&mut self, row: u32) -> &mut Row {
        self.rows.entry(row).or_default()
    }

    pub fn rows(&self) -> impl Iterator<Item = (u32, &Row)> {
        self.rows.iter().map(|(r, row)| (*r, row))
    }

    /// Index of the last row that exists, if any.
    pub fn last_row(&self) -> Option<u32> {
        self.rows.keys().next_back().copied()
    }

    /// Last row touched by content, a row record or a merged region.
    ///
    /// A merged region with no values behind it still occupies its rows.
    pub fn last_used_row(&self) -> Option<u32> {
        let merged = self.merged.iter().map(|m| m.last_row).max();
        self.last_row().max(merged)
    }

    /// Number of rows up to and including the last existing one.
    pub fn row_count(&self) -> u32 {
        self.last_row().map_or(0, |r| r + 1)
    }

    pub fn last_col(&self) -> Option<u16> {
        self.rows.values().filter_map(Row::last_col).max()
    }

    pub fn cell(&self, row: u32, col: u16) -> Option<&Cell> {
        self.rows.get(&row).and_then(|r| r.cell(col))
    }

    pub fn cell_mut(&mut self, row: u32, col: u16) -> Option<&mut Cell> {
        self.rows.get_mut(&row).and_then(|r| r.cell_mut(col))
    }

    pub fn ensure_cell(&mut self, row: u32, col: u16) -> &mut Cell {
        self.ensure_row(row).ensure_cell(col)
    }

    /// Evaluated value at a position; `Empty` when the cell does not exist.
    pub fn value(&self, row: u32, col: u16) -> CellValue {
        self.cell(row, col)
            .map(|c| c.value.clone())
            .unwrap_or_default()
    }

    /// Store a plain value, dropping any formula the cell had.
    pub fn set_value(&mut self, row: u32, col: u16, value: CellValue) {
        let cell = self.ensure_cell(row, col);
        cell.value = value;
        cell.formula = None;
    }

    /// Store formula text; the cached result is cleared until recalculation.
    pub fn set_formula(&mut self, row: u32, col: u16, formula: impl Into<String>) {
        let cell = self.ensure_cell(row, col);
        cell.formula = Some(formula.into());
        cell.value = CellValue::Empty;
    }

    pub fn set_style(&mut self, row: u32, col: u16, style: CellStyle) {
        self.ensure_cell(row, col).style = Some(style);
    }

    /// Apply a style to every cell of a rectangle, creating cells as needed.
    pub fn set_range_style(&mut self, range: &CellRange, style: &CellStyle) {
        for row in range.rows() {
            for col in range.cols() {
                self.set_style(row, col, style.clone());
            }
        }
    }

    pub fn put_cell(&mut self, row: u32, col: u16, cell: Cell) {
        self.ensure_row(row).insert_cell(col, cell);
    }

    pub fn remove_cell(&mut self, row: u32, col: u16) -> Option<Cell> {
        self.rows.get_mut(&row).and_then(|r| r.remove_cell(col))
    }

    /// Drop a row entirely (content, style and height). Rows below keep
    /// their indices.
    pub fn remove_row(&mut self, row: u32) -> Option<Row> {
        self.rows.remove(&row)
    }

    pub fn column_width(&self, col: u16) -> Option<f64> {
        self.column_widths.get(&col).copied()
    }

    pub fn set_column_width(&mut self, col: u16, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn column_widths(&self) -> impl Iterator<Item = (u16, f64)> + '_ {
        self.column_widths.iter().map(|(c, w)| (*c, *w))
    }

    pub fn merged_regions(&self) -> &[CellRange] {
        &self.merged
    }

    pub fn add_merged_region(&mut self, region: CellRange) {
        self.merged.push(region);
    }

    pub fn retain_merged_regions<F: FnMut(&CellRange) -> bool>(&mut self, keep: F) {
        self.merged.retain(keep);
    }

    /// Move rows `first..=last` by `delta` rows, preserving content.
    ///
    /// Destination rows are overwritten. Merged regions lying wholly inside
    /// the moved run travel with it, and formula references into the run are
    /// rewritten across the sheet. Rows pushed above row 0 are discarded.
    pub fn shift_rows(&mut self, first: u32, last: u32, delta: i64) {
        if delta == 0 || first > last {
            return;
        }
        let moved: Vec<u32> = self.rows.range(first..=last).map(|(r, _)| *r).collect();
        let mut taken = Vec::with_capacity(moved.len());
        for r in moved {
            if let Some(row) = self.rows.remove(&r) {
                taken.push((r, row));
            }
        }
        for (r, row) in taken {
            let target = r as i64 + delta;
            if target < 0 {
                continue;
            }
            self.rows.insert(target as u32, row);
        }

        for region in &mut self.merged {
            if region.first_row >= first && region.last_row <= last {
                if let Some(shifted) = region.offset(delta, 0) {
                    *region = shifted;
                }
            }
        }

        for row in self.rows.values_mut() {
            for cell in row.cells.values_mut() {
                if let Some(formula) = cell.formula.as_mut() {
                    *formula = shift_formula_rows(formula, first, last, delta);
                }
            }
        }
    }
}
