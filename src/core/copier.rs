//! Block copier: duplicate a rectangle of cells at a row/column offset.

use super::address::offset_formula;
use crate::grid::{CellRange, Worksheet};
use tracing::debug;

/// Copy `range` to (`row_offset`, `col_offset`) within the same sheet.
///
/// Content, style and formulas (references rewritten by the offset) are
/// copied for every existing source row; row heights and column widths follow
/// and each of `merged` is recreated at the offset. Not idempotent: calling
/// twice with the same offset duplicates the merged regions.
pub fn copy_block(
    sheet: &mut Worksheet,
    range: &CellRange,
    row_offset: i64,
    col_offset: i64,
    merged: &[CellRange],
) {
    let Some(target) = range.offset(row_offset, col_offset) else {
        debug!(
            "Skipping copy of {} by ({}, {}): target leaves the sheet",
            range, row_offset, col_offset
        );
        return;
    };

    for row in range.rows() {
        let Some(source) = sheet.row(row).cloned() else {
            continue;
        };
        let dest_row = (row as i64 + row_offset) as u32;
        sheet.ensure_row(dest_row).height = source.height;

        for col in range.cols() {
            let dest_col = (col as i64 + col_offset) as u16;
            match source.cell(col) {
                Some(cell) => {
                    let mut copy = cell.clone();
                    if let Some(formula) = copy.formula.as_mut() {
                        *formula = offset_formula(formula, row_offset, col_offset);
                    }
                    sheet.put_cell(dest_row, dest_col, copy);
                }
                None => {
                    sheet.remove_cell(dest_row, dest_col);
                }
            }
        }
    }

    if col_offset != 0 {
        for col in range.cols() {
            if let Some(width) = sheet.column_width(col) {
                sheet.set_column_width((col as i64 + col_offset) as u16, width);
            }
        }
    }

    for region in merged {
        if let Some(shifted) = region.offset(row_offset, col_offset) {
            sheet.add_merged_region(shifted);
        }
    }

    debug!("Copied {} to {}", range, target);
}
