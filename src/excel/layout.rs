//! Template formatting: cell formats, row heights and column widths
//!
//! calamine only exposes values, so formatting is read separately through
//! umya-spreadsheet and laid over the imported grid sheet by sheet.

use crate::error::{StencilError, StencilResult};
use crate::grid::{CellStyle, HorizontalAlign, Workbook, Worksheet};
use std::io::{Read, Seek};
use tracing::debug;
use umya_spreadsheet::{HorizontalAlignmentValues, Style};

use crate::core::address::MAX_COL;

const DEFAULT_FONT_SIZE: f64 = 11.0;

/// Copy formats, row heights and column widths from `reader` onto the
/// sheets of `workbook` with the same name.
pub(crate) fn apply<R: Read + Seek>(workbook: &mut Workbook, reader: R) -> StencilResult<()> {
    let book = umya_spreadsheet::reader::xlsx::read_reader(reader, true)
        .map_err(|e| StencilError::Workbook(format!("Failed to read formatting: {}", e)))?;

    for sheet in workbook.sheets_mut() {
        let Some(source) = book.get_sheet_by_name(sheet.name()) else {
            continue;
        };
        let styled = apply_sheet(sheet, source);
        debug!("Loaded {} formatted cell(s) on '{}'", styled, sheet.name());
    }
    Ok(())
}

fn apply_sheet(sheet: &mut Worksheet, source: &umya_spreadsheet::Worksheet) -> usize {
    let mut styled = 0;
    for cell in source.get_cell_collection() {
        let coordinate = cell.get_coordinate();
        let Some(col) = to_index(coordinate.get_col_num().to_owned()) else {
            continue;
        };
        let Some(row) = coordinate.get_row_num().to_owned().checked_sub(1) else {
            continue;
        };
        let style = convert_style(cell.get_style());
        if !style.is_default() {
            sheet.set_style(row, col, style);
            styled += 1;
        }
    }

    for dimension in source.get_row_dimensions() {
        let height = dimension.get_height().to_owned();
        let Some(row) = dimension.get_row_num().to_owned().checked_sub(1) else {
            continue;
        };
        if height > 0.0 {
            sheet.ensure_row(row).height = Some(height);
        }
    }

    for dimension in source.get_column_dimensions() {
        let Some(col) = to_index(dimension.get_col_num().to_owned()) else {
            continue;
        };
        let width = dimension.get_width().to_owned();
        if width > 0.0 {
            sheet.set_column_width(col, character_width(width));
        }
    }
    styled
}

/// 1-based column number to grid column.
fn to_index(col_num: u32) -> Option<u16> {
    let col = col_num.checked_sub(1)?;
    (col <= MAX_COL as u32).then_some(col as u16)
}

/// Stored widths include cell padding (5px at 7px per character); strip it
/// so the width written back out matches the one authored.
fn character_width(stored: f64) -> f64 {
    let pixels = (stored * 7.0).round();
    if pixels <= 12.0 {
        return stored;
    }
    ((pixels - 5.0) / 7.0 * 100.0).round() / 100.0
}

/// `AARRGGBB` or `RRGGBB` to `#RRGGBB`; theme and indexed colors carry no
/// ARGB text and are skipped.
fn argb_to_hex(argb: &str) -> Option<String> {
    let rgb = match argb.len() {
        8 => &argb[2..],
        6 => argb,
        _ => return None,
    };
    rgb.chars()
        .all(|c| c.is_ascii_hexdigit())
        .then(|| format!("#{}", rgb.to_ascii_uppercase()))
}

fn convert_style(style: &Style) -> CellStyle {
    let mut out = CellStyle::default();

    if let Some(font) = style.get_font() {
        out.bold = font.get_bold().to_owned();
        out.italic = font.get_italic().to_owned();
        let size = font.get_size().to_owned();
        if size > 0.0 && (size - DEFAULT_FONT_SIZE).abs() > f64::EPSILON {
            out.font_size = Some(size);
        }
        out.font_color = argb_to_hex(&font.get_color().get_argb().to_string())
            .filter(|hex| hex != "#000000");
    }

    if let Some(pattern) = style.get_fill().and_then(|fill| fill.get_pattern_fill()) {
        out.fill_color = pattern
            .get_foreground_color()
            .and_then(|color| argb_to_hex(&color.get_argb().to_string()));
    }

    if let Some(format) = style.get_number_format() {
        let code = format.get_format_code().to_string();
        if !code.is_empty() && !code.eq_ignore_ascii_case("General") {
            out.num_format = Some(code);
        }
    }

    if let Some(alignment) = style.get_alignment() {
        out.align = match alignment.get_horizontal() {
            HorizontalAlignmentValues::Left => Some(HorizontalAlign::Left),
            HorizontalAlignmentValues::Center => Some(HorizontalAlign::Center),
            HorizontalAlignmentValues::Right => Some(HorizontalAlign::Right),
            _ => None,
        };
    }

    if let Some(borders) = style.get_borders() {
        let edges = [
            borders.get_left().get_border_style().to_string(),
            borders.get_right().get_border_style().to_string(),
            borders.get_top().get_border_style().to_string(),
            borders.get_bottom().get_border_style().to_string(),
        ];
        out.border = edges.iter().any(|edge| !edge.is_empty() && edge != "none");
    }

    out
}
