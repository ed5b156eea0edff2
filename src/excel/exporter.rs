//! Excel exporter - in-memory workbook → .xlsx bytes

use crate::error::{StencilError, StencilResult};
use crate::grid::{
    datetime_to_serial, parse_color, Cell, CellStyle, CellValue, HorizontalAlign, Workbook,
    Worksheet,
};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Formula};
use std::path::Path;
use tracing::{debug, warn};

const DEFAULT_DATE_FORMAT: &str = "yyyy-mm-dd";

/// Serializes a workbook through rust_xlsxwriter
pub struct ExcelExporter;

impl ExcelExporter {
    /// Serialize to an in-memory .xlsx buffer.
    pub fn export(workbook: &Workbook) -> StencilResult<Vec<u8>> {
        let mut out = rust_xlsxwriter::Workbook::new();

        for (index, sheet) in workbook.sheets().iter().enumerate() {
            let worksheet = out.add_worksheet();
            Self::export_sheet(worksheet, sheet)?;
            if index == workbook.active_sheet() {
                worksheet.set_active(true);
            }
        }

        out.save_to_buffer()
            .map_err(|e| StencilError::Workbook(format!("Failed to save workbook: {}", e)))
    }

    /// Serialize straight to a file.
    pub fn export_path(workbook: &Workbook, path: &Path) -> StencilResult<()> {
        let bytes = Self::export(workbook)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn export_sheet(worksheet: &mut rust_xlsxwriter::Worksheet, sheet: &Worksheet) -> StencilResult<()> {
        worksheet
            .set_name(sheet.name())
            .map_err(|e| StencilError::Workbook(format!("Invalid sheet name '{}': {}", sheet.name(), e)))?;

        for (col, width) in sheet.column_widths() {
            worksheet
                .set_column_width(col, width)
                .map_err(|e| StencilError::Workbook(format!("Failed to set column width: {}", e)))?;
        }

        // merges first: merge_range writes the anchor, real values overwrite it below
        for region in sheet.merged_regions() {
            if region.is_single_cell() {
                continue;
            }
            let anchor_format = sheet
                .cell(region.first_row, region.first_col)
                .and_then(|c| c.style.as_ref())
                .map(Self::format)
                .unwrap_or_default();
            if let Err(e) = worksheet.merge_range(
                region.first_row,
                region.first_col,
                region.last_row,
                region.last_col,
                "",
                &anchor_format,
            ) {
                warn!("Skipping merged region {} on '{}': {}", region, sheet.name(), e);
            }
        }

        for (row_index, row) in sheet.rows() {
            if let Some(height) = row.height {
                worksheet
                    .set_row_height(row_index, height)
                    .map_err(|e| StencilError::Workbook(format!("Failed to set row height: {}", e)))?;
            }
            for (col, cell) in row.cells() {
                Self::write_cell(worksheet, row_index, col, cell)?;
            }
        }

        debug!("Exported sheet '{}' ({} rows)", sheet.name(), sheet.row_count());
        Ok(())
    }

    fn write_cell(
        worksheet: &mut rust_xlsxwriter::Worksheet,
        row: u32,
        col: u16,
        cell: &Cell,
    ) -> StencilResult<()> {
        let mut format = cell.style.as_ref().map(Self::format).unwrap_or_default();
        let failed = |e: rust_xlsxwriter::XlsxError| {
            StencilError::Workbook(format!("Failed to write cell ({}, {}): {}", row, col, e))
        };

        if let Some(text) = &cell.formula {
            let mut formula = Formula::new(text);
            if cell.value != CellValue::Empty {
                formula = formula.set_result(cell.value.to_string());
            }
            worksheet
                .write_formula_with_format(row, col, formula, &format)
                .map_err(failed)?;
            return Ok(());
        }

        match &cell.value {
            CellValue::Empty => {
                if cell.style.is_some() {
                    worksheet.write_blank(row, col, &format).map_err(failed)?;
                }
            }
            CellValue::Text(s) => {
                worksheet
                    .write_string_with_format(row, col, s, &format)
                    .map_err(failed)?;
            }
            CellValue::Number(n) => {
                worksheet
                    .write_number_with_format(row, col, *n, &format)
                    .map_err(failed)?;
            }
            CellValue::Bool(b) => {
                worksheet
                    .write_boolean_with_format(row, col, *b, &format)
                    .map_err(failed)?;
            }
            CellValue::Date(d) => {
                let has_format = cell
                    .style
                    .as_ref()
                    .is_some_and(|s| s.num_format.is_some());
                if !has_format {
                    format = format.set_num_format(DEFAULT_DATE_FORMAT);
                }
                worksheet
                    .write_number_with_format(row, col, datetime_to_serial(d), &format)
                    .map_err(failed)?;
            }
            CellValue::Error(e) => {
                worksheet
                    .write_string_with_format(row, col, e, &format)
                    .map_err(failed)?;
            }
        }
        Ok(())
    }

    /// Translate a grid style into an xlsxwriter format
    fn format(style: &CellStyle) -> Format {
        let mut format = Format::new();
        if style.bold {
            format = format.set_bold();
        }
        if style.italic {
            format = format.set_italic();
        }
        if let Some(size) = style.font_size {
            format = format.set_font_size(size);
        }
        if let Some(color) = style.font_color.as_deref() {
            match parse_color(color) {
                Some(rgb) => format = format.set_font_color(Color::RGB(rgb)),
                None => warn!("Ignoring invalid font color '{}'", color),
            }
        }
        if let Some(color) = style.fill_color.as_deref() {
            match parse_color(color) {
                Some(rgb) => {
                    format = format
                        .set_background_color(Color::RGB(rgb))
                        .set_pattern(FormatPattern::Solid)
                }
                None => warn!("Ignoring invalid fill color '{}'", color),
            }
        }
        if let Some(num_format) = style.num_format.as_deref() {
            format = format.set_num_format(num_format);
        }
        if let Some(align) = style.align {
            format = format.set_align(match align {
                HorizontalAlign::Left => FormatAlign::Left,
                HorizontalAlign::Center => FormatAlign::Center,
                HorizontalAlign::Right => FormatAlign::Right,
            });
        }
        if style.border {
            format = format.set_border(FormatBorder::Thin);
        }
        format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::ExcelImporter;
    use crate::grid::CellRange;
    use std::io::Cursor;

    #[test]
    fn test_export_then_import_keeps_content() {
        let mut wb = Workbook::new();
        let mut sheet = Worksheet::new("Data");
        sheet.set_value(0, 0, CellValue::Text("Name".into()));
        sheet.set_value(1, 0, CellValue::Number(12.5));
        sheet.set_value(2, 0, CellValue::Bool(true));
        sheet.set_formula(3, 0, "=A2*2");
        sheet.ensure_cell(3, 0).value = CellValue::Number(25.0);
        sheet.add_merged_region(CellRange::new(0, 0, 0, 2));
        sheet.set_style(
            0,
            0,
            CellStyle {
                bold: true,
                fill_color: Some("#FFFF00".into()),
                ..CellStyle::default()
            },
        );
        wb.add_sheet(sheet);
        wb.add_sheet(Worksheet::new("Second"));

        let bytes = ExcelExporter::export(&wb).unwrap();
        let loaded = ExcelImporter::import(Cursor::new(bytes)).unwrap();

        assert_eq!(loaded.sheet_count(), 2);
        let sheet = loaded.sheet(0).unwrap();
        assert_eq!(sheet.name(), "Data");
        assert_eq!(sheet.value(0, 0), CellValue::Text("Name".into()));
        assert_eq!(sheet.value(1, 0), CellValue::Number(12.5));
        assert_eq!(sheet.value(2, 0), CellValue::Bool(true));
        assert_eq!(sheet.cell(3, 0).unwrap().formula.as_deref(), Some("=A2*2"));
        assert_eq!(sheet.merged_regions(), &[CellRange::new(0, 0, 0, 2)]);
    }

    #[test]
    fn test_export_rejects_invalid_sheet_name() {
        let mut wb = Workbook::new();
        wb.add_sheet(Worksheet::new("bad[name]"));
        assert!(matches!(
            ExcelExporter::export(&wb),
            Err(StencilError::Workbook(_))
        ));
    }
}
