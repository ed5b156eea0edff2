//! Excel importer - .xlsx bytes → in-memory workbook

use crate::error::{StencilError, StencilResult};
use crate::grid::{serial_to_datetime, CellRange, CellValue, Workbook, Worksheet};
use super::layout;
use calamine::{Data, Range, Reader, Xlsx};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, warn};

use crate::core::address::MAX_COL;

/// Loads workbook values, formulas and merged regions through calamine,
/// then lays cell formats, row heights and column widths over them.
pub struct ExcelImporter;

impl ExcelImporter {
    /// Open a workbook from a file path.
    pub fn import_path<P: AsRef<Path>>(path: P) -> StencilResult<Workbook> {
        let file = File::open(path.as_ref())?;
        Self::import(BufReader::new(file))
    }

    /// Open a workbook from any seekable byte stream.
    pub fn import<R: Read + Seek>(mut reader: R) -> StencilResult<Workbook> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let mut workbook = Self::import_values(Cursor::new(bytes.as_slice()))?;
        if let Err(e) = layout::apply(&mut workbook, Cursor::new(bytes.as_slice())) {
            warn!("Template formatting not loaded: {}", e);
        }
        Ok(workbook)
    }

    fn import_values<R: Read + Seek>(reader: R) -> StencilResult<Workbook> {
        let mut xlsx: Xlsx<R> = Xlsx::new(reader)
            .map_err(|e| StencilError::Workbook(format!("Failed to open workbook: {}", e)))?;
        xlsx.load_merged_regions()
            .map_err(|e| StencilError::Workbook(format!("Failed to load merged regions: {}", e)))?;

        let mut workbook = Workbook::new();
        let names = xlsx.sheet_names().to_vec();
        for name in names {
            let range = xlsx
                .worksheet_range(&name)
                .map_err(|e| StencilError::Workbook(format!("Failed to read sheet '{}': {}", name, e)))?;
            let formulas = xlsx.worksheet_formula(&name).ok();
            let merged = xlsx
                .worksheet_merge_cells(&name)
                .unwrap_or(Ok(Vec::new()))
                .map_err(|e| {
                    StencilError::Workbook(format!("Failed to read merges of '{}': {}", name, e))
                })?;

            let mut sheet = Worksheet::new(name.clone());
            Self::load_values(&mut sheet, &range);
            if let Some(formulas) = &formulas {
                Self::load_formulas(&mut sheet, formulas);
            }
            for dims in merged {
                let (first_row, first_col) = dims.start;
                let (last_row, last_col) = dims.end;
                if first_col > MAX_COL as u32 || last_col > MAX_COL as u32 {
                    continue;
                }
                sheet.add_merged_region(CellRange::new(
                    first_row,
                    first_col as u16,
                    last_row,
                    last_col as u16,
                ));
            }
            debug!(
                "Imported sheet '{}' ({} rows, {} merged regions)",
                name,
                sheet.row_count(),
                sheet.merged_regions().len()
            );
            workbook.add_sheet(sheet);
        }
        Ok(workbook)
    }

    fn load_values(sheet: &mut Worksheet, range: &Range<Data>) {
        let Some((start_row, start_col)) = range.start() else {
            return;
        };
        for (r, c, data) in range.cells() {
            let value = Self::convert(data);
            if value == CellValue::Empty {
                continue;
            }
            let col = start_col as usize + c;
            if col > MAX_COL as usize {
                continue;
            }
            sheet.set_value(start_row + r as u32, col as u16, value);
        }
    }

    fn load_formulas(sheet: &mut Worksheet, range: &Range<String>) {
        let Some((start_row, start_col)) = range.start() else {
            return;
        };
        for (r, c, formula) in range.cells() {
            if formula.is_empty() {
                continue;
            }
            let col = start_col as usize + c;
            if col > MAX_COL as usize {
                continue;
            }
            let text = if formula.starts_with('=') {
                formula.clone()
            } else {
                format!("={}", formula)
            };
            // keep the cached value loaded above
            sheet.ensure_cell(start_row + r as u32, col as u16).formula = Some(text);
        }
    }

    /// Convert a calamine cell into a grid value
    fn convert(data: &Data) -> CellValue {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => serial_to_datetime(dt.as_f64())
                .map(CellValue::Date)
                .unwrap_or(CellValue::Number(dt.as_f64())),
            Data::DateTimeIso(s) => crate::core::convert::DateConverter::parse_text(s)
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::Text(s.clone())),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Error(e.to_string()),
        }
    }
}
