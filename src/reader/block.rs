//! Block extraction: simple blocks and loop blocks walked until their
//! break condition.

use crate::core::address::to_reference;
use crate::core::context::DataContext;
use crate::core::convert::Location;
use crate::core::{ConverterRegistry, JsonContext};
use crate::error::{FieldError, StencilError, StencilResult};
use crate::grid::{CellRange, CellValue, Worksheet};
use crate::types::{Block, DataType, Direction, RecordType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Type of a raw cell when neither the definition nor the data says otherwise.
fn infer_from_cell(raw: &CellValue) -> DataType {
    match raw {
        CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => DataType::Long,
        CellValue::Number(_) => DataType::Double,
        CellValue::Bool(_) => DataType::Boolean,
        CellValue::Date(_) => DataType::Date,
        _ => DataType::Text,
    }
}

/// Reads blocks of one sheet into a [`JsonContext`], collecting field errors.
pub(crate) struct BlockReader<'a> {
    converters: &'a ConverterRegistry,
    record_types: &'a BTreeMap<String, RecordType>,
    sheet_index: usize,
}

impl<'a> BlockReader<'a> {
    pub fn new(
        converters: &'a ConverterRegistry,
        record_types: &'a BTreeMap<String, RecordType>,
        sheet_index: usize,
    ) -> Self {
        Self {
            converters,
            record_types,
            sheet_index,
        }
    }

    /// Read every bound cell of `block`, shifted by `row_offset` rows.
    pub fn read_simple(
        &self,
        sheet: &Worksheet,
        block: &Block,
        ctx: &mut JsonContext,
        errors: &mut Vec<FieldError>,
        row_offset: i64,
    ) -> StencilResult<()> {
        self.read_cells(sheet, block, ctx, errors, row_offset, 0)
    }

    /// Walk a loop block window by window until the break test fires,
    /// appending one record per window to the bound collection.
    ///
    /// Returns the number of records read.
    pub fn read_loop(
        &self,
        sheet: &Worksheet,
        block: &Block,
        ctx: &mut JsonContext,
        errors: &mut Vec<FieldError>,
    ) -> StencilResult<usize> {
        let path = block.data.as_deref().ok_or_else(|| {
            StencilError::Definition(format!("loop block {} has no data binding", block.range))
        })?;
        let (rows, cols) = match block.direction {
            Direction::Row => (block.range.height() as i64, 0),
            Direction::Column => (0, block.range.width() as i64),
        };

        let mut records = Vec::new();
        loop {
            let n = records.len() as i64;
            let Some(window) = block.range.offset(n * rows, n * cols) else {
                break;
            };
            if self.at_end(sheet, block, &window) {
                break;
            }
            records.push(self.read_record(sheet, block, ctx, errors, n * rows, n * cols)?);
        }

        let count = records.len();
        let mut collection = match ctx.get(path)? {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        collection.extend(records);
        ctx.set(path, Value::Array(collection))?;
        debug!("Read {} record(s) from loop block {}", count, block.range);
        Ok(count)
    }

    /// Break test for the window starting at `window`.
    fn at_end(&self, sheet: &Worksheet, block: &Block, window: &CellRange) -> bool {
        let past_end = match block.direction {
            Direction::Row => sheet.last_row().map_or(true, |last| window.first_row > last),
            Direction::Column => sheet.last_col().map_or(true, |last| window.first_col > last),
        };
        if past_end {
            return true;
        }
        match &block.break_condition {
            Some(cond) => {
                let row = window.first_row as u64 + cond.row_offset as u64;
                let col = window.first_col as u64 + cond.col_offset as u64;
                match (u32::try_from(row), u16::try_from(col)) {
                    (Ok(row), Ok(col)) => {
                        sheet.value(row, col).display_text().trim() == cond.value.trim()
                    }
                    _ => true,
                }
            }
            None => window
                .rows()
                .all(|r| window.cols().all(|c| sheet.value(r, c).is_blank())),
        }
    }

    fn read_record(
        &self,
        sheet: &Worksheet,
        block: &Block,
        ctx: &mut JsonContext,
        errors: &mut Vec<FieldError>,
        row_offset: i64,
        col_offset: i64,
    ) -> StencilResult<Value> {
        match block.record_type.as_deref() {
            Some(name) => {
                let record = self.record_types.get(name).ok_or_else(|| {
                    StencilError::Definition(format!("unknown record type '{}'", name))
                })?;
                ctx.push_record(record.instantiate(), record.clone());
            }
            None => ctx.push(Value::Object(Map::new())),
        }
        let result = self.read_cells(sheet, block, ctx, errors, row_offset, col_offset);
        let record = ctx.pop().unwrap_or(Value::Null);
        result.map(|()| record)
    }

    fn read_cells(
        &self,
        sheet: &Worksheet,
        block: &Block,
        ctx: &mut JsonContext,
        errors: &mut Vec<FieldError>,
        row_offset: i64,
        col_offset: i64,
    ) -> StencilResult<()> {
        for def in &block.cells {
            let Some(path) = def.data.as_deref() else {
                continue;
            };
            let position = CellRange::cell(def.at.row, def.at.col)
                .offset(row_offset, col_offset)
                .ok_or_else(|| {
                    StencilError::Definition(format!(
                        "cell {} leaves the sheet at offset ({}, {})",
                        String::from(def.at),
                        row_offset,
                        col_offset
                    ))
                })?;
            let (row, col) = (position.first_row, position.first_col);
            let raw = sheet.value(row, col);
            let reference = to_reference(row, col);

            let target = match def.data_type {
                Some(t) => t,
                None => ctx
                    .resolve_type(path)?
                    .unwrap_or_else(|| infer_from_cell(&raw)),
            };
            let at = Location {
                sheet: self.sheet_index,
                cell: &reference,
            };
            match self.converters.convert(&raw, at, def, target) {
                Ok(value) => ctx.set(path, value)?,
                Err(e) => {
                    warn!("{}", e);
                    errors.push(e);
                }
            }
        }
        Ok(())
    }
}
