//! Workbook reader
//!
//! Applies sheet definitions to the sheets of a workbook and gathers the
//! extracted values into a data context. Field-level conversion failures are
//! collected and reported together; anything else aborts the call.

mod block;

use crate::core::{ConverterRegistry, JsonContext};
use crate::error::{FieldError, StencilError, StencilResult};
use crate::excel::ExcelImporter;
use crate::grid::{Workbook, Worksheet};
use crate::types::{Definition, Direction, SheetDef};
use block::BlockReader;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{Read, Seek};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    Success,
    ReadFileError,
    SettingError,
    SystemError,
    DataCollectionError,
}

/// Outcome of a read call: status, accumulated field errors and the data
/// gathered so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadResult {
    pub status: ReadStatus,
    pub message: Option<String>,
    pub errors: Vec<FieldError>,
    pub data: Value,
}

impl ReadResult {
    pub fn is_success(&self) -> bool {
        self.status == ReadStatus::Success
    }

    fn file_error(e: StencilError) -> Self {
        error!("Could not open workbook: {}", e);
        Self {
            status: ReadStatus::ReadFileError,
            message: Some(e.to_string()),
            errors: Vec::new(),
            data: Value::Null,
        }
    }

    fn from_outcome(outcome: StencilResult<()>, errors: Vec<FieldError>, data: Value) -> Self {
        let (status, message) = match outcome {
            Err(e) => {
                error!("Read failed: {}", e);
                let status = if e.is_setting() {
                    ReadStatus::SettingError
                } else {
                    ReadStatus::SystemError
                };
                (status, Some(e.to_string()))
            }
            Ok(()) if !errors.is_empty() => (
                ReadStatus::DataCollectionError,
                Some(format!("{} field error(s)", errors.len())),
            ),
            Ok(()) => (ReadStatus::Success, None),
        };
        Self {
            status,
            message,
            errors,
            data,
        }
    }
}

/// Extracts data from workbooks according to one definition.
pub struct TemplateReader<'a> {
    definition: &'a Definition,
    converters: ConverterRegistry,
}

impl<'a> TemplateReader<'a> {
    pub fn new(definition: &'a Definition) -> Self {
        Self {
            definition,
            converters: ConverterRegistry::default(),
        }
    }

    /// Replace the converter registry used for this reader.
    pub fn with_converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    /// Read sheet `i` of the workbook with the definition's sheet `i`, all
    /// into `ctx`.
    pub fn read<R: Read + Seek>(&self, input: R, ctx: JsonContext) -> ReadResult {
        match ExcelImporter::import(input) {
            Ok(workbook) => self.read_workbook(&workbook, ctx),
            Err(e) => ReadResult::file_error(e),
        }
    }

    pub fn read_workbook(&self, workbook: &Workbook, mut ctx: JsonContext) -> ReadResult {
        let mut errors = Vec::new();
        let outcome = self.read_sheets(workbook, &mut ctx, &mut errors);
        info!(
            "Read {} sheet(s), {} field error(s)",
            self.definition.sheets.len(),
            errors.len()
        );
        ReadResult::from_outcome(outcome, errors, ctx.into_root())
    }

    /// Apply the definition's first sheet to every sheet of the workbook,
    /// each with its own copy of `ctx`, then turn the per-sheet results into
    /// one list per top-level key.
    pub fn read_per_sheet<R: Read + Seek>(&self, input: R, ctx: JsonContext) -> ReadResult {
        match ExcelImporter::import(input) {
            Ok(workbook) => self.read_workbook_per_sheet(&workbook, ctx),
            Err(e) => ReadResult::file_error(e),
        }
    }

    pub fn read_workbook_per_sheet(&self, workbook: &Workbook, ctx: JsonContext) -> ReadResult {
        let mut errors = Vec::new();
        let mut results = Vec::new();
        let outcome = self.read_each_sheet(workbook, &ctx, &mut errors, &mut results);
        info!(
            "Read {} sheet(s) as records, {} field error(s)",
            results.len(),
            errors.len()
        );
        ReadResult::from_outcome(outcome, errors, transpose(&results))
    }

    fn read_sheets(
        &self,
        workbook: &Workbook,
        ctx: &mut JsonContext,
        errors: &mut Vec<FieldError>,
    ) -> StencilResult<()> {
        let sheets = &self.definition.sheets;
        if workbook.sheet_count() < sheets.len() {
            return Err(StencilError::Definition(format!(
                "workbook has {} sheet(s) but the definition describes {}",
                workbook.sheet_count(),
                sheets.len()
            )));
        }
        for (index, (sheet, sheet_def)) in workbook.sheets().iter().zip(sheets).enumerate() {
            self.read_sheet(sheet, index, sheet_def, ctx, errors)?;
        }
        Ok(())
    }

    fn read_each_sheet(
        &self,
        workbook: &Workbook,
        ctx: &JsonContext,
        errors: &mut Vec<FieldError>,
        results: &mut Vec<Value>,
    ) -> StencilResult<()> {
        let sheet_def = self.definition.sheets.first().ok_or_else(|| {
            StencilError::Definition("definition has no sheets".to_string())
        })?;
        for (index, sheet) in workbook.sheets().iter().enumerate() {
            if self.definition.style_sheet == Some(index) {
                continue;
            }
            let mut sheet_ctx = ctx.clone();
            self.read_sheet(sheet, index, sheet_def, &mut sheet_ctx, errors)?;
            results.push(sheet_ctx.into_root());
        }
        Ok(())
    }

    /// The first loop block is read first and decides how far simple blocks
    /// below it have moved; further loop blocks are not read.
    fn read_sheet(
        &self,
        sheet: &Worksheet,
        index: usize,
        sheet_def: &SheetDef,
        ctx: &mut JsonContext,
        errors: &mut Vec<FieldError>,
    ) -> StencilResult<()> {
        let reader = BlockReader::new(&self.converters, &self.definition.record_types, index);

        let mut growth: Option<(u32, i64)> = None;
        if let Some(block) = sheet_def.blocks.iter().find(|b| b.looped) {
            let count = reader.read_loop(sheet, block, ctx, errors)?;
            if block.direction == Direction::Row && count > 1 {
                let rows = (count as i64 - 1) * block.range.height() as i64;
                growth = Some((block.range.last_row, rows));
            }
        }
        let ignored = sheet_def.blocks.iter().filter(|b| b.looped).count().saturating_sub(1);
        if ignored > 0 {
            debug!("Sheet '{}': {} extra loop block(s) not read", sheet.name(), ignored);
        }

        for block in sheet_def.blocks.iter().filter(|b| !b.looped) {
            let row_offset = match growth {
                Some((end_row, rows)) if block.range.first_row > end_row => rows,
                _ => 0,
            };
            reader.read_simple(sheet, block, ctx, errors, row_offset)?;
        }
        Ok(())
    }
}

/// `[{a: 1, b: 2}, {a: 3}]` → `{a: [1, 3], b: [2, null]}`
fn transpose(results: &[Value]) -> Value {
    let mut keys: Vec<&String> = Vec::new();
    for result in results {
        if let Value::Object(map) = result {
            for key in map.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
    }
    let mut out = Map::new();
    for key in keys {
        let column = results
            .iter()
            .map(|r| r.get(key.as_str()).cloned().unwrap_or(Value::Null))
            .collect();
        out.insert(key.clone(), Value::Array(column));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transpose_fills_missing_keys() {
        let results = vec![json!({"a": 1, "b": 2}), json!({"a": 3})];
        assert_eq!(transpose(&results), json!({"a": [1, 3], "b": [2, null]}));
        assert_eq!(transpose(&[]), json!({}));
    }

    #[test]
    fn test_sheet_count_mismatch_is_setting_error() {
        let definition = Definition::new()
            .with_sheet(SheetDef::new("a"))
            .with_sheet(SheetDef::new("b"));
        let mut workbook = Workbook::new();
        workbook.add_sheet(Worksheet::new("only"));

        let result = TemplateReader::new(&definition).read_workbook(&workbook, JsonContext::default());
        assert_eq!(result.status, ReadStatus::SettingError);
        assert!(result.message.unwrap().contains("definition describes 2"));
    }

    #[test]
    fn test_unreadable_input_is_file_error() {
        let definition = Definition::new().with_sheet(SheetDef::new("a"));
        let result = TemplateReader::new(&definition)
            .read(std::io::Cursor::new(b"nope".to_vec()), JsonContext::default());
        assert_eq!(result.status, ReadStatus::ReadFileError);
    }
}
