//! Workbook writer
//!
//! Drives block rendering across the sheets of a template workbook: style
//! sheet handling, display names, merge bucketing, row offsets for blocks
//! below a growing loop, formula recalculation and serialization.

mod block;

use crate::core::DataContext;
use crate::error::{StencilError, StencilResult};
use crate::excel::{recalculate, ExcelExporter, ExcelImporter};
use crate::grid::{CellRange, StyleRegistry, Workbook, Worksheet};
use crate::types::{Block, Definition, SheetDef};
use block::{BlockWriter, Placement};
use serde::Serialize;
use serde_json::Value;
use std::io::{Read, Seek, Write};
use tracing::{debug, error, info, warn};

/// Name given to the i-th (1-based) sheet produced by a per-sheet write.
pub fn generated_sheet_name(ordinal: usize) -> String {
    format!("Auto Generated Sheet {}", ordinal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Success,
    SettingError,
    SystemError,
}

/// Outcome of a write call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteResult {
    pub status: WriteStatus,
    pub message: Option<String>,
}

impl WriteResult {
    pub fn is_success(&self) -> bool {
        self.status == WriteStatus::Success
    }

    fn from_outcome(outcome: StencilResult<()>) -> Self {
        match outcome {
            Ok(()) => Self {
                status: WriteStatus::Success,
                message: None,
            },
            Err(e) => {
                let status = if e.is_setting() {
                    WriteStatus::SettingError
                } else {
                    WriteStatus::SystemError
                };
                error!("Write failed: {}", e);
                Self {
                    status,
                    message: Some(e.to_string()),
                }
            }
        }
    }
}

/// Row growth recorded by loop blocks during one sheet render.
///
/// Blocks keep their template coordinates; a block starting below a grown
/// loop is placed at the sum of the growth above it.
#[derive(Debug, Default)]
struct RenderState {
    growth: Vec<(u32, i64)>,
}

impl RenderState {
    fn row_offset(&self, start_row: u32) -> i64 {
        self.growth
            .iter()
            .filter(|(end_row, _)| *end_row < start_row)
            .map(|(_, rows)| rows)
            .sum()
    }

    fn record(&mut self, end_row: u32, rows: i64) {
        if rows != 0 {
            self.growth.push((end_row, rows));
        }
    }
}

/// Assign every merged region to the first top-level block containing it.
fn bucket_merges(sheet: &Worksheet, blocks: &[Block]) -> Vec<Vec<CellRange>> {
    let mut buckets = vec![Vec::new(); blocks.len()];
    for region in sheet.merged_regions() {
        if let Some(index) = blocks.iter().position(|b| b.range.contains(region)) {
            buckets[index].push(*region);
        }
    }
    buckets
}

/// Renders data into template workbooks according to one definition.
///
/// The definition is only borrowed; every call keeps its own render state.
pub struct TemplateWriter<'a> {
    definition: &'a Definition,
}

impl<'a> TemplateWriter<'a> {
    pub fn new(definition: &'a Definition) -> Self {
        Self { definition }
    }

    /// Read the template from `template`, render `ctx` into it and write the
    /// resulting workbook to `out`.
    pub fn write<R: Read + Seek, W: Write>(
        &self,
        template: R,
        ctx: &mut dyn DataContext,
        mut out: W,
    ) -> WriteResult {
        let outcome = ExcelImporter::import(template)
            .and_then(|mut workbook| {
                self.render(&mut workbook, ctx)?;
                ExcelExporter::export(&workbook)
            })
            .and_then(|bytes| out.write_all(&bytes).map_err(StencilError::from));
        WriteResult::from_outcome(outcome)
    }

    /// Render one workbook sheet per data context, all from the template's
    /// first sheet.
    pub fn write_per_sheet<R: Read + Seek, W: Write, C: DataContext>(
        &self,
        template: R,
        contexts: &mut [C],
        mut out: W,
    ) -> WriteResult {
        let outcome = ExcelImporter::import(template)
            .and_then(|mut workbook| {
                self.render_per_sheet(&mut workbook, contexts)?;
                ExcelExporter::export(&workbook)
            })
            .and_then(|bytes| out.write_all(&bytes).map_err(StencilError::from));
        WriteResult::from_outcome(outcome)
    }

    /// Render in place: sheet `i` of the workbook is the template for the
    /// definition's sheet `i`.
    pub fn render(&self, workbook: &mut Workbook, ctx: &mut dyn DataContext) -> StencilResult<()> {
        let sheets = &self.definition.sheets;
        if workbook.sheet_count() < sheets.len() {
            return Err(StencilError::Definition(format!(
                "template has {} sheet(s) but the definition describes {}",
                workbook.sheet_count(),
                sheets.len()
            )));
        }
        let styles = self.prepare_styles(workbook, sheets.len())?;

        for (index, sheet_def) in sheets.iter().enumerate() {
            let sheet = workbook.sheet_mut(index).ok_or_else(|| {
                StencilError::Workbook(format!("No sheet at index {}", index))
            })?;
            self.render_sheet(sheet, sheet_def, ctx, &styles)?;
        }

        Self::finish(workbook);
        info!("Rendered {} sheet(s)", sheets.len());
        Ok(())
    }

    /// Clone the template's first sheet once per context, render each clone
    /// and drop every template sheet, so the output holds only the clones.
    pub fn render_per_sheet<C: DataContext>(
        &self,
        workbook: &mut Workbook,
        contexts: &mut [C],
    ) -> StencilResult<()> {
        let sheet_def = self.definition.sheets.first().ok_or_else(|| {
            StencilError::Definition("definition has no sheets".to_string())
        })?;
        if workbook.sheet_count() == 0 {
            return Err(StencilError::Definition(
                "template has no sheets".to_string(),
            ));
        }
        if contexts.is_empty() {
            return Err(StencilError::Definition(
                "per-sheet write needs at least one data context".to_string(),
            ));
        }
        let styles = self.prepare_styles(workbook, 1)?;
        let templates = workbook.sheet_count();

        for (i, ctx) in contexts.iter_mut().enumerate() {
            let index = workbook.clone_sheet(0, generated_sheet_name(i + 1))?;
            let sheet = workbook.sheet_mut(index).ok_or_else(|| {
                StencilError::Workbook(format!("No sheet at index {}", index))
            })?;
            self.render_sheet(sheet, sheet_def, ctx, &styles)?;
        }
        for _ in 0..templates {
            workbook.remove_sheet(0)?;
        }
        if templates > 1 {
            debug!("Dropped {} extra template sheet(s)", templates - 1);
        }

        Self::finish(workbook);
        info!("Rendered {} generated sheet(s)", contexts.len());
        Ok(())
    }

    fn finish(workbook: &mut Workbook) {
        recalculate(workbook);
        workbook.set_active_sheet(0);
    }

    /// Named styles for this call: inline definition styles overlaid by the
    /// style sheet scan, which also removes the style sheet.
    fn prepare_styles(&self, workbook: &mut Workbook, templates: usize) -> StencilResult<StyleRegistry> {
        let mut registry: StyleRegistry = self
            .definition
            .styles
            .iter()
            .map(|(name, style)| (name.clone(), style.clone()))
            .collect();

        let Some(index) = self.definition.style_sheet else {
            return Ok(registry);
        };
        if index < templates {
            return Err(StencilError::Definition(format!(
                "style sheet index {} collides with a template sheet",
                index
            )));
        }
        if index >= workbook.sheet_count() {
            return Err(StencilError::Definition(format!(
                "style sheet index {} is out of range ({} sheets)",
                index,
                workbook.sheet_count()
            )));
        }

        let sheet = workbook.remove_sheet(index)?;
        let mut found = 0;
        for (_, row) in sheet.rows() {
            for (_, cell) in row.cells() {
                if let (Some(name), Some(style)) = (cell.value.as_text(), cell.style.as_ref()) {
                    registry.insert(name.trim(), style.clone());
                    found += 1;
                }
            }
        }
        debug!("Loaded {} style(s) from style sheet '{}'", found, sheet.name());
        Ok(registry)
    }

    fn render_sheet(
        &self,
        sheet: &mut Worksheet,
        sheet_def: &SheetDef,
        ctx: &mut dyn DataContext,
        styles: &StyleRegistry,
    ) -> StencilResult<()> {
        if let Some(path) = sheet_def.display_name.as_deref() {
            match ctx.get(path)? {
                None | Some(Value::Null) => {}
                Some(Value::String(name)) => {
                    if !name.is_empty() {
                        sheet.set_name(name);
                    }
                }
                Some(other) => sheet.set_name(other.to_string()),
            }
        }

        let buckets = bucket_merges(sheet, &sheet_def.blocks);
        let writer = BlockWriter::new(styles);
        let mut state = RenderState::default();

        for (block, merged) in sheet_def.blocks.iter().zip(&buckets) {
            let at = Placement::origin(state.row_offset(block.range.first_row), 0);
            if block.looped {
                match writer.write_loop(sheet, block, ctx, merged, at) {
                    Ok(rows) => state.record(block.range.last_row, rows),
                    Err(e) => warn!(
                        "Skipping loop block {} on sheet '{}': {}",
                        block.range,
                        sheet.name(),
                        e
                    ),
                }
            } else {
                writer.write_simple(sheet, block, ctx, merged, at)?;
            }
        }
        debug!(
            "Rendered sheet '{}' ({} blocks, {} rows)",
            sheet.name(),
            sheet_def.blocks.len(),
            sheet.row_count()
        );
        Ok(())
    }
}
