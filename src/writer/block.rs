//! Block rendering: simple blocks, loop expansion and nested child blocks.
//!
//! Blocks keep their template coordinates. Where an instance actually lands
//! is carried by a [`Placement`], so the definition is never mutated.

use crate::core::address::offset_formula;
use crate::core::context::{DataContext, INDEX_VAR, PREV_VAR};
use crate::core::convert::DateConverter;
use crate::core::copy_block;
use crate::error::{StencilError, StencilResult};
use crate::grid::{CellRange, CellValue, StyleRegistry, Worksheet};
use crate::types::{Block, CellDef, ConditionalStyle, DataType, Direction};
use serde_json::Value;
use tracing::debug;

/// Offset of one rendered instance from its template position.
///
/// `row`/`col` is the full displacement (earlier blocks growing the sheet
/// plus loop steps); `step_row`/`step_col` is the loop-step part only, which
/// is what formula expressions are shifted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Placement {
    pub row: i64,
    pub col: i64,
    step_row: i64,
    step_col: i64,
}

impl Placement {
    pub fn origin(row: i64, col: i64) -> Self {
        Self {
            row,
            col,
            step_row: 0,
            step_col: 0,
        }
    }

    fn step(self, rows: i64, cols: i64) -> Self {
        Self {
            row: self.row + rows,
            col: self.col + cols,
            step_row: self.step_row + rows,
            step_col: self.step_col + cols,
        }
    }

    fn place(&self, range: &CellRange) -> StencilResult<CellRange> {
        range.offset(self.row, self.col).ok_or_else(|| {
            StencilError::Definition(format!(
                "range {} cannot be placed at offset ({}, {})",
                range, self.row, self.col
            ))
        })
    }
}

/// Resolve the data bound to a loop block as a sequence.
///
/// `None` means the value is absent. Arrays are taken as is and any other
/// value becomes a one-element sequence.
fn resolve_items(ctx: &dyn DataContext, block: &Block) -> StencilResult<Option<Vec<Value>>> {
    let path = block.data.as_deref().ok_or_else(|| {
        StencilError::Definition(format!("loop block {} has no data binding", block.range))
    })?;
    Ok(match ctx.get(path)? {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items),
        Some(single) => Some(vec![single]),
    })
}

/// Convert a bound value into a cell value, honouring an explicit type tag.
fn to_cell_value(value: Option<&Value>, hint: Option<DataType>) -> CellValue {
    match value {
        None | Some(Value::Null) => CellValue::Empty,
        Some(Value::Bool(b)) => CellValue::Bool(*b),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(CellValue::Number)
            .unwrap_or_else(|| CellValue::Text(n.to_string())),
        Some(Value::String(s)) => match hint {
            Some(DataType::Date) => DateConverter::parse_text(s)
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::Text(s.clone())),
            Some(DataType::Integer | DataType::Long | DataType::Double) => s
                .trim()
                .parse::<f64>()
                .map(CellValue::Number)
                .unwrap_or_else(|_| CellValue::Text(s.clone())),
            _ => CellValue::Text(s.clone()),
        },
        Some(other) => CellValue::Text(other.to_string()),
    }
}

/// Make `item` the current object for one loop step.
fn enter(ctx: &mut dyn DataContext, item: &Value, prev: Option<&Value>, index: usize) {
    ctx.push(item.clone());
    ctx.set_var(PREV_VAR, prev.cloned().unwrap_or(Value::Null));
    ctx.set_var(INDEX_VAR, Value::from(index));
}

/// Renders blocks onto one sheet with a fixed set of named styles.
pub(crate) struct BlockWriter<'a> {
    styles: &'a StyleRegistry,
}

impl<'a> BlockWriter<'a> {
    pub fn new(styles: &'a StyleRegistry) -> Self {
        Self { styles }
    }

    /// Render a block bound to scalar data.
    ///
    /// `merged` holds the template merges inside the block (template
    /// coordinates); only a child block uses them.
    pub fn write_simple(
        &self,
        sheet: &mut Worksheet,
        block: &Block,
        ctx: &mut dyn DataContext,
        merged: &[CellRange],
        at: Placement,
    ) -> StencilResult<()> {
        self.write_body(sheet, block, ctx, merged, at)
    }

    /// Expand a loop block. Returns the number of rows the sheet grew by.
    pub fn write_loop(
        &self,
        sheet: &mut Worksheet,
        block: &Block,
        ctx: &mut dyn DataContext,
        merged: &[CellRange],
        at: Placement,
    ) -> StencilResult<i64> {
        let rect = at.place(&block.range)?;
        let items = resolve_items(ctx, block)?;
        let placed: Vec<CellRange> = merged
            .iter()
            .filter_map(|m| m.offset(at.row, at.col))
            .collect();

        match block.direction {
            Direction::Row => self.expand_rows(sheet, block, ctx, merged, &placed, rect, items, at),
            Direction::Column => {
                self.expand_columns(sheet, block, ctx, merged, &placed, rect, items, at)?;
                Ok(0)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_rows(
        &self,
        sheet: &mut Worksheet,
        block: &Block,
        ctx: &mut dyn DataContext,
        merged: &[CellRange],
        placed: &[CellRange],
        rect: CellRange,
        items: Option<Vec<Value>>,
        at: Placement,
    ) -> StencilResult<i64> {
        let height = rect.height() as i64;
        let Some(items) = items else {
            debug!("No data for loop block {}, removing placeholder rows", rect);
            Self::clear_placeholder(sheet, &rect);
            return Ok(0);
        };

        // Each instance is copied below the placeholder, which is removed at
        // the end so the first instance lands where the placeholder was.
        let mut prev: Option<&Value> = None;
        for (index, item) in items.iter().enumerate() {
            let step = (index as i64 + 1) * height;
            let target = rect.first_row as i64 + step;
            if let Some(last) = sheet.last_used_row() {
                if target <= last as i64 {
                    sheet.shift_rows(target as u32, last, height);
                }
            }
            copy_block(sheet, &rect, step, 0, placed);

            enter(ctx, item, prev, index);
            let result = self.write_body(sheet, block, ctx, merged, at.step(step, 0));
            ctx.pop();
            result?;
            prev = Some(item);
        }

        Self::clear_placeholder(sheet, &rect);
        if !items.is_empty() {
            if let Some(last) = sheet.last_used_row() {
                if last > rect.last_row {
                    sheet.shift_rows(rect.last_row + 1, last, -height);
                }
            }
        }
        debug!("Expanded {} into {} row instance(s)", rect, items.len());
        Ok(items.len().saturating_sub(1) as i64 * height)
    }

    /// Column-wise expansion overwrites whatever lies to the right; no columns
    /// are inserted. An absent value leaves the placeholder untouched.
    #[allow(clippy::too_many_arguments)]
    fn expand_columns(
        &self,
        sheet: &mut Worksheet,
        block: &Block,
        ctx: &mut dyn DataContext,
        merged: &[CellRange],
        placed: &[CellRange],
        rect: CellRange,
        items: Option<Vec<Value>>,
        at: Placement,
    ) -> StencilResult<()> {
        let Some(items) = items else {
            debug!("No data for loop block {}, leaving placeholder", rect);
            return Ok(());
        };
        let width = rect.width() as i64;

        // copies come from the untouched placeholder, before step 0 renders into it
        for index in 1..items.len() {
            copy_block(sheet, &rect, 0, index as i64 * width, placed);
        }
        let mut prev: Option<&Value> = None;
        for (index, item) in items.iter().enumerate() {
            enter(ctx, item, prev, index);
            let result = self.write_body(sheet, block, ctx, merged, at.step(0, index as i64 * width));
            ctx.pop();
            result?;
            prev = Some(item);
        }
        debug!("Expanded {} into {} column instance(s)", rect, items.len());
        Ok(())
    }

    fn clear_placeholder(sheet: &mut Worksheet, rect: &CellRange) {
        sheet.retain_merged_regions(|m| !rect.contains(m));
        for row in rect.rows() {
            sheet.remove_row(row);
        }
    }

    fn write_body(
        &self,
        sheet: &mut Worksheet,
        block: &Block,
        ctx: &mut dyn DataContext,
        merged: &[CellRange],
        at: Placement,
    ) -> StencilResult<()> {
        self.write_content(sheet, block, ctx, at)?;
        if let Some(child) = &block.child {
            self.write_child(sheet, child, ctx, merged, at)?;
        }
        Ok(())
    }

    /// Styles and cells of one block instance, excluding its child.
    fn write_content(
        &self,
        sheet: &mut Worksheet,
        block: &Block,
        ctx: &dyn DataContext,
        at: Placement,
    ) -> StencilResult<()> {
        for style in &block.styles {
            self.apply_style(sheet, style, ctx, at)?;
        }
        for cell in &block.cells {
            self.write_cell(sheet, cell, ctx, at)?;
        }
        Ok(())
    }

    /// One child instance per element of the child's own sequence, laid out
    /// along the child's direction inside the current parent instance.
    fn write_child(
        &self,
        sheet: &mut Worksheet,
        child: &Block,
        ctx: &mut dyn DataContext,
        merged: &[CellRange],
        at: Placement,
    ) -> StencilResult<()> {
        let rect = at.place(&child.range)?;
        let Some(items) = resolve_items(ctx, child)? else {
            debug!("No data for child block {}", rect);
            return Ok(());
        };
        let (rows, cols) = match child.direction {
            Direction::Row => (rect.height() as i64, 0),
            Direction::Column => (0, rect.width() as i64),
        };
        let placed: Vec<CellRange> = merged
            .iter()
            .filter(|m| child.range.contains(m))
            .filter_map(|m| m.offset(at.row, at.col))
            .collect();

        for index in 1..items.len() {
            let n = index as i64;
            copy_block(sheet, &rect, n * rows, n * cols, &placed);
        }
        let mut prev: Option<&Value> = None;
        for (index, item) in items.iter().enumerate() {
            let n = index as i64;
            enter(ctx, item, prev, index);
            let result = self.write_content(sheet, child, ctx, at.step(n * rows, n * cols));
            ctx.pop();
            result?;
            prev = Some(item);
        }
        Ok(())
    }

    fn write_cell(
        &self,
        sheet: &mut Worksheet,
        def: &CellDef,
        ctx: &dyn DataContext,
        at: Placement,
    ) -> StencilResult<()> {
        let target = at.place(&CellRange::cell(def.at.row, def.at.col))?;
        let (row, col) = (target.first_row, target.first_col);

        if let Some(expr) = def.expr.as_deref() {
            if expr.starts_with('=') {
                sheet.set_formula(row, col, offset_formula(expr, at.step_row, at.step_col));
            } else {
                sheet.set_value(row, col, CellValue::Text(expr.to_string()));
            }
        } else if let Some(path) = def.data.as_deref() {
            let value = ctx.get(path)?;
            sheet.set_value(row, col, to_cell_value(value.as_ref(), def.data_type));
        }

        for style in &def.styles {
            self.apply_style(sheet, style, ctx, at)?;
        }
        Ok(())
    }

    fn apply_style(
        &self,
        sheet: &mut Worksheet,
        style: &ConditionalStyle,
        ctx: &dyn DataContext,
        at: Placement,
    ) -> StencilResult<()> {
        if !ctx.eval_bool(&style.when)? {
            return Ok(());
        }
        let named = self.styles.get(&style.style).ok_or_else(|| {
            StencilError::Definition(format!("unknown style '{}'", style.style))
        })?;
        let range = at.place(&style.range)?;
        sheet.set_range_style(&range, named);
        Ok(())
    }
}
