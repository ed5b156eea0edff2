use crate::core::expr;
use crate::error::{StencilError, StencilResult};
use crate::types::{Block, ConditionalStyle, Definition, SheetDef};
use std::path::Path;
use tracing::debug;

/// Load and validate a template definition from a YAML file.
///
/// # Example
/// ```no_run
/// use royalbit_stencil::parser::parse_definition;
/// use std::path::Path;
///
/// let definition = parse_definition(Path::new("invoice.yaml"))?;
/// println!("Sheets: {}", definition.sheets.len());
/// # Ok::<(), royalbit_stencil::error::StencilError>(())
/// ```
pub fn parse_definition(path: &Path) -> StencilResult<Definition> {
    let content = std::fs::read_to_string(path)?;
    let definition = parse_definition_str(&content)?;
    debug!(
        "Loaded definition {} ({} sheets)",
        path.display(),
        definition.sheets.len()
    );
    Ok(definition)
}

/// Parse and validate a definition from YAML text.
pub fn parse_definition_str(content: &str) -> StencilResult<Definition> {
    let definition: Definition = serde_yaml::from_str(content)?;
    validate(&definition)?;
    Ok(definition)
}

/// Check the structural invariants of a definition.
///
/// - every cell lies inside its block, every child inside its parent
/// - children are one level deep, bound to data and run orthogonally to
///   their parent
/// - loop blocks are bound to data; break conditions only sit on loop blocks
/// - record types named by blocks are declared
/// - guard expressions parse
/// - the style sheet index does not collide with a template sheet
pub fn validate(definition: &Definition) -> StencilResult<()> {
    if let Some(index) = definition.style_sheet {
        if index < definition.sheets.len() {
            return Err(StencilError::Definition(format!(
                "style sheet index {} collides with template sheet '{}'",
                index, definition.sheets[index].name
            )));
        }
    }
    for sheet in &definition.sheets {
        for block in &sheet.blocks {
            validate_block(definition, sheet, block)?;
            if let Some(child) = &block.child {
                validate_child(definition, sheet, block, child)?;
            }
        }
    }
    Ok(())
}

fn invalid(sheet: &SheetDef, message: String) -> StencilError {
    StencilError::Definition(format!("sheet '{}': {}", sheet.name, message))
}

fn validate_block(definition: &Definition, sheet: &SheetDef, block: &Block) -> StencilResult<()> {
    if block.looped && block.data.is_none() {
        return Err(invalid(
            sheet,
            format!("loop block {} has no data binding", block.range),
        ));
    }
    if !block.looped && block.break_condition.is_some() {
        return Err(invalid(
            sheet,
            format!("break condition on non-loop block {}", block.range),
        ));
    }
    if let Some(name) = &block.record_type {
        if !definition.record_types.contains_key(name) {
            return Err(invalid(sheet, format!("unknown record type '{}'", name)));
        }
    }
    for cell in &block.cells {
        if !block.range.contains_cell(cell.at.row, cell.at.col) {
            return Err(invalid(
                sheet,
                format!("cell {} lies outside block {}", String::from(cell.at), block.range),
            ));
        }
        if cell.data.is_some() && cell.expr.is_some() {
            return Err(invalid(
                sheet,
                format!("cell {} has both data and expr", String::from(cell.at)),
            ));
        }
        validate_styles(sheet, &cell.styles)?;
    }
    validate_styles(sheet, &block.styles)
}

fn validate_child(
    definition: &Definition,
    sheet: &SheetDef,
    parent: &Block,
    child: &Block,
) -> StencilResult<()> {
    if !parent.range.contains(&child.range) {
        return Err(invalid(
            sheet,
            format!("child block {} is not inside {}", child.range, parent.range),
        ));
    }
    if child.child.is_some() {
        return Err(invalid(
            sheet,
            format!("child block {} has its own child; only one level is supported", child.range),
        ));
    }
    if child.direction == parent.direction {
        return Err(invalid(
            sheet,
            format!(
                "child block {} must expand across its parent's direction",
                child.range
            ),
        ));
    }
    if child.data.is_none() {
        return Err(invalid(
            sheet,
            format!("child block {} has no data binding", child.range),
        ));
    }
    validate_block(definition, sheet, child)
}

fn validate_styles(sheet: &SheetDef, styles: &[ConditionalStyle]) -> StencilResult<()> {
    for style in styles {
        expr::parse(&style.when).map_err(|e| {
            invalid(sheet, format!("bad guard for style '{}': {}", style.style, e))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellRange;
    use crate::types::{CellDef, CellRef, DataType, Direction};

    const INVOICE: &str = r##"
sheets:
  - name: Invoice
    display_name: customer.name
    blocks:
      - range: A1:D2
        cells:
          - at: B1
            data: customer.name
          - at: D1
            data: issued
            type: date
            mandatory: true
      - range: A4:D4
        loop: true
        data: lines
        record_type: Line
        break: { value: "TOTAL" }
        cells:
          - { at: A4, data: sku }
          - { at: B4, data: qty, type: int }
          - { at: D4, expr: "=B4*C4" }
        styles:
          - when: "qty > 100"
            range: A4:D4
            style: highlight
styles:
  highlight: { bold: true, fill_color: "#FFEE00" }
record_types:
  Line:
    fields: { sku: string, qty: int }
"##;

    #[test]
    fn test_parse_invoice_definition() {
        let definition = parse_definition_str(INVOICE).unwrap();
        assert_eq!(definition.sheets.len(), 1);
        let sheet = &definition.sheets[0];
        assert_eq!(sheet.display_name.as_deref(), Some("customer.name"));

        let lines = &sheet.blocks[1];
        assert!(lines.looped);
        assert_eq!(lines.direction, Direction::Row);
        assert_eq!(lines.range, CellRange::new(3, 0, 3, 3));
        assert_eq!(lines.break_condition.as_ref().unwrap().value, "TOTAL");
        assert_eq!(lines.cells[1].data_type, Some(DataType::Integer));
        assert_eq!(lines.cells[2].expr.as_deref(), Some("=B4*C4"));
        assert!(sheet.blocks[0].cells[1].mandatory);
        assert!(definition.styles["highlight"].bold);
        assert_eq!(
            definition.record_types["Line"].fields["qty"],
            DataType::Integer
        );
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = parse_definition_str("sheets: []\ncolour: red\n").unwrap_err();
        assert!(matches!(err, StencilError::Yaml(_)));
    }

    #[test]
    fn test_cell_outside_block() {
        let definition = Definition::new().with_sheet(
            SheetDef::new("S").with_block(
                Block::simple(CellRange::new(0, 0, 0, 1))
                    .with_cell(CellDef::bound(CellRef::new(2, 0), "x")),
            ),
        );
        let err = validate(&definition).unwrap_err();
        assert!(err.is_setting());
        assert!(err.to_string().contains("outside block A1:B1"));
    }

    #[test]
    fn test_child_rules() {
        let parent = Block::repeating(CellRange::new(0, 0, 0, 5), Direction::Row, "rows");
        let inside = Block::repeating(CellRange::new(0, 2, 0, 2), Direction::Column, "cols");

        let ok = Definition::new()
            .with_sheet(SheetDef::new("S").with_block(parent.clone().with_child(inside.clone())));
        assert!(validate(&ok).is_ok());

        let same_direction = Block::repeating(CellRange::new(0, 2, 0, 2), Direction::Row, "cols");
        let bad = Definition::new()
            .with_sheet(SheetDef::new("S").with_block(parent.clone().with_child(same_direction)));
        assert!(validate(&bad).is_err());

        let outside = Block::repeating(CellRange::new(1, 2, 1, 2), Direction::Column, "cols");
        let bad = Definition::new()
            .with_sheet(SheetDef::new("S").with_block(parent.with_child(outside)));
        assert!(validate(&bad).is_err());
    }

    #[test]
    fn test_style_sheet_collision() {
        let definition = Definition::new()
            .with_sheet(SheetDef::new("A"))
            .with_sheet(SheetDef::new("B"))
            .with_style_sheet(1);
        assert!(validate(&definition).is_err());
        assert!(validate(&definition.with_style_sheet(2)).is_ok());
    }

    #[test]
    fn test_bad_guard_expression() {
        let definition = Definition::new().with_sheet(SheetDef::new("S").with_block(
            Block::simple(CellRange::cell(0, 0)).with_style(ConditionalStyle {
                when: "qty >".into(),
                range: CellRange::cell(0, 0),
                style: "x".into(),
            }),
        ));
        assert!(validate(&definition).is_err());
    }
}
