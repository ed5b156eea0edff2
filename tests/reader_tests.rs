//! Workbook parsing tests against in-memory workbooks

use pretty_assertions::assert_eq;
use royalbit_stencil::grid::{CellRange, CellValue, Workbook, Worksheet};
use royalbit_stencil::types::{
    Block, CellDef, CellRef, DataType, Definition, Direction, RecordType, SheetDef,
};
use royalbit_stencil::{FieldErrorKind, JsonContext, ReadStatus, TemplateReader};
use serde_json::json;

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

fn at(reference: &str) -> CellRef {
    CellRef::parse(reference).unwrap()
}

fn range(text: &str) -> CellRange {
    CellRange::parse(text).unwrap()
}

fn single(sheet: Worksheet) -> Workbook {
    let mut workbook = Workbook::new();
    workbook.add_sheet(sheet);
    workbook
}

// ═══════════════════════════════════════════════════════════════════════════
// LOOP TERMINATION
// ═══════════════════════════════════════════════════════════════════════════

/// Header in row 1, one line per row from row 2, a TOTAL row after the
/// lines carrying the sum in column B.
fn ledger_definition() -> Definition {
    Definition::new().with_sheet(
        SheetDef::new("Ledger")
            .with_block(
                Block::repeating(range("A2:B2"), Direction::Row, "lines")
                    .with_break(0, 0, "TOTAL")
                    .with_cell(CellDef::bound(at("A2"), "item"))
                    .with_cell(CellDef::bound(at("B2"), "amount")),
            )
            .with_block(Block::simple(range("A3:B3")).with_cell(CellDef::bound(at("B3"), "total"))),
    )
}

fn ledger(k: u32) -> Worksheet {
    let mut sheet = Worksheet::new("Ledger");
    sheet.set_value(0, 0, text("Item"));
    sheet.set_value(0, 1, text("Amount"));
    for i in 0..k {
        sheet.set_value(1 + i, 0, text(&format!("item-{}", i)));
        sheet.set_value(1 + i, 1, CellValue::Number(10.0 * (i + 1) as f64));
    }
    sheet.set_value(1 + k, 0, text("  TOTAL "));
    sheet.set_value(1 + k, 1, CellValue::Number(10.0 * (k * (k + 1) / 2) as f64));
    sheet.set_value(3 + k, 0, text("notes below the table"));
    sheet
}

#[test]
fn test_break_value_ends_loop_at_any_length() {
    let definition = ledger_definition();
    for k in 1..=4u32 {
        let result = TemplateReader::new(&definition)
            .read_workbook(&single(ledger(k)), JsonContext::default());
        assert!(result.is_success(), "k = {}: {:?}", k, result.message);

        let lines = result.data["lines"].as_array().unwrap();
        assert_eq!(lines.len(), k as usize);
        assert_eq!(lines[0], json!({"item": "item-0", "amount": 10}));
        assert_eq!(result.data["total"], json!(10 * (k * (k + 1) / 2)));
    }
}

#[test]
fn test_break_on_first_window_reads_nothing() {
    let result = TemplateReader::new(&ledger_definition())
        .read_workbook(&single(ledger(0)), JsonContext::default());
    assert!(result.is_success());
    assert_eq!(result.data["lines"], json!([]));
}

#[test]
fn test_loop_stops_at_end_of_sheet() {
    let mut sheet = Worksheet::new("S");
    sheet.set_value(0, 0, text("a"));
    sheet.set_value(1, 0, CellValue::Empty);
    sheet.set_value(1, 1, text("b"));
    let definition = Definition::new().with_sheet(
        SheetDef::new("S").with_block(
            Block::repeating(range("A1:B1"), Direction::Row, "rows")
                .with_break(0, 0, "END")
                .with_cell(CellDef::bound(at("A1"), "first"))
                .with_cell(CellDef::bound(at("B1"), "second")),
        ),
    );

    let result = TemplateReader::new(&definition).read_workbook(&single(sheet), JsonContext::default());
    assert!(result.is_success());
    assert_eq!(
        result.data,
        json!({"rows": [
            {"first": "a", "second": null},
            {"first": null, "second": "b"}
        ]})
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// FIELD ERRORS AND TYPES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_field_errors_are_collected_with_partial_data() {
    let mut sheet = Worksheet::new("People");
    sheet.set_value(0, 0, text("Ann"));
    sheet.set_value(0, 1, text("forty"));
    sheet.set_value(1, 1, CellValue::Number(30.0));
    let definition = Definition::new().with_sheet(
        SheetDef::new("People").with_block(
            Block::repeating(range("A1:B1"), Direction::Row, "people")
                .with_cell(CellDef::bound(at("A1"), "name").mandatory())
                .with_cell(CellDef::bound(at("B1"), "age").with_type(DataType::Integer)),
        ),
    );

    let result = TemplateReader::new(&definition).read_workbook(&single(sheet), JsonContext::default());

    assert_eq!(result.status, ReadStatus::DataCollectionError);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].kind, FieldErrorKind::BadFormat);
    assert_eq!(result.errors[0].cell, "B1");
    assert_eq!(result.errors[0].raw.as_deref(), Some("forty"));
    assert_eq!(result.errors[0].data.as_deref(), Some("age"));
    assert_eq!(result.errors[1].kind, FieldErrorKind::MissingMandatory);
    assert_eq!(result.errors[1].cell, "A2");
    assert_eq!(
        result.data,
        json!({"people": [{"name": "Ann"}, {"age": 30}]})
    );
}

#[test]
fn test_record_type_drives_conversion() {
    let mut sheet = Worksheet::new("Orders");
    sheet.set_value(0, 0, CellValue::Number(1001.0));
    sheet.set_value(0, 1, CellValue::Number(45292.0));
    sheet.set_value(0, 2, text("12.50"));
    let definition = Definition::new()
        .with_sheet(
            SheetDef::new("Orders").with_block(
                Block::repeating(range("A1:C1"), Direction::Row, "orders")
                    .with_record_type("Order")
                    .with_cell(CellDef::bound(at("A1"), "id"))
                    .with_cell(CellDef::bound(at("B1"), "placed"))
                    .with_cell(CellDef::bound(at("C1"), "price")),
            ),
        )
        .with_record_type(
            "Order",
            RecordType::default()
                .field("id", DataType::Text)
                .field("placed", DataType::Date)
                .field("price", DataType::Decimal)
                .field("notes", DataType::Text),
        );

    let result = TemplateReader::new(&definition).read_workbook(&single(sheet), JsonContext::default());

    assert!(result.is_success());
    assert_eq!(
        result.data,
        json!({"orders": [{
            "id": "1001",
            "placed": "2024-01-01",
            "price": "12.50",
            "notes": null
        }]})
    );
}

#[test]
fn test_existing_context_types_are_used() {
    let mut sheet = Worksheet::new("S");
    sheet.set_value(0, 0, CellValue::Number(7.0));
    let definition = Definition::new().with_sheet(
        SheetDef::new("S")
            .with_block(Block::simple(range("A1:A1")).with_cell(CellDef::bound(at("A1"), "code"))),
    );

    let ctx = JsonContext::new(json!({"code": "placeholder"}));
    let result = TemplateReader::new(&definition).read_workbook(&single(sheet), ctx);
    assert_eq!(result.data, json!({"code": "7"}));
}

// ═══════════════════════════════════════════════════════════════════════════
// PER-SHEET READING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_read_per_sheet_transposes_results() {
    let definition = Definition::new()
        .with_sheet(
            SheetDef::new("Card").with_block(
                Block::simple(range("A1:B1"))
                    .with_cell(CellDef::bound(at("A1"), "name"))
                    .with_cell(CellDef::bound(at("B1"), "score")),
            ),
        )
        .with_style_sheet(1);

    let mut workbook = Workbook::new();
    let mut first = Worksheet::new("one");
    first.set_value(0, 0, text("Ann"));
    first.set_value(0, 1, CellValue::Number(3.0));
    workbook.add_sheet(first);
    let mut styles = Worksheet::new("Styles");
    styles.set_value(0, 0, text("highlight"));
    workbook.add_sheet(styles);
    let mut third = Worksheet::new("two");
    third.set_value(0, 0, text("Bob"));
    workbook.add_sheet(third);

    let result = TemplateReader::new(&definition).read_workbook_per_sheet(&workbook, JsonContext::default());

    assert!(result.is_success());
    assert_eq!(
        result.data,
        json!({"name": ["Ann", "Bob"], "score": [3, null]})
    );
}

#[test]
fn test_read_per_sheet_reports_sheet_index() {
    let definition = Definition::new().with_sheet(
        SheetDef::new("Card").with_block(
            Block::simple(range("A1:A1")).with_cell(CellDef::bound(at("A1"), "name").mandatory()),
        ),
    );
    let mut workbook = Workbook::new();
    let mut first = Worksheet::new("one");
    first.set_value(0, 0, text("Ann"));
    workbook.add_sheet(first);
    workbook.add_sheet(Worksheet::new("two"));

    let result = TemplateReader::new(&definition).read_workbook_per_sheet(&workbook, JsonContext::default());

    assert_eq!(result.status, ReadStatus::DataCollectionError);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].sheet, 1);
    assert_eq!(result.errors[0].cell, "A1");
}
