//! CLI integration tests
//!
//! Runs the `stencil` binary against definitions and templates written into a
//! temporary directory.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use predicates::prelude::*;
use royalbit_stencil::excel::{ExcelExporter, ExcelImporter};
use royalbit_stencil::grid::{CellValue, Workbook, Worksheet};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const DEFINITION: &str = r#"
sheets:
  - name: Team
    blocks:
      - range: A1:A1
        cells:
          - { at: A1, data: team }
      - range: A3:B3
        loop: true
        data: members
        record_type: Member
        cells:
          - { at: A3, data: name, mandatory: true }
          - { at: B3, data: age }
styles:
  senior: { bold: true }
record_types:
  Member:
    fields: { name: string, age: int }
"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("team.yaml"), DEFINITION).unwrap();

        let mut sheet = Worksheet::new("Team");
        sheet.set_value(1, 0, CellValue::Text("Name".into()));
        sheet.set_value(1, 1, CellValue::Text("Age".into()));
        let mut workbook = Workbook::new();
        workbook.add_sheet(sheet);
        ExcelExporter::export_path(&workbook, &dir.path().join("template.xlsx")).unwrap();

        fs::write(
            dir.path().join("data.json"),
            r#"{"team": "Platform", "members": [{"name": "Ann", "age": 41}, {"name": "Bob", "age": 29}]}"#,
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn stencil() -> Command {
    Command::cargo_bin("stencil").unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_help() {
    stencil()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("COMMANDS"))
        .stdout(predicate::str::contains("render"));
}

#[test]
fn test_cli_version() {
    stencil()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stencil"));
}

// ═══════════════════════════════════════════════════════════════════════════
// RENDER / PARSE / INSPECT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_render_writes_workbook() {
    let fx = Fixture::new();
    let output = fx.path("out.xlsx");

    stencil()
        .arg("render")
        .arg(fx.path("team.yaml"))
        .arg(fx.path("template.xlsx"))
        .arg(fx.path("data.json"))
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Render complete"));

    let workbook = ExcelImporter::import_path(&output).unwrap();
    let sheet = workbook.sheet(0).unwrap();
    assert_eq!(sheet.value(0, 0), CellValue::Text("Platform".into()));
    assert_eq!(sheet.value(2, 0), CellValue::Text("Ann".into()));
    assert_eq!(sheet.value(3, 0), CellValue::Text("Bob".into()));
}

#[test]
fn test_render_then_parse_to_stdout() {
    let fx = Fixture::new();
    let output = fx.path("out.xlsx");
    stencil()
        .args(["render"])
        .arg(fx.path("team.yaml"))
        .arg(fx.path("template.xlsx"))
        .arg(fx.path("data.json"))
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    stencil()
        .arg("parse")
        .arg(fx.path("team.yaml"))
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Platform\""))
        .stdout(predicate::str::contains("\"age\": 29"));
}

#[test]
fn test_parse_writes_json_file() {
    let fx = Fixture::new();
    let rendered = fx.path("out.xlsx");
    stencil()
        .arg("render")
        .arg(fx.path("team.yaml"))
        .arg(fx.path("template.xlsx"))
        .arg(fx.path("data.json"))
        .arg("-o")
        .arg(&rendered)
        .assert()
        .success();

    let json_path = fx.path("parsed.json");
    stencil()
        .arg("parse")
        .arg(fx.path("team.yaml"))
        .arg(&rendered)
        .arg("--output")
        .arg(&json_path)
        .assert()
        .success();

    let parsed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!({
            "team": "Platform",
            "members": [{"name": "Ann", "age": 41}, {"name": "Bob", "age": 29}]
        })
    );
}

#[test]
fn test_parse_reports_field_errors() {
    let fx = Fixture::new();
    let mut sheet = Worksheet::new("Team");
    sheet.set_value(0, 0, CellValue::Text("Platform".into()));
    sheet.set_value(2, 0, CellValue::Text("Ann".into()));
    sheet.set_value(2, 1, CellValue::Text("old".into()));
    let mut workbook = Workbook::new();
    workbook.add_sheet(sheet);
    let input = fx.path("filled.xlsx");
    ExcelExporter::export_path(&workbook, &input).unwrap();

    stencil()
        .arg("parse")
        .arg(fx.path("team.yaml"))
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("field error"))
        .stderr(predicate::str::contains("B3"));
}

#[test]
fn test_render_per_sheet_requires_array() {
    let fx = Fixture::new();
    stencil()
        .arg("render")
        .arg(fx.path("team.yaml"))
        .arg(fx.path("template.xlsx"))
        .arg(fx.path("data.json"))
        .arg("-o")
        .arg(fx.path("out.xlsx"))
        .arg("--per-sheet")
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON array"));
}

#[test]
fn test_inspect_valid_definition() {
    let fx = Fixture::new();
    stencil()
        .arg("inspect")
        .arg(fx.path("team.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Definition is valid"))
        .stdout(predicate::str::contains("loop (rows)"))
        .stdout(predicate::str::contains("Member"));
}

#[test]
fn test_inspect_invalid_definition() {
    let fx = Fixture::new();
    let path = fx.path("broken.yaml");
    fs::write(
        &path,
        "sheets:\n  - name: S\n    blocks:\n      - range: A1:A1\n        loop: true\n",
    )
    .unwrap();

    stencil()
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Invalid definition"));
}

#[test]
fn test_missing_definition_file() {
    let fx = Fixture::new();
    stencil()
        .arg("inspect")
        .arg(fx.path("nope.yaml"))
        .assert()
        .failure();
}

#[test]
fn test_inspect_bundled_demo() {
    stencil()
        .arg("inspect")
        .arg(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/invoice.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Definition is valid"))
        .stdout(predicate::str::contains("Line"));
}
