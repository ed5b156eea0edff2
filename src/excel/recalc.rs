//! Formula recalculation over the in-memory workbook
//!
//! Formulas are evaluated with xlformula_engine in sheet order, then row
//! order. References resolve to the values cached in the workbook at the
//! time of evaluation, so a formula sees results of formulas evaluated
//! before it in the same pass.
//!
//! The engine computes in single precision: cached results carry about seven
//! significant digits. Excel recomputes full precision on open.

use crate::core::address::{parse_reference, to_reference};
use crate::grid::{CellValue, Workbook};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};
use xlformula_engine::{calculate, parse_formula, types, NoCustomFunction};

/// Ranges wider than this stay unexpanded and evaluate to an error.
const MAX_RANGE_CELLS: u64 = 10_000;

/// Prefix naming another sheet: `Data!` or `'Q1 Data'!`.
const SHEET_PREFIX: &str = r"(?:'[^']+'|[A-Za-z0-9_]+)!";

/// Sheet-qualified references are handed to the engine as `sheet<index>.A1`.
const SHEET_ALIAS: &str = "sheet";

fn range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"((?:{})?)(\$?[A-Za-z]{{1,2}}\$?[0-9]+):(\$?[A-Za-z]{{1,2}}\$?[0-9]+)",
            SHEET_PREFIX
        ))
        .expect("valid range regex")
    })
}

fn sheet_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"({})([A-Za-z]{{1,2}}[0-9]+)\b", SHEET_PREFIX))
            .expect("valid sheet reference regex")
    })
}

/// Rewrite `Data!A1` into `sheet<index>.A1`, a dotted name the engine
/// passes to the resolver untouched. Unknown sheets map to an alias that
/// resolves to `#REF!`.
fn alias_sheet_references(workbook: &Workbook, formula: &str) -> String {
    sheet_reference_regex()
        .replace_all(formula, |caps: &regex::Captures| {
            let name = caps[1].trim_end_matches('!').trim_matches('\'');
            let alias = match workbook.sheet_index(name) {
                Some(index) => format!("{}{}", SHEET_ALIAS, index),
                None => format!("{}_missing", SHEET_ALIAS),
            };
            format!("{}.{}", alias, &caps[2])
        })
        .into_owned()
}

/// `A1:B2` → `A1,B1,A2,B2` so range arguments reach the engine as lists.
fn expand_ranges(formula: &str) -> String {
    range_regex()
        .replace_all(formula, |caps: &regex::Captures| {
            let prefix = &caps[1];
            let (Some((r1, c1)), Some((r2, c2))) =
                (parse_reference(&caps[2]), parse_reference(&caps[3]))
            else {
                return caps[0].to_string();
            };
            let (top, bottom) = (r1.min(r2), r1.max(r2));
            let (left, right) = (c1.min(c2), c1.max(c2));
            let count = (bottom - top + 1) as u64 * (right - left + 1) as u64;
            if count > MAX_RANGE_CELLS {
                return caps[0].to_string();
            }
            let mut cells = Vec::with_capacity(count as usize);
            for row in top..=bottom {
                for col in left..=right {
                    cells.push(format!("{}{}", prefix, to_reference(row, col)));
                }
            }
            cells.join(",")
        })
        .into_owned()
}

fn sheet_from_alias(alias: &str) -> Option<usize> {
    alias
        .to_ascii_lowercase()
        .strip_prefix(SHEET_ALIAS)?
        .parse()
        .ok()
}

fn to_engine(value: &CellValue) -> types::Value {
    match value {
        CellValue::Empty => types::Value::Blank,
        CellValue::Number(n) => types::Value::Number(*n as f32),
        CellValue::Text(s) => types::Value::Text(s.clone()),
        CellValue::Bool(true) => types::Value::Boolean(types::Boolean::True),
        CellValue::Bool(false) => types::Value::Boolean(types::Boolean::False),
        CellValue::Date(d) => types::Value::Number(crate::grid::datetime_to_serial(d) as f32),
        CellValue::Error(_) => types::Value::Error(types::Error::Value),
    }
}

/// Evaluate one formula against the workbook, `sheet` being the sheet it lives on.
fn evaluate(workbook: &Workbook, sheet: usize, formula: &str) -> Result<CellValue, String> {
    let text = alias_sheet_references(workbook, &expand_ranges(&formula.replace('$', "")));
    let resolver = |reference: String| -> types::Value {
        let (target, cell) = match reference.split_once('.') {
            Some((alias, cell)) => {
                match sheet_from_alias(alias).and_then(|i| workbook.sheet(i)) {
                    Some(s) => (s, cell),
                    None => return types::Value::Error(types::Error::Reference),
                }
            }
            None => match workbook.sheet(sheet) {
                Some(s) => (s, reference.as_str()),
                None => return types::Value::Error(types::Error::Reference),
            },
        };
        match parse_reference(cell) {
            Some((row, col)) => to_engine(&target.value(row, col)),
            None => types::Value::Error(types::Error::Value),
        }
    };

    let parsed = parse_formula::parse_string_to_formula(&text, None::<NoCustomFunction>);
    match calculate::calculate_formula(parsed, Some(&resolver)) {
        types::Value::Number(n) => {
            let value = n as f64;
            Ok(CellValue::Number((value * 1e6).round() / 1e6))
        }
        types::Value::Text(s) => Ok(CellValue::Text(s)),
        types::Value::Boolean(types::Boolean::True) => Ok(CellValue::Bool(true)),
        types::Value::Boolean(types::Boolean::False) => Ok(CellValue::Bool(false)),
        types::Value::Blank => Ok(CellValue::Empty),
        types::Value::Error(e) => Err(format!("{:?}", e)),
        other => Err(format!("unexpected result {:?}", other)),
    }
}

/// Recompute every formula cell, caching results as cell values.
///
/// A formula that fails to evaluate keeps its previous cached value.
/// Returns the number of formulas that evaluated successfully.
pub fn recalculate(workbook: &mut Workbook) -> usize {
    let mut evaluated = 0;
    for index in 0..workbook.sheet_count() {
        let formulas: Vec<(u32, u16, String)> = match workbook.sheet(index) {
            Some(sheet) => sheet
                .rows()
                .flat_map(|(r, row)| {
                    row.cells()
                        .filter_map(move |(c, cell)| cell.formula.clone().map(|f| (r, c, f)))
                })
                .collect(),
            None => continue,
        };

        for (row, col, formula) in formulas {
            match evaluate(workbook, index, &formula) {
                Ok(value) => {
                    if let Some(cell) = workbook.sheet_mut(index).and_then(|s| s.cell_mut(row, col)) {
                        cell.value = value;
                    }
                    evaluated += 1;
                }
                Err(e) => warn!(
                    "Formula {} at {} on sheet {} did not evaluate: {}",
                    formula,
                    to_reference(row, col),
                    index,
                    e
                ),
            }
        }
    }
    debug!("Recalculated {} formulas", evaluated);
    evaluated
}
