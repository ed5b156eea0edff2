use crate::core::address::{parse_reference, to_reference};
use crate::grid::{CellRange, CellStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//==============================================================================
// Value types
//==============================================================================

/// Target type of a bound cell.
///
/// Each variant has a short tag usable in definitions (`type: int`) to force
/// a conversion regardless of the bound property's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[serde(alias = "string", alias = "str")]
    Text,
    #[serde(alias = "int", alias = "i32")]
    Integer,
    #[serde(alias = "i64")]
    Long,
    #[serde(alias = "float", alias = "f64", alias = "number")]
    Double,
    #[serde(alias = "bigdecimal")]
    Decimal,
    #[serde(alias = "datetime")]
    Date,
    #[serde(alias = "bool")]
    Boolean,
}

impl DataType {
    pub const ALL: [DataType; 7] = [
        DataType::Text,
        DataType::Integer,
        DataType::Long,
        DataType::Double,
        DataType::Decimal,
        DataType::Date,
        DataType::Boolean,
    ];

    /// Short tag
    pub fn tag(&self) -> &'static str {
        match self {
            DataType::Text => "string",
            DataType::Integer => "int",
            DataType::Long => "long",
            DataType::Double => "double",
            DataType::Decimal => "decimal",
            DataType::Date => "date",
            DataType::Boolean => "bool",
        }
    }

    /// Look up a type by its tag or full name (case-insensitive).
    pub fn from_tag(tag: &str) -> Option<DataType> {
        let lower = tag.trim().to_ascii_lowercase();
        DataType::ALL
            .iter()
            .copied()
            .find(|t| t.tag() == lower || format!("{:?}", t).to_ascii_lowercase() == lower)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

//==============================================================================
// Definition model
//==============================================================================

/// Position of one cell, written as A1 text in definition files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    pub row: u32,
    pub col: u16,
}

impl CellRef {
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// `CellRef::parse("B3")` → row 2, col 1
    pub fn parse(text: &str) -> Option<Self> {
        parse_reference(text).map(|(row, col)| Self { row, col })
    }
}

impl TryFrom<String> for CellRef {
    type Error = String;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        parse_reference(&text)
            .map(|(row, col)| CellRef { row, col })
            .ok_or_else(|| format!("invalid cell reference '{text}'"))
    }
}

impl From<CellRef> for String {
    fn from(cell: CellRef) -> Self {
        to_reference(cell.row, cell.col)
    }
}

/// Loop direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Instances stack downward
    #[default]
    #[serde(alias = "row-wise", alias = "rows")]
    Row,
    /// Instances stack rightward
    #[serde(alias = "column-wise", alias = "columns", alias = "col")]
    Column,
}

/// A style applied to `range` when `when` evaluates to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalStyle {
    pub when: String,
    pub range: CellRange,
    pub style: String,
}

/// End-of-region sentinel for loop blocks on the read path.
///
/// The repeated region ends at the first window whose cell at
/// (`row_offset`, `col_offset`) from the window start equals `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakCondition {
    #[serde(default)]
    pub row_offset: u32,
    #[serde(default)]
    pub col_offset: u16,
    pub value: String,
}

/// A bound cell inside a block. `at` uses sheet coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellDef {
    pub at: CellRef,
    /// Property path resolved against the data context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Literal text, or a formula when it starts with `=`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<ConditionalStyle>,
}

impl CellDef {
    pub fn bound(at: CellRef, data: impl Into<String>) -> Self {
        Self {
            at,
            data: Some(data.into()),
            expr: None,
            data_type: None,
            mandatory: false,
            styles: Vec::new(),
        }
    }

    pub fn expression(at: CellRef, expr: impl Into<String>) -> Self {
        Self {
            expr: Some(expr.into()),
            data: None,
            ..Self::bound(at, String::new())
        }
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn with_style(mut self, style: ConditionalStyle) -> Self {
        self.styles.push(style);
        self
    }
}

/// A rectangular region bound to scalar or repeating data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    pub range: CellRange,
    #[serde(default, rename = "loop")]
    pub looped: bool,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<Block>>,
    #[serde(default)]
    pub cells: Vec<CellDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<ConditionalStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
    #[serde(default, rename = "break", skip_serializing_if = "Option::is_none")]
    pub break_condition: Option<BreakCondition>,
}

impl Block {
    pub fn simple(range: CellRange) -> Self {
        Self {
            range,
            looped: false,
            direction: Direction::Row,
            data: None,
            child: None,
            cells: Vec::new(),
            styles: Vec::new(),
            record_type: None,
            break_condition: None,
        }
    }

    pub fn repeating(range: CellRange, direction: Direction, data: impl Into<String>) -> Self {
        Self {
            looped: true,
            direction,
            data: Some(data.into()),
            ..Self::simple(range)
        }
    }

    pub fn with_cell(mut self, cell: CellDef) -> Self {
        self.cells.push(cell);
        self
    }

    pub fn with_child(mut self, child: Block) -> Self {
        self.child = Some(Box::new(child));
        self
    }

    pub fn with_style(mut self, style: ConditionalStyle) -> Self {
        self.styles.push(style);
        self
    }

    pub fn with_record_type(mut self, name: impl Into<String>) -> Self {
        self.record_type = Some(name.into());
        self
    }

    pub fn with_break(mut self, row_offset: u32, col_offset: u16, value: impl Into<String>) -> Self {
        self.break_condition = Some(BreakCondition {
            row_offset,
            col_offset,
            value: value.into(),
        });
        self
    }
}

/// One template sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SheetDef {
    pub name: String,
    /// Path whose value, when present, renames the sheet on write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl SheetDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            blocks: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, path: impl Into<String>) -> Self {
        self.display_name = Some(path.into());
        self
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }
}

/// Field types of a record materialized per loop iteration on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordType {
    #[serde(default)]
    pub fields: BTreeMap<String, DataType>,
}

impl RecordType {
    pub fn field(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.fields.insert(name.into(), data_type);
        self
    }

    /// A fresh instance: every declared field present and null.
    pub fn instantiate(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .keys()
                .map(|k| (k.clone(), serde_json::Value::Null))
                .collect(),
        )
    }
}

/// A complete template definition.
///
/// Parsed once and shared read-only; render and parse calls keep their
/// transient bookkeeping outside of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Definition {
    #[serde(default)]
    pub sheets: Vec<SheetDef>,
    /// Index of the auxiliary sheet carrying named styles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_sheet: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub styles: BTreeMap<String, CellStyle>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub record_types: BTreeMap<String, RecordType>,
}

impl Definition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet: SheetDef) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub fn with_style_sheet(mut self, index: usize) -> Self {
        self.style_sheet = Some(index);
        self
    }

    pub fn with_record_type(mut self, name: impl Into<String>, record: RecordType) -> Self {
        self.record_types.insert(name.into(), record);
        self
    }

    pub fn with_named_style(mut self, name: impl Into<String>, style: CellStyle) -> Self {
        self.styles.insert(name.into(), style);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_tags() {
        assert_eq!(DataType::from_tag("int"), Some(DataType::Integer));
        assert_eq!(DataType::from_tag("Integer"), Some(DataType::Integer));
        assert_eq!(DataType::from_tag("BOOL"), Some(DataType::Boolean));
        assert_eq!(DataType::from_tag("money"), None);
        for t in DataType::ALL {
            assert_eq!(DataType::from_tag(t.tag()), Some(t));
        }
    }

    #[test]
    fn test_cell_ref_serde() {
        let cell: CellRef = serde_yaml::from_str("B3").unwrap();
        assert_eq!(cell, CellRef::new(2, 1));
        assert_eq!(String::from(cell), "B3");
        assert!(serde_yaml::from_str::<CellRef>("3B").is_err());
    }

    #[test]
    fn test_record_type_instantiate() {
        let record = RecordType::default()
            .field("name", DataType::Text)
            .field("qty", DataType::Integer);
        assert_eq!(
            record.instantiate(),
            serde_json::json!({"name": null, "qty": null})
        );
    }
}
