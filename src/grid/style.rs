use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Horizontal alignment of cell content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

/// Formatting carried by a cell.
///
/// Colors are `#RRGGBB` strings. The same struct is used for styles declared
/// inline in a definition file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CellStyle {
    pub bold: bool,
    pub italic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<HorizontalAlign>,
    pub border: bool,
}

impl CellStyle {
    pub fn is_default(&self) -> bool {
        *self == CellStyle::default()
    }
}

/// Parse `#RRGGBB` (leading `#` optional) into a packed RGB value.
pub fn parse_color(text: &str) -> Option<u32> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Named styles available to conditional styling during one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleRegistry {
    styles: BTreeMap<String, CellStyle>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, style: CellStyle) {
        self.styles.insert(name.into(), style);
    }

    pub fn get(&self, name: &str) -> Option<&CellStyle> {
        self.styles.get(name)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.styles.keys().map(String::as_str)
    }
}

impl FromIterator<(String, CellStyle)> for StyleRegistry {
    fn from_iter<I: IntoIterator<Item = (String, CellStyle)>>(iter: I) -> Self {
        Self {
            styles: iter.into_iter().collect(),
        }
    }
}
