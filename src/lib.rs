//! Stencil - declarative spreadsheet templates
//!
//! A YAML definition describes where data lives on each sheet of an .xlsx
//! template. The same definition renders a JSON data context into the
//! template and parses a filled workbook back into JSON.
//!
//! # Features
//!
//! - Simple blocks, row/column loop blocks and one level of child blocks
//! - Merges and formulas follow their block when loops grow the sheet
//! - Conditional named styles, optionally scanned from a style sheet
//! - Per-cell typed conversion with collected field errors on parse
//! - One-sheet-per-record rendering and parsing
//!
//! # Example
//!
//! ```no_run
//! use royalbit_stencil::parser::parse_definition;
//! use royalbit_stencil::{JsonContext, TemplateWriter};
//! use std::fs::File;
//! use std::path::Path;
//!
//! let definition = parse_definition(Path::new("invoice.yaml"))?;
//! let data = serde_json::json!({"customer": {"name": "ACME"}, "lines": []});
//! let mut ctx = JsonContext::new(data);
//!
//! let template = File::open("invoice.xlsx")?;
//! let out = File::create("out.xlsx")?;
//! let result = TemplateWriter::new(&definition).write(template, &mut ctx, out);
//! println!("Status: {:?}", result.status);
//! # Ok::<(), royalbit_stencil::error::StencilError>(())
//! ```

pub mod cli;
pub mod core;
pub mod error;
pub mod excel;
pub mod grid;
pub mod parser;
pub mod reader;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use crate::core::{ConverterRegistry, DataContext, JsonContext};
pub use error::{FieldError, FieldErrorKind, StencilError, StencilResult};
pub use reader::{ReadResult, ReadStatus, TemplateReader};
pub use types::{Block, CellDef, Definition, Direction, SheetDef};
pub use writer::{TemplateWriter, WriteResult, WriteStatus};
