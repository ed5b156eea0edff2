//! In-memory spreadsheet object model
//!
//! The render and parse engines only talk to this model: rows, cells,
//! styles, merged regions and row shifting. Reading and writing the `.xlsx`
//! binary lives in [`crate::excel`].

mod cell;
mod range;
mod sheet;
mod style;
mod workbook;

pub use cell::{datetime_to_serial, serial_to_datetime, Cell, CellValue};
pub use range::CellRange;
pub use sheet::{Row, Worksheet};
pub use style::{parse_color, CellStyle, HorizontalAlign, StyleRegistry};
pub use workbook::Workbook;
