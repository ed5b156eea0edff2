//! Workbook binary I/O
//!
//! - Import: .xlsx → in-memory [`Workbook`](crate::grid::Workbook) (values, formulas, merges,
//!   formats, row heights, column widths)
//! - Export: in-memory workbook → .xlsx with formats, merges and cached formula results
//! - Recalc: evaluate formulas so exported files carry current results

mod exporter;
mod importer;
mod layout;
pub mod recalc;

pub use exporter::ExcelExporter;
pub use importer::ExcelImporter;
pub use recalc::recalculate;
