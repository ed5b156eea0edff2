//! Core building blocks shared by the render and parse engines

pub mod address;
pub mod context;
pub mod convert;
pub mod copier;
pub mod expr;

pub use context::{DataContext, JsonContext};
pub use convert::{Converter, ConverterRegistry};
pub use copier::copy_block;
