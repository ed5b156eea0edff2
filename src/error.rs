use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type StencilResult<T> = Result<T, StencilError>;

#[derive(Error, Debug)]
pub enum StencilError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error(transparent)]
    Field(#[from] FieldError),
}

impl StencilError {
    /// True for failures caused by the definition or its settings rather than
    /// by I/O or the data itself.
    pub fn is_setting(&self) -> bool {
        matches!(self, StencilError::Definition(_))
    }
}

/// What went wrong with a single bound cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    UnsupportedType,
    MissingMandatory,
    BadFormat,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FieldErrorKind::UnsupportedType => "unsupported type",
            FieldErrorKind::MissingMandatory => "missing mandatory value",
            FieldErrorKind::BadFormat => "bad format",
        };
        f.write_str(text)
    }
}

/// A field-level conversion or validation failure.
///
/// Carries enough location data (sheet index, A1 reference, raw cell text and
/// the bound data name) to point a user at the offending cell.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{kind} at sheet {sheet} cell {cell}: {message}")]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub sheet: usize,
    pub cell: String,
    pub raw: Option<String>,
    pub data: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(
        kind: FieldErrorKind,
        sheet: usize,
        cell: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sheet,
            cell: cell.into(),
            raw: None,
            data: None,
            message: message.into(),
        }
    }

    pub fn with_raw(mut self, raw: Option<String>) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_data(mut self, data: Option<String>) -> Self {
        self.data = data;
        self
    }
}
