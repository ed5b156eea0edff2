//! Data conversion registry
//!
//! Turns raw cell values into typed JSON values on the read path, enforcing
//! the `mandatory` flag. Every failure is a [`FieldError`] tagged with the
//! sheet index, cell reference and raw value.

use crate::error::{FieldError, FieldErrorKind};
use crate::grid::{serial_to_datetime, CellValue};
use crate::types::{CellDef, DataType};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde_json::{Number, Value};
use std::collections::HashMap;

/// Coerces one non-blank raw value into a typed value.
///
/// The error string becomes the message of a `BadFormat` field error.
pub trait Converter: Send + Sync {
    fn convert(&self, raw: &CellValue) -> Result<Value, String>;
}

fn describe(raw: &CellValue) -> String {
    match raw {
        CellValue::Text(s) => format!("text '{}'", s),
        other => format!("'{}'", other),
    }
}

fn to_number(raw: &CellValue) -> Result<f64, String> {
    match raw {
        CellValue::Number(n) => Ok(*n),
        CellValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        CellValue::Text(s) => s
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| format!("{} is not a number", describe(raw))),
        other => Err(format!("{} is not a number", describe(other))),
    }
}

fn to_whole(raw: &CellValue) -> Result<i64, String> {
    let n = to_number(raw)?;
    if n.fract() != 0.0 || !n.is_finite() {
        return Err(format!("{} is not a whole number", describe(raw)));
    }
    if n < i64::MIN as f64 || n > i64::MAX as f64 {
        return Err(format!("{} is out of range", describe(raw)));
    }
    Ok(n as i64)
}

pub struct TextConverter;

impl Converter for TextConverter {
    fn convert(&self, raw: &CellValue) -> Result<Value, String> {
        Ok(Value::String(raw.to_string()))
    }
}

pub struct IntegerConverter;

impl Converter for IntegerConverter {
    fn convert(&self, raw: &CellValue) -> Result<Value, String> {
        let n = to_whole(raw)?;
        i32::try_from(n)
            .map(|v| Value::Number(v.into()))
            .map_err(|_| format!("{} does not fit a 32-bit integer", describe(raw)))
    }
}

pub struct LongConverter;

impl Converter for LongConverter {
    fn convert(&self, raw: &CellValue) -> Result<Value, String> {
        to_whole(raw).map(|v| Value::Number(v.into()))
    }
}

pub struct DoubleConverter;

impl Converter for DoubleConverter {
    fn convert(&self, raw: &CellValue) -> Result<Value, String> {
        let n = to_number(raw)?;
        Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| format!("{} is not a finite number", describe(raw)))
    }
}

/// Decimals are carried as strings so no digits are lost.
pub struct DecimalConverter;

impl DecimalConverter {
    fn is_decimal(text: &str) -> bool {
        let body = text.strip_prefix(['-', '+']).unwrap_or(text);
        let mut parts = body.splitn(2, '.');
        let whole = parts.next().unwrap_or("");
        let frac = parts.next();
        let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        match frac {
            Some(f) => (!whole.is_empty() || !f.is_empty()) && digits(whole) && digits(f),
            None => !whole.is_empty() && digits(whole),
        }
    }
}

impl Converter for DecimalConverter {
    fn convert(&self, raw: &CellValue) -> Result<Value, String> {
        let text = match raw {
            CellValue::Number(n) => format!("{}", n),
            CellValue::Text(s) => s.trim().replace(',', ""),
            other => return Err(format!("{} is not a decimal", describe(other))),
        };
        if Self::is_decimal(&text) {
            Ok(Value::String(text))
        } else {
            Err(format!("{} is not a decimal", describe(raw)))
        }
    }
}

/// Accepts date cells, serial numbers and ISO text.
pub struct DateConverter;

impl DateConverter {
    fn render(value: NaiveDateTime) -> Value {
        let text = if value.time().num_seconds_from_midnight() == 0 {
            value.format("%Y-%m-%d").to_string()
        } else {
            value.format("%Y-%m-%dT%H:%M:%S").to_string()
        };
        Value::String(text)
    }

    pub fn parse_text(text: &str) -> Option<NaiveDateTime> {
        let text = text.trim();
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .or_else(|_| NaiveDate::parse_from_str(text, "%Y/%m/%d"))
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }
}

impl Converter for DateConverter {
    fn convert(&self, raw: &CellValue) -> Result<Value, String> {
        let parsed = match raw {
            CellValue::Date(d) => Some(*d),
            CellValue::Number(n) => serial_to_datetime(*n),
            CellValue::Text(s) => Self::parse_text(s),
            _ => None,
        };
        parsed
            .map(Self::render)
            .ok_or_else(|| format!("{} is not a date", describe(raw)))
    }
}

pub struct BooleanConverter;

impl Converter for BooleanConverter {
    fn convert(&self, raw: &CellValue) -> Result<Value, String> {
        match raw {
            CellValue::Bool(b) => Ok(Value::Bool(*b)),
            CellValue::Number(n) if *n == 0.0 || *n == 1.0 => Ok(Value::Bool(*n == 1.0)),
            CellValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "n" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("{} is not a boolean", describe(raw))),
            },
            other => Err(format!("{} is not a boolean", describe(other))),
        }
    }
}

/// Where a conversion happens, for error reporting.
#[derive(Debug, Clone, Copy)]
pub struct Location<'a> {
    pub sheet: usize,
    pub cell: &'a str,
}

/// Converters keyed by target type.
pub struct ConverterRegistry {
    converters: HashMap<DataType, Box<dyn Converter>>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::empty()
            .with_converter(DataType::Text, TextConverter)
            .with_converter(DataType::Integer, IntegerConverter)
            .with_converter(DataType::Long, LongConverter)
            .with_converter(DataType::Double, DoubleConverter)
            .with_converter(DataType::Decimal, DecimalConverter)
            .with_converter(DataType::Date, DateConverter)
            .with_converter(DataType::Boolean, BooleanConverter)
    }
}

impl ConverterRegistry {
    /// A registry with no converters at all.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    pub fn with_converter(mut self, data_type: DataType, converter: impl Converter + 'static) -> Self {
        self.converters.insert(data_type, Box::new(converter));
        self
    }

    pub fn supports(&self, data_type: DataType) -> bool {
        self.converters.contains_key(&data_type)
    }

    /// Convert one raw cell value for the bound cell `def`.
    ///
    /// Blank input yields `null` unless the cell is mandatory.
    pub fn convert(
        &self,
        raw: &CellValue,
        at: Location<'_>,
        def: &CellDef,
        target: DataType,
    ) -> Result<Value, FieldError> {
        let raw_text = (!matches!(raw, CellValue::Empty)).then(|| raw.to_string());
        let fail = |kind: FieldErrorKind, message: String| {
            FieldError::new(kind, at.sheet, at.cell, message)
                .with_raw(raw_text.clone())
                .with_data(def.data.clone())
        };

        let Some(converter) = self.converters.get(&target) else {
            return Err(fail(
                FieldErrorKind::UnsupportedType,
                format!("no converter registered for type '{}'", target),
            ));
        };
        if raw.is_blank() {
            if def.mandatory {
                return Err(fail(
                    FieldErrorKind::MissingMandatory,
                    "a value is required".to_string(),
                ));
            }
            return Ok(Value::Null);
        }
        converter
            .convert(raw)
            .map_err(|message| fail(FieldErrorKind::BadFormat, message))
    }
}
