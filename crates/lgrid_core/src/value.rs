use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Underlying data type of a column's cells.
///
/// Drives default formatting and which calculations make sense for the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellValueType {
    #[default]
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
}

impl CellValueType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Time)
    }

    /// Text alignment used by the renderer for cells of this type.
    pub fn alignment(&self) -> &'static str {
        if self.is_numeric() { "end" } else { "start" }
    }
}

/// Cell value.
///
/// Own enum instead of `serde_json::Value` so sorting is type-aware and
/// numeric calculations don't go through string parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
        }
    }

    /// Formats the value for a cell of the given type.
    ///
    /// `format` overrides the default pattern: a chrono pattern for temporal
    /// values, or the number of decimals (`"0"`, `"2"`, ...) for numbers.
    pub fn format_for(&self, value_type: CellValueType, format: Option<&str>) -> String {
        match (self, value_type) {
            (Value::Null, _) => String::new(),
            (Value::Int(_) | Value::Float(_), CellValueType::Decimal | CellValueType::Integer) => {
                let decimals = format
                    .and_then(|f| f.parse::<usize>().ok())
                    .unwrap_or(if value_type == CellValueType::Decimal { 2 } else { 0 });
                let number = self.as_f64().unwrap_or_default();
                format!("{:.*}", decimals, number)
            }
            (Value::DateTime(dt), _) => dt.format(format.unwrap_or("%Y-%m-%d %H:%M")).to_string(),
            (Value::Date(d), _) => d.format(format.unwrap_or("%Y-%m-%d")).to_string(),
            (Value::Time(t), _) => t.format(format.unwrap_or("%H:%M")).to_string(),
            _ => self.as_display_string(),
        }
    }

    /// Case-insensitive substring match against the display form.
    pub fn contains_text(&self, needle: &str) -> bool {
        self.as_display_string()
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }

    fn type_order(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::DateTime(_) => 4,
            Value::Date(_) => 5,
            Value::Time(_) => 6,
            Value::Null => 7,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_display_string())
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;

        match (self, other) {
            // Nulls last
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,

            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Time(a), Time(b)) => a.cmp(b),

            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),

            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_sort_last() {
        let mut values = vec![Value::Null, Value::Int(3), Value::Float(1.5), Value::Int(2)];
        values.sort();
        assert_eq!(
            values,
            vec![Value::Float(1.5), Value::Int(2), Value::Int(3), Value::Null]
        );
    }

    #[test]
    fn decimal_formatting_uses_override() {
        let v = Value::Float(12.3456);
        assert_eq!(v.format_for(CellValueType::Decimal, None), "12.35");
        assert_eq!(v.format_for(CellValueType::Decimal, Some("1")), "12.3");
        assert_eq!(Value::Int(7).format_for(CellValueType::Integer, None), "7");
    }

    #[test]
    fn date_formatting_defaults() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(Value::Date(d).format_for(CellValueType::Date, None), "2024-03-09");
        assert_eq!(
            Value::Date(d).format_for(CellValueType::Date, Some("%d/%m/%Y")),
            "09/03/2024"
        );
    }

    #[test]
    fn contains_text_ignores_case() {
        assert!(Value::from("Active").contains_text("act"));
        assert!(!Value::Null.contains_text("a"));
    }
}
