use serde::{Deserialize, Serialize};

use crate::Value;

/// Filter value attached to one column.
///
/// The variant used depends on the column type: text columns usually carry
/// `Contains`, numeric and date columns `Range`, enum-like columns `OneOf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum ColumnFilter {
    Equals(Value),
    NotEquals(Value),
    Contains(String),
    StartsWith(String),
    /// Inclusive bounds; a missing bound is open.
    Range {
        from: Option<Value>,
        to: Option<Value>,
    },
    OneOf(Vec<Value>),
    IsEmpty,
    IsNotEmpty,
}

impl ColumnFilter {
    /// A filter with no effective constraint (empty text, open range, empty set).
    pub fn is_blank(&self) -> bool {
        match self {
            ColumnFilter::Contains(s) | ColumnFilter::StartsWith(s) => s.trim().is_empty(),
            ColumnFilter::Range { from, to } => from.is_none() && to.is_none(),
            ColumnFilter::OneOf(values) => values.is_empty(),
            _ => false,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ColumnFilter::Equals(expected) => value == expected || loose_eq(value, expected),
            ColumnFilter::NotEquals(expected) => !(value == expected || loose_eq(value, expected)),
            ColumnFilter::Contains(needle) => value.contains_text(needle),
            ColumnFilter::StartsWith(prefix) => value
                .as_display_string()
                .to_lowercase()
                .starts_with(&prefix.to_lowercase()),
            ColumnFilter::Range { from, to } => {
                if value.is_null() {
                    return false;
                }
                let above = from.as_ref().is_none_or(|from| value >= from);
                let below = to.as_ref().is_none_or(|to| value <= to);
                above && below
            }
            ColumnFilter::OneOf(values) => values.iter().any(|v| v == value || loose_eq(value, v)),
            ColumnFilter::IsEmpty => match value {
                Value::Null => true,
                Value::Text(s) => s.is_empty(),
                _ => false,
            },
            ColumnFilter::IsNotEmpty => match value {
                Value::Null => false,
                Value::Text(s) => !s.is_empty(),
                _ => true,
            },
        }
    }
}

// Int/Float compare by numeric value.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// One clause of a model filter: a column's filter bound to its field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub column_key: String,
    pub field: String,
    pub filter: ColumnFilter,
}

/// Conjunction of active column filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelFilter {
    pub clauses: Vec<FilterClause>,
}

impl ModelFilter {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn touches(&self, column_key: &str) -> bool {
        self.clauses.iter().any(|c| c.column_key == column_key)
    }

    /// Evaluates the conjunction using `value_of(field)` to read the item.
    pub fn matches(&self, mut value_of: impl FnMut(&str) -> Value) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.filter.matches(&value_of(&clause.field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive_and_open_ended() {
        let filter = ColumnFilter::Range {
            from: Some(Value::Int(10)),
            to: None,
        };
        assert!(filter.matches(&Value::Int(10)));
        assert!(filter.matches(&Value::Float(99.5)));
        assert!(!filter.matches(&Value::Int(9)));
        assert!(!filter.matches(&Value::Null));
    }

    #[test]
    fn equals_promotes_numbers() {
        assert!(ColumnFilter::Equals(Value::Int(2)).matches(&Value::Float(2.0)));
        assert!(ColumnFilter::NotEquals(Value::from("a")).matches(&Value::from("b")));
    }

    #[test]
    fn blank_filters_are_detected() {
        assert!(ColumnFilter::Contains("  ".into()).is_blank());
        assert!(ColumnFilter::OneOf(vec![]).is_blank());
        assert!(!ColumnFilter::IsEmpty.is_blank());
    }

    #[test]
    fn model_filter_is_a_conjunction() {
        let filter = ModelFilter {
            clauses: vec![
                FilterClause {
                    column_key: "Status".into(),
                    field: "Status".into(),
                    filter: ColumnFilter::Equals(Value::from("Active")),
                },
                FilterClause {
                    column_key: "Name".into(),
                    field: "Name".into(),
                    filter: ColumnFilter::StartsWith("a".into()),
                },
            ],
        };

        let row = |status: &'static str, name: &'static str| {
            move |field: &str| match field {
                "Status" => Value::from(status),
                _ => Value::from(name),
            }
        };

        assert!(filter.matches(row("Active", "Ada")));
        assert!(!filter.matches(row("Active", "Bob")));
        assert!(!filter.matches(row("Inactive", "Ada")));
    }
}
