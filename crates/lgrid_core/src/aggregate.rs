use indexmap::IndexMap;

use crate::{CalculationOption, CalculationType, Value};

/// Computes one aggregate over a column's values. Nulls are ignored.
pub fn calculate<'a>(calculation: CalculationType, values: impl Iterator<Item = &'a Value>) -> Value {
    let values: Vec<&Value> = values.filter(|v| !v.is_null()).collect();

    match calculation {
        CalculationType::None => Value::Null,
        CalculationType::Count => Value::Int(values.len() as i64),
        CalculationType::Sum => sum(&values),
        CalculationType::Average => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        CalculationType::Min => values.iter().min().map(|v| (*v).clone()).unwrap_or_default(),
        CalculationType::Max => values.iter().max().map(|v| (*v).clone()).unwrap_or_default(),
    }
}

// Stays integral while every input is an integer.
fn sum(values: &[&Value]) -> Value {
    let mut int_total: i64 = 0;
    let mut float_total: f64 = 0.0;
    let mut integral = true;
    let mut any = false;

    for value in values {
        match value {
            Value::Int(i) => {
                any = true;
                match int_total.checked_add(*i) {
                    Some(total) => int_total = total,
                    None => integral = false,
                }
                float_total += *i as f64;
            }
            Value::Float(f) => {
                any = true;
                integral = false;
                float_total += f;
            }
            _ => {}
        }
    }

    match (any, integral) {
        (false, _) => Value::Null,
        (true, true) => Value::Int(int_total),
        (true, false) => Value::Float(float_total),
    }
}

/// Evaluates every requested calculation over `rows`, keyed by column key.
pub fn calculate_all<T>(
    rows: &[&T],
    options: &[CalculationOption],
    value_of: impl Fn(&T, &str) -> Value,
) -> IndexMap<String, Value> {
    options
        .iter()
        .map(|option| {
            let values: Vec<Value> = rows
                .iter()
                .map(|row| value_of(row, &option.field))
                .collect();
            (
                option.column_key.clone(),
                calculate(option.calculation, values.iter()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_sum_stays_integral() {
        let values = [Value::Int(2), Value::Null, Value::Int(5)];
        assert_eq!(calculate(CalculationType::Sum, values.iter()), Value::Int(7));
    }

    #[test]
    fn mixed_sum_promotes_to_float() {
        let values = [Value::Int(2), Value::Float(0.5)];
        assert_eq!(calculate(CalculationType::Sum, values.iter()), Value::Float(2.5));
    }

    #[test]
    fn average_and_count_skip_nulls() {
        let values = [Value::Int(2), Value::Null, Value::Int(4)];
        assert_eq!(calculate(CalculationType::Average, values.iter()), Value::Float(3.0));
        assert_eq!(calculate(CalculationType::Count, values.iter()), Value::Int(2));
    }

    #[test]
    fn min_max_on_text() {
        let values = [Value::from("pear"), Value::from("apple"), Value::Null];
        assert_eq!(calculate(CalculationType::Min, values.iter()), Value::from("apple"));
        assert_eq!(calculate(CalculationType::Max, values.iter()), Value::from("pear"));
    }

    #[test]
    fn empty_input_yields_null() {
        let values: [Value; 0] = [];
        assert_eq!(calculate(CalculationType::Sum, values.iter()), Value::Null);
        assert_eq!(calculate(CalculationType::Average, values.iter()), Value::Null);
        assert_eq!(calculate(CalculationType::Max, values.iter()), Value::Null);
    }
}
