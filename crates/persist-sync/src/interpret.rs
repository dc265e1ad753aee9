//! JSON shape interpretation
//!
//! Filling and orphan pruning walk incoming documents the same way:
//!
//! ```text
//! null            ─► nothing
//! [a, b, ...]     ─► each element, independently
//! { ... }         ─► one object representation
//! "x" / 1 / true  ─► one identity reference
//! ```
//!
//! An array element that fails with a data error is reported and left out;
//! every other failure ends the walk.

use crate::error::{FillError, Recover};
use serde_json::{Map, Value};

/// How one non-array, non-null JSON value is read.
#[derive(Debug, Clone, Copy)]
pub enum Representation<'a> {
    /// A scalar naming an object by its identity value.
    Identity(&'a Value),
    /// A map of property values.
    Properties(&'a Map<String, Value>),
}

/// Apply `visit` to every representation in `value`, collecting results.
pub fn interpret<'a, T>(
    value: &'a Value,
    visit: &mut dyn FnMut(Representation<'a>) -> Result<T, FillError>,
) -> Result<Vec<T>, FillError> {
    let mut results = Vec::new();
    walk(value, visit, &mut results)?;
    Ok(results)
}

fn walk<'a, T>(
    value: &'a Value,
    visit: &mut dyn FnMut(Representation<'a>) -> Result<T, FillError>,
    results: &mut Vec<T>,
) -> Result<(), FillError> {
    match value {
        Value::Null => Ok(()),
        Value::Array(elements) => {
            for (index, element) in elements.iter().enumerate() {
                walk(element, visit, results).recover(|err| {
                    tracing::warn!(
                        target: "persist::interpret",
                        index,
                        error = %err,
                        "skipping array element"
                    )
                })?;
            }
            Ok(())
        }
        Value::Object(map) => {
            results.push(visit(Representation::Properties(map))?);
            Ok(())
        }
        scalar => {
            results.push(visit(Representation::Identity(scalar))?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identities(value: &Value) -> Result<Vec<String>, FillError> {
        interpret(value, &mut |representation| match representation {
            Representation::Identity(v) => Ok(v.to_string()),
            Representation::Properties(map) => map
                .get("id")
                .map(|v| v.to_string())
                .ok_or_else(|| FillError::IdentificationValueNotFound { key: "id".into() }),
        })
    }

    #[test]
    fn test_null_is_empty() {
        assert!(identities(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_nested_arrays_flatten() {
        let value = json!([1, [2, {"id": 3}], null]);
        assert_eq!(identities(&value).unwrap(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_element_data_errors_are_skipped() {
        let value = json!([{"id": 1}, {"name": "no id"}, {"id": 2}]);
        assert_eq!(identities(&value).unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn test_top_level_error_propagates() {
        let value = json!({"name": "no id"});
        assert!(identities(&value).is_err());
    }

    #[test]
    fn test_non_data_errors_abort_arrays() {
        let value = json!([1, 2]);
        let result: Result<Vec<()>, _> = interpret(&value, &mut |_| {
            Err(FillError::TooManyValues("owner".into()))
        });
        assert!(matches!(result, Err(FillError::TooManyValues(_))));
    }
}
