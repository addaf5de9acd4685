//! Typed query and in-place transformation over untyped manifest trees.
//!
//! Manifests flow through the bootstrap as [`serde_json::Value`] trees:
//! string-keyed maps, ordered arrays, and scalars. This module provides the
//! expression engine used to rewrite webhook client-configs and to pull typed
//! values back out:
//!
//! ```
//! use serde_json::json;
//!
//! let mut obj = json!({"spec": {}});
//! kenv::tree::transform(&mut obj, ".spec.replicas = $0", &[json!(3)]).unwrap();
//!
//! let replicas: i64 = kenv::tree::query(&obj, ".spec.replicas", &[]).unwrap();
//! assert_eq!(replicas, 3);
//! ```
//!
//! Expressions are pure functions of the input tree plus positional `$n`
//! arguments; there is no state between invocations. A query that finds no
//! value is not an error: it yields the type's zero value. A query that finds
//! a value of the wrong type is always a reported error, never a coercion.

mod eval;
mod parse;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::env_error;
use eval::{eval_program, value_type_name, Ctx};

/// A Rust type that a tree value can be checked against.
///
/// `default()` is the zero value returned when a query finds nothing.
pub trait TreeValue: Sized + Default {
    /// Type name used in mismatch errors.
    fn type_name() -> &'static str;

    /// Strict conversion: `None` on any type mismatch.
    fn from_value(value: &Value) -> Option<Self>;
}

impl TreeValue for String {
    fn type_name() -> &'static str {
        "string"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl TreeValue for bool {
    fn type_name() -> &'static str {
        "bool"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl TreeValue for i64 {
    fn type_name() -> &'static str {
        "integer"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl TreeValue for u64 {
    fn type_name() -> &'static str {
        "unsigned integer"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

impl TreeValue for f64 {
    fn type_name() -> &'static str {
        "number"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

/// Untyped escape hatch: accepts any value.
impl TreeValue for Value {
    fn type_name() -> &'static str {
        "any"
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

/// Applies a transformation expression to a tree, mutating it in place.
///
/// The expression must produce an object (the transformed tree); producing
/// nothing leaves the tree untouched. Positional arguments bind to `$0..$n`.
pub fn transform(tree: &mut Value, expression: &str, args: &[Value]) -> EnvResult<()> {
    let program = parse::parse(expression)?;
    let results = eval_program(&program, tree.clone(), &Ctx { args })?;

    let Some(result) = results.into_iter().next() else {
        return Ok(());
    };

    match result {
        Value::Object(_) => {
            *tree = result;
            Ok(())
        }
        other => Err(env_error!(
            ErrorKind::ExpressionTypeMismatch,
            "transform result has unexpected type",
            format!("expected object, got {}", value_type_name(&other))
        )),
    }
}

/// Executes a query expression and asserts the single result is of type `T`.
///
/// An absent result yields `T::default()` with no error. A type mismatch is a
/// reported error naming expected vs actual type.
pub fn query<T: TreeValue>(tree: &Value, expression: &str, args: &[Value]) -> EnvResult<T> {
    let program = parse::parse(expression)?;
    let results = eval_program(&program, tree.clone(), &Ctx { args })?;

    let Some(result) = results.into_iter().next() else {
        return Ok(T::default());
    };
    if result.is_null() {
        return Ok(T::default());
    }

    T::from_value(&result).ok_or_else(|| {
        env_error!(
            ErrorKind::ExpressionTypeMismatch,
            "query result has unexpected type",
            format!(
                "expected {}, got {}",
                T::type_name(),
                value_type_name(&result)
            )
        )
    })
}

/// Executes a query expression and returns a typed slice.
///
/// The result must be an array (or absent, yielding an empty vector); every
/// element is asserted to be `T`, aborting on the first offending index.
pub fn query_slice<T: TreeValue>(tree: &Value, expression: &str, args: &[Value]) -> EnvResult<Vec<T>> {
    let result: Value = query(tree, expression, args)?;
    if result.is_null() {
        return Ok(Vec::new());
    }

    let items = match result {
        Value::Array(items) => items,
        other => {
            return Err(env_error!(
                ErrorKind::ExpressionTypeMismatch,
                "query result has unexpected type",
                format!("expected array, got {}", value_type_name(&other))
            ));
        }
    };

    let mut typed = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let value = T::from_value(item).ok_or_else(|| {
            env_error!(
                ErrorKind::ExpressionTypeMismatch,
                "query result element has unexpected type",
                format!(
                    "expected {} at index {index}, got {}",
                    T::type_name(),
                    value_type_name(item)
                )
            )
        })?;
        typed.push(value);
    }

    Ok(typed)
}

/// Executes a query expression and returns a typed map.
///
/// The result must be an object (or absent, yielding an empty map); every
/// value is asserted to be `V`, aborting on the first offending key.
pub fn query_map<V: TreeValue>(
    tree: &Value,
    expression: &str,
    args: &[Value],
) -> EnvResult<BTreeMap<String, V>> {
    let result: Value = query(tree, expression, args)?;
    if result.is_null() {
        return Ok(BTreeMap::new());
    }

    let entries = match result {
        Value::Object(entries) => entries,
        other => {
            return Err(env_error!(
                ErrorKind::ExpressionTypeMismatch,
                "query result has unexpected type",
                format!("expected object, got {}", value_type_name(&other))
            ));
        }
    };

    let mut typed = BTreeMap::new();
    for (key, item) in &entries {
        let value = V::from_value(item).ok_or_else(|| {
            env_error!(
                ErrorKind::ExpressionTypeMismatch,
                "query result value has unexpected type",
                format!(
                    "expected {} for key '{key}', got {}",
                    V::type_name(),
                    value_type_name(item)
                )
            )
        })?;
        typed.insert(key.clone(), value);
    }

    Ok(typed)
}
