//! Evaluator for parsed tree expressions.
//!
//! Expressions are pure: evaluation never mutates the input value it is given,
//! and carries no state between invocations. Multi-valued results arise only
//! from `[]` fan-out; scalar contexts take the first result.

use serde_json::{Map, Value};

use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::env_error;
use crate::tree::parse::{Expr, PathSeg, Program};

/// Evaluation context: positional arguments bound to `$0..$n`.
pub(crate) struct Ctx<'a> {
    pub args: &'a [Value],
}

/// Returns the JSON type name of a value, for error reporting.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn eval_error(detail: String) -> EnvError {
    env_error!(
        ErrorKind::ExpressionEvalFailed,
        "failed to evaluate tree expression",
        detail
    )
}

/// Runs a program against an input value, applying pipeline stages left to
/// right. Each stage consumes every value produced by the previous one.
pub(crate) fn eval_program(program: &Program, input: Value, ctx: &Ctx<'_>) -> EnvResult<Vec<Value>> {
    let mut values = vec![input];
    for stage in &program.stages {
        let mut next = Vec::new();
        for value in &values {
            next.extend(eval_expr(stage, value, ctx)?);
        }
        values = next;
    }
    Ok(values)
}

/// Runs a program and keeps only the first result, or null when absent.
fn eval_program_single(program: &Program, input: Value, ctx: &Ctx<'_>) -> EnvResult<Value> {
    Ok(eval_program(program, input, ctx)?
        .into_iter()
        .next()
        .unwrap_or(Value::Null))
}

fn eval_expr(expr: &Expr, input: &Value, ctx: &Ctx<'_>) -> EnvResult<Vec<Value>> {
    match expr {
        Expr::Path(segments) => {
            let mut out = Vec::new();
            walk_path(input, segments, &mut out);
            Ok(out)
        }
        Expr::Var(index) => match ctx.args.get(*index) {
            Some(value) => Ok(vec![value.clone()]),
            None => Err(eval_error(format!(
                "expression references ${index} but only {} argument(s) were provided",
                ctx.args.len()
            ))),
        },
        Expr::Literal(value) => Ok(vec![value.clone()]),
        Expr::Assign(path, rhs) => {
            let value = eval_expr_single(rhs, input, ctx)?;
            let mut out = input.clone();
            set_path(&mut out, path, value)?;
            Ok(vec![out])
        }
        Expr::UpdateMap(path, body) => {
            let mut out = input.clone();
            match lookup_path_mut(&mut out, path) {
                // An absent target is a no-op: there is nothing to map over.
                None => {}
                Some(target) => match target {
                    Value::Array(items) => {
                        for item in items.iter_mut() {
                            let mapped = eval_program_single(body, item.clone(), ctx)?;
                            *item = mapped;
                        }
                    }
                    other => {
                        return Err(eval_error(format!(
                            "map(...) target must be an array, got {}",
                            value_type_name(other)
                        )));
                    }
                },
            }
            Ok(vec![out])
        }
        Expr::Del(path) => {
            let mut out = input.clone();
            delete_path(&mut out, path)?;
            Ok(vec![out])
        }
        Expr::Alternative(lhs, rhs) => {
            let present = eval_expr(lhs, input, ctx)?
                .into_iter()
                .filter(|v| !matches!(v, Value::Null | Value::Bool(false)))
                .collect::<Vec<_>>();
            if present.is_empty() {
                eval_expr(rhs, input, ctx)
            } else {
                Ok(present)
            }
        }
        Expr::Add(lhs, rhs) => {
            let left = eval_expr_single(lhs, input, ctx)?;
            let right = eval_expr_single(rhs, input, ctx)?;
            Ok(vec![add_values(left, right)?])
        }
        Expr::Array(elements) => {
            let mut items = Vec::new();
            for element in elements {
                items.extend(eval_program(element, input.clone(), ctx)?);
            }
            Ok(vec![Value::Array(items)])
        }
        Expr::Object(fields) => {
            let mut map = Map::new();
            for (key, value) in fields {
                map.insert(key.clone(), eval_program_single(value, input.clone(), ctx)?);
            }
            Ok(vec![Value::Object(map)])
        }
        Expr::Group(inner) => eval_program(inner, input.clone(), ctx),
    }
}

/// Evaluates an expression in a scalar context: first result, or null.
fn eval_expr_single(expr: &Expr, input: &Value, ctx: &Ctx<'_>) -> EnvResult<Value> {
    Ok(eval_expr(expr, input, ctx)?
        .into_iter()
        .next()
        .unwrap_or(Value::Null))
}

/// `+` with null as the identity on either side, matching the usual
/// tree-query semantics. Mixed types are a reported error, never a coercion.
fn add_values(left: Value, right: Value) -> EnvResult<Value> {
    match (left, right) {
        (Value::Null, v) | (v, Value::Null) => Ok(v),
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                Ok(Value::from(x + y))
            } else {
                let x = a.as_f64().unwrap_or(0.0);
                let y = b.as_f64().unwrap_or(0.0);
                Ok(Value::from(x + y))
            }
        }
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (a, b) => Err(eval_error(format!(
            "cannot add {} and {}",
            value_type_name(&a),
            value_type_name(&b)
        ))),
    }
}

/// Collects every value reachable through a path. Traversal over absent or
/// mismatched structure yields nothing rather than failing.
fn walk_path(value: &Value, segments: &[PathSeg], out: &mut Vec<Value>) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(value.clone());
        return;
    };

    match segment {
        PathSeg::Key(key) => {
            if let Value::Object(map) = value {
                if let Some(child) = map.get(key) {
                    walk_path(child, rest, out);
                }
            }
        }
        PathSeg::Index(index) => {
            if let Value::Array(items) = value {
                if let Some(child) = items.get(*index) {
                    walk_path(child, rest, out);
                }
            }
        }
        PathSeg::IterateAll => match value {
            Value::Array(items) => {
                for child in items {
                    walk_path(child, rest, out);
                }
            }
            Value::Object(map) => {
                for child in map.values() {
                    walk_path(child, rest, out);
                }
            }
            _ => {}
        },
    }
}

/// Writes a value at a path, creating intermediate objects for missing keys.
fn set_path(root: &mut Value, segments: &[PathSeg], value: Value) -> EnvResult<()> {
    let Some((segment, rest)) = segments.split_first() else {
        *root = value;
        return Ok(());
    };

    match segment {
        PathSeg::Key(key) => {
            if root.is_null() {
                *root = Value::Object(Map::new());
            }
            match root {
                Value::Object(map) => {
                    let child = map.entry(key.clone()).or_insert(Value::Null);
                    set_path(child, rest, value)
                }
                other => Err(eval_error(format!(
                    "cannot write key '{key}' into {}",
                    value_type_name(other)
                ))),
            }
        }
        PathSeg::Index(index) => match root {
            Value::Array(items) => match items.get_mut(*index) {
                Some(child) => set_path(child, rest, value),
                None => Err(eval_error(format!(
                    "array index {index} out of bounds for write"
                ))),
            },
            other => Err(eval_error(format!(
                "cannot index {} with [{index}]",
                value_type_name(other)
            ))),
        },
        PathSeg::IterateAll => match root {
            Value::Array(items) => {
                for child in items.iter_mut() {
                    set_path(child, rest, value.clone())?;
                }
                Ok(())
            }
            other => Err(eval_error(format!(
                "cannot iterate {} for write",
                value_type_name(other)
            ))),
        },
    }
}

/// Removes the value at a path. Absent structure along the way is a no-op.
fn delete_path(root: &mut Value, segments: &[PathSeg]) -> EnvResult<()> {
    let Some((segment, rest)) = segments.split_first() else {
        return Err(eval_error("del(...) requires a non-empty path".to_string()));
    };

    if rest.is_empty() {
        return match segment {
            PathSeg::Key(key) => {
                if let Value::Object(map) = root {
                    map.remove(key);
                }
                Ok(())
            }
            PathSeg::Index(index) => {
                if let Value::Array(items) = root {
                    if *index < items.len() {
                        items.remove(*index);
                    }
                }
                Ok(())
            }
            PathSeg::IterateAll => Err(eval_error(
                "del(...) target must be a key or index".to_string(),
            )),
        };
    }

    match segment {
        PathSeg::Key(key) => {
            if let Value::Object(map) = root {
                if let Some(child) = map.get_mut(key) {
                    delete_path(child, rest)?;
                }
            }
            Ok(())
        }
        PathSeg::Index(index) => {
            if let Value::Array(items) = root {
                if let Some(child) = items.get_mut(*index) {
                    delete_path(child, rest)?;
                }
            }
            Ok(())
        }
        PathSeg::IterateAll => {
            if let Value::Array(items) = root {
                for child in items.iter_mut() {
                    delete_path(child, rest)?;
                }
            }
            Ok(())
        }
    }
}

/// Resolves a path to a mutable reference, without creating missing structure.
fn lookup_path_mut<'v>(root: &'v mut Value, segments: &[PathSeg]) -> Option<&'v mut Value> {
    let mut current = root;
    for segment in segments {
        current = match segment {
            PathSeg::Key(key) => match current {
                Value::Object(map) => map.get_mut(key)?,
                _ => return None,
            },
            PathSeg::Index(index) => match current {
                Value::Array(items) => items.get_mut(*index)?,
                _ => return None,
            },
            // Fanning out cannot produce a single mutable location.
            PathSeg::IterateAll => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tree::parse::parse;

    fn run(expr: &str, input: Value, args: &[Value]) -> EnvResult<Vec<Value>> {
        let program = parse(expr)?;
        eval_program(&program, input, &Ctx { args })
    }

    #[test]
    fn test_path_lookup() {
        let results = run(".spec.replicas", json!({"spec": {"replicas": 3}}), &[]).unwrap();
        assert_eq!(results, vec![json!(3)]);
    }

    #[test]
    fn test_absent_path_yields_nothing() {
        let results = run(".spec.missing.deep", json!({"spec": {}}), &[]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_assignment_creates_intermediate_objects() {
        let results = run(".a.b.c = 42", json!({}), &[]).unwrap();
        assert_eq!(results, vec![json!({"a": {"b": {"c": 42}}})]);
    }

    #[test]
    fn test_alternative_on_absent_value() {
        let results = run(
            ".clientConfig.service.path // \"/\"",
            json!({"clientConfig": {}}),
            &[],
        )
        .unwrap();
        assert_eq!(results, vec![json!("/")]);
    }

    #[test]
    fn test_alternative_keeps_present_value() {
        let results = run(
            ".clientConfig.service.path // \"/\"",
            json!({"clientConfig": {"service": {"path": "/validate"}}}),
            &[],
        )
        .unwrap();
        assert_eq!(results, vec![json!("/validate")]);
    }

    #[test]
    fn test_string_concatenation_with_variable() {
        let results = run(
            "$0 + (.path // \"/\")",
            json!({"path": "/mutate"}),
            &[json!("https://host:9443")],
        )
        .unwrap();
        assert_eq!(results, vec![json!("https://host:9443/mutate")]);
    }

    #[test]
    fn test_add_type_mismatch_is_reported() {
        let err = run("$0 + .flag", json!({"flag": true}), &[json!("x")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpressionEvalFailed);
        assert!(err.detail().unwrap().contains("string"));
        assert!(err.detail().unwrap().contains("bool"));
    }

    #[test]
    fn test_collect_urls() {
        let input = json!({
            "webhooks": [
                {"clientConfig": {"url": "https://a/one"}},
                {"clientConfig": {"url": "https://a/two"}},
            ]
        });
        let results = run("[.webhooks[].clientConfig.url]", input, &[]).unwrap();
        assert_eq!(results, vec![json!(["https://a/one", "https://a/two"])]);
    }

    #[test]
    fn test_update_map_rewrites_each_entry() {
        let input = json!({"items": [{"v": 1}, {"v": 2}]});
        let results = run(".items |= map(.v = 0)", input, &[]).unwrap();
        assert_eq!(results, vec![json!({"items": [{"v": 0}, {"v": 0}]})]);
    }

    #[test]
    fn test_update_map_on_absent_target_is_noop() {
        let input = json!({"kind": "ValidatingWebhookConfiguration"});
        let results = run(".webhooks |= map(.v = 0)", input.clone(), &[]).unwrap();
        assert_eq!(results, vec![input]);
    }

    #[test]
    fn test_update_map_on_scalar_is_reported() {
        let err = run(".items |= map(.v = 0)", json!({"items": "nope"}), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpressionEvalFailed);
        assert!(err.detail().unwrap().contains("array"));
    }

    #[test]
    fn test_del_removes_key_and_tolerates_absent() {
        let results = run("del(.a.b)", json!({"a": {"b": 1, "c": 2}}), &[]).unwrap();
        assert_eq!(results, vec![json!({"a": {"c": 2}})]);

        let results = run("del(.a.b)", json!({}), &[]).unwrap();
        assert_eq!(results, vec![json!({})]);
    }

    #[test]
    fn test_missing_argument_is_reported() {
        let err = run(".a = $2", json!({}), &[json!("only-one")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpressionEvalFailed);
        assert!(err.detail().unwrap().contains("$2"));
    }

    #[test]
    fn test_object_literal_overwrite() {
        let results = run(
            ".spec.conversion = {\"strategy\": \"Webhook\", \"reviewVersions\": [\"v1\", \"v1beta1\"]}",
            json!({"spec": {"conversion": {"strategy": "None"}}}),
            &[],
        )
        .unwrap();
        assert_eq!(
            results,
            vec![json!({
                "spec": {
                    "conversion": {
                        "strategy": "Webhook",
                        "reviewVersions": ["v1", "v1beta1"],
                    }
                }
            })]
        );
    }
}
