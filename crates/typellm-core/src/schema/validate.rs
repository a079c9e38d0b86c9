//! Runtime validation of JSON values against a schema tree
//!
//! Parsing returns the validated value with defaults filled in, unknown object
//! keys handled per the object's [`UnknownKeys`] policy and transforms applied.
//! All issues found in one pass are reported together, each with its path.

use serde_json::{Map, Value};

use super::{Schema, SchemaDef, UnknownKeys};
use crate::error::{PathSegment, ValidationError};

struct Invalid;

type Step = Result<Option<Value>, Invalid>;

fn received(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => false,
    }
}

fn looks_like_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let digits = |range: std::ops::Range<usize>| -> Option<u32> {
        let part = s.get(range)?;
        if part.bytes().all(|b| b.is_ascii_digit()) {
            part.parse().ok()
        } else {
            None
        }
    };
    matches!(
        (digits(0..4), digits(5..7), digits(8..10)),
        (Some(_), Some(1..=12), Some(1..=31))
    )
}

impl Schema {
    /// Validate `value`, returning the parsed value or every issue found
    pub fn parse(&self, value: &Value) -> Result<Value, ValidationError> {
        let mut issues = ValidationError::default();
        let mut path = Vec::new();
        match self.run(Some(value), &mut path, &mut issues) {
            Ok(parsed) if issues.is_empty() => Ok(parsed.unwrap_or(Value::Null)),
            _ => Err(issues),
        }
    }

    /// Whether `value` passes validation
    pub fn accepts(&self, value: &Value) -> bool {
        self.parse(value).is_ok()
    }

    fn run(
        &self,
        value: Option<&Value>,
        path: &mut Vec<PathSegment>,
        issues: &mut ValidationError,
    ) -> Step {
        match self.def() {
            SchemaDef::Optional(inner) => match value {
                None => Ok(None),
                Some(v) => inner.run(Some(v), path, issues),
            },
            SchemaDef::Nullable(inner) => match value {
                Some(Value::Null) => Ok(Some(Value::Null)),
                other => inner.run(other, path, issues),
            },
            SchemaDef::Default {
                inner,
                value: default,
            } => inner.run(value.or(Some(default)), path, issues),
            SchemaDef::Catch {
                inner,
                value: fallback,
            } => {
                let mut scratch = ValidationError::default();
                match inner.run(value, path, &mut scratch) {
                    Ok(parsed) if scratch.is_empty() => Ok(parsed),
                    _ => Ok(Some(fallback.clone())),
                }
            }
            SchemaDef::Branded { inner, .. } | SchemaDef::Promise(inner) => {
                inner.run(value, path, issues)
            }
            SchemaDef::Lazy(getter) => getter().run(value, path, issues),
            SchemaDef::Pipeline { input, output } => {
                let intermediate = input.run(value, path, issues)?;
                output.run(intermediate.as_ref(), path, issues)
            }
            SchemaDef::Effects { inner, transform } => match inner.run(value, path, issues)? {
                Some(parsed) => match transform(parsed) {
                    Ok(transformed) => Ok(Some(transformed)),
                    Err(message) => {
                        issues.push(path.clone(), message);
                        Err(Invalid)
                    }
                },
                None => Ok(None),
            },
            SchemaDef::Any | SchemaDef::Unknown => Ok(value.cloned()),
            _ => match value {
                Some(v) => self.run_present(v, path, issues),
                None => {
                    issues.push(path.clone(), "Required");
                    Err(Invalid)
                }
            },
        }
    }

    fn run_present(
        &self,
        value: &Value,
        path: &mut Vec<PathSegment>,
        issues: &mut ValidationError,
    ) -> Step {
        match self.def() {
            SchemaDef::String(checks) => {
                let Some(s) = value.as_str() else {
                    return reject(issues, path, format!("Expected string, received {}", received(value)));
                };
                let len = s.chars().count();
                if let Some(min) = checks.min_length.filter(|min| len < *min) {
                    return reject(issues, path, format!("String must contain at least {min} character(s)"));
                }
                if let Some(max) = checks.max_length.filter(|max| len > *max) {
                    return reject(issues, path, format!("String must contain at most {max} character(s)"));
                }
                Ok(Some(value.clone()))
            }
            SchemaDef::Number(checks) => {
                let Some(n) = value.as_f64() else {
                    return reject(issues, path, format!("Expected number, received {}", received(value)));
                };
                if checks.integer && !is_integer(value) {
                    return reject(issues, path, "Expected integer, received float".to_string());
                }
                if let Some(min) = checks.minimum.filter(|min| n < *min) {
                    return reject(issues, path, format!("Number must be greater than or equal to {min}"));
                }
                if let Some(max) = checks.maximum.filter(|max| n > *max) {
                    return reject(issues, path, format!("Number must be less than or equal to {max}"));
                }
                Ok(Some(value.clone()))
            }
            SchemaDef::BigInt => {
                if is_integer(value) {
                    Ok(Some(value.clone()))
                } else {
                    reject(issues, path, format!("Expected bigint, received {}", received(value)))
                }
            }
            SchemaDef::Boolean => match value {
                Value::Bool(_) => Ok(Some(value.clone())),
                _ => reject(issues, path, format!("Expected boolean, received {}", received(value))),
            },
            SchemaDef::Null => match value {
                Value::Null => Ok(Some(Value::Null)),
                _ => reject(issues, path, format!("Expected null, received {}", received(value))),
            },
            SchemaDef::Date => match value.as_str() {
                Some(s) if looks_like_date(s) => Ok(Some(value.clone())),
                _ => reject(issues, path, "Invalid date".to_string()),
            },
            SchemaDef::Never => reject(issues, path, format!("Expected never, received {}", received(value))),
            SchemaDef::Literal(expected) => {
                if value == expected {
                    Ok(Some(value.clone()))
                } else {
                    reject(issues, path, format!("Invalid literal value, expected {expected}"))
                }
            }
            SchemaDef::Enum(options) => match value.as_str() {
                Some(s) if options.iter().any(|o| o == s) => Ok(Some(value.clone())),
                _ => reject(issues, path, format!(
                    "Invalid enum value. Expected {}, received {value}",
                    options
                        .iter()
                        .map(|o| format!("'{o}'"))
                        .collect::<Vec<_>>()
                        .join(" | ")
                )),
            },
            SchemaDef::NativeEnum(options) => {
                if options.contains(value) {
                    Ok(Some(value.clone()))
                } else {
                    reject(issues, path, format!("Invalid enum value, received {value}"))
                }
            }
            SchemaDef::Object {
                fields,
                unknown_keys,
            } => {
                let Some(object) = value.as_object() else {
                    return reject(issues, path, format!("Expected object, received {}", received(value)));
                };
                self.run_object(object, fields, *unknown_keys, path, issues)
            }
            SchemaDef::Array {
                item,
                min_items,
                max_items,
            } => {
                let Some(items) = value.as_array() else {
                    return reject(issues, path, format!("Expected array, received {}", received(value)));
                };
                if let Some(min) = min_items.filter(|min| items.len() < *min) {
                    return reject(issues, path, format!("Array must contain at least {min} element(s)"));
                }
                if let Some(max) = max_items.filter(|max| items.len() > *max) {
                    return reject(issues, path, format!("Array must contain at most {max} element(s)"));
                }
                run_items(items.iter().map(|v| (item, v)), path, issues)
            }
            SchemaDef::Tuple(schemas) => {
                let Some(items) = value.as_array() else {
                    return reject(issues, path, format!("Expected array, received {}", received(value)));
                };
                if items.len() != schemas.len() {
                    return reject(issues, path, format!(
                        "Expected tuple of {} element(s), received {}",
                        schemas.len(),
                        items.len()
                    ));
                }
                run_items(schemas.iter().zip(items), path, issues)
            }
            SchemaDef::Set(item) => {
                let Some(items) = value.as_array() else {
                    return reject(issues, path, format!("Expected array, received {}", received(value)));
                };
                let parsed = run_items(items.iter().map(|v| (item, v)), path, issues)?;
                if let Some(Value::Array(parsed)) = &parsed {
                    let duplicated = parsed
                        .iter()
                        .enumerate()
                        .any(|(i, a)| parsed[..i].contains(a));
                    if duplicated {
                        issues.push(path.clone(), "Set elements must be unique");
                        return Err(Invalid);
                    }
                }
                Ok(parsed)
            }
            SchemaDef::Record(inner) => {
                let Some(object) = value.as_object() else {
                    return reject(issues, path, format!("Expected object, received {}", received(value)));
                };
                let mut out = Map::new();
                let mut failed = false;
                for (key, v) in object {
                    path.push(PathSegment::Key(key.clone()));
                    match inner.run(Some(v), path, issues) {
                        Ok(Some(parsed)) => {
                            out.insert(key.clone(), parsed);
                        }
                        Ok(None) => {}
                        Err(Invalid) => failed = true,
                    }
                    path.pop();
                }
                if failed { Err(Invalid) } else { Ok(Some(Value::Object(out))) }
            }
            SchemaDef::Map { key, value: inner } => {
                let Some(entries) = value.as_array() else {
                    return reject(issues, path, format!("Expected map entries, received {}", received(value)));
                };
                let mut out = Vec::with_capacity(entries.len());
                let mut failed = false;
                for (i, entry) in entries.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    match entry.as_array().map(Vec::as_slice) {
                        Some([k, v]) => {
                            path.push(PathSegment::Key("key".to_string()));
                            let k = key.run(Some(k), path, issues);
                            path.pop();
                            path.push(PathSegment::Key("value".to_string()));
                            let v = inner.run(Some(v), path, issues);
                            path.pop();
                            match (k, v) {
                                (Ok(k), Ok(v)) => out.push(Value::Array(vec![
                                    k.unwrap_or(Value::Null),
                                    v.unwrap_or(Value::Null),
                                ])),
                                _ => failed = true,
                            }
                        }
                        _ => {
                            issues.push(path.clone(), "Expected [key, value] pair");
                            failed = true;
                        }
                    }
                    path.pop();
                }
                if failed { Err(Invalid) } else { Ok(Some(Value::Array(out))) }
            }
            SchemaDef::Union(options) => {
                for option in options {
                    let mut scratch = ValidationError::default();
                    if let Ok(parsed) = option.run(Some(value), path, &mut scratch) {
                        if scratch.is_empty() {
                            return Ok(parsed);
                        }
                    }
                }
                reject(issues, path, "Invalid input, no union option matched".to_string())
            }
            SchemaDef::DiscriminatedUnion {
                discriminator,
                options,
            } => {
                let tag = value.get(discriminator.as_str());
                let chosen = tag.and_then(|tag| {
                    options
                        .iter()
                        .find(|option| discriminator_values(option, discriminator).contains(tag))
                });
                match chosen {
                    Some(option) => option.run(Some(value), path, issues),
                    None => {
                        let expected: Vec<String> = options
                            .iter()
                            .flat_map(|o| discriminator_values(o, discriminator))
                            .map(|v| v.to_string())
                            .collect();
                        path.push(PathSegment::Key(discriminator.clone()));
                        issues.push(
                            path.clone(),
                            format!(
                                "Invalid discriminator value. Expected {}",
                                expected.join(" | ")
                            ),
                        );
                        path.pop();
                        Err(Invalid)
                    }
                }
            }
            SchemaDef::Intersection(left, right) => {
                let left = left.run(Some(value), path, issues);
                let right = right.run(Some(value), path, issues);
                match (left?, right?) {
                    (Some(Value::Object(mut a)), Some(Value::Object(b))) => {
                        for (k, v) in b {
                            a.insert(k, v);
                        }
                        Ok(Some(Value::Object(a)))
                    }
                    (a, b) if a == b => Ok(a),
                    _ => reject(issues, path, "Intersection results could not be merged".to_string()),
                }
            }
            SchemaDef::Function { .. } => reject(issues, path, "Functions cannot be parsed from JSON".to_string()),
            // wrappers are handled in `run`
            SchemaDef::Optional(_)
            | SchemaDef::Nullable(_)
            | SchemaDef::Default { .. }
            | SchemaDef::Catch { .. }
            | SchemaDef::Branded { .. }
            | SchemaDef::Lazy(_)
            | SchemaDef::Pipeline { .. }
            | SchemaDef::Effects { .. }
            | SchemaDef::Promise(_)
            | SchemaDef::Any
            | SchemaDef::Unknown => self.run(Some(value), path, issues),
        }
    }

    fn run_object(
        &self,
        object: &Map<String, Value>,
        fields: &[(String, Schema)],
        unknown_keys: UnknownKeys,
        path: &mut Vec<PathSegment>,
        issues: &mut ValidationError,
    ) -> Step {
        let mut out = Map::new();
        let mut failed = false;

        for (key, field) in fields {
            path.push(PathSegment::Key(key.clone()));
            match field.run(object.get(key), path, issues) {
                Ok(Some(parsed)) => {
                    out.insert(key.clone(), parsed);
                }
                Ok(None) => {}
                Err(Invalid) => failed = true,
            }
            path.pop();
        }

        for (key, value) in object {
            if fields.iter().any(|(k, _)| k == key) {
                continue;
            }
            match unknown_keys {
                UnknownKeys::Strip => {}
                UnknownKeys::Strict => {
                    issues.push(path.clone(), format!("Unrecognized key: {key:?}"));
                    failed = true;
                }
                UnknownKeys::Passthrough => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }

        if failed {
            Err(Invalid)
        } else {
            Ok(Some(Value::Object(out)))
        }
    }
}

fn reject(issues: &mut ValidationError, path: &[PathSegment], message: impl Into<String>) -> Step {
    issues.push(path.to_vec(), message);
    Err(Invalid)
}

fn run_items<'a>(
    items: impl Iterator<Item = (&'a Schema, &'a Value)>,
    path: &mut Vec<PathSegment>,
    issues: &mut ValidationError,
) -> Step {
    let mut out = Vec::new();
    let mut failed = false;
    for (i, (schema, value)) in items.enumerate() {
        path.push(PathSegment::Index(i));
        match schema.run(Some(value), path, issues) {
            Ok(parsed) => out.push(parsed.unwrap_or(Value::Null)),
            Err(Invalid) => failed = true,
        }
        path.pop();
    }
    if failed {
        Err(Invalid)
    } else {
        Ok(Some(Value::Array(out)))
    }
}

/// Values of `key` that select `option` in a discriminated union
fn discriminator_values(option: &Schema, key: &str) -> Vec<Value> {
    let SchemaDef::Object { fields, .. } = option.def() else {
        return match option.def() {
            SchemaDef::Lazy(getter) => discriminator_values(&getter(), key),
            SchemaDef::Branded { inner, .. } => discriminator_values(inner, key),
            _ => Vec::new(),
        };
    };
    let Some((_, field)) = fields.iter().find(|(k, _)| k == key) else {
        return Vec::new();
    };
    match field.def() {
        SchemaDef::Literal(value) => vec![value.clone()],
        SchemaDef::Enum(values) => values.iter().cloned().map(Value::String).collect(),
        SchemaDef::NativeEnum(values) => values.clone(),
        _ => Vec::new(),
    }
}
