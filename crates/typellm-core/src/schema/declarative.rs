//! Serde-friendly schema descriptions
//!
//! [`SchemaSpec`] mirrors a subset of the builder API in a form that can be
//! stored in TOML or JSON files:
//!
//! ```toml
//! type = "object"
//!
//! [properties.location]
//! type = "string"
//! description = "City and state, e.g. San Francisco, CA"
//!
//! [properties.unit]
//! type = "enum"
//! values = ["celsius", "fahrenheit"]
//! description = "Temperature unit. Possible values: celsius, fahrenheit."
//! optional = true
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::Schema;

/// Shape of a declaratively described node, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeSpec {
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Boolean,
    Date,
    Null,
    Any,
    Literal {
        value: Value,
    },
    Enum {
        values: Vec<String>,
    },
    Object {
        #[serde(default)]
        properties: BTreeMap<String, SchemaSpec>,
        #[serde(default)]
        strict: bool,
    },
    Array {
        items: Box<SchemaSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    Tuple {
        items: Vec<SchemaSpec>,
    },
    Union {
        any_of: Vec<SchemaSpec>,
    },
    Record {
        values: Box<SchemaSpec>,
    },
}

/// A node plus the modifiers that can be attached to any shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSpec {
    #[serde(flatten)]
    pub shape: ShapeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl SchemaSpec {
    pub fn new(shape: ShapeSpec) -> Self {
        Self {
            shape,
            description: None,
            optional: false,
            nullable: false,
            default: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build the schema tree this spec describes
    ///
    /// Object properties are emitted in key order.
    pub fn to_schema(&self) -> Schema {
        let base = match &self.shape {
            ShapeSpec::String {
                min_length,
                max_length,
                format,
            } => {
                let mut s = super::string();
                if let Some(min) = min_length {
                    s = s.min_length(*min);
                }
                if let Some(max) = max_length {
                    s = s.max_length(*max);
                }
                if let Some(format) = format {
                    s = s.format(format.clone());
                }
                s
            }
            ShapeSpec::Number { minimum, maximum } => bounded(super::number(), *minimum, *maximum),
            ShapeSpec::Integer { minimum, maximum } => {
                bounded(super::integer(), *minimum, *maximum)
            }
            ShapeSpec::Boolean => super::boolean(),
            ShapeSpec::Date => super::date(),
            ShapeSpec::Null => super::null(),
            ShapeSpec::Any => super::any(),
            ShapeSpec::Literal { value } => super::literal(value.clone()),
            ShapeSpec::Enum { values } => super::enumeration(values.iter().cloned()),
            ShapeSpec::Object { properties, strict } => {
                let object = super::object(
                    properties
                        .iter()
                        .map(|(key, spec)| (key.clone(), spec.to_schema())),
                );
                if *strict { object.strict() } else { object }
            }
            ShapeSpec::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut array = super::array(items.to_schema());
                if let Some(min) = min_items {
                    array = array.min_items(*min);
                }
                if let Some(max) = max_items {
                    array = array.max_items(*max);
                }
                array
            }
            ShapeSpec::Tuple { items } => super::tuple(items.iter().map(SchemaSpec::to_schema)),
            ShapeSpec::Union { any_of } => super::union(any_of.iter().map(SchemaSpec::to_schema)),
            ShapeSpec::Record { values } => super::record(values.to_schema()),
        };

        let mut schema = match &self.description {
            Some(description) => base.describe(description.clone()),
            None => base,
        };
        if self.nullable {
            schema = schema.nullable();
        }
        if let Some(default) = &self.default {
            schema = schema.default_value(default.clone());
        }
        if self.optional {
            schema = schema.optional();
        }
        schema
    }
}

fn bounded(schema: Schema, minimum: Option<f64>, maximum: Option<f64>) -> Schema {
    let schema = match minimum {
        Some(min) => schema.minimum(min),
        None => schema,
    };
    match maximum {
        Some(max) => schema.maximum(max),
        None => schema,
    }
}

impl From<&SchemaSpec> for Schema {
    fn from(spec: &SchemaSpec) -> Self {
        spec.to_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CompileOptions, SchemaKind, compile};
    use serde_json::json;

    const WEATHER: &str = r#"
type = "object"

[properties.location]
type = "string"
description = "City and state"

[properties.unit]
type = "enum"
values = ["celsius", "fahrenheit"]
description = "Unit"
optional = true

[properties.days]
type = "integer"
minimum = 1
maximum = 14
default = 3
description = "Forecast length"
"#;

    #[test]
    fn test_toml_spec_compiles() {
        let spec: SchemaSpec = toml::from_str(WEATHER).unwrap();
        let schema = spec.to_schema();
        assert_eq!(schema.kind(), SchemaKind::Object);

        let doc = compile(&schema, &CompileOptions::default())
            .unwrap()
            .into_document();
        assert_eq!(doc["required"], json!(["location"]));
        assert_eq!(doc["properties"]["days"]["maximum"], json!(14.0));
        assert_eq!(doc["properties"]["days"]["default"], json!(3));
    }

    #[test]
    fn test_spec_parse_applies_default() {
        let spec: SchemaSpec = toml::from_str(WEATHER).unwrap();
        let parsed = spec.to_schema().parse(&json!({ "location": "Oslo" })).unwrap();
        assert_eq!(parsed, json!({ "location": "Oslo", "days": 3 }));
    }

    #[test]
    fn test_json_spec_round_trip() {
        let spec = SchemaSpec::new(ShapeSpec::Array {
            items: Box::new(
                SchemaSpec::new(ShapeSpec::String {
                    min_length: None,
                    max_length: None,
                    format: None,
                })
                .with_description("tag"),
            ),
            min_items: Some(1),
            max_items: None,
        });
        let text = serde_json::to_string(&spec).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({ "type": "array", "items": { "type": "string", "description": "tag" }, "min_items": 1 })
        );
        let back: SchemaSpec = serde_json::from_str(&text).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_missing_description_surfaces_from_spec() {
        let spec: SchemaSpec = serde_json::from_value(json!({
            "type": "object",
            "properties": { "flag": { "type": "boolean" } }
        }))
        .unwrap();
        let err = compile(&spec.to_schema(), &CompileOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::LlmError::MissingDescription { kind: SchemaKind::Boolean, .. }
        ));
    }
}
