//! Schema-tree compiler
//!
//! Walks a [`Schema`] tree and emits an equivalent JSON-Schema document,
//! enforcing the authoring rules (required descriptions, description
//! templates, disabled kinds) at every node on the way.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};

use super::template::DescriptionTemplate;
use super::{Schema, SchemaDef, SchemaKind, UnknownKeys};
use crate::error::LlmError;

/// How a node that was already emitted in this pass is referenced again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefStrategy {
    /// Always inline; true cycles degrade to an unconstrained node
    #[default]
    None,
    /// Inline the first occurrence, emit `{}` for any later one
    Seen,
    /// `$ref` with an absolute path (`#/properties/a`)
    Root,
    /// `$ref` with a path relative to the referencing node
    Relative,
}

/// Schema dialect of the emitted document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    JsonSchema7,
    OpenApi3,
}

/// What an effects (transform) node compiles to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectStrategy {
    /// The schema of the value before the transform
    #[default]
    Input,
    /// An unconstrained node
    Any,
}

/// Options for a single compilation
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub require_descriptions: bool,
    /// `None` allows every kind
    pub disabled_kinds: Option<HashSet<SchemaKind>>,
    /// `None` skips the template check entirely
    pub description_templates: Option<HashMap<SchemaKind, DescriptionTemplate>>,
    pub ref_strategy: RefStrategy,
    pub target: Target,
    pub effect_strategy: EffectStrategy,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            require_descriptions: true,
            disabled_kinds: None,
            description_templates: None,
            ref_strategy: RefStrategy::None,
            target: Target::JsonSchema7,
            effect_strategy: EffectStrategy::Input,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_descriptions(mut self, require: bool) -> Self {
        self.require_descriptions = require;
        self
    }

    pub fn disable_kind(mut self, kind: SchemaKind) -> Self {
        self.disabled_kinds
            .get_or_insert_with(HashSet::new)
            .insert(kind);
        self
    }

    pub fn template(mut self, kind: SchemaKind, template: DescriptionTemplate) -> Self {
        self.description_templates
            .get_or_insert_with(HashMap::new)
            .insert(kind, template);
        self
    }

    pub fn ref_strategy(mut self, strategy: RefStrategy) -> Self {
        self.ref_strategy = strategy;
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn effect_strategy(mut self, strategy: EffectStrategy) -> Self {
        self.effect_strategy = strategy;
        self
    }
}

/// Compiled schema document plus any diagnostics raised while compiling
#[derive(Debug, Clone, PartialEq)]
pub struct WireSchema {
    document: Value,
    diagnostics: Vec<String>,
}

impl WireSchema {
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn into_document(self) -> Value {
        self.document
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

impl Serialize for WireSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.document.serialize(serializer)
    }
}

/// Compile `schema` into a wire schema document
pub fn compile(schema: &Schema, options: &CompileOptions) -> Result<WireSchema, LlmError> {
    let mut compiler = Compiler {
        options,
        seen: HashMap::new(),
        diagnostics: Vec::new(),
    };
    let document = compiler
        .node(schema, vec!["#".to_string()])?
        .unwrap_or_else(|| json!({}));

    Ok(WireSchema {
        document,
        diagnostics: compiler.diagnostics,
    })
}

struct Compiler<'a> {
    options: &'a CompileOptions,
    // node identity -> (node, path where it was last emitted), scoped to one pass.
    // Holding the node keeps its address from being reused by a lazily built one.
    seen: HashMap<usize, (Schema, Vec<String>)>,
    diagnostics: Vec<String>,
}

fn child(path: &[String], segments: &[&str]) -> Vec<String> {
    let mut next = path.to_vec();
    next.extend(segments.iter().map(|s| s.to_string()));
    next
}

fn is_strict_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() < path.len() && prefix.iter().zip(path).all(|(a, b)| a == b)
}

fn relative_path(from: &[String], to: &[String]) -> String {
    let common = from
        .iter()
        .zip(to)
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts = vec![(from.len() - common).to_string()];
    parts.extend(to[common..].iter().cloned());
    parts.join("/")
}

fn json_type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Compiler<'_> {
    fn node(&mut self, schema: &Schema, path: Vec<String>) -> Result<Option<Value>, LlmError> {
        let id = schema.id();
        if let Some(seen_path) = self.seen.get(&id).map(|(_, path)| path.clone()) {
            if let Some(reference) = self.reference(&seen_path, &path) {
                return Ok(Some(reference));
            }
        }
        self.seen.insert(id, (schema.clone(), path.clone()));

        self.check(schema, &path)?;

        let emitted = self.emit(schema, &path)?;
        Ok(emitted.map(|value| annotate(schema, value)))
    }

    fn reference(&mut self, seen_path: &[String], path: &[String]) -> Option<Value> {
        match self.options.ref_strategy {
            RefStrategy::Root => Some(json!({ "$ref": seen_path.join("/") })),
            RefStrategy::Relative => Some(json!({ "$ref": relative_path(path, seen_path) })),
            RefStrategy::None | RefStrategy::Seen => {
                if is_strict_prefix(seen_path, path) {
                    let message = format!(
                        "Recursive reference detected at {}, defaulting to an unconstrained schema",
                        path.join("/")
                    );
                    log::warn!("{message}");
                    self.diagnostics.push(message);
                    Some(json!({}))
                } else if self.options.ref_strategy == RefStrategy::Seen {
                    Some(json!({}))
                } else {
                    None
                }
            }
        }
    }

    fn check(&self, schema: &Schema, path: &[String]) -> Result<(), LlmError> {
        let kind = schema.kind();
        let location = path.join("/");

        if self.options.require_descriptions
            && kind.requires_description()
            && schema.description().is_none()
        {
            return Err(LlmError::missing_description(kind, location));
        }

        if let (Some(templates), Some(description)) =
            (&self.options.description_templates, schema.description())
        {
            if let Some(template) = templates.get(&kind) {
                if let Err(expected) = template.check(schema.node(), description) {
                    return Err(LlmError::untemplated_description(kind, location, expected));
                }
            }
        }

        if let Some(disabled) = &self.options.disabled_kinds {
            if disabled.contains(&kind) {
                return Err(LlmError::disallowed_kind(kind, location));
            }
        }

        Ok(())
    }

    fn emit(&mut self, schema: &Schema, path: &[String]) -> Result<Option<Value>, LlmError> {
        let target = self.options.target;

        let value = match schema.def() {
            SchemaDef::String(checks) => {
                let mut out = json!({ "type": "string" });
                if let Some(min) = checks.min_length {
                    out["minLength"] = json!(min);
                }
                if let Some(max) = checks.max_length {
                    out["maxLength"] = json!(max);
                }
                if let Some(format) = &checks.format {
                    out["format"] = json!(format);
                }
                out
            }
            SchemaDef::Number(checks) => {
                let ty = if checks.integer { "integer" } else { "number" };
                let mut out = json!({ "type": ty });
                if let Some(min) = checks.minimum {
                    out["minimum"] = json!(min);
                }
                if let Some(max) = checks.maximum {
                    out["maximum"] = json!(max);
                }
                out
            }
            SchemaDef::BigInt => json!({ "type": "integer", "format": "int64" }),
            SchemaDef::Boolean => json!({ "type": "boolean" }),
            SchemaDef::Date => json!({ "type": "string", "format": "date-time" }),
            SchemaDef::Null => match target {
                Target::JsonSchema7 => json!({ "type": "null" }),
                Target::OpenApi3 => json!({ "enum": ["null"], "nullable": true }),
            },
            SchemaDef::Any | SchemaDef::Unknown | SchemaDef::Never => json!({}),
            SchemaDef::Literal(value) => match (target, value) {
                (_, Value::Null) => json!({ "type": "null" }),
                (Target::JsonSchema7, v) => json!({ "type": json_type_of(v), "const": v }),
                (Target::OpenApi3, v) => json!({ "type": json_type_of(v), "enum": [v] }),
            },
            SchemaDef::Enum(values) => json!({ "type": "string", "enum": values }),
            SchemaDef::NativeEnum(values) => {
                let strings = values.iter().filter(|v| v.is_string()).count();
                let ty = if strings == values.len() {
                    json!("string")
                } else if strings == 0 {
                    json!("number")
                } else {
                    json!(["string", "number"])
                };
                json!({ "type": ty, "enum": values })
            }
            SchemaDef::Object {
                fields,
                unknown_keys,
            } => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for (key, field) in fields {
                    let Some(compiled) = self.node(field, child(path, &["properties", key]))?
                    else {
                        continue;
                    };
                    if !field.accepts_missing() {
                        required.push(Value::String(key.clone()));
                    }
                    properties.insert(key.clone(), compiled);
                }
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": *unknown_keys == UnknownKeys::Passthrough,
                })
            }
            SchemaDef::Array {
                item,
                min_items,
                max_items,
            } => {
                let mut out = json!({ "type": "array" });
                if let Some(items) = self.node(item, child(path, &["items"]))? {
                    out["items"] = items;
                }
                if let Some(min) = min_items {
                    out["minItems"] = json!(min);
                }
                if let Some(max) = max_items {
                    out["maxItems"] = json!(max);
                }
                out
            }
            SchemaDef::Tuple(items) => {
                let mut compiled = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let index = i.to_string();
                    if let Some(value) = self.node(item, child(path, &["items", &index]))? {
                        compiled.push(value);
                    }
                }
                json!({
                    "type": "array",
                    "minItems": items.len(),
                    "maxItems": items.len(),
                    "items": compiled,
                })
            }
            SchemaDef::Union(options) | SchemaDef::DiscriminatedUnion { options, .. } => {
                json!({ "anyOf": self.all(options, path, "anyOf")? })
            }
            SchemaDef::Intersection(left, right) => {
                let parts = [left.clone(), right.clone()];
                json!({ "allOf": self.all(&parts, path, "allOf")? })
            }
            SchemaDef::Record(value) => {
                let mut out = json!({ "type": "object" });
                out["additionalProperties"] = self
                    .node(value, child(path, &["additionalProperties"]))?
                    .unwrap_or_else(|| json!({}));
                out
            }
            SchemaDef::Map { key, value } => {
                let key = self
                    .node(key, child(path, &["items", "items", "0"]))?
                    .unwrap_or_else(|| json!({}));
                let value = self
                    .node(value, child(path, &["items", "items", "1"]))?
                    .unwrap_or_else(|| json!({}));
                json!({
                    "type": "array",
                    "items": {
                        "type": "array",
                        "items": [key, value],
                        "minItems": 2,
                        "maxItems": 2,
                    },
                })
            }
            SchemaDef::Set(item) => {
                let mut out = json!({ "type": "array", "uniqueItems": true });
                if let Some(items) = self.node(item, child(path, &["items"]))? {
                    out["items"] = items;
                }
                out
            }
            SchemaDef::Optional(inner)
            | SchemaDef::Catch { inner, .. }
            | SchemaDef::Branded { inner, .. }
            | SchemaDef::Promise(inner) => return self.node(inner, path.to_vec()),
            SchemaDef::Pipeline { input, .. } => return self.node(input, path.to_vec()),
            SchemaDef::Lazy(getter) => return self.node(&getter(), path.to_vec()),
            SchemaDef::Effects { inner, .. } => match self.options.effect_strategy {
                EffectStrategy::Input => return self.node(inner, path.to_vec()),
                EffectStrategy::Any => json!({}),
            },
            SchemaDef::Default { inner, value } => {
                let Some(mut compiled) = self.node(inner, path.to_vec())? else {
                    return Ok(None);
                };
                if let Value::Object(map) = &mut compiled {
                    map.insert("default".to_string(), value.clone());
                }
                compiled
            }
            SchemaDef::Nullable(inner) => return self.nullable(inner, path),
            SchemaDef::Function { .. } => {
                let message = format!(
                    "Function schema at {} has no wire representation and was omitted",
                    path.join("/")
                );
                log::debug!("{message}");
                self.diagnostics.push(message);
                return Ok(None);
            }
        };

        Ok(Some(value))
    }

    fn all(
        &mut self,
        schemas: &[Schema],
        path: &[String],
        keyword: &str,
    ) -> Result<Vec<Value>, LlmError> {
        let mut out = Vec::with_capacity(schemas.len());
        for (i, schema) in schemas.iter().enumerate() {
            let index = i.to_string();
            if let Some(value) = self.node(schema, child(path, &[keyword, &index]))? {
                out.push(value);
            }
        }
        Ok(out)
    }

    fn nullable(&mut self, inner: &Schema, path: &[String]) -> Result<Option<Value>, LlmError> {
        match self.options.target {
            Target::OpenApi3 => {
                let Some(mut compiled) = self.node(inner, path.to_vec())? else {
                    return Ok(None);
                };
                if let Value::Object(map) = &mut compiled {
                    map.insert("nullable".to_string(), Value::Bool(true));
                }
                Ok(Some(compiled))
            }
            Target::JsonSchema7 => {
                let Some(compiled) = self.node(inner, child(path, &["anyOf", "0"]))? else {
                    return Ok(None);
                };
                let primitive = compiled
                    .get("type")
                    .and_then(Value::as_str)
                    .filter(|t| matches!(*t, "string" | "number" | "integer" | "boolean"))
                    .map(str::to_string);
                match primitive {
                    Some(ty) => {
                        let mut merged = compiled;
                        merged["type"] = json!([ty, "null"]);
                        Ok(Some(merged))
                    }
                    None => Ok(Some(json!({ "anyOf": [compiled, { "type": "null" }] }))),
                }
            }
        }
    }
}

fn annotate(schema: &Schema, mut value: Value) -> Value {
    if let (Some(description), Value::Object(map)) = (schema.description(), &mut value) {
        if !map.contains_key("$ref") {
            map.insert(
                "description".to_string(),
                Value::String(description.to_string()),
            );
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::template::enum_values_template;
    use crate::schema::*;
    use std::sync::{Arc, OnceLock};

    fn weather() -> Schema {
        object([
            (
                "location",
                string().describe("City and state, e.g. San Francisco, CA"),
            ),
            (
                "unit",
                enumeration(["celsius", "fahrenheit"])
                    .describe("Temperature unit")
                    .optional(),
            ),
            (
                "days",
                integer().describe("Forecast length in days").default_value(1),
            ),
        ])
    }

    #[test]
    fn test_object_emits_required_and_properties() {
        let wire = compile(&weather(), &CompileOptions::default()).unwrap();
        let doc = wire.document();

        assert_eq!(doc["type"], "object");
        assert_eq!(doc["required"], json!(["location"]));
        assert_eq!(doc["additionalProperties"], json!(false));
        assert_eq!(doc["properties"]["location"]["type"], "string");
        assert_eq!(
            doc["properties"]["unit"]["enum"],
            json!(["celsius", "fahrenheit"])
        );
        assert_eq!(doc["properties"]["days"]["type"], "integer");
        assert_eq!(doc["properties"]["days"]["default"], json!(1));
        assert_eq!(
            doc["properties"]["days"]["description"],
            "Forecast length in days"
        );
        assert!(wire.diagnostics().is_empty());
    }

    #[test]
    fn test_missing_description_reports_kind_and_path() {
        let schema = object([(
            "user",
            object([("age", number())]).describe("The user"),
        )]);
        let err = compile(&schema, &CompileOptions::default()).unwrap_err();
        match err {
            LlmError::MissingDescription { kind, path } => {
                assert_eq!(kind, SchemaKind::Number);
                assert_eq!(path, "#/properties/user/properties/age");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_removing_any_single_description_fails_for_that_kind() {
        let leaves: Vec<(SchemaKind, Schema)> = vec![
            (SchemaKind::String, string()),
            (SchemaKind::Number, number()),
            (SchemaKind::Boolean, boolean()),
            (SchemaKind::Date, date()),
            (SchemaKind::BigInt, bigint()),
            (SchemaKind::Enum, enumeration(["a"])),
            (SchemaKind::NativeEnum, native_enum([1, 2])),
            (
                SchemaKind::Function,
                function(Vec::new(), string().describe("ret")),
            ),
        ];

        let complete = object(
            leaves
                .iter()
                .map(|(kind, s)| (kind.to_string(), s.describe("documented"))),
        );
        assert!(compile(&complete, &CompileOptions::default()).is_ok());

        for (missing, _) in &leaves {
            let schema = object(leaves.iter().map(|(kind, s)| {
                let s = if kind == missing {
                    s.clone()
                } else {
                    s.describe("documented")
                };
                (kind.to_string(), s)
            }));
            match compile(&schema, &CompileOptions::default()) {
                Err(LlmError::MissingDescription { kind, .. }) => assert_eq!(kind, *missing),
                other => panic!("expected missing description for {missing}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_descriptions_not_required_when_disabled() {
        let schema = object([("a", string()), ("b", number())]);
        let options = CompileOptions::default().require_descriptions(false);
        assert!(compile(&schema, &options).is_ok());
    }

    #[test]
    fn test_disabled_kind_found_three_levels_deep() {
        let schema = object([(
            "outer",
            object([(
                "list",
                array(object([(
                    "coords",
                    tuple([number().describe("x"), number().describe("y")]),
                )])),
            )]),
        )]);
        let options = CompileOptions::default().disable_kind(SchemaKind::Tuple);
        match compile(&schema, &options) {
            Err(LlmError::DisallowedKind { kind, path }) => {
                assert_eq!(kind, SchemaKind::Tuple);
                assert_eq!(
                    path,
                    "#/properties/outer/properties/list/items/properties/coords"
                );
            }
            other => panic!("expected disallowed kind, got {other:?}"),
        }
    }

    #[test]
    fn test_untemplated_description() {
        let schema = object([(
            "color",
            enumeration(["red", "blue"]).describe("Paint color"),
        )]);
        let options = CompileOptions::default().template(SchemaKind::Enum, enum_values_template());
        match compile(&schema, &options) {
            Err(LlmError::UntemplatedDescription {
                kind,
                expected_suffix,
                ..
            }) => {
                assert_eq!(kind, SchemaKind::Enum);
                assert_eq!(expected_suffix, " Possible values: red, blue.");
            }
            other => panic!("expected untemplated description, got {other:?}"),
        }

        let fixed = object([(
            "color",
            enumeration(["red", "blue"]).describe_templated("Paint color."),
        )]);
        assert!(compile(&fixed, &options).is_ok());

        // without templates the convention is not enforced
        assert!(compile(&schema, &CompileOptions::default()).is_ok());
    }

    #[test]
    fn test_compile_is_idempotent() {
        let schema = weather();
        let options = CompileOptions::default();
        let first = compile(&schema, &options).unwrap();
        let second = compile(&schema, &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_tuple_union_intersection_shapes() {
        let schema = object([
            (
                "point",
                tuple([number().describe("x"), number().describe("y")]),
            ),
            (
                "id",
                union([string().describe("slug"), integer().describe("numeric id")]),
            ),
            (
                "both",
                intersection(
                    object([("a", string().describe("a"))]),
                    object([("b", string().describe("b"))]),
                ),
            ),
        ]);
        let doc = compile(&schema, &CompileOptions::default())
            .unwrap()
            .into_document();

        let point = &doc["properties"]["point"];
        assert_eq!(point["minItems"], json!(2));
        assert_eq!(point["maxItems"], json!(2));
        assert_eq!(point["items"].as_array().unwrap().len(), 2);

        let id = &doc["properties"]["id"]["anyOf"];
        assert_eq!(id[0]["type"], "string");
        assert_eq!(id[1]["type"], "integer");

        assert_eq!(
            doc["properties"]["both"]["allOf"].as_array().unwrap().len(),
            2
        );
    }

    #[test]
    fn test_nullable_by_target() {
        let schema = string().describe("nickname").nullable();

        let json7 = compile(&schema, &CompileOptions::default()).unwrap();
        assert_eq!(json7.document()["type"], json!(["string", "null"]));

        let openapi = compile(&schema, &CompileOptions::default().target(Target::OpenApi3)).unwrap();
        assert_eq!(openapi.document()["type"], "string");
        assert_eq!(openapi.document()["nullable"], json!(true));

        let complex = object([("a", string().describe("a"))]).nullable();
        let doc = compile(&complex, &CompileOptions::default())
            .unwrap()
            .into_document();
        assert_eq!(doc["anyOf"][1], json!({ "type": "null" }));
    }

    #[test]
    fn test_literal_and_native_enum() {
        let doc = compile(&literal("fixed"), &CompileOptions::default())
            .unwrap()
            .into_document();
        assert_eq!(doc, json!({ "type": "string", "const": "fixed" }));

        let doc = compile(
            &literal(3),
            &CompileOptions::default().target(Target::OpenApi3),
        )
        .unwrap()
        .into_document();
        assert_eq!(doc, json!({ "type": "integer", "enum": [3] }));

        let mixed = native_enum([json!("a"), json!(1)]).describe("mixed");
        let doc = compile(&mixed, &CompileOptions::default())
            .unwrap()
            .into_document();
        assert_eq!(doc["type"], json!(["string", "number"]));
    }

    fn recursive_category() -> Schema {
        let slot: Arc<OnceLock<Schema>> = Arc::new(OnceLock::new());
        let getter = slot.clone();
        let category = object([
            ("name", string().describe("Category name")),
            (
                "children",
                array(lazy(move || getter.get().cloned().unwrap_or_else(never))),
            ),
        ]);
        slot.set(category.clone()).unwrap();
        category
    }

    #[test]
    fn test_cycle_degrades_to_unconstrained_node() {
        let wire = compile(&recursive_category(), &CompileOptions::default()).unwrap();
        assert_eq!(wire.document()["properties"]["children"]["items"], json!({}));
        assert_eq!(wire.diagnostics().len(), 1);
        assert!(wire.diagnostics()[0].contains("#/properties/children/items"));
    }

    #[test]
    fn test_cycle_with_root_refs() {
        let options = CompileOptions::default().ref_strategy(RefStrategy::Root);
        let wire = compile(&recursive_category(), &options).unwrap();
        assert_eq!(
            wire.document()["properties"]["children"]["items"],
            json!({ "$ref": "#" })
        );

        let options = CompileOptions::default().ref_strategy(RefStrategy::Relative);
        let wire = compile(&recursive_category(), &options).unwrap();
        assert_eq!(
            wire.document()["properties"]["children"]["items"],
            json!({ "$ref": "3" })
        );
    }

    #[test]
    fn test_shared_node_is_inlined_twice() {
        let address = object([("street", string().describe("Street"))]);
        let schema = object([("home", address.clone()), ("work", address)]);
        let doc = compile(&schema, &CompileOptions::default())
            .unwrap()
            .into_document();
        assert_eq!(doc["properties"]["home"], doc["properties"]["work"]);

        let seen = compile(
            &schema,
            &CompileOptions::default().ref_strategy(RefStrategy::Seen),
        )
        .unwrap()
        .into_document();
        assert_eq!(seen["properties"]["work"], json!({}));
    }

    #[test]
    fn test_sibling_lazy_nodes_are_compiled_independently() {
        let schema = object([
            (
                "a",
                lazy(|| object([("x", string().describe("x"))])),
            ),
            (
                "b",
                lazy(|| object([("y", string().describe("y"))])),
            ),
        ]);

        for strategy in [
            RefStrategy::None,
            RefStrategy::Seen,
            RefStrategy::Root,
            RefStrategy::Relative,
        ] {
            let options = CompileOptions::default().ref_strategy(strategy);
            let wire = compile(&schema, &options).unwrap();
            let doc = wire.document();
            assert_eq!(doc["properties"]["a"]["properties"]["x"]["type"], "string");
            assert_eq!(doc["properties"]["b"]["properties"]["y"]["type"], "string");
            assert_eq!(doc["required"], json!(["a", "b"]));
            assert!(wire.diagnostics().is_empty(), "{strategy:?}");
        }
    }

    #[test]
    fn test_checks_run_inside_every_lazy_node() {
        let schema = object([
            ("a", lazy(|| object([("x", string().describe("x"))]))),
            ("b", lazy(|| object([("y", string())]))),
        ]);
        for strategy in [RefStrategy::Seen, RefStrategy::Root] {
            let options = CompileOptions::default().ref_strategy(strategy);
            match compile(&schema, &options) {
                Err(LlmError::MissingDescription { kind, path }) => {
                    assert_eq!(kind, SchemaKind::String);
                    assert_eq!(path, "#/properties/b/properties/y");
                }
                other => panic!("expected missing description, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_transparent_wrappers_unwrap() {
        let inner = string().describe("token");
        let wrapped = inner
            .brand("Token")
            .transform(|v| Ok(v))
            .catch("fallback")
            .promise();
        let doc = compile(&wrapped, &CompileOptions::default())
            .unwrap()
            .into_document();
        assert_eq!(doc, json!({ "type": "string", "description": "token" }));

        let any = compile(
            &inner.transform(|v| Ok(v)),
            &CompileOptions::default().effect_strategy(EffectStrategy::Any),
        )
        .unwrap()
        .into_document();
        assert_eq!(any, json!({ "description": "token" }));
    }

    #[test]
    fn test_record_map_set() {
        let schema = object([
            ("scores", record(number().describe("score"))),
            (
                "pairs",
                map(string().describe("key"), boolean().describe("flag")),
            ),
            ("tags", set(string().describe("tag"))),
        ]);
        let doc = compile(&schema, &CompileOptions::default())
            .unwrap()
            .into_document();
        assert_eq!(
            doc["properties"]["scores"]["additionalProperties"]["type"],
            "number"
        );
        assert_eq!(
            doc["properties"]["pairs"]["items"]["items"][1]["type"],
            "boolean"
        );
        assert_eq!(doc["properties"]["tags"]["uniqueItems"], json!(true));
    }

    #[test]
    fn test_function_members_are_omitted() {
        let schema = object([
            ("name", string().describe("name")),
            (
                "callback",
                function(Vec::new(), string().describe("ret")).describe("A callback"),
            ),
        ]);
        let wire = compile(&schema, &CompileOptions::default()).unwrap();
        assert!(wire.document()["properties"].get("callback").is_none());
        assert_eq!(wire.document()["required"], json!(["name"]));
        assert_eq!(wire.diagnostics().len(), 1);
    }

    #[test]
    fn test_relative_path() {
        let from = vec!["#".to_string(), "a".to_string(), "b".to_string()];
        let to = vec!["#".to_string(), "c".to_string()];
        assert_eq!(relative_path(&from, &to), "2/c");
    }
}
