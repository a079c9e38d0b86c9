//! Function descriptors
//!
//! A [`FunctionDescriptor`] pairs a name and description with a parameter
//! [`Schema`]. Its wire form is produced lazily by [`FunctionDescriptor::format`],
//! which is also where naming and authoring rules are enforced.

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::LlmError;
use crate::schema::{
    self, CompileOptions, DescriptionTemplate, RefStrategy, Schema, SchemaKind, SchemaSpec,
    Target, template,
};
use crate::types::FunctionCallDirective;

/// Kinds disabled for every function unless overridden
static DEFAULT_DISABLED_KINDS: Lazy<HashSet<SchemaKind>> = Lazy::new(HashSet::new);

pub const MAX_NAME_LENGTH: usize = 64;

/// Whether `name` matches `^[A-Za-z0-9_-]{1,64}$`
pub fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Description-template setting of a function
#[derive(Debug, Clone, Default)]
pub enum TemplateSetting {
    /// Process-wide defaults (enum kind only)
    #[default]
    Defaults,
    /// Defaults with these per-kind entries layered on top
    Merge(HashMap<SchemaKind, DescriptionTemplate>),
    /// No template check
    Off,
}

/// Per-function overrides of the compile options
#[derive(Debug, Clone)]
pub struct FunctionOptions {
    pub require_descriptions: bool,
    /// Kinds disabled in addition to the defaults; `None` allows every kind
    pub disabled_kinds: Option<HashSet<SchemaKind>>,
    pub templates: TemplateSetting,
    pub ref_strategy: RefStrategy,
    pub target: Target,
}

impl Default for FunctionOptions {
    fn default() -> Self {
        Self {
            require_descriptions: true,
            disabled_kinds: None,
            templates: TemplateSetting::Defaults,
            ref_strategy: RefStrategy::None,
            target: Target::JsonSchema7,
        }
    }
}

impl FunctionOptions {
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
        match &mut self.templates {
            TemplateSetting::Merge(map) => {
                map.insert(kind, template);
            }
            _ => {
                self.templates = TemplateSetting::Merge(HashMap::from([(kind, template)]));
            }
        }
        self
    }

    pub fn without_templates(mut self) -> Self {
        self.templates = TemplateSetting::Off;
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

    /// Layer these options over the process-wide defaults
    pub fn compile_options(&self) -> CompileOptions {
        let disabled_kinds = self.disabled_kinds.as_ref().map(|overrides| {
            DEFAULT_DISABLED_KINDS
                .iter()
                .chain(overrides.iter())
                .copied()
                .collect()
        });

        let description_templates = match &self.templates {
            TemplateSetting::Off => None,
            TemplateSetting::Defaults => Some(template::default_templates().clone()),
            TemplateSetting::Merge(overrides) => {
                let mut merged = template::default_templates().clone();
                merged.extend(overrides.iter().map(|(k, v)| (*k, v.clone())));
                Some(merged)
            }
        };

        CompileOptions {
            require_descriptions: self.require_descriptions,
            disabled_kinds,
            description_templates,
            ref_strategy: self.ref_strategy,
            target: self.target,
            ..CompileOptions::default()
        }
    }
}

/// Function definition as sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A callable function the model may request
#[derive(Clone)]
pub struct FunctionDescriptor {
    name: String,
    description: Option<String>,
    parameters: Schema,
    options: FunctionOptions,
    formatted: OnceLock<FunctionDefinition>,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>, parameters: Schema) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters,
            options: FunctionOptions::default(),
            formatted: OnceLock::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self.formatted = OnceLock::new();
        self
    }

    pub fn with_options(mut self, options: FunctionOptions) -> Self {
        self.options = options;
        self.formatted = OnceLock::new();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.trim().is_empty())
    }

    pub fn parameters(&self) -> &Schema {
        &self.parameters
    }

    pub fn options(&self) -> &FunctionOptions {
        &self.options
    }

    /// Validate and compile into the provider wire form
    ///
    /// The first successful result is cached; failures are not, so a
    /// failing descriptor reports the same error on every call.
    pub fn format(&self) -> Result<&FunctionDefinition, LlmError> {
        if let Some(formatted) = self.formatted.get() {
            return Ok(formatted);
        }

        if !is_valid_function_name(&self.name) {
            return Err(LlmError::invalid_name(&self.name));
        }
        let Some(description) = self.description() else {
            return Err(LlmError::missing_description(
                SchemaKind::Function,
                self.name.clone(),
            ));
        };

        let wire = schema::compile(&self.parameters, &self.options.compile_options())?;
        for diagnostic in wire.diagnostics() {
            log::debug!("function {}: {diagnostic}", self.name);
        }

        let definition = FunctionDefinition {
            name: self.name.clone(),
            description: description.to_string(),
            parameters: wire.into_document(),
        };
        Ok(self.formatted.get_or_init(|| definition))
    }

    /// Directive forcing the model to call this function
    pub fn function_config(&self) -> FunctionCallDirective {
        FunctionCallDirective::Named(self.name.clone())
    }

    /// Shape of a call to this function: `{ name: <literal>, arguments: <parameters> }`
    pub fn call_schema(&self) -> Schema {
        schema::object([
            ("name", schema::literal(self.name.clone())),
            ("arguments", self.parameters.clone()),
        ])
    }

    /// Validate already-decoded arguments against the parameter schema
    pub fn validate_arguments(&self, arguments: &Value) -> Result<FunctionCall, LlmError> {
        let parsed = self.parameters.parse(arguments)?;
        Ok(FunctionCall {
            name: self.name.clone(),
            arguments: parsed,
        })
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// A parsed, schema-validated function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

impl FunctionCall {
    /// Deserialize the arguments into a caller type
    pub fn parse_as<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        Ok(serde_json::from_value(self.arguments.clone())?)
    }
}

/// The functions attached to one chat, looked up by name
#[derive(Debug, Clone, Default)]
pub struct FunctionSet {
    functions: Vec<Arc<FunctionDescriptor>>,
}

impl FunctionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_functions(
        functions: impl IntoIterator<Item = FunctionDescriptor>,
    ) -> Result<Self, LlmError> {
        let mut set = Self::new();
        for function in functions {
            set.insert(function)?;
        }
        Ok(set)
    }

    /// Add a function; names must be unique within a set
    pub fn insert(&mut self, function: FunctionDescriptor) -> Result<(), LlmError> {
        if self.get(function.name()).is_some() {
            return Err(LlmError::configuration(format!(
                "Function {:?} is attached more than once",
                function.name()
            )));
        }
        self.functions.push(Arc::new(function));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions
            .iter()
            .map(Arc::as_ref)
            .find(|f| f.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionDescriptor> {
        self.functions.iter().map(Arc::as_ref)
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(FunctionDescriptor::name).collect()
    }

    /// Wire definitions of every function, formatting each on first use
    pub fn definitions(&self) -> Result<Vec<FunctionDefinition>, LlmError> {
        self.iter().map(|f| f.format().cloned()).collect()
    }

    /// Discriminated union over every function's call shape, keyed by `name`
    pub fn call_model(&self) -> Schema {
        schema::discriminated_union("name", self.iter().map(FunctionDescriptor::call_schema))
    }

    /// Parse a complete call whose arguments are still raw JSON text
    ///
    /// `index` is the choice the call belongs to and is only used for error
    /// reporting.
    pub fn resolve(&self, index: u32, name: &str, arguments: &str) -> Result<FunctionCall, LlmError> {
        let decoded: Value = serde_json::from_str(arguments).map_err(|err| {
            LlmError::function_call(
                name,
                index,
                format!("arguments are not valid JSON: {err}"),
                Some(err.into()),
            )
        })?;

        let call = self
            .call_model()
            .parse(&json!({ "name": name, "arguments": decoded }))
            .map_err(|err| {
                LlmError::function_call(
                    name,
                    index,
                    "arguments do not match the parameter schema",
                    Some(err.into()),
                )
            })?;

        Ok(FunctionCall {
            name: name.to_string(),
            arguments: call.get("arguments").cloned().unwrap_or(Value::Null),
        })
    }
}

/// Authoring options of a [`FunctionSpec`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionOptionsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_descriptions: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_kinds: Vec<SchemaKind>,
    /// `false` turns the description-template check off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<bool>,
}

/// Declarative function definition, loadable from TOML or JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: SchemaSpec,
    #[serde(default)]
    pub options: FunctionOptionsSpec,
}

impl FunctionSpec {
    pub fn from_toml(text: &str) -> Result<Self, LlmError> {
        toml::from_str(text)
            .map_err(|e| LlmError::serialization("Failed to parse function definition", e))
    }

    pub fn to_toml(&self) -> Result<String, LlmError> {
        toml::to_string_pretty(self)
            .map_err(|e| LlmError::serialization("Failed to serialize function definition", e))
    }

    /// Build a descriptor; `require_descriptions` fills in when the definition leaves it unset
    pub fn to_descriptor(&self, require_descriptions: bool) -> FunctionDescriptor {
        let mut options = FunctionOptions::default()
            .require_descriptions(self.options.require_descriptions.unwrap_or(require_descriptions));
        for kind in &self.options.disabled_kinds {
            options = options.disable_kind(*kind);
        }
        if self.options.templates == Some(false) {
            options = options.without_templates();
        }

        let descriptor = FunctionDescriptor::new(self.name.clone(), self.parameters.to_schema())
            .with_options(options);
        match &self.description {
            Some(description) => descriptor.with_description(description.clone()),
            None => descriptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{array, enumeration, integer, number, object, string, tuple};

    fn get_weather() -> FunctionDescriptor {
        FunctionDescriptor::new(
            "get_weather",
            object([
                ("location", string().describe("City and state")),
                (
                    "unit",
                    enumeration(["celsius", "fahrenheit"])
                        .describe_templated("Temperature unit.")
                        .optional(),
                ),
            ]),
        )
        .with_description("Get the current weather")
    }

    #[test]
    fn test_format_emits_definition() {
        let f = get_weather();
        let definition = f.format().unwrap();
        assert_eq!(definition.name, "get_weather");
        assert_eq!(definition.parameters["required"], json!(["location"]));
        // cached
        assert!(std::ptr::eq(definition, f.format().unwrap()));
    }

    #[test]
    fn test_invalid_names() {
        let long = "x".repeat(65);
        for name in ["", "has space", "dots.are.bad", long.as_str()] {
            let f = FunctionDescriptor::new(name, object([("a", string().describe("a"))]))
                .with_description("d");
            assert!(
                matches!(f.format(), Err(LlmError::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
        assert!(is_valid_function_name(&"a-b_C9".repeat(10)));
    }

    #[test]
    fn test_missing_function_description() {
        let f = FunctionDescriptor::new("f", object([("a", string().describe("a"))]));
        match f.format() {
            Err(LlmError::MissingDescription { kind, path }) => {
                assert_eq!(kind, SchemaKind::Function);
                assert_eq!(path, "f");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_default_enum_template_is_enforced() {
        let f = FunctionDescriptor::new(
            "pick",
            object([("color", enumeration(["red"]).describe("Color"))]),
        )
        .with_description("Pick a color");
        assert!(matches!(
            f.format(),
            Err(LlmError::UntemplatedDescription { .. })
        ));

        let relaxed = f.clone().with_options(FunctionOptions::new().without_templates());
        assert!(relaxed.format().is_ok());
    }

    #[test]
    fn test_disabled_kind_nested_three_levels() {
        let f = FunctionDescriptor::new(
            "plot",
            object([(
                "series",
                array(object([(
                    "point",
                    tuple([number().describe("x"), number().describe("y")]),
                )])),
            )]),
        )
        .with_description("Plot points")
        .with_options(FunctionOptions::new().disable_kind(SchemaKind::Tuple));

        assert!(matches!(
            f.format(),
            Err(LlmError::DisallowedKind {
                kind: SchemaKind::Tuple,
                ..
            })
        ));
    }

    #[test]
    fn test_compile_options_are_layered() {
        let options = FunctionOptions::new()
            .disable_kind(SchemaKind::Tuple)
            .template(SchemaKind::String, DescriptionTemplate::fixed("dot", "."))
            .compile_options();
        let templates = options.description_templates.unwrap();
        assert!(templates.contains_key(&SchemaKind::Enum));
        assert!(templates.contains_key(&SchemaKind::String));
        assert!(options.disabled_kinds.unwrap().contains(&SchemaKind::Tuple));

        assert!(FunctionOptions::new().compile_options().disabled_kinds.is_none());
    }

    #[test]
    fn test_resolve_validates_arguments() {
        let mut set = FunctionSet::new();
        set.insert(get_weather()).unwrap();

        let call = set.resolve(0, "get_weather", r#"{"location":"Paris"}"#).unwrap();
        assert_eq!(call.arguments, json!({ "location": "Paris" }));

        let err = set.resolve(1, "get_weather", r#"{"location":"#).unwrap_err();
        assert!(matches!(err, LlmError::FunctionCall { index: 1, .. }));

        let err = set.resolve(0, "get_weather", r#"{"unit":"kelvin"}"#).unwrap_err();
        assert_eq!(
            err.detail().as_deref(),
            Some("arguments.location: Required; arguments.unit: Invalid enum value. Expected 'celsius' | 'fahrenheit', received \"kelvin\"")
        );

        assert!(set.resolve(0, "unknown", "{}").is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = FunctionSet::from_functions([get_weather(), get_weather()]);
        assert!(matches!(result, Err(LlmError::Configuration { .. })));
    }

    #[test]
    fn test_parse_as_typed() {
        #[derive(Deserialize)]
        struct Args {
            count: u32,
        }
        let f = FunctionDescriptor::new("count", object([("count", integer().describe("n"))]));
        let call = f.validate_arguments(&json!({ "count": 3 })).unwrap();
        assert_eq!(call.parse_as::<Args>().unwrap().count, 3);
    }

    #[test]
    fn test_function_spec_from_toml() {
        let spec = FunctionSpec::from_toml(
            r#"
name = "get_weather"
description = "Get the current weather"

[options]
disabled_kinds = ["tuple"]

[parameters]
type = "object"

[parameters.properties.location]
type = "string"
description = "City"
"#,
        )
        .unwrap();
        let f = spec.to_descriptor(true);
        assert!(f.options().disabled_kinds.as_ref().unwrap().contains(&SchemaKind::Tuple));
        assert_eq!(f.format().unwrap().parameters["properties"]["location"]["type"], "string");

        let text = spec.to_toml().unwrap();
        assert_eq!(FunctionSpec::from_toml(&text).unwrap(), spec);
    }
}
