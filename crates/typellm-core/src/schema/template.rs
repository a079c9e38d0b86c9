//! Description templates
//!
//! A template derives, from a node, the suffix its description is expected to
//! end with. The compiler uses it as a conventions check: a described node
//! whose description lacks the suffix is rejected with
//! [`LlmError::UntemplatedDescription`](crate::LlmError::UntemplatedDescription).

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{SchemaDef, SchemaKind, SchemaNode};

type SuffixFn = dyn Fn(&SchemaNode) -> Option<String> + Send + Sync;

/// Produces the suffix a node's description must end with
#[derive(Clone)]
pub struct DescriptionTemplate {
    name: &'static str,
    suffix: Arc<SuffixFn>,
}

impl DescriptionTemplate {
    pub fn new<F>(name: &'static str, suffix: F) -> Self
    where
        F: Fn(&SchemaNode) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name,
            suffix: Arc::new(suffix),
        }
    }

    /// A template that always expects the same suffix
    pub fn fixed(name: &'static str, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self::new(name, move |_| Some(suffix.clone()))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Expected suffix for `node`, or `None` when the template does not apply
    pub fn expected_suffix(&self, node: &SchemaNode) -> Option<String> {
        (self.suffix)(node)
    }

    /// Whether `description` follows the template for `node`
    pub fn check(&self, node: &SchemaNode, description: &str) -> Result<(), String> {
        match self.expected_suffix(node) {
            Some(suffix) if !description.ends_with(&suffix) => Err(suffix),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for DescriptionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptionTemplate")
            .field("name", &self.name)
            .finish()
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Suffix listing the allowed values of an enum node
pub fn enum_values_template() -> DescriptionTemplate {
    DescriptionTemplate::new("enum_values", |node| {
        let values: Vec<String> = match node.def() {
            SchemaDef::Enum(values) => values.clone(),
            SchemaDef::NativeEnum(values) => values.iter().map(render_value).collect(),
            _ => return None,
        };
        Some(format!(" Possible values: {}.", values.join(", ")))
    })
}

static DEFAULT_TEMPLATES: Lazy<HashMap<SchemaKind, DescriptionTemplate>> = Lazy::new(|| {
    let mut templates = HashMap::new();
    templates.insert(SchemaKind::Enum, enum_values_template());
    templates
});

/// Process-wide default templates, keyed by kind
pub fn default_templates() -> &'static HashMap<SchemaKind, DescriptionTemplate> {
    &DEFAULT_TEMPLATES
}

pub fn default_template(kind: SchemaKind) -> Option<&'static DescriptionTemplate> {
    DEFAULT_TEMPLATES.get(&kind)
}
