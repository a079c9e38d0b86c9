//! Typed schema descriptions
//!
//! A [`Schema`] is an immutable, cheaply clonable node in a recursive type
//! description tree. Nodes are built with the free functions in this module
//! (`string()`, `object(..)`, `array(..)` ...) and decorated with methods such
//! as [`Schema::describe`], [`Schema::optional`] or [`Schema::default_value`].
//!
//! The same tree serves two purposes:
//!
//! - [`compile`](compile::compile) turns it into a portable JSON-Schema document
//!   that is sent to the provider as a function's `parameters`.
//! - [`Schema::parse`] validates a JSON value against it (used for function
//!   call arguments coming back from the model).
//!
//! ```rust
//! use typellm_core::schema::{self, CompileOptions};
//!
//! let params = schema::object([
//!     ("location", schema::string().describe("City and state, e.g. San Francisco, CA")),
//!     ("unit", schema::enumeration(["celsius", "fahrenheit"]).describe("Temperature unit").optional()),
//! ]);
//!
//! let wire = schema::compile(&params, &CompileOptions::default()).unwrap();
//! assert_eq!(wire.document()["required"], serde_json::json!(["location"]));
//! ```

pub mod compile;
pub mod declarative;
pub mod template;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

pub use compile::{CompileOptions, EffectStrategy, RefStrategy, Target, WireSchema, compile};
pub use declarative::SchemaSpec;
pub use template::DescriptionTemplate;

/// Kind tag of a schema node
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    String,
    Number,
    #[strum(serialize = "bigint")]
    #[serde(rename = "bigint")]
    BigInt,
    Boolean,
    Date,
    Null,
    Any,
    Unknown,
    Never,
    Literal,
    Enum,
    NativeEnum,
    Object,
    Array,
    Tuple,
    Union,
    DiscriminatedUnion,
    Intersection,
    Record,
    Map,
    Set,
    Optional,
    Nullable,
    Default,
    Catch,
    Branded,
    Lazy,
    Pipeline,
    Effects,
    Promise,
    Function,
}

impl SchemaKind {
    /// Kinds that must carry a description when descriptions are required
    pub const REQUIRES_DESCRIPTION: &'static [SchemaKind] = &[
        SchemaKind::BigInt,
        SchemaKind::Boolean,
        SchemaKind::Date,
        SchemaKind::Enum,
        SchemaKind::Function,
        SchemaKind::NativeEnum,
        SchemaKind::Number,
        SchemaKind::String,
    ];

    pub fn requires_description(&self) -> bool {
        Self::REQUIRES_DESCRIPTION.contains(self)
    }

    /// Wrapper kinds that compile to their inner node
    pub fn is_transparent(&self) -> bool {
        matches!(
            self,
            SchemaKind::Optional
                | SchemaKind::Nullable
                | SchemaKind::Default
                | SchemaKind::Catch
                | SchemaKind::Branded
                | SchemaKind::Lazy
                | SchemaKind::Pipeline
                | SchemaKind::Effects
                | SchemaKind::Promise
        )
    }
}

/// How an object treats keys it does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeys {
    /// Drop unknown keys while parsing
    #[default]
    Strip,
    /// Reject unknown keys
    Strict,
    /// Keep unknown keys
    Passthrough,
}

/// Constraints on a string node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringChecks {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub format: Option<String>,
}

/// Constraints on a number node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberChecks {
    pub integer: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

/// A fallible value transformation attached to an effects node
pub type Transform = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Deferred reference to another node, used for recursive schemas
pub type LazyGetter = Arc<dyn Fn() -> Schema + Send + Sync>;

/// Definition payload of a schema node
#[derive(Clone)]
pub enum SchemaDef {
    String(StringChecks),
    Number(NumberChecks),
    BigInt,
    Boolean,
    Date,
    Null,
    Any,
    Unknown,
    Never,
    Literal(Value),
    Enum(Vec<String>),
    NativeEnum(Vec<Value>),
    Object {
        fields: Vec<(String, Schema)>,
        unknown_keys: UnknownKeys,
    },
    Array {
        item: Schema,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Tuple(Vec<Schema>),
    Union(Vec<Schema>),
    DiscriminatedUnion {
        discriminator: String,
        options: Vec<Schema>,
    },
    Intersection(Schema, Schema),
    Record(Schema),
    Map {
        key: Schema,
        value: Schema,
    },
    Set(Schema),
    Optional(Schema),
    Nullable(Schema),
    Default {
        inner: Schema,
        value: Value,
    },
    Catch {
        inner: Schema,
        value: Value,
    },
    Branded {
        inner: Schema,
        brand: String,
    },
    Lazy(LazyGetter),
    Pipeline {
        input: Schema,
        output: Schema,
    },
    Effects {
        inner: Schema,
        transform: Transform,
    },
    Promise(Schema),
    Function {
        args: Vec<Schema>,
        returns: Schema,
    },
}

impl SchemaDef {
    pub fn kind(&self) -> SchemaKind {
        match self {
            SchemaDef::String(_) => SchemaKind::String,
            SchemaDef::Number(_) => SchemaKind::Number,
            SchemaDef::BigInt => SchemaKind::BigInt,
            SchemaDef::Boolean => SchemaKind::Boolean,
            SchemaDef::Date => SchemaKind::Date,
            SchemaDef::Null => SchemaKind::Null,
            SchemaDef::Any => SchemaKind::Any,
            SchemaDef::Unknown => SchemaKind::Unknown,
            SchemaDef::Never => SchemaKind::Never,
            SchemaDef::Literal(_) => SchemaKind::Literal,
            SchemaDef::Enum(_) => SchemaKind::Enum,
            SchemaDef::NativeEnum(_) => SchemaKind::NativeEnum,
            SchemaDef::Object { .. } => SchemaKind::Object,
            SchemaDef::Array { .. } => SchemaKind::Array,
            SchemaDef::Tuple(_) => SchemaKind::Tuple,
            SchemaDef::Union(_) => SchemaKind::Union,
            SchemaDef::DiscriminatedUnion { .. } => SchemaKind::DiscriminatedUnion,
            SchemaDef::Intersection(..) => SchemaKind::Intersection,
            SchemaDef::Record(_) => SchemaKind::Record,
            SchemaDef::Map { .. } => SchemaKind::Map,
            SchemaDef::Set(_) => SchemaKind::Set,
            SchemaDef::Optional(_) => SchemaKind::Optional,
            SchemaDef::Nullable(_) => SchemaKind::Nullable,
            SchemaDef::Default { .. } => SchemaKind::Default,
            SchemaDef::Catch { .. } => SchemaKind::Catch,
            SchemaDef::Branded { .. } => SchemaKind::Branded,
            SchemaDef::Lazy(_) => SchemaKind::Lazy,
            SchemaDef::Pipeline { .. } => SchemaKind::Pipeline,
            SchemaDef::Effects { .. } => SchemaKind::Effects,
            SchemaDef::Promise(_) => SchemaKind::Promise,
            SchemaDef::Function { .. } => SchemaKind::Function,
        }
    }
}

/// A node together with its optional description
pub struct SchemaNode {
    def: SchemaDef,
    description: Option<String>,
}

impl SchemaNode {
    pub fn def(&self) -> &SchemaDef {
        &self.def
    }

    pub fn kind(&self) -> SchemaKind {
        self.def.kind()
    }

    /// Description, if present and not blank
    pub fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
    }
}

/// Shared handle to an immutable schema node
///
/// Cloning a `Schema` shares the node, so clones have the same identity.
/// Every decorating method builds a new node.
#[derive(Clone)]
pub struct Schema(Arc<SchemaNode>);

impl Schema {
    pub fn new(def: SchemaDef) -> Self {
        Self(Arc::new(SchemaNode {
            def,
            description: None,
        }))
    }

    fn with(def: SchemaDef, description: Option<String>) -> Self {
        Self(Arc::new(SchemaNode { def, description }))
    }

    pub fn node(&self) -> &SchemaNode {
        &self.0
    }

    pub fn def(&self) -> &SchemaDef {
        &self.0.def
    }

    pub fn kind(&self) -> SchemaKind {
        self.0.def.kind()
    }

    pub fn description(&self) -> Option<&str> {
        self.0.description()
    }

    /// Stable identity of the underlying node, used for cycle detection
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Whether two handles point at the same node
    pub fn ptr_eq(&self, other: &Schema) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Attach a human description
    pub fn describe(&self, description: impl Into<String>) -> Schema {
        Schema::with(self.0.def.clone(), Some(description.into()))
    }

    /// Attach a description followed by the default template suffix for this kind
    pub fn describe_templated(&self, description: impl Into<String>) -> Schema {
        let mut description = description.into();
        if let Some(template) = template::default_template(self.kind()) {
            if let Some(suffix) = template.expected_suffix(self.node()) {
                if !description.ends_with(&suffix) {
                    description.push_str(&suffix);
                }
            }
        }
        self.describe(description)
    }

    fn wrap(&self, def: SchemaDef) -> Schema {
        Schema::with(def, self.0.description.clone())
    }

    pub fn optional(&self) -> Schema {
        self.wrap(SchemaDef::Optional(self.clone()))
    }

    pub fn nullable(&self) -> Schema {
        self.wrap(SchemaDef::Nullable(self.clone()))
    }

    /// Value used when the input is absent
    pub fn default_value(&self, value: impl Into<Value>) -> Schema {
        self.wrap(SchemaDef::Default {
            inner: self.clone(),
            value: value.into(),
        })
    }

    /// Value used when parsing fails
    pub fn catch(&self, value: impl Into<Value>) -> Schema {
        self.wrap(SchemaDef::Catch {
            inner: self.clone(),
            value: value.into(),
        })
    }

    pub fn brand(&self, brand: impl Into<String>) -> Schema {
        self.wrap(SchemaDef::Branded {
            inner: self.clone(),
            brand: brand.into(),
        })
    }

    /// Post-process parsed values
    pub fn transform<F>(&self, transform: F) -> Schema
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.wrap(SchemaDef::Effects {
            inner: self.clone(),
            transform: Arc::new(transform),
        })
    }

    /// Feed the parsed value into a second schema
    pub fn pipe(&self, output: Schema) -> Schema {
        self.wrap(SchemaDef::Pipeline {
            input: self.clone(),
            output,
        })
    }

    pub fn promise(&self) -> Schema {
        self.wrap(SchemaDef::Promise(self.clone()))
    }

    /// Reject undeclared keys. No effect on non-object nodes.
    pub fn strict(&self) -> Schema {
        self.with_unknown_keys(UnknownKeys::Strict)
    }

    /// Keep undeclared keys. No effect on non-object nodes.
    pub fn passthrough(&self) -> Schema {
        self.with_unknown_keys(UnknownKeys::Passthrough)
    }

    fn with_unknown_keys(&self, unknown_keys: UnknownKeys) -> Schema {
        match &self.0.def {
            SchemaDef::Object { fields, .. } => Schema::with(
                SchemaDef::Object {
                    fields: fields.clone(),
                    unknown_keys,
                },
                self.0.description.clone(),
            ),
            _ => self.clone(),
        }
    }

    pub fn min_length(&self, min: usize) -> Schema {
        self.map_string(|checks| checks.min_length = Some(min))
    }

    pub fn max_length(&self, max: usize) -> Schema {
        self.map_string(|checks| checks.max_length = Some(max))
    }

    /// JSON-Schema `format` hint for strings (e.g. `email`, `uri`)
    pub fn format(&self, format: impl Into<String>) -> Schema {
        let format = format.into();
        self.map_string(|checks| checks.format = Some(format))
    }

    fn map_string(&self, apply: impl FnOnce(&mut StringChecks)) -> Schema {
        match &self.0.def {
            SchemaDef::String(checks) => {
                let mut checks = checks.clone();
                apply(&mut checks);
                Schema::with(SchemaDef::String(checks), self.0.description.clone())
            }
            _ => self.clone(),
        }
    }

    pub fn minimum(&self, min: f64) -> Schema {
        self.map_number(|checks| checks.minimum = Some(min))
    }

    pub fn maximum(&self, max: f64) -> Schema {
        self.map_number(|checks| checks.maximum = Some(max))
    }

    fn map_number(&self, apply: impl FnOnce(&mut NumberChecks)) -> Schema {
        match &self.0.def {
            SchemaDef::Number(checks) => {
                let mut checks = checks.clone();
                apply(&mut checks);
                Schema::with(SchemaDef::Number(checks), self.0.description.clone())
            }
            _ => self.clone(),
        }
    }

    pub fn min_items(&self, min: usize) -> Schema {
        match &self.0.def {
            SchemaDef::Array {
                item, max_items, ..
            } => Schema::with(
                SchemaDef::Array {
                    item: item.clone(),
                    min_items: Some(min),
                    max_items: *max_items,
                },
                self.0.description.clone(),
            ),
            _ => self.clone(),
        }
    }

    pub fn max_items(&self, max: usize) -> Schema {
        match &self.0.def {
            SchemaDef::Array {
                item, min_items, ..
            } => Schema::with(
                SchemaDef::Array {
                    item: item.clone(),
                    min_items: *min_items,
                    max_items: Some(max),
                },
                self.0.description.clone(),
            ),
            _ => self.clone(),
        }
    }

    /// Whether an absent value is acceptable where this node is expected
    pub fn accepts_missing(&self) -> bool {
        match &self.0.def {
            SchemaDef::Optional(_)
            | SchemaDef::Default { .. }
            | SchemaDef::Catch { .. }
            | SchemaDef::Any
            | SchemaDef::Unknown => true,
            SchemaDef::Lazy(getter) => getter().accepts_missing(),
            SchemaDef::Branded { inner, .. }
            | SchemaDef::Effects { inner, .. }
            | SchemaDef::Promise(inner) => inner.accepts_missing(),
            SchemaDef::Pipeline { input, .. } => input.accepts_missing(),
            _ => false,
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("kind", &self.kind())
            .field("description", &self.0.description)
            .finish()
    }
}

pub fn string() -> Schema {
    Schema::new(SchemaDef::String(StringChecks::default()))
}

pub fn number() -> Schema {
    Schema::new(SchemaDef::Number(NumberChecks::default()))
}

pub fn integer() -> Schema {
    Schema::new(SchemaDef::Number(NumberChecks {
        integer: true,
        ..Default::default()
    }))
}

pub fn bigint() -> Schema {
    Schema::new(SchemaDef::BigInt)
}

pub fn boolean() -> Schema {
    Schema::new(SchemaDef::Boolean)
}

pub fn date() -> Schema {
    Schema::new(SchemaDef::Date)
}

pub fn null() -> Schema {
    Schema::new(SchemaDef::Null)
}

pub fn any() -> Schema {
    Schema::new(SchemaDef::Any)
}

pub fn unknown() -> Schema {
    Schema::new(SchemaDef::Unknown)
}

pub fn never() -> Schema {
    Schema::new(SchemaDef::Never)
}

pub fn literal(value: impl Into<Value>) -> Schema {
    Schema::new(SchemaDef::Literal(value.into()))
}

/// String enumeration
pub fn enumeration<I, S>(values: I) -> Schema
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Schema::new(SchemaDef::Enum(values.into_iter().map(Into::into).collect()))
}

/// Enumeration over string and/or numeric values
pub fn native_enum<I, V>(values: I) -> Schema
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    Schema::new(SchemaDef::NativeEnum(
        values.into_iter().map(Into::into).collect(),
    ))
}

pub fn object<I, K>(fields: I) -> Schema
where
    I: IntoIterator<Item = (K, Schema)>,
    K: Into<String>,
{
    Schema::new(SchemaDef::Object {
        fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        unknown_keys: UnknownKeys::default(),
    })
}

pub fn array(item: Schema) -> Schema {
    Schema::new(SchemaDef::Array {
        item,
        min_items: None,
        max_items: None,
    })
}

pub fn tuple(items: impl IntoIterator<Item = Schema>) -> Schema {
    Schema::new(SchemaDef::Tuple(items.into_iter().collect()))
}

pub fn union(options: impl IntoIterator<Item = Schema>) -> Schema {
    Schema::new(SchemaDef::Union(options.into_iter().collect()))
}

pub fn discriminated_union(
    discriminator: impl Into<String>,
    options: impl IntoIterator<Item = Schema>,
) -> Schema {
    Schema::new(SchemaDef::DiscriminatedUnion {
        discriminator: discriminator.into(),
        options: options.into_iter().collect(),
    })
}

pub fn intersection(left: Schema, right: Schema) -> Schema {
    Schema::new(SchemaDef::Intersection(left, right))
}

/// Object with arbitrary string keys and uniformly typed values
pub fn record(value: Schema) -> Schema {
    Schema::new(SchemaDef::Record(value))
}

pub fn map(key: Schema, value: Schema) -> Schema {
    Schema::new(SchemaDef::Map { key, value })
}

pub fn set(item: Schema) -> Schema {
    Schema::new(SchemaDef::Set(item))
}

/// Defer to another node, resolved each time it is needed
pub fn lazy<F>(getter: F) -> Schema
where
    F: Fn() -> Schema + Send + Sync + 'static,
{
    Schema::new(SchemaDef::Lazy(Arc::new(getter)))
}

pub fn function(args: impl IntoIterator<Item = Schema>, returns: Schema) -> Schema {
    Schema::new(SchemaDef::Function {
        args: args.into_iter().collect(),
        returns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_names_round_trip_through_strum() {
        assert_eq!(SchemaKind::BigInt.to_string(), "bigint");
        assert_eq!(SchemaKind::NativeEnum.to_string(), "native_enum");
        assert_eq!(
            SchemaKind::from_str("discriminated_union").unwrap(),
            SchemaKind::DiscriminatedUnion
        );
    }

    #[test]
    fn test_describe_creates_new_identity() {
        let base = string();
        let described = base.describe("A name");
        assert!(!base.ptr_eq(&described));
        assert!(base.ptr_eq(&base.clone()));
        assert_eq!(described.description(), Some("A name"));
        assert_eq!(base.description(), None);
    }

    #[test]
    fn test_wrappers_inherit_description() {
        let inner = number().describe("Count of items");
        let wrapped = inner.optional().nullable();
        assert_eq!(wrapped.kind(), SchemaKind::Nullable);
        assert_eq!(wrapped.description(), Some("Count of items"));
    }

    #[test]
    fn test_blank_description_is_absent() {
        assert_eq!(string().describe("   ").description(), None);
    }

    #[test]
    fn test_accepts_missing() {
        assert!(string().optional().accepts_missing());
        assert!(string().default_value("x").accepts_missing());
        assert!(any().accepts_missing());
        assert!(!string().nullable().accepts_missing());
        assert!(!string().accepts_missing());
    }

    #[test]
    fn test_refinements_ignore_other_kinds() {
        let s = boolean().min_length(3);
        assert_eq!(s.kind(), SchemaKind::Boolean);

        let s = string().min_length(2).max_length(5);
        match s.def() {
            SchemaDef::String(checks) => {
                assert_eq!(checks.min_length, Some(2));
                assert_eq!(checks.max_length, Some(5));
            }
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn test_requires_description_set() {
        for kind in [
            SchemaKind::String,
            SchemaKind::Number,
            SchemaKind::Boolean,
            SchemaKind::Enum,
            SchemaKind::Date,
        ] {
            assert!(kind.requires_description());
        }
        assert!(!SchemaKind::Object.requires_description());
        assert!(!SchemaKind::Tuple.requires_description());
    }
}
