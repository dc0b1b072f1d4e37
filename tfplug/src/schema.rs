//! Schema types and builders for tfplug
//!
//! This module provides the schema system for provider and data source
//! schemas: attribute types, nested attribute objects, the fluent builders
//! and conformance of value trees against a schema.

use crate::error::{Result, TfplugError};
use crate::types::{AttributePath, Dynamic};
use std::collections::HashMap;
use std::fmt;

/// AttributeType defines the type system for Terraform attributes
/// This must match Terraform's type system exactly
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    Number, // Always f64
    Bool,
    List(Box<AttributeType>),               // Ordered, allows duplicates
    Set(Box<AttributeType>),                // Unordered, no duplicates
    Map(Box<AttributeType>),                // String keys only
    Object(HashMap<String, AttributeType>), // Fixed structure
}

impl AttributeType {
    /// Terraform's JSON type constraint, e.g. `["list","string"]`
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};

        match self {
            AttributeType::String => json!("string"),
            AttributeType::Number => json!("number"),
            AttributeType::Bool => json!("bool"),
            AttributeType::List(elem) => json!(["list", elem.to_json()]),
            AttributeType::Set(elem) => json!(["set", elem.to_json()]),
            AttributeType::Map(elem) => json!(["map", elem.to_json()]),
            AttributeType::Object(fields) => {
                let fields: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.to_json()))
                    .collect();
                json!(["object", fields])
            }
        }
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::String => f.write_str("string"),
            AttributeType::Number => f.write_str("number"),
            AttributeType::Bool => f.write_str("bool"),
            AttributeType::List(elem) => write!(f, "list of {}", elem),
            AttributeType::Set(elem) => write!(f, "set of {}", elem),
            AttributeType::Map(elem) => write!(f, "map of {}", elem),
            AttributeType::Object(_) => f.write_str("object"),
        }
    }
}

/// Schema is returned by providers and data sources
/// Version is used for state migration
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: i64,
    pub block: Block,
}

impl Schema {
    /// Object type of the whole schema
    pub fn implied_type(&self) -> AttributeType {
        AttributeType::Object(
            self.block
                .attributes
                .iter()
                .map(|attr| (attr.name.clone(), attr.r#type.clone()))
                .collect(),
        )
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attributes.iter().find(|attr| attr.name == name)
    }

    /// Check a value tree against the schema.
    ///
    /// Omitted attributes are filled with null at every object level. Undeclared
    /// attributes and values of the wrong type are errors naming the offending path.
    pub fn conform(&self, value: &Dynamic) -> Result<Dynamic> {
        let root = match value {
            Dynamic::Null => Dynamic::Map(HashMap::new()),
            other => other.clone(),
        };
        conform_value(&self.implied_type(), &root, &AttributePath::root())
    }
}

fn conform_value(ty: &AttributeType, value: &Dynamic, path: &AttributePath) -> Result<Dynamic> {
    match (ty, value) {
        (_, Dynamic::Null) | (_, Dynamic::Unknown) => Ok(value.clone()),
        (AttributeType::String, Dynamic::String(_))
        | (AttributeType::Number, Dynamic::Number(_) | Dynamic::Integer(_))
        | (AttributeType::Bool, Dynamic::Bool(_)) => Ok(value.clone()),
        (AttributeType::List(elem), Dynamic::List(items))
        | (AttributeType::Set(elem), Dynamic::List(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| conform_value(elem, item, &path.clone().index(idx as i64)))
            .collect::<Result<Vec<_>>>()
            .map(Dynamic::List),
        (AttributeType::Map(elem), Dynamic::Map(entries)) => entries
            .iter()
            .map(|(key, item)| Ok((key.clone(), conform_value(elem, item, &path.clone().key(key))?)))
            .collect::<Result<HashMap<_, _>>>()
            .map(Dynamic::Map),
        (AttributeType::Object(fields), Dynamic::Map(entries)) => {
            if let Some(extra) = entries.keys().find(|key| !fields.contains_key(*key)) {
                return Err(TfplugError::InvalidState(format!(
                    "{}: unsupported attribute \"{}\"",
                    describe(path),
                    extra
                )));
            }

            fields
                .iter()
                .map(|(name, field_ty)| {
                    let item = entries.get(name).unwrap_or(&Dynamic::Null);
                    Ok((
                        name.clone(),
                        conform_value(field_ty, item, &path.clone().attribute(name))?,
                    ))
                })
                .collect::<Result<HashMap<_, _>>>()
                .map(Dynamic::Map)
        }
        _ => Err(TfplugError::InvalidState(format!(
            "{}: expected {}, got {}",
            describe(path),
            ty,
            value.type_name()
        ))),
    }
}

fn describe(path: &AttributePath) -> String {
    if path.steps.is_empty() {
        "root object".to_string()
    } else {
        path.to_string()
    }
}

/// Block represents the root configuration block
#[derive(Debug, Clone)]
pub struct Block {
    pub version: i64,
    pub attributes: Vec<Attribute>,
    pub description: String,
    pub description_kind: StringKind,
    pub deprecated: bool,
}

/// Attribute represents a single attribute.
///
/// For nested attributes `r#type` holds the implied object type and
/// `nested_type` the structure Terraform is told about.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub r#type: AttributeType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub nested_type: Option<NestedType>,
    pub deprecated: bool,
}

/// NestedType for attributes with nested structures
#[derive(Debug, Clone)]
pub struct NestedType {
    pub attributes: Vec<Attribute>,
    pub nesting: ObjectNestingMode,
}

impl NestedType {
    pub fn single(attributes: Vec<Attribute>) -> Self {
        Self {
            attributes,
            nesting: ObjectNestingMode::Single,
        }
    }

    pub fn list(attributes: Vec<Attribute>) -> Self {
        Self {
            attributes,
            nesting: ObjectNestingMode::List,
        }
    }

    pub fn set(attributes: Vec<Attribute>) -> Self {
        Self {
            attributes,
            nesting: ObjectNestingMode::Set,
        }
    }

    pub fn map(attributes: Vec<Attribute>) -> Self {
        Self {
            attributes,
            nesting: ObjectNestingMode::Map,
        }
    }

    pub fn implied_type(&self) -> AttributeType {
        let object = AttributeType::Object(
            self.attributes
                .iter()
                .map(|attr| (attr.name.clone(), attr.r#type.clone()))
                .collect(),
        );

        match self.nesting {
            ObjectNestingMode::Single | ObjectNestingMode::Invalid => object,
            ObjectNestingMode::List => AttributeType::List(Box::new(object)),
            ObjectNestingMode::Set => AttributeType::Set(Box::new(object)),
            ObjectNestingMode::Map => AttributeType::Map(Box::new(object)),
        }
    }
}

/// ObjectNestingMode for nested attribute objects
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectNestingMode {
    Invalid,
    Single,
    List,
    Set,
    Map,
}

/// StringKind represents the format of string values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StringKind {
    Plain,
    Markdown,
}

/// AttributeBuilder provides fluent API for building attributes
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    /// Create a new attribute builder
    pub fn new(name: &str, type_: AttributeType) -> Self {
        Self {
            attribute: Attribute {
                name: name.to_string(),
                r#type: type_,
                description: String::new(),
                required: false,
                optional: false,
                computed: false,
                sensitive: false,
                nested_type: None,
                deprecated: false,
            },
        }
    }

    /// Create a nested attribute whose value type follows from `nested`
    pub fn nested(name: &str, nested: NestedType) -> Self {
        let mut builder = Self::new(name, nested.implied_type());
        builder.attribute.nested_type = Some(nested);
        builder
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.attribute.description = desc.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.attribute.required = true;
        self.attribute.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.attribute.optional = true;
        self.attribute.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.attribute.computed = true;
        self
    }

    /// Mark as sensitive (hidden in plan output)
    pub fn sensitive(mut self) -> Self {
        self.attribute.sensitive = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.attribute.deprecated = true;
        self
    }

    pub fn build(self) -> Attribute {
        self.attribute
    }
}

/// SchemaBuilder provides fluent API for building schemas
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            schema: Schema {
                version: 0,
                block: Block {
                    version: 0,
                    attributes: Vec::new(),
                    description: String::new(),
                    description_kind: StringKind::Plain,
                    deprecated: false,
                },
            },
        }
    }

    pub fn version(mut self, version: i64) -> Self {
        self.schema.version = version;
        self.schema.block.version = version;
        self
    }

    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.schema.block.attributes.push(attr);
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.schema.block.description = desc.to_string();
        self
    }

    pub fn description_kind(mut self, kind: StringKind) -> Self {
        self.schema.block.description_kind = kind;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.schema.block.deprecated = true;
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
