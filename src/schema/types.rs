//! Schema description file types
//!
//! One description file per YANG module. Supported leaf types:
//! - string: free text, optionally constrained by `pattern`
//! - int: 64-bit signed integer with optional `min` / `max`
//! - bool: `true` or `false`
//! - enum: one of a declared set of values

use serde::{Deserialize, Serialize};

/// Supported leaf types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    #[default]
    String,
    /// 64-bit signed integer
    Int {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    /// Boolean
    Bool,
    /// Enumeration
    Enum {
        values: Vec<String>,
    },
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int { .. } => "int",
            FieldType::Bool => "bool",
            FieldType::Enum { .. } => "enum",
        }
    }
}

/// Leaf declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub mandatory: bool,
    /// Holds multiple values (stored as `name@` with a comma list)
    #[serde(default)]
    pub leaf_list: bool,
    /// Raw leafref path expressions; any one resolving is enough
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leafref: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_app_tag: Option<String>,
}

impl FieldDef {
    /// Create an optional string leaf
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::String,
            mandatory: false,
            leaf_list: false,
            leafref: Vec::new(),
            pattern: None,
            error_message: None,
            error_app_tag: None,
        }
    }

    /// Create an optional integer leaf
    pub fn int(name: impl Into<String>, min: Option<i64>, max: Option<i64>) -> Self {
        Self {
            field_type: FieldType::Int { min, max },
            ..Self::string(name)
        }
    }

    /// Create an optional enum leaf
    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            field_type: FieldType::Enum {
                values: values.iter().map(|v| v.to_string()).collect(),
            },
            ..Self::string(name)
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn leaf_list(mut self) -> Self {
        self.leaf_list = true;
        self
    }

    pub fn leafref(mut self, path: impl Into<String>) -> Self {
        self.leafref.push(path.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// `must` expression attached to a schema node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MustDef {
    /// Owning schema node (leaf name, or the list name for list-level rules)
    pub node: String,
    pub expr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_app_tag: Option<String>,
}

/// Table declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    /// e.g. `VLAN_MEMBER|{name}|{ifname}` or `PORTCHANNEL_MEMBERS|{name}|({ports},)*`
    pub key_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_elements: Option<usize>,
    /// Leaf pair `[name-leaf, value-leaf]` for tables modelled as maps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_leaf: Option<Vec<String>>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<MustDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, key_pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_pattern: key_pattern.into(),
            key_delimiter: None,
            max_elements: None,
            map_leaf: None,
            fields: Vec::new(),
            must: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn must(mut self, node: impl Into<String>, expr: impl Into<String>) -> Self {
        self.must.push(MustDef {
            node: node.into(),
            expr: expr.into(),
            error_message: None,
            error_app_tag: None,
        });
        self
    }

    pub fn max_elements(mut self, limit: usize) -> Self {
        self.max_elements = Some(limit);
        self
    }

    pub fn map_leaf(mut self, name_leaf: impl Into<String>, value_leaf: impl Into<String>) -> Self {
        self.map_leaf = Some(vec![name_leaf.into(), value_leaf.into()]);
        self
    }
}

/// One schema description file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaModule {
    /// YANG module name, e.g. `sonic-port`
    pub module: String,
    pub tables: Vec<TableDef>,
}

impl SchemaModule {
    pub fn new(module: impl Into<String>, tables: Vec<TableDef>) -> Self {
        Self {
            module: module.into(),
            tables,
        }
    }
}
