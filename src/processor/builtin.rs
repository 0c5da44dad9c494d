//! Built-in schema processor
//!
//! Checks each list instance of the subject:
//! - unknown fields, repeated single-valued fields
//! - int range, bool shape, enum membership, pattern
//! - mandatory fields (create only; delete may not remove them)
//! - leafref values resolve in the subject or the dependent document
//!
//! `must` expression text is not evaluated here.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::document::{Document, NodeId, NodeKind};
use crate::errors::{CvlError, CvlErrorCode, CvlResult};
use crate::schema::{FieldDef, FieldType, SchemaIndex, TableSchema};
use crate::session::Operation;

use super::SchemaProcessor;

/// Processor driven by the loaded schema index
#[derive(Debug, Clone)]
pub struct BuiltinProcessor {
    schema: Arc<SchemaIndex>,
}

impl BuiltinProcessor {
    pub fn new(schema: Arc<SchemaIndex>) -> Self {
        Self { schema }
    }
}

impl SchemaProcessor for BuiltinProcessor {
    fn validate(&self, subject: &Document, dependent: Option<&Document>, op: Operation) -> CvlResult<()> {
        if op == Operation::None {
            return Ok(());
        }

        for &module in subject.roots() {
            for &container in subject.children(Some(module)) {
                let table_name = subject.node(container).name();
                let table = self.schema.table(table_name).ok_or_else(|| {
                    CvlError::internal(format!("Subject holds unknown table '{}'", table_name))
                })?;

                for &instance in subject.children(Some(container)) {
                    let check = InstanceCheck {
                        table,
                        subject,
                        dependent,
                        instance,
                        key_components: key_components(table, subject, instance),
                    };
                    check.run(op)?;
                }
            }
        }
        Ok(())
    }
}

struct InstanceCheck<'a> {
    table: &'a TableSchema,
    subject: &'a Document,
    dependent: Option<&'a Document>,
    instance: NodeId,
    key_components: Vec<String>,
}

impl InstanceCheck<'_> {
    fn run(&self, op: Operation) -> CvlResult<()> {
        let values = self.collect_values()?;

        if op == Operation::Delete {
            for name in values.keys() {
                if let Some(def) = self.table.field(name) {
                    if def.mandatory && !self.table.is_key(name) {
                        return Err(self
                            .error(
                                CvlErrorCode::SemanticMandatoryDataMissing,
                                format!("Mandatory field '{}' cannot be deleted", name),
                            )
                            .field(name.as_str(), "")
                            .constraint(def.error_message.as_deref(), def.error_app_tag.as_deref()));
                    }
                }
            }
            return Ok(());
        }

        for (name, members) in &values {
            let Some(def) = self.table.field(name) else {
                continue;
            };
            for value in members {
                self.check_type(def, value)?;
                self.check_pattern(def, value)?;
                self.check_leafref(def, value)?;
            }
        }

        if op == Operation::Create {
            for def in self.table.fields.values() {
                if def.mandatory && !values.contains_key(&def.name) {
                    return Err(self
                        .error(
                            CvlErrorCode::SemanticMandatoryDataMissing,
                            format!("Mandatory field '{}' is missing", def.name),
                        )
                        .field(def.name.as_str(), "")
                        .constraint(def.error_message.as_deref(), def.error_app_tag.as_deref()));
                }
            }
        }
        Ok(())
    }

    /// Field name -> values, rejecting unknown and repeated fields
    fn collect_values(&self) -> CvlResult<BTreeMap<String, Vec<String>>> {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for &child in self.subject.children(Some(self.instance)) {
            let node = self.subject.node(child);
            match node.kind() {
                NodeKind::Leaf | NodeKind::LeafList => {
                    let name = node.name();
                    let value = node.value().unwrap_or_default();
                    if !self.table.is_key(name) && self.table.field(name).is_none() {
                        return Err(self
                            .error(
                                CvlErrorCode::SyntaxInvalidField,
                                format!("Unknown field '{}' in table '{}'", name, self.table.name),
                            )
                            .field(name, value));
                    }

                    let members = values.entry(name.to_string()).or_default();
                    let single = node.kind() == NodeKind::Leaf && !self.table.is_leaf_list(name);
                    if single && !members.is_empty() {
                        return Err(self
                            .error(CvlErrorCode::SyntaxDuplicate, format!("Field '{}' given more than once", name))
                            .field(name, value));
                    }
                    members.push(value.to_string());
                }
                NodeKind::List => {
                    // Map-leaf entry: the value leaf carries the declared type
                    if let Some((_, value_leaf)) = &self.table.map_leaf {
                        for value in self.subject.leaf_values(child, value_leaf) {
                            values.entry(value_leaf.clone()).or_default().push(value.to_string());
                        }
                    }
                }
                NodeKind::Module | NodeKind::Container => {
                    return Err(CvlError::internal(format!(
                        "Unexpected node '{}' inside list instance of '{}'",
                        node.name(),
                        self.table.name
                    )));
                }
            }
        }
        Ok(values)
    }

    fn check_type(&self, def: &FieldDef, value: &str) -> CvlResult<()> {
        match &def.field_type {
            FieldType::String => Ok(()),
            FieldType::Bool => match value {
                "true" | "false" => Ok(()),
                _ => Err(self.field_error(
                    def,
                    CvlErrorCode::SyntaxInvalidInputData,
                    format!("Field '{}' expects true or false", def.name),
                    value,
                )),
            },
            FieldType::Int { min, max } => {
                let parsed: i64 = value.parse().map_err(|_| {
                    self.field_error(
                        def,
                        CvlErrorCode::SyntaxInvalidInputData,
                        format!("Field '{}' expects an integer", def.name),
                        value,
                    )
                })?;
                let below = min.map_or(false, |m| parsed < m);
                let above = max.map_or(false, |m| parsed > m);
                if below || above {
                    return Err(self.field_error(
                        def,
                        CvlErrorCode::SyntaxOutOfRange,
                        format!(
                            "Field '{}' value {} outside range {}..{}",
                            def.name,
                            parsed,
                            min.map_or("min".to_string(), |m| m.to_string()),
                            max.map_or("max".to_string(), |m| m.to_string())
                        ),
                        value,
                    ));
                }
                Ok(())
            }
            FieldType::Enum { values } => {
                if values.iter().any(|v| v == value) {
                    Ok(())
                } else {
                    Err(self.field_error(
                        def,
                        CvlErrorCode::SyntaxEnumInvalid,
                        format!("Field '{}' must be one of: {}", def.name, values.join(", ")),
                        value,
                    ))
                }
            }
        }
    }

    fn check_pattern(&self, def: &FieldDef, value: &str) -> CvlResult<()> {
        match self.table.pattern(&def.name) {
            Some(re) if !re.is_match(value) => Err(self.field_error(
                def,
                CvlErrorCode::SyntaxPatternInvalid,
                format!("Field '{}' does not match pattern '{}'", def.name, def.pattern.as_deref().unwrap_or_default()),
                value,
            )),
            _ => Ok(()),
        }
    }

    fn check_leafref(&self, def: &FieldDef, value: &str) -> CvlResult<()> {
        let Some(targets) = self.table.leafref_targets.get(&def.name) else {
            return Ok(());
        };
        if targets.is_empty() || value.is_empty() {
            return Ok(());
        }

        let resolves = targets.iter().any(|target| {
            self.subject.contains_value(&target.table, &target.field, value)
                || self
                    .dependent
                    .map_or(false, |dep| dep.contains_value(&target.table, &target.field, value))
        });
        if resolves {
            return Ok(());
        }

        let wanted: Vec<String> = targets.iter().map(|t| format!("{}.{}", t.table, t.field)).collect();
        Err(self.field_error(
            def,
            CvlErrorCode::SemanticDependentDataMissing,
            format!("No entry in {} for value '{}'", wanted.join(" or "), value),
            value,
        ))
    }

    fn error(&self, code: CvlErrorCode, message: String) -> CvlError {
        CvlError::new(code, message).at(self.table.name.as_str(), self.key_components.clone())
    }

    fn field_error(&self, def: &FieldDef, code: CvlErrorCode, message: String, value: &str) -> CvlError {
        self.error(code, message)
            .field(def.name.as_str(), value)
            .constraint(def.error_message.as_deref(), def.error_app_tag.as_deref())
    }
}

fn key_components(table: &TableSchema, doc: &Document, instance: NodeId) -> Vec<String> {
    let key = doc.node(instance).key().unwrap_or_default();
    table.split_key(key).unwrap_or_else(|| vec![key.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaModule, TableDef};
    use crate::translate::{translate_row, FieldMap};

    fn schema() -> Arc<SchemaIndex> {
        let mut admin = FieldDef::enumeration("admin_status", &["up", "down"]);
        admin.error_app_tag = Some("admin-status-invalid".into());
        Arc::new(
            SchemaIndex::build(vec![
                SchemaModule::new(
                    "sonic-port",
                    vec![TableDef::new("PORT", "PORT|{name}")
                        .field(FieldDef::string("name").pattern("Ethernet[0-9]+"))
                        .field(FieldDef::string("lanes").mandatory())
                        .field(FieldDef::int("mtu", Some(68), Some(9216)))
                        .field(admin)],
                ),
                SchemaModule::new(
                    "sonic-vlan",
                    vec![TableDef::new("VLAN_MEMBER", "VLAN_MEMBER|{vlan_name}|{port}")
                        .field(FieldDef::string("port").leafref("/sonic-port:sonic-port/PORT/PORT_LIST/name"))
                        .field(FieldDef::enumeration("tagging_mode", &["tagged", "untagged"]))],
                ),
            ])
            .unwrap(),
        )
    }

    fn row(schema: &SchemaIndex, table: &str, key: &str, fields: &[(&str, &str)]) -> Document {
        let fields: FieldMap = fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        translate_row(schema, table, key, &fields).unwrap()
    }

    #[test]
    fn test_valid_create_passes() {
        let schema = schema();
        let processor = BuiltinProcessor::new(schema.clone());
        let subject = row(&schema, "PORT", "Ethernet0", &[("lanes", "0,1"), ("mtu", "9100")]);
        processor.validate(&subject, None, Operation::Create).unwrap();
    }

    #[test]
    fn test_out_of_range() {
        let schema = schema();
        let processor = BuiltinProcessor::new(schema.clone());
        let subject = row(&schema, "PORT", "Ethernet0", &[("lanes", "0"), ("mtu", "10000")]);
        let err = processor.validate(&subject, None, Operation::Create).unwrap_err();
        assert_eq!(err.code(), CvlErrorCode::SyntaxOutOfRange);
        assert_eq!(err.info().field, "mtu");
        assert_eq!(err.info().key_components, vec!["Ethernet0".to_string()]);
    }

    #[test]
    fn test_enum_carries_app_tag() {
        let schema = schema();
        let processor = BuiltinProcessor::new(schema.clone());
        let subject = row(&schema, "PORT", "Ethernet0", &[("admin_status", "sideways")]);
        let err = processor.validate(&subject, None, Operation::Update).unwrap_err();
        assert_eq!(err.code(), CvlErrorCode::SyntaxEnumInvalid);
        assert_eq!(err.info().error_app_tag, "admin-status-invalid");
    }

    #[test]
    fn test_key_pattern_checked() {
        let schema = schema();
        let processor = BuiltinProcessor::new(schema.clone());
        let subject = row(&schema, "PORT", "Eth0", &[("lanes", "0")]);
        let err = processor.validate(&subject, None, Operation::Create).unwrap_err();
        assert_eq!(err.code(), CvlErrorCode::SyntaxPatternInvalid);
        assert_eq!(err.info().field, "name");
    }

    #[test]
    fn test_unknown_field() {
        let schema = schema();
        let processor = BuiltinProcessor::new(schema.clone());
        let subject = row(&schema, "PORT", "Ethernet0", &[("speed", "100000")]);
        let err = processor.validate(&subject, None, Operation::Update).unwrap_err();
        assert_eq!(err.code(), CvlErrorCode::SyntaxInvalidField);
    }

    #[test]
    fn test_mandatory_only_on_create() {
        let schema = schema();
        let processor = BuiltinProcessor::new(schema.clone());
        let subject = row(&schema, "PORT", "Ethernet0", &[("mtu", "1500")]);
        let err = processor.validate(&subject, None, Operation::Create).unwrap_err();
        assert_eq!(err.code(), CvlErrorCode::SemanticMandatoryDataMissing);
        processor.validate(&subject, None, Operation::Update).unwrap();
    }

    #[test]
    fn test_mandatory_field_delete_rejected() {
        let schema = schema();
        let processor = BuiltinProcessor::new(schema.clone());
        let subject = row(&schema, "PORT", "Ethernet0", &[("lanes", "")]);
        let err = processor.validate(&subject, None, Operation::Delete).unwrap_err();
        assert_eq!(err.code(), CvlErrorCode::SemanticMandatoryDataMissing);
    }

    #[test]
    fn test_leafref_resolves_in_dependent() {
        let schema = schema();
        let processor = BuiltinProcessor::new(schema.clone());
        let subject = row(&schema, "VLAN_MEMBER", "Vlan10|Ethernet0", &[("tagging_mode", "tagged")]);

        let err = processor.validate(&subject, None, Operation::Create).unwrap_err();
        assert_eq!(err.code(), CvlErrorCode::SemanticDependentDataMissing);
        assert_eq!(err.info().value, "Ethernet0");

        let dependent = row(&schema, "PORT", "Ethernet0", &[("lanes", "0")]);
        processor
            .validate(&subject, Some(&dependent), Operation::Create)
            .unwrap();
    }
}
