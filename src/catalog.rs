//! Entity/type schema catalog seam.
//!
//! The real catalog is an external collaborator; this module defines the
//! lookup contract the engine needs (entity types, expected fields per
//! type, per-field value specs) and an in-memory implementation for
//! embedded use and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;

use crate::value::{FieldValue, ValueKind};

/// Expected shape of one field's values.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Expected value kind.
    pub kind: ValueKind,

    /// Optional conformance pattern for string fields.
    pub pattern: Option<Regex>,
}

impl FieldSpec {
    /// Spec accepting any value of the given kind.
    #[must_use]
    pub const fn of_kind(kind: ValueKind) -> Self {
        Self {
            kind,
            pattern: None,
        }
    }

    /// String spec whose values must match `pattern`.
    #[must_use]
    pub fn string_matching(pattern: Regex) -> Self {
        Self {
            kind: ValueKind::String,
            pattern: Some(pattern),
        }
    }

    /// Checks a value against this spec.
    #[must_use]
    pub fn conforms(&self, value: &FieldValue) -> bool {
        if value.kind() != self.kind {
            return false;
        }
        match (&self.pattern, value.as_str()) {
            (Some(re), Some(s)) => re.is_match(s),
            _ => true,
        }
    }
}

/// Schema lookup contract provided by the (out-of-scope) entity catalog.
///
/// Implementations must be safe to call concurrently with ingestion.
pub trait EntityCatalog: Send + Sync {
    /// Returns the type of an entity, if the catalog knows it.
    fn entity_type(&self, entity_id: &str) -> Option<String>;

    /// Returns the fields a complete record of this entity type carries.
    fn expected_fields(&self, entity_type: &str) -> Vec<String>;

    /// Returns the value spec for a field, if one is declared.
    fn field_spec(&self, field_name: &str) -> Option<FieldSpec>;
}

/// In-memory catalog for embedded use and tests.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entity_types: RwLock<HashMap<String, String>>,
    type_fields: RwLock<HashMap<String, Vec<String>>>,
    field_specs: RwLock<HashMap<String, FieldSpec>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity under a type.
    pub fn register_entity(&self, entity_id: impl Into<String>, entity_type: impl Into<String>) {
        self.entity_types
            .write()
            .expect("catalog entity lock poisoned")
            .insert(entity_id.into(), entity_type.into());
    }

    /// Declares the expected fields of an entity type.
    pub fn define_type(&self, entity_type: impl Into<String>, fields: Vec<String>) {
        self.type_fields
            .write()
            .expect("catalog type lock poisoned")
            .insert(entity_type.into(), fields);
    }

    /// Declares the value spec for a field.
    pub fn define_field(&self, field_name: impl Into<String>, spec: FieldSpec) {
        self.field_specs
            .write()
            .expect("catalog field lock poisoned")
            .insert(field_name.into(), spec);
    }
}

impl EntityCatalog for InMemoryCatalog {
    fn entity_type(&self, entity_id: &str) -> Option<String> {
        self.entity_types
            .read()
            .expect("catalog entity lock poisoned")
            .get(entity_id)
            .cloned()
    }

    fn expected_fields(&self, entity_type: &str) -> Vec<String> {
        self.type_fields
            .read()
            .expect("catalog type lock poisoned")
            .get(entity_type)
            .cloned()
            .unwrap_or_default()
    }

    fn field_spec(&self, field_name: &str) -> Option<FieldSpec> {
        self.field_specs
            .read()
            .expect("catalog field lock poisoned")
            .get(field_name)
            .cloned()
    }
}
