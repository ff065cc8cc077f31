//! Output model handed to downstream assembly

use crate::code_tree::{CodeKind, CodeTree};
use crate::value::{DataType, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The kinds of entity an import materializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Resource,
    Role,
    Wbs,
    Task,
    Assignment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Resource,
        EntityKind::Role,
        EntityKind::Wbs,
        EntityKind::Task,
        EntityKind::Assignment,
    ];

    /// Source table name, as used to key extended attribute values
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Resource => "RSRC",
            EntityKind::Role => "ROLE",
            EntityKind::Wbs => "PROJWBS",
            EntityKind::Task => "TASK",
            EntityKind::Assignment => "TASKRSRC",
        }
    }

    /// Look up a kind by its source table name
    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.table_name().eq_ignore_ascii_case(name))
    }

    /// Column holding the entity's own id
    pub fn id_column(self) -> &'static str {
        match self {
            EntityKind::Resource => "rsrc_id",
            EntityKind::Role => "role_id",
            EntityKind::Wbs => "wbs_id",
            EntityKind::Task => "task_id",
            EntityKind::Assignment => "taskrsrc_id",
        }
    }

    /// Column naming a parent of the same kind, for hierarchical kinds
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            EntityKind::Resource => Some("parent_rsrc_id"),
            EntityKind::Role => Some("parent_role_id"),
            EntityKind::Wbs => Some("parent_wbs_id"),
            EntityKind::Task | EntityKind::Assignment => None,
        }
    }

    /// Whether ids of this kind share the reconciled activity namespace
    pub fn is_activity(self) -> bool {
        matches!(self, EntityKind::Wbs | EntityKind::Task)
    }
}

/// An extended (user-defined) attribute value waiting for its entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredAttribute {
    /// Id of the attribute definition
    pub field_id: i32,
    pub value: FieldValue,
}

/// Definition of an extended attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub unique_id: i32,
    /// Kind of entity the attribute belongs to
    pub kind: EntityKind,
    pub internal_name: Option<String>,
    pub external_name: Option<String>,
    pub data_type: DataType,
}

impl AttributeDefinition {
    /// Display name: the external label if present, else the internal name
    pub fn name(&self) -> Option<&str> {
        self.external_name
            .as_deref()
            .or(self.internal_name.as_deref())
    }
}

/// One materialized entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub kind: EntityKind,
    /// Id after reconciliation
    pub unique_id: i32,
    /// Id as read from the source
    pub original_id: i32,
    /// Parent of the same kind, if that parent was materialized
    pub parent_id: Option<i32>,
    /// Mapped attribute values keyed by attribute name
    pub attributes: BTreeMap<String, FieldValue>,
    pub extended_attributes: Vec<DeferredAttribute>,
}

impl Entity {
    pub fn new(kind: EntityKind, unique_id: i32, original_id: i32) -> Self {
        Self {
            kind,
            unique_id,
            original_id,
            parent_id: None,
            attributes: BTreeMap::new(),
            extended_attributes: Vec::new(),
        }
    }

    /// Get a mapped attribute value
    pub fn attribute(&self, name: &str) -> Option<&FieldValue> {
        self.attributes.get(name)
    }

    /// Get an extended attribute value by definition id
    pub fn extended_attribute(&self, field_id: i32) -> Option<&FieldValue> {
        self.extended_attributes
            .iter()
            .find(|a| a.field_id == field_id)
            .map(|a| &a.value)
    }
}

/// A predecessor/successor link between two activities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub unique_id: Option<i32>,
    pub predecessor_id: i32,
    pub successor_id: i32,
    pub relation_type: Option<String>,
    pub lag_hours: Option<f64>,
}

/// Everything an import session produces
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectContainer {
    entities: BTreeMap<EntityKind, Vec<Entity>>,
    codes: BTreeMap<CodeKind, CodeTree>,
    relations: Vec<Relation>,
    attribute_definitions: Vec<AttributeDefinition>,
    #[serde(skip)]
    entity_index: HashMap<(EntityKind, i32), usize>,
    #[serde(skip)]
    attribute_index: HashMap<i32, usize>,
}

impl ProjectContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity; the first entity with a given id stays reachable by id
    pub fn add_entity(&mut self, entity: Entity) {
        let list = self.entities.entry(entity.kind).or_default();
        self.entity_index
            .entry((entity.kind, entity.unique_id))
            .or_insert(list.len());
        list.push(entity);
    }

    /// Entities of one kind in the order they were read
    pub fn entities(&self, kind: EntityKind) -> &[Entity] {
        self.entities.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find an entity by its reconciled id
    pub fn entity(&self, kind: EntityKind, unique_id: i32) -> Option<&Entity> {
        let position = *self.entity_index.get(&(kind, unique_id))?;
        self.entities.get(&kind).and_then(|list| list.get(position))
    }

    pub fn contains_entity(&self, kind: EntityKind, unique_id: i32) -> bool {
        self.entity_index.contains_key(&(kind, unique_id))
    }

    /// Store the code tree for one code kind, replacing any earlier one
    pub fn set_codes(&mut self, kind: CodeKind, tree: CodeTree) {
        self.codes.insert(kind, tree);
    }

    pub fn codes(&self, kind: CodeKind) -> Option<&CodeTree> {
        self.codes.get(&kind)
    }

    pub fn add_relation(&mut self, relation: Relation) {
        self.relations.push(relation);
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Add an attribute definition; later duplicates are ignored
    pub fn add_attribute_definition(&mut self, definition: AttributeDefinition) -> bool {
        if self.attribute_index.contains_key(&definition.unique_id) {
            return false;
        }
        self.attribute_index
            .insert(definition.unique_id, self.attribute_definitions.len());
        self.attribute_definitions.push(definition);
        true
    }

    pub fn attribute_definition(&self, unique_id: i32) -> Option<&AttributeDefinition> {
        self.attribute_index
            .get(&unique_id)
            .and_then(|&i| self.attribute_definitions.get(i))
    }

    pub fn attribute_definitions(&self) -> &[AttributeDefinition] {
        &self.attribute_definitions
    }

    /// Total number of entities across all kinds
    pub fn entity_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_table_names() {
        assert_eq!(EntityKind::from_table_name("TASK"), Some(EntityKind::Task));
        assert_eq!(EntityKind::from_table_name("projwbs"), Some(EntityKind::Wbs));
        assert_eq!(EntityKind::from_table_name("PROJECT"), None);
    }

    #[test]
    fn test_container_entity_lookup() {
        let mut container = ProjectContainer::new();
        container.add_entity(Entity::new(EntityKind::Task, 10, 10));
        container.add_entity(Entity::new(EntityKind::Task, 11, 10));
        container.add_entity(Entity::new(EntityKind::Wbs, 10, 10));

        assert_eq!(container.entities(EntityKind::Task).len(), 2);
        assert_eq!(container.entity(EntityKind::Task, 11).unwrap().original_id, 10);
        assert!(container.contains_entity(EntityKind::Wbs, 10));
        assert!(container.entity(EntityKind::Role, 10).is_none());
        assert_eq!(container.entity_count(), 3);
    }

    #[test]
    fn test_attribute_definition_first_wins() {
        let mut container = ProjectContainer::new();
        let definition = AttributeDefinition {
            unique_id: 1,
            kind: EntityKind::Task,
            internal_name: Some("user_field_1".to_string()),
            external_name: Some("Risk".to_string()),
            data_type: DataType::Text,
        };
        assert!(container.add_attribute_definition(definition.clone()));
        assert!(!container.add_attribute_definition(AttributeDefinition {
            external_name: None,
            ..definition
        }));
        assert_eq!(container.attribute_definition(1).unwrap().name(), Some("Risk"));
    }
}
