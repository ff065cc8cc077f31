//! Two-level code trees: definitions and their hierarchical values
//!
//! Code definitions (activity codes, resource codes, ...) are flat. Their
//! values form a hierarchy within each definition. Values are sorted so that
//! parents precede children, then attached to their definition; a parent is
//! only ever looked up within the value's own definition.

use crate::error::{Error, Result};
use crate::hierarchy::sort_hierarchy;
use crate::record::{DecodePolicy, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The code families an import reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    Activity,
    Project,
    Resource,
    Role,
    Assignment,
}

impl CodeKind {
    /// Column layout of this kind's definition and value tables
    pub fn columns(self) -> CodeColumns {
        match self {
            CodeKind::Activity => CodeColumns {
                definition_table: "actvtype".to_string(),
                value_table: "actvcode".to_string(),
                definition_id: "actv_code_type_id".to_string(),
                definition_sequence: Some("seq_num".to_string()),
                definition_name: Some("actv_code_type".to_string()),
                definition_max_length: Some("actv_short_len".to_string()),
                definition_secure: Some("super_flag".to_string()),
                value_id: "actv_code_id".to_string(),
                value_definition_id: "actv_code_type_id".to_string(),
                value_parent_id: "parent_actv_code_id".to_string(),
                value_sequence: Some("seq_num".to_string()),
                value_name: Some("short_name".to_string()),
                value_description: Some("actv_code_name".to_string()),
                value_color: Some("color".to_string()),
            },
            CodeKind::Project => CodeColumns::category("pcattype", "pcatval", "proj"),
            CodeKind::Resource => CodeColumns::category("rcattype", "rcatval", "rsrc"),
            CodeKind::Role => CodeColumns::category("rolecattype", "rolecatval", "role"),
            CodeKind::Assignment => {
                CodeColumns::category("asgnmntcattype", "asgnmntcatval", "asgnmnt")
            }
        }
    }
}

/// Column names used to read one code kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeColumns {
    pub definition_table: String,
    pub value_table: String,
    pub definition_id: String,
    pub definition_sequence: Option<String>,
    pub definition_name: Option<String>,
    pub definition_max_length: Option<String>,
    pub definition_secure: Option<String>,
    pub value_id: String,
    pub value_definition_id: String,
    pub value_parent_id: String,
    pub value_sequence: Option<String>,
    pub value_name: Option<String>,
    pub value_description: Option<String>,
    pub value_color: Option<String>,
}

impl CodeColumns {
    /// Minimal layout: ids and parent link only
    pub fn new(
        definition_id: impl Into<String>,
        value_id: impl Into<String>,
        value_definition_id: impl Into<String>,
        value_parent_id: impl Into<String>,
    ) -> Self {
        Self {
            definition_table: "definitions".to_string(),
            value_table: "values".to_string(),
            definition_id: definition_id.into(),
            definition_sequence: None,
            definition_name: None,
            definition_max_length: None,
            definition_secure: None,
            value_id: value_id.into(),
            value_definition_id: value_definition_id.into(),
            value_parent_id: value_parent_id.into(),
            value_sequence: None,
            value_name: None,
            value_description: None,
            value_color: None,
        }
    }

    /// Layout shared by the `<prefix>_catg_*` code tables
    fn category(definition_table: &str, value_table: &str, prefix: &str) -> Self {
        Self {
            definition_table: definition_table.to_string(),
            value_table: value_table.to_string(),
            definition_id: format!("{prefix}_catg_type_id"),
            definition_sequence: Some("seq_num".to_string()),
            definition_name: Some(format!("{prefix}_catg_type")),
            definition_max_length: Some(format!("{prefix}_catg_short_len")),
            definition_secure: None,
            value_id: format!("{prefix}_catg_id"),
            value_definition_id: format!("{prefix}_catg_type_id"),
            value_parent_id: format!("parent_{prefix}_catg_id"),
            value_sequence: Some("seq_num".to_string()),
            value_name: Some(format!("{prefix}_catg_short_name")),
            value_description: Some(format!("{prefix}_catg_name")),
            value_color: None,
        }
    }
}

/// A code definition and the values attached to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeDefinition {
    pub unique_id: i32,
    pub sequence_number: Option<i32>,
    pub name: Option<String>,
    pub max_length: Option<i32>,
    pub secure: bool,
    /// Ids of every attached value, in attachment order
    pub values: Vec<i32>,
}

/// One value of a code definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeValue {
    pub unique_id: i32,
    pub definition_id: i32,
    /// Parent value within the same definition; `None` for roots
    pub parent_id: Option<i32>,
    pub sequence_number: Option<i32>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    /// Ids of direct children, in attachment order
    pub children: Vec<i32>,
}

/// Finished definitions and values for one code kind
#[derive(Debug, Clone, Default, Serialize)]
pub struct CodeTree {
    definitions: Vec<CodeDefinition>,
    values: Vec<CodeValue>,
    #[serde(skip)]
    definition_index: HashMap<i32, usize>,
    #[serde(skip)]
    value_index: HashMap<(i32, i32), usize>,
}

impl CodeTree {
    /// Definitions in input order
    pub fn definitions(&self) -> &[CodeDefinition] {
        &self.definitions
    }

    pub fn definition(&self, unique_id: i32) -> Option<&CodeDefinition> {
        self.definition_index
            .get(&unique_id)
            .map(|&i| &self.definitions[i])
    }

    /// Look up a value within one definition
    pub fn value(&self, definition_id: i32, value_id: i32) -> Option<&CodeValue> {
        self.value_index
            .get(&(definition_id, value_id))
            .map(|&i| &self.values[i])
    }

    /// Look up a value by id alone, across all definitions
    pub fn find_value(&self, value_id: i32) -> Option<&CodeValue> {
        self.values.iter().find(|v| v.unique_id == value_id)
    }

    /// Every value attached to a definition, in attachment order
    pub fn values_of(&self, definition_id: i32) -> impl Iterator<Item = &CodeValue> + '_ {
        self.definition(definition_id)
            .into_iter()
            .flat_map(move |d| d.values.iter().filter_map(move |&id| self.value(d.unique_id, id)))
    }

    /// Values of a definition that have no parent
    pub fn roots(&self, definition_id: i32) -> impl Iterator<Item = &CodeValue> + '_ {
        self.values_of(definition_id).filter(|v| v.parent_id.is_none())
    }

    /// Direct children of a value
    pub fn children<'a>(
        &'a self,
        value: &'a CodeValue,
    ) -> impl Iterator<Item = &'a CodeValue> + 'a {
        value
            .children
            .iter()
            .filter_map(move |&id| self.value(value.definition_id, id))
    }

    /// Number of attached values
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn add_definition(&mut self, definition: CodeDefinition) -> bool {
        if self.definition_index.contains_key(&definition.unique_id) {
            return false;
        }
        self.definition_index
            .insert(definition.unique_id, self.definitions.len());
        self.definitions.push(definition);
        true
    }

    /// Attach a value below its definition and, when present, its parent
    fn attach(&mut self, mut value: PendingValue, definition: usize) -> bool {
        let definition_id = self.definitions[definition].unique_id;
        let key = (definition_id, value.unique_id);
        if self.value_index.contains_key(&key) {
            return false;
        }

        let parent = value
            .parent_id
            .and_then(|id| self.value_index.get(&(definition_id, id)).copied());
        if parent.is_none() {
            value.parent_id = None;
        }

        let position = self.values.len();
        self.values.push(CodeValue {
            unique_id: value.unique_id,
            definition_id,
            parent_id: value.parent_id,
            sequence_number: value.sequence_number,
            name: value.name,
            description: value.description,
            color: value.color,
            children: Vec::new(),
        });
        self.value_index.insert(key, position);
        self.definitions[definition].values.push(value.unique_id);
        if let Some(parent) = parent {
            self.values[parent].children.push(value.unique_id);
        }
        true
    }
}

/// A decoded value row not yet attached to a definition
#[derive(Debug, Clone)]
struct PendingValue {
    unique_id: i32,
    definition_id: Option<i32>,
    parent_id: Option<i32>,
    sequence_number: Option<i32>,
    name: Option<String>,
    description: Option<String>,
    color: Option<String>,
}

/// Builds a [`CodeTree`] from definition and value records
#[derive(Debug, Clone)]
pub struct CodeTreeBuilder {
    columns: CodeColumns,
    policy: DecodePolicy,
}

impl CodeTreeBuilder {
    pub fn new(columns: CodeColumns, policy: DecodePolicy) -> Self {
        Self { columns, policy }
    }

    /// Builder using the standard layout of a code kind
    pub fn for_kind(kind: CodeKind, policy: DecodePolicy) -> Self {
        Self::new(kind.columns(), policy)
    }

    pub fn columns(&self) -> &CodeColumns {
        &self.columns
    }

    /// Materialize definitions, order values parent-first and attach them.
    ///
    /// Values whose definition is unknown are dropped. A parent id that is
    /// absent, unknown, or owned by another definition makes the value a root.
    pub fn build(&self, definitions: &[Record<'_>], values: &[Record<'_>]) -> Result<CodeTree> {
        let mut tree = CodeTree::default();

        for record in definitions {
            let Some(definition) = self.read_definition(record)? else {
                continue;
            };
            let id = definition.unique_id;
            if !tree.add_definition(definition) {
                tracing::warn!(
                    table = %self.columns.definition_table,
                    id,
                    "duplicate code definition, keeping first"
                );
            }
        }

        let mut pending = Vec::with_capacity(values.len());
        for record in values {
            if let Some(value) = self.read_value(record)? {
                pending.push(value);
            }
        }

        // Value ids are only unique within their definition
        let sorted = sort_hierarchy(
            pending,
            |v| v.definition_id.map(|d| (d, v.unique_id)),
            |v| v.definition_id.zip(v.parent_id),
        );

        let mut dropped = 0usize;
        for value in sorted {
            let definition = value
                .definition_id
                .and_then(|id| tree.definition_index.get(&id).copied());
            let Some(definition) = definition else {
                dropped += 1;
                continue;
            };
            let id = value.unique_id;
            if !tree.attach(value, definition) {
                tracing::warn!(
                    table = %self.columns.value_table,
                    id,
                    "duplicate code value, keeping first"
                );
            }
        }

        tracing::debug!(
            definitions = tree.definitions.len(),
            values = tree.values.len(),
            dropped,
            table = %self.columns.value_table,
            "built code tree"
        );
        Ok(tree)
    }

    fn read_definition(&self, record: &Record<'_>) -> Result<Option<CodeDefinition>> {
        let columns = &self.columns;
        let table = &columns.definition_table;
        let Some(unique_id) = self.required_id(record, table, &columns.definition_id)? else {
            return Ok(None);
        };

        Ok(Some(CodeDefinition {
            unique_id,
            sequence_number: optional(record, &columns.definition_sequence, Record::get_id)?,
            name: optional(record, &columns.definition_name, Record::get_string)?,
            max_length: optional(record, &columns.definition_max_length, Record::get_id)?,
            secure: match &columns.definition_secure {
                Some(column) => record.get_bool(column)?,
                None => false,
            },
            values: Vec::new(),
        }))
    }

    fn read_value(&self, record: &Record<'_>) -> Result<Option<PendingValue>> {
        let columns = &self.columns;
        let table = &columns.value_table;
        let Some(unique_id) = self.required_id(record, table, &columns.value_id)? else {
            return Ok(None);
        };

        Ok(Some(PendingValue {
            unique_id,
            definition_id: record.get_id(&columns.value_definition_id)?,
            parent_id: record.get_id(&columns.value_parent_id)?,
            sequence_number: optional(record, &columns.value_sequence, Record::get_id)?,
            name: optional(record, &columns.value_name, Record::get_string)?,
            description: optional(record, &columns.value_description, Record::get_string)?,
            color: optional(record, &columns.value_color, Record::get_string)?,
        }))
    }

    /// Read an id column; a missing id is an error only under a strict policy
    fn required_id(&self, record: &Record<'_>, table: &str, column: &str) -> Result<Option<i32>> {
        let id = record.get_id(column)?;
        if id.is_none() {
            if self.policy.is_strict() {
                return Err(Error::MissingField {
                    table: table.to_string(),
                    field: column.to_string(),
                });
            }
            tracing::warn!(table, field = column, "skipping row without id");
        }
        Ok(id)
    }
}

fn optional<'r, T>(
    record: &Record<'r>,
    column: &Option<String>,
    get: impl Fn(&Record<'r>, &str) -> Result<Option<T>>,
) -> Result<Option<T>> {
    match column {
        Some(column) => get(record, column),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MapRow;

    fn columns() -> CodeColumns {
        CodeColumns {
            value_name: Some("name".to_string()),
            ..CodeColumns::new("type_id", "id", "type_id", "parent_id")
        }
    }

    fn definition(id: i32) -> MapRow {
        MapRow::new().with("type_id", id)
    }

    fn value(id: i32, type_id: i32, parent: Option<i32>, name: &str) -> MapRow {
        MapRow::new()
            .with("id", id)
            .with("type_id", type_id)
            .with("parent_id", parent)
            .with("name", name)
    }

    fn build(definitions: &[MapRow], values: &[MapRow], policy: DecodePolicy) -> Result<CodeTree> {
        let definitions: Vec<_> = definitions.iter().map(|r| r.record(policy)).collect();
        let values: Vec<_> = values.iter().map(|r| r.record(policy)).collect();
        CodeTreeBuilder::new(columns(), policy).build(&definitions, &values)
    }

    fn value_ids<'a>(values: impl Iterator<Item = &'a CodeValue>) -> Vec<i32> {
        values.map(|v| v.unique_id).collect()
    }

    fn assert_reference_tree(tree: &CodeTree) {
        assert_eq!(tree.definitions().len(), 2);
        assert_eq!(tree.definition(1).unwrap().values, vec![1, 2]);
        assert_eq!(tree.definition(2).unwrap().values, vec![3]);

        let v1 = tree.value(1, 1).unwrap();
        assert_eq!(v1.parent_id, None);
        assert_eq!(value_ids(tree.children(v1)), vec![2]);
        assert_eq!(tree.value(1, 2).unwrap().parent_id, Some(1));
        assert_eq!(value_ids(tree.roots(1)), vec![1]);
        assert_eq!(value_ids(tree.roots(2)), vec![3]);
    }

    #[test]
    fn test_reference_tree() {
        let tree = build(
            &[definition(1), definition(2)],
            &[
                value(1, 1, None, "V1"),
                value(2, 1, Some(1), "V2"),
                value(3, 2, None, "V3"),
            ],
            DecodePolicy::Strict,
        )
        .unwrap();
        assert_reference_tree(&tree);
        assert_eq!(tree.value(1, 2).unwrap().name.as_deref(), Some("V2"));
    }

    #[test]
    fn test_reference_tree_child_first() {
        let tree = build(
            &[definition(1), definition(2)],
            &[
                value(2, 1, Some(1), "V2"),
                value(1, 1, None, "V1"),
                value(3, 2, None, "V3"),
            ],
            DecodePolicy::Strict,
        )
        .unwrap();
        assert_reference_tree(&tree);
    }

    #[test]
    fn test_unknown_definition_dropped() {
        let tree = build(
            &[definition(1)],
            &[value(1, 1, None, "kept"), value(2, 99, None, "dropped")],
            DecodePolicy::Strict,
        )
        .unwrap();
        assert_eq!(tree.value_count(), 1);
        assert!(tree.find_value(2).is_none());
    }

    #[test]
    fn test_parent_in_other_definition_becomes_root() {
        let tree = build(
            &[definition(1), definition(2)],
            &[value(1, 1, None, "a"), value(2, 2, Some(1), "b")],
            DecodePolicy::Strict,
        )
        .unwrap();
        let b = tree.value(2, 2).unwrap();
        assert_eq!(b.parent_id, None);
        assert!(tree.value(1, 1).unwrap().children.is_empty());
        assert_eq!(value_ids(tree.roots(2)), vec![2]);
    }

    #[test]
    fn test_same_value_id_in_two_definitions() {
        let values = [
            value(1, 1, None, "A"),
            value(5, 2, Some(1), "B child"),
            value(1, 2, None, "B"),
        ];
        let reversed: Vec<_> = values.iter().rev().cloned().collect();

        for values in [&values[..], &reversed[..]] {
            let definitions = [definition(1), definition(2)];
            let tree = build(&definitions, values, DecodePolicy::Strict).unwrap();
            assert_eq!(tree.value(2, 5).unwrap().parent_id, Some(1));
            assert_eq!(value_ids(tree.children(tree.value(2, 1).unwrap())), vec![5]);
            assert!(tree.value(1, 1).unwrap().children.is_empty());
            assert_eq!(value_ids(tree.roots(2)), vec![1]);
        }
    }

    #[test]
    fn test_cyclic_values_all_attached() {
        let tree = build(
            &[definition(1)],
            &[value(1, 1, Some(2), "a"), value(2, 1, Some(1), "b")],
            DecodePolicy::Lenient,
        )
        .unwrap();
        assert_eq!(tree.definition(1).unwrap().values, vec![1, 2]);
        assert_eq!(tree.value(1, 1).unwrap().parent_id, None);
        // b is attached after a, so it finds a as its parent
        assert_eq!(tree.value(1, 2).unwrap().parent_id, Some(1));
    }

    #[test]
    fn test_nested_three_levels() {
        let tree = build(
            &[definition(1)],
            &[
                value(3, 1, Some(2), "leaf"),
                value(2, 1, Some(1), "mid"),
                value(1, 1, None, "top"),
                value(4, 1, Some(1), "sibling"),
            ],
            DecodePolicy::Strict,
        )
        .unwrap();
        assert_eq!(tree.definition(1).unwrap().values, vec![1, 4, 2, 3]);
        let top = tree.value(1, 1).unwrap();
        assert_eq!(top.children, vec![4, 2]);
        assert_eq!(tree.value(1, 2).unwrap().children, vec![3]);
    }

    #[test]
    fn test_missing_value_id_strict() {
        let err = build(
            &[definition(1)],
            &[MapRow::new().with("type_id", 1)],
            DecodePolicy::Strict,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingField { ref field, .. } if field == "id"));
    }

    #[test]
    fn test_missing_value_id_lenient() {
        let tree = build(
            &[definition(1)],
            &[MapRow::new().with("type_id", 1), value(5, 1, None, "ok")],
            DecodePolicy::Lenient,
        )
        .unwrap();
        assert_eq!(tree.value_count(), 1);
    }

    #[test]
    fn test_malformed_parent_strict_aborts() {
        let bad = MapRow::new()
            .with("id", 2)
            .with("type_id", 1)
            .with("parent_id", "first");
        let err = build(&[definition(1)], &[bad.clone()], DecodePolicy::Strict).unwrap_err();
        assert!(matches!(err, Error::FieldDecode { ref field, .. } if field == "parent_id"));

        let tree = build(&[definition(1)], &[bad], DecodePolicy::Lenient).unwrap();
        assert_eq!(value_ids(tree.roots(1)), vec![2]);
    }

    #[test]
    fn test_duplicate_definition_first_wins() {
        let tree = build(
            &[definition(1), definition(1)],
            &[value(1, 1, None, "a")],
            DecodePolicy::Strict,
        )
        .unwrap();
        assert_eq!(tree.definitions().len(), 1);
        assert_eq!(tree.definition(1).unwrap().values, vec![1]);
    }

    #[test]
    fn test_activity_layout() {
        let columns = CodeKind::Activity.columns();
        assert_eq!(columns.value_parent_id, "parent_actv_code_id");
        let columns = CodeKind::Resource.columns();
        assert_eq!(columns.definition_id, "rsrc_catg_type_id");
        assert_eq!(columns.value_name.as_deref(), Some("rsrc_catg_short_name"));
    }
}
