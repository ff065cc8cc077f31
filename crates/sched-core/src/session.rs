//! One import, start to finish
//!
//! [`ImportSession`] owns a [`ReaderState`] and reads record sets into it in
//! dependency order: attribute definitions, attribute values, codes, then
//! entities (WBS before tasks, tasks before assignments) and finally
//! relations. Each read decodes its whole batch before committing anything.
//! Under a strict policy the first error aborts the session: the failing read
//! commits nothing, later reads are refused and [`ImportSession::finish`]
//! returns [`Error::SessionAborted`]. Under a lenient policy every read
//! completes.

use crate::code_tree::{CodeKind, CodeTreeBuilder};
use crate::config::ImportConfig;
use crate::error::{Error, Result};
use crate::hierarchy::sort_hierarchy;
use crate::model::{
    AttributeDefinition, DeferredAttribute, Entity, EntityKind, ProjectContainer, Relation,
};
use crate::reconciler::IdentifierReconciler;
use crate::record::{Record, Table};
use crate::state::{DeferredAttributes, ReaderState};
use crate::value::{DataType, FieldValue};
use std::collections::HashSet;

/// Table name used when reporting relation problems
const RELATION_TABLE: &str = "TASKPRED";

/// What a finished session hands to downstream assembly
#[derive(Debug)]
pub struct ImportResult {
    pub container: ProjectContainer,
    /// Activity id reconciler, for resolving ids that arrive later
    pub reconciler: IdentifierReconciler,
    pub deferred: DeferredAttributes,
}

/// Drives one [`ReaderState`] through the reads of a single import
#[derive(Debug)]
pub struct ImportSession {
    state: ReaderState,
    aborted: bool,
}

impl ImportSession {
    pub fn new(config: ImportConfig) -> Self {
        Self {
            state: ReaderState::new(config),
            aborted: false,
        }
    }

    /// State as committed by the reads that succeeded so far
    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    /// Whether a failed read has aborted this session
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Array-backed records for a table, using this session's policy
    pub fn records<'t>(&self, table: &'t Table) -> Vec<Record<'t>> {
        table.records(self.state.policy()).collect()
    }

    /// Read extended attribute definitions.
    ///
    /// Definitions for tables that map to no entity kind are skipped.
    pub fn read_attribute_definitions(&mut self, records: &[Record<'_>]) -> Result<()> {
        self.ensure_open()?;
        let staged = self.stage_attribute_definitions(records);
        let definitions = self.checked(staged)?;

        let mut added = 0usize;
        for definition in definitions {
            let id = definition.unique_id;
            if self.state.container_mut().add_attribute_definition(definition) {
                added += 1;
            } else {
                tracing::warn!(id, "duplicate attribute definition, keeping first");
            }
        }

        tracing::debug!(added, "read attribute definitions");
        Ok(())
    }

    fn stage_attribute_definitions(
        &self,
        records: &[Record<'_>],
    ) -> Result<Vec<AttributeDefinition>> {
        let mut definitions = Vec::with_capacity(records.len());

        for record in records {
            let Some(unique_id) = self.required_id(record, "UDFTYPE", "udf_type_id")? else {
                continue;
            };
            let table = record.get_string("table_name")?.unwrap_or_default();
            let Some(kind) = EntityKind::from_table_name(&table) else {
                tracing::debug!(
                    id = unique_id,
                    table = %table,
                    "skipping attribute for other table"
                );
                continue;
            };
            let data_type = record
                .get_string("logical_data_type")?
                .map(|name| DataType::from_logical_name(&name))
                .unwrap_or_default();

            definitions.push(AttributeDefinition {
                unique_id,
                kind,
                internal_name: record.get_string("udf_type_name")?,
                external_name: record.get_string("udf_type_label")?,
                data_type,
            });
        }

        Ok(definitions)
    }

    /// Read extended attribute values into the deferred accumulator, keyed by
    /// the owning table and entity id.
    ///
    /// Values whose definition was never read are skipped.
    pub fn read_attribute_values(&mut self, records: &[Record<'_>]) -> Result<()> {
        self.ensure_open()?;
        let staged = self.stage_attribute_values(records);
        let (values, skipped) = self.checked(staged)?;

        let deferred = values.len();
        for (kind, entity_id, attribute) in values {
            self.state
                .deferred_attributes_mut()
                .entry(kind.table_name().to_string())
                .or_default()
                .entry(entity_id)
                .or_default()
                .push(attribute);
        }

        tracing::debug!(deferred, skipped, "read attribute values");
        Ok(())
    }

    fn stage_attribute_values(
        &self,
        records: &[Record<'_>],
    ) -> Result<(Vec<(EntityKind, i32, DeferredAttribute)>, usize)> {
        let mut values = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for record in records {
            let Some(field_id) = self.required_id(record, "UDFVALUE", "udf_type_id")? else {
                continue;
            };
            let Some(entity_id) = self.required_id(record, "UDFVALUE", "fk_id")? else {
                continue;
            };
            let Some((kind, data_type)) = self
                .state
                .container()
                .attribute_definition(field_id)
                .map(|d| (d.kind, d.data_type))
            else {
                skipped += 1;
                continue;
            };

            let value = attribute_value(record, data_type)?;
            values.push((kind, entity_id, DeferredAttribute { field_id, value }));
        }

        Ok((values, skipped))
    }

    /// Build and store the code tree for one code kind
    pub fn read_codes(
        &mut self,
        kind: CodeKind,
        definitions: &[Record<'_>],
        values: &[Record<'_>],
    ) -> Result<()> {
        self.ensure_open()?;
        let builder = CodeTreeBuilder::for_kind(kind, self.state.policy());
        let built = builder.build(definitions, values);
        let tree = self.checked(built)?;
        self.state.container_mut().set_codes(kind, tree);
        Ok(())
    }

    /// Materialize entities of one kind.
    ///
    /// Hierarchical kinds are read parents first, and an entity's parent is
    /// set only when that parent was materialized. WBS ids are reserved in
    /// the activity namespace as read; task ids are allocated there, so a
    /// task clashing with an earlier WBS or task id is renumbered.
    pub fn read_entities(&mut self, kind: EntityKind, records: &[Record<'_>]) -> Result<()> {
        self.ensure_open()?;
        let staged = self.stage_entities(kind, records);
        let (entities, reconciler) = self.checked(staged)?;

        let count = entities.len();
        *self.state.reconciler_mut() = reconciler;
        for entity in entities {
            self.state.container_mut().add_entity(entity);
        }

        tracing::debug!(table = kind.table_name(), entities = count, "read entities");
        Ok(())
    }

    /// Decode a batch of entities against a working copy of the reconciler
    fn stage_entities(
        &self,
        kind: EntityKind,
        records: &[Record<'_>],
    ) -> Result<(Vec<Entity>, IdentifierReconciler)> {
        let map = self.state.field_map(kind);
        let id_column = map.column("unique_id").unwrap_or(kind.id_column());
        let parent_column = map.column("parent_id").or(kind.parent_column());

        let mut pending = Vec::with_capacity(records.len());
        for record in records {
            let Some(original_id) = self.required_id(record, kind.table_name(), id_column)? else {
                continue;
            };
            let parent_id = match parent_column {
                Some(column) => record.get_id(column)?,
                None => None,
            };
            pending.push((original_id, parent_id, *record));
        }

        if parent_column.is_some() {
            pending = sort_hierarchy(pending, |e| Some(e.0), |e| e.1);
        }

        let mut reconciler = self.state.reconciler().clone();
        let mut staged = HashSet::with_capacity(pending.len());
        let mut entities = Vec::with_capacity(pending.len());
        for (original_id, parent_id, record) in pending {
            let entity = self.decode_entity(
                kind,
                original_id,
                parent_id,
                &record,
                &mut reconciler,
                &staged,
            )?;
            staged.insert(entity.unique_id);
            entities.push(entity);
        }

        Ok((entities, reconciler))
    }

    fn decode_entity(
        &self,
        kind: EntityKind,
        original_id: i32,
        parent_id: Option<i32>,
        record: &Record<'_>,
        reconciler: &mut IdentifierReconciler,
        staged: &HashSet<i32>,
    ) -> Result<Entity> {
        let unique_id = match kind {
            EntityKind::Wbs => {
                reconciler.reserve(original_id);
                original_id
            }
            EntityKind::Task => reconciler.allocate(original_id),
            _ => original_id,
        };

        let mut entity = Entity::new(kind, unique_id, original_id);
        entity.parent_id = parent_id.filter(|&id| {
            id != original_id
                && (staged.contains(&id) || self.state.container().contains_entity(kind, id))
        });

        for mapping in self.state.field_map(kind).iter() {
            if matches!(mapping.attribute.as_str(), "unique_id" | "parent_id") {
                continue;
            }
            if let Some(value) = record.get_typed(&mapping.column, mapping.data_type)? {
                entity.attributes.insert(mapping.attribute.clone(), value);
            }
        }
        entity
            .attributes
            .insert("unique_id".to_string(), FieldValue::from(unique_id));
        if let Some(parent_id) = entity.parent_id {
            entity
                .attributes
                .insert("parent_id".to_string(), FieldValue::from(parent_id));
        }

        if kind == EntityKind::Assignment {
            let task_id = match entity.attributes.get("task_unique_id") {
                Some(FieldValue::Integer(id)) => i32::try_from(*id).ok(),
                _ => None,
            };
            if let Some(task_id) = task_id {
                let resolved = reconciler.resolve(task_id);
                entity
                    .attributes
                    .insert("task_unique_id".to_string(), FieldValue::from(resolved));
            }
        }

        entity.extended_attributes = self
            .state
            .deferred_for(kind.table_name(), original_id)
            .to_vec();

        Ok(entity)
    }

    /// Read predecessor/successor links between tasks.
    ///
    /// Both endpoints are resolved through the activity reconciler. A link to
    /// a task that was never read is an error under a strict policy and is
    /// dropped under a lenient one.
    pub fn read_relations(&mut self, records: &[Record<'_>]) -> Result<()> {
        self.ensure_open()?;
        let staged = self.stage_relations(records);
        let (relations, dropped) = self.checked(staged)?;

        let added = relations.len();
        for relation in relations {
            self.state.container_mut().add_relation(relation);
        }

        tracing::debug!(added, dropped, "read relations");
        Ok(())
    }

    fn stage_relations(&self, records: &[Record<'_>]) -> Result<(Vec<Relation>, usize)> {
        let mut relations = Vec::with_capacity(records.len());
        let mut dropped = 0usize;

        for record in records {
            let Some(successor) = self.required_id(record, RELATION_TABLE, "task_id")? else {
                continue;
            };
            let Some(predecessor) = self.required_id(record, RELATION_TABLE, "pred_task_id")?
            else {
                continue;
            };

            let predecessor_id = self.known_task(predecessor)?;
            let successor_id = self.known_task(successor)?;
            let (Some(predecessor_id), Some(successor_id)) = (predecessor_id, successor_id) else {
                dropped += 1;
                continue;
            };

            relations.push(Relation {
                unique_id: record.get_id("task_pred_id")?,
                predecessor_id,
                successor_id,
                relation_type: record.get_string("pred_type")?,
                lag_hours: record.get_double("lag_hr_cnt")?,
            });
        }

        Ok((relations, dropped))
    }

    /// Hand over everything the session has read.
    ///
    /// Fails with [`Error::SessionAborted`] if any read failed.
    pub fn finish(self) -> Result<ImportResult> {
        self.ensure_open()?;
        let (container, reconciler, deferred) = self.state.into_parts();
        tracing::debug!(
            entities = container.entity_count(),
            relations = container.relations().len(),
            renumbered = reconciler.reassignments().count(),
            "import finished"
        );
        Ok(ImportResult {
            container,
            reconciler,
            deferred,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.aborted {
            return Err(Error::SessionAborted);
        }
        Ok(())
    }

    /// Mark the session aborted when a staged read failed
    fn checked<T>(&mut self, staged: Result<T>) -> Result<T> {
        if let Err(err) = &staged {
            self.aborted = true;
            tracing::warn!(error = %err, "import session aborted");
        }
        staged
    }

    /// Resolve a task id, checking that the task was read
    fn known_task(&self, id: i32) -> Result<Option<i32>> {
        let resolved = self.state.reconciler().resolve(id);
        if self.state.container().contains_entity(EntityKind::Task, resolved) {
            return Ok(Some(resolved));
        }
        if self.state.policy().is_strict() {
            return Err(Error::UnknownReference {
                table: RELATION_TABLE.to_string(),
                kind: "task",
                id,
            });
        }
        tracing::warn!(id, "dropping relation to unknown task");
        Ok(None)
    }

    /// Read an id column; a missing id is an error only under a strict policy
    fn required_id(&self, record: &Record<'_>, table: &str, column: &str) -> Result<Option<i32>> {
        let id = record.get_id(column)?;
        if id.is_none() {
            if self.state.policy().is_strict() {
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

/// Pick the value column matching an attribute's data type
fn attribute_value(record: &Record<'_>, data_type: DataType) -> Result<FieldValue> {
    let value = match data_type {
        DataType::Date => record.get_datetime("udf_date")?.map(FieldValue::from),
        DataType::Number | DataType::Currency => {
            record.get_double("udf_number")?.map(FieldValue::from)
        }
        DataType::Integer => record.get_integer("udf_code_id")?.map(FieldValue::from),
        DataType::Flag => {
            let flag = match record.raw("udf_text") {
                Some(text) if !text.is_null() => record.get_bool("udf_text")?,
                _ => record.get_bool("udf_number")?,
            };
            Some(FieldValue::from(flag))
        }
        DataType::Text => record.get_string("udf_text")?.map(FieldValue::from),
    };
    Ok(value.unwrap_or(FieldValue::Null))
}
