//! Per-import session state
//!
//! [`ReaderState`] gathers what every stage of one import needs: the decode
//! policy, column mappings per entity kind, the activity id reconciler, the
//! extended attributes waiting for their entities, and the output container.
//! It only hands these out; the reading itself happens in
//! [`ImportSession`](crate::session::ImportSession).

use crate::config::ImportConfig;
use crate::model::{DeferredAttribute, EntityKind, ProjectContainer};
use crate::reconciler::IdentifierReconciler;
use crate::record::DecodePolicy;
use crate::value::DataType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Extended attribute values keyed by table name, then by original entity id
pub type DeferredAttributes = HashMap<String, HashMap<i32, Vec<DeferredAttribute>>>;

static EMPTY_FIELD_MAP: FieldMap = FieldMap {
    mappings: Vec::new(),
};

/// Maps one source column onto a named entity attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub attribute: String,
    pub column: String,
    #[serde(default)]
    pub data_type: DataType,
}

/// Ordered column mappings for one entity kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    mappings: Vec<FieldMapping>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mapping
    pub fn with(mut self, attribute: &str, column: &str, data_type: DataType) -> Self {
        self.mappings.push(FieldMapping {
            attribute: attribute.to_string(),
            column: column.to_string(),
            data_type,
        });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMapping> {
        self.mappings.iter()
    }

    /// Column mapped to `attribute`, if any
    pub fn column(&self, attribute: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.attribute == attribute)
            .map(|m| m.column.as_str())
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Standard column mappings for an entity kind
    pub fn defaults(kind: EntityKind) -> Self {
        use DataType::*;

        match kind {
            EntityKind::Resource => FieldMap::new()
                .with("unique_id", "rsrc_id", Integer)
                .with("guid", "guid", Text)
                .with("name", "rsrc_name", Text)
                .with("code", "employee_code", Text)
                .with("email_address", "email_addr", Text)
                .with("notes", "rsrc_notes", Text)
                .with("created", "create_date", Date)
                .with("type", "rsrc_type", Text)
                .with("parent_id", "parent_rsrc_id", Integer)
                .with("resource_id", "rsrc_short_name", Text)
                .with("calculate_costs_from_units", "def_cost_qty_link_flag", Flag)
                .with("sequence_number", "rsrc_seq_num", Integer)
                .with("active", "active_flag", Flag)
                .with("location_unique_id", "location_id", Integer)
                .with("unit_of_measure_unique_id", "unit_id", Integer)
                .with("shift_unique_id", "shift_id", Integer)
                .with("primary_role_unique_id", "role_id", Integer)
                .with("currency_unique_id", "curr_id", Integer)
                .with("default_units_per_hour", "def_qty_per_hr", Number),
            EntityKind::Role => FieldMap::new()
                .with("unique_id", "role_id", Integer)
                .with("name", "role_name", Text)
                .with("resource_id", "role_short_name", Text)
                .with("notes", "role_descr", Text)
                .with("parent_id", "parent_role_id", Integer)
                .with("calculate_costs_from_units", "def_cost_qty_link_flag", Flag)
                .with("sequence_number", "seq_num", Integer),
            EntityKind::Wbs => FieldMap::new()
                .with("unique_id", "wbs_id", Integer)
                .with("guid", "guid", Text)
                .with("name", "wbs_name", Text)
                .with("parent_id", "parent_wbs_id", Integer)
                .with("remaining_cost", "indep_remain_total_cost", Currency)
                .with("remaining_work", "indep_remain_work_qty", Number)
                .with("deadline", "anticip_end_date", Date)
                .with("wbs", "wbs_short_name", Text)
                .with("sequence_number", "seq_num", Integer)
                .with("methodology_guid", "tmpl_guid", Text)
                .with("original_budget", "orig_cost", Currency)
                .with("estimated_weight", "est_wt", Number),
            EntityKind::Task => FieldMap::new()
                .with("unique_id", "task_id", Integer)
                .with("guid", "guid", Text)
                .with("name", "task_name", Text)
                .with("activity_id", "task_code", Text)
                .with("wbs_unique_id", "wbs_id", Integer)
                .with("calendar_unique_id", "clndr_id", Integer)
                .with("remaining_duration", "remain_drtn_hr_cnt", Number)
                .with("planned_duration", "target_drtn_hr_cnt", Number)
                .with("actual_work_labor", "act_work_qty", Number)
                .with("remaining_work_labor", "remain_work_qty", Number)
                .with("planned_work_labor", "target_work_qty", Number)
                .with("constraint_type", "cstr_type", Text)
                .with("constraint_date", "cstr_date", Date)
                .with("actual_start", "act_start_date", Date)
                .with("actual_finish", "act_end_date", Date)
                .with("early_start", "early_start_date", Date)
                .with("early_finish", "early_end_date", Date)
                .with("late_start", "late_start_date", Date)
                .with("late_finish", "late_end_date", Date)
                .with("planned_start", "target_start_date", Date)
                .with("planned_finish", "target_end_date", Date)
                .with("priority", "priority_type", Text)
                .with("created", "create_date", Date)
                .with("free_slack", "free_float_hr_cnt", Number)
                .with("total_slack", "total_float_hr_cnt", Number)
                .with("primary_resource_unique_id", "rsrc_id", Integer)
                .with("longest_path", "driving_path_flag", Flag)
                .with("estimated_weight", "est_wt", Number),
            EntityKind::Assignment => FieldMap::new()
                .with("unique_id", "taskrsrc_id", Integer)
                .with("guid", "guid", Text)
                .with("task_unique_id", "task_id", Integer)
                .with("resource_unique_id", "rsrc_id", Integer)
                .with("remaining_work", "remain_qty", Number)
                .with("planned_work", "target_qty", Number)
                .with("planned_cost", "target_cost", Currency)
                .with("remaining_cost", "remain_cost", Currency)
                .with("actual_start", "act_start_date", Date)
                .with("actual_finish", "act_end_date", Date)
                .with("planned_start", "target_start_date", Date)
                .with("planned_finish", "target_end_date", Date)
                .with("calculate_costs_from_units", "cost_qty_link_flag", Flag)
                .with("cost_account_unique_id", "acct_id", Integer),
        }
    }
}

/// Everything one import session reads into or through
#[derive(Debug)]
pub struct ReaderState {
    policy: DecodePolicy,
    field_maps: BTreeMap<EntityKind, FieldMap>,
    reconciler: IdentifierReconciler,
    deferred: DeferredAttributes,
    container: ProjectContainer,
}

impl ReaderState {
    /// Fresh state; configured field maps replace the defaults per kind
    pub fn new(config: ImportConfig) -> Self {
        let ImportConfig { policy, field_maps } = config;

        let mut maps: BTreeMap<EntityKind, FieldMap> = EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, FieldMap::defaults(kind)))
            .collect();
        maps.extend(field_maps);

        Self {
            policy,
            field_maps: maps,
            reconciler: IdentifierReconciler::new(),
            deferred: DeferredAttributes::new(),
            container: ProjectContainer::new(),
        }
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    pub fn field_map(&self, kind: EntityKind) -> &FieldMap {
        self.field_maps.get(&kind).unwrap_or(&EMPTY_FIELD_MAP)
    }

    pub fn reconciler(&self) -> &IdentifierReconciler {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut IdentifierReconciler {
        &mut self.reconciler
    }

    pub fn deferred_attributes(&self) -> &DeferredAttributes {
        &self.deferred
    }

    pub fn deferred_attributes_mut(&mut self) -> &mut DeferredAttributes {
        &mut self.deferred
    }

    /// Deferred attributes recorded for one entity
    pub fn deferred_for(&self, table: &str, entity_id: i32) -> &[DeferredAttribute] {
        self.deferred
            .get(table)
            .and_then(|entities| entities.get(&entity_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn container(&self) -> &ProjectContainer {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut ProjectContainer {
        &mut self.container
    }

    /// Split into the container, the reconciler and the deferred attributes
    pub fn into_parts(self) -> (ProjectContainer, IdentifierReconciler, DeferredAttributes) {
        (self.container, self.reconciler, self.deferred)
    }
}
