//! Record views over tabular and keyed source data
//!
//! A [`Record`] decodes typed fields by name. It is backed either by a
//! positional slice plus the table's shared [`FieldIndex`], or by a keyed map
//! taken from a tagged document. Both backings honour the same contract:
//! unknown names are absent, and malformed values are absent or an error
//! depending on the session's [`DecodePolicy`].

use crate::error::{Error, Result};
use crate::value::{DataType, FieldValue, FromField};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Session-wide choice of how malformed input is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Abort the import on the first malformed value
    Strict,
    /// Substitute absent values and continue
    #[default]
    Lenient,
}

impl DecodePolicy {
    pub fn is_strict(self) -> bool {
        self == DecodePolicy::Strict
    }
}

/// Immutable name to position map for one table shape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl FieldIndex {
    /// Build an index from a header, rejecting duplicate names
    pub fn from_header<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(names, DecodePolicy::Strict)
    }

    /// Build an index from a header; on duplicates the first occurrence wins
    pub fn from_header_lenient<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = FieldIndex::default();
        for name in names {
            index.push_first_wins(name.into());
        }
        index
    }

    /// Build an index, handling duplicates according to `policy`
    pub fn build<I, S>(names: I, policy: DecodePolicy) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = FieldIndex::default();
        for name in names {
            index.insert(name.into(), policy)?;
        }
        Ok(index)
    }

    fn insert(&mut self, name: String, policy: DecodePolicy) -> Result<()> {
        if policy.is_strict() {
            if let Some(&first) = self.positions.get(&name) {
                return Err(Error::DuplicateField {
                    name,
                    first,
                    second: self.names.len(),
                });
            }
        }
        self.push_first_wins(name);
        Ok(())
    }

    /// Append a column; a repeated name keeps the earlier position
    fn push_first_wins(&mut self, name: String) {
        let position = self.names.len();
        if let Some(&first) = self.positions.get(&name) {
            tracing::warn!(
                field = %name,
                first,
                second = position,
                "duplicate header field, keeping first occurrence"
            );
        } else {
            self.positions.insert(name.clone(), position);
        }
        self.names.push(name);
    }

    /// Position of a field, or `None` if the name is unknown
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Header names in column order, duplicates included
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns in the header
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Backing<'a> {
    Array {
        index: &'a FieldIndex,
        values: &'a [FieldValue],
    },
    Map(&'a HashMap<String, FieldValue>),
}

/// A typed view over one row or document entry
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    backing: Backing<'a>,
    policy: DecodePolicy,
}

impl<'a> Record<'a> {
    /// Positional values resolved through a shared index
    pub fn array(index: &'a FieldIndex, values: &'a [FieldValue], policy: DecodePolicy) -> Self {
        Self {
            backing: Backing::Array { index, values },
            policy,
        }
    }

    /// Values keyed directly by field name
    pub fn map(fields: &'a HashMap<String, FieldValue>, policy: DecodePolicy) -> Self {
        Self {
            backing: Backing::Map(fields),
            policy,
        }
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// The raw stored value, `None` if the field is unknown
    pub fn raw(&self, name: &str) -> Option<&'a FieldValue> {
        match self.backing {
            Backing::Array { index, values } => index.position(name).and_then(|i| values.get(i)),
            Backing::Map(fields) => fields.get(name),
        }
    }

    /// Decode a field.
    ///
    /// Returns `Ok(None)` when the field is unknown or null. A present value
    /// that does not decode as `T` is `Ok(None)` under a lenient policy and
    /// [`Error::FieldDecode`] under a strict one.
    pub fn get<T: FromField>(&self, name: &str) -> Result<Option<T>> {
        let raw = match self.raw(name) {
            None | Some(FieldValue::Null) => return Ok(None),
            Some(raw) => raw,
        };

        if let Some(value) = T::from_field(raw) {
            return Ok(Some(value));
        }

        if self.policy.is_strict() {
            return Err(Error::FieldDecode {
                field: name.to_string(),
                raw: raw.to_string_value(),
                target: T::TYPE_NAME,
            });
        }

        tracing::warn!(
            field = name,
            raw = %raw,
            target = T::TYPE_NAME,
            "ignoring malformed field value"
        );
        Ok(None)
    }

    pub fn get_string(&self, name: &str) -> Result<Option<String>> {
        self.get(name)
    }

    pub fn get_integer(&self, name: &str) -> Result<Option<i64>> {
        self.get(name)
    }

    /// Decode an entity identifier
    pub fn get_id(&self, name: &str) -> Result<Option<i32>> {
        self.get(name)
    }

    pub fn get_double(&self, name: &str) -> Result<Option<f64>> {
        self.get(name)
    }

    /// Decode a flag; an absent flag reads as `false`
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.unwrap_or(false))
    }

    pub fn get_datetime(&self, name: &str) -> Result<Option<NaiveDateTime>> {
        self.get(name)
    }

    /// Decode a field as `data_type`, keeping the result as a raw value
    pub fn get_typed(&self, name: &str, data_type: DataType) -> Result<Option<FieldValue>> {
        Ok(match data_type {
            DataType::Text => self.get_string(name)?.map(FieldValue::Text),
            DataType::Integer => self.get_integer(name)?.map(FieldValue::Integer),
            DataType::Number | DataType::Currency => self.get_double(name)?.map(FieldValue::Float),
            DataType::Flag => self.get::<bool>(name)?.map(FieldValue::Bool),
            DataType::Date => self.get_datetime(name)?.map(FieldValue::DateTime),
        })
    }
}

/// Rows of one table shape sharing a single [`FieldIndex`]
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    index: FieldIndex,
    rows: Vec<Vec<FieldValue>>,
}

impl Table {
    /// Create an empty table
    pub fn new(name: impl Into<String>, index: FieldIndex) -> Self {
        Self {
            name: name.into(),
            index,
            rows: Vec::new(),
        }
    }

    /// Create an empty table from header names
    pub fn from_header<I, S>(
        name: impl Into<String>,
        header: I,
        policy: DecodePolicy,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(name, FieldIndex::build(header, policy)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &FieldIndex {
        &self.index
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.index.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Append a row, padding short rows with nulls and truncating long ones
    pub fn push_row(&mut self, mut values: Vec<FieldValue>) {
        let width = self.index.len();
        if values.len() > width {
            tracing::warn!(
                table = %self.name,
                row = self.rows.len() + 1,
                "row has more values than columns, truncating"
            );
            values.truncate(width);
        }
        values.resize(width, FieldValue::Null);
        self.rows.push(values);
    }

    /// Array-backed records for every row
    pub fn records(&self, policy: DecodePolicy) -> impl Iterator<Item = Record<'_>> + '_ {
        self.rows
            .iter()
            .map(move |values| Record::array(&self.index, values, policy))
    }

    /// Records whose `column` decodes to `id`
    pub fn filter_rows(
        &self,
        column: &str,
        id: i32,
        policy: DecodePolicy,
    ) -> Result<Vec<Record<'_>>> {
        let mut result = Vec::new();
        for record in self.records(policy) {
            if record.get_id(column)? == Some(id) {
                result.push(record);
            }
        }
        Ok(result)
    }
}

/// One entry from a tagged document, stored as a keyed map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapRow {
    fields: HashMap<String, FieldValue>,
}

impl MapRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any previous value under the same name
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Build from an already-deserialized JSON object
    pub fn from_json_object(object: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            fields: object
                .into_iter()
                .map(|(name, value)| (name, FieldValue::from(value)))
                .collect(),
        }
    }

    /// Build from JSON object text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)?;
        Ok(Self::from_json_object(object))
    }

    /// A map-backed record over this row
    pub fn record(&self, policy: DecodePolicy) -> Record<'_> {
        Record::map(&self.fields, policy)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity_table() -> Table {
        let mut table = Table::from_header(
            "task",
            ["task_id", "task_name", "target_drtn_hr_cnt", "status"],
            DecodePolicy::Strict,
        )
        .unwrap();
        table.push_row(vec![
            FieldValue::Integer(10),
            FieldValue::from("Excavate"),
            FieldValue::from("forty"),
            FieldValue::Null,
        ]);
        table.push_row(vec![FieldValue::Integer(11), FieldValue::from("Pour")]);
        table
    }

    #[test]
    fn test_field_index_positions() {
        let index = FieldIndex::from_header(["a", "b", "c"]).unwrap();
        assert_eq!(index.position("b"), Some(1));
        assert_eq!(index.position("z"), None);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_field_index_duplicate_strict() {
        let err = FieldIndex::from_header(["id", "name", "id"]).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateField { ref name, first: 0, second: 2 } if name == "id"
        ));
    }

    #[test]
    fn test_field_index_duplicate_lenient_first_wins() {
        let index = FieldIndex::from_header_lenient(["id", "name", "id"]);
        assert_eq!(index.position("id"), Some(0));
        assert_eq!(index.names().len(), 3);
    }

    #[test]
    fn test_lenient_build_matches_lenient_header() {
        let names = ["id", "name", "id", "flag"];
        let built = FieldIndex::build(names, DecodePolicy::Lenient).unwrap();
        assert_eq!(built, FieldIndex::from_header_lenient(names));
        assert_eq!(built.position("id"), Some(0));
        assert_eq!(built.position("flag"), Some(3));
        assert!(FieldIndex::build(names, DecodePolicy::Strict).is_err());
    }

    #[test]
    fn test_unknown_field_is_absent_under_both_policies() {
        let table = activity_table();
        for policy in [DecodePolicy::Strict, DecodePolicy::Lenient] {
            let record = table.records(policy).next().unwrap();
            assert_eq!(record.get_integer("no_such_field").unwrap(), None);
        }

        let row = MapRow::new().with("task_id", 10);
        for policy in [DecodePolicy::Strict, DecodePolicy::Lenient] {
            assert_eq!(row.record(policy).get_string("no_such_field").unwrap(), None);
        }
    }

    #[test]
    fn test_malformed_value_strict_errors() {
        let table = activity_table();
        let record = table.records(DecodePolicy::Strict).next().unwrap();
        let err = record.get_double("target_drtn_hr_cnt").unwrap_err();
        match err {
            Error::FieldDecode { field, raw, target } => {
                assert_eq!(field, "target_drtn_hr_cnt");
                assert_eq!(raw, "forty");
                assert_eq!(target, "number");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_value_lenient_absent() {
        let table = activity_table();
        let record = table.records(DecodePolicy::Lenient).next().unwrap();
        assert_eq!(record.get_double("target_drtn_hr_cnt").unwrap(), None);
        assert_eq!(
            record.get_string("task_name").unwrap(),
            Some("Excavate".to_string())
        );
    }

    #[test]
    fn test_null_and_padded_values_are_absent() {
        let table = activity_table();
        let rows: Vec<_> = table.records(DecodePolicy::Strict).collect();
        assert_eq!(rows[0].get_string("status").unwrap(), None);
        assert_eq!(rows[1].get_double("target_drtn_hr_cnt").unwrap(), None);
        assert!(!rows[1].get_bool("status").unwrap());
    }

    #[test]
    fn test_push_row_truncates() {
        let mut table = Table::from_header("t", ["a"], DecodePolicy::Strict).unwrap();
        table.push_row(vec![FieldValue::Integer(1), FieldValue::Integer(2)]);
        let record = table.records(DecodePolicy::Strict).next().unwrap();
        assert_eq!(record.get_integer("a").unwrap(), Some(1));
        assert_eq!(table.column_count(), 1);
    }

    #[test]
    fn test_backings_share_contract() {
        let mut table = Table::from_header("t", ["id", "flag"], DecodePolicy::Strict).unwrap();
        table.push_row(vec![FieldValue::from("7"), FieldValue::from("Y")]);
        let row = MapRow::new().with("id", "7").with("flag", "Y");

        let array = table.records(DecodePolicy::Strict).next().unwrap();
        let map = row.record(DecodePolicy::Strict);
        assert_eq!(array.get_id("id").unwrap(), map.get_id("id").unwrap());
        assert_eq!(array.get_bool("flag").unwrap(), map.get_bool("flag").unwrap());
    }

    #[test]
    fn test_map_row_from_json() {
        let json = r#"{"ObjectId": 12, "Name": "Phase", "ParentObjectId": null}"#;
        let row = MapRow::from_json_str(json).unwrap();
        let record = row.record(DecodePolicy::Strict);
        assert_eq!(record.get_id("ObjectId").unwrap(), Some(12));
        assert_eq!(record.get_id("ParentObjectId").unwrap(), None);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_get_typed() {
        let row = MapRow::new()
            .with("cost", "12.5")
            .with("flag", "N")
            .with("start", "2024-01-02 07:00");
        let record = row.record(DecodePolicy::Strict);
        assert_eq!(
            record.get_typed("cost", DataType::Currency).unwrap(),
            Some(FieldValue::Float(12.5))
        );
        assert_eq!(
            record.get_typed("flag", DataType::Flag).unwrap(),
            Some(FieldValue::Bool(false))
        );
        assert!(matches!(
            record.get_typed("start", DataType::Date).unwrap(),
            Some(FieldValue::DateTime(_))
        ));
        assert!(record.get_typed("flag", DataType::Integer).is_err());
    }

    #[test]
    fn test_filter_rows() {
        let table = activity_table();
        let rows = table.filter_rows("task_id", 11, DecodePolicy::Strict).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_string("task_name").unwrap(), Some("Pour".to_string()));
    }
}
