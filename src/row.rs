//! Row decoding against the most recent RowDescription.

use std::sync::Arc;

use crate::datestyle::DateStyle;
use crate::error::{Error, Result};
use crate::protocol::backend::{CommandComplete, FieldDescriptor};
use crate::value::Value;

/// One result row: column names in order with their coerced values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<[FieldDescriptor]>,
    values: Vec<Value>,
}

impl Row {
    /// Column descriptors shared by every row of the result set.
    pub fn columns(&self) -> &[FieldDescriptor] {
        &self.columns
    }

    /// Value of the first column named `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        self.values.get(idx)
    }

    /// Value at position `idx`.
    pub fn get_idx(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate `(column name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(self.values.iter())
    }
}

/// Outcome of one statement: accumulated rows and the command tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// CommandComplete tag; empty for an empty query
    pub command: String,
}

impl QueryResult {
    /// Number of rows reported by the command tag.
    pub fn rows_affected(&self) -> Option<u64> {
        CommandComplete { tag: &self.command }.rows_affected()
    }
}

/// Accumulates rows between RowDescription and CommandComplete.
#[derive(Debug, Default)]
pub struct RowDecoder {
    columns: Option<Arc<[FieldDescriptor]>>,
    rows: Vec<Row>,
}

impl RowDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that already knows its columns, as for a described statement.
    pub fn with_columns(columns: Option<Arc<[FieldDescriptor]>>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Handle RowDescription: remember the fields and reset the accumulator.
    pub fn describe(&mut self, fields: Vec<FieldDescriptor>) {
        self.columns = Some(fields.into());
        self.rows.clear();
    }

    /// Handle DataRow: zip values positionally against the fields.
    pub fn push(&mut self, values: Vec<Option<Vec<u8>>>, style: DateStyle) -> Result<()> {
        let columns = self
            .columns
            .clone()
            .ok_or_else(|| Error::ProtocolViolation("DataRow without RowDescription".into()))?;
        if values.len() != columns.len() {
            return Err(Error::ProtocolViolation(format!(
                "DataRow has {} values but RowDescription has {} fields",
                values.len(),
                columns.len()
            )));
        }

        let values = columns
            .iter()
            .zip(values)
            .map(|(field, raw)| match raw {
                None => Ok(Value::Null),
                Some(bytes) => Value::from_text(field.type_oid, &bytes, style),
            })
            .collect::<Result<Vec<_>>>()?;

        self.rows.push(Row { columns, values });
        Ok(())
    }

    /// Handle CommandComplete: hand out the accumulated rows.
    pub fn finish(&mut self, command: String) -> QueryResult {
        QueryResult {
            rows: std::mem::take(&mut self.rows),
            command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn test_decode_rows() {
        let mut decoder = RowDecoder::new();
        decoder.describe(vec![
            FieldDescriptor::new("foobar", oid::INT4),
            FieldDescriptor::new("flag", oid::BOOL),
            FieldDescriptor::new("note", oid::TEXT),
        ]);
        decoder
            .push(
                vec![Some(b"1".to_vec()), Some(b"t".to_vec()), None],
                DateStyle::default(),
            )
            .unwrap();
        let result = decoder.finish("SELECT 1".into());

        assert_eq!(result.rows_affected(), Some(1));
        let row = &result.rows[0];
        assert_eq!(row.get("foobar"), Some(&Value::Int(1)));
        assert_eq!(row.get("flag"), Some(&Value::Bool(true)));
        assert!(row.get("note").unwrap().is_null());
        assert_eq!(row.get("missing"), None);
        assert_eq!(
            row.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            ["foobar", "flag", "note"]
        );
    }

    #[test]
    fn test_data_row_without_description() {
        let mut decoder = RowDecoder::new();
        assert!(matches!(
            decoder.push(vec![None], DateStyle::default()),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_describe_resets_accumulator() {
        let mut decoder = RowDecoder::new();
        decoder.describe(vec![FieldDescriptor::new("a", oid::TEXT)]);
        decoder.push(vec![Some(b"x".to_vec())], DateStyle::default()).unwrap();
        decoder.describe(vec![FieldDescriptor::new("b", oid::TEXT)]);
        assert!(decoder.finish("SELECT 0".into()).rows.is_empty());
    }
}
