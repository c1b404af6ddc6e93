//! Query-related backend messages.

use std::mem::size_of;

use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_cstr, read_i32};
use crate::protocol::types::{FormatCode, Oid};

/// RowDescription message header.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct RowDescriptionHead {
    /// Number of fields in the row
    pub num_fields: U16BE,
}

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldDescriptionTail {
    /// Table OID (0 if not a table column)
    pub table_oid: U32BE,
    /// Column attribute number (0 if not a table column)
    pub column_id: I16BE,
    /// Data type OID
    pub type_oid: U32BE,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: I16BE,
    /// Type modifier (type-specific)
    pub type_modifier: I32BE,
    /// Format code (0=text, 1=binary)
    pub format: U16BE,
}

/// Owned description of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Column name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_attr: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    /// Type modifier (type-specific)
    pub type_modifier: i32,
    /// Format code
    pub format_code: FormatCode,
}

impl FieldDescriptor {
    /// Text-format descriptor for a computed column of the given type.
    pub fn new(name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            table_oid: 0,
            column_attr: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format_code: FormatCode::Text,
        }
    }
}

const TAIL_SIZE: usize = size_of::<FieldDescriptionTail>();

/// Parse a RowDescription payload into owned field descriptors.
pub fn parse_row_description(payload: &[u8]) -> Result<Vec<FieldDescriptor>> {
    let (head, mut data) = RowDescriptionHead::ref_from_prefix(payload)
        .map_err(|e| Error::MalformedFrame(format!("RowDescription header: {e:?}")))?;
    let num_fields = head.num_fields.get() as usize;

    let mut fields = Vec::with_capacity(num_fields);
    for _ in 0..num_fields {
        let (name, rest) = read_cstr(data)?;
        let (tail, rest) = FieldDescriptionTail::ref_from_prefix(rest)
            .map_err(|e| Error::MalformedFrame(format!("FieldDescription tail: {e:?}")))?;
        fields.push(FieldDescriptor {
            name: name.to_string(),
            table_oid: tail.table_oid.get(),
            column_attr: tail.column_id.get(),
            type_oid: tail.type_oid.get(),
            type_size: tail.type_size.get(),
            type_modifier: tail.type_modifier.get(),
            format_code: FormatCode::from_u16(tail.format.get()),
        });
        data = rest;
    }

    Ok(fields)
}

/// Write a RowDescription payload.
pub fn write_row_description(out: &mut Vec<u8>, fields: &[FieldDescriptor]) {
    out.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    for field in fields {
        out.extend_from_slice(field.name.as_bytes());
        out.push(0);
        out.extend_from_slice(&field.table_oid.to_be_bytes());
        out.extend_from_slice(&field.column_attr.to_be_bytes());
        out.extend_from_slice(&field.type_oid.to_be_bytes());
        out.extend_from_slice(&field.type_size.to_be_bytes());
        out.extend_from_slice(&field.type_modifier.to_be_bytes());
        out.extend_from_slice(&(field.format_code as u16).to_be_bytes());
    }
}

/// DataRow message header.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct DataRowHead {
    /// Number of columns
    pub num_columns: U16BE,
}

/// Parse a DataRow payload. `None` entries are SQL NULL.
pub fn parse_data_row(payload: &[u8]) -> Result<Vec<Option<Vec<u8>>>> {
    let (head, mut data) = DataRowHead::ref_from_prefix(payload)
        .map_err(|e| Error::MalformedFrame(format!("DataRow header: {e:?}")))?;
    let num_columns = head.num_columns.get() as usize;

    let mut values = Vec::with_capacity(num_columns);
    for _ in 0..num_columns {
        let (len, rest) = read_i32(data)?;
        if len == -1 {
            values.push(None);
            data = rest;
            continue;
        }
        if len < 0 {
            return Err(Error::MalformedFrame(format!(
                "DataRow: negative column length {len}"
            )));
        }
        let (value, rest) = read_bytes(rest, len as usize)?;
        values.push(Some(value.to_vec()));
        data = rest;
    }

    Ok(values)
}

/// Write a DataRow payload.
pub fn write_data_row(out: &mut Vec<u8>, values: &[Option<Vec<u8>>]) {
    out.extend_from_slice(&(values.len() as u16).to_be_bytes());
    for value in values {
        match value {
            None => out.extend_from_slice(&(-1_i32).to_be_bytes()),
            Some(bytes) => {
                out.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
        }
    }
}

/// CommandComplete message - indicates successful completion of a command.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    /// Command tag (e.g., "SELECT 5", "INSERT 0 1", "UPDATE 10")
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (tag, _) = read_cstr(payload)?;
        Ok(Self { tag })
    }

    /// Parse the number of rows affected from the command tag.
    ///
    /// Returns `Some(count)` for commands like SELECT, INSERT, UPDATE, DELETE.
    /// Returns `None` for other commands or parse failures.
    pub fn rows_affected(&self) -> Option<u64> {
        let parts: Vec<&str> = self.tag.split_whitespace().collect();

        match parts.as_slice() {
            ["SELECT", count] => count.parse().ok(),
            ["INSERT", _oid, count] => count.parse().ok(),
            ["UPDATE", count] => count.parse().ok(),
            ["DELETE", count] => count.parse().ok(),
            ["COPY", count] => count.parse().ok(),
            ["MOVE", count] => count.parse().ok(),
            ["FETCH", count] => count.parse().ok(),
            _ => None,
        }
    }

    /// Get the command name from the tag.
    pub fn command(&self) -> Option<&str> {
        self.tag.split_whitespace().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn test_row_description() {
        let fields = vec![FieldDescriptor::new("foobar", oid::INT4)];
        let mut payload = Vec::new();
        write_row_description(&mut payload, &fields);
        assert_eq!(payload.len(), 2 + 7 + TAIL_SIZE);
        assert_eq!(parse_row_description(&payload).unwrap(), fields);
    }

    #[test]
    fn test_row_description_truncated() {
        let mut payload = Vec::new();
        write_row_description(&mut payload, &[FieldDescriptor::new("a", oid::TEXT)]);
        payload.pop();
        assert!(matches!(
            parse_row_description(&payload),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_data_row_with_null() {
        let payload = [0, 2, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 2, b'4', b'2'];
        assert_eq!(
            parse_data_row(&payload).unwrap(),
            vec![None, Some(b"42".to_vec())]
        );
        assert!(parse_data_row(&payload[..11]).is_err());
    }

    #[test]
    fn test_rows_affected() {
        let tag = |tag| CommandComplete { tag };
        assert_eq!(tag("SELECT 3").rows_affected(), Some(3));
        assert_eq!(tag("INSERT 0 7").rows_affected(), Some(7));
        assert_eq!(tag("BEGIN").rows_affected(), None);
        assert_eq!(tag("UPDATE 2").command(), Some("UPDATE"));
    }
}
