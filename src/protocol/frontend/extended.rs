//! Extended query protocol messages.

use crate::params::Param;
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::Oid;

/// Target of a Describe message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescribeTarget {
    /// Prepared statement ('S')
    Statement = b'S',
    /// Portal ('P')
    Portal = b'P',
}

impl DescribeTarget {
    /// Parse the target byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'S' => Some(DescribeTarget::Statement),
            b'P' => Some(DescribeTarget::Portal),
            _ => None,
        }
    }
}

/// Write a Parse message to create a prepared statement.
///
/// - `name`: Statement name (empty string for unnamed statement)
/// - `query`: SQL query with $1, $2, ... placeholders
/// - `param_oids`: Parameter type OIDs (0 = let server infer)
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_oids: &[Oid]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_i16(param_oids.len() as i16);
    for &oid in param_oids {
        msg.write_u32(oid);
    }
    msg.finish();
}

/// Write a Bind message to create a portal from a prepared statement.
///
/// Each argument announces its own format code, then the values follow
/// length-prefixed. No result formats are declared, so every column comes
/// back in text format.
pub fn write_bind(buf: &mut Vec<u8>, portal: &str, statement: &str, params: &[Param]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);

    msg.write_cstr(portal);
    msg.write_cstr(statement);

    msg.write_i16(params.len() as i16);
    for param in params {
        msg.write_i16(param.format() as i16);
    }

    msg.write_i16(params.len() as i16);
    for param in params {
        param.encode(msg.buf());
    }

    // Result format codes
    msg.write_i16(0);

    msg.finish();
}

/// Write an Execute message to run a portal.
///
/// - `portal`: Portal name
/// - `max_rows`: Maximum number of rows to return (0 = unlimited)
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_u32(max_rows);
    msg.finish();
}

/// Write a Describe message to get metadata.
pub fn write_describe(buf: &mut Vec<u8>, target: DescribeTarget, name: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DESCRIBE);
    msg.write_u8(target as u8);
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Sync message.
///
/// This ends an extended query sequence and causes:
/// - Implicit COMMIT if successful and not in explicit transaction
/// - Implicit ROLLBACK if failed and not in explicit transaction
/// - Server responds with ReadyForQuery
pub fn write_sync(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::SYNC);
    msg.finish();
}

/// Write a Flush message.
///
/// Forces the server to send all pending responses without waiting for Sync.
pub fn write_flush(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::FLUSH);
    msg.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let mut buf = Vec::new();
        write_parse(&mut buf, "stmt1", "SELECT $1::int", &[0]);

        assert_eq!(buf[0], b'P');

        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
    }

    #[test]
    fn test_bind_layout() {
        let mut buf = Vec::new();
        write_bind(&mut buf, "p", "s", &[Param::Int4(5), Param::Text("x".into())]);

        let mut expected = vec![b'B', 0, 0, 0, 0];
        expected.extend_from_slice(b"p\0s\0");
        expected.extend_from_slice(&[0, 2, 0, 1, 0, 0]);
        expected.extend_from_slice(&[0, 2]);
        expected.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 5]);
        expected.extend_from_slice(&[0, 0, 0, 1, b'x']);
        expected.extend_from_slice(&[0, 0]);
        let len = (expected.len() - 1) as i32;
        expected[1..5].copy_from_slice(&len.to_be_bytes());

        assert_eq!(buf, expected);
    }

    #[test]
    fn test_bind_without_arguments() {
        let mut buf = Vec::new();
        write_bind(&mut buf, "", "", &[]);
        assert_eq!(buf, [b'B', 0, 0, 0, 12, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_describe() {
        let mut buf = Vec::new();
        write_describe(&mut buf, DescribeTarget::Statement, "s1");
        assert_eq!(buf, [b'D', 0, 0, 0, 8, b'S', b's', b'1', 0]);
    }

    #[test]
    fn test_sync_and_flush() {
        let mut buf = Vec::new();
        write_sync(&mut buf);
        write_flush(&mut buf);
        assert_eq!(buf, [b'S', 0, 0, 0, 4, b'H', 0, 0, 0, 4]);
    }

    #[test]
    fn test_execute() {
        let mut buf = Vec::new();
        write_execute(&mut buf, "", 0);

        assert_eq!(buf[0], b'E');
        // Length: 4 + 1 (empty string + null) + 4 (max_rows) = 9
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len, 9);
    }
}
