//! Extended query protocol backend messages.

use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::U16 as U16BE;

use crate::error::{Error, Result};
use crate::protocol::codec::read_u32;
use crate::protocol::types::Oid;

/// Parse a ParameterDescription payload into the parameter type OIDs.
pub fn parse_parameter_description(payload: &[u8]) -> Result<Vec<Oid>> {
    let (count, mut data) = U16BE::read_from_prefix(payload)
        .map_err(|e| Error::MalformedFrame(format!("ParameterDescription header: {e:?}")))?;
    let count = count.get() as usize;

    let mut oids = Vec::with_capacity(count);
    for _ in 0..count {
        let (oid, rest) = read_u32(data)?;
        oids.push(oid);
        data = rest;
    }

    Ok(oids)
}

/// Write a ParameterDescription payload.
pub fn write_parameter_description(out: &mut Vec<u8>, oids: &[Oid]) {
    out.extend_from_slice(&(oids.len() as u16).to_be_bytes());
    for oid in oids {
        out.extend_from_slice(&oid.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_description() {
        let payload = [0, 2, 0, 0, 0, 23, 0, 0, 0, 25];
        assert_eq!(parse_parameter_description(&payload).unwrap(), vec![23, 25]);
        assert!(parse_parameter_description(&payload[..8]).is_err());
    }
}
