//! Row framing: `version (u64 big-endian) ++ payload`.

use quire_store::{Version, Versioned};

use crate::LmdbError;

const VERSION_LEN: usize = 8;

pub(crate) fn encode(version: Version, payload: &[u8]) -> Vec<u8> {
    let mut row = Vec::with_capacity(VERSION_LEN + payload.len());
    row.extend_from_slice(&version.value().to_be_bytes());
    row.extend_from_slice(payload);
    row
}

pub(crate) fn decode(table: &'static str, row: &[u8]) -> Result<Versioned, LmdbError> {
    if row.len() < VERSION_LEN {
        return Err(LmdbError::Corrupted {
            table,
            reason: format!("row of {} bytes has no version header", row.len()),
        });
    }
    let (header, payload) = row.split_at(VERSION_LEN);
    let mut bytes = [0u8; VERSION_LEN];
    bytes.copy_from_slice(header);
    Ok(Versioned {
        version: Version::new(u64::from_be_bytes(bytes)),
        value: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let row = encode(Version::new(77), b"payload");
        let decoded = decode("documents", &row).unwrap();
        assert_eq!(decoded.version, Version::new(77));
        assert_eq!(decoded.value, b"payload");
    }

    #[test]
    fn empty_payload_is_valid() {
        let decoded = decode("meta", &encode(Version::new(1), b"")).unwrap();
        assert!(decoded.value.is_empty());
    }

    #[test]
    fn short_row_is_corruption() {
        assert!(matches!(
            decode("documents", b"abc"),
            Err(LmdbError::Corrupted { table: "documents", .. })
        ));
    }
}
