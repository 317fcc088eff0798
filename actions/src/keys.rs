//! Key layouts for every table.
//!
//! Names chosen by callers (document keys, queue names, index names) are
//! case-insensitive and stored lowercased. Composite keys join their parts
//! with a NUL byte; numeric suffixes are big-endian so byte order is numeric
//! order. Text parts of a composite key are escaped so they never contain the
//! separator: NUL becomes `01 01` and `01` becomes `01 02`.

use quire_types::{Etag, MessageId, TaskId};

const SEP: u8 = 0;
const ESC: u8 = 1;

pub(crate) fn normalize(name: &str) -> Vec<u8> {
    name.to_lowercase().into_bytes()
}

fn escaped(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            SEP => out.extend_from_slice(&[ESC, 1]),
            ESC => out.extend_from_slice(&[ESC, 2]),
            other => out.push(other),
        }
    }
    out
}

/// A caller-chosen name as one part of a composite key.
fn name_part(name: &str) -> Vec<u8> {
    escaped(&normalize(name))
}

fn joined(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(SEP);
        }
        key.extend_from_slice(part);
    }
    key
}

pub(crate) fn same_name(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// `name ++ NUL`: the prefix of every composite key under `name`.
pub(crate) fn prefix(name: &str) -> Vec<u8> {
    let mut key = name_part(name);
    key.push(SEP);
    key
}

pub(crate) fn document(key: &str) -> Vec<u8> {
    normalize(key)
}

/// Row in the lock table naming the transaction that staged `key`.
pub(crate) fn document_lock(key: &str) -> Vec<u8> {
    normalize(key)
}

pub(crate) fn attachment(key: &str) -> Vec<u8> {
    normalize(key)
}

pub(crate) fn etag(etag: Etag) -> Vec<u8> {
    etag.to_be_bytes().to_vec()
}

pub(crate) fn etag_from_key(key: &[u8]) -> Option<Etag> {
    let bytes: [u8; 8] = key.try_into().ok()?;
    Some(Etag::from_be_bytes(bytes))
}

pub(crate) fn queue_message(queue: &str, id: MessageId) -> Vec<u8> {
    joined(&[&name_part(queue), &id.value().to_be_bytes()])
}

pub(crate) fn task(id: TaskId) -> Vec<u8> {
    id.value().to_be_bytes().to_vec()
}

pub(crate) fn index(name: &str) -> Vec<u8> {
    normalize(name)
}

pub(crate) fn mapped_result(view: &str, reduce_key: &str, etag: Etag) -> Vec<u8> {
    joined(&[&name_part(view), &escaped(reduce_key.as_bytes()), &etag.to_be_bytes()])
}

pub(crate) fn mapped_result_prefix(view: &str, reduce_key: &str) -> Vec<u8> {
    let mut key = joined(&[&name_part(view), &escaped(reduce_key.as_bytes())]);
    key.push(SEP);
    key
}

pub(crate) fn staged_document(key: &str, transaction_id: &str) -> Vec<u8> {
    joined(&[&name_part(key), &escaped(transaction_id.as_bytes())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_keys_ignore_case() {
        assert_eq!(document("Users/1"), document("users/1"));
    }

    #[test]
    fn queue_keys_sort_by_id() {
        let a = queue_message("Q", MessageId::new(2));
        let b = queue_message("q", MessageId::new(10));
        assert!(a < b);
        assert!(a.starts_with(&prefix("q")));
    }

    #[test]
    fn mapped_result_prefix_does_not_match_longer_reduce_key() {
        let key = mapped_result("v", "ab", Etag::new(1));
        assert!(key.starts_with(&mapped_result_prefix("v", "ab")));
        assert!(!key.starts_with(&mapped_result_prefix("v", "a")));
    }

    #[test]
    fn nul_in_a_name_cannot_forge_a_part() {
        assert_ne!(staged_document("a\0x", "y"), staged_document("a", "x\0y"));
        assert!(!staged_document("a\0x", "y").starts_with(&prefix("a")));
        let key = mapped_result("v", "a\0b", Etag::new(1));
        assert!(!key.starts_with(&mapped_result_prefix("v", "a")));
        assert!(key.starts_with(&mapped_result_prefix("v", "a\0b")));
        assert_ne!(queue_message("q\0", MessageId::new(1)), queue_message("q\u{1}", MessageId::new(1)));
    }

    #[test]
    fn etag_keys_roundtrip() {
        assert_eq!(etag_from_key(&etag(Etag::new(99))), Some(Etag::new(99)));
        assert_eq!(etag_from_key(b"short"), None);
    }
}
