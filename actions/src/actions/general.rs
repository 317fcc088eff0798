use quire_store::{GeneralStore, StoreError, Table};

use crate::{keys, TransactionalContext};

impl GeneralStore for TransactionalContext {
    /// Identity counters start at 1.
    fn next_identity_value(&self, name: &str) -> Result<u64, StoreError> {
        let key = keys::normalize(name);
        let current = self.get_record::<u64>(Table::Identities, &key)?.unwrap_or(0);
        let next = current + 1;
        self.put_record(Table::Identities, key, &next)?;
        Ok(next)
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.put(Table::Meta, key.as_bytes().to_vec(), value.to_vec())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(Table::Meta, key.as_bytes())
    }

    fn delete_meta(&self, key: &str) -> Result<bool, StoreError> {
        if self.get(Table::Meta, key.as_bytes())?.is_none() {
            return Ok(false);
        }
        self.delete(Table::Meta, key.as_bytes().to_vec())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, next};
    use super::*;

    #[test]
    fn identities_count_from_one() {
        let (backend, ctx) = context();
        assert_eq!(ctx.next_identity_value("users").unwrap(), 1);
        assert_eq!(ctx.next_identity_value("Users").unwrap(), 2);
        assert_eq!(ctx.next_identity_value("orders").unwrap(), 1);
        ctx.commit().unwrap();
        assert_eq!(next(&backend, 2).next_identity_value("users").unwrap(), 3);
    }

    #[test]
    fn meta_roundtrip() {
        let (_, ctx) = context();
        assert_eq!(ctx.get_meta("k").unwrap(), None);
        ctx.put_meta("k", b"v").unwrap();
        assert_eq!(ctx.get_meta("k").unwrap(), Some(b"v".to_vec()));
        assert!(ctx.delete_meta("k").unwrap());
        assert!(!ctx.delete_meta("k").unwrap());
    }
}
