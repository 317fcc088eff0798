use quire_store::{Attachment, AttachmentStore, Direction, Metadata, StoreError, Table};
use quire_types::Etag;

use super::check_etag;
use crate::{keys, TransactionalContext};

impl AttachmentStore for TransactionalContext {
    fn add_attachment(
        &self,
        key: &str,
        expected: Option<Etag>,
        data: &[u8],
        metadata: &Metadata,
    ) -> Result<Etag, StoreError> {
        let row = keys::attachment(key);
        let existing = self.get_record::<Attachment>(Table::Attachments, &row)?;
        check_etag(key, expected, existing.as_ref().map(|a| a.etag))?;

        let etag = self.next_etag()?;
        if let Some(old) = &existing {
            self.delete(Table::AttachmentEtags, keys::etag(old.etag))?;
        }
        self.put(Table::AttachmentEtags, keys::etag(etag), row.clone())?;
        let attachment = Attachment {
            key: key.to_string(),
            etag,
            last_modified: self.now(),
            data: data.to_vec(),
            metadata: metadata.clone(),
        };
        self.put_record(Table::Attachments, row, &attachment)?;
        Ok(etag)
    }

    fn attachment(&self, key: &str) -> Result<Option<Attachment>, StoreError> {
        self.get_record(Table::Attachments, &keys::attachment(key))
    }

    fn delete_attachment(&self, key: &str, expected: Option<Etag>) -> Result<bool, StoreError> {
        let row = keys::attachment(key);
        let Some(existing) = self.get_record::<Attachment>(Table::Attachments, &row)? else {
            return Ok(false);
        };
        check_etag(key, expected, Some(existing.etag))?;
        self.delete(Table::AttachmentEtags, keys::etag(existing.etag))?;
        self.delete(Table::Attachments, row)?;
        Ok(true)
    }

    fn attachments_after(&self, etag: Etag, take: usize) -> Result<Vec<Attachment>, StoreError> {
        let mut attachments = Vec::new();
        for (current, row) in self.etag_page(Table::AttachmentEtags, Some(etag), Direction::Forward, take)? {
            let attachment = self
                .get_record::<Attachment>(Table::Attachments, &row)?
                .ok_or_else(|| StoreError::Corruption(format!("etag {} has no attachment", current)))?;
            attachments.push(attachment);
        }
        Ok(attachments)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;

    #[test]
    fn add_replace_delete() {
        let (_, ctx) = context();
        let first = ctx.add_attachment("img/1", None, b"png", &Metadata::new()).unwrap();
        let second = ctx.add_attachment("IMG/1", Some(first), b"png2", &Metadata::new()).unwrap();
        assert!(second > first);
        assert_eq!(ctx.attachment("img/1").unwrap().unwrap().data, b"png2");
        assert!(matches!(
            ctx.delete_attachment("img/1", Some(first)),
            Err(StoreError::ConcurrencyViolation { .. })
        ));
        assert!(ctx.delete_attachment("img/1", Some(second)).unwrap());
        assert!(!ctx.delete_attachment("img/1", None).unwrap());
    }

    #[test]
    fn after_skips_older_and_respects_take() {
        let (_, ctx) = context();
        let a = ctx.add_attachment("a", None, b"", &Metadata::new()).unwrap();
        ctx.add_attachment("b", None, b"", &Metadata::new()).unwrap();
        ctx.add_attachment("c", None, b"", &Metadata::new()).unwrap();
        let keys: Vec<String> = ctx.attachments_after(a, 1).unwrap().into_iter().map(|x| x.key).collect();
        assert_eq!(keys, ["b"]);
    }
}
