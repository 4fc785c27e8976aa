//! Evidence records attached to items.
//!
//! # Responsibility
//! - Persist evidence rows with their attribute and tag child rows.
//! - Replace the whole attribute/tag set of one evidence in one call.
//!
//! # Invariants
//! - Evidence attributes are always stored inline, so each encoded value
//!   must fit the inline limit (the case overflow threshold).
//! - Attribute values are checked before any row is touched.
//! - Tags are stored as given; duplicates collapse through the primary key.

use super::event_repo::SqliteEventRepository;
use super::{encode_for_write, RepoError, RepoResult};
use crate::codec::decode;
use crate::model::data::DataMap;
use crate::storage::DEFAULT_OVERFLOW_THRESHOLD;
use crate::model::item::{Evidence, EvidenceUid, ItemUid};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::{BTreeMap, BTreeSet};

/// SQLite-backed evidence repository.
pub struct SqliteEvidenceRepository<'conn> {
    conn: &'conn Connection,
    inline_limit: usize,
}

impl<'conn> SqliteEvidenceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            inline_limit: DEFAULT_OVERFLOW_THRESHOLD,
        }
    }

    /// Caps the encoded size of each evidence attribute value.
    pub fn with_inline_limit(mut self, inline_limit: usize) -> Self {
        self.inline_limit = inline_limit;
        self
    }

    /// Creates an empty evidence of `kind` under `item_uid`.
    pub fn create(&self, item_uid: ItemUid, kind: &str) -> RepoResult<Evidence> {
        self.conn.execute(
            "INSERT INTO evidence (item_uid, type) VALUES (?1, ?2);",
            params![item_uid, kind],
        )?;
        let uid = self.conn.last_insert_rowid();
        SqliteEventRepository::new(self.conn)
            .append(item_uid, &format!("evidence '{kind}' created"))?;

        Ok(Evidence {
            uid,
            item_uid,
            kind: kind.to_string(),
            attributes: DataMap::new(),
            tags: BTreeSet::new(),
        })
    }

    /// Creates a new evidence under `item_uid` holding a copy of `source`'s
    /// type, attributes and tags.
    pub fn create_copy(&self, item_uid: ItemUid, source: &Evidence) -> RepoResult<Evidence> {
        let encoded = self.encode_attributes(source)?;
        let mut copy = self.create(item_uid, &source.kind)?;
        copy.attributes = source.attributes.clone();
        copy.tags = source.tags.clone();
        self.write_children(&copy, encoded)?;
        Ok(copy)
    }

    /// Replaces stored attributes and tags with those of `evidence`.
    ///
    /// # Errors
    /// - `EvidenceNotFound` when the evidence row is missing or belongs to
    ///   another item.
    /// - `InvalidValue` when an attribute value nests too deeply or its
    ///   encoding exceeds the inline limit.
    pub fn save(&self, evidence: &Evidence) -> RepoResult<()> {
        let encoded = self.encode_attributes(evidence)?;
        let owned: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM evidence WHERE uid = ?1 AND item_uid = ?2);",
            params![evidence.uid, evidence.item_uid],
            |row| row.get(0),
        )?;
        if owned != 1 {
            return Err(RepoError::EvidenceNotFound(evidence.uid));
        }

        self.conn.execute(
            "DELETE FROM evidence_attribute WHERE evidence_uid = ?1;",
            [evidence.uid],
        )?;
        self.conn.execute(
            "DELETE FROM evidence_tag WHERE evidence_uid = ?1;",
            [evidence.uid],
        )?;
        self.write_children(evidence, encoded)
    }

    /// Lists evidences of one item, optionally restricted to `kind`, in
    /// creation order.
    pub fn list(&self, item_uid: ItemUid, kind: Option<&str>) -> RepoResult<Vec<Evidence>> {
        let mut sql = "SELECT uid, type FROM evidence WHERE item_uid = ?".to_string();
        let mut bind_values = vec![Value::Integer(item_uid)];
        if let Some(kind) = kind {
            sql.push_str(" AND type = ?");
            bind_values.push(Value::Text(kind.to_string()));
        }
        sql.push_str(" ORDER BY uid ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut heads: Vec<(EvidenceUid, String)> = Vec::new();
        while let Some(row) = rows.next()? {
            heads.push((row.get(0)?, row.get(1)?));
        }

        heads
            .into_iter()
            .map(|(uid, kind)| -> RepoResult<Evidence> {
                Ok(Evidence {
                    uid,
                    item_uid,
                    kind,
                    attributes: self.load_attributes(uid)?,
                    tags: self.load_tags(uid)?,
                })
            })
            .collect()
    }

    /// Deletes evidences of one item, optionally restricted to `kind`.
    ///
    /// Returns the number of deleted evidences.
    pub fn remove(&self, item_uid: ItemUid, kind: Option<&str>) -> RepoResult<usize> {
        let removed = match kind {
            Some(kind) => self.conn.execute(
                "DELETE FROM evidence WHERE item_uid = ?1 AND type = ?2;",
                params![item_uid, kind],
            )?,
            None => self
                .conn
                .execute("DELETE FROM evidence WHERE item_uid = ?1;", [item_uid])?,
        };
        if removed > 0 {
            let text = match kind {
                Some(kind) => format!("{removed} evidence(s) '{kind}' removed"),
                None => format!("{removed} evidence(s) removed"),
            };
            SqliteEventRepository::new(self.conn).append(item_uid, &text)?;
        }
        Ok(removed)
    }

    /// Counts evidences of `kind` under one item.
    pub fn count(&self, item_uid: ItemUid, kind: &str) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM evidence WHERE item_uid = ?1 AND type = ?2;",
            params![item_uid, kind],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Counts evidences per type under one item.
    pub fn count_by_type(&self, item_uid: ItemUid) -> RepoResult<BTreeMap<String, i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT type, COUNT(*)
             FROM evidence
             WHERE item_uid = ?1
             GROUP BY type;",
        )?;
        let mut rows = stmt.query([item_uid])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            counts.insert(row.get(0)?, row.get(1)?);
        }
        Ok(counts)
    }

    fn encode_attributes<'e>(
        &self,
        evidence: &'e Evidence,
    ) -> RepoResult<Vec<(&'e str, Vec<u8>)>> {
        evidence
            .attributes
            .iter()
            .map(|(id, value)| {
                let context = format!("evidence attribute `{id}`");
                let encoded = encode_for_write(value, &context)?;
                if encoded.len() > self.inline_limit {
                    return Err(RepoError::InvalidValue(format!(
                        "{context}: {} bytes exceed the inline limit of {} bytes",
                        encoded.len(),
                        self.inline_limit
                    )));
                }
                Ok((id.as_str(), encoded))
            })
            .collect()
    }

    fn write_children(&self, evidence: &Evidence, encoded: Vec<(&str, Vec<u8>)>) -> RepoResult<()> {
        let mut insert_attribute = self.conn.prepare(
            "INSERT INTO evidence_attribute (evidence_uid, id, value) VALUES (?1, ?2, ?3);",
        )?;
        for (id, value) in encoded {
            insert_attribute.execute(params![evidence.uid, id, value])?;
        }

        let mut insert_tag = self
            .conn
            .prepare("INSERT OR IGNORE INTO evidence_tag (evidence_uid, name) VALUES (?1, ?2);")?;
        for tag in &evidence.tags {
            insert_tag.execute(params![evidence.uid, tag])?;
        }
        Ok(())
    }

    fn load_attributes(&self, evidence_uid: EvidenceUid) -> RepoResult<DataMap> {
        let mut stmt = self.conn.prepare(
            "SELECT id, value FROM evidence_attribute WHERE evidence_uid = ?1;",
        )?;
        let mut rows = stmt.query([evidence_uid])?;
        let mut attributes = DataMap::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let stored: Vec<u8> = row.get(1)?;
            let value = decode(&stored).map_err(|source| RepoError::Codec {
                context: format!("attribute `{id}` of evidence {evidence_uid}"),
                source,
            })?;
            attributes.insert(id, value);
        }
        Ok(attributes)
    }

    fn load_tags(&self, evidence_uid: EvidenceUid) -> RepoResult<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM evidence_tag WHERE evidence_uid = ?1;")?;
        let mut rows = stmt.query([evidence_uid])?;
        let mut tags = BTreeSet::new();
        while let Some(row) = rows.next()? {
            tags.insert(row.get(0)?);
        }
        Ok(tags)
    }
}
