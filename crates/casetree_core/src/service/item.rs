//! Item handle: the public face of one node in the case tree.
//!
//! # Responsibility
//! - Validate handle state (unbound, removed, root) before any write.
//! - Compose repository calls into single write scopes.
//! - Cache the category and the decoded datasource per item.
//! - Publish change notifications after writes are applied.
//!
//! # Invariants
//! - A removed handle fails every operation with `InvalidItem`.
//! - The root item cannot be removed or moved.
//! - Writing an attribute value identical to the stored one (see
//!   `Data::same_as`) is a no-op.
//! - The datasource cache is reused while its revision matches the stored
//!   revision.

use crate::model::data::{Data, DataMap};
use crate::model::item::{Evidence, ItemEvent, ItemRecord, ItemUid, ROOT_ITEM_UID};
use crate::repo::attribute_repo::SqliteAttributeRepository;
use crate::repo::datasource_repo::{SqliteDatasourceRepository, ABSENT_REVISION};
use crate::repo::event_repo::SqliteEventRepository;
use crate::repo::evidence_repo::SqliteEvidenceRepository;
use crate::repo::item_repo::SqliteItemRepository;
use crate::service::case::CaseContext;
use crate::service::error::{CaseError, CaseResult};
use crate::service::publisher::CaseEvent;
use log::{debug, info};
use rusqlite::Connection;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq)]
struct DatasourceCache {
    revision: i64,
    state: Option<Data>,
}

#[derive(Debug, Default)]
struct ItemState {
    removed: bool,
    category: Option<String>,
    datasource: DatasourceCache,
}

/// Shared state cell for all handles of one item.
pub(crate) struct ItemInner {
    ctx: Rc<CaseContext>,
    uid: ItemUid,
    state: RefCell<ItemState>,
}

impl ItemInner {
    pub(crate) fn new(ctx: Rc<CaseContext>, uid: ItemUid, category: Option<String>) -> Self {
        Self {
            ctx,
            uid,
            state: RefCell::new(ItemState {
                category,
                ..ItemState::default()
            }),
        }
    }

    pub(crate) fn seed_category(&self, category: String) {
        self.state.borrow_mut().category.get_or_insert(category);
    }

    pub(crate) fn mark_removed(&self) {
        let mut state = self.state.borrow_mut();
        state.removed = true;
        state.datasource = DatasourceCache::default();
    }

    /// Forces the next datasource read to go to the database.
    pub(crate) fn invalidate_cache(&self) {
        self.state.borrow_mut().datasource.revision = -1;
    }
}

impl Drop for ItemInner {
    fn drop(&mut self) {
        self.ctx.release(self.uid);
    }
}

/// Handle to one item of an opened case.
///
/// `Item::default()` is an unbound handle; every operation on it fails with
/// `InvalidItem`. Clones share state, as do handles obtained separately for
/// the same uid.
#[derive(Clone, Default)]
pub struct Item {
    inner: Option<Rc<ItemInner>>,
}

impl Debug for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item").field("uid", &self.uid()).finish()
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (Some(left), Some(right)) => Rc::ptr_eq(left, right),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Item {
    pub(crate) fn from_inner(inner: Rc<ItemInner>) -> Self {
        Self { inner: Some(inner) }
    }

    /// Returns whether the handle is bound to an item that was not removed.
    pub fn is_valid(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| !inner.state.borrow().removed)
    }

    /// Item uid, or `None` for unbound and removed handles.
    pub fn uid(&self) -> Option<ItemUid> {
        self.bound().ok().map(|inner| inner.uid)
    }

    pub fn is_root(&self) -> bool {
        self.uid() == Some(ROOT_ITEM_UID)
    }

    fn bound(&self) -> CaseResult<&ItemInner> {
        match &self.inner {
            Some(inner) if !inner.state.borrow().removed => Ok(&**inner),
            _ => Err(CaseError::InvalidItem),
        }
    }

    /// Like `bound`, but also rejects the root.
    fn movable(&self) -> CaseResult<&ItemInner> {
        let inner = self.bound()?;
        if inner.uid == ROOT_ITEM_UID {
            return Err(CaseError::RootItem);
        }
        Ok(inner)
    }

    // ---- hierarchy -------------------------------------------------------

    /// Category tag, cached after the first read.
    pub fn category(&self) -> CaseResult<String> {
        let inner = self.bound()?;
        if let Some(category) = inner.state.borrow().category.clone() {
            return Ok(category);
        }
        let category = SqliteItemRepository::new(&inner.ctx.conn).category(inner.uid)?;
        inner.seed_category(category.clone());
        Ok(category)
    }

    /// Current row of this item.
    pub fn record(&self) -> CaseResult<ItemRecord> {
        let inner = self.bound()?;
        Ok(SqliteItemRepository::new(&inner.ctx.conn).require(inner.uid)?)
    }

    /// 1-based position among siblings.
    pub fn idx(&self) -> CaseResult<u32> {
        Ok(self.record()?.idx)
    }

    /// Creation time in Unix epoch milliseconds.
    pub fn created_at(&self) -> CaseResult<i64> {
        Ok(self.record()?.created_at)
    }

    /// Creates a child at `idx` (1-based), or appends when `idx` is `None`.
    ///
    /// # Errors
    /// - `IndexOutOfRange` unless `idx` is in `1..=child_count + 1`.
    pub fn new_child(&self, category: &str, idx: Option<u32>) -> CaseResult<Item> {
        let inner = self.bound()?;
        let record = inner
            .ctx
            .write(|conn| Ok(SqliteItemRepository::new(conn).create_child(inner.uid, category, idx)?))?;
        info!(
            "event=item_create module=service status=ok uid={} parent_uid={} idx={} category={}",
            record.uid, inner.uid, record.idx, record.category
        );
        Ok(CaseContext::handle(&inner.ctx, record.uid, Some(record.category)))
    }

    /// Deletes this item with its whole subtree, including data directories.
    ///
    /// Every live handle into the subtree becomes invalid. The directories
    /// are deleted when the write commits; inside a caller transaction that
    /// rolls back they are kept.
    pub fn remove(&self) -> CaseResult<()> {
        let inner = self.movable()?;
        let ctx = Rc::clone(&inner.ctx);
        let uid = inner.uid;
        let removed = ctx.write(|conn| {
            let removed = SqliteItemRepository::new(conn).delete_item(uid)?;
            for removed_uid in &removed {
                ctx.overflow.defer_item_dir_removal(*removed_uid);
            }
            Ok(removed)
        })?;
        ctx.forget(&removed);

        info!(
            "event=item_remove module=service status=ok uid={uid} subtree={}",
            removed.len()
        );
        for removed_uid in removed {
            ctx.publish(CaseEvent::ItemRemoved {
                item_uid: removed_uid,
            });
        }
        Ok(())
    }

    /// Moves this item under `new_parent` at `idx`, or appends when `idx` is
    /// `None`. Siblings left behind are renumbered.
    ///
    /// # Errors
    /// - `RootItem` when this is the root.
    /// - `InvalidArgument` when `new_parent` is unbound, from another case,
    ///   or inside this item's subtree.
    /// - `ItemNotFound` when the parent row no longer exists.
    /// - `IndexOutOfRange` unless `idx` is in `1..=child_count + 1`.
    pub fn move_to(&self, idx: Option<u32>, new_parent: &Item) -> CaseResult<()> {
        let inner = self.movable()?;
        let parent = new_parent.bound().map_err(|_| {
            CaseError::InvalidArgument("target parent is unbound or removed".to_string())
        })?;
        if !Rc::ptr_eq(&inner.ctx, &parent.ctx) {
            return Err(CaseError::InvalidArgument(
                "target parent belongs to another case".to_string(),
            ));
        }

        let record = inner.ctx.write(|conn| {
            let repo = SqliteItemRepository::new(conn);
            if repo.is_in_subtree(inner.uid, parent.uid)? {
                return Err(CaseError::InvalidArgument(format!(
                    "cannot move item {} under its own subtree item {}",
                    inner.uid, parent.uid
                )));
            }
            Ok(repo.move_item(inner.uid, parent.uid, idx)?)
        })?;
        info!(
            "event=item_move module=service status=ok uid={} parent_uid={} idx={}",
            record.uid, parent.uid, record.idx
        );
        Ok(())
    }

    /// Children ordered by index.
    pub fn get_children(&self) -> CaseResult<Vec<Item>> {
        let inner = self.bound()?;
        let children = SqliteItemRepository::new(&inner.ctx.conn).children(inner.uid)?;
        Ok(children
            .into_iter()
            .map(|record| CaseContext::handle(&inner.ctx, record.uid, Some(record.category)))
            .collect())
    }

    /// Parent handle, or `None` for the root.
    pub fn get_parent(&self) -> CaseResult<Option<Item>> {
        let inner = self.bound()?;
        let record = SqliteItemRepository::new(&inner.ctx.conn).require(inner.uid)?;
        Ok(record
            .parent_uid
            .map(|parent_uid| CaseContext::handle(&inner.ctx, parent_uid, None)))
    }

    pub fn get_child_count(&self) -> CaseResult<u32> {
        let inner = self.bound()?;
        Ok(SqliteItemRepository::new(&inner.ctx.conn).child_count(inner.uid)?)
    }

    // ---- attributes ------------------------------------------------------

    pub fn has_attribute(&self, id: &str) -> CaseResult<bool> {
        let inner = self.bound()?;
        Ok(SqliteAttributeRepository::new(&inner.ctx.conn, &inner.ctx.overflow).has(inner.uid, id)?)
    }

    /// Attribute value, or `Data::Null` when absent.
    pub fn get_attribute(&self, id: &str) -> CaseResult<Data> {
        let inner = self.bound()?;
        Ok(SqliteAttributeRepository::new(&inner.ctx.conn, &inner.ctx.overflow).get(inner.uid, id)?)
    }

    /// All attributes, keyed by id.
    pub fn get_attributes(&self) -> CaseResult<DataMap> {
        let inner = self.bound()?;
        Ok(SqliteAttributeRepository::new(&inner.ctx.conn, &inner.ctx.overflow)
            .get_all(inner.uid)?)
    }

    /// Stores `value` under `id` and publishes `attribute-modified`.
    ///
    /// Returns `false` without writing or publishing when the stored value
    /// is already identical to `value` (`Data::same_as`, so a stored NaN
    /// matches itself).
    ///
    /// # Errors
    /// - `InvalidArgument` when `id` cannot name an overflow file or `value`
    ///   nests too deeply to be read back.
    pub fn set_attribute(&self, id: &str, value: impl Into<Data>) -> CaseResult<bool> {
        let inner = self.bound()?;
        let value = value.into();
        let ctx = &inner.ctx;
        let previous = ctx.write(|conn| {
            let repo = SqliteAttributeRepository::new(conn, &ctx.overflow);
            let old = repo.get(inner.uid, id)?;
            if old.same_as(&value) {
                return Ok(None);
            }
            repo.set(inner.uid, id, &value)?;
            Ok(Some(old))
        })?;

        let Some(old) = previous else {
            debug!(
                "event=attribute_set module=service status=unchanged uid={} id={id}",
                inner.uid
            );
            return Ok(false);
        };
        debug!(
            "event=attribute_set module=service status=ok uid={} id={id} type={}",
            inner.uid,
            value.type_name()
        );
        ctx.publish(CaseEvent::AttributeModified {
            item_uid: inner.uid,
            id: id.to_string(),
            old,
            new: value,
        });
        Ok(true)
    }

    /// Removes `id`. Returns `false` when it was absent.
    pub fn remove_attribute(&self, id: &str) -> CaseResult<bool> {
        let inner = self.bound()?;
        let ctx = &inner.ctx;
        let previous = ctx.write(|conn| {
            let repo = SqliteAttributeRepository::new(conn, &ctx.overflow);
            if !repo.has(inner.uid, id)? {
                return Ok(None);
            }
            let old = repo.get(inner.uid, id)?;
            repo.remove(inner.uid, id)?;
            Ok(Some(old))
        })?;

        let Some(old) = previous else {
            return Ok(false);
        };
        ctx.publish(CaseEvent::AttributeModified {
            item_uid: inner.uid,
            id: id.to_string(),
            old,
            new: Data::Null,
        });
        Ok(true)
    }

    // ---- events ----------------------------------------------------------

    /// Audit log of this item, oldest first.
    pub fn get_events(&self) -> CaseResult<Vec<ItemEvent>> {
        let inner = self.bound()?;
        Ok(SqliteEventRepository::new(&inner.ctx.conn).list(inner.uid)?)
    }

    pub fn add_event(&self, text: &str) -> CaseResult<ItemEvent> {
        let inner = self.bound()?;
        Ok(SqliteEventRepository::new(&inner.ctx.conn).append(inner.uid, text)?)
    }

    // ---- datasource ------------------------------------------------------

    /// Decoded datasource state, or `None` when none is stored.
    ///
    /// Only the revision is read while the cached copy is current.
    pub fn get_datasource(&self) -> CaseResult<Option<Data>> {
        let inner = self.bound()?;
        let repo = SqliteDatasourceRepository::new(&inner.ctx.conn);
        let stored_revision = repo.revision(inner.uid)?;
        {
            let state = inner.state.borrow();
            if state.datasource.revision == stored_revision {
                return Ok(state.datasource.state.clone());
            }
        }

        let cache = match repo.load(inner.uid)? {
            Some((revision, state)) => DatasourceCache {
                revision,
                state: Some(state),
            },
            None => DatasourceCache::default(),
        };
        debug!(
            "event=datasource_load module=service status=ok uid={} revision={}",
            inner.uid, cache.revision
        );
        let state = cache.state.clone();
        inner.state.borrow_mut().datasource = cache;
        Ok(state)
    }

    /// Stored datasource revision; 0 when none is stored.
    pub fn datasource_revision(&self) -> CaseResult<i64> {
        let inner = self.bound()?;
        Ok(SqliteDatasourceRepository::new(&inner.ctx.conn).revision(inner.uid)?)
    }

    /// Replaces the datasource and publishes `datasource-modified`.
    ///
    /// # Errors
    /// - `InvalidArgument` unless `state` is a map.
    pub fn set_datasource(&self, state: &Data) -> CaseResult<()> {
        let inner = self.bound()?;
        if state.as_map().is_none() {
            return Err(CaseError::InvalidArgument(format!(
                "datasource state must be a map, got {}",
                state.type_name()
            )));
        }
        let revision = inner
            .ctx
            .write(|conn| Ok(SqliteDatasourceRepository::new(conn).store(inner.uid, state)?))?;
        inner.state.borrow_mut().datasource = DatasourceCache {
            revision,
            state: Some(state.clone()),
        };
        inner.ctx.publish(CaseEvent::DatasourceModified {
            item_uid: inner.uid,
            revision,
        });
        Ok(())
    }

    /// Removes the datasource. Returns `false` when none was stored.
    pub fn remove_datasource(&self) -> CaseResult<bool> {
        let inner = self.bound()?;
        let removed = inner
            .ctx
            .write(|conn| Ok(SqliteDatasourceRepository::new(conn).delete(inner.uid)?))?;
        inner.state.borrow_mut().datasource = DatasourceCache::default();
        if removed {
            inner.ctx.publish(CaseEvent::DatasourceModified {
                item_uid: inner.uid,
                revision: ABSENT_REVISION,
            });
        }
        Ok(removed)
    }

    // ---- evidence --------------------------------------------------------

    /// Creates an empty evidence record of `kind`.
    pub fn new_evidence(&self, kind: &str) -> CaseResult<Evidence> {
        let inner = self.bound()?;
        inner
            .ctx
            .write(|conn| Ok(SqliteEvidenceRepository::new(conn).create(inner.uid, kind)?))
    }

    /// Copies `source` (kind, attributes, tags) into a new record on this
    /// item. `source` may belong to any item.
    pub fn add_evidence(&self, source: &Evidence) -> CaseResult<Evidence> {
        let inner = self.bound()?;
        inner
            .ctx
            .write(|conn| Ok(evidence_repo(conn, inner).create_copy(inner.uid, source)?))
    }

    /// Persists attribute and tag changes of `evidence`.
    ///
    /// Evidence attributes are stored inline, so each encoded value is
    /// limited to the case's `overflow_threshold`.
    ///
    /// # Errors
    /// - `InvalidArgument` when `evidence` belongs to another item, or when
    ///   an attribute value is too large or nests too deeply.
    /// - `EvidenceNotFound` when the record was removed.
    pub fn save_evidence(&self, evidence: &Evidence) -> CaseResult<()> {
        let inner = self.bound()?;
        if evidence.item_uid != inner.uid {
            return Err(CaseError::InvalidArgument(format!(
                "evidence {} belongs to item {}, not {}",
                evidence.uid, evidence.item_uid, inner.uid
            )));
        }
        inner
            .ctx
            .write(|conn| Ok(evidence_repo(conn, inner).save(evidence)?))
    }

    /// Evidence records of `kind`, or all records when `kind` is `None`.
    pub fn get_evidences(&self, kind: Option<&str>) -> CaseResult<Vec<Evidence>> {
        let inner = self.bound()?;
        Ok(SqliteEvidenceRepository::new(&inner.ctx.conn).list(inner.uid, kind)?)
    }

    /// Deletes evidence records of `kind` (all when `None`); returns how
    /// many were deleted.
    pub fn remove_evidences(&self, kind: Option<&str>) -> CaseResult<usize> {
        let inner = self.bound()?;
        inner
            .ctx
            .write(|conn| Ok(SqliteEvidenceRepository::new(conn).remove(inner.uid, kind)?))
    }

    pub fn count_evidences(&self, kind: &str) -> CaseResult<i64> {
        let inner = self.bound()?;
        Ok(SqliteEvidenceRepository::new(&inner.ctx.conn).count(inner.uid, kind)?)
    }

    /// Evidence counts keyed by kind.
    pub fn count_all_evidences(&self) -> CaseResult<BTreeMap<String, i64>> {
        let inner = self.bound()?;
        Ok(SqliteEvidenceRepository::new(&inner.ctx.conn).count_by_type(inner.uid)?)
    }

    // ---- data paths ------------------------------------------------------

    /// Absolute path of `relpath` inside this item's data directory.
    /// Nothing is created.
    pub fn get_data_path(&self, relpath: impl AsRef<Path>) -> CaseResult<PathBuf> {
        let inner = self.bound()?;
        Ok(inner.ctx.overflow.paths().resolve(inner.uid, relpath)?)
    }

    /// Like `get_data_path`, but creates the missing parent directories.
    pub fn create_data_path(&self, relpath: impl AsRef<Path>) -> CaseResult<PathBuf> {
        let inner = self.bound()?;
        Ok(inner.ctx.overflow.paths().create(inner.uid, relpath)?)
    }
}

/// Evidence repository bounded by the case's inline limit.
fn evidence_repo<'c>(conn: &'c Connection, inner: &ItemInner) -> SqliteEvidenceRepository<'c> {
    SqliteEvidenceRepository::new(conn).with_inline_limit(inner.ctx.config.overflow_threshold)
}
