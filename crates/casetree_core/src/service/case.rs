//! Opened case: connection, storage roots and the live handle registry.
//!
//! # Responsibility
//! - Open (or create) the case database and per-item data root.
//! - Hand out item handles, sharing one state cell per item uid.
//! - Expose caller-controlled transactions that item writes join.
//!
//! # Invariants
//! - At most one live `ItemInner` exists per uid, so every handle to an item
//!   observes the same removed flag and caches.
//! - A case and its handles are confined to one thread. Other threads open
//!   their own `Case` on the same directory.

use crate::config::CaseConfig;
use crate::db::{open_db, open_db_in_memory, write_scope};
use crate::model::item::{ItemUid, ROOT_ITEM_UID};
use crate::repo::item_repo::SqliteItemRepository;
use crate::service::error::{CaseError, CaseResult};
use crate::service::item::{Item, ItemInner};
use crate::service::publisher::{CaseEvent, EventPublisher};
use crate::storage::{DataPathResolver, OverflowStore, StorageError};
use log::{debug, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Shared state behind a `Case` and all of its item handles.
pub(crate) struct CaseContext {
    pub(crate) conn: Connection,
    pub(crate) config: CaseConfig,
    pub(crate) root_dir: PathBuf,
    pub(crate) overflow: OverflowStore,
    publisher: Arc<dyn EventPublisher>,
    handles: RefCell<HashMap<ItemUid, Weak<ItemInner>>>,
}

impl CaseContext {
    /// Runs `body` in the configured write scope (see `db::write_scope`).
    ///
    /// Overflow file changes settle with the scope. Inside a caller
    /// transaction they stay pending until that transaction ends.
    pub(crate) fn write<T>(
        &self,
        body: impl FnOnce(&Connection) -> CaseResult<T>,
    ) -> CaseResult<T> {
        let owns_scope = self.conn.is_autocommit();
        let result = write_scope(&self.conn, self.config.atomic_writes, body);
        if owns_scope {
            match &result {
                Ok(_) => self.overflow.commit_pending(),
                Err(_) => self.overflow.rollback_pending(),
            }
        }
        result
    }

    pub(crate) fn publish(&self, event: CaseEvent) {
        debug!(
            "event=publish module=service status=ok topic={} uid={}",
            event.topic(),
            event.item_uid()
        );
        self.publisher.publish(&event);
    }

    /// Returns the handle for `uid`, reusing the live state cell when one
    /// exists. `category` seeds the cache of a fresh cell.
    pub(crate) fn handle(ctx: &Rc<Self>, uid: ItemUid, category: Option<String>) -> Item {
        let mut handles = ctx.handles.borrow_mut();
        if let Some(inner) = handles.get(&uid).and_then(Weak::upgrade) {
            if let Some(category) = category {
                inner.seed_category(category);
            }
            return Item::from_inner(inner);
        }
        let inner = Rc::new(ItemInner::new(Rc::clone(ctx), uid, category));
        handles.insert(uid, Rc::downgrade(&inner));
        Item::from_inner(inner)
    }

    /// Invalidates every live handle among `uids`.
    pub(crate) fn forget(&self, uids: &[ItemUid]) {
        let mut handles = self.handles.borrow_mut();
        for uid in uids {
            if let Some(inner) = handles.remove(uid).and_then(|weak| weak.upgrade()) {
                inner.mark_removed();
            }
        }
    }

    /// Drops the registry slot of a handle whose last reference went away.
    pub(crate) fn release(&self, uid: ItemUid) {
        // A re-entrant drop while the registry is borrowed leaves a dead
        // weak entry; `handle` replaces it on the next lookup.
        if let Ok(mut handles) = self.handles.try_borrow_mut() {
            if handles.get(&uid).is_some_and(|weak| weak.strong_count() == 0) {
                handles.remove(&uid);
            }
        }
    }

    /// Marks every cached datasource stale.
    fn invalidate_caches(&self) {
        let live: Vec<Rc<ItemInner>> = self
            .handles
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for inner in live {
            inner.invalidate_cache();
        }
    }

    #[cfg(test)]
    pub(crate) fn live_handle_count(&self) -> usize {
        self.handles
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// One opened case directory.
pub struct Case {
    ctx: Rc<CaseContext>,
}

impl Case {
    /// Opens the case under `root_dir`, creating the directory, database
    /// file and data root when missing.
    ///
    /// # Errors
    /// - `InvalidConfig` when `config` fails validation.
    /// - `Io` when the directories cannot be created.
    /// - `Db` when the database cannot be opened or migrated.
    pub fn open(
        root_dir: impl AsRef<Path>,
        config: CaseConfig,
        publisher: Arc<dyn EventPublisher>,
    ) -> CaseResult<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        config.validate().map_err(CaseError::InvalidConfig)?;
        fs::create_dir_all(&root_dir)
            .map_err(|err| StorageError::io("create case dir", &root_dir, err))?;
        let conn = open_db(root_dir.join(&config.db_file_name))?;
        let case = Self::assemble(conn, root_dir, config, publisher)?;
        info!(
            "event=case_open module=service status=ok path={}",
            case.ctx.root_dir.display()
        );
        Ok(case)
    }

    /// Opens a case whose database lives in memory. Item data directories
    /// still live under `root_dir`.
    pub fn open_in_memory(
        root_dir: impl AsRef<Path>,
        config: CaseConfig,
        publisher: Arc<dyn EventPublisher>,
    ) -> CaseResult<Self> {
        config.validate().map_err(CaseError::InvalidConfig)?;
        let conn = open_db_in_memory()?;
        Self::assemble(conn, root_dir.as_ref().to_path_buf(), config, publisher)
    }

    fn assemble(
        conn: Connection,
        root_dir: PathBuf,
        config: CaseConfig,
        publisher: Arc<dyn EventPublisher>,
    ) -> CaseResult<Self> {
        let data_root = root_dir.join(&config.data_dir_name);
        fs::create_dir_all(&data_root)
            .map_err(|err| StorageError::io("create data root", &data_root, err))?;
        let overflow = OverflowStore::new(DataPathResolver::new(data_root), config.overflow_threshold);
        Ok(Self {
            ctx: Rc::new(CaseContext {
                conn,
                config,
                root_dir,
                overflow,
                publisher,
                handles: RefCell::new(HashMap::new()),
            }),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.ctx.root_dir
    }

    /// Root of the per-item data directories.
    pub fn data_dir(&self) -> &Path {
        self.ctx.overflow.paths().data_root()
    }

    pub fn config(&self) -> &CaseConfig {
        &self.ctx.config
    }

    /// Underlying connection, for read-only inspection.
    pub fn connection(&self) -> &Connection {
        &self.ctx.conn
    }

    /// Returns the tree root.
    pub fn root_item(&self) -> Item {
        CaseContext::handle(&self.ctx, ROOT_ITEM_UID, None)
    }

    /// Returns a handle for `uid`, or `None` when no such item exists.
    pub fn get_item(&self, uid: ItemUid) -> CaseResult<Option<Item>> {
        let record = SqliteItemRepository::new(&self.ctx.conn).get(uid)?;
        Ok(record.map(|record| CaseContext::handle(&self.ctx, record.uid, Some(record.category))))
    }

    #[cfg(test)]
    pub(crate) fn ctx(&self) -> &CaseContext {
        &self.ctx
    }

    /// Begins an IMMEDIATE transaction that subsequent item writes join
    /// until it is committed or rolled back. Dropping it rolls back.
    pub fn transaction(&self) -> CaseResult<CaseTransaction<'_>> {
        let tx = Transaction::new_unchecked(&self.ctx.conn, TransactionBehavior::Immediate)?;
        Ok(CaseTransaction {
            ctx: &self.ctx,
            tx: Some(tx),
        })
    }
}

/// Caller-controlled write scope over a `Case`.
///
/// Overflow files replaced or removed inside the transaction, and data
/// directories of items removed inside it, are restored on rollback.
///
/// Handle caches are not transactional: after a rollback, datasource caches
/// are marked stale, but handles removed inside the transaction stay
/// invalid. Re-fetch them with `Case::get_item`.
pub struct CaseTransaction<'case> {
    ctx: &'case CaseContext,
    tx: Option<Transaction<'case>>,
}

impl CaseTransaction<'_> {
    pub fn commit(mut self) -> CaseResult<()> {
        if let Some(tx) = self.tx.take() {
            if let Err(err) = tx.commit() {
                self.ctx.overflow.rollback_pending();
                self.ctx.invalidate_caches();
                return Err(err.into());
            }
            self.ctx.overflow.commit_pending();
        }
        Ok(())
    }

    pub fn rollback(mut self) -> CaseResult<()> {
        let result = match self.tx.take() {
            Some(tx) => tx.rollback(),
            None => Ok(()),
        };
        self.ctx.overflow.rollback_pending();
        self.ctx.invalidate_caches();
        Ok(result?)
    }
}

impl Drop for CaseTransaction<'_> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            // The inner transaction rolls back on drop.
            self.ctx.overflow.rollback_pending();
            self.ctx.invalidate_caches();
        }
    }
}
