mod common;

use casetree_core::{Case, CaseConfig, Data, DataMap, NoopPublisher};
use common::{child_uids, open_case, open_case_with};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn small_threshold() -> CaseConfig {
    CaseConfig {
        overflow_threshold: 64,
        ..CaseConfig::default()
    }
}

fn large(fill: u8) -> Data {
    Data::Bytes(vec![fill; 256])
}

fn attrs_dir(case: &Case, uid: i64) -> PathBuf {
    case.data_dir().join(format!("{uid:04}")).join("attrs")
}

/// Every file name in `dir`, backups included.
fn files_in(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
        Err(_) => Vec::new(),
    }
}

#[test]
fn committed_transaction_keeps_every_write() {
    let (_dir, case) = open_case();
    let root = case.root_item();

    let tx = case.transaction().unwrap();
    let disk = root.new_child("disk", None).unwrap();
    disk.set_attribute("serial", "S1").unwrap();
    root.new_child("disk", None).unwrap();
    tx.commit().unwrap();

    assert_eq!(root.get_child_count().unwrap(), 2);
    assert_eq!(disk.get_attribute("serial").unwrap(), Data::from("S1"));
}

#[test]
fn rolled_back_transaction_discards_every_write() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    let kept = root.new_child("disk", None).unwrap();

    let tx = case.transaction().unwrap();
    root.new_child("disk", Some(1)).unwrap();
    kept.set_attribute("serial", "S1").unwrap();
    tx.rollback().unwrap();

    assert_eq!(child_uids(&root), vec![kept.uid().unwrap()]);
    assert_eq!(kept.idx().unwrap(), 1);
    assert_eq!(kept.get_attribute("serial").unwrap(), Data::Null);
}

#[test]
fn dropped_transaction_rolls_back_and_refreshes_datasource_cache() {
    let (_dir, case) = open_case();
    let item = case.root_item().new_child("disk", None).unwrap();
    let mut state = DataMap::new();
    state.insert("path".to_string(), Data::from("/a"));
    item.set_datasource(&Data::Map(state.clone())).unwrap();

    {
        let _tx = case.transaction().unwrap();
        let mut changed = state.clone();
        changed.insert("path".to_string(), Data::from("/b"));
        item.set_datasource(&Data::Map(changed)).unwrap();
    }

    assert_eq!(item.datasource_revision().unwrap(), 1);
    assert_eq!(item.get_datasource().unwrap(), Some(Data::Map(state)));
}

#[test]
fn non_atomic_writes_still_apply() {
    let (_dir, case) = open_case_with(CaseConfig {
        atomic_writes: false,
        ..CaseConfig::default()
    });
    let root = case.root_item();
    let first = root.new_child("disk", None).unwrap();
    let second = root.new_child("disk", Some(1)).unwrap();

    assert_eq!(second.idx().unwrap(), 1);
    assert_eq!(first.idx().unwrap(), 2);
    first.remove().unwrap();
    assert_eq!(second.idx().unwrap(), 1);
}

#[test]
fn rollback_restores_a_spilled_value_replaced_by_a_small_one() {
    let (_dir, case) = open_case_with(small_threshold());
    let item = case.root_item().new_child("file", None).unwrap();
    let dir = attrs_dir(&case, item.uid().unwrap());
    item.set_attribute("content", large(1)).unwrap();

    let tx = case.transaction().unwrap();
    item.set_attribute("content", "small").unwrap();
    assert_eq!(item.get_attribute("content").unwrap(), Data::from("small"));
    assert!(!files_in(&dir).contains(&"content.pod".to_string()));
    tx.rollback().unwrap();

    assert_eq!(item.get_attribute("content").unwrap(), large(1));
    assert_eq!(files_in(&dir), vec!["content.pod"]);
}

#[test]
fn rollback_restores_a_spilled_value_replaced_by_another() {
    let (_dir, case) = open_case_with(small_threshold());
    let item = case.root_item().new_child("file", None).unwrap();
    let dir = attrs_dir(&case, item.uid().unwrap());
    item.set_attribute("content", large(1)).unwrap();

    {
        let _tx = case.transaction().unwrap();
        item.set_attribute("content", large(2)).unwrap();
        item.set_attribute("content", large(3)).unwrap();
    }

    assert_eq!(item.get_attribute("content").unwrap(), large(1));
    assert_eq!(files_in(&dir), vec!["content.pod"]);
}

#[test]
fn rollback_drops_an_overflow_file_written_inside_the_transaction() {
    let (_dir, case) = open_case_with(small_threshold());
    let item = case.root_item().new_child("file", None).unwrap();
    let dir = attrs_dir(&case, item.uid().unwrap());
    item.set_attribute("content", "small").unwrap();

    let tx = case.transaction().unwrap();
    item.set_attribute("content", large(1)).unwrap();
    item.set_attribute("extra", large(2)).unwrap();
    tx.rollback().unwrap();

    assert_eq!(item.get_attribute("content").unwrap(), Data::from("small"));
    assert!(!item.has_attribute("extra").unwrap());
    assert!(files_in(&dir).is_empty());
}

#[test]
fn commit_settles_overflow_files_without_leftovers() {
    let (_dir, case) = open_case_with(small_threshold());
    let item = case.root_item().new_child("file", None).unwrap();
    let dir = attrs_dir(&case, item.uid().unwrap());
    item.set_attribute("content", large(1)).unwrap();
    item.set_attribute("old", large(2)).unwrap();

    let tx = case.transaction().unwrap();
    item.set_attribute("content", "small").unwrap();
    item.remove_attribute("old").unwrap();
    item.set_attribute("new", large(3)).unwrap();
    tx.commit().unwrap();

    assert_eq!(files_in(&dir), vec!["new.pod"]);
    assert_eq!(item.get_attribute("content").unwrap(), Data::from("small"));
    assert_eq!(item.get_attribute("new").unwrap(), large(3));
}

#[test]
fn failed_row_write_removes_the_overflow_file_it_wrote() {
    let (dir, case) = open_case_with(small_threshold());
    let item = case.root_item().new_child("file", None).unwrap();
    let uid = item.uid().unwrap();

    let other = Case::open(dir.path(), small_threshold(), Arc::new(NoopPublisher)).unwrap();
    other.get_item(uid).unwrap().unwrap().remove().unwrap();

    // The handle of the first case does not know the row is gone; the
    // attribute row insert fails on the item foreign key.
    assert!(item.set_attribute("content", large(1)).is_err());
    assert!(files_in(&attrs_dir(&case, uid)).is_empty());
}

#[test]
fn rolled_back_subtree_removal_keeps_data_directories() {
    let (_dir, case) = open_case_with(small_threshold());
    let disk = case.root_item().new_child("disk", None).unwrap();
    let file = disk.new_child("file", None).unwrap();
    let (disk_uid, file_uid) = (disk.uid().unwrap(), file.uid().unwrap());
    file.set_attribute("content", large(1)).unwrap();
    let note = disk.create_data_path("notes/summary.txt").unwrap();
    std::fs::write(&note, "seen").unwrap();

    let tx = case.transaction().unwrap();
    disk.remove().unwrap();
    assert!(!file.is_valid());
    assert!(case.get_item(file_uid).unwrap().is_none());
    tx.rollback().unwrap();

    assert_eq!(std::fs::read_to_string(&note).unwrap(), "seen");
    let disk = case.get_item(disk_uid).unwrap().unwrap();
    let file = case.get_item(file_uid).unwrap().unwrap();
    assert_eq!(child_uids(&disk), vec![file_uid]);
    assert_eq!(file.get_attribute("content").unwrap(), large(1));
}

#[test]
fn committed_subtree_removal_deletes_data_directories() {
    let (_dir, case) = open_case_with(small_threshold());
    let disk = case.root_item().new_child("disk", None).unwrap();
    let file = disk.new_child("file", None).unwrap();
    file.set_attribute("content", large(1)).unwrap();
    let disk_dir = case.data_dir().join(format!("{:04}", disk.uid().unwrap()));
    let file_dir = case.data_dir().join(format!("{:04}", file.uid().unwrap()));
    disk.create_data_path("notes/summary.txt").unwrap();

    let tx = case.transaction().unwrap();
    disk.remove().unwrap();
    assert!(file_dir.exists());
    tx.commit().unwrap();

    assert!(!disk_dir.exists());
    assert!(!file_dir.exists());
}
