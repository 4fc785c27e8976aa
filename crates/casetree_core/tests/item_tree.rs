mod common;

use casetree_core::{CaseError, Data, Item, ROOT_ITEM_UID};
use common::{child_indices, child_uids, open_case};

#[test]
fn scenario_create_remove_and_store_attributes() {
    let (dir, case) = open_case();
    let root = case.root_item();
    assert_eq!(root.uid(), Some(ROOT_ITEM_UID));

    let children: Vec<Item> = (0..3)
        .map(|_| root.new_child("disk", None).unwrap())
        .collect();
    assert_eq!(child_indices(&root), vec![1, 2, 3]);

    children[1].remove().unwrap();
    assert_eq!(child_indices(&root), vec![1, 2]);
    assert_eq!(
        child_uids(&root),
        vec![children[0].uid().unwrap(), children[2].uid().unwrap()]
    );

    root.set_attribute("name", "hello").unwrap();
    assert_eq!(root.get_attribute("name").unwrap(), Data::from("hello"));

    let blob: Vec<u8> = (0..40 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    root.set_attribute("blob", blob.clone()).unwrap();
    assert_eq!(root.get_attribute("blob").unwrap(), Data::Bytes(blob));
    assert!(dir.path().join("data/0001/attrs/blob.pod").is_file());
}

#[test]
fn insert_at_position_shifts_later_siblings() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    let first = root.new_child("disk", None).unwrap();
    let second = root.new_child("disk", None).unwrap();

    let inserted = root.new_child("memory", Some(1)).unwrap();
    assert_eq!(inserted.idx().unwrap(), 1);
    assert_eq!(first.idx().unwrap(), 2);
    assert_eq!(second.idx().unwrap(), 3);

    let appended_explicitly = root.new_child("memory", Some(4)).unwrap();
    assert_eq!(appended_explicitly.idx().unwrap(), 4);
    assert_eq!(child_indices(&root), vec![1, 2, 3, 4]);
}

#[test]
fn out_of_range_positions_are_rejected_without_side_effects() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    for _ in 0..3 {
        root.new_child("disk", None).unwrap();
    }

    for idx in [0, 5, 100] {
        let err = root.new_child("disk", Some(idx)).unwrap_err();
        assert!(
            matches!(err, CaseError::IndexOutOfRange { requested, max_idx: 3, .. } if requested == idx),
            "unexpected error for {idx}: {err}"
        );
    }
    assert_eq!(root.get_child_count().unwrap(), 3);
    assert_eq!(child_indices(&root), vec![1, 2, 3]);
}

#[test]
fn remove_deletes_the_whole_subtree_and_its_data() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    let disk = root.new_child("disk", None).unwrap();
    let partition = disk.new_child("partition", None).unwrap();
    let file = partition.new_child("file", None).unwrap();
    let sibling = root.new_child("disk", None).unwrap();

    let file_uid = file.uid().unwrap();
    let file_data = file.create_data_path("carved/out.bin").unwrap();
    std::fs::write(&file_data, b"payload").unwrap();
    file.set_attribute("size", 7_i64).unwrap();

    disk.remove().unwrap();

    for handle in [&disk, &partition, &file] {
        assert!(!handle.is_valid());
        assert!(matches!(handle.category(), Err(CaseError::InvalidItem)));
    }
    assert!(case.get_item(file_uid).unwrap().is_none());
    assert!(!file_data.exists());
    assert_eq!(sibling.idx().unwrap(), 1);

    let orphans: i64 = case
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM attribute WHERE item_uid = ?1;",
            [file_uid],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphans, 0);
}

#[test]
fn root_cannot_be_removed_or_moved() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    let child = root.new_child("disk", None).unwrap();

    assert!(matches!(root.remove(), Err(CaseError::RootItem)));
    assert!(matches!(root.move_to(None, &child), Err(CaseError::RootItem)));
    assert!(root.is_valid());
    assert_eq!(root.get_parent().unwrap(), None);
}

#[test]
fn move_between_parents_compacts_the_old_parent() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    let left = root.new_child("folder", None).unwrap();
    let right = root.new_child("folder", None).unwrap();
    let a = left.new_child("file", None).unwrap();
    let b = left.new_child("file", None).unwrap();
    let c = left.new_child("file", None).unwrap();
    let x = right.new_child("file", None).unwrap();

    b.move_to(Some(1), &right).unwrap();

    assert_eq!(child_uids(&left), vec![a.uid().unwrap(), c.uid().unwrap()]);
    assert_eq!(child_indices(&left), vec![1, 2]);
    assert_eq!(child_uids(&right), vec![b.uid().unwrap(), x.uid().unwrap()]);
    assert_eq!(child_indices(&right), vec![1, 2]);
    assert_eq!(b.get_parent().unwrap(), Some(right.clone()));

    let last = b.get_events().unwrap().pop().unwrap();
    assert!(last.text.starts_with("item moved to parent"));
}

#[test]
fn move_within_the_same_parent_keeps_indices_contiguous() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    let items: Vec<Item> = (0..4)
        .map(|_| root.new_child("file", None).unwrap())
        .collect();
    let uid = |index: usize| items[index].uid().unwrap();

    items[0].move_to(None, &root).unwrap();
    assert_eq!(child_uids(&root), vec![uid(1), uid(2), uid(3), uid(0)]);

    items[0].move_to(Some(1), &root).unwrap();
    assert_eq!(child_uids(&root), vec![uid(0), uid(1), uid(2), uid(3)]);

    items[3].move_to(Some(2), &root).unwrap();
    assert_eq!(child_uids(&root), vec![uid(0), uid(3), uid(1), uid(2)]);
    assert_eq!(child_indices(&root), vec![1, 2, 3, 4]);
}

#[test]
fn move_into_own_subtree_is_rejected() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    let parent = root.new_child("folder", None).unwrap();
    let child = parent.new_child("folder", None).unwrap();
    let grandchild = child.new_child("file", None).unwrap();

    for target in [&parent, &child, &grandchild] {
        assert!(matches!(
            parent.move_to(None, target),
            Err(CaseError::InvalidArgument(_))
        ));
    }
    assert_eq!(parent.get_parent().unwrap(), Some(root));
}

#[test]
fn move_to_an_unbound_or_removed_parent_is_rejected() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    let item = root.new_child("file", None).unwrap();
    let gone = root.new_child("folder", None).unwrap();
    gone.remove().unwrap();

    assert!(matches!(
        item.move_to(None, &Item::default()),
        Err(CaseError::InvalidArgument(_))
    ));
    assert!(matches!(
        item.move_to(None, &gone),
        Err(CaseError::InvalidArgument(_))
    ));
    assert_eq!(item.idx().unwrap(), 1);
}

#[test]
fn random_edit_sequence_keeps_every_sibling_list_contiguous() {
    let (_dir, case) = open_case();
    let root = case.root_item();
    let mut live: Vec<Item> = vec![root.clone()];

    // Deterministic pseudo-random walk over create/move/remove.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = |bound: usize| {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        (seed % bound as u64) as usize
    };

    for _ in 0..200 {
        let target = live[next(live.len())].clone();
        match next(3) {
            0 => {
                let count = target.get_child_count().unwrap();
                let idx = match next(2) {
                    0 => None,
                    _ => Some(next(count as usize + 1) as u32 + 1),
                };
                live.push(target.new_child("node", idx).unwrap());
            }
            1 if !target.is_root() => {
                let parent = live[next(live.len())].clone();
                let count = parent.get_child_count().unwrap();
                let idx = Some(next(count as usize + 1) as u32 + 1);
                match target.move_to(idx, &parent) {
                    Ok(()) | Err(CaseError::InvalidArgument(_)) => {}
                    Err(CaseError::IndexOutOfRange { .. }) => {}
                    Err(other) => panic!("unexpected move error: {other}"),
                }
            }
            2 if !target.is_root() && live.len() > 10 => {
                target.remove().unwrap();
                live.retain(Item::is_valid);
            }
            _ => {}
        }
    }

    for item in &live {
        let count = item.get_child_count().unwrap();
        assert_eq!(child_indices(item), (1..=count).collect::<Vec<_>>());
    }
}

#[test]
fn category_and_creation_event_are_recorded() {
    let (_dir, case) = open_case();
    let disk = case.root_item().new_child("disk", None).unwrap();

    assert_eq!(disk.category().unwrap(), "disk");
    assert!(disk.created_at().unwrap() > 0);
    let events = disk.get_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text, "item created");

    disk.add_event("imaged with dd").unwrap();
    let texts: Vec<String> = disk
        .get_events()
        .unwrap()
        .into_iter()
        .map(|event| event.text)
        .collect();
    assert_eq!(texts, vec!["item created", "imaged with dd"]);
}

#[test]
fn reopened_case_sees_persisted_tree() {
    let dir = tempfile::tempdir().unwrap();
    let uid = {
        let case = casetree_core::Case::open(
            dir.path(),
            casetree_core::CaseConfig::default(),
            std::sync::Arc::new(casetree_core::NoopPublisher),
        )
        .unwrap();
        let disk = case.root_item().new_child("disk", None).unwrap();
        disk.set_attribute("serial", "WD-123").unwrap();
        disk.uid().unwrap()
    };

    let case = casetree_core::Case::open(
        dir.path(),
        casetree_core::CaseConfig::default(),
        std::sync::Arc::new(casetree_core::NoopPublisher),
    )
    .unwrap();
    let disk = case.get_item(uid).unwrap().unwrap();
    assert_eq!(disk.category().unwrap(), "disk");
    assert_eq!(disk.get_attribute("serial").unwrap(), Data::from("WD-123"));
    assert_eq!(child_uids(&case.root_item()), vec![uid]);
}
