//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of maildir-uidlist.
//
// maildir-uidlist is free software: you can  redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// maildir-uidlist is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// maildir-uidlist. If not, see <http://www.gnu.org/licenses/>.

//! Tests which drive `MaildirFolder` against real maildirs, with message files
//! coming and going the way a delivery agent and a mail client would move
//! them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use tempfile::TempDir;

use super::folder::MaildirFolder;
use super::lock::{MailboxLocker, ThreadLocker};
use super::message_name::{Flags, MessageName};
use super::uid_list::Uid;
use crate::support::config::{LockingMode, MaildirConfig};
use crate::support::error::Error;

struct Setup {
    _root: TempDir,
    folder: MaildirFolder,
}

impl Setup {
    fn new() -> Self {
        Self::with_config(&MaildirConfig::default())
    }

    fn with_config(config: &MaildirConfig) -> Self {
        crate::init_test_log();
        let root = TempDir::new().unwrap();
        // Each test gets its own lock table so tests cannot block each other
        let locker: Arc<dyn MailboxLocker> = match config.locking {
            LockingMode::Thread => Arc::new(ThreadLocker::new()),
            LockingMode::File => config.locker(),
        };
        let folder =
            MaildirFolder::new(root.path().join("INBOX"), config, locker);
        folder.create().unwrap();
        Setup {
            _root: root,
            folder,
        }
    }

    fn cur(&self) -> &Path {
        self.folder.path().cur_path()
    }

    fn new_dir(&self) -> &Path {
        self.folder.path().new_path()
    }

    fn deliver(&self, dir: &Path, name: &str) {
        fs::write(dir.join(name), name).unwrap();
    }

    fn uid_list(&self) -> String {
        fs::read_to_string(self.folder.path().uid_list_path()).unwrap()
    }

    fn header(&self) -> String {
        self.uid_list().lines().next().unwrap().to_owned()
    }
}

fn uids(map: &BTreeMap<Uid, MessageName>) -> Vec<u64> {
    map.keys().map(|uid| uid.get()).collect()
}

#[test]
fn fresh_mailbox_has_empty_uid_list() {
    let setup = Setup::new();
    assert!(!setup.folder.path().uid_list_path().exists());

    assert!(setup.folder.get_uid_map(0, None).unwrap().is_empty());
    assert_eq!("1 0 0\n", setup.uid_list());
    assert_eq!(None, setup.folder.get_last_uid().unwrap());
}

#[test]
fn basic_lifecycle() {
    let setup = Setup::new();
    let folder = &setup.folder;

    setup.deliver(setup.cur(), "a:2,S=10");
    setup.deliver(setup.cur(), "b:2,S=12");

    let map = folder.get_uid_map(0, None).unwrap();
    assert_eq!(vec![1, 2], uids(&map));
    let mut names = map.values().map(MessageName::render).collect::<Vec<_>>();
    names.sort();
    assert_eq!(vec!["a:2,S=10", "b:2,S=12"], names);
    assert_eq!("1 2 2", setup.header());
    let b = map
        .iter()
        .find(|&(_, name)| "b:2,S=12" == name.render())
        .map(|(&uid, _)| uid)
        .unwrap();

    setup.deliver(setup.cur(), "c:2,S=5");
    let c = folder.append_message("c:2,S=5").unwrap();
    assert_eq!(Uid::u(3), c);
    assert_eq!("1 3 3", setup.header());

    fs::rename(setup.cur().join("c:2,S=5"), setup.cur().join("c:2,S=5:2,F"))
        .unwrap();
    folder.update(c, "c:2,S=5:2,F").unwrap();
    assert_eq!(
        "c:2,S=5:2,F",
        folder.get_message_name_by_uid(c).unwrap().render()
    );
    assert_eq!(Some(c), folder.get_last_uid().unwrap());

    let deleted = folder.delete(b).unwrap();
    assert_eq!("b:2,S=12", deleted.render());
    assert!(!setup.cur().join("b:2,S=12").exists());
    assert_eq!(2, folder.get_message_count().unwrap());
    assert_eq!("1 3 2", setup.header());
    assert_matches!(
        Err(Error::NxMessage(_)),
        folder.get_message_name_by_uid(b)
    );
}

#[test]
fn append_to_fresh_list_allocates_next_uid() {
    let setup = Setup::new();
    let folder = &setup.folder;
    setup.deliver(setup.cur(), "a");
    folder.get_uid_map(0, None).unwrap();

    // The name is not on disk yet, so only the explicit append assigns it
    assert_eq!(Uid::u(2), folder.append_message("pending").unwrap());
    assert_eq!("1 2 2\n1 a\n2 pending\n", setup.uid_list());
}

#[test]
fn append_without_uid_list_requires_file() {
    let setup = Setup::new();
    setup.deliver(setup.new_dir(), "there");

    assert_matches!(
        Err(Error::UnallocatableMessage(_)),
        setup.folder.append_message("missing")
    );
    // The build itself still happened
    assert_eq!("1 1 1\n1 there\n", setup.uid_list());

    let setup = Setup::new();
    setup.deliver(setup.new_dir(), "there");
    assert_eq!(Uid::u(1), setup.folder.append_message("there").unwrap());
}

#[test]
fn repeated_append_allocates_each_time() {
    let setup = Setup::new();
    let folder = &setup.folder;
    setup.deliver(setup.cur(), "a");
    folder.get_uid_map(0, None).unwrap();

    let first = folder.append_message("x").unwrap();
    let second = folder.append_message("x").unwrap();
    let third = folder.append_message("x:2,S").unwrap();
    assert_eq!(
        vec![2, 3, 4],
        vec![first.get(), second.get(), third.get()]
    );

    // The message lives on under the newest UID only
    assert_eq!("1 4 2\n1 a\n4 x:2,S\n", setup.uid_list());
    assert_matches!(
        Err(Error::NxMessage(_)),
        folder.get_message_name_by_uid(second)
    );
}

#[test]
fn append_of_delivered_file_gets_single_uid() {
    let setup = Setup::new();
    let folder = &setup.folder;
    setup.deliver(setup.cur(), "a");
    folder.get_uid_map(0, None).unwrap();
    thread::sleep(Duration::from_millis(20));

    // Delivered alongside a message nobody appends; reconciliation assigns
    // that one, the append assigns ours
    setup.deliver(setup.new_dir(), "other");
    setup.deliver(setup.new_dir(), "mine");
    let mine = folder.append_message("mine").unwrap();
    assert_eq!(Uid::u(3), mine);
    assert_eq!(3, folder.get_message_count().unwrap());
    assert_eq!(
        "mine",
        folder.get_message_name_by_uid(mine).unwrap().render()
    );
    assert_eq!(
        vec![1, 2, 3],
        uids(&folder.get_uid_map(0, None).unwrap())
    );
}

#[test]
fn uids_monotonic_across_deletes() {
    let setup = Setup::new();
    let folder = &setup.folder;
    let mut last = 0u64;

    for i in 0..12 {
        let name = format!("m{}", i);
        setup.deliver(setup.new_dir(), &name);
        let uid = folder.append_message(&name).unwrap();
        assert!(uid.get() > last, "{} then {}", last, uid);
        last = uid.get();

        if 2 == i % 3 {
            folder.delete(uid).unwrap();
            assert_eq!(Some(uid), folder.get_last_uid().unwrap());
        }
    }

    assert_eq!(12, last);
    assert_eq!(8, folder.get_message_count().unwrap());
}

#[test]
fn identity_survives_flag_changes() {
    let setup = Setup::new();
    let folder = &setup.folder;
    for name in &["x", "y", "z"] {
        setup.deliver(setup.new_dir(), name);
    }
    let before = folder.get_uid_map(0, None).unwrap();

    // A client reads y and flags it, without telling us
    let y = before
        .iter()
        .find(|&(_, name)| "y" == name.base_name())
        .map(|(&uid, _)| uid)
        .unwrap();
    let flagged =
        MessageName::parse("y,S=1").with_flags(Flags::SEEN | Flags::FLAGGED);
    assert_eq!("y,S=1:2,FS", flagged.render());
    fs::rename(setup.new_dir().join("y"), setup.cur().join(flagged.render()))
        .unwrap();

    let after = folder.get_uid_map(0, None).unwrap();
    assert_eq!(uids(&before), uids(&after));
    assert_eq!(flagged, after[&y]);
    assert_eq!(Some(1), after[&y].size());
    assert_eq!(Some(Uid::u(3)), folder.get_last_uid().unwrap());
}

#[test]
fn reads_are_idempotent() {
    let setup = Setup::new();
    let folder = &setup.folder;
    setup.deliver(setup.cur(), "a:2,S");
    setup.deliver(setup.new_dir(), "b");

    let first = folder.get_uid_map(0, None).unwrap();
    let list = setup.uid_list();
    let second = folder.get_uid_map(0, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(list, setup.uid_list());
    assert_eq!(Some(Uid::u(2)), folder.get_last_uid().unwrap());
    assert_eq!(2, folder.get_message_count().unwrap());
}

#[test]
fn range_queries() {
    let setup = Setup::new();
    let folder = &setup.folder;
    for i in 0..5 {
        let name = format!("r{}", i);
        setup.deliver(setup.new_dir(), &name);
        folder.append_message(&name).unwrap();
    }

    assert_eq!(vec![2, 3, 4], uids(&folder.get_uid_map(2, Some(4)).unwrap()));
    assert_eq!(vec![4, 5], uids(&folder.get_uid_map(4, None).unwrap()));
    assert!(folder.get_uid_map(6, None).unwrap().is_empty());
    assert!(folder.get_uid_map(4, Some(2)).unwrap().is_empty());
}

#[test]
fn corrupt_uid_list_is_never_touched() {
    let setup = Setup::new();
    let folder = &setup.folder;
    setup.deliver(setup.cur(), "b");
    let corrupt = "1 2 2\ngarbage-no-space\n2 b\n";
    fs::write(folder.path().uid_list_path(), corrupt).unwrap();

    macro_rules! assert_corrupt {
        ($e:expr) => {
            assert_matches!(Err(Error::CorruptIndex { line: 2, .. }), $e)
        };
    }

    assert_corrupt!(folder.get_uid_map(0, None));
    assert_corrupt!(folder.get_uid_map_limited(|_| true, Some(1)));
    assert_corrupt!(folder.get_last_uid());
    assert_corrupt!(folder.get_message_name_by_uid(Uid::u(2)));
    assert_corrupt!(folder.get_recent_messages());
    assert_corrupt!(folder.append_message("b"));
    assert_corrupt!(folder.update(Uid::u(2), "b:2,S"));
    assert_corrupt!(folder.delete(Uid::u(2)));

    assert_eq!(corrupt, setup.uid_list());
    assert!(setup.cur().join("b").is_file());
}

#[test]
fn delete_missing_uid() {
    let setup = Setup::new();
    setup.deliver(setup.cur(), "a");
    assert_matches!(
        Err(Error::NxMessage(_)),
        setup.folder.delete(Uid::u(2))
    );
    assert_matches!(
        Err(Error::NxMessage(_)),
        setup.folder.update(Uid::u(2), "a")
    );
    assert_eq!("1 1 1\n1 a\n", setup.uid_list());
}

#[test]
fn delete_keeps_entry_when_file_cannot_be_removed() {
    let setup = Setup::new();
    let folder = &setup.folder;
    setup.deliver(setup.cur(), "a");
    let uid = folder.append_message("a").unwrap();
    // Make sure the UID list ends up strictly newer than `cur`
    thread::sleep(Duration::from_millis(20));

    // Recorded under a name that no longer exists on disk
    folder.update(uid, "a:2,T").unwrap();
    let before = setup.uid_list();
    assert_matches!(
        Err(Error::IoFailure {
            op: "delete message",
            ..
        }),
        folder.delete(uid)
    );
    assert_eq!(before, setup.uid_list());
    assert!(setup.cur().join("a").is_file());
}

#[test]
fn uid_validity_is_stable_until_reset() {
    let setup = Setup::new();
    let folder = &setup.folder;
    let uv = folder.get_uid_validity().unwrap();
    assert_eq!(uv, folder.get_uid_validity().unwrap());

    folder.set_uid_validity(uv + 1).unwrap();
    assert_eq!(uv + 1, folder.get_uid_validity().unwrap());

    let reopened = MaildirFolder::new(
        folder.root().to_owned(),
        &MaildirConfig::default(),
        Arc::new(ThreadLocker::new()),
    );
    assert_eq!(uv + 1, reopened.get_uid_validity().unwrap());
    // The validity file is not mistaken for a message
    assert!(folder.get_uid_map(0, None).unwrap().is_empty());
}

#[test]
fn concurrent_appends_get_distinct_uids() {
    let setup = Setup::new();
    let folder = &setup.folder;
    folder.get_uid_map(0, None).unwrap();

    let mut assigned = (0..32)
        .into_par_iter()
        .map(|i| {
            let name = format!("concurrent{}", i);
            folder.append_message(&name).unwrap().get()
        })
        .collect::<Vec<_>>();
    assigned.sort_unstable();

    assert_eq!((1..=32).collect::<Vec<u64>>(), assigned);
    assert_eq!(32, folder.get_message_count().unwrap());
    assert_eq!(Some(Uid::u(32)), folder.get_last_uid().unwrap());
}

#[test]
fn file_locking() {
    let config = MaildirConfig {
        locking: LockingMode::File,
        ..MaildirConfig::default()
    };
    let setup = Setup::with_config(&config);
    let folder = &setup.folder;

    setup.deliver(setup.new_dir(), "f");
    assert_eq!(Uid::u(1), folder.append_message("f").unwrap());
    assert!(folder.root().join(&config.lock_file).is_file());
    // The lock file is not mistaken for a message
    assert_eq!(1, folder.get_message_count().unwrap());

    let recent = folder.get_recent_messages().unwrap();
    assert_eq!(vec![1], uids(&recent));
}
