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

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::maildir::lock::{MailboxLockGuard, MailboxLocker};
use crate::maildir::message_name::MessageName;
use crate::maildir::path::MaildirPath;
use crate::maildir::reconcile::{Provenance, Reconciler};
use crate::maildir::uid_list::{Uid, UidList};
use crate::maildir::uid_validity::UidValidityStore;
use crate::support::config::MaildirConfig;
use crate::support::error::Error;
use crate::support::file_ops::{self, IoContext};
use crate::support::safe_name::is_safe_message_name;

/// UID bookkeeping for one maildir.
///
/// Every public method takes the maildir lock for its whole duration, so
/// methods must not be called while the same thread already holds the lock
/// through another `MaildirFolder` on the same path.
///
/// Message files themselves are written by someone else; this only tracks
/// which UID each file has. The usual way to add a message is to move it
/// into `new` and then call `append_message` with its name.
pub struct MaildirFolder {
    log_prefix: String,
    path: MaildirPath,
    validity: UidValidityStore,
    locker: Arc<dyn MailboxLocker>,
    file_mode: u32,
    dir_mode: u32,
}

impl MaildirFolder {
    /// Set up access to the maildir at `root`, serialising through `locker`.
    ///
    /// Nothing is touched on disk.
    pub fn new(
        root: PathBuf,
        config: &MaildirConfig,
        locker: Arc<dyn MailboxLocker>,
    ) -> Self {
        let path = MaildirPath::new(root, config);
        let validity = UidValidityStore::new(
            path.uid_validity_path().to_owned(),
            path.root().to_owned(),
            config.file_mode,
        );

        MaildirFolder {
            log_prefix: path.root().display().to_string(),
            path,
            validity,
            locker,
            file_mode: config.file_mode,
            dir_mode: config.dir_mode,
        }
    }

    /// Like `new`, but with the locker `config` calls for.
    pub fn open(root: PathBuf, config: &MaildirConfig) -> Self {
        Self::new(root, config, config.locker())
    }

    pub fn path(&self) -> &MaildirPath {
        &self.path
    }

    pub fn root(&self) -> &Path {
        self.path.root()
    }

    /// Whether the maildir directory structure is present.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create the maildir directory structure if it does not exist.
    pub fn create(&self) -> Result<(), Error> {
        if self.path.exists() {
            return Ok(());
        }

        self.path.create(self.dir_mode)?;
        info!("{} Created maildir", self.log_prefix);
        Ok(())
    }

    pub fn get_uid_validity(&self) -> Result<u64, Error> {
        let _lock = self.lock()?;
        self.validity.get()
    }

    /// Replace the UID validity.
    ///
    /// This does not touch the UID list. Clients holding UIDs will discard
    /// them upon seeing the new value.
    pub fn set_uid_validity(&self, uid_validity: u64) -> Result<(), Error> {
        let _lock = self.lock()?;
        self.validity.set(uid_validity)
    }

    /// The greatest UID ever assigned in this maildir, if any.
    pub fn get_last_uid(&self) -> Result<Option<Uid>, Error> {
        let _lock = self.lock()?;
        Ok(self.load()?.0.last_uid())
    }

    /// The number of messages that currently have a UID.
    pub fn get_message_count(&self) -> Result<usize, Error> {
        let _lock = self.lock()?;
        Ok(self.load()?.0.message_count())
    }

    /// A value which increases whenever a message is added, removed, or has
    /// its flags changed.
    ///
    /// This is the later modification time of `cur` and `new`, in
    /// milliseconds since the epoch.
    pub fn get_highest_mod_seq(&self) -> Result<u64, Error> {
        let _lock = self.lock()?;
        file_ops::modified(self.path.cur_path())
            .into_iter()
            .chain(file_ops::modified(self.path.new_path()))
            .max()
            .map(file_ops::epoch_millis)
            .ok_or_else(|| {
                Error::UnknownModification(self.path.root().to_owned())
            })
    }

    /// Look up the current name of the message with the given UID.
    pub fn get_message_name_by_uid(
        &self,
        uid: Uid,
    ) -> Result<MessageName, Error> {
        let _lock = self.lock()?;
        let (list, _) = self.load()?;
        list.get(uid).cloned().ok_or(Error::NxMessage(uid))
    }

    /// Return every message with `from <= uid` and, if `to` is given,
    /// `uid <= to`.
    pub fn get_uid_map(
        &self,
        from: u64,
        to: Option<u64>,
    ) -> Result<BTreeMap<Uid, MessageName>, Error> {
        self.get_uid_map_filtered(|_| true, from, to)
    }

    /// Like `get_uid_map`, but only including messages whose rendered file
    /// name satisfies `filter`.
    pub fn get_uid_map_filtered(
        &self,
        filter: impl Fn(&str) -> bool,
        from: u64,
        to: Option<u64>,
    ) -> Result<BTreeMap<Uid, MessageName>, Error> {
        let _lock = self.lock()?;
        let (list, _) = self.load()?;
        Ok(list
            .range(from, to)
            .filter(|&(_, name)| filter(&name.render()))
            .map(|(uid, name)| (uid, name.clone()))
            .collect())
    }

    /// Return the lowest-UID messages whose rendered file name satisfies
    /// `filter`, at most `limit` of them if given.
    ///
    /// A limit of 0 means no limit.
    pub fn get_uid_map_limited(
        &self,
        filter: impl Fn(&str) -> bool,
        limit: Option<usize>,
    ) -> Result<BTreeMap<Uid, MessageName>, Error> {
        let _lock = self.lock()?;
        let (list, _) = self.load()?;
        Ok(list
            .iter()
            .filter(|&(_, name)| filter(&name.render()))
            .take(limit.filter(|&n| n > 0).unwrap_or(usize::MAX))
            .map(|(uid, name)| (uid, name.clone()))
            .collect())
    }

    /// Return the messages currently in `new`.
    ///
    /// The UID list is scanned from the highest UID down, and the scan stops
    /// once as many messages have been found as there are files in `new`.
    /// Messages in `new` are normally the most recently added ones, so this
    /// rarely looks at more than the tail of the list.
    pub fn get_recent_messages(
        &self,
    ) -> Result<BTreeMap<Uid, MessageName>, Error> {
        let _lock = self.lock()?;
        let (list, _) = self.load()?;
        let in_new = self
            .path
            .list_new_messages()?
            .into_iter()
            .collect::<HashSet<_>>();

        let mut recent = BTreeMap::new();
        for (uid, name) in list.iter().rev() {
            if recent.len() >= in_new.len() {
                break;
            }

            if in_new.contains(&name.render()) {
                recent.insert(uid, name.clone());
            }
        }

        Ok(recent)
    }

    /// Assign the next UID to the message named `name`, normally a file
    /// just moved into `cur` or `new`.
    ///
    /// Every call allocates a new UID. If the list already has entries with
    /// the base name of `name`, they are replaced, so the message moves to
    /// the new UID.
    ///
    /// If there was no UID list yet, one is built from the directory
    /// contents instead, and the UID given to the file with the base name of
    /// `name` is returned; the call fails if there is no such file.
    pub fn append_message(&self, name: &str) -> Result<Uid, Error> {
        if !is_safe_message_name(name) {
            return Err(Error::UnsafeName);
        }

        let name = MessageName::parse(name);
        let _lock = self.lock()?;
        let (mut list, provenance) =
            self.reconciler().load_pending(Some(name.base_name()))?;

        if Provenance::Built == provenance {
            return list
                .uid_for_base_name(name.base_name())
                .ok_or_else(|| Error::UnallocatableMessage(name.render()));
        }

        while let Some(superseded) = list.uid_for_base_name(name.base_name()) {
            list.remove(superseded)?;
        }
        let uid = list.allocate(name)?;
        self.reconciler().save(&list)?;
        info!("{} Appended message {}", self.log_prefix, uid);
        Ok(uid)
    }

    /// Record that the message with the given UID is now called `name`.
    ///
    /// The caller is responsible for actually renaming the file.
    pub fn update(&self, uid: Uid, name: &str) -> Result<(), Error> {
        if !is_safe_message_name(name) {
            return Err(Error::UnsafeName);
        }

        let _lock = self.lock()?;
        let (mut list, _) = self.load()?;
        list.rename(uid, MessageName::parse(name))?;
        self.reconciler().save(&list)
    }

    /// Delete the message with the given UID from disk and forget its UID.
    ///
    /// If the file cannot be deleted, the UID list is left unchanged.
    pub fn delete(&self, uid: Uid) -> Result<MessageName, Error> {
        let _lock = self.lock()?;
        let (mut list, _) = self.load()?;
        let name = list.get(uid).cloned().ok_or(Error::NxMessage(uid))?;
        let rendered = name.render();

        let file = match self.path.locate(&rendered) {
            Some(file) => file,
            None => {
                return Err(Error::IoFailure {
                    op: "delete message",
                    path: self.path.cur_path().join(&rendered),
                    source: io::Error::new(
                        io::ErrorKind::NotFound,
                        "message file is in neither cur nor new",
                    ),
                })
            }
        };
        fs::remove_file(&file).context("delete message", &file)?;

        list.remove(uid)?;
        self.reconciler().save(&list)?;
        info!("{} Deleted message {} ({})", self.log_prefix, uid, rendered);
        Ok(name)
    }

    fn lock(&self) -> Result<MailboxLockGuard, Error> {
        self.locker.lock(self.path.root())
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.log_prefix, &self.path, self.file_mode)
    }

    fn load(&self) -> Result<(UidList, Provenance), Error> {
        self.reconciler().load()
    }
}
