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

//! Bringing the UID list in line with the directory contents.
//!
//! Other processes add and remove message files without telling us, so the
//! UID list can only be trusted while it is newer than both message
//! directories. Adding or removing a file updates the modification time of
//! its directory; renaming a file to change its flags does too.
//!
//! A UID list whose modification time is equal to that of either directory
//! is considered stale, since the file system timestamp resolution may be
//! too coarse to tell which happened first.
//!
//! A stale UID list is reconciled by walking the directory listing: each
//! file whose base name is in the old list keeps its UID (with its current
//! name, whose metadata may have changed), every other file gets a new UID,
//! and entries whose file is gone are dropped. If there is no UID list at
//! all, every file gets a new UID in listing order.
//!
//! Everything here must be called with the maildir lock held.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::time::SystemTime;

use log::{debug, info, warn};

use crate::maildir::message_name::MessageName;
use crate::maildir::path::MaildirPath;
use crate::maildir::uid_list::{Uid, UidList};
use crate::support::error::Error;
use crate::support::file_ops::{self, IoContext};

/// How a loaded UID list came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// There was no UID list, so one was built from the directory listing.
    Built,
    /// The UID list was stale and has been merged with the directory
    /// listing.
    Reconciled,
    /// The UID list was up to date and used as-is.
    Loaded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Freshness {
    Absent,
    Stale,
    Fresh,
}

pub struct Reconciler<'a> {
    log_prefix: &'a str,
    path: &'a MaildirPath,
    mode: u32,
}

impl<'a> Reconciler<'a> {
    /// `mode` is the permissions given to the UID list when it is written.
    pub fn new(log_prefix: &'a str, path: &'a MaildirPath, mode: u32) -> Self {
        Reconciler {
            log_prefix,
            path,
            mode,
        }
    }

    /// Return an up-to-date UID list, building or reconciling and then saving
    /// it if necessary.
    pub fn load(&self) -> Result<(UidList, Provenance), Error> {
        self.load_pending(None)
    }

    /// Like `load`, but when reconciling, files with the base name `pending`
    /// that do not have a UID yet are left out, so that the caller can assign
    /// one itself. A fresh build still includes them.
    pub fn load_pending(
        &self,
        pending: Option<&str>,
    ) -> Result<(UidList, Provenance), Error> {
        match self.freshness()? {
            Freshness::Absent => Ok((self.build()?, Provenance::Built)),
            Freshness::Fresh => match self.read()? {
                Some(list) => {
                    debug!("{} UID list is up to date", self.log_prefix);
                    Ok((list, Provenance::Loaded))
                }
                // Deleted since we looked at it
                None => Ok((self.build()?, Provenance::Built)),
            },
            Freshness::Stale => match self.read() {
                Ok(Some(old)) => Ok((
                    self.reconcile(old, pending)?,
                    Provenance::Reconciled,
                )),
                Ok(None) => Ok((self.build()?, Provenance::Built)),
                Err(Error::IoFailure { source, .. }) => {
                    warn!(
                        "{} Failed to read stale UID list, rebuilding: {}",
                        self.log_prefix, source
                    );
                    Ok((self.build()?, Provenance::Built))
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Write `list` out as the new UID list.
    pub fn save(&self, list: &UidList) -> Result<(), Error> {
        let path = self.path.uid_list_path();
        file_ops::spit(
            self.path.root(),
            path,
            true,
            self.mode,
            list.render().as_bytes(),
        )
        .context("write UID list", path)
    }

    fn freshness(&self) -> Result<Freshness, Error> {
        let path = self.path.uid_list_path();
        let list_modified = match fs::metadata(path) {
            Ok(md) => md.modified().context("stat UID list", path)?,
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                return Ok(Freshness::Absent)
            }
            Err(e) => return Err(e).context("stat UID list", path),
        };

        let cur_modified = file_ops::modified(self.path.cur_path());
        let new_modified = file_ops::modified(self.path.new_path());
        if cur_modified.is_none() && new_modified.is_none() {
            return Err(Error::UnknownModification(self.path.root().to_owned()));
        }

        let newer =
            |dir: Option<SystemTime>| dir.map_or(false, |t| t >= list_modified);
        if newer(cur_modified) || newer(new_modified) {
            Ok(Freshness::Stale)
        } else {
            Ok(Freshness::Fresh)
        }
    }

    fn read(&self) -> Result<Option<UidList>, Error> {
        let path = self.path.uid_list_path();
        match file_ops::slurp(path).context("read UID list", path)? {
            Some(data) => UidList::parse(path, &data).map(Some),
            None => Ok(None),
        }
    }

    fn build(&self) -> Result<UidList, Error> {
        let mut list = UidList::new();
        for name in self.path.list_messages()? {
            list.allocate(MessageName::parse(&name))?;
        }
        self.save(&list)?;

        info!(
            "{} Built new UID list with {} messages",
            self.log_prefix,
            list.message_count()
        );
        Ok(list)
    }

    fn reconcile(
        &self,
        old: UidList,
        pending: Option<&str>,
    ) -> Result<UidList, Error> {
        // Base name -> UIDs with that base name, descending so that pop()
        // yields the lowest
        let mut reusable = HashMap::<&str, Vec<Uid>>::new();
        for (uid, name) in old.iter().rev() {
            reusable.entry(name.base_name()).or_default().push(uid);
        }

        let mut list = old.successor();
        let mut kept = 0usize;
        let mut added = 0usize;
        for name in self.path.list_messages()? {
            let name = MessageName::parse(&name);
            match reusable.get_mut(name.base_name()).and_then(Vec::pop) {
                Some(uid) => {
                    list.restore(uid, name);
                    kept += 1;
                }
                None if pending == Some(name.base_name()) => (),
                None => {
                    list.allocate(name)?;
                    added += 1;
                }
            }
        }
        self.save(&list)?;

        info!(
            "{} Reconciled UID list: {} kept, {} new, {} gone",
            self.log_prefix,
            kept,
            added,
            old.message_count() - kept
        );
        Ok(list)
    }
}
