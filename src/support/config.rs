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

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::maildir::lock::{FileLocker, MailboxLocker, ThreadLocker};
use crate::support::error::Error;
use crate::support::file_ops::IoContext;

/// Configuration for how UID state is kept inside each maildir.
///
/// Every field has a default, so an empty TOML file is a valid
/// configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct MaildirConfig {
    /// The name of the UID list file in the root of each maildir.
    pub uid_list_file: String,
    /// The name of the file holding the UID validity.
    pub uid_validity_file: String,
    /// The name of the lock file used when `locking` is `file`.
    pub lock_file: String,
    /// How concurrent access to a maildir is serialised.
    pub locking: LockingMode,
    /// UNIX permissions given to the UID list and UID validity files.
    pub file_mode: u32,
    /// UNIX permissions given to `cur`, `new`, and `tmp` when creating a
    /// maildir.
    pub dir_mode: u32,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LockingMode {
    /// Only serialise threads of this process.
    Thread,
    /// Use an advisory `flock()` on the lock file, which also serialises
    /// against other processes using the same configuration.
    File,
}

impl Default for MaildirConfig {
    fn default() -> Self {
        MaildirConfig {
            uid_list_file: "maildir-uidlist".to_owned(),
            uid_validity_file: "maildir-uidvalidity".to_owned(),
            lock_file: "maildir-uidlist.lock".to_owned(),
            locking: LockingMode::Thread,
            file_mode: 0o600,
            dir_mode: 0o700,
        }
    }
}

impl MaildirConfig {
    /// Load the configuration from the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path).context("read config", path)?;
        Ok(toml::from_slice(&data)?)
    }

    /// Return the locker implied by `locking`.
    ///
    /// Thread locking uses the process-wide lock table so that independently
    /// opened folders still exclude each other.
    pub fn locker(&self) -> Arc<dyn MailboxLocker> {
        match self.locking {
            LockingMode::Thread => ThreadLocker::shared(),
            LockingMode::File => Arc::new(FileLocker::new(
                self.lock_file.clone(),
                self.file_mode,
            )),
        }
    }
}
