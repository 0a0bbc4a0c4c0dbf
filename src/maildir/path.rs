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

//! The file layout of a single maildir.

use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use log::warn;

use crate::support::config::MaildirConfig;
use crate::support::error::Error;
use crate::support::file_ops::{IgnoreKinds, IoContext};

pub const CUR: &str = "cur";
pub const NEW: &str = "new";
pub const TMP: &str = "tmp";

/// A lightweight reference to a maildir by path.
///
/// This does not imply that anything exists on disk.
#[derive(Clone, Debug)]
pub struct MaildirPath {
    root: PathBuf,
    cur_path: PathBuf,
    new_path: PathBuf,
    tmp_path: PathBuf,
    uid_list_path: PathBuf,
    uid_validity_path: PathBuf,
}

impl MaildirPath {
    pub fn new(root: PathBuf, config: &MaildirConfig) -> Self {
        MaildirPath {
            cur_path: root.join(CUR),
            new_path: root.join(NEW),
            tmp_path: root.join(TMP),
            uid_list_path: root.join(&config.uid_list_file),
            uid_validity_path: root.join(&config.uid_validity_file),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory holding messages that have been seen by a client.
    pub fn cur_path(&self) -> &Path {
        &self.cur_path
    }

    /// The directory into which new messages are delivered.
    pub fn new_path(&self) -> &Path {
        &self.new_path
    }

    /// The directory where deliveries are staged.
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    pub fn uid_list_path(&self) -> &Path {
        &self.uid_list_path
    }

    pub fn uid_validity_path(&self) -> &Path {
        &self.uid_validity_path
    }

    /// Whether the root and all three subdirectories exist.
    pub fn exists(&self) -> bool {
        self.root.is_dir()
            && self.cur_path.is_dir()
            && self.new_path.is_dir()
            && self.tmp_path.is_dir()
    }

    /// Create the root and the subdirectories, where they do not yet exist.
    pub fn create(&self, mode: u32) -> Result<(), Error> {
        let mut builder = fs::DirBuilder::new();
        builder.mode(mode).recursive(true);
        for dir in &[&self.root, &self.cur_path, &self.new_path, &self.tmp_path]
        {
            builder
                .create(dir)
                .ignore_already_exists()
                .context("create directory", dir)?;
        }
        Ok(())
    }

    /// List the names of all messages in `cur` and then `new`.
    ///
    /// The order within each directory is whatever the file system returns.
    /// Hidden files are skipped, as are names that are not valid UTF-8.
    pub fn list_messages(&self) -> Result<Vec<String>, Error> {
        let mut names = self.list_dir(&self.cur_path)?;
        names.extend(self.list_dir(&self.new_path)?);
        Ok(names)
    }

    /// List the names of the messages in `new` only.
    pub fn list_new_messages(&self) -> Result<Vec<String>, Error> {
        self.list_dir(&self.new_path)
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<String>, Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).context("list", dir)? {
            let entry = entry.context("list", dir)?;
            match entry.file_name().into_string() {
                Ok(name) if name.starts_with('.') => (),
                Ok(name) => names.push(name),
                Err(name) => warn!(
                    "{} Ignoring non-UTF-8 message file {:?}",
                    self.root.display(),
                    name
                ),
            }
        }
        Ok(names)
    }

    /// Find the file currently holding the message named `name`, looking in
    /// `cur` first.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        [&self.cur_path, &self.new_path]
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }
}
