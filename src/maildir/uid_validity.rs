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

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::info;

use crate::support::error::Error;
use crate::support::file_ops::{self, IoContext};

/// The persisted UID validity of one maildir.
///
/// The file holds a single decimal integer. It is created lazily the first
/// time the value is asked for. The value is cached after the first read, so
/// changes made by other processes after that point are not seen.
///
/// The caller must hold the maildir lock for every call.
pub struct UidValidityStore {
    path: PathBuf,
    stage: PathBuf,
    mode: u32,
    cached: Mutex<Option<u64>>,
}

impl UidValidityStore {
    /// `stage` is where new contents are staged before atomically replacing
    /// `path`; it must be on the same file system.
    pub fn new(path: PathBuf, stage: PathBuf, mode: u32) -> Self {
        UidValidityStore {
            path,
            stage,
            mode,
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the UID validity, generating and saving a new one if the
    /// maildir does not have one yet.
    pub fn get(&self) -> Result<u64, Error> {
        let mut cached = self.cached.lock().unwrap();
        if let Some(uid_validity) = *cached {
            return Ok(uid_validity);
        }

        let uid_validity = match file_ops::slurp(&self.path)
            .context("read UID validity", &self.path)?
        {
            Some(data) => data.trim().parse::<u64>().map_err(|e| {
                Error::IoFailure {
                    op: "parse UID validity",
                    path: self.path.clone(),
                    source: io::Error::new(io::ErrorKind::InvalidData, e),
                }
            })?,
            None => {
                let generated = chrono::Utc::now().timestamp_millis() as u64;
                self.save(generated)?;
                info!(
                    "{} Generated UID validity {}",
                    self.path.display(),
                    generated
                );
                generated
            }
        };

        *cached = Some(uid_validity);
        Ok(uid_validity)
    }

    /// Replace the UID validity with `uid_validity`.
    pub fn set(&self, uid_validity: u64) -> Result<(), Error> {
        let mut cached = self.cached.lock().unwrap();
        self.save(uid_validity)?;
        *cached = Some(uid_validity);
        info!("{} Set UID validity {}", self.path.display(), uid_validity);
        Ok(())
    }

    fn save(&self, uid_validity: u64) -> Result<(), Error> {
        file_ops::spit(
            &self.stage,
            &self.path,
            true,
            self.mode,
            uid_validity.to_string().as_bytes(),
        )
        .context("write UID validity", &self.path)
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn store(root: &Path) -> UidValidityStore {
        UidValidityStore::new(root.join("uidvalidity"), root.to_owned(), 0o600)
    }

    #[test]
    fn generated_lazily_and_persisted() {
        let root = TempDir::new().unwrap();
        let store = store(root.path());
        assert!(!store.path().exists());

        let uv = store.get().unwrap();
        assert!(uv > 0);
        assert_eq!(uv.to_string(), fs::read_to_string(store.path()).unwrap());
        assert_eq!(uv, store.get().unwrap());

        // A fresh instance reads the same value back
        assert_eq!(uv, self::store(root.path()).get().unwrap());
    }

    #[test]
    fn set_overrides() {
        let root = TempDir::new().unwrap();
        let store = store(root.path());
        store.get().unwrap();
        store.set(42).unwrap();
        assert_eq!(42, store.get().unwrap());
        assert_eq!(42, self::store(root.path()).get().unwrap());
    }

    #[test]
    fn surrounding_whitespace_accepted() {
        let root = TempDir::new().unwrap();
        let store = store(root.path());
        fs::write(store.path(), " 1234567\n").unwrap();
        assert_eq!(1234567, store.get().unwrap());
    }

    #[test]
    fn garbage_is_an_io_failure() {
        let root = TempDir::new().unwrap();
        let store = store(root.path());
        fs::write(store.path(), "soon").unwrap();
        assert_matches!(
            Err(Error::IoFailure {
                op: "parse UID validity",
                ..
            }),
            store.get()
        );
        // Not replaced by a generated value
        assert_eq!("soon", fs::read_to_string(store.path()).unwrap());
    }
}
