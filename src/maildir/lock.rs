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

//! Mutual exclusion keyed by maildir path.
//!
//! Every operation on the UID list and UID validity files happens while
//! holding the lock for the maildir. Locks are not reentrant; a thread that
//! tries to lock a maildir it already holds will deadlock.

use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use lazy_static::lazy_static;
use log::debug;
use nix::fcntl::{flock, FlockArg};

use crate::support::error::Error;
use crate::support::file_ops::IoContext;

/// Scoped, exclusive access to one maildir.
///
/// Implementations must block until the lock is available and must release
/// it when the returned guard is dropped, however the holder exits.
pub trait MailboxLocker: Send + Sync {
    fn lock(&self, mailbox: &Path) -> Result<MailboxLockGuard, Error>;
}

/// Proof that a maildir is locked. Dropping it releases the lock.
#[must_use]
pub struct MailboxLockGuard {
    _held: Box<dyn Send>,
}

impl MailboxLockGuard {
    /// Wrap a value whose `Drop` releases the lock.
    pub fn new(held: impl Send + 'static) -> Self {
        MailboxLockGuard {
            _held: Box::new(held),
        }
    }
}

/// Serialises the threads of this process through a table of held paths.
///
/// Paths are compared as given; callers must refer to the same maildir by the
/// same path.
#[derive(Default)]
pub struct ThreadLocker {
    table: Arc<LockTable>,
}

#[derive(Default)]
struct LockTable {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

struct ThreadLockHeld {
    table: Arc<LockTable>,
    path: PathBuf,
}

lazy_static! {
    static ref SHARED_THREAD_LOCKER: Arc<ThreadLocker> =
        Arc::new(ThreadLocker::new());
}

impl ThreadLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance.
    pub fn shared() -> Arc<ThreadLocker> {
        Arc::clone(&SHARED_THREAD_LOCKER)
    }
}

impl MailboxLocker for ThreadLocker {
    fn lock(&self, mailbox: &Path) -> Result<MailboxLockGuard, Error> {
        let mut held = self.table.held.lock().unwrap();
        while held.contains(mailbox) {
            held = self.table.released.wait(held).unwrap();
        }
        held.insert(mailbox.to_owned());
        debug!("{} Locked", mailbox.display());

        Ok(MailboxLockGuard::new(ThreadLockHeld {
            table: Arc::clone(&self.table),
            path: mailbox.to_owned(),
        }))
    }
}

impl Drop for ThreadLockHeld {
    fn drop(&mut self) {
        // Don't make a poisoned table worse by panicking during unwinding
        if let Ok(mut held) = self.table.held.lock() {
            held.remove(&self.path);
        }
        self.table.released.notify_all();
        debug!("{} Unlocked", self.path.display());
    }
}

/// Serialises through an advisory `flock()` on a file inside the maildir.
///
/// Every acquisition opens the lock file anew, so this excludes other threads
/// of this process as well as other processes.
pub struct FileLocker {
    file_name: String,
    mode: u32,
}

struct FileLockHeld {
    file: fs::File,
    path: PathBuf,
}

impl FileLocker {
    /// `file_name` is the name of the lock file relative to each maildir
    /// root; it is created with `mode` if it does not exist.
    pub fn new(file_name: String, mode: u32) -> Self {
        FileLocker { file_name, mode }
    }
}

impl MailboxLocker for FileLocker {
    fn lock(&self, mailbox: &Path) -> Result<MailboxLockGuard, Error> {
        let path = mailbox.join(&self.file_name);
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .mode(self.mode)
            .open(&path)
            .context("open lock file", &path)?;
        flock(file.as_raw_fd(), FlockArg::LockExclusive)?;
        debug!("{} Locked", path.display());

        Ok(MailboxLockGuard::new(FileLockHeld { file, path }))
    }
}

impl Drop for FileLockHeld {
    fn drop(&mut self) {
        // Closing the file releases the lock too, but be explicit
        let _ = flock(self.file.as_raw_fd(), FlockArg::Unlock);
        debug!("{} Unlocked", self.path.display());
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
    use std::thread;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn check_exclusion(locker: Arc<dyn MailboxLocker>, root: &Path) {
        crate::init_test_log();

        let inside = Arc::new(AtomicUsize::new(0));
        let entries = Arc::new(AtomicUsize::new(0));
        let threads = (0..4)
            .map(|_| {
                let locker = Arc::clone(&locker);
                let inside = Arc::clone(&inside);
                let entries = Arc::clone(&entries);
                let root = root.to_owned();
                thread::spawn(move || {
                    for _ in 0..10 {
                        let _lock = locker.lock(&root).unwrap();
                        assert_eq!(0, inside.fetch_add(1, SeqCst));
                        entries.fetch_add(1, SeqCst);
                        thread::sleep(Duration::from_millis(1));
                        assert_eq!(1, inside.fetch_sub(1, SeqCst));
                    }
                })
            })
            .collect::<Vec<_>>();

        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(40, entries.load(SeqCst));
    }

    #[test]
    fn thread_locker_excludes() {
        let root = TempDir::new().unwrap();
        check_exclusion(Arc::new(ThreadLocker::new()), root.path());
    }

    #[test]
    fn file_locker_excludes() {
        let root = TempDir::new().unwrap();
        check_exclusion(
            Arc::new(FileLocker::new("lock".to_owned(), 0o600)),
            root.path(),
        );
        assert!(root.path().join("lock").is_file());
    }

    #[test]
    fn distinct_mailboxes_do_not_contend() {
        let locker = ThreadLocker::new();
        let a = locker.lock(Path::new("/mail/a")).unwrap();
        let b = locker.lock(Path::new("/mail/b")).unwrap();
        drop(a);
        drop(b);
        // Released on drop, so this does not block
        let _a = locker.lock(Path::new("/mail/a")).unwrap();
    }

    #[test]
    fn lock_released_on_panic() {
        let locker = Arc::new(ThreadLocker::new());
        let locker2 = Arc::clone(&locker);
        let result = thread::spawn(move || {
            let _lock = locker2.lock(Path::new("/mail/a")).unwrap();
            panic!("operation failed");
        })
        .join();
        assert!(result.is_err());

        let _lock = locker.lock(Path::new("/mail/a")).unwrap();
    }

    #[test]
    fn file_lock_fails_without_maildir() {
        let root = TempDir::new().unwrap();
        let locker = FileLocker::new("lock".to_owned(), 0o600);
        assert_matches!(
            Err(Error::IoFailure { .. }),
            locker.lock(&root.path().join("nx")).map(|_| ())
        );
    }
}
