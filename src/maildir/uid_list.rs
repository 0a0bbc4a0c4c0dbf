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

//! The in-memory form of the UID list file.
//!
//! # Format
//!
//! The file is line-oriented. The first line is the header:
//!
//! ```text
//! <version> <last uid> <message count>
//! ```
//!
//! The version is always 1. The last UID is the greatest UID ever assigned in
//! the current UID validity, which can be greater than any UID listed if the
//! newest messages have since been removed. It is 0 if no UID has ever been
//! assigned.
//!
//! Every further non-empty line is an entry `<uid> <file name>`, split at the
//! first space. Entries are written in ascending UID order.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU64;
use std::path::Path;

use log::warn;

use crate::maildir::message_name::MessageName;
use crate::support::error::Error;

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs start at 1 and increase monotonically as messages are added to the
/// mailbox. UIDs are never reused within the same UID validity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU64);

impl Uid {
    pub fn of(uid: u64) -> Option<Self> {
        NonZeroU64::new(uid).map(Uid)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// The UID following this one, if there is one.
    pub fn next(self) -> Option<Self> {
        self.get().checked_add(1).and_then(Uid::of)
    }

    #[cfg(test)]
    pub fn u(uid: u64) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const FORMAT_VERSION: u32 = 1;

/// The UID-to-message-name mapping of one mailbox plus its allocation state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UidList {
    last_uid: Option<Uid>,
    entries: BTreeMap<Uid, MessageName>,
}

impl UidList {
    /// Create a list with no entries which has never assigned a UID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the contents of a UID list file.
    ///
    /// `path` is only used for error reporting.
    pub fn parse(path: &Path, data: &str) -> Result<Self, Error> {
        let corrupt = |line: usize, reason: String| Error::CorruptIndex {
            path: path.to_owned(),
            line,
            reason,
        };

        let mut lines = data.lines().enumerate().map(|(ix, l)| (ix + 1, l));
        let header = match lines.next() {
            Some((_, header)) => header,
            None => return Err(corrupt(1, "missing header".to_owned())),
        };

        let mut fields = header.split(' ');
        let (version, last_uid, count) =
            match (fields.next(), fields.next(), fields.next(), fields.next())
            {
                (Some(v), Some(l), Some(c), None) => (v, l, c),
                _ => {
                    return Err(corrupt(
                        1,
                        format!("malformed header {:?}", header),
                    ))
                }
            };

        match version.parse::<u32>() {
            Ok(FORMAT_VERSION) => (),
            Ok(v) => {
                return Err(corrupt(1, format!("unsupported version {}", v)))
            }
            Err(_) => {
                return Err(corrupt(1, format!("bad version {:?}", version)))
            }
        }
        let last_uid = last_uid
            .parse::<u64>()
            .map_err(|_| corrupt(1, format!("bad last UID {:?}", last_uid)))?;
        let count = count
            .parse::<usize>()
            .map_err(|_| corrupt(1, format!("bad message count {:?}", count)))?;

        let mut list = UidList {
            last_uid: Uid::of(last_uid),
            entries: BTreeMap::new(),
        };

        for (line, text) in lines {
            if text.is_empty() {
                continue;
            }

            let gap = text
                .find(' ')
                .ok_or_else(|| corrupt(line, "missing separator".to_owned()))?;
            let uid = text[..gap]
                .parse::<u64>()
                .ok()
                .and_then(Uid::of)
                .ok_or_else(|| {
                    corrupt(line, format!("bad UID {:?}", &text[..gap]))
                })?;

            if list.last_uid.map_or(true, |last| uid > last) {
                return Err(corrupt(
                    line,
                    format!("UID {} is beyond last UID {}", uid, last_uid),
                ));
            }

            if list
                .entries
                .insert(uid, MessageName::parse(&text[gap + 1..]))
                .is_some()
            {
                return Err(corrupt(line, format!("duplicate UID {}", uid)));
            }
        }

        if count != list.entries.len() {
            warn!(
                "{} header claims {} messages but {} are listed",
                path.display(),
                count,
                list.entries.len()
            );
        }

        Ok(list)
    }

    /// Produce the file representation of this list.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{} {} {}\n",
            FORMAT_VERSION,
            self.last_uid.map_or(0, Uid::get),
            self.entries.len()
        );
        for (uid, name) in &self.entries {
            out.push_str(&format!("{} {}\n", uid, name));
        }
        out
    }

    /// The greatest UID ever assigned, if any.
    pub fn last_uid(&self) -> Option<Uid> {
        self.last_uid
    }

    pub fn message_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, uid: Uid) -> Option<&MessageName> {
        self.entries.get(&uid)
    }

    /// Iterate over all entries in ascending UID order.
    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = (Uid, &MessageName)> + '_ {
        self.entries.iter().map(|(&uid, name)| (uid, name))
    }

    /// Iterate over the entries with `from <= uid` and, if `to` is given,
    /// `uid <= to`, in ascending UID order.
    pub fn range(
        &self,
        from: u64,
        to: Option<u64>,
    ) -> impl Iterator<Item = (Uid, &MessageName)> + '_ {
        self.iter()
            .skip_while(move |&(uid, _)| uid.get() < from)
            .take_while(move |&(uid, _)| to.map_or(true, |to| uid.get() <= to))
    }

    /// Find the UID of the message whose base name is `base`.
    pub fn uid_for_base_name(&self, base: &str) -> Option<Uid> {
        self.iter()
            .find(|&(_, name)| name.base_name() == base)
            .map(|(uid, _)| uid)
    }

    /// Create a list with no entries that continues allocating after this
    /// list's last UID.
    pub fn successor(&self) -> Self {
        UidList {
            last_uid: self.last_uid,
            entries: BTreeMap::new(),
        }
    }

    /// Assign the next UID to `name`.
    pub fn allocate(&mut self, name: MessageName) -> Result<Uid, Error> {
        let uid = match self.last_uid {
            None => Uid::of(1).ok_or(Error::MailboxFull)?,
            Some(last) => last.next().ok_or(Error::MailboxFull)?,
        };
        self.last_uid = Some(uid);
        self.entries.insert(uid, name);
        Ok(uid)
    }

    /// Record `name` under a UID that was assigned earlier.
    ///
    /// The last UID is raised if `uid` is beyond it, so the list can never
    /// hand out `uid` again.
    pub fn restore(&mut self, uid: Uid, name: MessageName) {
        if self.last_uid.map_or(true, |last| uid > last) {
            self.last_uid = Some(uid);
        }
        self.entries.insert(uid, name);
    }

    /// Replace the name associated with `uid`.
    pub fn rename(&mut self, uid: Uid, name: MessageName) -> Result<(), Error> {
        match self.entries.get_mut(&uid) {
            Some(existing) => {
                *existing = name;
                Ok(())
            }
            None => Err(Error::NxMessage(uid)),
        }
    }

    /// Remove the entry for `uid`.
    ///
    /// The last UID is unaffected.
    pub fn remove(&mut self, uid: Uid) -> Result<MessageName, Error> {
        self.entries.remove(&uid).ok_or(Error::NxMessage(uid))
    }
}
