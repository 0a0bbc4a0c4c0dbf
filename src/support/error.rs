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
use std::path::PathBuf;

use thiserror::Error;

use crate::maildir::uid_list::Uid;

#[derive(Error, Debug)]
pub enum Error {
    /// A line of the UID list does not follow the format.
    ///
    /// `line` is 1-based and counts the header.
    #[error("Corrupt entry in UID list {} line {line}: {reason}", .path.display())]
    CorruptIndex {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("Unable to {op} {}: {source}", .path.display())]
    IoFailure {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("No message with UID {0}")]
    NxMessage(Uid),
    #[error("No message file named {0} to assign a UID to")]
    UnallocatableMessage(String),
    #[error("Mailbox is full")]
    MailboxFull,
    #[error("Unsafe message name")]
    UnsafeName,
    #[error("Unable to determine modification time under {}", .0.display())]
    UnknownModification(PathBuf),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}
