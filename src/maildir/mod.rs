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

//! UID tracking for maildirs.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/
//!   cur/                       messages a client has seen
//!   new/                       freshly delivered messages
//!   tmp/                       deliveries in progress, never looked at
//!   maildir-uidlist            UID list, see `uid_list`
//!   maildir-uidvalidity        UID validity as a decimal integer
//!   maildir-uidlist.lock       only with file locking
//! ```
//!
//! The file names are configurable through `MaildirConfig`.
//!
//! The UID list and UID validity files are only ever replaced whole, by
//! writing a hidden temporary file in the root and renaming it over the old
//! one, and only while holding the maildir lock. Message files are owned by
//! whatever delivers and reads mail; they come and go at any time, which is
//! handled by `reconcile`.

pub mod folder;
pub mod lock;
pub mod message_name;
pub mod path;
pub mod reconcile;
pub mod uid_list;
pub mod uid_validity;

#[cfg(test)]
mod integration_tests;
