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

//! The subset of `sysexits.h` used by the command line.

use crate::support::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_OSERR: Sysexit = Sysexit(71);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }

    /// The exit code that best describes `error`.
    pub fn for_error(error: &Error) -> Self {
        match *error {
            Error::CorruptIndex { .. } => EX_DATAERR,
            Error::IoFailure { .. } => EX_IOERR,
            Error::NxMessage(_) | Error::UnallocatableMessage(_) => EX_NOINPUT,
            Error::UnsafeName => EX_USAGE,
            Error::MailboxFull => EX_SOFTWARE,
            Error::UnknownModification(_) => EX_IOERR,
            Error::Nix(_) => EX_OSERR,
            Error::Config(_) => EX_CONFIG,
        }
    }
}
