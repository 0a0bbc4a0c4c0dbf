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

//! Decomposition of maildir message file names.
//!
//! A message file is named `<base>[,S=<size>][:2,<flags>]`. The base is the
//! unique token chosen by whoever delivered the message and never changes.
//! The metadata suffixes change over the message's life, mostly because a
//! client sets flags and the file gets renamed accordingly.

use std::fmt;

use bitflags::bitflags;

const SIZE_MARKER: &str = ",S=";
const FLAGS_MARKER: &str = ":2,";

/// A message file name split into its parts.
///
/// Parsing never fails; a name without recognisable metadata is all base.
/// Rendering always reproduces the exact string that was parsed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MessageName {
    base: String,
    size: Option<String>,
    flags: Option<String>,
}

bitflags! {
    /// The flags defined by the maildir convention, one letter each.
    pub struct Flags: u8 {
        const DRAFT = 1 << 0;
        const FLAGGED = 1 << 1;
        const PASSED = 1 << 2;
        const REPLIED = 1 << 3;
        const SEEN = 1 << 4;
        const TRASHED = 1 << 5;
    }
}

// In ASCII order, which is the order maildir requires in file names
const FLAG_LETTERS: [(char, Flags); 6] = [
    ('D', Flags::DRAFT),
    ('F', Flags::FLAGGED),
    ('P', Flags::PASSED),
    ('R', Flags::REPLIED),
    ('S', Flags::SEEN),
    ('T', Flags::TRASHED),
];

impl MessageName {
    /// Split `filename` into its parts.
    ///
    /// The base ends at the first size marker, or at the first flags marker
    /// if there is no size marker.
    pub fn parse(filename: &str) -> Self {
        if let Some(ix) = filename.find(SIZE_MARKER) {
            let (size, flags) =
                split_flags(&filename[ix + SIZE_MARKER.len()..]);
            MessageName {
                base: filename[..ix].to_owned(),
                size: Some(size.to_owned()),
                flags: flags.map(str::to_owned),
            }
        } else {
            let (base, flags) = split_flags(filename);
            MessageName {
                base: base.to_owned(),
                size: None,
                flags: flags.map(str::to_owned),
            }
        }
    }

    /// Reassemble the file name.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// The delivery-unique part of the name, which identifies the message
    /// regardless of its current metadata.
    pub fn base_name(&self) -> &str {
        &self.base
    }

    /// The size recorded in the name, if present and decimal.
    pub fn size(&self) -> Option<u64> {
        self.size.as_ref().and_then(|s| s.parse().ok())
    }

    /// The raw text of the flags suffix, if any.
    pub fn flag_letters(&self) -> Option<&str> {
        self.flags.as_deref()
    }

    /// The standard flags present in the flags suffix.
    ///
    /// Letters with no standard meaning are ignored.
    pub fn flags(&self) -> Flags {
        let mut flags = Flags::empty();
        for ch in self.flags.as_deref().unwrap_or("").chars() {
            if let Some(&(_, flag)) =
                FLAG_LETTERS.iter().find(|&&(letter, _)| letter == ch)
            {
                flags |= flag;
            }
        }
        flags
    }

    /// Return a copy of this name whose flags suffix lists exactly `flags`,
    /// in canonical order.
    pub fn with_flags(&self, flags: Flags) -> Self {
        let letters = FLAG_LETTERS
            .iter()
            .filter(|&&(_, flag)| flags.contains(flag))
            .map(|&(letter, _)| letter)
            .collect::<String>();
        MessageName {
            base: self.base.clone(),
            size: self.size.clone(),
            flags: Some(letters),
        }
    }
}

/// Return the base name of `filename`.
///
/// Equivalent to `MessageName::parse(filename).base_name()` without
/// allocating.
pub fn base_name(filename: &str) -> &str {
    let end = filename
        .find(SIZE_MARKER)
        .or_else(|| filename.find(FLAGS_MARKER))
        .unwrap_or(filename.len());
    &filename[..end]
}

fn split_flags(s: &str) -> (&str, Option<&str>) {
    match s.find(FLAGS_MARKER) {
        Some(ix) => (&s[..ix], Some(&s[ix + FLAGS_MARKER.len()..])),
        None => (s, None),
    }
}

impl fmt::Display for MessageName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if let Some(ref size) = self.size {
            write!(f, "{}{}", SIZE_MARKER, size)?;
        }
        if let Some(ref flags) = self.flags {
            write!(f, "{}{}", FLAGS_MARKER, flags)?;
        }
        Ok(())
    }
}

impl fmt::Debug for MessageName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MessageName({:?})", self.to_string())
    }
}

impl From<&str> for MessageName {
    fn from(filename: &str) -> Self {
        MessageName::parse(filename)
    }
}
