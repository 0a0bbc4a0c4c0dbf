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

/// Determine whether the given message file name is "safe".
///
/// A safe name can be stored as one line of the UID list and refers to a
/// plain file directly inside `cur/` or `new/`. This excludes empty names,
/// anything that could traverse directories, hidden files (which maildir
/// readers ignore), and control characters, the line terminators in
/// particular.
///
/// Spaces are permitted; the UID list only splits on the first one.
pub fn is_safe_message_name(name: &str) -> bool {
    !name.is_empty() &&
        name.chars().next() != Some('.') &&
        name.find('/').is_none() &&
        // Only a path separator on Windows, but always block since it has high
        // potential of causing problems
        name.find('\\').is_none() &&
        name.find(|c| c < ' ' || c == '\x7F').is_none()
}
