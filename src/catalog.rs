// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Catalog records: books, their physical copies, and members.
//!
//! Copies follow the circulation state machine:
//!
//! ```text
//!  Available ──issue──► Issued ──return──► Available
//!
//!  Lost, Damaged: maintenance states, never issuable
//! ```

use crate::base::{BookId, CopyId, MemberId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A catalog title. Quantities are owned by the circulation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    /// Count of copies ever registered.
    pub total_quantity: u32,
    /// Count of copies currently loanable.
    pub available_quantity: u32,
    /// Free-text lifecycle marker, e.g. `ACTIVE` or `RETIRED`.
    pub status: String,
}

/// Fields for registering a new book. Quantities start at zero and grow as
/// copies are registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
}

impl NewBook {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyStatus {
    Available,
    Issued,
    Lost,
    Damaged,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Issued => "ISSUED",
            Self::Lost => "LOST",
            Self::Damaged => "DAMAGED",
        }
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single physical copy, scanned by barcode at the desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookCopy {
    pub copy_id: CopyId,
    pub book_id: BookId,
    /// 1-based sequence number within the owning book.
    pub copy_number: u32,
    pub barcode: String,
    pub location: String,
    pub status: CopyStatus,
}

impl BookCopy {
    pub fn is_available(&self) -> bool {
        self.status == CopyStatus::Available
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCopy {
    pub book_id: BookId,
    pub barcode: String,
    pub location: String,
    pub status: CopyStatus,
}

impl NewCopy {
    /// A shelf-ready copy with no location recorded yet.
    pub fn available(book_id: BookId, barcode: impl Into<String>) -> Self {
        Self {
            book_id,
            barcode: barcode.into(),
            location: String::new(),
            status: CopyStatus::Available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    /// External lookup key printed on the member's card.
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub status: String,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewMember {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
}

impl NewMember {
    pub fn with_student_id(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_status_uses_upper_case_names() {
        assert_eq!(CopyStatus::Available.to_string(), "AVAILABLE");
        assert_eq!(
            serde_json::to_string(&CopyStatus::Damaged).unwrap(),
            "\"DAMAGED\""
        );
    }

    #[test]
    fn full_name_tolerates_missing_parts() {
        let member = Member {
            member_id: MemberId(1),
            student_id: "S1".into(),
            first_name: "Ada".into(),
            last_name: String::new(),
            department: "CS".into(),
            status: "ACTIVE".into(),
        };
        assert_eq!(member.full_name(), "Ada");
    }
}
