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

//! Issue transactions (loans).
//!
//! A loan only ever moves [`Issued`](LoanStatus::Issued) →
//! [`Returned`](LoanStatus::Returned). Records are never deleted: fines are
//! derived from them.

use crate::base::{CopyId, IssueId, MemberId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Issued,
    Returned,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Issued => "ISSUED",
            Self::Returned => "RETURNED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTransaction {
    pub issue_id: IssueId,
    pub member_id: MemberId,
    pub copy_id: CopyId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
}

impl IssueTransaction {
    pub fn is_open(&self) -> bool {
        self.status == LoanStatus::Issued
    }

    /// Closes the loan as of `date`.
    pub(crate) fn close(&mut self, date: NaiveDate) {
        self.return_date = Some(date);
        self.status = LoanStatus::Returned;
    }
}

/// Insert payload; the store assigns the [`IssueId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub member_id: MemberId,
    pub copy_id: CopyId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}
