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

//! Fine records.
//!
//! Implemented State Machine
//!
//! ```text
//!  Unpaid ──mark paid──► Paid
//!     │
//!     └──────waive─────► Waived
//! ```
//!
//! `Paid` and `Waived` are terminal.

use crate::base::{FineId, IssueId, MemberId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FineStatus {
    Unpaid,
    Paid,
    Waived,
}

impl FineStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unpaid)
    }
}

impl fmt::Display for FineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unpaid => "UNPAID",
            Self::Paid => "PAID",
            Self::Waived => "WAIVED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
    pub fine_id: FineId,
    /// The loan this fine penalizes. Unique across all fines.
    pub issue_id: IssueId,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub daily_rate: Decimal,
    pub overdue_days: u32,
    pub status: FineStatus,
}

/// Insert payload; fines are always created `Unpaid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFine {
    pub issue_id: IssueId,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub daily_rate: Decimal,
    pub overdue_days: u32,
}
