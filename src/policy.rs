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

//! Overdue fine policy.
//!
//! Fines are a pure function of the loan dates and a daily rate:
//!
//! - `overdue_days = max(0, return_date - due_date)` in whole calendar days
//! - `amount = overdue_days * daily_rate`
//!
//! Nothing here reads the clock. An open loan has no return date and is
//! therefore not assessable ([`CirculationError::LoanStillOpen`]). A product
//! too large for [`Decimal`] is reported as
//! [`CirculationError::FineAmountOverflow`] rather than wrapping or panicking.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use library_circulation::policy;
//! use rust_decimal_macros::dec;
//!
//! let issued = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
//! let due = NaiveDate::from_ymd_opt(2025, 3, 16).unwrap();
//! let returned = NaiveDate::from_ymd_opt(2025, 3, 19).unwrap();
//!
//! let fine = policy::compute(issued, due, Some(returned), dec!(10)).unwrap();
//! assert_eq!(fine.overdue_days, 3);
//! assert_eq!(fine.amount, dec!(30));
//! ```

use crate::error::CirculationError;
use crate::loan::IssueTransaction;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Days a copy may be kept before it becomes overdue.
pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 15;

/// Fine charged per overdue day, in the library's currency unit.
pub const DEFAULT_DAILY_RATE: Decimal = Decimal::TEN;

/// Highest daily rate the settings accept.
pub const MAX_DAILY_RATE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Result of assessing a closed loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FineAssessment {
    pub overdue_days: u32,
    pub daily_rate: Decimal,
    pub amount: Decimal,
}

impl FineAssessment {
    /// True when the assessment carries a charge worth recording.
    pub fn is_due(&self) -> bool {
        self.overdue_days > 0 && self.amount > Decimal::ZERO
    }
}

/// Computes overdue days and fine amount for a loan.
///
/// # Errors
///
/// - [`CirculationError::LoanStillOpen`] - `return_date` is `None`.
/// - [`CirculationError::FineAmountOverflow`] - The amount does not fit a [`Decimal`].
pub fn compute(
    issue_date: NaiveDate,
    due_date: NaiveDate,
    return_date: Option<NaiveDate>,
    daily_rate: Decimal,
) -> Result<FineAssessment, CirculationError> {
    debug_assert!(issue_date <= due_date, "due date precedes issue date");
    debug_assert!(daily_rate >= Decimal::ZERO, "negative daily rate");

    let return_date = return_date.ok_or(CirculationError::LoanStillOpen)?;
    let overdue_days = (return_date - due_date).num_days().max(0);
    let overdue_days = u32::try_from(overdue_days).unwrap_or(u32::MAX);
    let amount = Decimal::from(overdue_days)
        .checked_mul(daily_rate)
        .ok_or(CirculationError::FineAmountOverflow {
            overdue_days,
            daily_rate,
        })?;

    Ok(FineAssessment {
        overdue_days,
        daily_rate,
        amount,
    })
}

/// [`compute`] applied to a stored loan.
pub fn assess(
    loan: &IssueTransaction,
    daily_rate: Decimal,
) -> Result<FineAssessment, CirculationError> {
    compute(loan.issue_date, loan.due_date, loan.return_date, daily_rate)
}
