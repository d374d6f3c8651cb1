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

//! Fine ledger.
//!
//! Records fines for overdue returns and settles them. A loan carries at
//! most one fine; recording a second one is rejected with
//! [`CirculationError::FineAlreadyExists`] naming the fine already on file,
//! so a retried request is harmless.

use crate::base::{FineId, IssueId, MemberId};
use crate::error::{CirculationError, StoreError};
use crate::fine::{Fine, FineStatus, NewFine};
use crate::store::{CatalogStore, CatalogTx};
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::sync::Arc;

pub struct FineLedger<S> {
    store: Arc<S>,
}

impl<S: CatalogStore> FineLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records an `Unpaid` fine against a returned loan.
    ///
    /// # Errors
    ///
    /// - [`CirculationError::NoFineDue`] - `amount` or `overdue_days` is zero.
    /// - [`CirculationError::IssueNotFound`] - No such loan.
    /// - [`CirculationError::LoanStillOpen`] - The loan has not been returned.
    /// - [`CirculationError::IssuedToDifferentMember`] - `member_id` is not the borrower.
    /// - [`CirculationError::FineAlreadyExists`] - The loan already carries a fine.
    pub fn record_fine(
        &self,
        issue_id: IssueId,
        member_id: MemberId,
        daily_rate: Decimal,
        overdue_days: u32,
        amount: Decimal,
    ) -> Result<Fine, CirculationError> {
        let fine = NewFine {
            issue_id,
            member_id,
            amount,
            daily_rate,
            overdue_days,
        };
        self.store.atomic(|tx| record_in(tx, fine))
    }

    /// `Unpaid` -> `Paid`.
    pub fn mark_paid(&self, fine_id: FineId) -> Result<Fine, CirculationError> {
        self.store
            .atomic(|tx| settle_in(tx, fine_id, FineStatus::Paid))
    }

    /// `Unpaid` -> `Waived`.
    pub fn waive(&self, fine_id: FineId) -> Result<Fine, CirculationError> {
        self.store
            .atomic(|tx| settle_in(tx, fine_id, FineStatus::Waived))
    }

    pub fn fine(&self, fine_id: FineId) -> Result<Fine, CirculationError> {
        self.store
            .read(|tx| tx.fine(fine_id)?.ok_or(CirculationError::FineNotFound))
    }

    pub fn fine_for_issue(&self, issue_id: IssueId) -> Result<Option<Fine>, CirculationError> {
        self.store.read(|tx| Ok(tx.fine_for_issue(issue_id)?))
    }

    /// A member's fines, outstanding ones first, then newest first.
    pub fn list_for_member(&self, member_id: MemberId) -> Result<Vec<Fine>, CirculationError> {
        let mut fines = self
            .store
            .read(|tx| Ok::<_, CirculationError>(tx.fines_for_member(member_id)?))?;
        fines.sort_by_key(|fine| (fine.status != FineStatus::Unpaid, Reverse(fine.fine_id)));
        Ok(fines)
    }

    /// Sum of a member's `Unpaid` fines.
    pub fn outstanding_for_member(&self, member_id: MemberId) -> Result<Decimal, CirculationError> {
        self.store.read(|tx| {
            Ok(tx
                .fines_for_member(member_id)?
                .iter()
                .filter(|fine| fine.status == FineStatus::Unpaid)
                .map(|fine| fine.amount)
                .sum())
        })
    }
}

/// Fine insert inside an open unit.
pub(crate) fn record_in(tx: &mut dyn CatalogTx, fine: NewFine) -> Result<Fine, CirculationError> {
    if fine.overdue_days == 0 || fine.amount <= Decimal::ZERO {
        return Err(CirculationError::NoFineDue);
    }
    let loan = tx
        .issue(fine.issue_id)?
        .ok_or(CirculationError::IssueNotFound)?;
    if loan.is_open() {
        return Err(CirculationError::LoanStillOpen);
    }
    if loan.member_id != fine.member_id {
        return Err(CirculationError::IssuedToDifferentMember {
            holder: loan.member_id,
        });
    }
    if let Some(existing) = tx.fine_for_issue(fine.issue_id)? {
        return Err(CirculationError::FineAlreadyExists(existing.fine_id));
    }

    let issue_id = fine.issue_id;
    let fine = match tx.insert_fine(fine) {
        Ok(fine) => fine,
        // Lost a race against the unique index.
        Err(StoreError::UniqueViolation(detail)) => {
            return match tx.fine_for_issue(issue_id)? {
                Some(existing) => Err(CirculationError::FineAlreadyExists(existing.fine_id)),
                None => Err(StoreError::UniqueViolation(detail).into()),
            };
        }
        Err(error) => return Err(error.into()),
    };

    tracing::debug!(
        fine = %fine.fine_id,
        issue = %fine.issue_id,
        member = %fine.member_id,
        amount = %fine.amount,
        "fine recorded"
    );
    Ok(fine)
}

fn settle_in(
    tx: &mut dyn CatalogTx,
    fine_id: FineId,
    to: FineStatus,
) -> Result<Fine, CirculationError> {
    let mut fine = tx.fine(fine_id)?.ok_or(CirculationError::FineNotFound)?;
    if fine.status.is_terminal() {
        return Err(CirculationError::FineAlreadyTerminal(fine.status));
    }
    tx.update_fine_status(fine_id, to)?;
    fine.status = to;

    tracing::debug!(fine = %fine_id, status = %to, "fine settled");
    Ok(fine)
}
