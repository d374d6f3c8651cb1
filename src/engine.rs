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

//! Circulation engine.
//!
//! The [`CirculationEngine`] moves physical copies between `Available` and
//! `Issued`, keeping three records in lockstep:
//!
//! - the [`IssueTransaction`] (opened on issue, closed on return)
//! - the copy's status
//! - the owning book's available quantity
//!
//! Each transition runs as one atomic unit of the injected [`CatalogStore`],
//! so a failure at any step leaves all three untouched.
//!
//! # Thread Safety
//!
//! The engine holds no locks of its own. Two issues racing for the same copy
//! or the same member are serialized by the store: the loser observes the
//! winner's committed writes and is rejected.

use crate::base::{BookId, CopyId, IssueId, MemberId};
use crate::catalog::{Book, BookCopy, CopyStatus};
use crate::clock::Clock;
use crate::error::{CirculationError, ErrorKind, IntegrityFault};
use crate::loan::{IssueTransaction, NewIssue};
use crate::policy::DEFAULT_LOAN_PERIOD_DAYS;
use crate::store::{CatalogStore, CatalogTx};
use chrono::{Days, NaiveDate};
use std::sync::Arc;

/// Copy issue/return state machine over a catalog store.
///
/// # Invariants
///
/// - A copy is `Issued` iff exactly one open loan references it.
/// - A book's available quantity equals its `Available` copies.
/// - A member holds at most one open loan.
/// - Loans are never deleted and only ever move `Issued` -> `Returned`.
pub struct CirculationEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    loan_period_days: u32,
}

impl<S: CatalogStore> CirculationEngine<S> {
    /// Creates an engine with the default loan period.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
        }
    }

    pub fn with_loan_period(mut self, days: u32) -> Self {
        self.loan_period_days = days;
        self
    }

    pub fn loan_period_days(&self) -> u32 {
        self.loan_period_days
    }

    /// Lends a copy to a member.
    ///
    /// Checks run in order and the first failure wins:
    ///
    /// | Check | Error |
    /// |-------|-------|
    /// | Member exists | [`CirculationError::MemberNotFound`] |
    /// | Copy exists | [`CirculationError::CopyNotFound`] |
    /// | Copy is `Available` | [`CirculationError::CopyNotAvailable`] |
    /// | Member has no open loan | [`CirculationError::MemberHasActiveLoan`] |
    ///
    /// On success the new loan is due `loan_period_days` after today.
    pub fn issue_copy(
        &self,
        member_id: MemberId,
        copy_id: CopyId,
    ) -> Result<IssueTransaction, CirculationError> {
        let today = self.clock.today();
        let due = due_date(today, self.loan_period_days);

        let outcome = self
            .store
            .atomic(|tx| issue_in(tx, member_id, copy_id, today, due));
        trace_outcome("issue", &outcome);
        outcome
    }

    /// Closes an open loan and puts the copy back on the shelf.
    ///
    /// `copy_id` and `book_id` must match the loan; a mismatch is rejected
    /// with [`CirculationError::CopyMismatch`]. The returned transaction
    /// carries today's date as its return date.
    ///
    /// # Errors
    ///
    /// - [`CirculationError::IssueNotFound`] - No such loan.
    /// - [`CirculationError::AlreadyReturned`] - Loan was closed before.
    /// - [`CirculationError::Integrity`] - The copy was not `Issued`.
    pub fn return_copy(
        &self,
        issue_id: IssueId,
        copy_id: CopyId,
        book_id: BookId,
    ) -> Result<IssueTransaction, CirculationError> {
        let today = self.clock.today();

        let outcome = self
            .store
            .atomic(|tx| return_in(tx, issue_id, copy_id, book_id, today));
        trace_outcome("return", &outcome);
        outcome
    }

    /// Moves a copy between the shelf states (`Available`, `Lost`, `Damaged`),
    /// keeping the book's available counter in step.
    ///
    /// # Errors
    ///
    /// - [`CirculationError::StatusReserved`] - `status` is `Issued`.
    /// - [`CirculationError::CopyOnLoan`] - The copy is currently `Issued`.
    /// - [`CirculationError::Integrity`] - A loan is open on a copy not marked `Issued`.
    pub fn mark_copy(
        &self,
        copy_id: CopyId,
        status: CopyStatus,
    ) -> Result<BookCopy, CirculationError> {
        let outcome = self.store.atomic(|tx| mark_in(tx, copy_id, status));
        trace_outcome("mark copy", &outcome);
        outcome
    }

    pub fn issue(&self, issue_id: IssueId) -> Result<IssueTransaction, CirculationError> {
        self.store
            .read(|tx| tx.issue(issue_id)?.ok_or(CirculationError::IssueNotFound))
    }

    pub fn copy_by_barcode(&self, barcode: &str) -> Result<BookCopy, CirculationError> {
        self.store
            .read(|tx| tx.copy_by_barcode(barcode)?.ok_or(CirculationError::CopyNotFound))
    }

    /// The single open loan for a copy, if any.
    ///
    /// Several open loans for one copy is reported as
    /// [`IntegrityFault::MultipleOpenIssues`], never as "none".
    pub fn open_issue_for_copy(
        &self,
        copy_id: CopyId,
    ) -> Result<Option<IssueTransaction>, CirculationError> {
        let outcome = self.store.read(|tx| open_issue_in(tx, copy_id));
        if let Err(error @ CirculationError::Integrity(_)) = &outcome {
            tracing::error!(copy = %copy_id, %error, "open loan lookup hit an integrity fault");
        }
        outcome
    }

    pub fn member_has_active_loan(&self, member_id: MemberId) -> Result<bool, CirculationError> {
        self.store
            .read(|tx| Ok(tx.count_open_issues_for_member(member_id)? > 0))
    }

    pub fn is_copy_available(&self, copy_id: CopyId) -> Result<bool, CirculationError> {
        self.store.read(|tx| {
            let copy = tx.copy(copy_id)?.ok_or(CirculationError::CopyNotFound)?;
            Ok(copy.is_available())
        })
    }

    /// Recounts a book's `Available` copies against its counter.
    ///
    /// Returns the book when they agree, otherwise
    /// [`IntegrityFault::AvailableQuantityDrift`].
    pub fn reconcile_book(&self, book_id: BookId) -> Result<Book, CirculationError> {
        let outcome = self.store.read(|tx| {
            let book = tx.book(book_id)?.ok_or(CirculationError::BookNotFound)?;
            let actual = tx
                .copies_of_book(book_id)?
                .iter()
                .filter(|copy| copy.is_available())
                .count() as u32;
            if actual != book.available_quantity || actual > book.total_quantity {
                return Err(IntegrityFault::AvailableQuantityDrift {
                    book_id,
                    recorded: book.available_quantity,
                    actual,
                }
                .into());
            }
            Ok(book)
        });
        trace_outcome("reconcile", &outcome);
        outcome
    }
}

pub(crate) fn due_date(issued: NaiveDate, loan_period_days: u32) -> NaiveDate {
    issued
        .checked_add_days(Days::new(u64::from(loan_period_days)))
        .unwrap_or(NaiveDate::MAX)
}

pub(crate) fn trace_outcome<T>(operation: &'static str, outcome: &Result<T, CirculationError>) {
    match outcome {
        Ok(_) => tracing::debug!(operation, "circulation unit committed"),
        Err(error) => match error.kind() {
            ErrorKind::IntegrityFault | ErrorKind::StorageFailure => {
                tracing::error!(operation, %error, "circulation unit rolled back")
            }
            ErrorKind::NotFound | ErrorKind::PolicyViolation => {
                tracing::debug!(operation, %error, "circulation request rejected")
            }
        },
    }
}

pub(crate) fn open_issue_in(
    tx: &dyn CatalogTx,
    copy_id: CopyId,
) -> Result<Option<IssueTransaction>, CirculationError> {
    let mut open = tx.open_issues_for_copy(copy_id)?;
    match open.len() {
        0 | 1 => Ok(open.pop()),
        count => Err(IntegrityFault::MultipleOpenIssues { copy_id, count }.into()),
    }
}

/// Moves the owning book's available counter by `delta`, refusing to leave
/// `[0, total_quantity]`.
fn shift_available(
    tx: &mut dyn CatalogTx,
    copy: &BookCopy,
    delta: i32,
) -> Result<Book, CirculationError> {
    let book = tx.book(copy.book_id)?.ok_or(IntegrityFault::MissingBook {
        copy_id: copy.copy_id,
        book_id: copy.book_id,
    })?;
    let attempted = i64::from(book.available_quantity) + i64::from(delta);
    if attempted < 0 || attempted > i64::from(book.total_quantity) {
        return Err(IntegrityFault::AvailableQuantityOutOfRange {
            book_id: book.book_id,
            attempted,
            total: book.total_quantity,
        }
        .into());
    }
    let book = tx.adjust_available_quantity(copy.book_id, delta)?;
    debug_assert!(
        book.available_quantity <= book.total_quantity,
        "Invariant violated: book {} has more available than total copies",
        book.book_id
    );
    Ok(book)
}

/// Issue transition inside an open unit.
pub(crate) fn issue_in(
    tx: &mut dyn CatalogTx,
    member_id: MemberId,
    copy_id: CopyId,
    today: NaiveDate,
    due: NaiveDate,
) -> Result<IssueTransaction, CirculationError> {
    tx.member(member_id)?
        .ok_or(CirculationError::MemberNotFound)?;
    let copy = tx.copy(copy_id)?.ok_or(CirculationError::CopyNotFound)?;
    if copy.status != CopyStatus::Available {
        return Err(CirculationError::CopyNotAvailable);
    }
    match tx.count_open_issues_for_member(member_id)? {
        0 => {}
        1 => return Err(CirculationError::MemberHasActiveLoan),
        count => return Err(IntegrityFault::MultipleActiveLoans { member_id, count }.into()),
    }
    if !tx.open_issues_for_copy(copy_id)?.is_empty() {
        return Err(IntegrityFault::CopyStateMismatch {
            copy_id,
            status: copy.status,
        }
        .into());
    }

    let loan = tx.insert_issue(NewIssue {
        member_id,
        copy_id,
        issue_date: today,
        due_date: due,
    })?;
    tx.update_copy_status(copy_id, CopyStatus::Issued)?;
    shift_available(tx, &copy, -1)?;

    tracing::debug!(
        member = %member_id,
        copy = %copy_id,
        issue = %loan.issue_id,
        due = %loan.due_date,
        "copy issued"
    );
    Ok(loan)
}

/// Return transition inside an open unit.
pub(crate) fn return_in(
    tx: &mut dyn CatalogTx,
    issue_id: IssueId,
    copy_id: CopyId,
    book_id: BookId,
    today: NaiveDate,
) -> Result<IssueTransaction, CirculationError> {
    let mut loan = tx.issue(issue_id)?.ok_or(CirculationError::IssueNotFound)?;
    if !loan.is_open() {
        return Err(CirculationError::AlreadyReturned);
    }
    if loan.copy_id != copy_id {
        return Err(CirculationError::CopyMismatch);
    }
    let copy = tx.copy(copy_id)?.ok_or(CirculationError::CopyNotFound)?;
    if copy.book_id != book_id {
        return Err(CirculationError::CopyMismatch);
    }
    if copy.status != CopyStatus::Issued {
        return Err(IntegrityFault::CopyStateMismatch {
            copy_id,
            status: copy.status,
        }
        .into());
    }

    loan.close(today);
    tx.update_issue(&loan)?;
    tx.update_copy_status(copy_id, CopyStatus::Available)?;
    shift_available(tx, &copy, 1)?;

    tracing::debug!(
        member = %loan.member_id,
        copy = %copy_id,
        issue = %issue_id,
        returned = %today,
        "copy returned"
    );
    Ok(loan)
}

/// Shelf status change inside an open unit.
pub(crate) fn mark_in(
    tx: &mut dyn CatalogTx,
    copy_id: CopyId,
    status: CopyStatus,
) -> Result<BookCopy, CirculationError> {
    if status == CopyStatus::Issued {
        return Err(CirculationError::StatusReserved(status));
    }
    let copy = tx.copy(copy_id)?.ok_or(CirculationError::CopyNotFound)?;
    if copy.status == CopyStatus::Issued {
        return Err(CirculationError::CopyOnLoan);
    }
    if !tx.open_issues_for_copy(copy_id)?.is_empty() {
        return Err(IntegrityFault::CopyStateMismatch {
            copy_id,
            status: copy.status,
        }
        .into());
    }
    if copy.status == status {
        return Ok(copy);
    }

    let delta = match (copy.status, status) {
        (CopyStatus::Available, _) => -1,
        (_, CopyStatus::Available) => 1,
        _ => 0,
    };
    tx.update_copy_status(copy_id, status)?;
    if delta != 0 {
        shift_available(tx, &copy, delta)?;
    }

    tracing::debug!(copy = %copy_id, from = %copy.status, to = %status, "copy status changed");
    Ok(BookCopy { status, ..copy })
}
