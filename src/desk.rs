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

//! Circulation desk workflow.
//!
//! The [`CirculationDesk`] is what a clerk drives: members are identified by
//! student id and copies by scanned barcode. It layers the desk policies on
//! top of the engine and ledger:
//!
//! - a copy may only be returned by the member it was issued to
//! - an overdue return records its fine in the same unit as the return
//! - every committed change is reported to the audit sink afterwards
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use library_circulation::{
//!     ActorId, CirculationConfig, CirculationDesk, FixedClock, MemoryAuditLog, MemoryStore,
//!     NewBook, NewMember,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
//! let desk = CirculationDesk::new(
//!     store,
//!     clock.clone(),
//!     Arc::new(MemoryAuditLog::new()),
//!     &CirculationConfig::default(),
//! );
//!
//! let book = desk.register_book(NewBook::titled("Dune")).unwrap();
//! desk.register_copy(book.book_id, "B1").unwrap();
//! desk.register_member(NewMember::with_student_id("S1")).unwrap();
//!
//! let clerk = ActorId::new("clerk");
//! desk.issue(Some(&clerk), "S1", "B1").unwrap();
//! clock.advance(20);
//! let receipt = desk.return_copy(Some(&clerk), "S1", "B1").unwrap();
//! assert_eq!(receipt.assessment.overdue_days, 5);
//! assert!(receipt.fine.is_some());
//! ```

use crate::audit::{AuditAction, AuditSink, AuditTarget};
use crate::base::{ActorId, BookId, FineId, IssueId};
use crate::catalog::{Book, BookCopy, CopyStatus, Member, NewBook, NewCopy, NewMember};
use crate::clock::Clock;
use crate::config::CirculationConfig;
use crate::engine::{self, CirculationEngine};
use crate::error::{CirculationError, IntegrityFault};
use crate::fine::{Fine, NewFine};
use crate::ledger::{self, FineLedger};
use crate::loan::IssueTransaction;
use crate::policy::{self, FineAssessment};
use crate::store::{CatalogStore, CatalogTx};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of a successful issue, with what the clerk reads back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueReceipt {
    pub loan: IssueTransaction,
    pub member: Member,
    pub book: Book,
}

/// Outcome of a successful return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnReceipt {
    /// The closed loan, with its return date set.
    pub loan: IssueTransaction,
    pub member: Member,
    pub book: Book,
    pub assessment: FineAssessment,
    /// Present when the return was overdue at a non-zero rate.
    pub fine: Option<Fine>,
}

pub struct CirculationDesk<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    engine: CirculationEngine<S>,
    ledger: FineLedger<S>,
    daily_rate: Decimal,
}

impl<S: CatalogStore> CirculationDesk<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        config: &CirculationConfig,
    ) -> Self {
        let engine = CirculationEngine::new(Arc::clone(&store), Arc::clone(&clock))
            .with_loan_period(config.loan_period_days);
        let ledger = FineLedger::new(Arc::clone(&store));
        Self {
            store,
            clock,
            audit,
            engine,
            ledger,
            daily_rate: config.daily_rate,
        }
    }

    pub fn engine(&self) -> &CirculationEngine<S> {
        &self.engine
    }

    pub fn ledger(&self) -> &FineLedger<S> {
        &self.ledger
    }

    pub fn daily_rate(&self) -> Decimal {
        self.daily_rate
    }

    /// Issues the scanned copy to the member holding `student_id`.
    pub fn issue(
        &self,
        actor: Option<&ActorId>,
        student_id: &str,
        barcode: &str,
    ) -> Result<IssueReceipt, CirculationError> {
        let today = self.clock.today();
        let due = engine::due_date(today, self.engine.loan_period_days());

        let receipt = self.store.atomic(|tx| {
            let (member, copy) = resolve(&*tx, student_id, barcode)?;
            let loan = engine::issue_in(tx, member.member_id, copy.copy_id, today, due)?;
            let book = owning_book(&*tx, &copy)?;
            Ok::<_, CirculationError>(IssueReceipt { loan, member, book })
        });
        engine::trace_outcome("desk issue", &receipt);
        let receipt = receipt?;

        tracing::info!(
            student = student_id,
            barcode,
            issue = %receipt.loan.issue_id,
            due = %receipt.loan.due_date,
            "book issued"
        );
        self.audit(actor, AuditAction::Issue, AuditTarget::Copy(receipt.loan.copy_id));
        Ok(receipt)
    }

    /// Takes back the scanned copy from the member holding `student_id`.
    ///
    /// The return, the fine assessment and the fine insert commit together.
    ///
    /// # Errors
    ///
    /// - [`CirculationError::CopyNotIssued`] - The copy is on the shelf.
    /// - [`CirculationError::IssuedToDifferentMember`] - Someone else holds the copy.
    /// - [`CirculationError::Integrity`] - The copy is `Issued` but no loan is open.
    /// - [`CirculationError::FineAmountOverflow`] - The fine does not fit a decimal.
    pub fn return_copy(
        &self,
        actor: Option<&ActorId>,
        student_id: &str,
        barcode: &str,
    ) -> Result<ReturnReceipt, CirculationError> {
        let today = self.clock.today();
        let daily_rate = self.daily_rate;

        let receipt = self.store.atomic(|tx| {
            let (member, copy) = resolve(&*tx, student_id, barcode)?;
            let open = match engine::open_issue_in(&*tx, copy.copy_id)? {
                Some(open) => open,
                None if copy.status == CopyStatus::Issued => {
                    return Err(IntegrityFault::CopyStateMismatch {
                        copy_id: copy.copy_id,
                        status: copy.status,
                    }
                    .into());
                }
                None => return Err(CirculationError::CopyNotIssued),
            };
            if open.member_id != member.member_id {
                return Err(CirculationError::IssuedToDifferentMember {
                    holder: open.member_id,
                });
            }

            let loan = engine::return_in(tx, open.issue_id, copy.copy_id, copy.book_id, today)?;
            let assessment = policy::assess(&loan, daily_rate)?;
            let fine = if assessment.is_due() {
                Some(ledger::record_in(tx, fine_for(&loan, &assessment))?)
            } else {
                None
            };
            let book = owning_book(&*tx, &copy)?;

            Ok(ReturnReceipt {
                loan,
                member,
                book,
                assessment,
                fine,
            })
        });
        engine::trace_outcome("desk return", &receipt);
        let receipt = receipt?;

        tracing::info!(
            student = student_id,
            barcode,
            issue = %receipt.loan.issue_id,
            overdue_days = receipt.assessment.overdue_days,
            fine = %receipt.assessment.amount,
            "book returned"
        );
        if receipt.fine.is_some() {
            self.audit(
                actor,
                AuditAction::FineCreated,
                AuditTarget::Issue(receipt.loan.issue_id),
            );
        }
        self.audit(actor, AuditAction::Return, AuditTarget::Copy(receipt.loan.copy_id));
        Ok(receipt)
    }

    /// Assesses a returned loan and records its fine if one is due.
    ///
    /// Returns `Ok(None)` when the loan was returned on time.
    pub fn assess_fine(
        &self,
        actor: Option<&ActorId>,
        issue_id: IssueId,
    ) -> Result<Option<Fine>, CirculationError> {
        let daily_rate = self.daily_rate;

        let fine = self.store.atomic(|tx| {
            let loan = tx.issue(issue_id)?.ok_or(CirculationError::IssueNotFound)?;
            let assessment = policy::assess(&loan, daily_rate)?;
            if !assessment.is_due() {
                return Ok(None);
            }
            ledger::record_in(tx, fine_for(&loan, &assessment)).map(Some)
        });
        engine::trace_outcome("assess fine", &fine);
        let fine = fine?;

        if fine.is_some() {
            self.audit(actor, AuditAction::FineCreated, AuditTarget::Issue(issue_id));
        }
        Ok(fine)
    }

    pub fn pay_fine(
        &self,
        actor: Option<&ActorId>,
        fine_id: FineId,
    ) -> Result<Fine, CirculationError> {
        let fine = self.ledger.mark_paid(fine_id);
        engine::trace_outcome("pay fine", &fine);
        let fine = fine?;
        self.audit(actor, AuditAction::FinePaid, AuditTarget::Fine(fine_id));
        Ok(fine)
    }

    pub fn waive_fine(
        &self,
        actor: Option<&ActorId>,
        fine_id: FineId,
    ) -> Result<Fine, CirculationError> {
        let fine = self.ledger.waive(fine_id);
        engine::trace_outcome("waive fine", &fine);
        let fine = fine?;
        self.audit(actor, AuditAction::FineWaived, AuditTarget::Fine(fine_id));
        Ok(fine)
    }

    /// Marks the scanned copy `Available`, `Lost` or `Damaged`.
    ///
    /// The book's available counter moves with the copy in the same unit.
    /// Copies on loan must be returned first.
    pub fn mark_copy(
        &self,
        actor: Option<&ActorId>,
        barcode: &str,
        status: CopyStatus,
    ) -> Result<BookCopy, CirculationError> {
        let copy = self.store.atomic(|tx| {
            let copy = tx
                .copy_by_barcode(barcode)?
                .ok_or(CirculationError::CopyNotFound)?;
            engine::mark_in(tx, copy.copy_id, status)
        });
        engine::trace_outcome("mark copy", &copy);
        let copy = copy?;

        tracing::info!(barcode, status = %copy.status, "copy status updated");
        self.audit(actor, AuditAction::CopyUpdated, AuditTarget::Copy(copy.copy_id));
        Ok(copy)
    }

    /// Fines of the member holding `student_id`, outstanding first.
    pub fn member_fines(&self, student_id: &str) -> Result<Vec<Fine>, CirculationError> {
        let member = self.member(student_id)?;
        self.ledger.list_for_member(member.member_id)
    }

    pub fn member(&self, student_id: &str) -> Result<Member, CirculationError> {
        self.store.read(|tx| {
            tx.member_by_student_id(student_id)?
                .ok_or(CirculationError::MemberNotFound)
        })
    }

    pub fn register_member(&self, member: NewMember) -> Result<Member, CirculationError> {
        self.store
            .atomic(|tx| Ok::<_, CirculationError>(tx.insert_member(member)?))
    }

    pub fn register_book(&self, book: NewBook) -> Result<Book, CirculationError> {
        self.store
            .atomic(|tx| Ok::<_, CirculationError>(tx.insert_book(book)?))
    }

    /// Registers a shelf-ready copy of `book_id`.
    pub fn register_copy(
        &self,
        book_id: BookId,
        barcode: &str,
    ) -> Result<BookCopy, CirculationError> {
        self.add_copy(NewCopy::available(book_id, barcode))
    }

    /// Registers a copy in any initial state, e.g. one already `Damaged`.
    pub fn add_copy(&self, copy: NewCopy) -> Result<BookCopy, CirculationError> {
        self.store.atomic(|tx| {
            tx.book(copy.book_id)?.ok_or(CirculationError::BookNotFound)?;
            Ok(tx.insert_copy(copy)?)
        })
    }

    pub fn copies_of_book(&self, book_id: BookId) -> Result<Vec<BookCopy>, CirculationError> {
        self.store.read(|tx| {
            tx.book(book_id)?.ok_or(CirculationError::BookNotFound)?;
            Ok(tx.copies_of_book(book_id)?)
        })
    }

    pub fn available_copies(&self, book_id: BookId) -> Result<Vec<BookCopy>, CirculationError> {
        let mut copies = self.copies_of_book(book_id)?;
        copies.retain(BookCopy::is_available);
        Ok(copies)
    }

    /// Reports to the audit sink, swallowing its failures.
    fn audit(&self, actor: Option<&ActorId>, action: AuditAction, target: AuditTarget) {
        if let Err(error) = self.audit.record(actor, action, target) {
            tracing::warn!(%action, object = %target, %error, "audit record dropped");
        }
    }
}

fn resolve(
    tx: &dyn CatalogTx,
    student_id: &str,
    barcode: &str,
) -> Result<(Member, BookCopy), CirculationError> {
    let member = tx
        .member_by_student_id(student_id)?
        .ok_or(CirculationError::MemberNotFound)?;
    let copy = tx
        .copy_by_barcode(barcode)?
        .ok_or(CirculationError::CopyNotFound)?;
    Ok((member, copy))
}

fn owning_book(tx: &dyn CatalogTx, copy: &BookCopy) -> Result<Book, CirculationError> {
    Ok(tx.book(copy.book_id)?.ok_or(IntegrityFault::MissingBook {
        copy_id: copy.copy_id,
        book_id: copy.book_id,
    })?)
}

fn fine_for(loan: &IssueTransaction, assessment: &FineAssessment) -> NewFine {
    NewFine {
        issue_id: loan.issue_id,
        member_id: loan.member_id,
        amount: assessment.amount,
        daily_rate: assessment.daily_rate,
        overdue_days: assessment.overdue_days,
    }
}
