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

//! Circulation desk workflow tests: end-to-end scenarios with auditing.

use chrono::NaiveDate;
use library_circulation::{
    ActorId, AuditAction, AuditError, AuditSink, AuditTarget, BookId, ChannelAuditSink,
    CatalogStore, CirculationConfig, CirculationDesk, CirculationError, CopyStatus, ErrorKind,
    FineStatus, FixedClock, IntegrityFault, MemoryAuditLog, MemoryStore, NewBook, NewCopy,
    NewMember, StoreError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Sink that always fails.
struct BrokenSink;

impl AuditSink for BrokenSink {
    fn record(
        &self,
        _actor: Option<&ActorId>,
        _action: AuditAction,
        _target: AuditTarget,
    ) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("disk full".to_string()))
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    log: Arc<MemoryAuditLog>,
    desk: CirculationDesk<MemoryStore>,
    book: BookId,
    clerk: ActorId,
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

/// Members S1 and S2, and "Dune" with copies B1 and B2.
fn fixture_with(config: CirculationConfig, sink: Option<Arc<dyn AuditSink>>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(start()));
    let log = Arc::new(MemoryAuditLog::new());
    let sink = sink.unwrap_or_else(|| log.clone() as Arc<dyn AuditSink>);
    let desk = CirculationDesk::new(store.clone(), clock.clone(), sink, &config);

    desk.register_member(NewMember::with_student_id("S1")).unwrap();
    desk.register_member(NewMember::with_student_id("S2")).unwrap();
    let book = desk.register_book(NewBook::titled("Dune")).unwrap();
    desk.register_copy(book.book_id, "B1").unwrap();
    desk.register_copy(book.book_id, "B2").unwrap();

    Fixture {
        store,
        clock,
        log,
        desk,
        book: book.book_id,
        clerk: ActorId::new("clerk-7"),
    }
}

fn fixture() -> Fixture {
    fixture_with(CirculationConfig::default(), None)
}

#[test]
fn overdue_return_records_fine_and_settles() {
    let f = fixture();
    let clerk = Some(&f.clerk);

    let issued = f.desk.issue(clerk, "S1", "B1").unwrap();
    assert_eq!(issued.book.available_quantity, 1);
    assert_eq!(issued.member.student_id, "S1");
    assert_eq!(issued.loan.due_date, NaiveDate::from_ymd_opt(2025, 3, 16).unwrap());

    f.clock.advance(20);
    let returned = f.desk.return_copy(clerk, "S1", "B1").unwrap();

    assert_eq!(returned.book.available_quantity, 2);
    assert_eq!(returned.assessment.overdue_days, 5);
    assert_eq!(returned.assessment.amount, dec!(50));
    let fine = returned.fine.unwrap();
    assert_eq!(fine.status, FineStatus::Unpaid);
    assert_eq!(fine.issue_id, returned.loan.issue_id);
    assert_eq!(fine.daily_rate, dec!(10));

    let paid = f.desk.pay_fine(clerk, fine.fine_id).unwrap();
    assert_eq!(paid.status, FineStatus::Paid);
    assert_eq!(
        f.desk.pay_fine(clerk, fine.fine_id),
        Err(CirculationError::FineAlreadyTerminal(FineStatus::Paid))
    );
    f.store.verify_integrity().unwrap();
}

#[test]
fn on_time_return_has_no_fine() {
    let f = fixture();
    f.desk.issue(None, "S1", "B1").unwrap();
    f.clock.advance(15);

    let returned = f.desk.return_copy(None, "S1", "B1").unwrap();

    assert_eq!(returned.assessment.overdue_days, 0);
    assert_eq!(returned.fine, None);
    assert!(f.desk.member_fines("S1").unwrap().is_empty());
}

#[test]
fn zero_daily_rate_never_fines() {
    let config = CirculationConfig {
        daily_rate: Decimal::ZERO,
        ..CirculationConfig::default()
    };
    let f = fixture_with(config, None);
    f.desk.issue(None, "S1", "B1").unwrap();
    f.clock.advance(40);

    let returned = f.desk.return_copy(None, "S1", "B1").unwrap();

    assert_eq!(returned.assessment.overdue_days, 25);
    assert_eq!(returned.fine, None);
}

#[test]
fn unknown_student_or_barcode() {
    let f = fixture();
    assert_eq!(
        f.desk.issue(None, "S9", "B1").map(|_| ()),
        Err(CirculationError::MemberNotFound)
    );
    assert_eq!(
        f.desk.issue(None, "S1", "B9").map(|_| ()),
        Err(CirculationError::CopyNotFound)
    );
    assert_eq!(
        f.desk.return_copy(None, "S9", "B1").map(|_| ()),
        Err(CirculationError::MemberNotFound)
    );
}

#[test]
fn return_of_copy_on_shelf() {
    let f = fixture();
    assert_eq!(
        f.desk.return_copy(None, "S1", "B1").map(|_| ()),
        Err(CirculationError::CopyNotIssued)
    );
}

#[test]
fn return_of_copy_marked_issued_without_loan_is_a_fault() {
    let f = fixture();
    let copy = f.desk.engine().copy_by_barcode("B1").unwrap();
    f.store
        .atomic(|tx| tx.update_copy_status(copy.copy_id, CopyStatus::Issued))
        .unwrap();

    let error = f.desk.return_copy(None, "S1", "B1").unwrap_err();
    assert_eq!(
        error,
        CirculationError::Integrity(IntegrityFault::CopyStateMismatch {
            copy_id: copy.copy_id,
            status: CopyStatus::Issued,
        })
    );
    assert_eq!(error.kind(), ErrorKind::IntegrityFault);
    assert!(f.log.by_action(AuditAction::Return).is_empty());
}

#[test]
fn overflowing_fine_keeps_the_loan_open() {
    let config = CirculationConfig {
        daily_rate: Decimal::MAX,
        ..CirculationConfig::default()
    };
    let f = fixture_with(config, None);
    let issued = f.desk.issue(None, "S1", "B1").unwrap();
    f.clock.advance(20);

    let error = f.desk.return_copy(None, "S1", "B1").unwrap_err();
    assert_eq!(
        error,
        CirculationError::FineAmountOverflow {
            overdue_days: 5,
            daily_rate: Decimal::MAX,
        }
    );
    assert_eq!(error.kind(), ErrorKind::PolicyViolation);
    assert!(f.desk.engine().issue(issued.loan.issue_id).unwrap().is_open());
    assert!(f.desk.member_fines("S1").unwrap().is_empty());
    f.store.verify_integrity().unwrap();
}

#[test]
fn return_by_someone_else_is_refused() {
    let f = fixture();
    let issued = f.desk.issue(None, "S1", "B1").unwrap();
    f.clock.advance(30);

    assert_eq!(
        f.desk.return_copy(None, "S2", "B1").map(|_| ()),
        Err(CirculationError::IssuedToDifferentMember {
            holder: issued.member.member_id
        })
    );
    assert!(f.desk.engine().issue(issued.loan.issue_id).unwrap().is_open());
    assert!(f.desk.member_fines("S2").unwrap().is_empty());
}

#[test]
fn second_issue_for_member_is_refused() {
    let f = fixture();
    f.desk.issue(None, "S1", "B1").unwrap();
    let error = f.desk.issue(None, "S1", "B2").unwrap_err();
    assert_eq!(error, CirculationError::MemberHasActiveLoan);
    assert_eq!(error.kind(), ErrorKind::PolicyViolation);
    assert_eq!(error.to_string(), "member already has an issued book");
}

#[test]
fn assess_fine_after_plain_engine_return() {
    let f = fixture();
    let copy = f.desk.engine().copy_by_barcode("B2").unwrap();
    let member = f.desk.member("S2").unwrap();
    let loan = f.desk.engine().issue_copy(member.member_id, copy.copy_id).unwrap();

    assert_eq!(
        f.desk.assess_fine(None, loan.issue_id),
        Err(CirculationError::LoanStillOpen)
    );

    f.clock.advance(17);
    f.desk
        .engine()
        .return_copy(loan.issue_id, copy.copy_id, f.book)
        .unwrap();

    let fine = f.desk.assess_fine(None, loan.issue_id).unwrap().unwrap();
    assert_eq!(fine.overdue_days, 2);
    assert_eq!(fine.amount, dec!(20));
    assert_eq!(
        f.desk.assess_fine(None, loan.issue_id),
        Err(CirculationError::FineAlreadyExists(fine.fine_id))
    );
    assert_eq!(f.desk.ledger().fine_for_issue(loan.issue_id).unwrap(), Some(fine));
}

#[test]
fn assess_fine_on_time_is_none() {
    let f = fixture();
    f.desk.issue(None, "S1", "B1").unwrap();
    f.clock.advance(3);
    let returned = f.desk.return_copy(None, "S1", "B1").unwrap();
    assert_eq!(f.desk.assess_fine(None, returned.loan.issue_id), Ok(None));
}

#[test]
fn waive_fine() {
    let f = fixture();
    f.desk.issue(None, "S1", "B1").unwrap();
    f.clock.advance(16);
    let fine = f.desk.return_copy(None, "S1", "B1").unwrap().fine.unwrap();

    assert_eq!(
        f.desk.waive_fine(Some(&f.clerk), fine.fine_id).unwrap().status,
        FineStatus::Waived
    );
    assert_eq!(
        f.desk.pay_fine(None, fine.fine_id),
        Err(CirculationError::FineAlreadyTerminal(FineStatus::Waived))
    );
    assert_eq!(
        f.desk.ledger().outstanding_for_member(fine.member_id).unwrap(),
        Decimal::ZERO
    );
}

// =============================================================================
// Catalog maintenance
// =============================================================================

#[test]
fn copies_are_numbered_per_book() {
    let f = fixture();
    let other = f.desk.register_book(NewBook::titled("Emma")).unwrap();
    let first = f.desk.register_copy(other.book_id, "E1").unwrap();
    let third = f.desk.register_copy(f.book, "B3").unwrap();

    assert_eq!(first.copy_number, 1);
    assert_eq!(third.copy_number, 3);
    let numbers: Vec<_> = f
        .desk
        .copies_of_book(f.book)
        .unwrap()
        .iter()
        .map(|copy| copy.copy_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn available_copies_skip_issued_and_damaged() {
    let f = fixture();
    f.desk
        .add_copy(NewCopy {
            status: CopyStatus::Damaged,
            ..NewCopy::available(f.book, "B3")
        })
        .unwrap();
    f.desk.issue(None, "S1", "B1").unwrap();

    let available: Vec<_> = f
        .desk
        .available_copies(f.book)
        .unwrap()
        .into_iter()
        .map(|copy| copy.barcode)
        .collect();
    assert_eq!(available, vec!["B2".to_string()]);

    let book = f.desk.engine().reconcile_book(f.book).unwrap();
    assert_eq!(book.total_quantity, 3);
    assert_eq!(book.available_quantity, 1);
}

#[test]
fn duplicate_keys_are_refused() {
    let f = fixture();
    assert!(matches!(
        f.desk.register_copy(f.book, "B1"),
        Err(CirculationError::Storage(StoreError::UniqueViolation(_)))
    ));
    assert!(matches!(
        f.desk.register_member(NewMember::with_student_id("S1")),
        Err(CirculationError::Storage(StoreError::UniqueViolation(_)))
    ));
    assert_eq!(
        f.desk.register_copy(BookId(99), "X1").map(|_| ()),
        Err(CirculationError::BookNotFound)
    );
    assert_eq!(
        f.desk.copies_of_book(BookId(99)),
        Err(CirculationError::BookNotFound)
    );
}

// =============================================================================
// Auditing
// =============================================================================

#[test]
fn committed_changes_are_audited() {
    let f = fixture();
    let clerk = Some(&f.clerk);
    let issued = f.desk.issue(clerk, "S1", "B1").unwrap();
    f.clock.advance(18);
    let returned = f.desk.return_copy(clerk, "S1", "B1").unwrap();
    let fine = returned.fine.unwrap();
    f.desk.pay_fine(None, fine.fine_id).unwrap();

    let entries: Vec<_> = f
        .log
        .entries()
        .into_iter()
        .map(|entry| (entry.action, entry.target))
        .collect();
    assert_eq!(
        entries,
        vec![
            (AuditAction::FinePaid, AuditTarget::Fine(fine.fine_id)),
            (AuditAction::Return, AuditTarget::Copy(issued.loan.copy_id)),
            (AuditAction::FineCreated, AuditTarget::Issue(issued.loan.issue_id)),
            (AuditAction::Issue, AuditTarget::Copy(issued.loan.copy_id)),
        ]
    );
    assert_eq!(f.log.by_actor(&f.clerk).len(), 3);
    assert_eq!(f.log.by_action(AuditAction::FinePaid)[0].actor, None);
}

#[test]
fn rejected_operations_are_not_audited() {
    let f = fixture();
    let _ = f.desk.return_copy(Some(&f.clerk), "S1", "B1");
    let _ = f.desk.issue(Some(&f.clerk), "S9", "B1");
    assert!(f.log.is_empty());
}

#[test]
fn failing_audit_sink_does_not_fail_the_operation() {
    let f = fixture_with(CirculationConfig::default(), Some(Arc::new(BrokenSink)));
    f.desk.issue(None, "S1", "B1").unwrap();
    f.clock.advance(25);

    let returned = f.desk.return_copy(None, "S1", "B1").unwrap();

    assert!(returned.fine.is_some());
    assert!(f.log.is_empty());
    f.store.verify_integrity().unwrap();
}

#[test]
fn channel_sink_feeds_a_writer() {
    let (sink, receiver) = ChannelAuditSink::bounded(16);
    let f = fixture_with(CirculationConfig::default(), Some(Arc::new(sink)));
    f.desk.issue(Some(&f.clerk), "S2", "B2").unwrap();

    let entry = receiver.try_recv().unwrap();
    assert_eq!(entry.action, AuditAction::Issue);
    assert_eq!(entry.actor, Some(f.clerk.clone()));
    assert!(receiver.try_recv().is_err());
}

#[test]
fn lost_copy_leaves_the_shelf_and_comes_back() {
    let f = fixture();
    let clerk = Some(&f.clerk);

    let lost = f.desk.mark_copy(clerk, "B2", CopyStatus::Lost).unwrap();
    assert_eq!(lost.status, CopyStatus::Lost);
    assert_eq!(f.desk.engine().reconcile_book(f.book).unwrap().available_quantity, 1);
    f.store.verify_integrity().unwrap();

    f.desk.mark_copy(clerk, "B2", CopyStatus::Damaged).unwrap();
    assert_eq!(f.desk.engine().reconcile_book(f.book).unwrap().available_quantity, 1);

    let found = f.desk.mark_copy(clerk, "B2", CopyStatus::Available).unwrap();
    assert!(found.is_available());
    let book = f.desk.engine().reconcile_book(f.book).unwrap();
    assert_eq!(book.available_quantity, 2);
    assert_eq!(book.total_quantity, 2);
    f.store.verify_integrity().unwrap();

    let updates = f.log.by_action(AuditAction::CopyUpdated);
    assert_eq!(updates.len(), 3);
    assert_eq!(updates[0].target, AuditTarget::Copy(found.copy_id));
    assert_eq!(updates[0].actor.as_ref(), Some(&f.clerk));
}

#[test]
fn copy_on_loan_cannot_be_marked() {
    let f = fixture();
    f.desk.issue(None, "S1", "B1").unwrap();

    assert_eq!(
        f.desk.mark_copy(None, "B1", CopyStatus::Lost).map(|_| ()),
        Err(CirculationError::CopyOnLoan)
    );
    assert_eq!(f.desk.engine().reconcile_book(f.book).unwrap().available_quantity, 1);
    f.store.verify_integrity().unwrap();
}

#[test]
fn issued_status_is_reserved_for_circulation() {
    let f = fixture();
    assert_eq!(
        f.desk.mark_copy(None, "B1", CopyStatus::Issued).map(|_| ()),
        Err(CirculationError::StatusReserved(CopyStatus::Issued))
    );
    assert_eq!(
        f.desk.mark_copy(None, "B9", CopyStatus::Lost).map(|_| ()),
        Err(CirculationError::CopyNotFound)
    );
    let copy = f.desk.engine().copy_by_barcode("B1").unwrap();
    assert!(f.desk.engine().is_copy_available(copy.copy_id).unwrap());
    assert!(f.log.by_action(AuditAction::CopyUpdated).is_empty());
    f.store.verify_integrity().unwrap();
}
