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

//! In-memory catalog store.
//!
//! Units are serialized behind a single [`Mutex`], which gives every unit a
//! serializable view of the tables. Each write records the row's previous
//! state in an undo journal; a unit that returns `Err` (or panics) replays
//! the journal in reverse before the lock is released. Identity sequences
//! are never rolled back, matching auto-increment columns. A unit that cannot
//! take the lock within the store's timeout fails with [`StoreError::Timeout`].

use super::{CatalogStore, CatalogTx};
use crate::base::{BookId, CopyId, FineId, IssueId, MemberId};
use crate::catalog::{Book, BookCopy, CopyStatus, Member, NewBook, NewCopy, NewMember};
use crate::error::{IntegrityFault, StoreError};
use crate::fine::{Fine, FineStatus, NewFine};
use crate::loan::{IssueTransaction, LoanStatus, NewIssue};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// How long a unit waits for the tables before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Sequences {
    book: u32,
    copy: u32,
    member: u32,
    issue: u32,
    fine: u32,
}

fn next(counter: &mut u32) -> u32 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default)]
struct Tables {
    books: BTreeMap<BookId, Book>,
    copies: BTreeMap<CopyId, BookCopy>,
    members: BTreeMap<MemberId, Member>,
    issues: BTreeMap<IssueId, IssueTransaction>,
    fines: BTreeMap<FineId, Fine>,
    /// Unique index on `BookCopy::barcode`.
    barcodes: HashMap<String, CopyId>,
    /// Unique index on `Member::student_id`.
    student_ids: HashMap<String, MemberId>,
    /// Unique index on `Fine::issue_id`.
    fines_by_issue: HashMap<IssueId, FineId>,
    sequences: Sequences,
}

impl Tables {
    fn restore_book(&mut self, id: BookId, previous: Option<Book>) {
        match previous {
            Some(book) => self.books.insert(id, book),
            None => self.books.remove(&id),
        };
    }

    fn restore_copy(&mut self, id: CopyId, previous: Option<BookCopy>) {
        if let Some(current) = self.copies.remove(&id) {
            self.barcodes.remove(&current.barcode);
        }
        if let Some(copy) = previous {
            self.barcodes.insert(copy.barcode.clone(), id);
            self.copies.insert(id, copy);
        }
    }

    fn restore_member(&mut self, id: MemberId, previous: Option<Member>) {
        if let Some(current) = self.members.remove(&id) {
            self.student_ids.remove(&current.student_id);
        }
        if let Some(member) = previous {
            self.student_ids.insert(member.student_id.clone(), id);
            self.members.insert(id, member);
        }
    }

    fn restore_issue(&mut self, id: IssueId, previous: Option<IssueTransaction>) {
        match previous {
            Some(issue) => self.issues.insert(id, issue),
            None => self.issues.remove(&id),
        };
    }

    fn restore_fine(&mut self, id: FineId, previous: Option<Fine>) {
        if let Some(current) = self.fines.remove(&id) {
            self.fines_by_issue.remove(&current.issue_id);
        }
        if let Some(fine) = previous {
            self.fines_by_issue.insert(fine.issue_id, id);
            self.fines.insert(id, fine);
        }
    }

    fn open_issues_for_copy(&self, copy_id: CopyId) -> Vec<IssueTransaction> {
        self.issues
            .values()
            .filter(|issue| issue.copy_id == copy_id && issue.status == LoanStatus::Issued)
            .cloned()
            .collect()
    }
}

/// Row state captured before a write.
#[derive(Debug)]
enum Undo {
    Book(BookId, Option<Book>),
    Copy(CopyId, Option<BookCopy>),
    Member(MemberId, Option<Member>),
    Issue(IssueId, Option<IssueTransaction>),
    Fine(FineId, Option<Fine>),
}

struct MemoryTx<'a> {
    tables: &'a mut Tables,
    journal: Vec<Undo>,
    committed: bool,
}

impl<'a> MemoryTx<'a> {
    fn begin(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            journal: Vec::new(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Book(id, previous) => self.tables.restore_book(id, previous),
                Undo::Copy(id, previous) => self.tables.restore_copy(id, previous),
                Undo::Member(id, previous) => self.tables.restore_member(id, previous),
                Undo::Issue(id, previous) => self.tables.restore_issue(id, previous),
                Undo::Fine(id, previous) => self.tables.restore_fine(id, previous),
            }
        }
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

impl CatalogTx for MemoryTx<'_> {
    fn member(&self, id: MemberId) -> Result<Option<Member>, StoreError> {
        Ok(self.tables.members.get(&id).cloned())
    }

    fn member_by_student_id(&self, student_id: &str) -> Result<Option<Member>, StoreError> {
        Ok(self
            .tables
            .student_ids
            .get(student_id)
            .and_then(|id| self.tables.members.get(id))
            .cloned())
    }

    fn insert_member(&mut self, member: NewMember) -> Result<Member, StoreError> {
        if self.tables.student_ids.contains_key(&member.student_id) {
            return Err(StoreError::UniqueViolation(format!(
                "student id {}",
                member.student_id
            )));
        }
        let member_id = MemberId(next(&mut self.tables.sequences.member));
        let row = Member {
            member_id,
            student_id: member.student_id,
            first_name: member.first_name,
            last_name: member.last_name,
            department: member.department,
            status: "ACTIVE".to_string(),
        };
        self.journal.push(Undo::Member(member_id, None));
        self.tables
            .student_ids
            .insert(row.student_id.clone(), member_id);
        self.tables.members.insert(member_id, row.clone());
        Ok(row)
    }

    fn book(&self, id: BookId) -> Result<Option<Book>, StoreError> {
        Ok(self.tables.books.get(&id).cloned())
    }

    fn insert_book(&mut self, book: NewBook) -> Result<Book, StoreError> {
        let book_id = BookId(next(&mut self.tables.sequences.book));
        let row = Book {
            book_id,
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            category: book.category,
            total_quantity: 0,
            available_quantity: 0,
            status: "ACTIVE".to_string(),
        };
        self.journal.push(Undo::Book(book_id, None));
        self.tables.books.insert(book_id, row.clone());
        Ok(row)
    }

    fn adjust_available_quantity(&mut self, id: BookId, delta: i32) -> Result<Book, StoreError> {
        let book = self
            .tables
            .books
            .get_mut(&id)
            .ok_or_else(|| StoreError::NoRowAffected(format!("book {id}")))?;
        let adjusted = i64::from(book.available_quantity) + i64::from(delta);
        if adjusted < 0 || adjusted > i64::from(book.total_quantity) {
            return Err(StoreError::ConstraintViolation(format!(
                "available quantity of book {id} would become {adjusted}"
            )));
        }
        self.journal.push(Undo::Book(id, Some(book.clone())));
        book.available_quantity = adjusted as u32;
        Ok(book.clone())
    }

    fn copy(&self, id: CopyId) -> Result<Option<BookCopy>, StoreError> {
        Ok(self.tables.copies.get(&id).cloned())
    }

    fn copy_by_barcode(&self, barcode: &str) -> Result<Option<BookCopy>, StoreError> {
        Ok(self
            .tables
            .barcodes
            .get(barcode)
            .and_then(|id| self.tables.copies.get(id))
            .cloned())
    }

    fn copies_of_book(&self, book_id: BookId) -> Result<Vec<BookCopy>, StoreError> {
        let mut copies: Vec<BookCopy> = self
            .tables
            .copies
            .values()
            .filter(|copy| copy.book_id == book_id)
            .cloned()
            .collect();
        copies.sort_by_key(|copy| copy.copy_number);
        Ok(copies)
    }

    fn insert_copy(&mut self, copy: NewCopy) -> Result<BookCopy, StoreError> {
        if self.tables.barcodes.contains_key(&copy.barcode) {
            return Err(StoreError::UniqueViolation(format!(
                "barcode {}",
                copy.barcode
            )));
        }
        let book = self
            .tables
            .books
            .get_mut(&copy.book_id)
            .ok_or_else(|| StoreError::NoRowAffected(format!("book {}", copy.book_id)))?;
        self.journal.push(Undo::Book(copy.book_id, Some(book.clone())));
        book.total_quantity += 1;
        if copy.status == CopyStatus::Available {
            book.available_quantity += 1;
        }
        let copy_number = book.total_quantity;

        let copy_id = CopyId(next(&mut self.tables.sequences.copy));
        let row = BookCopy {
            copy_id,
            book_id: copy.book_id,
            copy_number,
            barcode: copy.barcode,
            location: copy.location,
            status: copy.status,
        };
        self.journal.push(Undo::Copy(copy_id, None));
        self.tables.barcodes.insert(row.barcode.clone(), copy_id);
        self.tables.copies.insert(copy_id, row.clone());
        Ok(row)
    }

    fn update_copy_status(&mut self, id: CopyId, status: CopyStatus) -> Result<(), StoreError> {
        let copy = self
            .tables
            .copies
            .get_mut(&id)
            .ok_or_else(|| StoreError::NoRowAffected(format!("copy {id}")))?;
        self.journal.push(Undo::Copy(id, Some(copy.clone())));
        copy.status = status;
        Ok(())
    }

    fn issue(&self, id: IssueId) -> Result<Option<IssueTransaction>, StoreError> {
        Ok(self.tables.issues.get(&id).cloned())
    }

    fn insert_issue(&mut self, issue: NewIssue) -> Result<IssueTransaction, StoreError> {
        let issue_id = IssueId(next(&mut self.tables.sequences.issue));
        let row = IssueTransaction {
            issue_id,
            member_id: issue.member_id,
            copy_id: issue.copy_id,
            issue_date: issue.issue_date,
            due_date: issue.due_date,
            return_date: None,
            status: LoanStatus::Issued,
        };
        self.journal.push(Undo::Issue(issue_id, None));
        self.tables.issues.insert(issue_id, row.clone());
        Ok(row)
    }

    fn update_issue(&mut self, issue: &IssueTransaction) -> Result<(), StoreError> {
        let row = self
            .tables
            .issues
            .get_mut(&issue.issue_id)
            .ok_or_else(|| StoreError::NoRowAffected(format!("issue {}", issue.issue_id)))?;
        self.journal
            .push(Undo::Issue(issue.issue_id, Some(row.clone())));
        row.return_date = issue.return_date;
        row.status = issue.status;
        Ok(())
    }

    fn open_issues_for_copy(&self, copy_id: CopyId) -> Result<Vec<IssueTransaction>, StoreError> {
        Ok(self.tables.open_issues_for_copy(copy_id))
    }

    fn count_open_issues_for_member(&self, member_id: MemberId) -> Result<usize, StoreError> {
        Ok(self
            .tables
            .issues
            .values()
            .filter(|issue| issue.member_id == member_id && issue.status == LoanStatus::Issued)
            .count())
    }

    fn fine(&self, id: FineId) -> Result<Option<Fine>, StoreError> {
        Ok(self.tables.fines.get(&id).cloned())
    }

    fn fine_for_issue(&self, issue_id: IssueId) -> Result<Option<Fine>, StoreError> {
        Ok(self
            .tables
            .fines_by_issue
            .get(&issue_id)
            .and_then(|id| self.tables.fines.get(id))
            .cloned())
    }

    fn insert_fine(&mut self, fine: NewFine) -> Result<Fine, StoreError> {
        if self.tables.fines_by_issue.contains_key(&fine.issue_id) {
            return Err(StoreError::UniqueViolation(format!(
                "fine for issue {}",
                fine.issue_id
            )));
        }
        let fine_id = FineId(next(&mut self.tables.sequences.fine));
        let row = Fine {
            fine_id,
            issue_id: fine.issue_id,
            member_id: fine.member_id,
            amount: fine.amount,
            daily_rate: fine.daily_rate,
            overdue_days: fine.overdue_days,
            status: FineStatus::Unpaid,
        };
        self.journal.push(Undo::Fine(fine_id, None));
        self.tables.fines_by_issue.insert(row.issue_id, fine_id);
        self.tables.fines.insert(fine_id, row.clone());
        Ok(row)
    }

    fn update_fine_status(&mut self, id: FineId, status: FineStatus) -> Result<(), StoreError> {
        let fine = self
            .tables
            .fines
            .get_mut(&id)
            .ok_or_else(|| StoreError::NoRowAffected(format!("fine {id}")))?;
        self.journal.push(Undo::Fine(id, Some(fine.clone())));
        fine.status = status;
        Ok(())
    }

    fn fines_for_member(&self, member_id: MemberId) -> Result<Vec<Fine>, StoreError> {
        Ok(self
            .tables
            .fines
            .values()
            .filter(|fine| fine.member_id == member_id)
            .cloned()
            .collect())
    }
}

/// Catalog store held entirely in memory.
///
/// Used by the CLI and tests; a relational store implements the same traits
/// with database transactions.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Mutex::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Checks every cross-record invariant over the whole store.
    ///
    /// - a copy is `Issued` iff exactly one open loan references it
    /// - a book's available quantity equals its `Available` copies and never
    ///   exceeds its total
    /// - a member holds at most one open loan
    pub fn verify_integrity(&self) -> Result<(), IntegrityFault> {
        let tables = self.tables.lock();

        for copy in tables.copies.values() {
            let open = tables.open_issues_for_copy(copy.copy_id).len();
            if open > 1 {
                return Err(IntegrityFault::MultipleOpenIssues {
                    copy_id: copy.copy_id,
                    count: open,
                });
            }
            if (copy.status == CopyStatus::Issued) != (open == 1) {
                return Err(IntegrityFault::CopyStateMismatch {
                    copy_id: copy.copy_id,
                    status: copy.status,
                });
            }
            if !tables.books.contains_key(&copy.book_id) {
                return Err(IntegrityFault::MissingBook {
                    copy_id: copy.copy_id,
                    book_id: copy.book_id,
                });
            }
        }

        for book in tables.books.values() {
            let actual = tables
                .copies
                .values()
                .filter(|copy| copy.book_id == book.book_id && copy.is_available())
                .count() as u32;
            if book.available_quantity != actual || actual > book.total_quantity {
                return Err(IntegrityFault::AvailableQuantityDrift {
                    book_id: book.book_id,
                    recorded: book.available_quantity,
                    actual,
                });
            }
        }

        let mut open_by_member: HashMap<MemberId, usize> = HashMap::new();
        for issue in tables.issues.values().filter(|issue| issue.is_open()) {
            *open_by_member.entry(issue.member_id).or_default() += 1;
        }
        if let Some((&member_id, &count)) = open_by_member.iter().find(|(_, count)| **count > 1) {
            return Err(IntegrityFault::MultipleActiveLoans { member_id, count });
        }

        Ok(())
    }
}

impl CatalogStore for MemoryStore {
    fn atomic<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn CatalogTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self
            .tables
            .try_lock_for(self.lock_timeout)
            .ok_or(StoreError::Timeout)?;
        let mut tx = MemoryTx::begin(&mut tables);
        let outcome = work(&mut tx)?;
        tx.commit();
        Ok(outcome)
    }
}
