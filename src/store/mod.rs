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

//! Catalog store interface.
//!
//! The store is the authority for every record the engine touches. All access
//! goes through an atomic unit opened with [`CatalogStore::atomic`]: the
//! closure receives a [`CatalogTx`] and either returns `Ok`, committing every
//! write it made, or `Err`, discarding all of them. Implementations must
//! isolate concurrent units so that a check made inside a unit still holds
//! when the unit's writes commit.

mod memory;

pub use memory::{DEFAULT_LOCK_TIMEOUT, MemoryStore};

use crate::base::{BookId, CopyId, FineId, IssueId, MemberId};
use crate::catalog::{Book, BookCopy, CopyStatus, Member, NewBook, NewCopy, NewMember};
use crate::error::StoreError;
use crate::fine::{Fine, FineStatus, NewFine};
use crate::loan::{IssueTransaction, NewIssue};

/// Record access available inside one atomic unit.
///
/// Inserts return the stored record with its store-assigned identity.
/// Updates addressing a missing row fail with [`StoreError::NoRowAffected`].
pub trait CatalogTx {
    fn member(&self, id: MemberId) -> Result<Option<Member>, StoreError>;
    fn member_by_student_id(&self, student_id: &str) -> Result<Option<Member>, StoreError>;
    /// Fails with [`StoreError::UniqueViolation`] on a duplicate student id.
    fn insert_member(&mut self, member: NewMember) -> Result<Member, StoreError>;

    fn book(&self, id: BookId) -> Result<Option<Book>, StoreError>;
    fn insert_book(&mut self, book: NewBook) -> Result<Book, StoreError>;
    /// Adds `delta` to the book's available quantity and returns the updated
    /// book. Results outside `[0, total_quantity]` fail with
    /// [`StoreError::ConstraintViolation`].
    fn adjust_available_quantity(&mut self, id: BookId, delta: i32) -> Result<Book, StoreError>;

    fn copy(&self, id: CopyId) -> Result<Option<BookCopy>, StoreError>;
    fn copy_by_barcode(&self, barcode: &str) -> Result<Option<BookCopy>, StoreError>;
    /// Copies of a book ordered by copy number.
    fn copies_of_book(&self, book_id: BookId) -> Result<Vec<BookCopy>, StoreError>;
    /// Registers a copy under its book, assigning the next copy number and
    /// bumping the book's total (and available, for shelf-ready copies)
    /// quantity. Fails with [`StoreError::UniqueViolation`] on a duplicate
    /// barcode.
    fn insert_copy(&mut self, copy: NewCopy) -> Result<BookCopy, StoreError>;
    fn update_copy_status(&mut self, id: CopyId, status: CopyStatus) -> Result<(), StoreError>;

    fn issue(&self, id: IssueId) -> Result<Option<IssueTransaction>, StoreError>;
    fn insert_issue(&mut self, issue: NewIssue) -> Result<IssueTransaction, StoreError>;
    /// Persists the return date and status of an existing loan.
    fn update_issue(&mut self, issue: &IssueTransaction) -> Result<(), StoreError>;
    /// Every open loan referencing the copy. More than one is a fault for the
    /// caller to surface, so the store must not truncate the result.
    fn open_issues_for_copy(&self, copy_id: CopyId) -> Result<Vec<IssueTransaction>, StoreError>;
    fn count_open_issues_for_member(&self, member_id: MemberId) -> Result<usize, StoreError>;

    fn fine(&self, id: FineId) -> Result<Option<Fine>, StoreError>;
    fn fine_for_issue(&self, issue_id: IssueId) -> Result<Option<Fine>, StoreError>;
    /// Creates an `Unpaid` fine. Fails with [`StoreError::UniqueViolation`]
    /// when the issue already carries a fine.
    fn insert_fine(&mut self, fine: NewFine) -> Result<Fine, StoreError>;
    fn update_fine_status(&mut self, id: FineId, status: FineStatus) -> Result<(), StoreError>;
    fn fines_for_member(&self, member_id: MemberId) -> Result<Vec<Fine>, StoreError>;
}

/// A transactional store for catalog, loan and fine records.
pub trait CatalogStore: Send + Sync {
    /// Runs `work` as one atomic unit.
    ///
    /// On `Err` every write made through the [`CatalogTx`] is rolled back
    /// before the error is returned.
    fn atomic<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn CatalogTx) -> Result<T, E>,
        E: From<StoreError>;

    /// Runs read-only `work` against a consistent view of the store.
    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn CatalogTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.atomic(|tx| work(&*tx))
    }
}
