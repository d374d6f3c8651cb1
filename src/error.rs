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

//! Error types for circulation and fine processing.
//!
//! Every failure falls into one of four [`ErrorKind`]s. Only
//! [`ErrorKind::StorageFailure`] is worth retrying, and only by re-running the
//! whole operation: the atomic unit that failed has already been rolled back.

use crate::base::{BookId, CopyId, FineId, MemberId};
use crate::catalog::CopyStatus;
use crate::fine::FineStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by a catalog store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The store gave up waiting for a lock or a response
    #[error("storage operation timed out")]
    Timeout,

    /// An insert collided with a unique index
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A write would break a column constraint
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    /// An update addressed a row that does not exist
    #[error("no row affected: {0}")]
    NoRowAffected(String),
}

/// Evidence that a stored invariant was already broken by an earlier bug.
///
/// These are never coerced to a default; the operation that tripped over one
/// is rolled back and the fault is logged at error level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFault {
    #[error("copy {copy_id} has {count} open issue transactions")]
    MultipleOpenIssues { copy_id: CopyId, count: usize },

    #[error("available quantity of book {book_id} would become {attempted} (total {total})")]
    AvailableQuantityOutOfRange {
        book_id: BookId,
        attempted: i64,
        total: u32,
    },

    #[error("book {book_id} records {recorded} available copies but {actual} are available")]
    AvailableQuantityDrift {
        book_id: BookId,
        recorded: u32,
        actual: u32,
    },

    #[error("member {member_id} holds {count} open issue transactions")]
    MultipleActiveLoans { member_id: MemberId, count: usize },

    #[error("copy {copy_id} is {status} which disagrees with its loan records")]
    CopyStateMismatch { copy_id: CopyId, status: CopyStatus },

    #[error("copy {copy_id} belongs to missing book {book_id}")]
    MissingBook { copy_id: CopyId, book_id: BookId },
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PolicyViolation,
    IntegrityFault,
    StorageFailure,
}

/// Circulation and fine processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CirculationError {
    #[error("member not found")]
    MemberNotFound,

    #[error("book copy not found")]
    CopyNotFound,

    #[error("book not found")]
    BookNotFound,

    #[error("issue transaction not found")]
    IssueNotFound,

    #[error("fine not found")]
    FineNotFound,

    /// Copy is issued, lost or damaged
    #[error("book copy is not available")]
    CopyNotAvailable,

    /// Single-loan policy
    #[error("member already has an issued book")]
    MemberHasActiveLoan,

    #[error("issue transaction already returned")]
    AlreadyReturned,

    /// Returned copy has no open issue transaction
    #[error("book copy is not currently issued")]
    CopyNotIssued,

    #[error("book copy is issued to another member ({holder})")]
    IssuedToDifferentMember { holder: MemberId },

    /// Copy or book presented with a return does not match the loan
    #[error("copy or book does not match the issue transaction")]
    CopyMismatch,

    #[error("issue transaction has not been returned yet")]
    LoanStillOpen,

    /// Fine amount or overdue days is zero
    #[error("no fine is due")]
    NoFineDue,

    #[error("a fine already exists for this issue ({0})")]
    FineAlreadyExists(FineId),

    #[error("fine is already {0}")]
    FineAlreadyTerminal(FineStatus),

    /// Daily rate times overdue days does not fit a [`Decimal`]
    #[error("fine for {overdue_days} overdue days at {daily_rate} per day overflows")]
    FineAmountOverflow {
        overdue_days: u32,
        daily_rate: Decimal,
    },

    /// Status changes outside circulation are refused while a copy is out
    #[error("book copy is on loan")]
    CopyOnLoan,

    /// Only issuing a copy may mark it issued
    #[error("status {0} is set by circulation only")]
    StatusReserved(CopyStatus),

    #[error("integrity fault: {0}")]
    Integrity(#[from] IntegrityFault),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl CirculationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MemberNotFound
            | Self::CopyNotFound
            | Self::BookNotFound
            | Self::IssueNotFound
            | Self::FineNotFound => ErrorKind::NotFound,
            Self::CopyNotAvailable
            | Self::MemberHasActiveLoan
            | Self::AlreadyReturned
            | Self::CopyNotIssued
            | Self::IssuedToDifferentMember { .. }
            | Self::CopyMismatch
            | Self::LoanStillOpen
            | Self::NoFineDue
            | Self::FineAlreadyExists(_)
            | Self::FineAlreadyTerminal(_)
            | Self::FineAmountOverflow { .. }
            | Self::CopyOnLoan
            | Self::StatusReserved(_) => ErrorKind::PolicyViolation,
            Self::Integrity(_) => ErrorKind::IntegrityFault,
            Self::Storage(_) => ErrorKind::StorageFailure,
        }
    }

    /// Whether re-running the whole operation could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StorageFailure
    }
}
