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

//! # Library Circulation
//!
//! This library issues and returns physical book copies and manages the fines
//! charged for overdue returns.
//!
//! ## Core Components
//!
//! - [`CirculationEngine`]: Copy issue/return state machine
//! - [`policy`]: Pure overdue-fine computation
//! - [`FineLedger`]: Fine recording and settlement
//! - [`CirculationDesk`]: Clerk workflow by student id and barcode, with auditing
//! - [`CatalogStore`]: Transactional record store the engine runs against
//! - [`CirculationError`]: Error types for rejected or failed operations
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use library_circulation::{
//!     CirculationEngine, CirculationError, FixedClock, MemoryStore, NewBook, NewCopy, NewMember,
//!     CatalogStore, StoreError,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! let (member, copy) = store
//!     .atomic(|tx| {
//!         let member = tx.insert_member(NewMember::with_student_id("S1"))?;
//!         let book = tx.insert_book(NewBook::titled("Dune"))?;
//!         let copy = tx.insert_copy(NewCopy::available(book.book_id, "B1"))?;
//!         Ok::<_, StoreError>((member, copy))
//!     })
//!     .unwrap();
//!
//! let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
//! let engine = CirculationEngine::new(store, clock);
//!
//! let loan = engine.issue_copy(member.member_id, copy.copy_id).unwrap();
//! assert_eq!(loan.due_date, NaiveDate::from_ymd_opt(2025, 1, 16).unwrap());
//!
//! // One copy, one borrower.
//! assert_eq!(
//!     engine.issue_copy(member.member_id, copy.copy_id),
//!     Err(CirculationError::CopyNotAvailable)
//! );
//! ```
//!
//! ## Thread Safety
//!
//! Engines, ledgers and desks are `Sync` and hold no locks themselves; each
//! operation runs as one atomic unit of the store, which serializes
//! conflicting units.

pub mod audit;
mod base;
pub mod catalog;
pub mod clock;
pub mod config;
mod desk;
mod engine;
pub mod error;
pub mod fine;
mod ledger;
pub mod loan;
pub mod policy;
pub mod store;

pub use crate::config::{CirculationConfig, ConfigError};
pub use audit::{
    AuditAction, AuditEntry, AuditError, AuditSink, AuditTarget, ChannelAuditSink,
    MemoryAuditLog, TracingAuditSink,
};
pub use base::{ActorId, BookId, CopyId, FineId, IssueId, MemberId};
pub use catalog::{Book, BookCopy, CopyStatus, Member, NewBook, NewCopy, NewMember};
pub use clock::{Clock, FixedClock, SystemClock};
pub use desk::{CirculationDesk, IssueReceipt, ReturnReceipt};
pub use engine::CirculationEngine;
pub use error::{CirculationError, ErrorKind, IntegrityFault, StoreError};
pub use fine::{Fine, FineStatus, NewFine};
pub use ledger::FineLedger;
pub use loan::{IssueTransaction, LoanStatus, NewIssue};
pub use policy::FineAssessment;
pub use store::{CatalogStore, CatalogTx, MemoryStore};
