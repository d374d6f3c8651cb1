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

//! Audit sinks.
//!
//! The desk reports every committed state change to an [`AuditSink`] after
//! the store unit has committed. A sink failure never reaches the caller of
//! the business operation.

use crate::base::{ActorId, CopyId, FineId, IssueId};
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Issue,
    Return,
    FineCreated,
    FinePaid,
    FineWaived,
    CopyUpdated,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Issue => "ISSUE",
            Self::Return => "RETURN",
            Self::FineCreated => "FINE_CREATED",
            Self::FinePaid => "FINE_PAID",
            Self::FineWaived => "FINE_WAIVED",
            Self::CopyUpdated => "COPY_UPDATED",
        })
    }
}

/// The record an action was applied to, rendered as `KIND:id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditTarget {
    Copy(CopyId),
    Issue(IssueId),
    Fine(FineId),
}

impl fmt::Display for AuditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy(id) => write!(f, "COPY:{id}"),
            Self::Issue(id) => write!(f, "ISSUE:{id}"),
            Self::Fine(id) => write!(f, "FINE:{id}"),
        }
    }
}

impl Serialize for AuditTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    /// `None` for system-initiated actions.
    pub actor: Option<ActorId>,
    pub action: AuditAction,
    pub target: AuditTarget,
    pub logged_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit queue is full")]
    QueueFull,
}

/// Append-only destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn record(
        &self,
        actor: Option<&ActorId>,
        action: AuditAction,
        target: AuditTarget,
    ) -> Result<(), AuditError>;
}

/// Emits each entry as a `tracing` event on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(
        &self,
        actor: Option<&ActorId>,
        action: AuditAction,
        target: AuditTarget,
    ) -> Result<(), AuditError> {
        let actor = actor.map_or("system", |actor| actor.0.as_str());
        tracing::info!(target: "audit", actor, %action, object = %target, "audit");
        Ok(())
    }
}

/// Keeps entries in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All entries, newest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().iter().rev().cloned().collect()
    }

    pub fn by_actor(&self, actor: &ActorId) -> Vec<AuditEntry> {
        self.filtered(|entry| entry.actor.as_ref() == Some(actor))
    }

    pub fn by_action(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.filtered(|entry| entry.action == action)
    }

    /// Entries logged within `[from, to]`, newest first.
    pub fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<AuditEntry> {
        self.filtered(|entry| from <= entry.logged_at && entry.logged_at <= to)
    }

    fn filtered(&self, keep: impl Fn(&AuditEntry) -> bool) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .rev()
            .filter(|entry| keep(entry))
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(
        &self,
        actor: Option<&ActorId>,
        action: AuditAction,
        target: AuditTarget,
    ) -> Result<(), AuditError> {
        self.entries.write().push(AuditEntry {
            actor: actor.cloned(),
            action,
            target,
            logged_at: Utc::now(),
        });
        Ok(())
    }
}

/// Hands entries to a background writer over a bounded channel.
///
/// Recording never blocks: a full queue or a departed writer is reported as
/// an error, which the desk logs and drops.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: Sender<AuditEntry>,
}

impl ChannelAuditSink {
    /// Creates a sink and the receiving end for its writer.
    pub fn bounded(capacity: usize) -> (Self, Receiver<AuditEntry>) {
        let (sender, receiver) = channel::bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(
        &self,
        actor: Option<&ActorId>,
        action: AuditAction,
        target: AuditTarget,
    ) -> Result<(), AuditError> {
        let entry = AuditEntry {
            actor: actor.cloned(),
            action,
            target,
            logged_at: Utc::now(),
        };
        self.sender.try_send(entry).map_err(|error| match error {
            TrySendError::Full(_) => AuditError::QueueFull,
            TrySendError::Disconnected(_) => {
                AuditError::Unavailable("audit writer disconnected".to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_render_as_kind_and_id() {
        assert_eq!(AuditTarget::Copy(CopyId(3)).to_string(), "COPY:3");
        assert_eq!(AuditTarget::Issue(IssueId(8)).to_string(), "ISSUE:8");
        assert_eq!(AuditTarget::Fine(FineId(1)).to_string(), "FINE:1");
    }

    #[test]
    fn memory_log_filters_newest_first() {
        let log = MemoryAuditLog::new();
        let clerk = ActorId::new("clerk");
        log.record(Some(&clerk), AuditAction::Issue, AuditTarget::Copy(CopyId(1)))
            .unwrap();
        log.record(None, AuditAction::FineCreated, AuditTarget::Issue(IssueId(1)))
            .unwrap();
        log.record(Some(&clerk), AuditAction::Return, AuditTarget::Copy(CopyId(1)))
            .unwrap();

        let by_clerk = log.by_actor(&clerk);
        assert_eq!(by_clerk.len(), 2);
        assert_eq!(by_clerk[0].action, AuditAction::Return);
        assert_eq!(log.by_action(AuditAction::FineCreated)[0].actor, None);
        assert_eq!(log.entries().len(), 3);
    }

    #[test]
    fn memory_log_window_is_inclusive() {
        let log = MemoryAuditLog::new();
        for copy in 1..=3 {
            log.record(None, AuditAction::CopyUpdated, AuditTarget::Copy(CopyId(copy)))
                .unwrap();
        }
        let all = log.entries();
        let newest = all[0].logged_at;
        let oldest = all[2].logged_at;

        assert_eq!(log.between(oldest, newest), all);
        assert!(
            log.between(oldest, oldest)
                .iter()
                .any(|entry| entry.target == AuditTarget::Copy(CopyId(1)))
        );
        let later = newest + chrono::TimeDelta::seconds(1);
        assert!(log.between(later, later + chrono::TimeDelta::seconds(1)).is_empty());
        assert!(log.between(newest, oldest - chrono::TimeDelta::seconds(1)).is_empty());
    }

    #[test]
    fn channel_sink_reports_backpressure() {
        let (sink, receiver) = ChannelAuditSink::bounded(1);
        let target = AuditTarget::Fine(FineId(1));
        sink.record(None, AuditAction::FinePaid, target).unwrap();
        assert_eq!(
            sink.record(None, AuditAction::FinePaid, target),
            Err(AuditError::QueueFull)
        );
        assert_eq!(receiver.recv().unwrap().target, target);
        drop(receiver);
        assert!(matches!(
            sink.record(None, AuditAction::FinePaid, target),
            Err(AuditError::Unavailable(_))
        ));
    }

    #[test]
    fn entries_serialize_with_rendered_target() {
        let log = MemoryAuditLog::new();
        log.record(None, AuditAction::FineWaived, AuditTarget::Fine(FineId(4)))
            .unwrap();
        let json = serde_json::to_value(&log.entries()[0]).unwrap();
        assert_eq!(json["action"], "FINE_WAIVED");
        assert_eq!(json["target"], "FINE:4");
        assert_eq!(AuditAction::CopyUpdated.to_string(), "COPY_UPDATED");
        assert!(json["actor"].is_null());
    }
}
