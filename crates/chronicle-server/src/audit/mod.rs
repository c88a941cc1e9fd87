//! Activity log capture
//!
//! Observes every mutating operation on an instrumented collection,
//! reconstructs a before/after delta of the touched fields, correlates the
//! mutation with the originating request, and appends one record to the
//! `activity_logs` collection.
//!
//! # Architecture
//!
//! Three cooperating pieces:
//!
//! - [`AuditedCollection`] wraps a collection's write methods: a pre-write
//!   step snapshots the fields a pending update touches, and a post-write
//!   step hands the result to the recorder on a detached task.
//! - The diff engine computes which top-level keys were added, changed, or
//!   removed between the snapshot and the requested state.
//! - [`ActivityLogRecorder`] applies the skip rules, sanitizes the request
//!   payload, extracts target identity, and writes through an [`AuditSink`].
//!
//! The audit trail is best-effort by contract: a snapshot read failure,
//! missing request context, malformed document, or sink outage is logged to
//! diagnostics and swallowed. The primary write never waits for, retries
//! because of, or fails due to recording.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use chronicle_server::audit::{
//!     ActivityLogRecorder, AuditedCollection, MemoryAuditSink, RequestContext, SnapshotCache,
//! };
//! use chronicle_server::store::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let recorder = Arc::new(ActivityLogRecorder::new(Arc::new(MemoryAuditSink::new())));
//! let snapshots = Arc::new(SnapshotCache::default());
//!
//! let users = AuditedCollection::new("users", store, recorder, snapshots);
//! let ctx = RequestContext::background();
//! users.insert_one(&ctx, serde_json::Map::new()).await?;
//! # Ok(())
//! # }
//! ```

mod context;
mod diff;
mod intercept;
mod models;
mod recorder;
mod sink;
mod snapshot;

#[cfg(test)]
mod recorder_tests;

pub use context::{RequestContext, UserIdentity, VARIABLES_KEY};
pub use intercept::AuditedCollection;
pub use models::{
    ActivityLog, ActivityLogQuery, ChangeOrigin, Changes, LogAction, MutationEvent,
    NewActivityLog, ACTIVITY_LOG_COLLECTION, DEFAULT_LOG_QUERY_LIMIT, MAX_LOG_QUERY_LIMIT,
};
pub use recorder::{ActivityLogRecorder, REDACTION_MARKER};
pub use sink::{AuditSink, MemoryAuditSink, PgAuditSink, SinkError, SinkResult};
pub use snapshot::{SnapshotCache, DEFAULT_SNAPSHOT_TTL};
