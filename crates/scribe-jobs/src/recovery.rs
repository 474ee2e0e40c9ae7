//! Startup reconciliation.
//!
//! Run once before the worker starts. Recovers from a crash at any point in
//! the pipeline:
//! - the in-process vector index is rebuilt from embedding records (the
//!   record of truth), so index/record divergence cannot survive a restart;
//! - jobs left `Running` by a dead process return to `Pending`;
//! - non-terminal notes with no live job are re-enqueued at the stage their
//!   status implies (a verb status is treated as pending again; adapter
//!   calls are at-least-once);
//! - indexed notes missing their current-model record re-run the embed
//!   stage (targeted repair rather than a full pipeline re-run).

use tracing::info;

use scribe_core::{defaults, Error, Result, Stage};
use scribe_db::Database;
use scribe_search::VectorIndex;

/// What the reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries in the rebuilt vector index.
    pub index_entries: usize,
    /// Orphaned running jobs returned to pending.
    pub jobs_reset: i64,
    /// Notes re-enqueued at their pending stage.
    pub reenqueued: usize,
    /// Indexed notes scheduled for embed-stage repair.
    pub repaired: usize,
}

/// Reconcile persistent state after a restart.
pub async fn reconcile(
    db: &Database,
    index: &VectorIndex,
    model_version: &str,
) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    let seeds = db.embeddings.index_seeds(model_version).await?;
    report.index_entries = index.rebuild(seeds)?;

    report.jobs_reset = db.jobs.reset_running().await?;

    for note in db.notes.list_unfinished().await? {
        if db.jobs.active_for_note(note.id).await?.is_some() {
            continue;
        }
        let Some(stage) = note.status.pending_stage() else {
            continue;
        };
        match db.jobs.enqueue(note.id, stage, stage.default_priority()).await {
            Ok(_) => report.reenqueued += 1,
            Err(Error::Conflict(_)) | Err(Error::NoteNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    for note_id in db.notes.list_indexed_without_record(model_version).await? {
        match db
            .jobs
            .enqueue(note_id, Stage::Embed, defaults::MAINTENANCE_PRIORITY)
            .await
        {
            Ok(_) => report.repaired += 1,
            Err(Error::Conflict(_)) | Err(Error::NoteNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    info!(
        index_entries = report.index_entries,
        jobs_reset = report.jobs_reset,
        reenqueued = report.reenqueued,
        repaired = report.repaired,
        "Startup reconciliation complete"
    );
    Ok(report)
}
