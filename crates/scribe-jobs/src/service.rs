//! Externally visible note operations.
//!
//! This is the surface any transport (HTTP, RPC, in-process) wraps: upload,
//! edit, delete, status, and the maintenance re-embed after a model upgrade.
//! Edits and uploads return immediately; callers poll `note_status` while
//! the pipeline works.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use scribe_core::{
    defaults, CreateNoteRequest, EditNoteRequest, Error, Note, NoteStatusInfo, Result, Stage,
};
use scribe_db::Database;
use scribe_search::VectorIndex;

/// External trigger surface consumed by the API layer.
pub struct NoteService {
    db: Database,
    index: Arc<VectorIndex>,
}

impl NoteService {
    pub fn new(db: Database, index: Arc<VectorIndex>) -> Self {
        Self { db, index }
    }

    /// Create a note for uploaded audio and enqueue its first pipeline
    /// stage. Rejects with [`Error::Backpressure`] when the queue is full;
    /// the caller should retry later.
    pub async fn upload_audio(&self, owner_id: Uuid, audio_ref: &str) -> Result<Uuid> {
        if audio_ref.is_empty() {
            return Err(Error::InvalidInput("audio_ref must not be empty".into()));
        }
        let note = self
            .db
            .notes
            .create(CreateNoteRequest {
                owner_id,
                audio_ref: audio_ref.to_string(),
            })
            .await?;
        info!(note_id = %note.id, "Accepted upload");
        Ok(note.id)
    }

    /// Apply an external edit and schedule re-embedding. Asynchronous: the
    /// note returns in `EmbeddingPending`; conflicts are reported while a
    /// job is in flight.
    pub async fn edit_note(&self, note_id: Uuid, req: EditNoteRequest) -> Result<Note> {
        let note = self.db.notes.apply_edit(note_id, req).await?;
        info!(%note_id, "Edit accepted; re-embedding scheduled");
        Ok(note)
    }

    /// Delete a note. The job is cancelled and the embedding records and
    /// vector index entry are gone before this returns.
    pub async fn delete_note(&self, note_id: Uuid) -> Result<()> {
        self.db.notes.delete(note_id).await?;
        self.index.remove(note_id);
        info!(%note_id, "Note deleted");
        Ok(())
    }

    /// Status + error info for polling.
    pub async fn note_status(&self, note_id: Uuid) -> Result<NoteStatusInfo> {
        self.db.notes.status_info(note_id).await
    }

    /// Queue a maintenance re-embed for every indexed note lacking a record
    /// for `model_version`. Runs below user-initiated work; notes with a
    /// live job are skipped and picked up by a later pass.
    pub async fn reembed_all(&self, model_version: &str) -> Result<usize> {
        let candidates = self.db.notes.list_indexed_without_record(model_version).await?;
        let mut queued = 0;
        for note_id in candidates {
            match self
                .db
                .jobs
                .enqueue(note_id, Stage::Embed, defaults::MAINTENANCE_PRIORITY)
                .await
            {
                Ok(_) => queued += 1,
                Err(Error::Conflict(_)) | Err(Error::NoteNotFound(_)) => {
                    warn!(%note_id, "Skipped busy note during re-embed sweep");
                }
                Err(e) => return Err(e),
            }
        }
        info!(queued, model = model_version, "Re-embed sweep queued");
        Ok(queued)
    }
}
