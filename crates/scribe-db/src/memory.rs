//! Embedded in-memory store implementing the repository traits.
//!
//! Used by tests and by single-process deployments that do not need
//! Postgres durability. All repository handles share one mutex-guarded
//! state, so the cross-entity stage commits are atomic exactly like their
//! SQL-transaction counterparts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use scribe_core::{
    Analysis, CommitOutcome, CreateNoteRequest, EditNoteRequest, EmbeddingOutput,
    EmbeddingRecord, EmbeddingRepository, Error, ExhaustAction, FailureOutcome, IndexSeed, Job,
    JobRepository, JobStatus, Note, NoteRepository, NoteStatus, NoteStatusInfo, QueueStats,
    Result, Stage, StageFailure, Transcript,
};

use crate::StoreConfig;

#[derive(Default)]
struct State {
    notes: HashMap<Uuid, Note>,
    jobs: HashMap<Uuid, Job>,
    records: Vec<EmbeddingRecord>,
}

impl State {
    fn active_job_for(&self, note_id: Uuid) -> Option<&Job> {
        self.jobs
            .values()
            .find(|job| job.note_id == note_id && !job.status.is_terminal())
    }

    fn pending_count(&self) -> i64 {
        self.jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .count() as i64
    }

    fn insert_job(
        &mut self,
        note_id: Uuid,
        stage: Stage,
        priority: i32,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Job {
        let job = Job {
            id: Uuid::new_v4(),
            note_id,
            stage,
            status: JobStatus::Pending,
            priority,
            attempt: 0,
            max_attempts,
            next_attempt_at: now,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        self.jobs.insert(job.id, job.clone());
        job
    }
}

/// In-memory implementation of every repository trait.
#[derive(Clone)]
pub struct MemoryStore {
    config: StoreConfig,
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Gate shared by stage commits: the job must still be running. A
    /// cancelled or vanished job (or note) means the result is discarded.
    fn commit_gate(state: &State, job_id: Uuid, note_id: Uuid) -> Result<Option<CommitOutcome>> {
        match state.jobs.get(&job_id).map(|job| job.status) {
            None | Some(JobStatus::Cancelled) => return Ok(Some(CommitOutcome::Cancelled)),
            Some(JobStatus::Running) => {}
            Some(other) => {
                return Err(Error::Job(format!(
                    "cannot commit job {job_id} in status {other}"
                )))
            }
        }
        if !state.notes.contains_key(&note_id) {
            return Ok(Some(CommitOutcome::Cancelled));
        }
        Ok(None)
    }

    fn mark_job_done(state: &mut State, job_id: Uuid, now: DateTime<Utc>) {
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = JobStatus::Done;
            job.completed_at = Some(now);
        }
    }
}

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn create(&self, req: CreateNoteRequest) -> Result<Note> {
        let now = Utc::now();
        let mut state = self.state();

        let pending = state.pending_count();
        if pending >= self.config.queue_limit {
            return Err(Error::Backpressure {
                pending,
                limit: self.config.queue_limit,
            });
        }

        let note = Note {
            id: Uuid::new_v4(),
            owner_id: req.owner_id,
            status: NoteStatus::Uploaded,
            audio_ref: req.audio_ref,
            transcript: None,
            summary: None,
            tags: Vec::new(),
            language: None,
            duration_secs: None,
            analysis_degraded: false,
            embedding_model_version: None,
            error_kind: None,
            error_message: None,
            retry_count: 0,
            notified_at: None,
            created_at: now,
            updated_at: now,
        };
        state.notes.insert(note.id, note.clone());

        let stage = Stage::Transcribe;
        state.insert_job(
            note.id,
            stage,
            stage.default_priority(),
            self.config.max_stage_attempts,
            now,
        );
        Ok(note)
    }

    async fn fetch(&self, id: Uuid) -> Result<Note> {
        self.state()
            .notes
            .get(&id)
            .cloned()
            .ok_or(Error::NoteNotFound(id))
    }

    async fn status_info(&self, id: Uuid) -> Result<NoteStatusInfo> {
        let note = self.fetch(id).await?;
        Ok(NoteStatusInfo {
            note_id: note.id,
            status: note.status,
            error_kind: note.error_kind,
            error_message: note.error_message,
            retry_count: note.retry_count,
            analysis_degraded: note.analysis_degraded,
            updated_at: note.updated_at,
        })
    }

    async fn begin_stage(&self, job: &Job) -> Result<Note> {
        let mut state = self.state();
        let note = state
            .notes
            .get_mut(&job.note_id)
            .ok_or(Error::NoteNotFound(job.note_id))?;
        note.status = job.stage.running_status();
        note.retry_count = job.attempt;
        note.updated_at = Utc::now();
        Ok(note.clone())
    }

    async fn commit_transcript(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        transcript: &Transcript,
    ) -> Result<CommitOutcome> {
        let now = Utc::now();
        let mut state = self.state();
        if let Some(outcome) = Self::commit_gate(&state, job_id, note_id)? {
            return Ok(outcome);
        }

        let note = state
            .notes
            .get_mut(&note_id)
            .ok_or(Error::NoteNotFound(note_id))?;
        note.transcript = Some(transcript.text.clone());
        note.language = transcript.language.clone();
        note.duration_secs = transcript.duration_secs;
        note.status = NoteStatus::Transcribed;
        note.error_kind = None;
        note.error_message = None;
        note.updated_at = now;

        Self::mark_job_done(&mut state, job_id, now);
        Ok(CommitOutcome::Applied { first_index: false })
    }

    async fn commit_analysis(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        analysis: &Analysis,
    ) -> Result<CommitOutcome> {
        let now = Utc::now();
        let mut state = self.state();
        if let Some(outcome) = Self::commit_gate(&state, job_id, note_id)? {
            return Ok(outcome);
        }

        let note = state
            .notes
            .get_mut(&note_id)
            .ok_or(Error::NoteNotFound(note_id))?;
        note.summary = Some(analysis.summary.clone());
        note.tags = analysis.tags.clone();
        note.analysis_degraded = false;
        note.status = NoteStatus::Analyzed;
        note.error_kind = None;
        note.error_message = None;
        note.updated_at = now;

        Self::mark_job_done(&mut state, job_id, now);
        Ok(CommitOutcome::Applied { first_index: false })
    }

    async fn commit_embedding(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        output: &EmbeddingOutput,
    ) -> Result<CommitOutcome> {
        let now = Utc::now();
        let mut state = self.state();
        if let Some(outcome) = Self::commit_gate(&state, job_id, note_id)? {
            return Ok(outcome);
        }

        // Supersede any record for the same model version, never duplicate.
        state
            .records
            .retain(|r| !(r.note_id == note_id && r.model_version == output.model_version));
        state.records.push(EmbeddingRecord {
            note_id,
            vector: output.vector.clone(),
            model_version: output.model_version.clone(),
            created_at: now,
        });

        let note = state
            .notes
            .get_mut(&note_id)
            .ok_or(Error::NoteNotFound(note_id))?;
        let first_index = note.notified_at.is_none();
        if first_index {
            note.notified_at = Some(now);
        }
        note.embedding_model_version = Some(output.model_version.clone());
        note.status = NoteStatus::Indexed;
        note.error_kind = None;
        note.error_message = None;
        note.updated_at = now;

        Self::mark_job_done(&mut state, job_id, now);
        Ok(CommitOutcome::Applied { first_index })
    }

    async fn record_stage_failure(
        &self,
        job_id: Uuid,
        note_id: Uuid,
        failure: &StageFailure,
    ) -> Result<FailureOutcome> {
        let now = Utc::now();
        let mut state = self.state();

        match state.jobs.get(&job_id).map(|job| job.status) {
            None | Some(JobStatus::Cancelled) => return Ok(FailureOutcome::Cancelled),
            Some(JobStatus::Running) => {}
            Some(other) => {
                return Err(Error::Job(format!(
                    "cannot fail job {job_id} in status {other}"
                )))
            }
        }
        if !state.notes.contains_key(&note_id) {
            return Ok(FailureOutcome::Cancelled);
        }

        if let Some(retry_at) = failure.retry_at {
            let attempt = {
                let job = state
                    .jobs
                    .get_mut(&job_id)
                    .ok_or_else(|| Error::Job(format!("job {job_id} vanished")))?;
                job.status = JobStatus::Pending;
                job.attempt += 1;
                job.next_attempt_at = retry_at;
                job.error_message = Some(failure.message.clone());
                job.started_at = None;
                job.attempt
            };
            if let Some(note) = state.notes.get_mut(&note_id) {
                note.retry_count = attempt;
                note.updated_at = now;
            }
            return Ok(FailureOutcome::Rescheduled {
                attempt,
                next_attempt_at: retry_at,
            });
        }

        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.error_message = Some(failure.message.clone());
        }

        let note = state
            .notes
            .get_mut(&note_id)
            .ok_or(Error::NoteNotFound(note_id))?;
        note.updated_at = now;
        match failure.exhaust {
            ExhaustAction::DegradeAndContinue => {
                note.analysis_degraded = true;
                note.status = NoteStatus::Analyzed;
                Ok(FailureOutcome::Degraded)
            }
            ExhaustAction::FailNote => {
                note.status = failure.stage.failed_status();
                note.error_kind = Some(failure.kind);
                note.error_message = Some(failure.message.clone());
                Ok(FailureOutcome::NoteFailed)
            }
        }
    }

    async fn apply_edit(&self, note_id: Uuid, req: EditNoteRequest) -> Result<Note> {
        let now = Utc::now();
        let mut state = self.state();

        if state.active_job_for(note_id).is_some() {
            return Err(Error::Conflict(format!(
                "note {note_id} has a job in flight; retry once processing settles"
            )));
        }

        let max_attempts = self.config.max_stage_attempts;
        let note = state
            .notes
            .get_mut(&note_id)
            .ok_or(Error::NoteNotFound(note_id))?;
        if !note.status.editable() {
            return Err(Error::Conflict(format!(
                "note {note_id} cannot be edited in status {}",
                note.status
            )));
        }

        if let Some(transcript) = req.transcript {
            note.transcript = Some(transcript);
        }
        if note.transcript.as_deref().map_or(true, str::is_empty) {
            return Err(Error::InvalidInput(
                "edit would leave the note without a transcript".to_string(),
            ));
        }
        if let Some(summary) = req.summary {
            note.summary = Some(summary);
            note.analysis_degraded = false;
        }
        if let Some(tags) = req.tags {
            note.tags = tags;
        }
        note.embedding_model_version = None;
        note.status = NoteStatus::EmbeddingPending;
        note.error_kind = None;
        note.error_message = None;
        note.retry_count = 0;
        note.updated_at = now;
        let updated = note.clone();

        let stage = Stage::Embed;
        state.insert_job(note_id, stage, stage.default_priority(), max_attempts, now);
        Ok(updated)
    }

    async fn delete(&self, note_id: Uuid) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state();

        if state.notes.remove(&note_id).is_none() {
            return Err(Error::NoteNotFound(note_id));
        }
        for job in state.jobs.values_mut() {
            if job.note_id == note_id && !job.status.is_terminal() {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
            }
        }
        state.records.retain(|r| r.note_id != note_id);
        Ok(())
    }

    async fn list_unfinished(&self) -> Result<Vec<Note>> {
        let state = self.state();
        let mut notes: Vec<Note> = state
            .notes
            .values()
            .filter(|note| !note.status.is_terminal())
            .cloned()
            .collect();
        notes.sort_by_key(|note| note.created_at);
        Ok(notes)
    }

    async fn list_indexed_without_record(&self, model_version: &str) -> Result<Vec<Uuid>> {
        let state = self.state();
        let mut ids: Vec<(DateTime<Utc>, Uuid)> = state
            .notes
            .values()
            .filter(|note| note.status == NoteStatus::Indexed)
            .filter(|note| {
                !state
                    .records
                    .iter()
                    .any(|r| r.note_id == note.id && r.model_version == model_version)
            })
            .map(|note| (note.created_at, note.id))
            .collect();
        ids.sort();
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn enqueue(&self, note_id: Uuid, stage: Stage, priority: i32) -> Result<Job> {
        let now = Utc::now();
        let mut state = self.state();

        if !state.notes.contains_key(&note_id) {
            return Err(Error::NoteNotFound(note_id));
        }
        if state.active_job_for(note_id).is_some() {
            return Err(Error::Conflict(format!(
                "note {note_id} already has a job in flight"
            )));
        }

        let job = state.insert_job(note_id, stage, priority, self.config.max_stage_attempts, now);

        if stage == Stage::Embed {
            if let Some(note) = state.notes.get_mut(&note_id) {
                note.status = NoteStatus::EmbeddingPending;
                note.updated_at = now;
            }
        }
        Ok(job)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let now = Utc::now();
        let mut state = self.state();

        let candidate = state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending && job.next_attempt_at <= now)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.next_attempt_at.cmp(&b.next_attempt_at))
                    .then(a.created_at.cmp(&b.created_at))
            })
            .map(|job| job.id);

        match candidate {
            None => Ok(None),
            Some(id) => {
                let job = state
                    .jobs
                    .get_mut(&id)
                    .ok_or_else(|| Error::Job(format!("job {id} vanished")))?;
                job.status = JobStatus::Running;
                job.started_at = Some(now);
                Ok(Some(job.clone()))
            }
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.state().jobs.get(&job_id).cloned())
    }

    async fn get_for_note(&self, note_id: Uuid) -> Result<Vec<Job>> {
        let state = self.state();
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.note_id == note_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn active_for_note(&self, note_id: Uuid) -> Result<Option<Job>> {
        Ok(self.state().active_job_for(note_id).cloned())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self.state().pending_count())
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let state = self.state();
        let mut stats = QueueStats {
            pending: 0,
            running: 0,
            done: 0,
            failed: 0,
            cancelled: 0,
            total: state.jobs.len() as i64,
        };
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn reset_running(&self) -> Result<i64> {
        let mut state = self.state();
        let mut reset = 0;
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.started_at = None;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn cleanup(&self, keep_count: i64) -> Result<i64> {
        let mut state = self.state();
        let mut terminal: Vec<(Option<DateTime<Utc>>, Uuid)> = state
            .jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .map(|job| (job.completed_at, job.id))
            .collect();
        terminal.sort_by(|a, b| b.0.cmp(&a.0));

        let doomed: Vec<Uuid> = terminal
            .into_iter()
            .skip(keep_count.max(0) as usize)
            .map(|(_, id)| id)
            .collect();
        for id in &doomed {
            state.jobs.remove(id);
        }
        Ok(doomed.len() as i64)
    }
}

#[async_trait]
impl EmbeddingRepository for MemoryStore {
    async fn get_current(&self, note_id: Uuid) -> Result<Option<EmbeddingRecord>> {
        let state = self.state();
        Ok(state
            .records
            .iter()
            .filter(|r| r.note_id == note_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<EmbeddingRecord>> {
        let state = self.state();
        let mut records: Vec<EmbeddingRecord> = state
            .records
            .iter()
            .filter(|r| r.note_id == note_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn index_seeds(&self, model_version: &str) -> Result<Vec<IndexSeed>> {
        let state = self.state();
        Ok(state
            .records
            .iter()
            .filter(|r| r.model_version == model_version)
            .filter_map(|r| {
                state.notes.get(&r.note_id).map(|note| IndexSeed {
                    note_id: r.note_id,
                    owner_id: note.owner_id,
                    vector: r.vector.clone(),
                    model_version: r.model_version.clone(),
                    updated_at: note.updated_at,
                })
            })
            .collect())
    }

    async fn delete_for_note(&self, note_id: Uuid) -> Result<()> {
        self.state().records.retain(|r| r.note_id != note_id);
        Ok(())
    }
}
