//! Owner-scoped semantic search, similar-note lookup, and the
//! retrieval-augmented answer path.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use scribe_core::{
    defaults, Answer, Embedder, Error, Generator, Note, Result, SearchHit,
};
use scribe_db::Database;

use crate::index::{ScoredNote, VectorIndex};

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions using only the provided voice notes. \
     If the notes do not contain the answer, say so.";

/// Read-side service over the vector index. Queries never touch the write
/// path; the index has already been populated by the pipeline.
pub struct SearchService {
    db: Database,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn Generator>>,
}

impl SearchService {
    pub fn new(db: Database, index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            db,
            index,
            embedder,
            generator: None,
        }
    }

    /// Enable the retrieval-augmented answer path.
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Embed `query_text` and return the owner's notes ranked by cosine
    /// similarity, dropping hits below `min_score`. Returns fewer than
    /// `top_k` results rather than ever padding with other owners' notes.
    pub async fn search(
        &self,
        owner_id: Uuid,
        query_text: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchHit>> {
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let output = self.embedder.embed(query_text).await?;
        let scored = self
            .index
            .query(output.vector.as_slice(), top_k, owner_id, None)?;
        let hits = self.hydrate(owner_id, scored, min_score).await?;

        debug!(
            result_count = hits.len(),
            top_k, min_score, "Semantic search complete"
        );
        Ok(hits)
    }

    /// Rank the owner's notes by similarity to an existing note's stored
    /// vector, excluding the note itself.
    pub async fn similar_notes(
        &self,
        owner_id: Uuid,
        note_id: Uuid,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let note = self.db.notes.fetch(note_id).await?;
        // Ownership check first so one owner can never probe another's ids.
        if note.owner_id != owner_id {
            return Err(Error::NoteNotFound(note_id));
        }

        let record = self
            .db
            .embeddings
            .get_current(note_id)
            .await?
            .ok_or_else(|| Error::Search(format!("note {note_id} has no embedding yet")))?;

        let scored = self
            .index
            .query(record.vector.as_slice(), k, owner_id, Some(note_id))?;
        self.hydrate(owner_id, scored, f32::MIN).await
    }

    /// Retrieve the most relevant notes and delegate to the generation
    /// backend for a grounded answer. Composes `search` and the generator;
    /// no state of its own.
    pub async fn answer(&self, owner_id: Uuid, question: &str, top_k: usize) -> Result<Answer> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| Error::Config("no generation backend configured".to_string()))?;

        let k = if top_k == 0 {
            defaults::RAG_CONTEXT_NOTES
        } else {
            top_k
        };
        let hits = self.search(owner_id, question, k, 0.0).await?;
        if hits.is_empty() {
            return Ok(Answer {
                answer: "No relevant notes found.".to_string(),
                cited_note_ids: Vec::new(),
            });
        }

        let mut context = String::new();
        let mut cited = Vec::with_capacity(hits.len());
        for (i, hit) in hits.iter().enumerate() {
            let note = self.db.notes.fetch(hit.note_id).await?;
            context.push_str(&format!("Note {}:\n", i + 1));
            if let Some(summary) = &note.summary {
                context.push_str(&format!("Summary: {summary}\n"));
            }
            if let Some(transcript) = &note.transcript {
                context.push_str(&format!("Transcript: {transcript}\n"));
            }
            context.push('\n');
            cited.push(hit.note_id);
        }

        let prompt = format!("{context}Question: {question}");
        let answer = generator.generate(ANSWER_SYSTEM_PROMPT, &prompt).await?;

        Ok(Answer {
            answer,
            cited_note_ids: cited,
        })
    }

    /// Rebuild the index from embedding records for the embedder's current
    /// model version.
    pub async fn reindex(&self) -> Result<usize> {
        let seeds = self
            .db
            .embeddings
            .index_seeds(self.embedder.model_version())
            .await?;
        let count = self.index.rebuild(seeds)?;
        info!(entries = count, model = %self.embedder.model_version(), "Reindex complete");
        Ok(count)
    }

    fn snippet(note: &Note) -> Option<String> {
        if let Some(summary) = &note.summary {
            return Some(summary.clone());
        }
        note.transcript
            .as_ref()
            .map(|t| t.chars().take(defaults::SNIPPET_LENGTH).collect())
    }

    async fn hydrate(
        &self,
        owner_id: Uuid,
        scored: Vec<ScoredNote>,
        min_score: f32,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::with_capacity(scored.len());
        for item in scored {
            if item.score < min_score {
                continue;
            }
            // A note deleted between scan and hydration just drops out.
            let note = match self.db.notes.fetch(item.note_id).await {
                Ok(note) => note,
                Err(Error::NoteNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if note.owner_id != owner_id {
                continue;
            }
            hits.push(SearchHit {
                note_id: item.note_id,
                score: item.score,
                snippet: Self::snippet(&note),
                tags: note.tags,
            });
        }
        Ok(hits)
    }
}
