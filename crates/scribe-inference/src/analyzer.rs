//! LLM-backed transcript analysis: a short summary plus a tag set.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use scribe_core::{AdapterError, AdapterResult, Analysis, Analyzer, Generator};

const SYSTEM_PROMPT: &str = "You summarize voice-note transcripts. Respond with a JSON object \
     containing \"summary\" (five words or fewer) and \"tags\" (an array of one to three \
     lowercase topic tags). Respond with JSON only.";

/// [`Analyzer`] that prompts a [`Generator`] for structured JSON output.
pub struct LlmAnalyzer {
    generator: Arc<dyn Generator>,
}

#[derive(Deserialize)]
struct AnalysisPayload {
    summary: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl LlmAnalyzer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Extract the first JSON object from model output. Models occasionally
    /// wrap the object in prose or code fences.
    fn extract_json(output: &str) -> Option<&str> {
        let start = output.find('{')?;
        let end = output.rfind('}')?;
        if end < start {
            return None;
        }
        Some(&output[start..=end])
    }

    fn parse(output: &str) -> AdapterResult<Analysis> {
        let json = Self::extract_json(output)
            .ok_or_else(|| AdapterError::permanent("analysis output contained no JSON object"))?;
        let payload: AnalysisPayload = serde_json::from_str(json)
            .map_err(|e| AdapterError::permanent(format!("malformed analysis JSON: {e}")))?;

        let summary = payload.summary.trim().to_string();
        if summary.is_empty() {
            return Err(AdapterError::permanent("analysis produced an empty summary"));
        }

        let mut tags: Vec<String> = payload
            .tags
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();

        Ok(Analysis { summary, tags })
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, transcript: &str) -> AdapterResult<Analysis> {
        if transcript.trim().is_empty() {
            return Err(AdapterError::permanent("cannot analyze an empty transcript"));
        }

        let prompt = format!("Transcript:\n{transcript}");
        let output = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        let analysis = Self::parse(&output)?;
        debug!(summary = %analysis.summary, tag_count = analysis.tags.len(), "Analyzed transcript");
        Ok(analysis)
    }

    fn name(&self) -> &str {
        "llm-analyzer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let analysis =
            LlmAnalyzer::parse(r#"{"summary": "greeting", "tags": ["greeting"]}"#).unwrap();
        assert_eq!(analysis.summary, "greeting");
        assert_eq!(analysis.tags, vec!["greeting"]);
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        let output = "Here is the result:\n```json\n{\"summary\": \"shopping list\", \
                      \"tags\": [\"errands\", \"Shopping\"]}\n```";
        let analysis = LlmAnalyzer::parse(output).unwrap();
        assert_eq!(analysis.summary, "shopping list");
        assert_eq!(analysis.tags, vec!["errands", "shopping"]);
    }

    #[test]
    fn test_parse_dedupes_tags() {
        let analysis =
            LlmAnalyzer::parse(r#"{"summary": "x", "tags": ["a", "A", "a "]}"#).unwrap();
        assert_eq!(analysis.tags, vec!["a"]);
    }

    #[test]
    fn test_parse_missing_tags_defaults_empty() {
        let analysis = LlmAnalyzer::parse(r#"{"summary": "just a summary"}"#).unwrap();
        assert!(analysis.tags.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = LlmAnalyzer::parse("I could not process that.").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_parse_rejects_empty_summary() {
        let err = LlmAnalyzer::parse(r#"{"summary": "  ", "tags": []}"#).unwrap_err();
        assert!(!err.is_transient());
    }
}
