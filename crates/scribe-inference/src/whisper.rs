//! OpenAI-compatible Whisper transcription backend (works with
//! faster-whisper-server and Speaches).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use scribe_core::{AdapterError, AdapterResult, Transcriber, Transcript};

use crate::InferenceConfig;

/// [`Transcriber`] over an HTTP Whisper server. The opaque `audio_ref` is a
/// path to the stored audio file.
pub struct WhisperTranscriber {
    client: reqwest::Client,
    config: InferenceConfig,
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl WhisperTranscriber {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn mime_type(audio_ref: &str) -> &'static str {
        match audio_ref.rsplit('.').next() {
            Some("mp3") => "audio/mpeg",
            Some("ogg") => "audio/ogg",
            Some("flac") => "audio/flac",
            Some("aac") => "audio/aac",
            Some("webm") => "audio/webm",
            Some("m4a") => "audio/mp4",
            _ => "audio/wav",
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio_ref: &str) -> AdapterResult<Transcript> {
        // Missing or unreadable audio cannot be fixed by retrying.
        let audio_data = tokio::fs::read(audio_ref)
            .await
            .map_err(|e| AdapterError::permanent(format!("cannot read audio {audio_ref}: {e}")))?;

        let mime = Self::mime_type(audio_ref);
        let file_name = audio_ref
            .rsplit('/')
            .next()
            .unwrap_or("audio.wav")
            .to_string();
        let file_part = reqwest::multipart::Part::bytes(audio_data)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| AdapterError::permanent(format!("invalid multipart: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.config.whisper_model.clone())
            .text("response_format", "verbose_json");

        let url = format!("{}/v1/audio/transcriptions", self.config.whisper_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.config.transcribe_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status.as_u16(), body));
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::permanent(format!("invalid response body: {e}")))?;

        let text = parsed.text.trim().to_string();
        if text.is_empty() {
            return Err(AdapterError::permanent("transcription produced no text"));
        }

        debug!(
            model = %self.config.whisper_model,
            chars = text.len(),
            language = ?parsed.language,
            "Transcribed audio"
        );
        Ok(Transcript {
            text,
            language: parsed.language,
            duration_secs: parsed.duration,
        })
    }

    fn name(&self) -> &str {
        "whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(WhisperTranscriber::mime_type("a/b/voice.mp3"), "audio/mpeg");
        assert_eq!(WhisperTranscriber::mime_type("voice.ogg"), "audio/ogg");
        assert_eq!(WhisperTranscriber::mime_type("voice.m4a"), "audio/mp4");
        assert_eq!(WhisperTranscriber::mime_type("voice.wav"), "audio/wav");
        assert_eq!(WhisperTranscriber::mime_type("no-extension"), "audio/wav");
    }
}
