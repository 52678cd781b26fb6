//! Collaborator frame contracts
//!
//! §6 treats the STT/TTS/LLM clients and the VAD analyzer as pure
//! external collaborators — the core contracts only the frames exchanged
//! with them, never an HTTP/WebSocket implementation. These traits are
//! that contract, named after the frames each method must eventually
//! produce rather than after a provider's wire protocol: a concrete
//! Deepgram/ElevenLabs/OpenAI/Gemini/Groq adapter is a thin translation
//! layer the host application supplies, not something this crate ships.

use crate::context::Context;
use crate::frame::Frame;
use async_trait::async_trait;
use std::sync::Arc;

/// STT client config (§6): validated before `init`, not per-utterance.
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub sample_rate: u32,
    pub encoding: String,
    pub language: String,
    pub model: String,
    pub interim_results: bool,
    pub vad_events: bool,
    pub smart_format: bool,
    pub punctuate: bool,
    pub utterance_end_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SttConfigError(pub String);

impl SttConfig {
    /// `utterance-end-ms > 0` requires `interim-results = true`;
    /// `smart-format = true` requires `punctuate = false` (§6).
    pub fn validate(&self) -> Result<(), SttConfigError> {
        if self.utterance_end_ms > 0 && !self.interim_results {
            return Err(SttConfigError(
                "utterance_end_ms > 0 requires interim_results = true".to_string(),
            ));
        }
        if self.smart_format && self.punctuate {
            return Err(SttConfigError(
                "smart_format = true requires punctuate = false".to_string(),
            ));
        }
        Ok(())
    }
}

/// Consumes `audio-input-raw`; emits speech-start/stop and transcripts.
/// The host's provider adapter implements this against its own socket.
#[async_trait]
pub trait SttClient: Send {
    /// Feed one inbound audio chunk; returns whatever frames the provider
    /// has for it so far (zero or more — speech-start/stop and interim or
    /// final transcripts arrive asynchronously relative to input chunks
    /// for a real provider, so a polling/streaming host typically drains
    /// a queue rather than calling this 1:1, but the contract here is the
    /// simplest synchronous shape a test double can satisfy).
    async fn feed(&mut self, audio: &[u8]) -> Vec<Frame>;
}

/// Consumes `speak-frame` (or streamed assistant text); emits
/// `audio-output-raw`. A session-start / trailing-flush / keep-alive /
/// close lifecycle is the provider's concern, not this trait's.
#[async_trait]
pub trait TtsClient: Send {
    async fn say(&mut self, text: &str) -> Vec<Frame>;
}

/// Consumes an `llm-context`; emits `llm-response-start`, zero or more
/// `llm-text-chunk`/`llm-tool-call-chunk`, then exactly one
/// `llm-response-end`. `interrupt` aborts an in-flight stream and
/// discards pending chunks (§6, S-7).
#[async_trait]
pub trait LlmClient: Send {
    async fn generate(&mut self, context: &Context) -> Vec<Frame>;
    async fn interrupt(&mut self) {}
}

/// VAD decision a transport-in base folds into `vad-user-speech-*` and
/// `control-interrupt-*` frames (§4.7). `Starting`/`Stopping` are
/// transient states that update internal state only — no frame is
/// produced until the analyzer commits to `Speaking` or `Quiet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Quiet,
    Starting,
    Speaking,
    Stopping,
}

#[async_trait]
pub trait VadAnalyzer: Send {
    async fn analyze(&mut self, audio: &[u8]) -> VadState;
}

/// Trivial collaborator doubles used only by tests.
pub struct EchoSttClient {
    pub scripted: Vec<Frame>,
}

#[async_trait]
impl SttClient for EchoSttClient {
    async fn feed(&mut self, _audio: &[u8]) -> Vec<Frame> {
        std::mem::take(&mut self.scripted)
    }
}

pub struct SilenceTtsClient;

#[async_trait]
impl TtsClient for SilenceTtsClient {
    async fn say(&mut self, _text: &str) -> Vec<Frame> {
        Vec::new()
    }
}

/// Yields a fixed, pre-scripted response sequence regardless of context —
/// enough to drive the assistant assembler and tool dispatcher in tests
/// without a real model.
pub struct ScriptedLlmClient {
    pub script: Arc<Vec<Frame>>,
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&mut self, _context: &Context) -> Vec<Frame> {
        self.script.as_ref().clone()
    }
}

pub struct ScriptedVad {
    pub script: std::collections::VecDeque<VadState>,
}

#[async_trait]
impl VadAnalyzer for ScriptedVad {
    async fn analyze(&mut self, _audio: &[u8]) -> VadState {
        self.script.pop_front().unwrap_or(VadState::Quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SttConfig {
        SttConfig {
            sample_rate: 16000,
            encoding: "linear16".to_string(),
            language: "en".to_string(),
            model: "nova-2".to_string(),
            interim_results: true,
            vad_events: false,
            smart_format: false,
            punctuate: true,
            utterance_end_ms: 1000,
        }
    }

    #[test]
    fn utterance_end_requires_interim_results() {
        let mut cfg = base_config();
        cfg.interim_results = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn smart_format_requires_punctuate_disabled() {
        let mut cfg = base_config();
        cfg.smart_format = true;
        cfg.punctuate = true;
        assert!(cfg.validate().is_err());

        cfg.punctuate = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }
}
