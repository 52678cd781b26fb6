//! Frame Protocol
//!
//! A `Frame` is an immutable record carrying a `ts` (milliseconds) and a
//! payload drawn from the closed, globally unique type vocabulary in
//! `FrameKind`. Classification (`system`/`data`, §3.1) is a total function
//! over that enum — property 2 in §8.
//!
//! Kept as one tagged sum type per the design notes in §9 rather than a
//! duck-typed `{type, data}` map, so every `match` on `FrameKind` is
//! exhaustive and the compiler catches a missed frame type the moment the
//! vocabulary grows.

use crate::context::{Context, Message};
use crate::error::FrameError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Either representation the caller constructs a frame timestamp from;
/// normalized to milliseconds-since-epoch at construction time (§4.1).
#[derive(Debug, Clone, Copy)]
pub enum Timestamp {
    EpochMs(i64),
    Wall(DateTime<Utc>),
}

impl Timestamp {
    fn normalize(self) -> i64 {
        match self {
            Timestamp::EpochMs(ms) => ms,
            Timestamp::Wall(dt) => dt.timestamp_millis(),
        }
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Timestamp::EpochMs(ms)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::Wall(dt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunkDelta {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolCallChunkDelta {
    pub id: Option<String>,
    pub function_name: Option<String>,
    pub arguments_fragment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPayload {
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAppendPayload {
    pub messages: Vec<Message>,
    pub run_llm: bool,
    pub tool_call: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResultPayload {
    pub request: Message,
    pub result: Message,
    pub run_llm: bool,
    /// Present when the originating tool carried a scenario transition —
    /// the assembler waits for `scenario-context-update` instead of
    /// re-running the LLM immediately (§4.4).
    pub on_update_transition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioContextUpdatePayload {
    pub messages: Vec<Message>,
    pub tools: Vec<crate::context::ToolDef>,
    pub run_llm: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChangePayload {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub reason: String,
}

/// The pacer's `{command: write-audio, data, sample-rate, delay-until}`
/// shape (§4.5) — the boundary handoff to a host-owned audio device, the
/// same role `audio-input-raw`/`audio-output-raw` play at the STT/TTS
/// boundary. Never produced except by [`crate::pacer::RealtimePacer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioWriteCommandPayload {
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub delay_until_ms: i64,
}

/// The closed frame vocabulary (§3.1). One variant per listed type name;
/// adding a type means adding a variant here, which every `match` in the
/// crate must then account for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameKind {
    AudioInputRaw(AudioPayload),
    AudioOutputRaw(AudioPayload),
    TranscriptionResult(TextPayload),
    TranscriptionInterim(TextPayload),
    LlmTextChunk(TextChunkDelta),
    LlmToolCallChunk(ToolCallChunkDelta),
    LlmResponseStart,
    LlmResponseEnd,
    LlmContext(ContextPayload),
    LlmContextMessagesAppend(ContextAppendPayload),
    LlmToolCallResult(ToolCallResultPayload),
    UserSpeechStart,
    UserSpeechStop,
    VadUserSpeechStart,
    VadUserSpeechStop,
    BotSpeechStart,
    BotSpeechStop,
    BotInterrupt,
    ControlInterruptStart,
    ControlInterruptStop,
    SpeakFrame(TextPayload),
    TextInput(TextPayload),
    ScenarioContextUpdate(ScenarioContextUpdatePayload),
    SystemStart,
    SystemStop,
    SystemConfigChange(ConfigChangePayload),
    SystemError(ErrorPayload),
    MuteInputStart,
    MuteInputStop,

    /// Internal-only: the pacer's self-owned timer tick (§4.5). Delivered
    /// straight from its own background loop into its own `timer-out`
    /// in-port via the runtime's extra-in-port mechanism — it never
    /// crosses a `conns` edge between two processes, so it is not part of
    /// the exchanged vocabulary the rest of §3.1's list describes.
    InternalTimerTick,
    /// Internal-only: the pacer's `audio-write` command (§4.5), handed to
    /// a host-owned device writer rather than routed to another process.
    AudioWriteCommand(AudioWriteCommandPayload),
}

/// Whether a frame is routed to a process's `sys_in` or `in` channel (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    System,
    Data,
}

impl FrameKind {
    /// Stable name matching the type strings in §3.1 (kebab-case).
    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::AudioInputRaw(_) => "audio-input-raw",
            FrameKind::AudioOutputRaw(_) => "audio-output-raw",
            FrameKind::TranscriptionResult(_) => "transcription-result",
            FrameKind::TranscriptionInterim(_) => "transcription-interim",
            FrameKind::LlmTextChunk(_) => "llm-text-chunk",
            FrameKind::LlmToolCallChunk(_) => "llm-tool-call-chunk",
            FrameKind::LlmResponseStart => "llm-response-start",
            FrameKind::LlmResponseEnd => "llm-response-end",
            FrameKind::LlmContext(_) => "llm-context",
            FrameKind::LlmContextMessagesAppend(_) => "llm-context-messages-append",
            FrameKind::LlmToolCallResult(_) => "llm-tool-call-result",
            FrameKind::UserSpeechStart => "user-speech-start",
            FrameKind::UserSpeechStop => "user-speech-stop",
            FrameKind::VadUserSpeechStart => "vad-user-speech-start",
            FrameKind::VadUserSpeechStop => "vad-user-speech-stop",
            FrameKind::BotSpeechStart => "bot-speech-start",
            FrameKind::BotSpeechStop => "bot-speech-stop",
            FrameKind::BotInterrupt => "bot-interrupt",
            FrameKind::ControlInterruptStart => "control-interrupt-start",
            FrameKind::ControlInterruptStop => "control-interrupt-stop",
            FrameKind::SpeakFrame(_) => "speak-frame",
            FrameKind::TextInput(_) => "text-input",
            FrameKind::ScenarioContextUpdate(_) => "scenario-context-update",
            FrameKind::SystemStart => "system-start",
            FrameKind::SystemStop => "system-stop",
            FrameKind::SystemConfigChange(_) => "system-config-change",
            FrameKind::SystemError(_) => "system-error",
            FrameKind::MuteInputStart => "mute-input-start",
            FrameKind::MuteInputStop => "mute-input-stop",
            FrameKind::InternalTimerTick => "internal-timer-tick",
            FrameKind::AudioWriteCommand(_) => "audio-write-command",
        }
    }

    /// Classification is total over the closed vocabulary (property 2).
    pub fn classify(&self) -> Class {
        match self {
            FrameKind::SystemStart
            | FrameKind::SystemStop
            | FrameKind::SystemConfigChange(_)
            | FrameKind::SystemError(_)
            | FrameKind::ControlInterruptStart
            | FrameKind::ControlInterruptStop
            | FrameKind::UserSpeechStart
            | FrameKind::UserSpeechStop
            | FrameKind::VadUserSpeechStart
            | FrameKind::VadUserSpeechStop
            | FrameKind::BotSpeechStart
            | FrameKind::BotSpeechStop
            | FrameKind::BotInterrupt
            | FrameKind::MuteInputStart
            | FrameKind::MuteInputStop
            | FrameKind::InternalTimerTick => Class::System,
            _ => Class::Data,
        }
    }
}

/// An immutable frame: a `FrameKind` payload plus a normalized timestamp.
/// `type` and classification never change after construction (invariant,
/// §3.4) — there is simply no `&mut` access to `kind` after `new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    kind: FrameKind,
    pub ts: i64,
}

impl Frame {
    fn new(kind: FrameKind, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        let frame = Frame {
            kind,
            ts: ts.into().normalize(),
        };
        #[cfg(any(test, feature = "validate-frames"))]
        frame.validate()?;
        Ok(frame)
    }

    pub fn kind(&self) -> &FrameKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn classify(&self) -> Class {
        self.kind.classify()
    }

    pub fn is_system(&self) -> bool {
        self.classify() == Class::System
    }

    #[cfg_attr(not(any(test, feature = "validate-frames")), allow(dead_code))]
    fn validate(&self) -> Result<(), FrameError> {
        let bad = |reason: &str| FrameError::BadFrame {
            kind: self.kind.name(),
            reason: reason.to_string(),
        };
        match &self.kind {
            FrameKind::AudioInputRaw(p) | FrameKind::AudioOutputRaw(p) => {
                if p.sample_rate == 0 {
                    return Err(bad("sample_rate must be nonzero"));
                }
            }
            FrameKind::LlmToolCallResult(p) => {
                if !matches!(p.request, Message::Assistant { .. }) {
                    return Err(bad("request must be an assistant tool-call message"));
                }
                if !matches!(p.result, Message::Tool { .. }) {
                    return Err(bad("result must be a tool message"));
                }
            }
            FrameKind::LlmContextMessagesAppend(p) => {
                if p.messages.is_empty() {
                    return Err(bad("messages must be non-empty"));
                }
            }
            FrameKind::SystemConfigChange(p) => {
                if p.key.is_empty() {
                    return Err(bad("key must be non-empty"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    // --- Constructors, one per frame type (§4.1) ---

    pub fn audio_input_raw(bytes: Vec<u8>, sample_rate: u32, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::AudioInputRaw(AudioPayload { bytes, sample_rate }), ts)
    }

    pub fn audio_output_raw(bytes: Vec<u8>, sample_rate: u32, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::AudioOutputRaw(AudioPayload { bytes, sample_rate }), ts)
    }

    pub fn transcription_result(text: impl Into<String>, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::TranscriptionResult(TextPayload { text: text.into() }), ts)
    }

    pub fn transcription_interim(text: impl Into<String>, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::TranscriptionInterim(TextPayload { text: text.into() }), ts)
    }

    pub fn llm_text_chunk(text: impl Into<String>, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::LlmTextChunk(TextChunkDelta { text: text.into() }), ts)
    }

    pub fn llm_tool_call_chunk(delta: ToolCallChunkDelta, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::LlmToolCallChunk(delta), ts)
    }

    pub fn llm_response_start(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::LlmResponseStart, ts)
    }

    pub fn llm_response_end(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::LlmResponseEnd, ts)
    }

    pub fn llm_context(context: Context, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::LlmContext(ContextPayload { context }), ts)
    }

    pub fn llm_context_messages_append(
        messages: Vec<Message>,
        run_llm: bool,
        tool_call: bool,
        ts: impl Into<Timestamp>,
    ) -> Result<Self, FrameError> {
        Self::new(
            FrameKind::LlmContextMessagesAppend(ContextAppendPayload {
                messages,
                run_llm,
                tool_call,
            }),
            ts,
        )
    }

    pub fn llm_tool_call_result(payload: ToolCallResultPayload, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::LlmToolCallResult(payload), ts)
    }

    pub fn user_speech_start(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::UserSpeechStart, ts)
    }

    pub fn user_speech_stop(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::UserSpeechStop, ts)
    }

    pub fn vad_user_speech_start(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::VadUserSpeechStart, ts)
    }

    pub fn vad_user_speech_stop(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::VadUserSpeechStop, ts)
    }

    pub fn bot_speech_start(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::BotSpeechStart, ts)
    }

    pub fn bot_speech_stop(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::BotSpeechStop, ts)
    }

    pub fn bot_interrupt(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::BotInterrupt, ts)
    }

    pub fn control_interrupt_start(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::ControlInterruptStart, ts)
    }

    pub fn control_interrupt_stop(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::ControlInterruptStop, ts)
    }

    pub fn speak_frame(text: impl Into<String>, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::SpeakFrame(TextPayload { text: text.into() }), ts)
    }

    pub fn text_input(text: impl Into<String>, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::TextInput(TextPayload { text: text.into() }), ts)
    }

    pub fn scenario_context_update(
        payload: ScenarioContextUpdatePayload,
        ts: impl Into<Timestamp>,
    ) -> Result<Self, FrameError> {
        Self::new(FrameKind::ScenarioContextUpdate(payload), ts)
    }

    pub fn system_start(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::SystemStart, ts)
    }

    pub fn system_stop(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::SystemStop, ts)
    }

    pub fn system_config_change(
        key: impl Into<String>,
        value: serde_json::Value,
        ts: impl Into<Timestamp>,
    ) -> Result<Self, FrameError> {
        Self::new(
            FrameKind::SystemConfigChange(ConfigChangePayload {
                key: key.into(),
                value,
            }),
            ts,
        )
    }

    pub fn system_error(reason: impl Into<String>, ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::SystemError(ErrorPayload { reason: reason.into() }), ts)
    }

    pub fn mute_input_start(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::MuteInputStart, ts)
    }

    pub fn mute_input_stop(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::MuteInputStop, ts)
    }

    pub fn internal_timer_tick(ts: impl Into<Timestamp>) -> Result<Self, FrameError> {
        Self::new(FrameKind::InternalTimerTick, ts)
    }

    pub fn audio_write_command(
        payload: AudioWriteCommandPayload,
        ts: impl Into<Timestamp>,
    ) -> Result<Self, FrameError> {
        Self::new(FrameKind::AudioWriteCommand(payload), ts)
    }
}
