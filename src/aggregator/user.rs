//! User Context Aggregator
//!
//! Folds the speech-start/stop and interim/final transcript alphabet (S E I
//! T, §4.3) into a single authoritative `Context`, emitting one
//! `llm-context` frame per completed user turn.

use crate::context::{Context, Message};
use crate::error::{ConfigError, Error};
use crate::frame::{Frame, FrameKind};
use crate::process::{Descriptor, InitOutcome, Lifecycle, Outputs, Process, PORT_IN, PORT_SYS_IN};
use async_trait::async_trait;

pub struct UserAggregator {
    ctx: Context,
    aggregating: bool,
    seen_interim: bool,
    seen_end: bool,
    aggregation: String,
}

impl Default for UserAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAggregator {
    pub fn new() -> Self {
        Self {
            ctx: Context::new(),
            aggregating: false,
            seen_interim: false,
            seen_end: false,
            aggregation: String::new(),
        }
    }

    fn reset(&mut self) {
        self.aggregating = false;
        self.seen_interim = false;
        self.seen_end = false;
        self.aggregation.clear();
    }

    /// `S` — tolerates a duplicate start before the matching stop by never
    /// clearing `aggregation` here (§4.3, §9 open question).
    fn on_start(&mut self) {
        self.aggregating = true;
        self.seen_end = false;
        self.seen_interim = false;
    }

    /// `E` — keeps aggregating past a stop while an interim burst is still
    /// outstanding or nothing has been transcribed yet; otherwise this is
    /// the end of the turn.
    fn on_stop(&mut self, ts: i64) -> Option<Frame> {
        if !self.aggregating {
            return None;
        }
        if self.seen_interim || self.aggregation.is_empty() {
            self.seen_end = true;
            None
        } else {
            let frame = self.build_emission(ts);
            self.reset();
            Some(frame)
        }
    }

    fn on_interim(&mut self) {
        self.seen_interim = true;
    }

    /// `T` — appends the final transcript; emits immediately if a stop is
    /// already pending, otherwise keeps listening for further interims.
    fn on_final(&mut self, text: &str, ts: i64) -> Option<Frame> {
        if !self.aggregating {
            return None;
        }
        if self.aggregation.is_empty() {
            self.aggregation.push_str(text);
        } else {
            self.aggregation.push(' ');
            self.aggregation.push_str(text);
        }
        if self.seen_end {
            let frame = self.build_emission(ts);
            self.reset();
            Some(frame)
        } else {
            self.seen_interim = false;
            None
        }
    }

    fn build_emission(&mut self, ts: i64) -> Frame {
        self.ctx = self.ctx.append(Message::user(self.aggregation.clone()));
        Frame::llm_context(self.ctx.clone(), ts).expect("user message context is always valid")
    }
}

#[async_trait]
impl Process for UserAggregator {
    fn name(&self) -> &'static str {
        "user-aggregator"
    }

    fn describe(&self) -> Descriptor {
        Descriptor {
            in_ports: vec![PORT_IN, PORT_SYS_IN],
            out_ports: vec!["out"],
            required_params: vec![],
        }
    }

    async fn init(&mut self, _params: serde_json::Value) -> Result<InitOutcome, ConfigError> {
        Ok(InitOutcome::default())
    }

    async fn transform(&mut self, _port: &str, frame: Frame) -> Result<Outputs, Error> {
        let ts = frame.ts;
        let mut outputs: Outputs = Vec::new();

        match frame.kind() {
            FrameKind::UserSpeechStart => self.on_start(),
            FrameKind::UserSpeechStop => {
                if let Some(emitted) = self.on_stop(ts) {
                    outputs.push(("out", emitted));
                }
            }
            FrameKind::TranscriptionInterim(_) => self.on_interim(),
            FrameKind::TranscriptionResult(payload) => {
                if let Some(emitted) = self.on_final(&payload.text, ts) {
                    outputs.push(("out", emitted));
                }
            }
            FrameKind::LlmContext(payload) => {
                self.ctx = payload.context.clone();
            }
            FrameKind::LlmContextMessagesAppend(payload) => {
                self.ctx = self.ctx.append_all(payload.messages.clone());
                if matches!(payload.messages.last(), Some(Message::Tool { .. })) {
                    outputs.push(("out", frame.clone()));
                }
            }
            FrameKind::LlmToolCallResult(payload) => {
                self.ctx = self.ctx.append(payload.result.clone());
            }
            FrameKind::SpeakFrame(payload) => {
                self.ctx = self.ctx.append(Message::assistant_text(payload.text.clone()));
            }
            FrameKind::SystemConfigChange(payload) => {
                if payload.key == "context" {
                    if let Ok(ctx) = serde_json::from_value::<Context>(payload.value.clone()) {
                        self.ctx = ctx;
                    }
                }
            }
            _ => {}
        }

        Ok(outputs)
    }

    async fn transition(&mut self, _event: Lifecycle) -> Result<(), Error> {
        Ok(())
    }
}
