//! Transport-In Base
//!
//! The shared prelude for input transports (§4.7): a mute gate and a VAD
//! state machine that folds `audio-input-raw` chunks into
//! `vad-user-speech-*`/`user-speech-*`/`control-interrupt-*` frames. Kept
//! as a plain state struct rather than a `Process` impl of its own so two
//! concrete transports ([`TwilioInTransport`], [`LocalAudioInTransport`])
//! can embed it and add their own provider-specific framing on top — one
//! adapter per input source, common logic factored into a shared base
//! rather than duplicated.

use crate::collaborators::{VadAnalyzer, VadState};
use crate::error::{ConfigError, Error};
use crate::frame::{Frame, FrameKind};
use crate::process::{Descriptor, InitOutcome, Lifecycle, Outputs, Process, PORT_IN, PORT_SYS_IN};
use async_trait::async_trait;
use base64::Engine;

pub const PORT_SYS_OUT: &str = "sys-out";

pub struct TransportInBase {
    supports_interrupt: bool,
    vad_state: VadState,
    vad_analyzer: Option<Box<dyn VadAnalyzer>>,
    muted: bool,
}

impl TransportInBase {
    pub fn new(supports_interrupt: bool, vad_analyzer: Option<Box<dyn VadAnalyzer>>) -> Self {
        Self {
            supports_interrupt,
            vad_state: VadState::Quiet,
            vad_analyzer,
            muted: false,
        }
    }

    pub fn on_mute_start(&mut self) {
        self.muted = true;
    }

    pub fn on_mute_stop(&mut self) {
        self.muted = false;
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    /// `audio-input-raw` handling (§4.7): while muted, drop it entirely;
    /// otherwise run the VAD (if any) and always forward on `out`.
    pub async fn on_audio_input_raw(&mut self, bytes: Vec<u8>, sample_rate: u32, ts: i64) -> Outputs {
        if self.muted {
            return Vec::new();
        }

        let mut outputs: Outputs = Vec::new();
        if let Some(analyzer) = self.vad_analyzer.as_mut() {
            let prev = self.vad_state;
            let next = analyzer.analyze(&bytes).await;
            self.vad_state = next;
            match (prev, next) {
                (VadState::Speaking, VadState::Speaking) => {}
                (_, VadState::Speaking) => {
                    outputs.push((PORT_SYS_OUT, Frame::vad_user_speech_start(ts).unwrap()));
                    outputs.push((PORT_SYS_OUT, Frame::user_speech_start(ts).unwrap()));
                    if self.supports_interrupt {
                        outputs.push((PORT_SYS_OUT, Frame::control_interrupt_start(ts).unwrap()));
                    }
                }
                (VadState::Quiet, VadState::Quiet) => {}
                (_, VadState::Quiet) => {
                    outputs.push((PORT_SYS_OUT, Frame::vad_user_speech_stop(ts).unwrap()));
                    outputs.push((PORT_SYS_OUT, Frame::user_speech_stop(ts).unwrap()));
                    if self.supports_interrupt {
                        outputs.push((PORT_SYS_OUT, Frame::control_interrupt_stop(ts).unwrap()));
                    }
                }
                // Transient Starting/Stopping states update vad_state only.
                _ => {}
            }
        }

        outputs.push(("out", Frame::audio_input_raw(bytes, sample_rate, ts).unwrap()));
        outputs
    }

    /// `bot-interrupt` handling (§4.7): only forwarded when this transport
    /// declares it supports interruption.
    pub fn on_bot_interrupt(&self, ts: i64) -> Outputs {
        if self.supports_interrupt {
            vec![(PORT_SYS_OUT, Frame::control_interrupt_start(ts).unwrap())]
        } else {
            Vec::new()
        }
    }
}

/// Twilio Media Streams WS event surface (§6): `start` swaps in the
/// stream's serializer via `system-config-change`, `media` decodes
/// base64 payload bytes into `audio-input-raw`, `close` stops the flow.
/// The WebSocket itself is out of scope (§1) — a host feeds parsed JSON
/// events into this process's normal `in` port exactly like any other
/// frame producer.
pub struct TwilioInTransport {
    base: TransportInBase,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioEvent {
    Start { stream_sid: String },
    Media { payload: String },
    Close,
}

impl TwilioInTransport {
    pub fn new(supports_interrupt: bool, vad_analyzer: Option<Box<dyn VadAnalyzer>>) -> Self {
        Self {
            base: TransportInBase::new(supports_interrupt, vad_analyzer),
        }
    }

    pub async fn handle_event(&mut self, event: TwilioEvent, ts: i64, sample_rate: u32) -> Result<Outputs, Error> {
        match event {
            TwilioEvent::Start { stream_sid } => {
                let frame = Frame::system_config_change(
                    "transport/serializer",
                    serde_json::json!({"provider": "twilio", "stream_sid": stream_sid}),
                    ts,
                )?;
                Ok(vec![(PORT_SYS_OUT, frame)])
            }
            TwilioEvent::Media { payload } => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(payload)
                    .map_err(|e| Error::Transient(crate::error::TransientError::Transport(e.to_string())))?;
                Ok(self.base.on_audio_input_raw(bytes, sample_rate, ts).await)
            }
            TwilioEvent::Close => Ok(vec![(PORT_SYS_OUT, Frame::system_stop(ts)?)]),
        }
    }
}

/// Minimal mic/speaker-pair input transport (§1). No device line is opened
/// here — the host feeds captured PCM bytes directly into the normal `in`
/// port.
pub struct LocalAudioInTransport {
    base: TransportInBase,
    sample_rate: u32,
}

impl LocalAudioInTransport {
    pub fn new(sample_rate: u32, supports_interrupt: bool, vad_analyzer: Option<Box<dyn VadAnalyzer>>) -> Self {
        Self {
            base: TransportInBase::new(supports_interrupt, vad_analyzer),
            sample_rate,
        }
    }
}

#[async_trait]
impl Process for LocalAudioInTransport {
    fn name(&self) -> &'static str {
        "local-audio-in-transport"
    }

    fn describe(&self) -> Descriptor {
        Descriptor {
            in_ports: vec![PORT_IN, PORT_SYS_IN],
            out_ports: vec!["out", PORT_SYS_OUT],
            required_params: vec![],
        }
    }

    async fn init(&mut self, _params: serde_json::Value) -> Result<InitOutcome, ConfigError> {
        Ok(InitOutcome::default())
    }

    async fn transform(&mut self, _port: &str, frame: Frame) -> Result<Outputs, Error> {
        let ts = frame.ts;
        let outputs = match frame.kind() {
            FrameKind::AudioInputRaw(payload) => {
                self.base.on_audio_input_raw(payload.bytes.clone(), self.sample_rate, ts).await
            }
            FrameKind::MuteInputStart => {
                self.base.on_mute_start();
                Vec::new()
            }
            FrameKind::MuteInputStop => {
                self.base.on_mute_stop();
                Vec::new()
            }
            FrameKind::BotInterrupt => self.base.on_bot_interrupt(ts),
            _ => Vec::new(),
        };
        Ok(outputs)
    }

    async fn transition(&mut self, _event: Lifecycle) -> Result<(), Error> {
        Ok(())
    }
}
