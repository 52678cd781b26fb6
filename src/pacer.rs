//! Realtime Output Pacer
//!
//! Streams TTS audio chunks to a host-owned device in wall-clock realtime,
//! detects bot-speech start/stop by inter-chunk silence, and honors
//! barge-in without any special-cased interrupt handling — the silence
//! timeout alone retires `speaking` once the upstream stops producing
//! audio, which is exactly what happens once an interrupt cuts off the
//! sentence assembler (§4.5, §8 property 9, S-7).
//!
//! The actual "sleep until `delay_until` and write to the device" step is
//! the device-driver boundary §1 puts out of scope: this process only
//! computes `delay_until` and emits the `audio-write` command frame: a
//! host-owned worker (symmetric to the transport-in injection point in
//! [`crate::transport_in`]) does the sleeping and the write.

use crate::error::{ConfigError, Error};
use crate::frame::{AudioPayload, AudioWriteCommandPayload, Frame, FrameKind};
use crate::process::{Descriptor, InitOutcome, Lifecycle, Outputs, Process, PORT_IN, PORT_SYS_IN};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::warn;

pub const PORT_AUDIO_WRITE: &str = "audio-write";
pub const PORT_TIMER_OUT: &str = "timer-out";

const DEFAULT_DURATION_MS: i64 = 20;
const DEFAULT_SILENCE_THRESHOLD_MS: i64 = 200;
const TIMER_TICK_MS: u64 = 20;

/// Collaborator-specific encoder swapped in via `system-config-change`
/// (§4.5) — e.g. the Twilio media-frame base64/JSON wrapper.
pub type Serializer = Arc<dyn Fn(&AudioPayload) -> Vec<u8> + Send + Sync>;

fn real_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct RealtimePacer {
    speaking: bool,
    last_send_time: i64,
    sending_interval: i64,
    silence_threshold_ms: i64,
    serializers: HashMap<String, Serializer>,
    serializer: Option<Serializer>,
    now: Arc<dyn Fn() -> i64 + Send + Sync>,
    timer_task: Option<tokio::task::JoinHandle<()>>,
}

impl RealtimePacer {
    /// `serializers` is the registry of named encoders a
    /// `system-config-change{key: "transport/serializer", value: <name>}`
    /// frame may select from — analogous to the tool dispatcher's
    /// name-keyed handler registry.
    pub fn new(serializers: HashMap<String, Serializer>) -> Self {
        Self {
            speaking: false,
            last_send_time: 0,
            sending_interval: DEFAULT_DURATION_MS / 2,
            silence_threshold_ms: DEFAULT_SILENCE_THRESHOLD_MS,
            serializers,
            serializer: None,
            now: Arc::new(real_now_ms),
            timer_task: None,
        }
    }

    /// Test-only hook: replace the wall-clock reader with a fake so
    /// `delay_until` assertions don't race real time (§8 property 8, S-5).
    #[cfg(test)]
    pub fn with_clock(mut self, now: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        self.now = now;
        self
    }

    fn on_audio_frame(&mut self, payload: &AudioPayload, ts: i64) -> Outputs {
        let now = (self.now)();
        let mut outputs: Outputs = Vec::new();

        if !self.speaking {
            self.speaking = true;
            outputs.push((
                "out",
                Frame::bot_speech_start(ts).expect("bot-speech-start has no payload to reject"),
            ));
        }

        let delay_until = now.max(self.last_send_time + self.sending_interval);
        self.last_send_time = delay_until;

        let data = match &self.serializer {
            Some(serialize) => serialize(payload),
            None => payload.bytes.clone(),
        };

        let command = Frame::audio_write_command(
            AudioWriteCommandPayload {
                data,
                sample_rate: payload.sample_rate,
                delay_until_ms: delay_until,
            },
            ts,
        )
        .expect("audio-write-command has no payload to reject");
        outputs.push((PORT_AUDIO_WRITE, command));
        outputs
    }

    fn on_timer_tick(&mut self, ts: i64) -> Outputs {
        let now = (self.now)();
        if self.speaking && now - self.last_send_time > self.silence_threshold_ms {
            self.speaking = false;
            vec![(
                "out",
                Frame::bot_speech_stop(ts).expect("bot-speech-stop has no payload to reject"),
            )]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl Process for RealtimePacer {
    fn name(&self) -> &'static str {
        "realtime-pacer"
    }

    fn describe(&self) -> Descriptor {
        Descriptor {
            in_ports: vec![PORT_IN, PORT_SYS_IN],
            out_ports: vec!["out", PORT_AUDIO_WRITE],
            required_params: vec![],
        }
    }

    async fn init(&mut self, params: serde_json::Value) -> Result<InitOutcome, ConfigError> {
        let duration_ms = params
            .get("duration-ms")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_DURATION_MS);
        self.sending_interval = duration_ms / 2;
        self.silence_threshold_ms = params
            .get("silence-threshold-ms")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_SILENCE_THRESHOLD_MS);

        let (tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(TIMER_TICK_MS));
            loop {
                interval.tick().await;
                let Ok(frame) = Frame::internal_timer_tick(real_now_ms()) else {
                    continue;
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });
        self.timer_task = Some(task);

        Ok(InitOutcome {
            extra_in_ports: vec![(PORT_TIMER_OUT.to_string(), rx)],
        })
    }

    async fn transform(&mut self, port: &str, frame: Frame) -> Result<Outputs, Error> {
        if port == PORT_TIMER_OUT {
            return Ok(self.on_timer_tick(frame.ts));
        }

        let ts = frame.ts;
        let outputs = match frame.kind() {
            FrameKind::AudioOutputRaw(payload) => self.on_audio_frame(payload, ts),
            FrameKind::SystemConfigChange(payload) if payload.key == "transport/serializer" => {
                // Either a bare registry key ("twilio") or a transport-supplied
                // object carrying extra context alongside it, e.g. Twilio's
                // `{"provider": "twilio", "stream_sid": ...}`.
                let name = payload
                    .value
                    .as_str()
                    .or_else(|| payload.value.get("provider").and_then(|v| v.as_str()))
                    .unwrap_or_default();
                match self.serializers.get(name) {
                    Some(serializer) => self.serializer = Some(serializer.clone()),
                    None => warn!(serializer = name, "unknown serializer requested"),
                }
                Vec::new()
            }
            _ => Vec::new(),
        };
        Ok(outputs)
    }

    async fn transition(&mut self, event: Lifecycle) -> Result<(), Error> {
        if event == Lifecycle::Stop {
            if let Some(task) = self.timer_task.take() {
                task.abort();
            }
        }
        Ok(())
    }
}
