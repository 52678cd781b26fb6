//! Process Trait
//!
//! A `Process` is the quadruple of behaviors in §4.2: `describe`,
//! `init`, `transform`, `transition`. Rust's `&mut self` takes the place of
//! explicit `state`/`state'` threading: `async fn transform(&mut self, ...)`
//! rather than returning a new state value each call.

use crate::error::{ConfigError, Error};
use crate::frame::Frame;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Declared shape of a process: its named ports and the parameter keys it
/// requires. `required` entries without a matching key in `params` (and no
/// default) fail validation with `Error::BadConfig` before the flow starts.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    pub in_ports: Vec<&'static str>,
    pub out_ports: Vec<&'static str>,
    pub required_params: Vec<&'static str>,
}

/// Lifecycle events delivered to `transition` (§3.5, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Start,
    Resume,
    Pause,
    Stop,
}

/// Side-channels a process wants the runtime to read *into* it (e.g. the
/// pacer's internally owned timer ticks, or the tool dispatcher's
/// `tool-read` reply channel) as though they were declared input ports.
#[derive(Default)]
pub struct InitOutcome {
    pub extra_in_ports: Vec<(String, mpsc::Receiver<Frame>)>,
}

/// `(out_port, frame)` pairs produced by one `transform` call. The runtime
/// routes each through `conns` and classifies the frame on the way out —
/// the process only picks the port, never the destination channel.
pub type Outputs = Vec<(&'static str, Frame)>;

pub const PORT_IN: &str = "in";
pub const PORT_SYS_IN: &str = "sys-in";

#[async_trait]
pub trait Process: Send {
    /// Process name, used for logging and `Error::BadConfig` attribution.
    fn name(&self) -> &'static str;

    fn describe(&self) -> Descriptor;

    /// Apply parameter defaults and validate; called once before the flow
    /// starts. No process in the flow is started if any fails (§4.2).
    async fn init(&mut self, params: serde_json::Value) -> Result<InitOutcome, ConfigError>;

    /// Process one inbound frame, producing zero or more outbound frames.
    /// Pure except for side effects reached through state the process owns
    /// exclusively (§3.5) — a transform call never blocks on I/O itself.
    async fn transform(&mut self, port: &str, frame: Frame) -> Result<Outputs, Error>;

    /// Lifecycle transition. `Stop` must release every resource the
    /// process allocated and close any extra in-/out-ports it created
    /// (§3.5, §9) — implementations should return promptly.
    async fn transition(&mut self, event: Lifecycle) -> Result<(), Error>;
}
