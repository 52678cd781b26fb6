//! Error Taxonomy
//!
//! One variant per error kind the runtime distinguishes. Propagation policy:
//! local recovery for transient I/O, frame-visible surfacing for tool and
//! transport-fatal errors, throw for programmer errors (bad frame / config).

use thiserror::Error;

/// Frame construction failed its payload schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("bad frame ({kind}): {reason}")]
    BadFrame { kind: &'static str, reason: String },
}

/// Process `init` parameters failed validation. Thrown before the flow
/// starts; no process is started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bad config for process `{proc}`: {violations:?}")]
    BadConfig {
        proc: String,
        violations: Vec<String>,
    },
}

/// Recoverable network failure, retried inside the collaborator. Only
/// surfaced to the caller once retries are exhausted (as `TransportFatal`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransientError {
    #[error("transient transport failure: {0}")]
    Transport(String),
}

/// Exhausted retries or an unrecoverable close. Surfaced as a
/// `system-error` frame; the offending process closes its own resources,
/// the flow itself is not torn down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportFatalError {
    #[error("transport failed: {reason}")]
    Fatal { reason: String },
}

/// Tool handler threw or the tool name could not be resolved. Surfaced as a
/// `tool`-role message, never thrown — the LLM is expected to recover on
/// its next turn.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("Something went wrong. Error: {0}")]
    HandlerFailed(String),
}

/// Top-level runtime error, composing each per-concern error kind above via
/// `#[from]` so call sites can use `?` across error boundaries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transient(#[from] TransientError),

    #[error(transparent)]
    TransportFatal(#[from] TransportFatalError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("downstream buffer full, frame dropped: {0}")]
    Backpressure(&'static str),

    #[error("channel closed")]
    ChannelClosed,
}
