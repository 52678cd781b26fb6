//! voxflow-core
//!
//! A real-time, multimodal voice-AI pipeline runtime: the frame protocol,
//! flow graph, conversation state machines, tool dispatcher, and realtime
//! audio output pacer that carry a full spoken conversation between an
//! application and a remote user (telephony stream or local mic/speaker
//! pair).
//!
//! # Core primitives
//!
//! - [`Frame`] — the closed, typed message vocabulary every process
//!   exchanges, with a system/data priority classification.
//! - [`process::Process`] / [`flow::Flow`] — the graph of stateful,
//!   concurrent nodes and the channels/priority scheduling between them.
//! - [`context::Context`] / [`aggregator`] — the authoritative
//!   conversation history and the user/assistant state machines that fold
//!   partial-ordered event streams into it.
//! - [`tool_dispatcher::ToolDispatcher`] — executes model-requested
//!   functions and re-enters their results into the history.
//! - [`pacer::RealtimePacer`] — paces TTS audio to a device in wall-clock
//!   realtime and detects bot-speech start/stop by inter-chunk silence.
//!
//! # Example
//!
//! ```rust,ignore
//! use voxflow_core::flow::{FlowBuilder, PortRef};
//! use voxflow_core::aggregator::user::UserAggregator;
//! use voxflow_core::process::PORT_IN;
//! use serde_json::json;
//!
//! let mut flow = FlowBuilder::new()
//!     .proc("user-agg", Box::new(UserAggregator::new()), json!({}))
//!     .build()
//!     .await?;
//! flow.start().await?;
//! flow.inject("user-agg", PORT_IN, frame).await?;
//! ```

pub mod aggregator;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod flow;
pub mod frame;
pub mod pacer;
pub mod process;
pub mod scenario;
pub mod splitter;
pub mod tool_dispatcher;
pub mod transport_in;

pub use context::{Context, Message, ToolCall, ToolDef};
pub use error::Error;
pub use flow::{Flow, FlowBuilder, PortRef};
pub use frame::{Class, Frame, FrameKind};
pub use process::{Descriptor, Lifecycle, Process};
