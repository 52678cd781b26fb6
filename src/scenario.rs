//! Scenario Manager (frame surface)
//!
//! A structured-dialog state machine that injects prompts and tool
//! definitions into the flow on node transitions (§4.8). Its authoring
//! API (how a host builds up the node graph) is out of scope (§1) — this
//! module only covers the part that is in scope: `set_node` running
//! actions and producing exactly one `scenario-context-update` frame,
//! plus the `Process` wiring that drives a transition automatically when
//! a transition tool's result comes back from the dispatcher.

use crate::context::{Message, ToolDef};
use crate::error::{ConfigError, Error};
use crate::frame::{Frame, FrameKind, ScenarioContextUpdatePayload};
use crate::process::{Descriptor, InitOutcome, Lifecycle, Outputs, Process, PORT_IN, PORT_SYS_IN};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type ActionHandler = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// One action a node's pre/post hook runs (§4.8).
#[derive(Clone)]
pub enum Action {
    TtsSay { text: String },
    EndConversation,
    Custom(ActionHandler),
}

#[derive(Clone, Default)]
pub struct ScenarioNode {
    pub task_messages: Vec<Message>,
    pub tools: Vec<ToolDef>,
    pub run_llm: Option<bool>,
    pub pre_actions: Vec<Action>,
    pub post_actions: Vec<Action>,
}

pub struct ScenarioManager {
    nodes: HashMap<String, ScenarioNode>,
    current_node: String,
}

impl ScenarioManager {
    pub fn new(nodes: HashMap<String, ScenarioNode>, start: impl Into<String>) -> Self {
        Self {
            nodes,
            current_node: start.into(),
        }
    }

    pub fn current_node(&self) -> &str {
        &self.current_node
    }

    async fn run_actions(&self, actions: &[Action], ts: i64) -> (Outputs, bool) {
        let mut outputs = Outputs::new();
        let mut end_conversation = false;
        for action in actions {
            match action {
                Action::TtsSay { text } => {
                    if let Ok(frame) = Frame::speak_frame(text.clone(), ts) {
                        outputs.push(("out", frame));
                    }
                }
                Action::EndConversation => end_conversation = true,
                Action::Custom(handler) => handler().await,
            }
        }
        (outputs, end_conversation)
    }

    /// Runs the prior node's post-actions, advances `current_node`, runs
    /// the new node's pre-actions, then injects one
    /// `scenario-context-update` frame (§4.8).
    pub async fn set_node(&mut self, node_id: impl Into<String>, ts: i64) -> Outputs {
        let node_id = node_id.into();
        let mut outputs = Outputs::new();

        if let Some(prior) = self.nodes.get(&self.current_node).cloned() {
            let (post_out, end) = self.run_actions(&prior.post_actions, ts).await;
            outputs.extend(post_out);
            if end {
                outputs.push(("out", Frame::system_stop(ts).expect("system-stop has no payload")));
                return outputs;
            }
        }

        self.current_node = node_id.clone();

        let Some(node) = self.nodes.get(&node_id).cloned() else {
            return outputs;
        };

        let (pre_out, end) = self.run_actions(&node.pre_actions, ts).await;
        outputs.extend(pre_out);
        if end {
            outputs.push(("out", Frame::system_stop(ts).expect("system-stop has no payload")));
            return outputs;
        }

        let update = Frame::scenario_context_update(
            ScenarioContextUpdatePayload {
                messages: node.task_messages.clone(),
                tools: node.tools.clone(),
                run_llm: node.run_llm.unwrap_or(true),
            },
            ts,
        )
        .expect("scenario-context-update has no payload to reject");
        outputs.push(("out", update));
        outputs
    }
}

#[async_trait]
impl Process for ScenarioManager {
    fn name(&self) -> &'static str {
        "scenario-manager"
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
        // A transition tool's result names the node to move to once its
        // handler returns (§3.3, §4.4) — the dispatcher/assembler surface
        // that as `on_update_transition` on the tool-call-result payload.
        if let FrameKind::LlmToolCallResult(payload) = frame.kind() {
            if let Some(node_id) = payload.on_update_transition.clone() {
                return Ok(self.set_node(node_id, ts).await);
            }
        }
        Ok(Vec::new())
    }

    async fn transition(&mut self, _event: Lifecycle) -> Result<(), Error> {
        Ok(())
    }
}
