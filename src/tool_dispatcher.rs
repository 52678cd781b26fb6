//! Tool Dispatcher
//!
//! The assistant assembler's sibling process (§9: "model the dispatcher as
//! a sibling process with its own in-port/out-port, not as a back-edge").
//! Reads the tool-call context append the assembler writes to its
//! `tool-write` port, resolves and invokes the matching registered
//! handler, and reports back on `out` with an `llm-tool-call-result`
//! frame. Handlers run off this process's own transform call on a spawned
//! task so a slow tool never stalls frame routing elsewhere in the flow
//! (§4.4, §5).

use crate::context::{Message, RegisteredTool, ToolCall};
use crate::error::{ConfigError, Error, ToolError};
use crate::frame::{Frame, FrameKind, ToolCallResultPayload};
use crate::process::{Descriptor, InitOutcome, Lifecycle, Outputs, Process, PORT_IN, PORT_SYS_IN};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;

const PORT_DONE: &str = "tool-done";

pub struct ToolDispatcher {
    tools: HashMap<String, RegisteredTool>,
    done_tx: Option<mpsc::Sender<Frame>>,
}

impl ToolDispatcher {
    pub fn new(tools: Vec<RegisteredTool>) -> Self {
        let tools = tools.into_iter().map(|t| (t.def.function.name.clone(), t)).collect();
        Self { tools, done_tx: None }
    }

    async fn dispatch(&self, call: ToolCall, request: Message) -> Frame {
        dispatch(&self.tools, call, request).await
    }
}

async fn dispatch(tools: &HashMap<String, RegisteredTool>, call: ToolCall, request: Message) -> Frame {
    let ts = 0;
    let result = match tools.get(&call.function.name) {
        None => Err(ToolError::NotFound(call.function.name.clone())),
        Some(tool) => {
            let args: serde_json::Value =
                serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null);
            match (tool.handler)(args).await {
                Ok(value) => Ok((value, tool.transition_to.clone())),
                Err(e) => Err(ToolError::HandlerFailed(e)),
            }
        }
    };

    let (text, transition_to, run_llm) = match result {
        Ok((value, transition_to)) => {
            let text = serde_json::to_string(&value).unwrap_or_default();
            let run_llm = transition_to.is_none();
            (text, transition_to, run_llm)
        }
        Err(ToolError::NotFound(_)) => ("Tool not found".to_string(), None, true),
        Err(ToolError::HandlerFailed(reason)) => {
            (format!("Something went wrong. Error: {reason}"), None, true)
        }
    };

    let result_message = Message::tool_result(call.id.clone(), text);
    Frame::llm_tool_call_result(
        ToolCallResultPayload {
            request,
            result: result_message,
            run_llm,
            on_update_transition: transition_to,
        },
        ts,
    )
    .expect("tool-call-result payload always satisfies schema")
}

#[async_trait]
impl Process for ToolDispatcher {
    fn name(&self) -> &'static str {
        "tool-dispatcher"
    }

    fn describe(&self) -> Descriptor {
        Descriptor {
            in_ports: vec![PORT_IN, PORT_SYS_IN],
            out_ports: vec!["out"],
            required_params: vec![],
        }
    }

    async fn init(&mut self, _params: serde_json::Value) -> Result<InitOutcome, ConfigError> {
        let (tx, rx) = mpsc::channel(crate::flow::DEFAULT_TOOL_CAPACITY);
        self.done_tx = Some(tx);
        Ok(InitOutcome {
            extra_in_ports: vec![(PORT_DONE.to_string(), rx)],
        })
    }

    async fn transform(&mut self, port: &str, frame: Frame) -> Result<Outputs, Error> {
        if port == PORT_DONE {
            return Ok(vec![("out", frame)]);
        }

        let FrameKind::LlmContextMessagesAppend(payload) = frame.kind() else {
            return Ok(vec![]);
        };
        let Some(request @ Message::Assistant { tool_calls: Some(calls), .. }) = payload.messages.last() else {
            return Ok(vec![]);
        };

        let request = request.clone();
        let Some(done_tx) = self.done_tx.clone() else {
            return Ok(vec![]);
        };

        for call in calls.clone() {
            let request = request.clone();
            let tools = self.tools.clone();
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                let result_frame = dispatch(&tools, call, request).await;
                let _ = done_tx.send(result_frame).await;
            });
        }

        Ok(vec![])
    }

    async fn transition(&mut self, event: Lifecycle) -> Result<(), Error> {
        if event == Lifecycle::Stop {
            self.done_tx = None;
        }
        Ok(())
    }
}
