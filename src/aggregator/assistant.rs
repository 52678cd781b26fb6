//! Assistant Context Assembler
//!
//! Assembles streamed `llm-text-chunk` / `llm-tool-call-chunk` fragments
//! into one assistant message per response, committing a partial turn to
//! the context on barge-in (§4.4). The companion tool dispatcher lives in
//! [`crate::tool_dispatcher`] as a sibling process (§9: "model the
//! dispatcher as a sibling process ... not a back-edge in the topology").

use crate::context::{Context, Message, ToolCall, ToolCallFunction, ToolCallKind};
use crate::error::{ConfigError, Error};
use crate::frame::{Frame, FrameKind};
use crate::process::{Descriptor, InitOutcome, Lifecycle, Outputs, Process, PORT_IN, PORT_SYS_IN};
use async_trait::async_trait;

pub const PORT_TOOL_WRITE: &str = "tool-write";

#[derive(Default)]
struct Aggregation {
    content: String,
    tool_call_id: Option<String>,
    tool_name: Option<String>,
    tool_args: String,
}

impl Aggregation {
    fn has_tool_call(&self) -> bool {
        self.tool_name.is_some()
    }
}

pub struct AssistantAssembler {
    ctx: Context,
    agg: Aggregation,
}

impl Default for AssistantAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantAssembler {
    pub fn new() -> Self {
        Self {
            ctx: Context::new(),
            agg: Aggregation::default(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    fn commit_partial_turn(&mut self) {
        if !self.agg.content.is_empty() {
            self.ctx = self.ctx.append(Message::assistant_text(self.agg.content.clone()));
        }
        self.agg = Aggregation::default();
    }

    fn build_response_end_message(&mut self) -> Option<Message> {
        if self.agg.has_tool_call() {
            let call = ToolCall {
                id: self.agg.tool_call_id.clone().unwrap_or_default(),
                kind: ToolCallKind::Function,
                function: ToolCallFunction {
                    name: self.agg.tool_name.clone().unwrap_or_default(),
                    arguments: self.agg.tool_args.clone(),
                },
            };
            Some(Message::assistant_tool_calls(vec![call]))
        } else if !self.agg.content.is_empty() {
            Some(Message::assistant_text(self.agg.content.clone()))
        } else {
            // Open question (§9): an empty assistant turn with no pending
            // tool call is a no-op — don't append it to the context.
            None
        }
    }
}

#[async_trait]
impl Process for AssistantAssembler {
    fn name(&self) -> &'static str {
        "assistant-assembler"
    }

    fn describe(&self) -> Descriptor {
        Descriptor {
            in_ports: vec![PORT_IN, PORT_SYS_IN],
            out_ports: vec!["out", PORT_TOOL_WRITE],
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
            FrameKind::LlmResponseStart => {
                self.agg = Aggregation::default();
            }
            FrameKind::LlmTextChunk(delta) => {
                self.agg.content.push_str(&delta.text);
            }
            FrameKind::LlmToolCallChunk(delta) => {
                if self.agg.tool_call_id.is_none() {
                    self.agg.tool_call_id = delta.id.clone();
                }
                if self.agg.tool_name.is_none() {
                    self.agg.tool_name = delta.function_name.clone();
                }
                if let Some(fragment) = &delta.arguments_fragment {
                    self.agg.tool_args.push_str(fragment);
                }
            }
            FrameKind::LlmResponseEnd => {
                let is_tool_call = self.agg.has_tool_call();
                if let Some(message) = self.build_response_end_message() {
                    self.ctx = self.ctx.append(message.clone());
                    let appended =
                        Frame::llm_context_messages_append(vec![message], false, is_tool_call, ts)?;
                    outputs.push(("out", appended.clone()));
                    if is_tool_call {
                        outputs.push((PORT_TOOL_WRITE, appended));
                    }
                }
                self.agg = Aggregation::default();
            }
            FrameKind::LlmToolCallResult(payload) => {
                self.ctx = self.ctx.append(payload.result.clone());
                if payload.on_update_transition.is_none() {
                    let appended = Frame::llm_context_messages_append(
                        vec![payload.result.clone()],
                        payload.run_llm,
                        false,
                        ts,
                    )?;
                    outputs.push(("out", appended));
                }
                // else: a scenario transition is pending; wait for the
                // scenario manager's `scenario-context-update` instead.
            }
            FrameKind::LlmContext(payload) => {
                self.ctx = payload.context.clone();
            }
            FrameKind::ControlInterruptStart => {
                self.commit_partial_turn();
            }
            _ => {}
        }

        Ok(outputs)
    }

    async fn transition(&mut self, _event: Lifecycle) -> Result<(), Error> {
        Ok(())
    }
}
