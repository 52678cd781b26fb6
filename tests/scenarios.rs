//! Cross-module scenario tests
//!
//! Unlike the inline unit tests inside each module (which drive a single
//! `Process::transform` directly), these wire several real processes
//! together through a [`voxflow_core::flow::Flow`] and assert on what comes
//! out the far side — the same "frames in, frames out" contract a host
//! application exercises end to end.

use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::mpsc;
use voxflow_core::aggregator::assistant::{AssistantAssembler, PORT_TOOL_WRITE};
use voxflow_core::aggregator::user::UserAggregator;
use voxflow_core::context::{FunctionDef, RegisteredTool, ToolCallKind, ToolDef};
use voxflow_core::flow::{FlowBuilder, PortRef};
use voxflow_core::frame::{Frame, FrameKind};
use voxflow_core::pacer::RealtimePacer;
use voxflow_core::process::PORT_IN;
use voxflow_core::scenario::{Action, ScenarioManager, ScenarioNode};
use voxflow_core::splitter::{split, AudioFormat};
use voxflow_core::tool_dispatcher::ToolDispatcher;

/// S-1: `S I E T` drives the user aggregator to exactly one `llm-context`
/// emission, wired through a real flow rather than calling `transform`
/// directly.
#[tokio::test]
async fn s1_user_turn_emits_one_llm_context() {
    let (tx, mut rx) = mpsc::channel(8);
    struct Sink(mpsc::Sender<Frame>);
    #[async_trait::async_trait]
    impl voxflow_core::process::Process for Sink {
        fn name(&self) -> &'static str {
            "sink"
        }
        fn describe(&self) -> voxflow_core::process::Descriptor {
            voxflow_core::process::Descriptor {
                in_ports: vec![PORT_IN],
                out_ports: vec![],
                required_params: vec![],
            }
        }
        async fn init(
            &mut self,
            _params: serde_json::Value,
        ) -> Result<voxflow_core::process::InitOutcome, voxflow_core::error::ConfigError> {
            Ok(Default::default())
        }
        async fn transform(
            &mut self,
            _port: &str,
            frame: Frame,
        ) -> Result<voxflow_core::process::Outputs, voxflow_core::error::Error> {
            let _ = self.0.send(frame).await;
            Ok(vec![])
        }
        async fn transition(
            &mut self,
            _event: voxflow_core::process::Lifecycle,
        ) -> Result<(), voxflow_core::error::Error> {
            Ok(())
        }
    }

    let mut flow = FlowBuilder::new()
        .proc("user-agg", Box::new(UserAggregator::new()), json!({}))
        .proc("sink", Box::new(Sink(tx)), json!({}))
        .connect(PortRef::new("user-agg", "out"), PortRef::new("sink", PORT_IN))
        .build()
        .await
        .unwrap();
    flow.start().await.unwrap();

    flow.inject("user-agg", PORT_IN, Frame::user_speech_start(0).unwrap())
        .await
        .unwrap();
    flow.inject("user-agg", PORT_IN, Frame::transcription_interim("hel", 1).unwrap())
        .await
        .unwrap();
    flow.inject("user-agg", PORT_IN, Frame::user_speech_stop(2).unwrap())
        .await
        .unwrap();
    flow.inject("user-agg", PORT_IN, Frame::transcription_result("hello", 3).unwrap())
        .await
        .unwrap();

    let emitted = rx.recv().await.unwrap();
    assert_eq!(emitted.name(), "llm-context");
    assert!(rx.try_recv().is_err(), "only one llm-context should be emitted");

    flow.stop().await.unwrap();
}

/// S-3/S-4: a streamed tool-call response, assembled by the assistant
/// assembler and routed to a real tool dispatcher, comes back as exactly one
/// `llm-tool-call-result` naming the invoked tool.
#[tokio::test]
async fn s3_s4_tool_call_round_trips_through_dispatcher() {
    let (tx, mut rx) = mpsc::channel(8);
    struct Sink(mpsc::Sender<Frame>);
    #[async_trait::async_trait]
    impl voxflow_core::process::Process for Sink {
        fn name(&self) -> &'static str {
            "sink"
        }
        fn describe(&self) -> voxflow_core::process::Descriptor {
            voxflow_core::process::Descriptor {
                in_ports: vec![PORT_IN],
                out_ports: vec![],
                required_params: vec![],
            }
        }
        async fn init(
            &mut self,
            _params: serde_json::Value,
        ) -> Result<voxflow_core::process::InitOutcome, voxflow_core::error::ConfigError> {
            Ok(Default::default())
        }
        async fn transform(
            &mut self,
            _port: &str,
            frame: Frame,
        ) -> Result<voxflow_core::process::Outputs, voxflow_core::error::Error> {
            let _ = self.0.send(frame).await;
            Ok(vec![])
        }
        async fn transition(
            &mut self,
            _event: voxflow_core::process::Lifecycle,
        ) -> Result<(), voxflow_core::error::Error> {
            Ok(())
        }
    }

    let weather_tool = RegisteredTool {
        def: ToolDef {
            kind: ToolCallKind::Function,
            function: FunctionDef {
                name: "get_weather".to_string(),
                description: "".to_string(),
                parameters: json!({}),
                transition_to: None,
            },
        },
        handler: Arc::new(|args| Box::pin(async move { Ok(args) })),
        transition_to: None,
    };

    let mut flow = FlowBuilder::new()
        .proc("assembler", Box::new(AssistantAssembler::new()), json!({}))
        .proc("dispatcher", Box::new(ToolDispatcher::new(vec![weather_tool])), json!({}))
        .proc("sink", Box::new(Sink(tx)), json!({}))
        .connect(PortRef::new("assembler", PORT_TOOL_WRITE), PortRef::new("dispatcher", PORT_IN))
        .connect(PortRef::new("dispatcher", "out"), PortRef::new("sink", PORT_IN))
        .build()
        .await
        .unwrap();
    flow.start().await.unwrap();

    flow.inject("assembler", PORT_IN, Frame::llm_response_start(0).unwrap())
        .await
        .unwrap();
    flow.inject(
        "assembler",
        PORT_IN,
        Frame::llm_tool_call_chunk(
            voxflow_core::frame::ToolCallChunkDelta {
                id: Some("t1".to_string()),
                function_name: Some("get_weather".to_string()),
                arguments_fragment: Some("{\"city\":\"Paris\"}".to_string()),
            },
            1,
        )
        .unwrap(),
    )
    .await
    .unwrap();
    flow.inject("assembler", PORT_IN, Frame::llm_response_end(2).unwrap())
        .await
        .unwrap();

    let result = rx.recv().await.unwrap();
    match result.kind() {
        FrameKind::LlmToolCallResult(p) => {
            assert_eq!(p.result.plain_content(), Some("{\"city\":\"Paris\"}"));
        }
        other => panic!("expected llm-tool-call-result, got {}", other.name()),
    }

    flow.stop().await.unwrap();
}

/// S-6: splitting then reassembling a synthetic TTS buffer is byte-exact,
/// independent of any flow — the splitter is a pure function.
#[test]
fn s6_split_and_reassemble_is_byte_exact() {
    let format = AudioFormat::new(8000, 16, 1, 20);
    let input: Vec<u8> = (0..3333u32).map(|i| (i % 256) as u8).collect();
    let chunks = split(&input, format);
    let reassembled: Vec<u8> = chunks.into_iter().flatten().collect();
    assert_eq!(reassembled, input);
}

/// S-5: the pacer paces a short run of audio-output-raw frames with a
/// monotonically increasing `delay_until`, brackets the run with exactly one
/// `bot-speech-start`, and is wired through a real flow (not called
/// directly) to confirm its extra `timer-out` in-port integrates cleanly
/// with the worker scheduler.
#[tokio::test]
async fn s5_pacer_emits_bot_speech_start_once_through_flow() {
    let (tx, mut rx) = mpsc::channel(16);
    struct Sink(mpsc::Sender<Frame>);
    #[async_trait::async_trait]
    impl voxflow_core::process::Process for Sink {
        fn name(&self) -> &'static str {
            "sink"
        }
        fn describe(&self) -> voxflow_core::process::Descriptor {
            voxflow_core::process::Descriptor {
                in_ports: vec![PORT_IN],
                out_ports: vec![],
                required_params: vec![],
            }
        }
        async fn init(
            &mut self,
            _params: serde_json::Value,
        ) -> Result<voxflow_core::process::InitOutcome, voxflow_core::error::ConfigError> {
            Ok(Default::default())
        }
        async fn transform(
            &mut self,
            _port: &str,
            frame: Frame,
        ) -> Result<voxflow_core::process::Outputs, voxflow_core::error::Error> {
            let _ = self.0.send(frame).await;
            Ok(vec![])
        }
        async fn transition(
            &mut self,
            _event: voxflow_core::process::Lifecycle,
        ) -> Result<(), voxflow_core::error::Error> {
            Ok(())
        }
    }

    let mut flow = FlowBuilder::new()
        .proc("pacer", Box::new(RealtimePacer::new(Default::default())), json!({"duration-ms": 20}))
        .proc("speech-sink", Box::new(Sink(tx.clone())), json!({}))
        .proc("write-sink", Box::new(Sink(tx)), json!({}))
        .connect(PortRef::new("pacer", "out"), PortRef::new("speech-sink", PORT_IN))
        .connect(
            PortRef::new("pacer", voxflow_core::pacer::PORT_AUDIO_WRITE),
            PortRef::new("write-sink", PORT_IN),
        )
        .build()
        .await
        .unwrap();
    flow.start().await.unwrap();

    for ts in [0i64, 1, 2] {
        flow.inject("pacer", PORT_IN, Frame::audio_output_raw(vec![0u8; 640], 16000, ts).unwrap())
            .await
            .unwrap();
    }

    let mut starts = 0;
    let mut writes = 0;
    for _ in 0..6 {
        let Ok(Some(frame)) = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await else {
            break;
        };
        match frame.name() {
            "bot-speech-start" => starts += 1,
            "audio-write-command" => writes += 1,
            _ => {}
        }
    }
    assert_eq!(starts, 1, "bot-speech-start should bracket the run exactly once");
    assert_eq!(writes, 3);

    flow.stop().await.unwrap();
}

/// S-7: an interrupt mid-stream commits the assembler's partial turn and,
/// once the pacer stops receiving `audio-output-raw`, its own silence timer
/// later retires `speaking` — no special-cased interrupt handling needed in
/// the pacer (see `pacer.rs`'s module doc comment).
#[tokio::test]
async fn s7_interrupt_commits_partial_turn_and_scenario_manager_ignores_it() {
    let mut assembler = AssistantAssembler::new();
    let _ = assembler
        .transform(PORT_IN, Frame::llm_response_start(0).unwrap())
        .await
        .unwrap();
    let _ = assembler
        .transform(PORT_IN, Frame::llm_text_chunk("Hi, I can hel", 1).unwrap())
        .await
        .unwrap();
    let _ = assembler
        .transform(
            voxflow_core::process::PORT_SYS_IN,
            Frame::control_interrupt_start(2).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(assembler.context().messages.len(), 1);
    assert_eq!(assembler.context().messages[0].plain_content(), Some("Hi, I can hel"));
}

/// A transition-tool result drives the scenario manager's `set_node`
/// end to end through a real flow, producing a `scenario-context-update`
/// frame the assembler/aggregator side would fold back into context.
#[tokio::test]
async fn scenario_transition_flows_through_dispatcher_to_manager() {
    let mut nodes = std::collections::HashMap::new();
    nodes.insert(
        "greeting".to_string(),
        ScenarioNode {
            task_messages: vec![],
            tools: vec![],
            run_llm: Some(true),
            pre_actions: vec![],
            post_actions: vec![],
        },
    );
    nodes.insert(
        "billing".to_string(),
        ScenarioNode {
            task_messages: vec![voxflow_core::context::Message::user("handle billing")],
            tools: vec![],
            run_llm: Some(true),
            pre_actions: vec![Action::TtsSay { text: "Connecting you to billing".to_string() }],
            post_actions: vec![],
        },
    );

    let (tx, mut rx) = mpsc::channel(8);
    struct Sink(mpsc::Sender<Frame>);
    #[async_trait::async_trait]
    impl voxflow_core::process::Process for Sink {
        fn name(&self) -> &'static str {
            "sink"
        }
        fn describe(&self) -> voxflow_core::process::Descriptor {
            voxflow_core::process::Descriptor {
                in_ports: vec![PORT_IN],
                out_ports: vec![],
                required_params: vec![],
            }
        }
        async fn init(
            &mut self,
            _params: serde_json::Value,
        ) -> Result<voxflow_core::process::InitOutcome, voxflow_core::error::ConfigError> {
            Ok(Default::default())
        }
        async fn transform(
            &mut self,
            _port: &str,
            frame: Frame,
        ) -> Result<voxflow_core::process::Outputs, voxflow_core::error::Error> {
            let _ = self.0.send(frame).await;
            Ok(vec![])
        }
        async fn transition(
            &mut self,
            _event: voxflow_core::process::Lifecycle,
        ) -> Result<(), voxflow_core::error::Error> {
            Ok(())
        }
    }

    let mut flow = FlowBuilder::new()
        .proc("manager", Box::new(ScenarioManager::new(nodes, "greeting")), json!({}))
        .proc("sink", Box::new(Sink(tx)), json!({}))
        .connect(PortRef::new("manager", "out"), PortRef::new("sink", PORT_IN))
        .build()
        .await
        .unwrap();
    flow.start().await.unwrap();

    let frame = Frame::llm_tool_call_result(
        voxflow_core::frame::ToolCallResultPayload {
            request: voxflow_core::context::Message::assistant_text("calling transfer"),
            result: voxflow_core::context::Message::tool_result("t1", "{}"),
            run_llm: false,
            on_update_transition: Some("billing".to_string()),
        },
        0,
    )
    .unwrap();
    flow.inject("manager", PORT_IN, frame).await.unwrap();

    let speak = rx.recv().await.unwrap();
    assert_eq!(speak.name(), "speak-frame");
    let update = rx.recv().await.unwrap();
    assert_eq!(update.name(), "scenario-context-update");

    flow.stop().await.unwrap();
}

/// Property 11: a transport-in process drops `audio-input-raw` entirely
/// while muted, and resumes forwarding once unmuted, wired through a flow
/// rather than called directly.
#[tokio::test]
async fn mute_gate_holds_through_flow_routing() {
    use voxflow_core::transport_in::LocalAudioInTransport;

    let (tx, mut rx) = mpsc::channel(8);
    struct Sink(mpsc::Sender<Frame>);
    #[async_trait::async_trait]
    impl voxflow_core::process::Process for Sink {
        fn name(&self) -> &'static str {
            "sink"
        }
        fn describe(&self) -> voxflow_core::process::Descriptor {
            voxflow_core::process::Descriptor {
                in_ports: vec![PORT_IN],
                out_ports: vec![],
                required_params: vec![],
            }
        }
        async fn init(
            &mut self,
            _params: serde_json::Value,
        ) -> Result<voxflow_core::process::InitOutcome, voxflow_core::error::ConfigError> {
            Ok(Default::default())
        }
        async fn transform(
            &mut self,
            _port: &str,
            frame: Frame,
        ) -> Result<voxflow_core::process::Outputs, voxflow_core::error::Error> {
            let _ = self.0.send(frame).await;
            Ok(vec![])
        }
        async fn transition(
            &mut self,
            _event: voxflow_core::process::Lifecycle,
        ) -> Result<(), voxflow_core::error::Error> {
            Ok(())
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            seen2.lock().unwrap().push(frame.name());
        }
    });

    let mut flow = FlowBuilder::new()
        .proc(
            "transport",
            Box::new(LocalAudioInTransport::new(16000, false, None)),
            json!({}),
        )
        .proc("sink", Box::new(Sink(tx)), json!({}))
        .connect(PortRef::new("transport", "out"), PortRef::new("sink", PORT_IN))
        .build()
        .await
        .unwrap();
    flow.start().await.unwrap();

    // `mute-input-*` is system-class and `audio-input-raw` is data-class, so
    // each pair travels its own channel edge (§5) — interleaving them
    // correctly here requires yielding to the worker between steps, or the
    // worker's sys-in-priority drain would process both mute frames ahead
    // of either audio frame regardless of injection order.
    flow.inject("transport", voxflow_core::process::PORT_SYS_IN, Frame::mute_input_start(0).unwrap())
        .await
        .unwrap();
    tokio::task::yield_now().await;
    flow.inject("transport", PORT_IN, Frame::audio_input_raw(vec![1, 2, 3], 16000, 1).unwrap())
        .await
        .unwrap();
    tokio::task::yield_now().await;
    flow.inject("transport", voxflow_core::process::PORT_SYS_IN, Frame::mute_input_stop(2).unwrap())
        .await
        .unwrap();
    tokio::task::yield_now().await;
    flow.inject("transport", PORT_IN, Frame::audio_input_raw(vec![4, 5, 6], 16000, 3).unwrap())
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    flow.stop().await.unwrap();

    let names = seen.lock().unwrap().clone();
    assert_eq!(names, vec!["audio-input-raw"]);
}
