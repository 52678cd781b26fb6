//! Configuration
//!
//! Typed, `serde`-deserializable mirror of §6's configuration entry
//! points (`procs`, `conns`), so a host can load a flow topology from
//! JSON/TOML instead of hand-assembling a [`crate::flow::FlowBuilder`] in
//! code. Per-process parameters stay opaque `serde_json::Value` here —
//! each [`crate::process::Process`] impl validates its own shape in
//! `init`, deferring parameter validation to each process rather than
//! centralizing it in one schema.

use crate::error::ConfigError;
use crate::flow::{FlowBuilder, PortRef};
use crate::process::Process;
use serde::Deserialize;
use std::collections::HashMap;

/// Ordered `procId -> {proc-type, args}` map (§6). An `indexmap`-style
/// ordering isn't load-bearing for correctness (the flow is a graph, not
/// a pipeline), so a plain `Vec` of entries preserves declaration order
/// for logging/diagnostics without adding a dependency.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcDecl {
    pub id: String,
    #[serde(rename = "type")]
    pub proc_type: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnDecl {
    pub from: (String, String),
    pub to: (String, String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    pub procs: Vec<ProcDecl>,
    pub conns: Vec<ConnDecl>,
}

/// Name-keyed process constructors a host registers once at startup,
/// analogous to [`crate::collaborators`]'s trait-boundary pattern: the
/// config file names a process by its registered type string, never by
/// Rust type, so the wiring stays data-driven.
pub type ProcessFactory = Box<dyn Fn(&serde_json::Value) -> Box<dyn Process> + Send + Sync>;

#[derive(Default)]
pub struct ProcessRegistry {
    factories: HashMap<String, ProcessFactory>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, proc_type: impl Into<String>, factory: ProcessFactory) -> Self {
        self.factories.insert(proc_type.into(), factory);
        self
    }
}

impl FlowConfig {
    /// Resolves each declared process against `registry` and assembles a
    /// [`FlowBuilder`]. Unknown `proc_type`s fail as `Error::BadConfig`
    /// before any process is constructed, matching §4.2's "no process is
    /// started if any fails" rule for parameter validation.
    pub fn build(self, registry: &ProcessRegistry) -> Result<FlowBuilder, ConfigError> {
        let mut builder = FlowBuilder::new();
        for decl in self.procs {
            let Some(factory) = registry.factories.get(&decl.proc_type) else {
                return Err(ConfigError::BadConfig {
                    proc: decl.id,
                    violations: vec![format!("unknown process type `{}`", decl.proc_type)],
                });
            };
            let proc = factory(&decl.args);
            builder = builder.proc(decl.id, proc, decl.args);
        }
        for conn in self.conns {
            builder = builder.connect(
                PortRef::new(conn.from.0, conn.from.1),
                PortRef::new(conn.to.0, conn.to.1),
            );
        }
        Ok(builder)
    }
}
