//! Execution requests ("flow runs") and their DSL form

use serde_json::{Map, Value};
use std::fmt::Write;

/// Outcome state reported by the engine for a successful action
pub const STATE_SUCCESS: &str = "SUCCESS";
/// Outcome state reported by the engine for a failed action
pub const STATE_FAIL: &str = "FAIL";
/// Terminal target of a flow run transition
pub const TARGET_DONE: &str = "done";

/// One action inside a flow run
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRunStep {
    pub name: String,

    /// Outcome state -> next step, in declaration order
    pub transitions: Vec<(String, String)>,

    /// Engine action to run
    pub action: String,

    /// Action arguments
    pub args: Map<String, Value>,
}

/// An execution request submitted to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRun {
    pub name: String,
    pub steps: Vec<FlowRunStep>,
}

impl FlowRun {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn add_step(
        &mut self,
        name: impl Into<String>,
        transitions: Vec<(String, String)>,
        action: impl Into<String>,
        args: Map<String, Value>,
    ) -> &mut Self {
        self.steps.push(FlowRunStep {
            name: name.into(),
            transitions,
            action: action.into(),
            args,
        });
        self
    }

    /// Both outcomes end the flow: the controller learns the result from the
    /// report stream, not from routing inside the engine.
    pub fn terminal_transitions() -> Vec<(String, String)> {
        vec![
            (STATE_SUCCESS.to_string(), TARGET_DONE.to_string()),
            (STATE_FAIL.to_string(), TARGET_DONE.to_string()),
        ]
    }

    /// Render the request in the engine's flow DSL
    pub fn generate(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "flow_run {}", self.name);
        for step in &self.steps {
            let transitions = step
                .transitions
                .iter()
                .map(|(state, target)| format!("{state}->{target}"))
                .collect::<Vec<_>>()
                .join(" | ");
            let _ = writeln!(out, "step {} => ({}) {{", step.name, transitions);
            let _ = writeln!(out, "    action = \"{}\";", escape(&step.action));
            let _ = writeln!(out, "    args = ({});", render_args(&step.args));
            let _ = writeln!(out, "}};");
        }
        out.push_str("flow_run_end");
        out
    }
}

fn render_args(args: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = args.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| format!("{}={}", key, render_value(&args[key])))
        .collect::<Vec<_>>()
        .join(",")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", escape(s)),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "\"\"".to_string(),
        Value::Array(_) | Value::Object(_) => format!("\"{}\"", escape(&value.to_string())),
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
