//! Verdict submission handler.

use crate::events::{Decision, Verdict};
use crate::ipc::router::u64_field;
use crate::kernel::KernelHandle;
use crate::types::{Error, ProcessId, Result};
use serde_json::Value;

/// Request body: `{"process_id": u64, "decision": "allow" | "block" | 0 | 1}`.
pub fn submit_verdict(kernel: &KernelHandle, body: &Value) -> Result<Value> {
    let verdict = Verdict {
        process_id: ProcessId::new(u64_field(body, "process_id")?),
        decision: parse_decision(body)?,
    };
    let ack = kernel.submit_verdict(verdict);
    Ok(serde_json::to_value(ack)?)
}

fn parse_decision(body: &Value) -> Result<Decision> {
    match body.get("decision") {
        Some(Value::String(s)) => s.parse(),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| Error::validation(format!("Invalid decision: {}", n)))
            .and_then(Decision::from_raw),
        Some(other) => Err(Error::validation(format!("Invalid decision: {}", other))),
        None => Err(Error::validation("Missing required field: decision")),
    }
}
