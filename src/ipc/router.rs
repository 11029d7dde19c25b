//! Control-code routing.
//!
//! Requests name their operation either by a device-control code or by a
//! method name. Codes use the classic `CTL_CODE` bit layout:
//!
//! ```text
//!  31        16 15  14 13          2 1    0
//! ┌────────────┬──────┬─────────────┬──────┐
//! │ device     │access│ function    │method│
//! └────────────┴──────┴─────────────┴──────┘
//! ```

use crate::ipc::handlers;
use crate::kernel::KernelHandle;
use crate::types::{Error, Result};
use serde_json::Value;
use std::fmt;

pub const FILE_DEVICE_UNKNOWN: u32 = 0x0000_0022;
pub const METHOD_BUFFERED: u32 = 0;
pub const FILE_READ_ACCESS: u32 = 0x0001;
pub const FILE_WRITE_ACCESS: u32 = 0x0002;

/// Compose a device-control code.
pub const fn ctl_code(device: u32, function: u32, method: u32, access: u32) -> u32 {
    (device << 16) | (access << 14) | (function << 2) | method
}

/// Operations exposed at the control boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCode {
    GetNextProcessEvent,
    SubmitVerdict,
    GetRelayStats,
}

impl ControlCode {
    pub const ALL: [ControlCode; 3] = [
        ControlCode::GetNextProcessEvent,
        ControlCode::SubmitVerdict,
        ControlCode::GetRelayStats,
    ];

    pub const fn raw(self) -> u32 {
        match self {
            ControlCode::GetNextProcessEvent => {
                ctl_code(FILE_DEVICE_UNKNOWN, 0x801, METHOD_BUFFERED, FILE_READ_ACCESS)
            }
            ControlCode::SubmitVerdict => {
                ctl_code(FILE_DEVICE_UNKNOWN, 0x802, METHOD_BUFFERED, FILE_WRITE_ACCESS)
            }
            ControlCode::GetRelayStats => {
                ctl_code(FILE_DEVICE_UNKNOWN, 0x803, METHOD_BUFFERED, FILE_READ_ACCESS)
            }
        }
    }

    pub fn method_name(self) -> &'static str {
        match self {
            ControlCode::GetNextProcessEvent => "GetNextProcessEvent",
            ControlCode::SubmitVerdict => "SubmitVerdict",
            ControlCode::GetRelayStats => "GetRelayStats",
        }
    }

    pub fn from_raw(raw: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|code| code.raw() == raw)
            .ok_or_else(|| Error::invalid_request(format!("Unknown control code: 0x{:08X}", raw)))
    }

    pub fn from_method(method: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|code| code.method_name() == method)
            .ok_or_else(|| Error::invalid_request(format!("Unknown method: {}", method)))
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.method_name(), self.raw())
    }
}

/// Resolve the operation named by a request. A `code` field wins over `method`.
pub fn resolve_code(request: &Value) -> Result<ControlCode> {
    match request.get("code").filter(|v| !v.is_null()) {
        Some(code) => {
            let raw = code
                .as_u64()
                .and_then(|raw| u32::try_from(raw).ok())
                .ok_or_else(|| Error::invalid_request(format!("Malformed control code: {}", code)))?;
            ControlCode::from_raw(raw)
        }
        None => match request.get("method").and_then(Value::as_str) {
            Some(method) if !method.is_empty() => ControlCode::from_method(method),
            _ => Err(Error::invalid_request("Missing method or control code")),
        },
    }
}

/// Run one operation against the kernel.
///
/// Only `GetNextProcessEvent` suspends; dropping the returned future while it
/// is pending abandons the registration.
pub async fn dispatch(kernel: &KernelHandle, code: ControlCode, body: Value) -> Result<Value> {
    match code {
        ControlCode::GetNextProcessEvent => handlers::process::get_next_process_event(kernel).await,
        ControlCode::SubmitVerdict => handlers::verdict::submit_verdict(kernel, &body),
        ControlCode::GetRelayStats => handlers::process::get_relay_stats(kernel),
    }
}

// =============================================================================
// Shared helpers, used by all handler modules
// =============================================================================

pub fn u64_field(body: &Value, key: &str) -> Result<u64> {
    let value = body
        .get(key)
        .ok_or_else(|| Error::validation(format!("Missing required field: {}", key)))?;
    value
        .as_u64()
        .ok_or_else(|| Error::validation(format!("{} must be a non-negative integer", key)))
}

pub fn str_field(body: &Value, key: &str) -> Result<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::validation(format!("Missing required field: {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_code_values() {
        assert_eq!(ControlCode::GetNextProcessEvent.raw(), 0x0022_6004);
        assert_eq!(ControlCode::SubmitVerdict.raw(), 0x0022_A004);
        assert_eq!(ControlCode::GetRelayStats.raw(), 0x0022_600C);
    }

    #[test]
    fn test_from_raw_and_method_agree() {
        for code in ControlCode::ALL {
            assert_eq!(ControlCode::from_raw(code.raw()).unwrap(), code);
            assert_eq!(ControlCode::from_method(code.method_name()).unwrap(), code);
        }
    }

    #[test]
    fn test_unknown_code_is_invalid_request() {
        let err = ControlCode::from_raw(0x0022_6008).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(err.to_string().contains("0x00226008"));

        let err = ControlCode::from_method("CreateProcess").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_resolve_code_prefers_code_over_method() {
        let request = json!({"method": "SubmitVerdict", "code": 0x0022_600C});
        assert_eq!(resolve_code(&request).unwrap(), ControlCode::GetRelayStats);

        let request = json!({"method": "SubmitVerdict", "code": null});
        assert_eq!(resolve_code(&request).unwrap(), ControlCode::SubmitVerdict);
    }

    #[test]
    fn test_resolve_code_rejects_malformed_requests() {
        for request in [
            json!({}),
            json!({"method": ""}),
            json!({"code": -1}),
            json!({"code": "0x00226004"}),
            json!({"code": 0x1_0000_0000u64}),
        ] {
            assert!(
                matches!(resolve_code(&request), Err(Error::InvalidRequest(_))),
                "accepted {}",
                request
            );
        }
    }

    #[test]
    fn test_field_helpers() {
        let body = json!({"pid": 7, "neg": -3, "name": "x"});
        assert_eq!(u64_field(&body, "pid").unwrap(), 7);
        assert!(matches!(u64_field(&body, "neg"), Err(Error::Validation(_))));
        assert!(matches!(u64_field(&body, "missing"), Err(Error::Validation(_))));
        assert_eq!(str_field(&body, "name").unwrap(), "x");
        assert!(str_field(&body, "pid").is_err());
    }
}
