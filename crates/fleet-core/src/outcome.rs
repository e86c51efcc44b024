//! The tool-surface wire contract (§7: "every tool operation returns
//! `{ok: true, output, data?}` or `{ok: false, error}`; tool surface never
//! throws through").
//!
//! Grounded on the teacher's `ToolResponse<T>` / `ErrorResponse` pair
//! (`server/tools_agent/src/api.rs`), collapsed into one `ok`-tagged enum so
//! every tool method returns a single type instead of choosing between two.

use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize)]
pub struct ToolErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolOutcome<T> {
    Ok {
        ok: bool,
        output: T,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    Err {
        ok: bool,
        error: ToolErrorBody,
    },
}

impl<T> ToolOutcome<T> {
    pub fn ok(output: T) -> Self {
        ToolOutcome::Ok { ok: true, output, data: None }
    }

    pub fn ok_with_data(output: T, data: serde_json::Value) -> Self {
        ToolOutcome::Ok { ok: true, output, data: Some(data) }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok { .. })
    }
}

impl<T> From<CoreError> for ToolOutcome<T> {
    fn from(err: CoreError) -> Self {
        ToolOutcome::Err {
            ok: false,
            error: ToolErrorBody { code: err.code().to_string(), message: err.to_string() },
        }
    }
}

/// Runs a fallible tool body and converts its `Result` into the wire
/// contract, so a panic-free call site never needs a `match` of its own.
pub fn run<T>(body: impl FnOnce() -> Result<T, CoreError>) -> ToolOutcome<T> {
    match body() {
        Ok(output) => ToolOutcome::ok(output),
        Err(err) => err.into(),
    }
}
