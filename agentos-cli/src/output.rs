//! JSON/text output helpers and the `AgentOsError` → exit-code mapping

use agentos_types::{AgentOsError, ErrorEnvelope};

pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

/// Prints `err` (as a JSON envelope when `json` is set, else plain text to
/// stderr) and returns the exit code to use.
pub fn report_error(err: &AgentOsError, json: bool) -> i32 {
    if json {
        let envelope = ErrorEnvelope::from(err);
        print_json(&serde_json::json!({ "error": envelope }));
    } else {
        eprintln!("error: {err}");
    }
    err.exit_code()
}

/// Generic-error exit path for failures that don't originate from
/// `agentos-core` (file IO, arg parsing funneled through `clap`, etc.).
pub fn report_generic(message: &str, json: bool) -> i32 {
    if json {
        print_json(&serde_json::json!({
            "error": { "kind": "fatal", "message": message, "context": null }
        }));
    } else {
        eprintln!("error: {message}");
    }
    1
}
