//! ToolRegistry availability probes: a type-specific liveness signal per tool kind, cached per run by
//! the caller.

use std::time::{Duration, Instant};

use agentos_types::{Availability, ToolDefinition, ToolKind};

const CLI_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `tool.check_command` (if present) with a 10s timeout and checks exit
/// status; also checks `required_platform`/`required_files` when declared.
fn probe_cli(tool: &ToolDefinition) -> Availability {
    if let Some(platform) = &tool.required_platform {
        if platform != std::env::consts::OS {
            return Availability::Unavailable;
        }
    }
    for file in &tool.required_files {
        if !std::path::Path::new(file).exists() {
            return Availability::Unavailable;
        }
    }
    let Some(command) = &tool.check_command else {
        return Availability::Unknown;
    };
    run_with_timeout(command, CLI_PROBE_TIMEOUT)
}

fn run_with_timeout(command: &str, timeout: Duration) -> Availability {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return Availability::Unknown;
    };
    let mut child = match std::process::Command::new(program)
        .args(parts)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(_) => return Availability::Unavailable,
    };

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return if status.success() { Availability::Available } else { Availability::Unavailable },
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    return Availability::Unavailable;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(_) => return Availability::Unavailable,
        }
    }
}

/// API tools: presence of `auth_env_var` implies credentials exist.
fn probe_api(tool: &ToolDefinition) -> Availability {
    match &tool.auth_env_var {
        Some(var) => {
            if std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false) {
                Availability::Available
            } else {
                Availability::Unavailable
            }
        }
        None => Availability::Unknown,
    }
}

/// MCP tools: the server executable is on PATH.
fn probe_mcp(tool: &ToolDefinition) -> Availability {
    match which::which(&tool.name) {
        Ok(_) => Availability::Available,
        Err(_) => Availability::Unavailable,
    }
}

pub fn check_tool_availability(tool: &ToolDefinition) -> Availability {
    match tool.kind {
        ToolKind::Cli => probe_cli(tool),
        ToolKind::Api => probe_api(tool),
        ToolKind::Mcp => probe_mcp(tool),
        ToolKind::Function => Availability::Available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(kind: ToolKind) -> ToolDefinition {
        ToolDefinition {
            id: "t1".into(),
            name: "t1".into(),
            kind,
            category: None,
            tags: Default::default(),
            description: String::new(),
            check_command: None,
            auth_env_var: None,
            required_platform: None,
            required_files: vec![],
            enabled: true,
        }
    }

    #[test]
    fn cli_tool_with_true_command_is_available() {
        let mut t = tool(ToolKind::Cli);
        t.check_command = Some("true".into());
        assert_eq!(check_tool_availability(&t), Availability::Available);
    }

    #[test]
    fn cli_tool_with_false_command_is_unavailable() {
        let mut t = tool(ToolKind::Cli);
        t.check_command = Some("false".into());
        assert_eq!(check_tool_availability(&t), Availability::Unavailable);
    }

    #[test]
    fn api_tool_without_env_var_is_unavailable() {
        let mut t = tool(ToolKind::Api);
        t.auth_env_var = Some("AGENTOS_TEST_NONEXISTENT_VAR".into());
        std::env::remove_var("AGENTOS_TEST_NONEXISTENT_VAR");
        assert_eq!(check_tool_availability(&t), Availability::Unavailable);
    }

    #[test]
    fn function_tool_is_always_available() {
        let t = tool(ToolKind::Function);
        assert_eq!(check_tool_availability(&t), Availability::Available);
    }
}
