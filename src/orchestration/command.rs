//! Command lines for each CLI variant.

use std::process::Stdio;

use tokio::process::Command;

use crate::agent::{AgentState, CliVariant, SessionMode};

/// Full argv (program first) for sending `message` to an agent.
pub fn build_args(state: &AgentState, message: &str) -> Vec<String> {
    let config = &state.config;
    let mut args: Vec<String> = match &config.command {
        Some(command) if !command.is_empty() => command.clone(),
        _ => vec![config.variant.default_binary().to_string()],
    };

    match config.variant {
        CliVariant::StreamJson => {
            args.extend(
                [
                    "-p",
                    message,
                    "--dangerously-skip-permissions",
                    "--output-format",
                    "stream-json",
                    "--verbose",
                ]
                .map(String::from),
            );
            if config.session_mode == SessionMode::Persistent {
                if let Some(session) = &state.session_id {
                    args.push("--resume".to_string());
                    args.push(session.clone());
                }
            }
        }
        CliVariant::PlainText => {
            args.extend(["-p", message, "--continue", "--full-auto", "--quiet"].map(String::from));
        }
    }
    args
}

/// Build the process for one request: stdin closed, both pipes captured,
/// env overrides layered on the inherited environment.
pub fn build_command(state: &AgentState, message: &str) -> Command {
    let args = build_args(state, message);
    let mut cmd = Command::new(&args[0]);
    cmd.args(&args[1..])
        .current_dir(&state.config.working_dir)
        .envs(&state.config.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so termination reaches grandchildren too.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}
