//! Outcome resolution tests for both CLI variants.

use std::time::Duration;

use drover::{AgentConfig, CliVariant, FailureReason, RequestOutcome, SessionMode, TaskRef};

use crate::fixtures::{script_agent, test_fleet, wait_for, Workspace};

/// Scenario: plain-text process prints "hello" then exits 0.
#[tokio::test]
async fn test_plain_text_hello() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("a2", CliVariant::PlainText, "echo hello", ws.path()))
        .unwrap();

    let outcome = fleet.send("a2", "say hello").await;
    assert_eq!(outcome, RequestOutcome::Success("hello".to_string()));
}

/// Scenario: one non-JSON line, then a result record, then exit 0.
#[tokio::test]
async fn test_stream_json_text_then_result() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    let script = r#"echo 'warming up'; echo '{"type":"result","result":"done"}'"#;
    fleet
        .register_agent(script_agent("s1", CliVariant::StreamJson, script, ws.path()))
        .unwrap();

    assert_eq!(
        fleet.send("s1", "go").await,
        RequestOutcome::Success("done".to_string())
    );
}

#[tokio::test]
async fn test_stream_json_result_surrounded_by_noise() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    let script = r#"
echo '{"type":"system","subtype":"init","session_id":"abc"}'
echo 'narrative text'
echo '{"type":"assistant","message":{"content":[]}}'
echo '{"type":"result","subtype":"success","result":"the answer"}'
echo 'trailing chatter'
"#;
    fleet
        .register_agent(script_agent("s2", CliVariant::StreamJson, script, ws.path()))
        .unwrap();

    assert_eq!(
        fleet.send("s2", "q").await,
        RequestOutcome::Success("the answer".to_string())
    );
}

#[tokio::test]
async fn test_stream_json_record_written_in_pieces() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    let script = r#"printf '{"type":"res'; sleep 0.05; printf 'ult","result":"joined"}\n'"#;
    fleet
        .register_agent(script_agent("s3", CliVariant::StreamJson, script, ws.path()))
        .unwrap();

    assert_eq!(
        fleet.send("s3", "q").await,
        RequestOutcome::Success("joined".to_string())
    );
}

#[tokio::test]
async fn test_plain_text_chunked_output() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    let script = "printf 'hel'; sleep 0.05; printf 'lo\\n'; sleep 0.05; printf 'world\\n\\n'";
    fleet
        .register_agent(script_agent("p1", CliVariant::PlainText, script, ws.path()))
        .unwrap();

    assert_eq!(
        fleet.send("p1", "q").await,
        RequestOutcome::Success("hello\nworld".to_string())
    );
}

#[tokio::test]
async fn test_non_zero_exit_reports_stderr() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent(
            "f1",
            CliVariant::StreamJson,
            "echo '  quota exceeded ' >&2; exit 3",
            ws.path(),
        ))
        .unwrap();

    assert_eq!(
        fleet.send("f1", "q").await,
        RequestOutcome::Failure(FailureReason::ProcessFailure("quota exceeded".to_string()))
    );
}

#[tokio::test]
async fn test_non_zero_exit_without_stderr() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("f2", CliVariant::PlainText, "exit 4", ws.path()))
        .unwrap();

    let outcome = fleet.send("f2", "q").await;
    assert_eq!(
        outcome,
        RequestOutcome::Failure(FailureReason::ProcessFailureUnknown(4))
    );
    assert_eq!(outcome.failure().unwrap().to_string(), "exit code 4");
}

#[tokio::test]
async fn test_launch_failure() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    let config = AgentConfig::new("l1", "Missing CLI", CliVariant::PlainText, ws.path())
        .with_command(["/nonexistent/drover-test-cli"]);
    fleet.register_agent(config).unwrap();

    let outcome = fleet.send("l1", "q").await;
    assert!(
        matches!(outcome, RequestOutcome::Failure(FailureReason::LaunchFailure(_))),
        "unexpected outcome: {:?}",
        outcome
    );
    assert!(!fleet.get_state("l1").unwrap().running);
}

#[tokio::test]
async fn test_message_and_flags_reach_process() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("m1", CliVariant::PlainText, "printf '%s|' \"$@\"", ws.path()))
        .unwrap();

    assert_eq!(
        fleet.send("m1", "fix the 'flaky' test").await,
        RequestOutcome::Success("-p|fix the 'flaky' test|--continue|--full-auto|--quiet|".to_string())
    );
}

#[tokio::test]
async fn test_env_overrides_and_inherited_env() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    let config = script_agent(
        "e1",
        CliVariant::PlainText,
        "printf '%s:%s' \"$DROVER_TEST_TOKEN\" \"${PATH:+has-path}\"",
        ws.path(),
    )
    .with_env("DROVER_TEST_TOKEN", "s3cret");
    fleet.register_agent(config).unwrap();

    assert_eq!(
        fleet.send("e1", "q").await,
        RequestOutcome::Success("s3cret:has-path".to_string())
    );
}

#[tokio::test]
async fn test_runs_in_working_directory() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("w1", CliVariant::PlainText, "pwd -P", ws.path()))
        .unwrap();

    assert_eq!(
        fleet.send("w1", "q").await,
        RequestOutcome::Success(ws.path().display().to_string())
    );
}

#[tokio::test]
async fn test_stdin_is_closed() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("i1", CliVariant::PlainText, "cat; echo eof", ws.path()))
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), fleet.send("i1", "q"))
        .await
        .expect("cat should see EOF immediately");
    assert_eq!(outcome, RequestOutcome::Success("eof".to_string()));
}

#[tokio::test]
async fn test_state_after_send() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("st", CliVariant::PlainText, "echo out; echo err >&2", ws.path()))
        .unwrap();
    let before = fleet.get_state("st").unwrap().last_activity;

    let outcome = fleet.send("st", "q").await;

    let state = fleet.get_state("st").unwrap();
    assert!(!state.running);
    assert_eq!(state.output, "out\n");
    assert_eq!(state.last_outcome, Some(outcome));
    assert!(state.last_activity >= before);
}

#[tokio::test]
async fn test_send_again_after_resolution() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    let script = "if [ -f seen ]; then echo second; else touch seen; echo first; exit 1; fi";
    fleet
        .register_agent(script_agent("r1", CliVariant::PlainText, script, ws.path()))
        .unwrap();

    assert_eq!(
        fleet.send("r1", "q").await,
        RequestOutcome::Failure(FailureReason::ProcessFailureUnknown(1))
    );
    assert_eq!(
        fleet.send("r1", "q").await,
        RequestOutcome::Success("second".to_string())
    );
}

#[tokio::test]
async fn test_persistent_agent_resumes_session() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    // Reports a session and echoes its arguments back as the result.
    let script = r#"printf '{"type":"result","result":"%s","session_id":"sess-42"}\n' "$*""#;
    let config = script_agent("ps", CliVariant::StreamJson, script, ws.path())
        .with_session_mode(SessionMode::Persistent);
    fleet.register_agent(config).unwrap();

    let first = fleet.send("ps", "one").await;
    assert!(!first.text().unwrap().contains("--resume"));
    assert_eq!(
        fleet.get_state("ps").unwrap().session_id.as_deref(),
        Some("sess-42")
    );

    let second = fleet.send("ps", "two").await;
    assert!(second.text().unwrap().ends_with("--resume sess-42"));
}

#[tokio::test]
async fn test_send_task_tracks_current_task() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("t1", CliVariant::PlainText, "sleep 0.3; echo ok", ws.path()))
        .unwrap();

    let task = TaskRef::new("task-7", "Write docs");
    let handle = {
        let fleet = fleet.clone();
        let task = task.clone();
        tokio::spawn(async move { fleet.send_task("t1", task, "write docs").await })
    };

    let observed = wait_for(Duration::from_secs(2), || {
        fleet
            .get_state("t1")
            .is_some_and(|s| s.running && s.current_task.as_ref() == Some(&task))
    })
    .await;
    assert!(observed, "task should be visible while the request runs");

    assert_eq!(handle.await.unwrap(), RequestOutcome::Success("ok".to_string()));
    assert!(fleet.get_state("t1").unwrap().current_task.is_none());
}
