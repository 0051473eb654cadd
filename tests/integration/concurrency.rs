//! Concurrency tests: busy rejection, parallel agents and termination.

use std::time::{Duration, Instant};

use drover::{CliVariant, FailureReason, RequestOutcome};

use crate::fixtures::{script_agent, test_fleet, wait_for, Workspace};

#[tokio::test]
async fn test_second_send_while_running_is_rejected() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("busy", CliVariant::PlainText, "sleep 0.4; echo first", ws.path()))
        .unwrap();

    let first = {
        let fleet = fleet.clone();
        tokio::spawn(async move { fleet.send("busy", "one").await })
    };
    assert!(
        wait_for(Duration::from_secs(2), || fleet.get_state("busy").is_some_and(|s| s.running)).await
    );

    let second = fleet.send("busy", "two").await;
    assert_eq!(
        second,
        RequestOutcome::Failure(FailureReason::AgentBusy("busy".to_string()))
    );
    // The rejection must not disturb the in-flight request.
    assert!(fleet.get_state("busy").unwrap().running);

    assert_eq!(first.await.unwrap(), RequestOutcome::Success("first".to_string()));
    assert!(!fleet.get_state("busy").unwrap().running);
}

#[tokio::test]
async fn test_concurrent_sends_exactly_one_runs() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("race", CliVariant::PlainText, "sleep 0.3; echo ran", ws.path()))
        .unwrap();

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let fleet = fleet.clone();
            tokio::spawn(async move { fleet.send("race", &format!("msg {}", i)).await })
        })
        .collect();

    let mut successes = 0;
    let mut busy = 0;
    for handle in handles {
        match handle.await.unwrap() {
            RequestOutcome::Success(text) => {
                assert_eq!(text, "ran");
                successes += 1;
            }
            RequestOutcome::Failure(FailureReason::AgentBusy(_)) => busy += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(busy, 4);
}

#[tokio::test]
async fn test_different_agents_run_in_parallel() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    for id in ["p1", "p2", "p3"] {
        fleet
            .register_agent(script_agent(id, CliVariant::PlainText, "sleep 0.4; printf '%s' \"$2\"", ws.path()))
            .unwrap();
    }

    let start = Instant::now();
    let (a, b, c) = tokio::join!(
        fleet.send("p1", "one"),
        fleet.send("p2", "two"),
        fleet.send("p3", "three"),
    );

    assert_eq!(a, RequestOutcome::Success("one".to_string()));
    assert_eq!(b, RequestOutcome::Success("two".to_string()));
    assert_eq!(c, RequestOutcome::Success("three".to_string()));
    // Serial execution would take at least 1.2s.
    assert!(start.elapsed() < Duration::from_millis(1100), "took {:?}", start.elapsed());
}

#[tokio::test]
async fn test_terminate_kills_in_flight_process() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("t1", CliVariant::StreamJson, "sleep 5", ws.path()))
        .unwrap();

    let pending = {
        let fleet = fleet.clone();
        tokio::spawn(async move { fleet.send("t1", "long job").await })
    };
    assert!(wait_for(Duration::from_secs(2), || fleet.get_state("t1").is_some_and(|s| s.running)).await);

    let start = Instant::now();
    fleet.terminate("t1");
    assert!(!fleet.is_alive("t1"));

    let outcome = pending.await.unwrap();
    assert_eq!(outcome, RequestOutcome::Failure(FailureReason::Terminated));
    assert!(start.elapsed() < Duration::from_secs(2));

    // Second terminate is a no-op.
    fleet.terminate("t1");
    assert!(fleet.get_state("t1").is_none());
}

#[tokio::test]
async fn test_terminate_all_resolves_every_send() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    for id in ["k1", "k2"] {
        fleet
            .register_agent(script_agent(id, CliVariant::PlainText, "sleep 5", ws.path()))
            .unwrap();
    }

    let handles: Vec<_> = ["k1", "k2"]
        .into_iter()
        .map(|id| {
            let fleet = fleet.clone();
            tokio::spawn(async move { fleet.send(id, "q").await })
        })
        .collect();
    assert!(
        wait_for(Duration::from_secs(2), || {
            ["k1", "k2"]
                .iter()
                .all(|id| fleet.get_state(id).is_some_and(|s| s.running))
        })
        .await
    );

    fleet.terminate_all();
    assert!(fleet.agent_ids().is_empty());

    for handle in handles {
        assert_eq!(
            handle.await.unwrap(),
            RequestOutcome::Failure(FailureReason::Terminated)
        );
    }
}

#[tokio::test]
async fn test_reregister_after_terminate() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("re", CliVariant::PlainText, "echo v1", ws.path()))
        .unwrap();
    fleet.terminate("re");

    fleet
        .register_agent(script_agent("re", CliVariant::PlainText, "echo v2", ws.path()))
        .unwrap();
    assert_eq!(
        fleet.send("re", "q").await,
        RequestOutcome::Success("v2".to_string())
    );
}

#[tokio::test]
async fn test_stale_send_does_not_release_reregistered_agent() {
    let ws = Workspace::new();
    let fleet = test_fleet();
    fleet
        .register_agent(script_agent("re", CliVariant::PlainText, "trap '' TERM; sleep 5", ws.path()))
        .unwrap();

    let old = {
        let fleet = fleet.clone();
        tokio::spawn(async move { fleet.send("re", "old").await })
    };
    assert!(wait_for(Duration::from_secs(2), || fleet.get_state("re").is_some_and(|s| s.running)).await);

    // The old process ignores SIGTERM, so its send is still shutting down
    // while the new agent starts.
    fleet.terminate("re");
    fleet
        .register_agent(script_agent("re", CliVariant::PlainText, "sleep 2; echo v2", ws.path()))
        .unwrap();
    let second = {
        let fleet = fleet.clone();
        tokio::spawn(async move { fleet.send("re", "new").await })
    };
    assert!(wait_for(Duration::from_secs(2), || fleet.get_state("re").is_some_and(|s| s.running)).await);

    assert_eq!(old.await.unwrap(), RequestOutcome::Failure(FailureReason::Terminated));

    let state = fleet.get_state("re").unwrap();
    assert!(state.running);
    assert!(state.last_outcome.is_none());
    assert_eq!(
        fleet.send("re", "third").await,
        RequestOutcome::Failure(FailureReason::AgentBusy("re".to_string()))
    );

    // The new send's kill switch survived the old send's cleanup.
    let start = Instant::now();
    fleet.terminate("re");
    assert_eq!(second.await.unwrap(), RequestOutcome::Failure(FailureReason::Terminated));
    assert!(start.elapsed() < Duration::from_secs(1));
}
