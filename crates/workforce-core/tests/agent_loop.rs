mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

use common::{MockClient, call, counting_registry, tool_results};
use workforce_core::{
    ActivityStatus, AgentConfiguration, AgentError, AgentKind, AgentRequest, AgentRuntime,
    Completion, CompletionClient, InMemoryActivityLog, RetryPolicy,
};

fn runtime(
    client: Arc<dyn CompletionClient>,
    limit: u32,
) -> (AgentRuntime, Arc<InMemoryActivityLog>, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(InMemoryActivityLog::new());
    let config = AgentConfiguration::new(AgentKind::Leasing, "You are a test agent.", &[
        "lookup", "explode",
    ])
    .with_max_loop_iterations(limit);
    let runtime = AgentRuntime::new(
        Arc::new(config),
        client,
        Arc::new(counting_registry(counter.clone())),
        log.clone(),
    )
    .with_retry_policy(RetryPolicy::default().with_base_delay(Duration::from_millis(1)));
    (runtime, log, counter)
}

#[tokio::test]
async fn final_answer_only_makes_one_call_and_no_dispatches() {
    let client = MockClient::answering("All set.");
    let (runtime, log, counter) = runtime(client.clone(), 10);

    let response = runtime.execute(&AgentRequest::new("Hello", "u1")).await;

    assert_eq!(response.result().unwrap(), "All set.");
    assert_eq!(client.calls(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(response.tool_calls.is_empty());

    let records = log.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].result_status, ActivityStatus::Completed);
}

#[tokio::test]
async fn same_tool_three_times_yields_three_results_in_order() {
    let client = MockClient::new(vec![
        Completion::tools(vec![call("c1", "lookup", json!({"key": "a"}))]),
        Completion::tools(vec![call("c2", "lookup", json!({"key": "b"}))]),
        Completion::tools(vec![call("c3", "lookup", json!({"key": "c"}))]),
        Completion::final_answer("Found a, b and c."),
    ]);
    let (runtime, log, counter) = runtime(client.clone(), 10);

    let response = runtime.execute(&AgentRequest::new("Look things up", "u1")).await;

    assert!(response.is_success());
    assert_eq!(client.calls(), 4);
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    let results = tool_results(&client.last_history());
    let ids: Vec<&str> = results.iter().map(|(id, _, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert!(results[0].2.contains("\"a\""));
    assert!(results[2].2.contains("\"c\""));
    assert!(results.iter().all(|(_, is_error, _)| !is_error));

    let records = log.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tool_calls.len(), 3);
}

#[tokio::test]
async fn multiple_calls_in_one_turn_run_in_order() {
    let client = MockClient::new(vec![
        Completion::tools(vec![
            call("c1", "lookup", json!({"key": "first"})),
            call("c2", "explode", json!({})),
            call("c3", "lookup", json!({"key": "third"})),
        ]),
        Completion::final_answer("done"),
    ]);
    let (runtime, _, _) = runtime(client.clone(), 10);

    let response = runtime.execute(&AgentRequest::new("Batch", "u1")).await;

    let names: Vec<&str> = response.tool_calls.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["lookup", "explode", "lookup"]);
    let results = tool_results(&client.last_history());
    let flags: Vec<bool> = results.iter().map(|(_, is_error, _)| *is_error).collect();
    assert_eq!(flags, vec![false, true, false]);
}

#[tokio::test]
async fn loop_limit_fails_with_reason_and_bounded_calls() {
    let client = MockClient::new(vec![Completion::tools(vec![call(
        "c1",
        "lookup",
        json!({"key": "again"}),
    )])]);
    let (runtime, log, _) = runtime(client.clone(), 3);

    let response = runtime.execute(&AgentRequest::new("Loop forever", "u1")).await;

    assert_eq!(response.status, ActivityStatus::Error);
    assert!(matches!(
        response.error,
        Some(AgentError::LoopLimitExceeded { limit: 3 })
    ));
    assert_eq!(response.result().unwrap_err().to_string(), "loop limit exceeded");
    assert!(client.calls() <= 3);

    let records = log.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].result_status, ActivityStatus::Error);
    assert_eq!(records[0].error.as_deref(), Some("loop limit exceeded"));
}

#[tokio::test]
async fn failing_tool_does_not_abort_the_loop() {
    let client = MockClient::new(vec![
        Completion::tools(vec![call("c1", "explode", json!({}))]),
        Completion::final_answer("The backend is down, try later."),
    ]);
    let (runtime, log, _) = runtime(client.clone(), 10);

    let response = runtime.execute(&AgentRequest::new("Do the thing", "u1")).await;

    assert!(response.is_success());
    assert!(!response.tool_calls[0].success);
    let results = tool_results(&client.last_history());
    assert_eq!(results.len(), 1);
    assert!(results[0].1);
    assert!(results[0].2.contains("\"success\":false"));
    assert!(results[0].2.contains("backend unavailable"));
    assert_eq!(log.records().await.len(), 1);
}

#[tokio::test]
async fn unknown_tool_and_bad_arguments_are_reported_to_the_model() {
    let client = MockClient::new(vec![
        Completion::tools(vec![
            call("c1", "teleport", json!({})),
            call("c2", "lookup", json!({"key": 42})),
            call("c3", "lookup", json!({})),
        ]),
        Completion::final_answer("ok"),
    ]);
    let (runtime, _, counter) = runtime(client.clone(), 10);

    let response = runtime.execute(&AgentRequest::new("Try", "u1")).await;

    assert!(response.is_success());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    let results = tool_results(&client.last_history());
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, is_error, _)| *is_error));
    assert!(results[0].2.contains("Unknown tool: teleport"));
}

#[tokio::test]
async fn context_is_injected_into_the_first_message() {
    let client = MockClient::answering("ok");
    let (runtime, log, _) = runtime(client.clone(), 10);

    let request = AgentRequest::new("Qualify them", "agent-7").with_context("lead_id", "lead-42");
    runtime.execute(&request).await;

    let first = client.last_history()[0].text();
    assert_eq!(first, "Context:\nlead_id: lead-42\n\nTask: Qualify them");
    let records = log.records().await;
    assert_eq!(records[0].related_entity_id.as_deref(), Some("lead-42"));
    assert_eq!(records[0].requester_id, "agent-7");
}

#[tokio::test]
async fn concurrent_invocations_each_record_one_activity() {
    let client = MockClient::answering("ok");
    let (runtime, log, _) = runtime(client, 10);
    let runtime = Arc::new(runtime);

    let mut handles = Vec::new();
    for i in 0..5 {
        let runtime = runtime.clone();
        handles.push(tokio::spawn(async move {
            runtime
                .execute(&AgentRequest::new(format!("Request {i}"), "u1"))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }
    assert_eq!(log.records().await.len(), 5);
}
