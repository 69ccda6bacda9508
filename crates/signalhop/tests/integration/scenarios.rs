/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! End-to-end flows: ingest, fan-out, claim, deliver, record.

use chrono::Duration;
use serde_json::{json, Value};
use signalhop::delivery::DeliveryKind;
use signalhop::{
    HopperRegistry, HopperTarget, RunOutcome, SchedulingStrategy, SignalGroup, TaskStatus,
};

use crate::fixtures::{test_config, test_config_builder, ScriptedClient, TestFixture, TEST_TOKEN};

#[tokio::test]
async fn test_fan_out_creates_one_task_per_target() {
    let fixture = TestFixture::sqlite().await;
    let hoppers = HopperRegistry::empty().with_group(
        SignalGroup::Default,
        vec![
            HopperTarget::new("11", "binance"),
            HopperTarget::new("12", "kucoin"),
            HopperTarget::new("13", "bybit"),
        ],
    );
    let config = test_config_builder().hoppers(hoppers).build();
    let signal = fixture.store_signal(SignalGroup::Default, "ETH").await;
    assert_eq!(signal.status, "new");

    let summary = fixture.fan_out(config).sweep().await.unwrap();
    assert_eq!(summary.signals_queued(), 1);
    assert_eq!(summary.tasks_created(), 3);

    let tasks = fixture
        .dal()
        .delivery_task()
        .list_for_signal(SignalGroup::Default, signal.id)
        .await
        .unwrap();
    let sub_ids: Vec<i32> = tasks.iter().map(|t| t.task_sub_id).collect();
    assert_eq!(sub_ids, vec![1, 2, 3]);
    assert!(tasks.iter().all(|t| t.status == "pending" && t.attempts == 0));
    assert!(tasks.iter().all(|t| t.access_token == TEST_TOKEN));

    let body: Value = serde_json::from_str(&tasks[0].payload).unwrap();
    assert_eq!(body["coin"], "ETH");

    let stored = fixture.dal().signal().get(signal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "queued");
}

#[tokio::test]
async fn test_successful_delivery_completes_task() {
    let fixture = TestFixture::sqlite().await;
    let config = test_config();
    let signal = fixture.store_signal(SignalGroup::Btc, "BTC").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    let client = ScriptedClient::new();
    client.push_reply(200, json!({"data": {"id": 99}}));
    let worker = fixture.worker(client.clone(), config.clone());

    let summary = worker.run(&SchedulingStrategy::global(&config)).await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed { processed: 1 });
    let report = &summary.reports[0];
    assert_eq!(report.kind, DeliveryKind::Success);
    assert_eq!(report.task_status, TaskStatus::Completed);
    assert!(report.outcome_recorded && report.status_written);

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].hopper_id, "201");
    assert_eq!(requests[0].access_token, TEST_TOKEN);

    let task = fixture.task(report.task_id).await;
    assert_eq!(task.status, "completed");
    assert_eq!(task.signal_id, signal.id);
    assert!(task.error_message.is_none());

    let records = fixture
        .dal()
        .forwarded_signal()
        .list_for_task(task.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "SUCCESS");
    assert_eq!(records[0].http_status_code, Some(200));
    assert_eq!(records[0].request_payload, task.payload);
    assert!(!records[0].request_payload.contains(TEST_TOKEN));

    let gate = fixture
        .dal()
        .rate_limit_status()
        .latest()
        .await
        .unwrap()
        .expect("Delivery should record gate state");
    assert!(!gate.is_limited);
    assert!(gate.limited_until.is_none());
}

#[tokio::test]
async fn test_rate_limited_delivery_backs_off() {
    let fixture = TestFixture::sqlite().await;
    let config = test_config();
    fixture.store_signal(SignalGroup::Ai, "SOL").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    let client = ScriptedClient::new();
    client.push_reply(429, json!({"message": "Too many requests"}));
    let worker = fixture.worker(client.clone(), config.clone());
    let strategy = SchedulingStrategy::per_queue(SignalGroup::Ai, &config);

    let summary = worker.run(&strategy).await.unwrap();
    let report = &summary.reports[0];
    assert_eq!(report.kind, DeliveryKind::RateLimited);
    assert_eq!(
        report.error.as_deref(),
        Some("Rate limit (429): Too many requests")
    );

    let task = fixture.task(report.task_id).await;
    assert_eq!(task.status, "rate_limited");

    let gate = fixture.dal().rate_limit_status().latest().await.unwrap().unwrap();
    assert!(gate.is_limited);
    assert_eq!(gate.limited_until, Some(fixture.now() + Duration::minutes(5)));

    // One minute later the gate is closed and nothing is claimed.
    fixture.advance_secs(60);
    let summary = worker.run(&strategy).await.unwrap();
    assert!(matches!(
        summary.outcome,
        RunOutcome::RateLimited { processed: 0, .. }
    ));
    assert_eq!(client.requests().len(), 1);

    // Even ignoring the gate, the task itself is still backing off.
    let ungated = test_config_builder().respect_rate_limit_gate(false).build();
    let summary = fixture
        .worker(client.clone(), ungated.clone())
        .run(&SchedulingStrategy::per_queue(SignalGroup::Ai, &ungated))
        .await
        .unwrap();
    assert_eq!(summary.outcome, RunOutcome::NoEligibleTasks);

    // Six minutes after the 429 the task is delivered again.
    fixture.advance_secs(300);
    let summary = worker.run(&strategy).await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed { processed: 1 });
    assert_eq!(summary.reports[0].attempt, 2);
    assert_eq!(fixture.task(task.id).await.status, "completed");

    let records = fixture
        .dal()
        .forwarded_signal()
        .list_for_task(task.id)
        .await
        .unwrap();
    let statuses: Vec<&str> = records.iter().map(|r| r.status.as_str()).collect();
    assert_eq!(statuses, vec!["FAILURE", "SUCCESS"]);
}

#[tokio::test]
async fn test_repeated_failures_exhaust_task() {
    let fixture = TestFixture::sqlite().await;
    let config = test_config();
    fixture.store_signal(SignalGroup::Btc, "BTC").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    let client = ScriptedClient::new();
    client.push_reply(400, json!({"error": "Invalid hopper"}));
    client.push_reply(500, json!({"message": "Internal error"}));
    client.push_transport_error("connection reset by peer");

    let worker = fixture.worker(client.clone(), config.clone());
    let strategy = SchedulingStrategy::per_queue(SignalGroup::Btc, &config);

    let mut errors = Vec::new();
    for _ in 0..3 {
        let summary = worker.run(&strategy).await.unwrap();
        assert_eq!(summary.processed(), 1);
        errors.push(summary.reports[0].error.clone().unwrap());
    }
    assert_eq!(
        errors,
        vec![
            "Invalid hopper".to_string(),
            "Internal error".to_string(),
            "connection reset by peer".to_string(),
        ]
    );

    let summary = worker.run(&strategy).await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::NoEligibleTasks);
    assert_eq!(client.requests().len(), 3);

    let tasks = fixture
        .dal()
        .delivery_task()
        .list_recent(SignalGroup::Btc, 10)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, "failed");
    assert_eq!(tasks[0].attempts, 3);
    assert_eq!(
        tasks[0].error_message.as_deref(),
        Some("connection reset by peer")
    );

    let records = fixture
        .dal()
        .forwarded_signal()
        .list_for_task(tasks[0].id)
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.status == "FAILURE"));
    assert_eq!(records[2].http_status_code, None);
    let last: Value = serde_json::from_str(&records[2].response_payload).unwrap();
    assert_eq!(last["fetch_error"], "connection reset by peer");
}

#[tokio::test]
async fn test_unparsable_success_body_is_a_failure() {
    let fixture = TestFixture::sqlite().await;
    let config = test_config();
    fixture.store_signal(SignalGroup::Btc, "BTC").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    let client = ScriptedClient::new();
    client.push_raw(200, "<html>ok</html>");
    let summary = fixture
        .worker(client, config.clone())
        .run(&SchedulingStrategy::global(&config))
        .await
        .unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.kind, DeliveryKind::ParseFailure);
    assert_eq!(report.task_status, TaskStatus::Failed);

    let records = fixture
        .dal()
        .forwarded_signal()
        .list_for_task(report.task_id)
        .await
        .unwrap();
    assert_eq!(records[0].status, "FAILURE");
    assert_eq!(records[0].http_status_code, Some(200));
}

#[tokio::test]
async fn test_global_strategy_follows_priority() {
    let fixture = TestFixture::sqlite().await;
    let config = test_config_builder()
        .priority(vec![SignalGroup::Ai, SignalGroup::Btc, SignalGroup::Default])
        .build();
    fixture.store_signal(SignalGroup::Btc, "BTC").await;
    fixture.store_signal(SignalGroup::Ai, "FET").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    let client = ScriptedClient::new();
    let worker = fixture.worker(client, config.clone());
    let strategy = SchedulingStrategy::global(&config);

    let groups: Vec<String> = [
        worker.run(&strategy).await.unwrap(),
        worker.run(&strategy).await.unwrap(),
    ]
    .iter()
    .map(|s| s.reports[0].group.clone())
    .collect();
    assert_eq!(groups, vec!["ai".to_string(), "btc".to_string()]);

    let summary = worker.run(&strategy).await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::NoEligibleTasks);
}

#[tokio::test]
async fn test_per_queue_budget_limits_deliveries() {
    let fixture = TestFixture::sqlite().await;
    let config = test_config_builder().per_queue_batch_size(1).build();
    // Two default targets per signal, so two tasks.
    fixture.store_signal(SignalGroup::Default, "ADA").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    let client = ScriptedClient::new();
    let worker = fixture.worker(client.clone(), config.clone());
    let strategy = SchedulingStrategy::per_queue(SignalGroup::Default, &config);

    let summary = worker.run(&strategy).await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed { processed: 1 });
    assert_eq!(client.requests()[0].hopper_id, "101");

    let summary = worker.run(&strategy).await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed { processed: 1 });
    assert_eq!(client.requests()[1].hopper_id, "102");
}

/// The pause separates deliveries within a run; a run never waits after
/// its last delivery.
#[tokio::test]
async fn test_pause_only_between_deliveries() {
    let fixture = TestFixture::sqlite().await;
    let slow = test_config_builder()
        .inter_call_delay(std::time::Duration::from_secs(5))
        .build();
    // One ai target, and the ai budget is larger than one task.
    fixture.store_signal(SignalGroup::Ai, "FET").await;
    fixture.fan_out(slow.clone()).sweep().await.unwrap();
    assert!(slow.batch_size_for(SignalGroup::Ai) > 1);

    let started = std::time::Instant::now();
    let summary = fixture
        .worker(ScriptedClient::new(), slow.clone())
        .run(&SchedulingStrategy::per_queue(SignalGroup::Ai, &slow))
        .await
        .unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed { processed: 1 });
    assert!(started.elapsed() < std::time::Duration::from_secs(5));

    // Two default targets, so two deliveries and one pause between them.
    let paced = test_config_builder()
        .inter_call_delay(std::time::Duration::from_millis(200))
        .build();
    fixture.store_signal(SignalGroup::Default, "ETH").await;
    fixture.fan_out(paced.clone()).sweep().await.unwrap();

    let client = ScriptedClient::new();
    let started = std::time::Instant::now();
    let summary = fixture
        .worker(client.clone(), paced.clone())
        .run(&SchedulingStrategy::per_queue(SignalGroup::Default, &paced))
        .await
        .unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed { processed: 2 });
    assert_eq!(client.requests().len(), 2);
    assert!(started.elapsed() >= std::time::Duration::from_millis(200));
}

#[tokio::test]
async fn test_worker_refuses_without_token() {
    let fixture = TestFixture::sqlite().await;
    let config = signalhop::SignalhopConfig::builder().build();
    let worker = fixture.worker(ScriptedClient::new(), config.clone());

    let err = worker
        .run(&SchedulingStrategy::global(&config))
        .await
        .unwrap_err();
    assert!(matches!(err, signalhop::WorkerError::MissingCredential));

    let err = fixture.fan_out(config).sweep().await.unwrap_err();
    assert!(matches!(err, signalhop::FanOutError::MissingCredential));
}
