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

//! Lease expiry for tasks whose worker never reported back.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use signalhop::clock::ManualClock;
use signalhop::dal::DAL;
use signalhop::delivery::{DeliveryClient, DeliveryRequest, HttpReply};
use signalhop::models::forwarded_signal::OutcomeStatus;
use signalhop::{
    Clock, DeliveryError, RetryPolicy, RunOutcome, SchedulingStrategy, SignalGroup, TaskStatus,
};
use std::sync::Arc;

use crate::fixtures::{
    outcome_record, test_config, test_config_builder, ScriptedClient, TestFixture,
};

#[tokio::test]
async fn test_expired_lease_is_reclaimed_with_outcome() {
    let fixture = TestFixture::sqlite().await;
    expire_lease_and_check(&fixture).await;
}

async fn expire_lease_and_check(fixture: &TestFixture) {
    let task = fixture.insert_task(SignalGroup::Default, 1, 1).await;
    let dal = fixture.dal();

    let claimed = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &RetryPolicy::default(), fixture.now())
        .await
        .unwrap()
        .unwrap();

    // Still inside the lease.
    fixture.advance_secs(599);
    let reclaimed = dal
        .delivery_task()
        .reclaim_stale(Duration::minutes(10), fixture.now())
        .await
        .unwrap();
    assert!(reclaimed.is_empty());

    fixture.advance_secs(1);
    let reclaimed = dal
        .delivery_task()
        .reclaim_stale(Duration::minutes(10), fixture.now())
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, task.id);
    assert_eq!(reclaimed[0].status, "failed");

    let stored = fixture.task(task.id).await;
    assert_eq!(stored.status, "failed");
    assert_eq!(stored.attempts, claimed.attempts);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Lease expired after 600s without a recorded outcome")
    );

    let records = dal.forwarded_signal().list_for_task(task.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "FAILURE");
    assert_eq!(records[0].http_status_code, None);
    let response: Value = serde_json::from_str(&records[0].response_payload).unwrap();
    assert_eq!(response["lease_expired"], true);

    // The late worker's outcome is discarded.
    let written = dal
        .delivery_task()
        .record_outcome(
            claimed.attempts,
            TaskStatus::Completed,
            outcome_record(&claimed, OutcomeStatus::Success, None),
        )
        .await
        .unwrap();
    assert!(!written.status_written && !written.recorded());
    assert_eq!(dal.forwarded_signal().count_for_task(task.id).await.unwrap(), 1);
}

/// A client that is slow enough for the lease to expire mid-call: while the
/// request is in flight the clock moves past the lease and a reclaim sweep
/// runs, then the call succeeds.
struct LeaseExpiringClient {
    dal: DAL,
    clock: Arc<ManualClock>,
}

#[async_trait]
impl DeliveryClient for LeaseExpiringClient {
    async fn send(&self, _request: &DeliveryRequest) -> Result<HttpReply, DeliveryError> {
        self.clock.advance(Duration::minutes(11));
        let reclaimed = self
            .dal
            .delivery_task()
            .reclaim_stale(Duration::minutes(10), self.clock.now())
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        assert_eq!(reclaimed.len(), 1);
        Ok(HttpReply {
            status: 200,
            body: "{}".to_string(),
        })
    }
}

/// A worker whose lease expired during delivery must not add a second
/// outcome record for its claim, nor overwrite the reclaimed status.
#[tokio::test]
async fn test_late_delivery_after_reclaim_keeps_one_record_per_claim() {
    let fixture = TestFixture::sqlite().await;
    deliver_past_lease_and_check(&fixture).await;
}

async fn deliver_past_lease_and_check(fixture: &TestFixture) {
    let task = fixture.insert_task(SignalGroup::Default, 1, 1).await;
    let client = Arc::new(LeaseExpiringClient {
        dal: fixture.dal(),
        clock: fixture.clock.clone(),
    });

    let config = test_config_builder().reclaim_on_run(false).build();
    let summary = fixture
        .worker(client, config.clone())
        .run(&SchedulingStrategy::global(&config))
        .await
        .unwrap();
    assert_eq!(summary.processed(), 1);
    let report = &summary.reports[0];
    assert_eq!(report.task_id, task.id);
    assert!(!report.status_written);
    assert!(!report.outcome_recorded);

    let stored = fixture.task(task.id).await;
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.status, "failed");
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Lease expired after 600s without a recorded outcome")
    );

    let records = fixture
        .dal()
        .forwarded_signal()
        .list_for_task(task.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "FAILURE");
    assert_eq!(
        i64::try_from(records.len()).unwrap(),
        i64::from(stored.attempts)
    );
}

/// Every claim ends with exactly one outcome record, whether the worker
/// reported it or the lease expired.
#[tokio::test]
async fn test_outcome_count_matches_claims() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let policy = RetryPolicy::default();
    let task = fixture.insert_task(SignalGroup::Btc, 1, 1).await;

    // Attempt 1: abandoned, reclaimed.
    dal.delivery_task()
        .claim_next(SignalGroup::Btc, &policy, fixture.now())
        .await
        .unwrap()
        .unwrap();
    fixture.advance_secs(700);
    dal.delivery_task()
        .reclaim_stale(Duration::minutes(10), fixture.now())
        .await
        .unwrap();

    // Attempt 2: delivered by a worker, which reclaims nothing further.
    let config = test_config();
    let worker = fixture.worker(ScriptedClient::new(), config.clone());
    let summary = worker
        .run(&SchedulingStrategy::per_queue(SignalGroup::Btc, &config))
        .await
        .unwrap();
    assert_eq!(summary.reclaimed, 0);
    assert_eq!(summary.outcome, RunOutcome::Completed { processed: 1 });

    let stored = fixture.task(task.id).await;
    assert_eq!(stored.status, "completed");
    assert_eq!(stored.attempts, 2);
    assert_eq!(
        dal.forwarded_signal().count_for_task(task.id).await.unwrap(),
        i64::from(stored.attempts)
    );
}

#[tokio::test]
async fn test_worker_reclaims_before_claiming() {
    let fixture = TestFixture::sqlite().await;
    let task = fixture.insert_task(SignalGroup::Ai, 1, 1).await;
    fixture
        .dal()
        .delivery_task()
        .claim_next(SignalGroup::Ai, &RetryPolicy::default(), fixture.now())
        .await
        .unwrap()
        .unwrap();
    fixture.advance_secs(3600);

    let config = test_config();
    let summary = fixture
        .worker(ScriptedClient::new(), config.clone())
        .run(&SchedulingStrategy::per_queue(SignalGroup::Ai, &config))
        .await
        .unwrap();
    assert_eq!(summary.reclaimed, 1);
    // The reclaimed task has attempts to spare and is delivered in the same run.
    assert_eq!(summary.processed(), 1);
    assert_eq!(summary.reports[0].task_id, task.id);
    assert_eq!(summary.reports[0].attempt, 2);

    // With reclaim disabled a stuck task stays stuck.
    let stuck = fixture.insert_task(SignalGroup::Ai, 2, 1).await;
    fixture
        .dal()
        .delivery_task()
        .claim_next(SignalGroup::Ai, &RetryPolicy::default(), fixture.now())
        .await
        .unwrap()
        .unwrap();
    fixture.advance_secs(3600);
    let no_reclaim = test_config_builder().reclaim_on_run(false).build();
    let summary = fixture
        .worker(ScriptedClient::new(), no_reclaim.clone())
        .run(&SchedulingStrategy::per_queue(SignalGroup::Ai, &no_reclaim))
        .await
        .unwrap();
    assert_eq!(summary.reclaimed, 0);
    assert_eq!(summary.outcome, RunOutcome::NoEligibleTasks);
    assert_eq!(fixture.task(stuck.id).await.status, "processing");
}

#[cfg(feature = "postgres")]
mod postgres_tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial(postgres)]
    async fn test_postgres_expired_lease_is_reclaimed() {
        let Some(fixture) = TestFixture::postgres().await else {
            return;
        };
        expire_lease_and_check(&fixture).await;
    }

    #[tokio::test]
    #[serial(postgres)]
    async fn test_postgres_late_delivery_after_reclaim() {
        let Some(fixture) = TestFixture::postgres().await else {
            return;
        };
        deliver_past_lease_and_check(&fixture).await;
    }
}
