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

//! Concurrency and eligibility tests for task claiming.

use signalhop::dal::DAL;
use signalhop::models::forwarded_signal::OutcomeStatus;
use signalhop::{RetryPolicy, SignalGroup, TaskStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Barrier;

use crate::fixtures::{outcome_record, TestFixture};

/// Concurrent claimers never receive the same task, and together they drain
/// the queue exactly once.
#[tokio::test]
async fn test_concurrent_claiming_no_duplicates() {
    let fixture = TestFixture::sqlite().await;
    claim_concurrently_and_check(&fixture).await;
}

async fn claim_concurrently_and_check(fixture: &TestFixture) {
    const NUM_TASKS: usize = 20;
    let mut created = HashSet::new();
    for i in 0..NUM_TASKS {
        let task = fixture
            .insert_task(SignalGroup::Default, 1, i as i32 + 1)
            .await;
        created.insert(task.id);
    }

    const NUM_WORKERS: usize = 10;
    let barrier = Arc::new(Barrier::new(NUM_WORKERS));
    let now = fixture.now();
    let mut handles = Vec::new();

    for _ in 0..NUM_WORKERS {
        let database = fixture.database.clone();
        let barrier = barrier.clone();

        handles.push(tokio::spawn(async move {
            let dal = DAL::new(database);
            let policy = RetryPolicy::default();
            barrier.wait().await;

            let mut claimed = Vec::new();
            while let Some(task) = dal
                .delivery_task()
                .claim_next(SignalGroup::Default, &policy, now)
                .await
                .expect("Claim should not fail")
            {
                claimed.push(task.id);
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.expect("Worker panicked") {
            assert!(seen.insert(id), "Task {} was claimed twice", id);
            total += 1;
        }
    }

    assert_eq!(total, NUM_TASKS);
    assert_eq!(seen, created);
}

#[tokio::test]
async fn test_claim_marks_processing_and_counts_attempt() {
    let fixture = TestFixture::sqlite().await;
    let task = fixture.insert_task(SignalGroup::Btc, 7, 1).await;
    assert_eq!(task.attempts, 0);
    assert!(task.last_attempt_at.is_none());

    fixture.advance_secs(5);
    let claimed = fixture
        .dal()
        .delivery_task()
        .claim_next(SignalGroup::Btc, &RetryPolicy::default(), fixture.now())
        .await
        .unwrap()
        .expect("Pending task should be claimable");

    assert_eq!(claimed.id, task.id);
    assert_eq!(claimed.status, "processing");
    assert_eq!(claimed.attempts, 1);
    assert_eq!(claimed.last_attempt_at, Some(fixture.now()));

    // The returned row matches what was written.
    let stored = fixture.task(task.id).await;
    assert_eq!(stored.status, "processing");
    assert_eq!(stored.attempts, 1);
}

#[tokio::test]
async fn test_claims_are_scoped_to_group_and_ordered() {
    let fixture = TestFixture::sqlite().await;
    let first = fixture.insert_task(SignalGroup::Default, 1, 1).await;
    fixture.advance_secs(1);
    let second = fixture.insert_task(SignalGroup::Default, 2, 1).await;
    let other_group = fixture.insert_task(SignalGroup::Ai, 3, 1).await;

    let dal = fixture.dal();
    let policy = RetryPolicy::default();
    let now = fixture.now();

    let a = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, now)
        .await
        .unwrap()
        .unwrap();
    let b = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((a.id, b.id), (first.id, second.id));

    assert!(dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, now)
        .await
        .unwrap()
        .is_none());

    let ai = fixture.task(other_group.id).await;
    assert_eq!(ai.status, "pending");
}

#[tokio::test]
async fn test_failed_task_is_retried_until_attempts_run_out() {
    let fixture = TestFixture::sqlite().await;
    let task = fixture.insert_task(SignalGroup::Default, 1, 1).await;
    let dal = fixture.dal();
    let policy = RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    };

    let mut attempts_seen = Vec::new();
    while let Some(claimed) = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, fixture.now())
        .await
        .unwrap()
    {
        attempts_seen.push(claimed.attempts);
        let written = dal
            .delivery_task()
            .record_outcome(
                claimed.attempts,
                TaskStatus::Failed,
                outcome_record(&claimed, OutcomeStatus::Failure, Some("boom")),
            )
            .await
            .unwrap();
        assert!(written.recorded());
    }

    assert_eq!(attempts_seen, vec![1, 2]);
    let stored = fixture.task(task.id).await;
    assert_eq!(stored.status, "failed");
    assert_eq!(stored.attempts, 2);
    assert_eq!(stored.error_message.as_deref(), Some("boom"));
    assert!(policy.is_exhausted(TaskStatus::Failed, stored.attempts));
}

#[tokio::test]
async fn test_rate_limited_task_waits_for_backoff() {
    let fixture = TestFixture::sqlite().await;
    let task = fixture.insert_task(SignalGroup::Default, 1, 1).await;
    let dal = fixture.dal();
    let policy = RetryPolicy::default();

    let claimed = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, fixture.now())
        .await
        .unwrap()
        .unwrap();
    dal.delivery_task()
        .record_outcome(
            claimed.attempts,
            TaskStatus::RateLimited,
            outcome_record(&claimed, OutcomeStatus::Failure, None),
        )
        .await
        .unwrap();

    // Inside the window: not eligible.
    fixture.advance_secs(299);
    assert!(dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, fixture.now())
        .await
        .unwrap()
        .is_none());

    // Exactly one window after the last attempt: eligible.
    fixture.advance_secs(1);
    let again = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, fixture.now())
        .await
        .unwrap()
        .expect("Task should be eligible after backoff");
    assert_eq!(again.id, task.id);
    assert_eq!(again.attempts, 2);
}

#[tokio::test]
async fn test_completed_and_processing_tasks_are_never_claimed() {
    let fixture = TestFixture::sqlite().await;
    fixture.insert_task(SignalGroup::Default, 1, 1).await;
    fixture.insert_task(SignalGroup::Default, 1, 2).await;
    let dal = fixture.dal();
    let policy = RetryPolicy::default();

    let done = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, fixture.now())
        .await
        .unwrap()
        .unwrap();
    dal.delivery_task()
        .record_outcome(
            done.attempts,
            TaskStatus::Completed,
            outcome_record(&done, OutcomeStatus::Success, None),
        )
        .await
        .unwrap();

    // Claimed and never finished.
    let held = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, fixture.now())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(held.id, done.id);

    fixture.advance_secs(3600);
    assert!(dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, fixture.now())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_outcome_from_a_lost_claim_is_ignored() {
    let fixture = TestFixture::sqlite().await;
    fixture.insert_task(SignalGroup::Default, 1, 1).await;
    let dal = fixture.dal();
    let policy = RetryPolicy::default();

    let first = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, fixture.now())
        .await
        .unwrap()
        .unwrap();
    dal.delivery_task()
        .record_outcome(
            first.attempts,
            TaskStatus::Failed,
            outcome_record(&first, OutcomeStatus::Failure, None),
        )
        .await
        .unwrap();

    let second = dal
        .delivery_task()
        .claim_next(SignalGroup::Default, &policy, fixture.now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.attempts, 2);

    // The first claimant reports late; neither its status nor its record
    // may land.
    let written = dal
        .delivery_task()
        .record_outcome(
            first.attempts,
            TaskStatus::Completed,
            outcome_record(&first, OutcomeStatus::Success, None),
        )
        .await
        .unwrap();
    assert!(!written.status_written);
    assert_eq!(fixture.task(first.id).await.status, "processing");
    assert_eq!(dal.forwarded_signal().count_for_task(first.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_outcome_cannot_move_back_to_pending() {
    let fixture = TestFixture::sqlite().await;
    let task = fixture.insert_task(SignalGroup::Default, 1, 1).await;

    let result = fixture
        .dal()
        .delivery_task()
        .record_outcome(
            0,
            TaskStatus::Pending,
            outcome_record(&task, OutcomeStatus::Failure, None),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(
        fixture
            .dal()
            .forwarded_signal()
            .count_for_task(task.id)
            .await
            .unwrap(),
        0
    );
}

#[cfg(feature = "postgres")]
mod postgres_tests {
    use super::*;
    use serial_test::serial;

    /// Concurrent claiming through `FOR UPDATE SKIP LOCKED`.
    #[tokio::test]
    #[serial(postgres)]
    async fn test_postgres_concurrent_claiming() {
        let Some(fixture) = TestFixture::postgres().await else {
            return;
        };
        claim_concurrently_and_check(&fixture).await;

        let stored = fixture
            .dal()
            .delivery_task()
            .count_by_status(SignalGroup::Default)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, "processing");
        assert_eq!(stored[0].count, 20);
    }

    #[tokio::test]
    #[serial(postgres)]
    async fn test_postgres_lost_claim_writes_nothing() {
        let Some(fixture) = TestFixture::postgres().await else {
            return;
        };
        fixture.insert_task(SignalGroup::Btc, 1, 1).await;
        let dal = fixture.dal();
        let policy = RetryPolicy::default();

        let first = dal
            .delivery_task()
            .claim_next(SignalGroup::Btc, &policy, fixture.now())
            .await
            .unwrap()
            .unwrap();
        let written = dal
            .delivery_task()
            .record_outcome(
                first.attempts,
                TaskStatus::Failed,
                outcome_record(&first, OutcomeStatus::Failure, Some("boom")),
            )
            .await
            .unwrap();
        assert!(written.recorded());

        let second = dal
            .delivery_task()
            .claim_next(SignalGroup::Btc, &policy, fixture.now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.attempts, 2);

        let late = dal
            .delivery_task()
            .record_outcome(
                first.attempts,
                TaskStatus::Completed,
                outcome_record(&first, OutcomeStatus::Success, None),
            )
            .await
            .unwrap();
        assert!(!late.status_written);
        assert_eq!(dal.forwarded_signal().count_for_task(first.id).await.unwrap(), 1);
    }

    /// An outcome record PostgreSQL refuses does not undo the status write.
    #[tokio::test]
    #[serial(postgres)]
    async fn test_postgres_rejected_record_keeps_status() {
        let Some(fixture) = TestFixture::postgres().await else {
            return;
        };
        fixture.insert_task(SignalGroup::Default, 1, 1).await;
        let dal = fixture.dal();

        let claimed = dal
            .delivery_task()
            .claim_next(SignalGroup::Default, &RetryPolicy::default(), fixture.now())
            .await
            .unwrap()
            .unwrap();

        // Longer than the VARCHAR(16) status column.
        let mut record = outcome_record(&claimed, OutcomeStatus::Success, None);
        record.status = "SUCCESS".repeat(4);
        let written = dal
            .delivery_task()
            .record_outcome(claimed.attempts, TaskStatus::Completed, record)
            .await
            .unwrap();

        assert!(written.status_written);
        assert!(written.record_error.is_some());
        assert!(!written.recorded());
        assert_eq!(fixture.task(claimed.id).await.status, "completed");
        assert_eq!(dal.forwarded_signal().count_for_task(claimed.id).await.unwrap(), 0);
    }
}
