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

//! The global rate-limit gate.

use chrono::Duration;
use serde_json::json;
use signalhop::models::rate_limit::NewRateLimitStatus;
use signalhop::{RunOutcome, SchedulingStrategy, SignalGroup};

use crate::fixtures::{test_config, ScriptedClient, TestFixture};

#[tokio::test]
async fn test_newest_row_wins() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    assert!(dal.rate_limit_status().latest().await.unwrap().is_none());

    let now = fixture.now();
    dal.rate_limit_status()
        .record(NewRateLimitStatus::limited(now + Duration::minutes(5), now))
        .await
        .unwrap();
    let latest = dal.rate_limit_status().latest().await.unwrap().unwrap();
    assert!(latest.is_active(now));

    dal.rate_limit_status()
        .record(NewRateLimitStatus::cleared(now))
        .await
        .unwrap();
    let latest = dal.rate_limit_status().latest().await.unwrap().unwrap();
    assert!(!latest.is_active(now));
}

#[tokio::test]
async fn test_gate_blocks_every_group() {
    let fixture = TestFixture::sqlite().await;
    let config = test_config();
    fixture.store_signal(SignalGroup::Default, "BTC").await;
    fixture.store_signal(SignalGroup::Btc, "BTC").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    let now = fixture.now();
    let until = now + Duration::minutes(5);
    fixture
        .dal()
        .rate_limit_status()
        .record(NewRateLimitStatus::limited(until, now))
        .await
        .unwrap();

    let client = ScriptedClient::new();
    let worker = fixture.worker(client.clone(), config.clone());

    for strategy in [
        SchedulingStrategy::global(&config),
        SchedulingStrategy::per_queue(SignalGroup::Btc, &config),
    ] {
        let summary = worker.run(&strategy).await.unwrap();
        assert_eq!(
            summary.outcome,
            RunOutcome::RateLimited {
                until,
                processed: 0
            }
        );
        assert!(summary.message().contains("skipped: rate limit active"));
    }
    assert!(client.requests().is_empty());

    // Once the window passes, delivery resumes.
    fixture.advance_secs(300);
    let summary = worker.run(&SchedulingStrategy::global(&config)).await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed { processed: 1 });
}

#[tokio::test]
async fn test_rate_limit_stops_a_batch_mid_run() {
    let fixture = TestFixture::sqlite().await;
    let config = test_config();
    // Two default targets per signal.
    fixture.store_signal(SignalGroup::Default, "BTC").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    let client = ScriptedClient::new();
    client.push_reply(429, json!({}));
    let worker = fixture.worker(client.clone(), config.clone());

    let summary = worker
        .run(&SchedulingStrategy::per_queue(SignalGroup::Default, &config))
        .await
        .unwrap();
    assert!(matches!(
        summary.outcome,
        RunOutcome::RateLimited { processed: 1, .. }
    ));
    assert_eq!(client.requests().len(), 1);
    assert_eq!(
        summary.reports[0].error.as_deref(),
        Some("Rate limit (429): Rate limit error response from upstream.")
    );
}

#[tokio::test]
async fn test_success_clears_the_gate() {
    let fixture = TestFixture::sqlite().await;
    let config = test_config();
    fixture.store_signal(SignalGroup::Btc, "BTC").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    // An expired limit row: the gate is open but the row still says limited.
    let now = fixture.now();
    fixture
        .dal()
        .rate_limit_status()
        .record(NewRateLimitStatus::limited(now, now - Duration::minutes(5)))
        .await
        .unwrap();

    let worker = fixture.worker(ScriptedClient::new(), config.clone());
    worker.run(&SchedulingStrategy::global(&config)).await.unwrap();

    let latest = fixture
        .dal()
        .rate_limit_status()
        .latest()
        .await
        .unwrap()
        .unwrap();
    assert!(!latest.is_limited);
}
