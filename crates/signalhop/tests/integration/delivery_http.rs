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

//! The reqwest-backed client against a mock downstream API.

use serde_json::json;
use signalhop::delivery::{DeliveryClient, DeliveryRequest, HttpDeliveryClient};
use signalhop::{RunOutcome, SchedulingStrategy, SignalGroup, Worker};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{test_config_builder, TestFixture, TEST_TOKEN};

#[tokio::test]
async fn test_posts_payload_with_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hopper/4242/order"))
        .and(header("access-token", TEST_TOKEN))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"order_type": "buy", "coin": "BTC"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpDeliveryClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let reply = client
        .send(&DeliveryRequest {
            hopper_id: "4242".to_string(),
            access_token: TEST_TOKEN.to_string(),
            body: json!({"order_type": "buy", "coin": "BTC"}).to_string(),
        })
        .await
        .unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, r#"{"data":1}"#);
}

#[tokio::test]
async fn test_non_success_status_is_a_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = HttpDeliveryClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let reply = client
        .send(&DeliveryRequest {
            hopper_id: "1".to_string(),
            access_token: TEST_TOKEN.to_string(),
            body: "{}".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(reply.status, 429);
    assert_eq!(reply.body, "slow down");
}

#[tokio::test]
async fn test_timeout_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client = HttpDeliveryClient::new(&server.uri(), Duration::from_millis(200)).unwrap();
    let result = client
        .send(&DeliveryRequest {
            hopper_id: "1".to_string(),
            access_token: TEST_TOKEN.to_string(),
            body: "{}".to_string(),
        })
        .await;
    assert!(matches!(
        result,
        Err(signalhop::DeliveryError::Transport(_))
    ));
}

#[tokio::test]
async fn test_worker_delivers_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hopper/201/order"))
        .and(header("access-token", TEST_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let fixture = TestFixture::sqlite().await;
    let config = test_config_builder().api_base_url(server.uri()).build();
    fixture.store_signal(SignalGroup::Btc, "BTC").await;
    fixture.fan_out(config.clone()).sweep().await.unwrap();

    let worker = Worker::with_http_client(fixture.dal(), config.clone())
        .unwrap()
        .with_clock(fixture.clock.clone());
    let summary = worker
        .run(&SchedulingStrategy::per_queue(SignalGroup::Btc, &config))
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed { processed: 1 });
    assert_eq!(summary.reports[0].http_status, Some(200));
}

#[test]
fn test_rejects_invalid_base_url() {
    assert!(HttpDeliveryClient::new("not a url", Duration::from_secs(1)).is_err());
}
