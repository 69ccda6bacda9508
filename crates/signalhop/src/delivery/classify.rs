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

//! Classification of a delivery attempt.
//!
//! | Reply                              | Kind           | Task status    | Rate-limit row |
//! |------------------------------------|----------------|----------------|----------------|
//! | 2xx, JSON or empty body            | `Success`      | `completed`    | cleared        |
//! | 2xx, body is not JSON              | `ParseFailure` | `failed`       | cleared        |
//! | 429                                | `RateLimited`  | `rate_limited` | set            |
//! | any other status                   | `Rejected`     | `failed`       | cleared        |
//! | no reply                           | `Transport`    | `failed`       | cleared        |
//!
//! Everything here is pure; the worker applies the result.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::HttpReply;
use crate::error::DeliveryError;
use crate::models::delivery_task::TaskStatus;
use crate::models::forwarded_signal::OutcomeStatus;

const RATE_LIMIT_FALLBACK: &str = "Rate limit error response from upstream.";
const PARSE_ERROR_MARKER: &str = "Response body is not valid JSON";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    Success,
    RateLimited,
    Rejected,
    ParseFailure,
    Transport,
}

impl DeliveryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryKind::Success => "success",
            DeliveryKind::RateLimited => "rate_limited",
            DeliveryKind::Rejected => "rejected",
            DeliveryKind::ParseFailure => "parse_failure",
            DeliveryKind::Transport => "transport",
        }
    }
}

/// What the worker does to the global rate-limit timeline after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAction {
    Set { until: NaiveDateTime },
    Clear,
}

/// A classified delivery attempt, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub kind: DeliveryKind,
    /// Absent when no HTTP response was received.
    pub http_status: Option<u16>,
    /// Response snapshot for the outcome record; never missing.
    pub response: Value,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.kind == DeliveryKind::Success
    }

    pub fn outcome_status(&self) -> OutcomeStatus {
        if self.is_success() {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::Failure
        }
    }

    /// The status the task moves to out of `processing`.
    pub fn next_task_status(&self) -> TaskStatus {
        match self.kind {
            DeliveryKind::Success => TaskStatus::Completed,
            DeliveryKind::RateLimited => TaskStatus::RateLimited,
            DeliveryKind::Rejected | DeliveryKind::ParseFailure | DeliveryKind::Transport => {
                TaskStatus::Failed
            }
        }
    }

    pub fn rate_limit_action(
        &self,
        now: NaiveDateTime,
        window: chrono::Duration,
    ) -> RateLimitAction {
        match self.kind {
            DeliveryKind::RateLimited => RateLimitAction::Set {
                until: now.checked_add_signed(window).unwrap_or(NaiveDateTime::MAX),
            },
            _ => RateLimitAction::Clear,
        }
    }
}

/// Classifies the result of one `DeliveryClient::send`.
pub fn classify(result: Result<HttpReply, DeliveryError>) -> DeliveryOutcome {
    match result {
        Ok(reply) => classify_reply(&reply),
        Err(e) => {
            let message = e.to_string();
            DeliveryOutcome {
                kind: DeliveryKind::Transport,
                http_status: None,
                response: json!({ "fetch_error": message }),
                error: Some(message),
            }
        }
    }
}

fn classify_reply(reply: &HttpReply) -> DeliveryOutcome {
    let (body, parse_error) = parse_body(&reply.body);
    let status = reply.status;

    if (200..300).contains(&status) {
        return match parse_error {
            None => DeliveryOutcome {
                kind: DeliveryKind::Success,
                http_status: Some(status),
                response: body,
                error: None,
            },
            Some(details) => DeliveryOutcome {
                kind: DeliveryKind::ParseFailure,
                http_status: Some(status),
                response: body,
                error: Some(format!("Response parse error: {}", details)),
            },
        };
    }

    let (kind, error) = if status == 429 {
        let message = truthy(body.get("message"))
            .map(text)
            .unwrap_or_else(|| RATE_LIMIT_FALLBACK.to_string());
        (
            DeliveryKind::RateLimited,
            format!("Rate limit (429): {}", message),
        )
    } else {
        let error = present(body.get("error"))
            .or_else(|| present(body.get("message")))
            .map(text)
            .unwrap_or_else(|| format!("Non-2xx/429 HTTP status: {}", status));
        (DeliveryKind::Rejected, error)
    };

    DeliveryOutcome {
        kind,
        http_status: Some(status),
        response: annotate_failure(body, &error),
        error: Some(error),
    }
}

/// Parses a response body. An empty body is JSON `null`; anything else that
/// does not parse becomes a placeholder object plus the parse error.
fn parse_body(raw: &str) -> (Value, Option<String>) {
    if raw.trim().is_empty() {
        return (Value::Null, None);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => (value, None),
        Err(e) => {
            let details = e.to_string();
            (
                json!({
                    "response_parse_error": PARSE_ERROR_MARKER,
                    "error_details": details,
                }),
                Some(details),
            )
        }
    }
}

/// Makes a failure response self-describing: non-objects are wrapped, and
/// the effective error is added when the body names none.
fn annotate_failure(body: Value, error: &str) -> Value {
    let mut object = match body {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("actual_response_body".to_string(), other);
            map
        }
    };
    if truthy(object.get("error")).is_none() && truthy(object.get("message")).is_none() {
        object.insert(
            "effective_error".to_string(),
            Value::String(error.to_string()),
        );
    }
    Value::Object(object)
}

/// A field that is set to something other than `null`.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// A field that is set to something other than `null`, `false`, `0` or `""`.
fn truthy(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
