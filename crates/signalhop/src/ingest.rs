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

//! Validation and storage of inbound webhook signals.
//!
//! Validation happens entirely before the database is touched, so a
//! rejected body never leaves a row behind.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::config::SignalhopConfig;
use crate::dal::{FanOutResult, DAL};
use crate::error::IngestError;
use crate::models::signal::{NewSignal, Signal, SignalGroup};

/// A validated inbound signal, not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundSignal {
    pub group: SignalGroup,
    pub payload: Value,
}

impl InboundSignal {
    /// Validates a raw webhook body.
    ///
    /// The body must be a JSON object with string `order_type` and `coin`
    /// fields; an empty body is treated as `{}` and therefore rejected for
    /// missing fields. The group comes from `group_hint` (path or query)
    /// when given, else from the body's `group` field, else `default`.
    pub fn parse(body: &[u8], group_hint: Option<&str>) -> Result<Self, IngestError> {
        let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(body).map_err(|e| IngestError::InvalidJson(e.to_string()))?
        };

        let has_string = |field: &str| payload.get(field).is_some_and(Value::is_string);
        if !has_string("order_type") || !has_string("coin") {
            return Err(IngestError::MissingFields);
        }

        let hint = group_hint.map(str::trim).filter(|h| !h.is_empty());
        let group = SignalGroup::from_tag(hint.or_else(|| payload.get("group").and_then(Value::as_str)));

        Ok(Self { group, payload })
    }
}

/// The stored signal, plus the fan-out result when fan-out ran inline.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub signal: Signal,
    #[serde(skip)]
    pub fan_out: Option<FanOutResult>,
}

/// Stores a validated signal with status `new`.
///
/// When the configuration enables `fanout_on_ingest` and carries an access
/// token, the signal is fanned out immediately. A failed inline fan-out is
/// only logged: the signal stays `new` and the next sweep picks it up.
pub async fn ingest(
    dal: &DAL,
    config: &SignalhopConfig,
    inbound: InboundSignal,
    now: NaiveDateTime,
) -> Result<IngestReceipt, IngestError> {
    let new_signal = NewSignal::new(inbound.group, &inbound.payload, now)?;
    let signal = dal.signal().create(new_signal).await?;

    metrics::counter!("signalhop_signals_ingested_total", "group" => inbound.group.as_str())
        .increment(1);
    info!(
        signal_id = signal.id,
        group = %inbound.group,
        "Signal stored"
    );

    let fan_out = match (config.fanout_on_ingest(), config.access_token()) {
        (true, Some(token)) => {
            let targets = config.hoppers().targets_for(inbound.group);
            match dal
                .fan_out()
                .fan_out_next(inbound.group, targets, token, Some(signal.id), now)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    error!(signal_id = signal.id, "Inline fan-out failed: {}", e);
                    None
                }
            }
        }
        (true, None) => {
            error!(
                signal_id = signal.id,
                "Inline fan-out skipped: no access token configured"
            );
            None
        }
        (false, _) => None,
    };

    Ok(IngestReceipt { signal, fan_out })
}
