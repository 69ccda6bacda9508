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

//! Scheduling strategies.
//!
//! Both strategies drive the same claim-and-deliver loop and only differ in
//! which groups are tried, how many tasks one invocation may deliver, and
//! how long to pause between deliveries.

use std::fmt;
use std::time::Duration;

use crate::config::SignalhopConfig;
use crate::models::signal::SignalGroup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// Drain up to `batch_size` tasks from one group, pausing
    /// `inter_call_delay` between deliveries.
    PerQueue {
        group: SignalGroup,
        batch_size: usize,
        inter_call_delay: Duration,
    },
    /// Deliver exactly one task from the first group in `priority` that has
    /// an eligible task.
    GlobalPriority { priority: Vec<SignalGroup> },
}

/// The loop bounds a strategy reduces to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Groups tried, in order, before every claim.
    pub groups: Vec<SignalGroup>,
    /// Maximum number of tasks delivered by the invocation.
    pub budget: usize,
    pub inter_call_delay: Duration,
}

impl SchedulingStrategy {
    /// Per-queue strategy for `group` using the configured budget and delay.
    pub fn per_queue(group: SignalGroup, config: &SignalhopConfig) -> Self {
        SchedulingStrategy::PerQueue {
            group,
            batch_size: config.batch_size_for(group),
            inter_call_delay: config.inter_call_delay(),
        }
    }

    /// Global priority strategy over the configured group order.
    pub fn global(config: &SignalhopConfig) -> Self {
        SchedulingStrategy::GlobalPriority {
            priority: config.priority().to_vec(),
        }
    }

    pub fn plan(&self) -> RunPlan {
        match self {
            SchedulingStrategy::PerQueue {
                group,
                batch_size,
                inter_call_delay,
            } => RunPlan {
                groups: vec![*group],
                budget: *batch_size,
                inter_call_delay: *inter_call_delay,
            },
            SchedulingStrategy::GlobalPriority { priority } => RunPlan {
                groups: priority.clone(),
                budget: 1,
                inter_call_delay: Duration::ZERO,
            },
        }
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingStrategy::PerQueue { group, .. } => write!(f, "queue-{}", group),
            SchedulingStrategy::GlobalPriority { .. } => f.write_str("global"),
        }
    }
}
