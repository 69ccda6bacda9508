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

//! Downstream targets ("hoppers") each signal group fans out to.
//!
//! The registry is static for the life of a process. Every signal of a group
//! becomes one delivery task per target of that group, numbered in the order
//! the targets are listed here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;
use crate::models::signal::SignalGroup;

/// One downstream hopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopperTarget {
    /// Identifier used in the delivery URL.
    pub id: String,
    /// Display label recorded with every task and outcome.
    pub exchange: String,
}

impl HopperTarget {
    pub fn new(id: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            exchange: exchange.into(),
        }
    }
}

/// Ordered hopper targets per signal group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopperRegistry {
    targets: HashMap<SignalGroup, Vec<HopperTarget>>,
}

impl HopperRegistry {
    /// A registry with no targets for any group.
    pub fn empty() -> Self {
        Self {
            targets: HashMap::new(),
        }
    }

    /// The production deployment's targets.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.set(
            SignalGroup::Default,
            vec![
                HopperTarget::new("1403066", "Bitvavo - Smart dca"),
                HopperTarget::new("1455342", "Kucoin - Smart dca"),
                HopperTarget::new("1808770", "Crypto.com - Smart dca"),
                HopperTarget::new("1817774", "Coinbase - Smart dca"),
                HopperTarget::new("1992607", "Kucoin - Swing trader"),
                HopperTarget::new("1992597", "Coinbase - Swing trader EUR"),
                HopperTarget::new("1992599", "Coinbase - Swing trader USDC"),
                HopperTarget::new("2084026", "OKX - Swing trader"),
            ],
        );
        registry.set(
            SignalGroup::Btc,
            vec![
                HopperTarget::new("1989465", "Coinbase - EUR"),
                HopperTarget::new("1989473", "Coinbase - USDC"),
                HopperTarget::new("1989545", "Kucoin - USDC"),
            ],
        );
        registry.set(
            SignalGroup::Ai,
            vec![HopperTarget::new("1790517", "Kraken X stocks")],
        );
        registry
    }

    /// Replaces the targets of one group.
    pub fn set(&mut self, group: SignalGroup, targets: Vec<HopperTarget>) {
        self.targets.insert(group, targets);
    }

    pub fn with_group(mut self, group: SignalGroup, targets: Vec<HopperTarget>) -> Self {
        self.set(group, targets);
        self
    }

    /// Targets of `group` in fan-out order; empty when none are configured.
    pub fn targets_for(&self, group: SignalGroup) -> &[HopperTarget] {
        self.targets.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every group with its targets, in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (SignalGroup, &[HopperTarget])> {
        SignalGroup::ALL
            .into_iter()
            .map(move |group| (group, self.targets_for(group)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (group, targets) in self.iter() {
            if targets.iter().any(|t| t.id.trim().is_empty()) {
                return Err(ConfigError::EmptyHopperId {
                    group: group.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for HopperRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
