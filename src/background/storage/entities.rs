use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utils::time::remaining_minutes;

/// Budget bookkeeping for one monitored domain. Field names follow the persisted layout shared
/// with the extension.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    /// Milliseconds accumulated during `last_date`.
    pub time_spent: u64,
    /// Epoch milliseconds of the last accumulation tick.
    pub last_updated: Option<i64>,
    pub last_date: String,
    pub blocked: bool,
    /// Daily budget in milliseconds.
    pub time_limit: u64,
    #[serde(default)]
    pub name: String,
}

impl SiteRecord {
    pub fn new(name: impl Into<String>, time_limit: u64, today: String) -> Self {
        Self {
            time_spent: 0,
            last_updated: None,
            last_date: today,
            blocked: false,
            time_limit,
            name: name.into(),
        }
    }

    pub fn display_name<'a>(&'a self, domain: &'a str) -> &'a str {
        if self.name.trim().is_empty() {
            domain
        } else {
            &self.name
        }
    }

    pub fn is_stale(&self, today: &str) -> bool {
        self.last_date != today
    }

    /// Starts a fresh day. Returns false when the record was already up to date.
    pub fn roll_over(&mut self, today: &str) -> bool {
        if !self.is_stale(today) {
            return false;
        }
        self.reset(today);
        true
    }

    pub fn reset(&mut self, today: &str) {
        self.time_spent = 0;
        self.last_date = today.to_string();
        self.blocked = false;
    }

    pub fn is_exhausted(&self) -> bool {
        self.time_spent >= self.time_limit
    }

    /// Adds tracked time. Returns true when this step used up the budget.
    pub fn accumulate(&mut self, increment_ms: u64, now_ms: i64) -> bool {
        self.time_spent = self.time_spent.saturating_add(increment_ms);
        self.last_updated = Some(now_ms);
        if self.is_exhausted() && !self.blocked {
            self.blocked = true;
            return true;
        }
        false
    }

    /// Changes the budget, lifting a block the new budget no longer justifies.
    pub fn set_time_limit(&mut self, time_limit: u64) {
        self.time_limit = time_limit;
        if self.blocked && !self.is_exhausted() {
            self.blocked = false;
        }
    }

    pub fn remaining_minutes(&self) -> u64 {
        remaining_minutes(self.time_limit, self.time_spent)
    }
}

/// Monitored domains. Ordered, so URL resolution is deterministic.
pub type Sites = BTreeMap<String, SiteRecord>;

/// Domain to epoch milliseconds at which its ignore period ends.
pub type IgnoreMap = BTreeMap<String, i64>;

/// The whole persisted document. Also the payload of `GET_TIME_DATA`.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeData {
    #[serde(default)]
    pub sites: Sites,
    #[serde(default)]
    pub ignored_until: IgnoreMap,
}

impl TimeData {
    pub fn is_ignored(&self, domain: &str, now_ms: i64) -> bool {
        self.ignored_until
            .get(domain)
            .is_some_and(|expires_at| *expires_at > now_ms)
    }
}
