//! Condition store attached to source and destination records.
//!
//! A [`Conditions`] value holds at most one [`Condition`] per type. Upserts
//! only move `last_transition_time` when the status actually flips, so a
//! quiet reconciliation pass re-applying the same status is a no-op for
//! timers built on top of transition times.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Set by the operator once provider components are installed.
pub const PROVIDER_INSTALLED: &str = "ProviderInstalled";
/// Set by the operator after validating a provider before install.
pub const PREFLIGHT_CHECK_PASSED: &str = "PreflightCheckPassed";
/// Transition time records when a rollout was last requested.
pub const LAST_APPLIED_CONFIGURATION_TIME: &str = "LastAppliedConfigurationTime";
/// Transition time records when a latest-version refresh was last requested.
pub const CHECK_LATEST_VERSION_TIME: &str = "CheckLatestVersionTime";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Ordered, type-unique collection of conditions.
///
/// Serializes as a plain list. A list carrying duplicate types collapses to
/// the last entry per type on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    pub fn is_true(&self, type_: &str) -> bool {
        self.has_status(type_, ConditionStatus::True)
    }

    pub fn is_false(&self, type_: &str) -> bool {
        self.has_status(type_, ConditionStatus::False)
    }

    pub fn is_unknown(&self, type_: &str) -> bool {
        self.has_status(type_, ConditionStatus::Unknown)
    }

    fn has_status(&self, type_: &str, status: ConditionStatus) -> bool {
        self.get(type_).is_some_and(|c| c.status == status)
    }

    /// Upsert `condition` by type.
    ///
    /// The transition time becomes `now` for a new entry or a status flip.
    /// Otherwise the stored transition time is kept while reason and message
    /// are still replaced. Existing entries keep their position.
    pub fn set_at(&mut self, mut condition: Condition, now: DateTime<Utc>) {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                condition.last_transition_time = if existing.status == condition.status {
                    existing.last_transition_time
                } else {
                    now
                };
                *existing = condition;
            }
            None => {
                condition.last_transition_time = now;
                self.0.push(condition);
            }
        }
    }

    /// `set_at` with the current time.
    pub fn set(&mut self, condition: Condition) {
        self.set_at(condition, Utc::now());
    }

    pub fn mark_true_at(&mut self, type_: &str, now: DateTime<Utc>) {
        self.set_at(Condition::new(type_, ConditionStatus::True, "", ""), now);
    }

    pub fn mark_false_at(&mut self, type_: &str, reason: &str, message: &str, now: DateTime<Utc>) {
        self.set_at(
            Condition::new(type_, ConditionStatus::False, reason, message),
            now,
        );
    }

    pub fn mark_unknown_at(
        &mut self,
        type_: &str,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) {
        self.set_at(
            Condition::new(type_, ConditionStatus::Unknown, reason, message),
            now,
        );
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        let mut conditions = Conditions::new();
        for condition in list {
            match conditions.0.iter_mut().find(|c| c.type_ == condition.type_) {
                Some(existing) => *existing = condition,
                None => conditions.0.push(condition),
            }
        }
        conditions
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0
    }
}

impl<'a> IntoIterator for &'a Conditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Conditions {
    type Item = Condition;
    type IntoIter = std::vec::IntoIter<Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
