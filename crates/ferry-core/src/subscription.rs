//! Subscription lists
//!
//! A node's interests are a set of topic ids. Lists are parsed from
//! settings strings such as `"1,2,5-8"`.

use std::collections::BTreeSet;
use std::str::FromStr;

use derive_more::Display;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Most topics one list may hold
pub const MAX_SUBSCRIPTIONS: usize = 65_536;

/// A publish/subscribe topic
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("{_0}")]
pub struct SubscriptionId(pub u32);

/// The set of topics a node subscribes to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubscriptionList {
    ids: BTreeSet<SubscriptionId>,
}

impl SubscriptionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated list of ids and inclusive ranges
    ///
    /// Lists larger than [`MAX_SUBSCRIPTIONS`] are rejected.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let malformed = |reason: String| ConfigError::MalformedSubscriptions {
            spec: spec.to_string(),
            reason,
        };
        let parse_id = |token: &str| {
            token
                .trim()
                .parse::<u32>()
                .map_err(|_| malformed(format!("'{}' is not a topic id", token.trim())))
        };

        let mut ids = BTreeSet::new();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let (lo, hi) = (parse_id(lo)?, parse_id(hi)?);
                    if lo > hi {
                        return Err(malformed(format!("range {}-{} is reversed", lo, hi)));
                    }
                    let width = u64::from(hi) - u64::from(lo) + 1;
                    if ids.len() as u64 + width > MAX_SUBSCRIPTIONS as u64 {
                        return Err(malformed(format!(
                            "more than {MAX_SUBSCRIPTIONS} topics"
                        )));
                    }
                    ids.extend((lo..=hi).map(SubscriptionId));
                }
                None => {
                    ids.insert(SubscriptionId(parse_id(part)?));
                }
            }
        }
        Ok(Self { ids })
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.ids.contains(&id)
    }

    /// Membership test for an optional topic; untagged messages match nothing
    pub fn contains_topic(&self, topic: Option<SubscriptionId>) -> bool {
        topic.is_some_and(|id| self.contains(id))
    }

    pub fn insert(&mut self, id: SubscriptionId) -> bool {
        self.ids.insert(id)
    }

    /// Uniformly pick one subscribed topic
    pub fn random_pick<R: Rng>(&self, rng: &mut R) -> Option<SubscriptionId> {
        if self.ids.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.ids.len());
        self.ids.iter().nth(index).copied()
    }

    /// All topics in ascending order
    pub fn ids(&self) -> Vec<SubscriptionId> {
        self.ids.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = SubscriptionId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromStr for SubscriptionList {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromIterator<SubscriptionId> for SubscriptionList {
    fn from_iter<T: IntoIterator<Item = SubscriptionId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
