//! Message generation
//!
//! Every node creates one message per `interval` seconds, starting at a
//! random phase so nodes do not all fire on the same tick. Each message is
//! tagged with one of the creator's own subscriptions.

use ferry_core::{Message, Priority};
use ferry_routing::Router;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::TrafficSettings;

/// Periodic publish traffic
#[derive(Debug, Clone)]
pub struct Traffic {
    settings: TrafficSettings,
    next_creation: Vec<f64>,
    counter: u64,
    rng: StdRng,
}

impl Traffic {
    pub fn new(settings: TrafficSettings, nodes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let next_creation = (0..nodes)
            .map(|_| rng.random::<f64>() * settings.interval)
            .collect();
        Self {
            settings,
            next_creation,
            counter: 0,
            rng,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.interval > 0.0
    }

    /// Messages generated so far
    pub fn generated(&self) -> u64 {
        self.counter
    }

    /// Messages due at `now`, one per node whose timer elapsed
    pub fn generate(&mut self, now: f64, routers: &mut [Router]) -> Vec<Message> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let mut created = Vec::new();
        for (index, router) in routers.iter_mut().enumerate() {
            let Some(next) = self.next_creation.get_mut(index) else {
                break;
            };
            if now < *next {
                continue;
            }
            *next += self.settings.interval;

            self.counter += 1;
            let size = if self.settings.max_size > self.settings.min_size {
                self.rng
                    .random_range(self.settings.min_size..=self.settings.max_size)
            } else {
                self.settings.min_size
            };
            let id = format!("{}{}", self.settings.prefix, self.counter);
            let mut message = Message::new(id, router.host(), size, now);
            if self.settings.random_priority {
                message = message.with_priority(Priority::from_level(self.rng.random_range(0..4)));
            }
            if let Some(topic) = router.random_subscription() {
                message = message.with_topic(topic);
            }
            created.push(message);
        }
        created
    }
}
