//! Dissemination modes
//!
//! A mode decides whether a router offers a message to neighbors that are
//! not its destination, and whether it keeps a message it received on a
//! topic it does not subscribe to.

use ferry_core::{ConfigError, InvariantError, Message};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default send and receive probability of [`DisseminationMode::SemiPorous`]
pub const DEFAULT_SEMI_POROUS_PROBABILITY: f64 = 0.5;

/// How freely messages spread beyond their subscribers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DisseminationMode {
    /// Offer and accept everything
    #[default]
    Flexible,
    /// Only hand messages to subscribers
    Strict,
    /// Offer and accept with independent probabilities
    SemiPorous {
        send_probability: f64,
        receive_probability: f64,
    },
}

impl DisseminationMode {
    /// Build a mode from its settings code
    ///
    /// `0` is FLEXIBLE, `1` STRICT and `2` SEMI_POROUS. Probabilities are
    /// only read for SEMI_POROUS and default to 0.5.
    pub fn from_setting(
        mode: i64,
        send_probability: Option<f64>,
        receive_probability: Option<f64>,
    ) -> Result<Self, ConfigError> {
        match mode {
            0 => Ok(DisseminationMode::Flexible),
            1 => Ok(DisseminationMode::Strict),
            2 => {
                let send_probability = check_probability(
                    "msgDissProbability",
                    send_probability.unwrap_or(DEFAULT_SEMI_POROUS_PROBABILITY),
                )?;
                let receive_probability = check_probability(
                    "msgAcceptProbability",
                    receive_probability.unwrap_or(DEFAULT_SEMI_POROUS_PROBABILITY),
                )?;
                Ok(DisseminationMode::SemiPorous {
                    send_probability,
                    receive_probability,
                })
            }
            other => Err(ConfigError::ModeOutOfRange {
                field: "dissemination mode",
                value: other,
            }),
        }
    }

    /// Settings code of this mode
    pub fn code(&self) -> i64 {
        match self {
            DisseminationMode::Flexible => 0,
            DisseminationMode::Strict => 1,
            DisseminationMode::SemiPorous { .. } => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DisseminationMode::Flexible => "FLEXIBLE",
            DisseminationMode::Strict => "STRICT",
            DisseminationMode::SemiPorous { .. } => "SEMI_POROUS",
        }
    }

    pub fn send_probability(&self) -> f64 {
        match self {
            DisseminationMode::Flexible => 1.0,
            DisseminationMode::Strict => 0.0,
            DisseminationMode::SemiPorous {
                send_probability, ..
            } => *send_probability,
        }
    }

    pub fn receive_probability(&self) -> f64 {
        match self {
            DisseminationMode::Flexible => 1.0,
            DisseminationMode::Strict => 0.0,
            DisseminationMode::SemiPorous {
                receive_probability,
                ..
            } => *receive_probability,
        }
    }

    /// Draw whether to offer a message to non-subscribers
    ///
    /// FLEXIBLE and STRICT never consume randomness.
    pub fn should_offer<R: Rng>(&self, rng: &mut R) -> bool {
        match self {
            DisseminationMode::Flexible => true,
            DisseminationMode::Strict => false,
            DisseminationMode::SemiPorous {
                send_probability, ..
            } => rng.random::<f64>() < *send_probability,
        }
    }

    /// Draw whether to keep a message received on a foreign topic
    pub fn should_accept<R: Rng>(&self, rng: &mut R) -> bool {
        match self {
            DisseminationMode::Flexible => true,
            DisseminationMode::Strict => false,
            DisseminationMode::SemiPorous {
                receive_probability,
                ..
            } => rng.random::<f64>() < *receive_probability,
        }
    }

    /// Human readable cause for discarding `message`
    ///
    /// FLEXIBLE never discards, so asking for its cause is an invariant
    /// violation.
    pub fn rejection_cause(&self, message: &Message) -> Result<String, InvariantError> {
        match self {
            DisseminationMode::Flexible => {
                Err(InvariantError::FlexibleModeRejected(message.id.to_string()))
            }
            DisseminationMode::Strict => Ok("strict dissemination mode".to_string()),
            DisseminationMode::SemiPorous {
                receive_probability,
                ..
            } => Ok(format!(
                "message discarded due to a semi-porous strategy. \
                 The probability of discarding messages is {}",
                1.0 - receive_probability
            )),
        }
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::ProbabilityOutOfRange { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::NodeId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_from_setting_codes() {
        assert_eq!(
            DisseminationMode::from_setting(0, Some(0.1), Some(0.1)).unwrap(),
            DisseminationMode::Flexible
        );
        assert_eq!(
            DisseminationMode::from_setting(1, None, None).unwrap(),
            DisseminationMode::Strict
        );
        assert_eq!(
            DisseminationMode::from_setting(2, None, None).unwrap(),
            DisseminationMode::SemiPorous {
                send_probability: 0.5,
                receive_probability: 0.5
            }
        );
    }

    #[test]
    fn test_from_setting_out_of_range() {
        let err = DisseminationMode::from_setting(3, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::ModeOutOfRange { value: 3, .. }));
        assert!(DisseminationMode::from_setting(-1, None, None).is_err());
    }

    #[test]
    fn test_from_setting_bad_probability() {
        let err = DisseminationMode::from_setting(2, Some(1.5), None).unwrap_err();
        assert!(matches!(err, ConfigError::ProbabilityOutOfRange { .. }));
        assert!(DisseminationMode::from_setting(2, None, Some(-0.1)).is_err());
    }

    #[test]
    fn test_fixed_probabilities() {
        assert_eq!(DisseminationMode::Flexible.send_probability(), 1.0);
        assert_eq!(DisseminationMode::Flexible.receive_probability(), 1.0);
        assert_eq!(DisseminationMode::Strict.send_probability(), 0.0);
        assert_eq!(DisseminationMode::Strict.receive_probability(), 0.0);
    }

    #[test]
    fn test_deterministic_modes_never_flip() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(DisseminationMode::Flexible.should_offer(&mut rng));
            assert!(DisseminationMode::Flexible.should_accept(&mut rng));
            assert!(!DisseminationMode::Strict.should_offer(&mut rng));
            assert!(!DisseminationMode::Strict.should_accept(&mut rng));
        }
    }

    #[test]
    fn test_semi_porous_extremes() {
        let mode = DisseminationMode::SemiPorous {
            send_probability: 1.0,
            receive_probability: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            assert!(mode.should_offer(&mut rng));
            assert!(!mode.should_accept(&mut rng));
        }
    }

    #[test]
    fn test_semi_porous_rate() {
        let mode = DisseminationMode::SemiPorous {
            send_probability: 0.3,
            receive_probability: 0.3,
        };
        let mut rng = StdRng::seed_from_u64(42);
        let accepted = (0..10_000).filter(|_| mode.should_accept(&mut rng)).count();
        assert!((2_500..3_500).contains(&accepted));
    }

    #[test]
    fn test_rejection_causes() {
        let m = Message::new("M1", NodeId(0), 10, 0.0);
        assert_eq!(
            DisseminationMode::Strict.rejection_cause(&m).unwrap(),
            "strict dissemination mode"
        );
        let cause = DisseminationMode::SemiPorous {
            send_probability: 1.0,
            receive_probability: 0.25,
        }
        .rejection_cause(&m)
        .unwrap();
        assert!(cause.contains("semi-porous"));
        assert!(cause.ends_with("0.75"));

        let err = DisseminationMode::Flexible.rejection_cause(&m).unwrap_err();
        assert!(err.to_string().contains("FLEXIBLE"));
    }
}
