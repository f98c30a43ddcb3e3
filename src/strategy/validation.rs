//! Composable signal validators
//!
//! The runtime wrapper applies [`ValidationChain::contract`] to every signal a
//! strategy returns; the pipeline applies [`ValidationChain::executable`], which
//! adds the tradability and minimum-confidence rules.

use rust_decimal::Decimal;

use crate::domain::Signal;
use crate::error::SignalRejection;

// =============================================================================
// Validator Trait
// =============================================================================

pub trait SignalValidator: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, signal: &Signal) -> Result<(), SignalRejection>;
}

// =============================================================================
// Required fields
// =============================================================================

pub struct RequiredFieldsValidator;

impl SignalValidator for RequiredFieldsValidator {
    fn name(&self) -> &str {
        "RequiredFields"
    }

    fn validate(&self, signal: &Signal) -> Result<(), SignalRejection> {
        if signal.market_id.trim().is_empty() {
            return Err(SignalRejection::MissingField("market_id"));
        }
        if signal.strategy.trim().is_empty() {
            return Err(SignalRejection::MissingField("strategy"));
        }
        if signal.generated_at.is_none() {
            return Err(SignalRejection::MissingField("generated_at"));
        }
        Ok(())
    }
}

// =============================================================================
// Ranges
// =============================================================================

/// Confidence and target price in [0, 1], size fraction in [0, 1]
pub struct RangeValidator;

impl SignalValidator for RangeValidator {
    fn name(&self) -> &str {
        "Range"
    }

    fn validate(&self, signal: &Signal) -> Result<(), SignalRejection> {
        if !signal.confidence.is_finite() || !(0.0..=1.0).contains(&signal.confidence) {
            return Err(SignalRejection::ConfidenceOutOfRange(signal.confidence));
        }
        if let Some(price) = signal.target_price {
            if price < Decimal::ZERO || price > Decimal::ONE {
                return Err(SignalRejection::TargetPriceOutOfRange(price));
            }
        }
        if signal.size_fraction < Decimal::ZERO || signal.size_fraction > Decimal::ONE {
            return Err(SignalRejection::SizeOutOfRange(signal.size_fraction));
        }
        Ok(())
    }
}

// =============================================================================
// Executability
// =============================================================================

/// Only buy and sell reach execution
pub struct TradableDirectionValidator;

impl SignalValidator for TradableDirectionValidator {
    fn name(&self) -> &str {
        "TradableDirection"
    }

    fn validate(&self, signal: &Signal) -> Result<(), SignalRejection> {
        if signal.direction.is_tradable() {
            Ok(())
        } else {
            Err(SignalRejection::NotTradable(signal.direction))
        }
    }
}

pub struct MinConfidenceValidator {
    pub min_confidence: f64,
}

impl SignalValidator for MinConfidenceValidator {
    fn name(&self) -> &str {
        "MinConfidence"
    }

    fn validate(&self, signal: &Signal) -> Result<(), SignalRejection> {
        if signal.confidence < self.min_confidence {
            return Err(SignalRejection::BelowMinConfidence {
                confidence: signal.confidence,
                min: self.min_confidence,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Validation Chain
// =============================================================================

/// Runs validators in order and stops at the first rejection
pub struct ValidationChain {
    validators: Vec<Box<dyn SignalValidator>>,
}

impl ValidationChain {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    pub fn add<V: SignalValidator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Minimum contract every emitted signal must satisfy
    pub fn contract() -> Self {
        Self::new().add(RequiredFieldsValidator).add(RangeValidator)
    }

    /// Contract plus the rules for a signal to be executable
    pub fn executable(min_confidence: f64) -> Self {
        Self::contract()
            .add(TradableDirectionValidator)
            .add(MinConfidenceValidator { min_confidence })
    }

    pub fn validate(&self, signal: &Signal) -> Result<(), SignalRejection> {
        self.validators.iter().try_for_each(|v| v.validate(signal))
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Default for ValidationChain {
    fn default() -> Self {
        Self::contract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalDirection;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn stamped(direction: SignalDirection, confidence: f64) -> Signal {
        let mut signal = Signal::new("M1", direction, confidence, dec!(0.05));
        signal.strategy = "test".to_string();
        signal.generated_at = Some(Utc::now());
        signal
    }

    #[test]
    fn test_contract_accepts_hold() {
        let chain = ValidationChain::contract();
        assert!(chain.validate(&stamped(SignalDirection::Hold, 0.9)).is_ok());
    }

    #[test]
    fn test_contract_rejects_out_of_range() {
        let chain = ValidationChain::contract();

        assert_eq!(
            chain.validate(&stamped(SignalDirection::Buy, 1.2)),
            Err(SignalRejection::ConfidenceOutOfRange(1.2))
        );
        assert!(chain.validate(&stamped(SignalDirection::Buy, f64::NAN)).is_err());

        let priced = stamped(SignalDirection::Buy, 0.8).with_target_price(dec!(1.01));
        assert_eq!(
            chain.validate(&priced),
            Err(SignalRejection::TargetPriceOutOfRange(dec!(1.01)))
        );
    }

    #[test]
    fn test_contract_requires_stamp() {
        let chain = ValidationChain::contract();
        let blank = Signal::new("M1", SignalDirection::Buy, 0.8, dec!(0.05));
        assert_eq!(
            chain.validate(&blank),
            Err(SignalRejection::MissingField("strategy"))
        );
    }

    #[test]
    fn test_executable_rules() {
        let chain = ValidationChain::executable(0.6);
        assert_eq!(chain.len(), 4);

        assert_eq!(
            chain.validate(&stamped(SignalDirection::Hold, 0.9)),
            Err(SignalRejection::NotTradable(SignalDirection::Hold))
        );
        assert!(matches!(
            chain.validate(&stamped(SignalDirection::Sell, 0.5)),
            Err(SignalRejection::BelowMinConfidence { .. })
        ));
        assert!(chain.validate(&stamped(SignalDirection::Sell, 0.6)).is_ok());
    }
}
