//! Classification of devices into Producer / Consumer / Storage.
//!
//! Classification is a pure function of the capability a device exposes:
//! storage wins outright, and traders split on the sign of their declared
//! rating. It is resolved once when a tracker is constructed and never
//! re-derived from live output, so a generator that momentarily reports
//! zero stays a producer.

use serde::{Deserialize, Serialize};

use crate::device::PowerCapability;
use crate::fixed::Fixed64;

/// What a device does on the grid. Exactly one category exists per variant;
/// "no classification" is an error, not a fourth category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Producer,
    Consumer,
    Storage,
}

impl Classification {
    /// All classifications, in display order.
    pub const ALL: [Classification; 3] = [
        Classification::Producer,
        Classification::Consumer,
        Classification::Storage,
    ];

    /// Category display label.
    pub fn label(self) -> &'static str {
        match self {
            Classification::Producer => "Producers",
            Classification::Consumer => "Consumers",
            Classification::Storage => "Batteries",
        }
    }
}

/// A device could not be classified or tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("device is not present in the device table")]
    UnknownDevice,
    #[error("device exposes no power capability")]
    NoCapability,
    #[error("device classification conflicts with others of its type")]
    ConflictingClassification,
}

/// Classify a capability. Storage first, then producer/consumer by the sign
/// of the declared rating (a zero rating counts as producing).
pub fn classify(capability: Option<&PowerCapability>) -> Result<Classification, ClassifyError> {
    match capability {
        Some(PowerCapability::Storage { .. }) => Ok(Classification::Storage),
        Some(trader @ PowerCapability::Trader { .. }) => {
            if trader.declared_rating() >= Fixed64::ZERO {
                Ok(Classification::Producer)
            } else {
                Ok(Classification::Consumer)
            }
        }
        None => Err(ClassifyError::NoCapability),
    }
}
