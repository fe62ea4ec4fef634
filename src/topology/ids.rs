//! Identifier generation for synthesized entities.
//!
//! The mutation engine never keeps process-wide counters. Callers pass an
//! [`IdGenerator`] explicitly; production code uses [`RandomIds`] and tests
//! use [`SequentialIds`] for reproducible fixtures.

use rand::Rng;

/// Source of fresh, globally unique identifiers.
pub trait IdGenerator {
    fn next_id(&mut self) -> String;
}

/// Random 128-bit identifiers rendered as 32 lowercase hex characters.
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> String {
        let value: u128 = rand::thread_rng().gen();
        format!("{:032x}", value)
    }
}

/// Deterministic identifiers `{prefix}{n}` for tests and fixtures.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        let id = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}
