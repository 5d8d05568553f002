//! Shared-secret generation and the rotation coin flip.
//!
//! The secret is a plaintext alphanumeric token compared by the endpoint,
//! not a signing key. Rotation is probabilistic and last-writer-wins.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{NotifyError, NotifyResult};

pub const DEFAULT_SECRET_LENGTH: usize = 20;
pub const DEFAULT_ROTATION_PROBABILITY: f64 = 0.5;
pub const MIN_SECRET_LENGTH: usize = 8;

// ---------------------------------------------------------------------------
// SharedSecret
// ---------------------------------------------------------------------------

/// A webhook password. Zeroized on drop, redacted in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Zeroizing<String>);

impl SharedSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// `length` characters drawn uniformly from `[A-Za-z0-9]`.
    pub fn generate<R: Rng>(rng: &mut R, length: usize) -> Self {
        let value: String = rng
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
        Self::new(value)
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret(len={}, [REDACTED])", self.len())
    }
}

/// Endpoint-side check: does `presented` equal the stored secret?
///
/// Constant time over the bytes. An empty stored secret never matches,
/// so a missing secret document cannot be satisfied by an empty password.
pub fn verify_password(stored: &str, presented: &str) -> bool {
    if stored.is_empty() {
        return false;
    }
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

// ---------------------------------------------------------------------------
// RotationPolicy
// ---------------------------------------------------------------------------

/// When and how to replace a secret after a successful call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationPolicy {
    probability: f64,
    secret_length: usize,
}

impl RotationPolicy {
    pub fn new(probability: f64, secret_length: usize) -> NotifyResult<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(NotifyError::ConfigurationError(format!(
                "rotation probability must be within 0.0..=1.0, got {}",
                probability
            )));
        }
        if secret_length < MIN_SECRET_LENGTH {
            return Err(NotifyError::ConfigurationError(format!(
                "secret length must be at least {}, got {}",
                MIN_SECRET_LENGTH, secret_length
            )));
        }
        Ok(Self {
            probability,
            secret_length,
        })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn secret_length(&self) -> usize {
        self.secret_length
    }

    /// One independent coin flip per successful call.
    pub fn should_rotate<R: Rng>(&self, rng: &mut R) -> bool {
        rng.gen_bool(self.probability)
    }

    pub fn next_secret<R: Rng>(&self, rng: &mut R) -> SharedSecret {
        SharedSecret::generate(rng, self.secret_length)
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            probability: DEFAULT_ROTATION_PROBABILITY,
            secret_length: DEFAULT_SECRET_LENGTH,
        }
    }
}
