//! The immutable per-run context.

use crate::core::Period;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Everything one run needs, derived from its period.
///
/// Owned by a single executor invocation and never shared across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    run_id: Uuid,
    period: Period,
    locations: BTreeMap<String, String>,
    connections: BTreeMap<String, String>,
    data_context_root: String,
}

impl RunContext {
    /// Creates a context with a fresh run ID.
    #[must_use]
    pub fn new(
        period: Period,
        locations: BTreeMap<String, String>,
        connections: BTreeMap<String, String>,
        data_context_root: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            period,
            locations,
            connections,
            data_context_root: data_context_root.into(),
        }
    }

    /// Returns the run ID.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the period.
    #[must_use]
    pub const fn period(&self) -> Period {
        self.period
    }

    /// Returns a derived file/table location by key.
    #[must_use]
    pub fn location(&self, key: &str) -> Option<&str> {
        self.locations.get(key).map(String::as_str)
    }

    /// Returns all derived locations.
    #[must_use]
    pub const fn locations(&self) -> &BTreeMap<String, String> {
        &self.locations
    }

    /// Returns the connection identifier for a logical connection name.
    #[must_use]
    pub fn connection(&self, name: &str) -> Option<&str> {
        self.connections.get(name).map(String::as_str)
    }

    /// Returns the validation data context root.
    #[must_use]
    pub fn data_context_root(&self) -> &str {
        &self.data_context_root
    }

    /// Hashes the period-derived inputs.
    ///
    /// Two contexts bound for the same period from the same template share a
    /// fingerprint even though their run IDs differ.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.period.id().as_bytes());
        for (key, value) in self.locations.iter().chain(self.connections.iter()) {
            hasher.update(b"\0");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        hasher.update(b"\0");
        hasher.update(self.data_context_root.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}
