//! Period-independent context templates.

use super::RunContext;
use crate::core::Period;
use crate::errors::{ConfigurationError, ContractErrorInfo};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Placeholders recognised in location templates.
pub const PLACEHOLDERS: [&str; 3] = ["ds", "ds_nodash", "root"];

pub(crate) fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z_]+)\}").expect("placeholder pattern is valid"))
}

/// Location and connection templates bound per period into a [`RunContext`].
///
/// Location templates may use `{ds}` (`YYYY-MM-DD`), `{ds_nodash}`
/// (`YYYYMMDD`) and `{root}` (the data root).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContextTemplate {
    /// Data root substituted for `{root}`.
    #[serde(default)]
    pub root: String,
    /// Location templates by key.
    #[serde(default)]
    pub locations: BTreeMap<String, String>,
    /// Connection identifiers by logical name.
    #[serde(default)]
    pub connections: BTreeMap<String, String>,
    /// Root directory of the validation data context.
    #[serde(default)]
    pub data_context_root: String,
}

impl RunContextTemplate {
    /// Creates an empty template.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Adds a location template.
    #[must_use]
    pub fn with_location(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.locations.insert(key.into(), template.into());
        self
    }

    /// Adds a connection identifier.
    #[must_use]
    pub fn with_connection(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.connections.insert(name.into(), id.into());
        self
    }

    /// Sets the validation data context root.
    #[must_use]
    pub fn with_data_context_root(mut self, root: impl Into<String>) -> Self {
        self.data_context_root = root.into();
        self
    }

    /// Returns true if a location template exists for `key`.
    #[must_use]
    pub fn has_location(&self, key: &str) -> bool {
        self.locations.contains_key(key)
    }

    /// Returns true if a non-empty connection identifier exists for `name`.
    #[must_use]
    pub fn has_connection(&self, name: &str) -> bool {
        self.connections.get(name).is_some_and(|id| !id.trim().is_empty())
    }

    /// Checks that every template only uses known placeholders and every
    /// connection identifier is non-empty.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (key, template) in &self.locations {
            for capture in placeholder_pattern().captures_iter(template) {
                let name = &capture[1];
                if !PLACEHOLDERS.contains(&name) {
                    return Err(ConfigurationError::new(format!(
                        "Location '{key}' uses unknown placeholder '{{{name}}}'"
                    ))
                    .with_error_info(
                        ContractErrorInfo::new("CONFIG-LOCATION", "Unknown placeholder")
                            .with_context_entry("location", key.clone())
                            .with_fix_hint("Use {ds}, {ds_nodash} or {root}."),
                    ));
                }
            }
        }
        for (name, id) in &self.connections {
            if id.trim().is_empty() {
                return Err(ConfigurationError::new(format!(
                    "Connection '{name}' has an empty identifier"
                ))
                .with_error_info(ContractErrorInfo::new(
                    "CONFIG-CONNECTION",
                    "Empty connection identifier",
                )));
            }
        }
        Ok(())
    }

    /// Binds the templates to a period, producing the run's context.
    #[must_use]
    pub fn bind(&self, period: Period) -> RunContext {
        let ds = period.id();
        let ds_nodash = period.id_nodash();
        let locations = self
            .locations
            .iter()
            .map(|(key, template)| {
                let value = placeholder_pattern().replace_all(template, |caps: &regex::Captures<'_>| {
                    match &caps[1] {
                        "ds" => ds.clone(),
                        "ds_nodash" => ds_nodash.clone(),
                        "root" => self.root.clone(),
                        _ => caps[0].to_string(),
                    }
                });
                (key.clone(), value.into_owned())
            })
            .collect();

        RunContext::new(
            period,
            locations,
            self.connections.clone(),
            self.data_context_root.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bind_substitutes_placeholders() {
        let template = RunContextTemplate::new()
            .with_root("/data")
            .with_location("to_raw", "{root}/filesystem/raw/retail_profiling-{ds}.csv")
            .with_location("tag", "run_{ds_nodash}")
            .with_connection("source", "postgres_source");

        let ctx = template.bind(Period::on_day(2024, 5, 17, 16).unwrap());
        assert_eq!(
            ctx.location("to_raw"),
            Some("/data/filesystem/raw/retail_profiling-2024-05-17.csv")
        );
        assert_eq!(ctx.location("tag"), Some("run_20240517"));
        assert_eq!(ctx.connection("source"), Some("postgres_source"));
    }

    #[test]
    fn test_validate_rejects_unknown_placeholder() {
        let template = RunContextTemplate::new().with_location("bad", "/x/{date}.csv");
        let err = template.validate().unwrap_err();
        assert_eq!(err.code(), Some("CONFIG-LOCATION"));
    }

    #[test]
    fn test_validate_rejects_empty_connection() {
        let template = RunContextTemplate::new().with_connection("dest", "  ");
        let err = template.validate().unwrap_err();
        assert_eq!(err.code(), Some("CONFIG-CONNECTION"));
        assert!(!template.has_connection("dest"));
    }

    #[test]
    fn test_same_period_same_fingerprint() {
        let template = RunContextTemplate::new().with_location("out", "/o/{ds}.csv");
        let period = Period::on_day(2024, 1, 2, 16).unwrap();
        assert_eq!(
            template.bind(period).fingerprint(),
            template.bind(period).fingerprint()
        );
        let next = Period::on_day(2024, 1, 3, 16).unwrap();
        assert_ne!(template.bind(period).fingerprint(), template.bind(next).fingerprint());
    }
}
