//! Retry policy layered above the executor.
//!
//! The executor never retries. A node that should be retried is wrapped in
//! a [`RetryingRunner`] or [`RetryingGate`], which re-invokes it with backoff
//! while the failure is retryable and records how many attempts were made.

use crate::context::RunContext;
use crate::core::{RunnerKind, StageResult};
use crate::stages::{QualityGate, StageRunner};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Configuration for node retries.
///
/// The default is a single attempt, i.e. no retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 60_000,
            max_delay_ms: 600_000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates the default (no retry) config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Returns true if more than one attempt is allowed.
    #[must_use]
    pub fn retries_enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

/// Attempt counter and delay calculator for one node invocation.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts made so far.
    pub attempt: u32,
    previous_delay: Option<u64>,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no attempts remain.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.max_attempts.max(1)
    }

    /// Calculates the delay before the next attempt.
    ///
    /// `attempt` counts completed attempts, so the first retry uses the base
    /// delay.
    #[must_use]
    pub fn calculate_delay(&mut self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let step = self.attempt.saturating_sub(1);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(step)).min(max),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(step) + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                let next = if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                };
                self.previous_delay = Some(next);
                next
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Invokes `attempt` until it succeeds, fails with a non-retryable result,
/// or attempts run out. The returned result carries the attempt count.
pub async fn retry_stage<F, Fut>(config: &RetryConfig, node: &str, mut attempt: F) -> StageResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StageResult>,
{
    let mut state = RetryState::new();

    loop {
        let result = attempt().await;
        state.attempt += 1;

        if result.is_success() || !result.is_retryable() || state.is_exhausted(config) {
            if result.is_failure() && state.attempt > 1 {
                warn!(node, attempts = state.attempt, "Giving up after retries");
            }
            return result.with_attempts(state.attempt);
        }

        let delay = state.calculate_delay(config);
        debug!(
            node,
            attempt = state.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            message = result.message.as_deref().unwrap_or_default(),
            "Retrying after retryable failure"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Wraps a runner with a retry policy.
#[derive(Debug, Clone)]
pub struct RetryingRunner {
    inner: Arc<dyn StageRunner>,
    config: RetryConfig,
}

impl RetryingRunner {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn StageRunner>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl StageRunner for RetryingRunner {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> RunnerKind {
        self.inner.kind()
    }

    fn required_locations(&self) -> Vec<String> {
        self.inner.required_locations()
    }

    fn required_connections(&self) -> Vec<String> {
        self.inner.required_connections()
    }

    async fn run(&self, ctx: &RunContext) -> StageResult {
        retry_stage(&self.config, self.inner.name(), || self.inner.run(ctx)).await
    }
}

/// Wraps a gate with a retry policy.
///
/// Only infrastructure failures are retried; a checkpoint that evaluated and
/// did not pass is returned as is.
#[derive(Debug, Clone)]
pub struct RetryingGate {
    inner: Arc<dyn QualityGate>,
    config: RetryConfig,
}

impl RetryingGate {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn QualityGate>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl QualityGate for RetryingGate {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn evaluate(&self, ctx: &RunContext, checkpoint_name: &str) -> StageResult {
        retry_stage(&self.config, self.inner.name(), || {
            self.inner.evaluate(ctx, checkpoint_name)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContextTemplate;
    use crate::core::{FailureKind, Period};
    use crate::testing::{ScriptedGate, ScriptedRunner};

    fn ctx() -> RunContext {
        RunContextTemplate::new().bind(Period::on_day(2024, 1, 1, 16).unwrap())
    }

    fn fast(attempts: u32) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(attempts)
            .with_base_delay_ms(1)
            .with_max_delay_ms(5)
    }

    #[test]
    fn test_retry_config_default_is_single_attempt() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.base_delay_ms, 60_000);
        assert!(!config.retries_enabled());
    }

    #[test]
    fn test_retry_config_deserializes_partial() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts": 3, "backoff_strategy": "linear"}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.base_delay_ms, 60_000);
    }

    #[test]
    fn test_calculate_delay_exponential_no_jitter() {
        let config = RetryConfig::new().with_base_delay_ms(100);
        let mut state = RetryState::new();

        state.attempt = 1;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(100));
        state.attempt = 2;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(200));
        state.attempt = 3;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(400));
    }

    #[test]
    fn test_calculate_delay_linear_and_constant() {
        let mut state = RetryState::new();
        state.attempt = 3;

        let linear = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Linear);
        assert_eq!(state.calculate_delay(&linear), Duration::from_millis(300));

        let constant = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant);
        assert_eq!(state.calculate_delay(&constant), Duration::from_millis(100));
    }

    #[test]
    fn test_calculate_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000);
        let mut state = RetryState::new();
        state.attempt = 11;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(5000));
    }

    #[test]
    fn test_full_jitter_within_bounds() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::Full);
        let mut state = RetryState::new();
        state.attempt = 1;
        for _ in 0..20 {
            assert!(state.calculate_delay(&config) <= Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_runner_retries_infrastructure_until_success() {
        let inner = Arc::new(ScriptedRunner::new("extract").then_results([
            StageResult::infrastructure_failure("extract", "connection refused"),
            StageResult::infrastructure_failure("extract", "connection refused"),
            StageResult::success("extract"),
        ]));
        let runner = RetryingRunner::new(inner.clone(), fast(3));

        let result = runner.run(&ctx()).await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(inner.invocations(), 3);
    }

    #[tokio::test]
    async fn test_runner_gives_up_when_exhausted() {
        let inner = Arc::new(ScriptedRunner::new("extract").then_results([
            StageResult::infrastructure_failure("extract", "refused"),
            StageResult::infrastructure_failure("extract", "refused"),
        ]));
        let runner = RetryingRunner::new(inner.clone(), fast(2));

        let result = runner.run(&ctx()).await;
        assert_eq!(result.failure_kind, Some(FailureKind::Infrastructure));
        assert_eq!(result.attempts, 2);
        assert_eq!(inner.invocations(), 2);
    }

    #[tokio::test]
    async fn test_gate_does_not_retry_validation_failure() {
        let inner = Arc::new(ScriptedGate::failing("gate", ["row_count_min"]));
        let gate = RetryingGate::new(inner.clone(), fast(5));

        let result = gate.evaluate(&ctx(), "cp").await;
        assert_eq!(result.failure_kind, Some(FailureKind::Validation));
        assert_eq!(result.attempts, 1);
        assert_eq!(inner.invocations(), 1);
    }
}
