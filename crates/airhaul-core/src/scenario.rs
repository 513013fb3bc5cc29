//! Conservative / expected / optimistic duration bounds for a trip.

use crate::config::{ScenarioSettings, ScenarioTier};
use crate::trip::{SegmentDetail, TripSegment};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub conservative_minutes: f64,
    pub expected_minutes: f64,
    pub optimistic_minutes: f64,
    /// Reasoning from the advisory, when it adjusted the bounds.
    pub advisory_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryVerdict {
    pub is_realistic: bool,
    pub adjusted_conservative: Option<f64>,
    pub adjusted_optimistic: Option<f64>,
    pub reasoning: String,
}

#[derive(Error, Debug)]
pub enum AdvisoryError {
    #[error("Advisory unavailable: {0}")]
    Unavailable(String),
    #[error("Advisory timed out after {0:?}")]
    Timeout(Duration),
}

/// Second opinion on computed bounds. Never authoritative.
#[async_trait]
pub trait ScenarioAdvisor: Send + Sync {
    async fn validate(
        &self,
        expected: f64,
        conservative: f64,
        optimistic: f64,
        summary: &str,
    ) -> Result<AdvisoryVerdict, AdvisoryError>;
}

/// Accepts every set of bounds unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdvisor;

#[async_trait]
impl ScenarioAdvisor for NoopAdvisor {
    async fn validate(
        &self,
        _expected: f64,
        _conservative: f64,
        _optimistic: f64,
        _summary: &str,
    ) -> Result<AdvisoryVerdict, AdvisoryError> {
        Ok(AdvisoryVerdict {
            is_realistic: true,
            adjusted_conservative: None,
            adjusted_optimistic: None,
            reasoning: String::new(),
        })
    }
}

/// First tier whose bound covers `value`; the last tier catches the rest.
pub fn tier_for(tiers: &[ScenarioTier], value: f64) -> Option<&ScenarioTier> {
    tiers
        .iter()
        .find(|t| t.up_to.map_or(true, |limit| value <= limit))
        .or_else(|| tiers.last())
}

/// Applies the tiered multipliers to every segment and sums the deltas.
pub fn compute_bounds(segments: &[TripSegment], settings: &ScenarioSettings) -> ScenarioResult {
    let expected: f64 = segments.iter().map(|s| s.minutes).sum();
    let mut conservative_delta = 0.0;
    let mut optimistic_delta = 0.0;

    for segment in segments {
        let tier = match &segment.detail {
            SegmentDetail::Flight { distance_nm, .. } => tier_for(&settings.flight_tiers, *distance_nm),
            SegmentDetail::Ground { .. } => tier_for(&settings.ground_tiers, segment.minutes),
        };
        if let Some(tier) = tier {
            conservative_delta += segment.minutes * (tier.conservative - 1.0);
            optimistic_delta += segment.minutes * (tier.optimistic - 1.0);
        }
    }

    // Misconfigured tiers must not invert the ordering.
    let result = ScenarioResult {
        conservative_minutes: (expected + conservative_delta).max(expected),
        expected_minutes: expected,
        optimistic_minutes: (expected + optimistic_delta).clamp(0.0, expected),
        advisory_note: None,
    };
    debug!(
        "Scenario bounds — conservative={:.1} expected={:.1} optimistic={:.1}",
        result.conservative_minutes, result.expected_minutes, result.optimistic_minutes
    );
    result
}

/// One line per segment, for the advisory.
pub fn segment_summary(segments: &[TripSegment]) -> String {
    segments
        .iter()
        .map(|s| match &s.detail {
            SegmentDetail::Flight { distance_nm, .. } => format!(
                "flight {} -> {}: {:.0} nm, {:.0} min",
                s.from, s.to, distance_nm, s.minutes
            ),
            SegmentDetail::Ground { distance_miles, .. } => format!(
                "ground {} -> {}: {:.1} mi, {:.0} min",
                s.from, s.to, distance_miles, s.minutes
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Consults the advisory under `timeout`. Adjustments are taken only when they
/// keep conservative >= expected >= optimistic; any failure keeps `bounds`.
/// Returns the bounds and whether the advisory answered.
pub async fn review_bounds(
    bounds: ScenarioResult,
    advisor: &dyn ScenarioAdvisor,
    summary: &str,
    timeout: Duration,
) -> (ScenarioResult, bool) {
    let call = advisor.validate(
        bounds.expected_minutes,
        bounds.conservative_minutes,
        bounds.optimistic_minutes,
        summary,
    );
    let verdict = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            warn!("Scenario advisory failed; keeping computed bounds — error={}", e);
            return (bounds, false);
        }
        Err(_) => {
            warn!(
                "Scenario advisory failed; keeping computed bounds — error={}",
                AdvisoryError::Timeout(timeout)
            );
            return (bounds, false);
        }
    };

    if verdict.is_realistic {
        return (bounds, true);
    }

    let conservative = verdict
        .adjusted_conservative
        .unwrap_or(bounds.conservative_minutes);
    let optimistic = verdict
        .adjusted_optimistic
        .unwrap_or(bounds.optimistic_minutes);
    let expected = bounds.expected_minutes;
    let ordered = conservative.is_finite()
        && optimistic.is_finite()
        && conservative >= expected
        && expected >= optimistic
        && optimistic >= 0.0;
    if !ordered {
        warn!(
            "Ignoring advisory adjustment that breaks ordering — conservative={:.1} expected={:.1} optimistic={:.1}",
            conservative, expected, optimistic
        );
        return (bounds, true);
    }

    info!(
        "Scenario bounds adjusted by advisory — conservative={:.1} optimistic={:.1}",
        conservative, optimistic
    );
    (
        ScenarioResult {
            conservative_minutes: conservative,
            expected_minutes: expected,
            optimistic_minutes: optimistic,
            advisory_note: Some(verdict.reasoning),
        },
        true,
    )
}
