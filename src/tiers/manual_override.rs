//! Tier 0 — Manual Override. Pins the published mode to `inside` at full
//! confidence while the user (or UI, out of scope) has an active override
//! in effect. Evaluated by the engine before the pre-step that updates
//! polygon occupancy — "no other tier runs" per spec.md §4.5.

use chrono::{DateTime, Utc};

use crate::types::{ClassificationResult, ManualOverride, Mode, SignalSource, TierOutcome};

pub fn evaluate(over: Option<&ManualOverride>, now: DateTime<Utc>) -> TierOutcome {
    over
        .filter(|o| o.is_active(now))
        .map(|_| ClassificationResult::new(Mode::Inside, 1.0, SignalSource::ManualOverride))
}
