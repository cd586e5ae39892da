//! Tier 1 — Floor. Floor-level data is emitted only inside multi-story
//! buildings, so its presence is near-definitive; its recent absence still
//! carries decaying evidence for a few tens of seconds after the user
//! likely stepped back outside.

use chrono::Duration;

use super::TierContext;
use crate::types::{ClassificationResult, Mode, SignalSource, TierOutcome};

pub fn evaluate(ctx: &TierContext<'_>) -> TierOutcome {
    if ctx.fix.floor_level.is_some() {
        return Some(ClassificationResult::new(Mode::Inside, 0.98, SignalSource::Floor));
    }

    let now = ctx.now();
    if ctx
        .history
        .floor_detection_recent(now, Duration::seconds(ctx.cfg.floor_recent_short_seconds))
    {
        return Some(ClassificationResult::new(Mode::Outside, 0.90, SignalSource::Floor));
    }
    if ctx
        .history
        .floor_detection_recent(now, Duration::seconds(ctx.cfg.floor_recent_long_seconds))
    {
        return Some(ClassificationResult::new(Mode::Outside, 0.75, SignalSource::Floor));
    }
    None
}
