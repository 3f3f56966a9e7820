use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value as JsonValue;

use tokoledger_core::{AggregateId, TenantId};
use tokoledger_events::EventEnvelope;

use super::ProjectionError;

/// Last applied sequence number per `(tenant, aggregate)` stream.
///
/// Makes a projection idempotent under at-least-once delivery: envelopes at
/// or below the cursor are skipped, a gap is an error.
#[derive(Debug, Default)]
pub struct StreamCursors {
    positions: Mutex<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `apply` if `envelope` is the next event of its stream.
    ///
    /// The cursor lock is held while `apply` runs, so one projection applies
    /// envelopes one at a time.
    pub fn apply_once(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        apply: impl FnOnce() -> Result<(), ProjectionError>,
    ) -> Result<(), ProjectionError> {
        let mut positions = self.positions.lock().map_err(|_| ProjectionError::Poisoned)?;
        let key = (envelope.tenant_id(), envelope.aggregate_id());
        let last = positions.get(&key).copied().unwrap_or(0);
        let found = envelope.sequence_number();

        if found <= last {
            return Ok(());
        }
        if found != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }

        apply()?;
        positions.insert(key, found);
        Ok(())
    }

    pub fn position(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.positions
            .lock()
            .ok()
            .and_then(|p| p.get(&(tenant_id, aggregate_id)).copied())
            .unwrap_or(0)
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut positions) = self.positions.lock() {
            positions.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn env(t: TenantId, a: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), t, a, "test", seq, json!({}))
    }

    #[test]
    fn replays_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        let mut applied = 0;

        cursors.apply_once(&env(t, a, 1), || { applied += 1; Ok(()) }).unwrap();
        cursors.apply_once(&env(t, a, 1), || { applied += 1; Ok(()) }).unwrap();
        assert_eq!(applied, 1);

        let err = cursors.apply_once(&env(t, a, 3), || Ok(())).unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { last: 1, found: 3 }));
        assert_eq!(cursors.position(t, a), 1);
    }

    #[test]
    fn failed_apply_does_not_advance() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        let _ = cursors.apply_once(&env(t, a, 1), || Err(ProjectionError::Poisoned));
        assert_eq!(cursors.position(t, a), 0);
    }
}
