use std::collections::HashMap;
use std::sync::RwLock;

use herdbook_core::{AggregateId, FarmId};
use herdbook_events::EventEnvelope;
use serde_json::Value as JsonValue;

/// Per-stream high-water marks that make projections idempotent under
/// at-least-once delivery.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<(FarmId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(false)` for a duplicate that must be skipped, `Ok(true)` for the
    /// next event of the stream.
    pub fn is_next(&self, envelope: &EventEnvelope<JsonValue>) -> anyhow::Result<bool> {
        let seq = envelope.sequence_number();
        let last = self
            .inner
            .read()
            .map_err(|_| anyhow::anyhow!("cursor lock poisoned"))?
            .get(&envelope.stream_key())
            .copied()
            .unwrap_or(0);

        if seq == 0 {
            anyhow::bail!("sequence numbers start at 1");
        }
        if seq <= last {
            return Ok(false);
        }
        if last != 0 && seq != last + 1 {
            anyhow::bail!("non-monotonic sequence number (last={last}, found={seq})");
        }
        Ok(true)
    }

    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(envelope.stream_key(), envelope.sequence_number());
        }
    }
}
