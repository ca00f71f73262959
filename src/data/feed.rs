//! Externally produced signals (news, arbitrage).
//!
//! The engine treats these as opaque: they are validated only for belonging
//! to a game on the slate and for not being detected after `as_of`.

use async_trait::async_trait;

use super::{SignalSource, Slate, UnitOutput, UnitScope, WorkUnit};
use crate::types::{EdgeSignal, EngineError};

pub struct StaticSignalFeed {
    name: String,
    signals: Vec<EdgeSignal>,
}

impl StaticSignalFeed {
    pub fn new(name: impl Into<String>, signals: Vec<EdgeSignal>) -> Self {
        Self {
            name: name.into(),
            signals,
        }
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

#[async_trait]
impl SignalSource for StaticSignalFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn units(&self, _slate: &Slate) -> Vec<WorkUnit> {
        vec![WorkUnit::new(&self.name, "", UnitScope::Feed)]
    }

    async fn produce(&self, _unit: &WorkUnit, slate: &Slate) -> Result<UnitOutput, EngineError> {
        let signals: Vec<EdgeSignal> = self
            .signals
            .iter()
            .filter(|s| slate.game(&s.game_id).is_some() && s.detected_at <= slate.as_of)
            .cloned()
            .collect();
        Ok(signals.into())
    }
}
