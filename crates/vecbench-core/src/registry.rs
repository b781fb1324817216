//! Ordered scenario catalogue.

use std::collections::BTreeSet;

use crate::error::{HarnessError, Result};
use crate::scenario::Scenario;

/// Scenarios in registration order. Ids are unique and positive.
#[derive(Debug, Default, Clone)]
pub struct ScenarioRegistry {
    scenarios: Vec<Scenario>,
    ids: BTreeSet<u32>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scenario: Scenario) -> Result<()> {
        let id = scenario.id();
        if id == 0 {
            return Err(HarnessError::InvalidScenarioId(id));
        }
        if !self.ids.insert(id) {
            return Err(HarnessError::DuplicateScenario(id));
        }
        self.scenarios.push(scenario);
        Ok(())
    }

    /// Every scenario, in registration order.
    pub fn all(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn by_id(&self, id: u32) -> Result<&Scenario> {
        self.scenarios
            .iter()
            .find(|s| s.id() == id)
            .ok_or(HarnessError::ScenarioNotFound(id))
    }

    /// Scenarios with `lo <= id <= hi`, in registration order. Gaps are
    /// skipped silently.
    pub fn by_range(&self, lo: u32, hi: u32) -> Vec<&Scenario> {
        self.scenarios
            .iter()
            .filter(|s| (lo..=hi).contains(&s.id()))
            .collect()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Category;

    fn scenario(id: u32) -> Scenario {
        Scenario::new(id, format!("scenario {id}"), Category::Common, |_ctx| async {
            Ok(())
        })
    }

    #[test]
    fn preserves_registration_order() {
        let mut registry = ScenarioRegistry::new();
        for id in [3, 1, 2] {
            registry.register(scenario(id)).unwrap();
        }
        let ids: Vec<u32> = registry.all().iter().map(Scenario::id).collect();
        assert_eq!(ids, [3, 1, 2]);
    }

    #[test]
    fn rejects_duplicates_and_zero() {
        let mut registry = ScenarioRegistry::new();
        registry.register(scenario(1)).unwrap();
        assert!(matches!(
            registry.register(scenario(1)),
            Err(HarnessError::DuplicateScenario(1))
        ));
        assert!(matches!(
            registry.register(scenario(0)),
            Err(HarnessError::InvalidScenarioId(0))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn range_is_inclusive_and_skips_gaps() {
        let mut registry = ScenarioRegistry::new();
        for id in [1, 2, 4, 5, 9] {
            registry.register(scenario(id)).unwrap();
        }
        let ids: Vec<u32> = registry.by_range(2, 5).iter().map(|s| s.id()).collect();
        assert_eq!(ids, [2, 4, 5]);
        assert!(matches!(registry.by_id(3), Err(HarnessError::ScenarioNotFound(3))));
    }
}
