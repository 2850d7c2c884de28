//! Load state for the marketplace and owned-items views.
//!
//! A load that finishes after a newer load has started is discarded, so a
//! slow early response never overwrites fresher data.

use serde::Serialize;
use wastemarket_types::MarketListing;

use crate::query::Listings;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded { listings: Listings },
}

/// Handed out by [`ViewModel::begin`]; only the latest ticket may complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Debug)]
pub struct ViewModel {
    state: LoadState,
    generation: u64,
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewModel {
    pub fn new() -> Self {
        Self {
            state: LoadState::NotLoaded,
            generation: 0,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn items(&self) -> &[MarketListing] {
        match &self.state {
            LoadState::Loaded { listings } => &listings.items,
            _ => &[],
        }
    }

    pub fn begin(&mut self) -> LoadTicket {
        self.generation += 1;
        self.state = LoadState::Loading;
        LoadTicket(self.generation)
    }

    /// Returns `false` if the ticket is stale and the result was dropped.
    pub fn complete(&mut self, ticket: LoadTicket, listings: Listings) -> bool {
        if ticket.0 != self.generation {
            return false;
        }
        self.state = LoadState::Loaded { listings };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::LoadReport;
    use wastemarket_types::placeholder_listings;

    fn listings(items: Vec<MarketListing>) -> Listings {
        Listings {
            items,
            report: LoadReport::default(),
        }
    }

    #[test]
    fn test_starts_not_loaded() {
        let vm = ViewModel::new();
        assert!(matches!(vm.state(), LoadState::NotLoaded));
        assert!(vm.items().is_empty());
    }

    #[test]
    fn test_begin_then_complete() {
        let mut vm = ViewModel::new();
        let ticket = vm.begin();
        assert!(matches!(vm.state(), LoadState::Loading));
        assert!(vm.complete(ticket, listings(placeholder_listings())));
        assert_eq!(vm.items().len(), placeholder_listings().len());
    }

    #[test]
    fn test_stale_completion_is_dropped() {
        let mut vm = ViewModel::new();
        let first = vm.begin();
        let second = vm.begin();
        assert!(vm.complete(second, listings(Vec::new())));
        assert!(!vm.complete(first, listings(placeholder_listings())));
        assert!(vm.items().is_empty());
    }

    #[test]
    fn test_serializes_with_status_tag() {
        let mut vm = ViewModel::new();
        assert_eq!(serde_json::to_value(vm.state()).unwrap()["status"], "notLoaded");
        vm.begin();
        assert_eq!(serde_json::to_value(vm.state()).unwrap()["status"], "loading");
    }
}
