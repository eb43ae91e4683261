//! Serializes dynamic-symbol discovery across the fleet: at most one bot
//! searches at a time, and a bot that opens a position hands the search
//! baton to the next queued bot within its own tick.
//!
//! New coordination logic for this fleet (no direct teacher analog); built
//! in the actor/registry idiom the rest of the orchestrator uses — a single
//! `tokio::sync::Mutex`-guarded state struct rather than a full actor, since
//! every operation here is a short, non-blocking state transition.

use std::collections::{HashSet, VecDeque};

use tokio::sync::Mutex;

#[derive(Debug, Default, Clone)]
struct CoordinatorState {
    current_searcher: Option<String>,
    waiting_queue: VecDeque<String>,
    bots_with_symbol: HashSet<String>,
    claimed_symbols: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSnapshot {
    pub current_searcher: Option<String>,
    pub waiting_queue: Vec<String>,
    pub bots_with_symbol: Vec<String>,
    pub claimed_symbols: Vec<String>,
}

pub struct FleetCoordinator {
    state: Mutex<CoordinatorState>,
}

impl FleetCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(CoordinatorState::default()) }
    }

    /// Seeds `bots_with_symbol` from persisted open positions, so a restart
    /// doesn't grant search permission to a bot that already owns a symbol.
    pub async fn restore(&self, bot_ids_with_open_positions: impl IntoIterator<Item = String>) {
        let mut state = self.state.lock().await;
        state.bots_with_symbol.extend(bot_ids_with_open_positions);
    }

    /// Requests permission to search the universe for a new symbol.
    pub async fn request_search(&self, bot_id: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.bots_with_symbol.contains(bot_id) {
            return false;
        }
        match &state.current_searcher {
            None => {
                state.current_searcher = Some(bot_id.to_string());
                true
            }
            Some(current) if current == bot_id => true,
            Some(_) => {
                if !state.waiting_queue.iter().any(|q| q == bot_id) {
                    state.waiting_queue.push_back(bot_id.to_string());
                }
                false
            }
        }
    }

    /// Ends the current search, optionally claiming a symbol and marking the
    /// bot as holding one, then promotes the next queued bot (if any).
    ///
    /// Returns the bot_id promoted to current searcher, if the queue was
    /// non-empty. A call from a bot that isn't the current searcher is a
    /// no-op and returns `None`.
    pub async fn finish_search(
        &self,
        bot_id: &str,
        found_symbol: Option<&str>,
        has_symbol_now: bool,
    ) -> Option<String> {
        let mut state = self.state.lock().await;
        if state.current_searcher.as_deref() != Some(bot_id) {
            return None;
        }
        state.current_searcher = None;

        if let Some(symbol) = found_symbol {
            state.claimed_symbols.insert(symbol.to_string());
        }
        if has_symbol_now {
            state.bots_with_symbol.insert(bot_id.to_string());
        }

        let next = state.waiting_queue.pop_front();
        state.current_searcher = next.clone();
        next
    }

    pub async fn mark_has_symbol(&self, bot_id: &str) {
        let mut state = self.state.lock().await;
        state.bots_with_symbol.insert(bot_id.to_string());
        state.waiting_queue.retain(|q| q != bot_id);
    }

    pub async fn mark_lost_symbol(&self, bot_id: &str) {
        let mut state = self.state.lock().await;
        state.bots_with_symbol.remove(bot_id);
    }

    pub async fn is_symbol_available(&self, symbol: &str) -> bool {
        let state = self.state.lock().await;
        !state.claimed_symbols.contains(symbol)
    }

    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        let state = self.state.lock().await;
        CoordinatorSnapshot {
            current_searcher: state.current_searcher.clone(),
            waiting_queue: state.waiting_queue.iter().cloned().collect(),
            bots_with_symbol: state.bots_with_symbol.iter().cloned().collect(),
            claimed_symbols: state.claimed_symbols.iter().cloned().collect(),
        }
    }
}

impl Default for FleetCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_requester_becomes_searcher() {
        let coordinator = FleetCoordinator::new();
        assert!(coordinator.request_search("bot-a").await);
    }

    #[tokio::test]
    async fn second_requester_is_queued_not_granted() {
        let coordinator = FleetCoordinator::new();
        assert!(coordinator.request_search("bot-a").await);
        assert!(!coordinator.request_search("bot-b").await);

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.current_searcher.as_deref(), Some("bot-a"));
        assert_eq!(snapshot.waiting_queue, vec!["bot-b".to_string()]);
    }

    #[tokio::test]
    async fn bot_holding_a_symbol_cannot_search_again() {
        let coordinator = FleetCoordinator::new();
        coordinator.mark_has_symbol("bot-a").await;
        assert!(!coordinator.request_search("bot-a").await);
    }

    #[tokio::test]
    async fn finish_search_promotes_queue_head() {
        let coordinator = FleetCoordinator::new();
        coordinator.request_search("bot-a").await;
        coordinator.request_search("bot-b").await;
        coordinator.request_search("bot-c").await;

        let next = coordinator.finish_search("bot-a", Some("BTCUSDT"), true).await;
        assert_eq!(next.as_deref(), Some("bot-b"));

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.current_searcher.as_deref(), Some("bot-b"));
        assert_eq!(snapshot.waiting_queue, vec!["bot-c".to_string()]);
        assert!(snapshot.bots_with_symbol.contains(&"bot-a".to_string()));
        assert!(snapshot.claimed_symbols.contains(&"BTCUSDT".to_string()));
    }

    #[tokio::test]
    async fn finish_search_from_non_searcher_is_noop() {
        let coordinator = FleetCoordinator::new();
        coordinator.request_search("bot-a").await;
        let next = coordinator.finish_search("bot-b", None, false).await;
        assert_eq!(next, None);

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.current_searcher.as_deref(), Some("bot-a"));
    }

    #[tokio::test]
    async fn claimed_symbol_is_unavailable() {
        let coordinator = FleetCoordinator::new();
        coordinator.request_search("bot-a").await;
        coordinator.finish_search("bot-a", Some("BTCUSDT"), true).await;
        assert!(!coordinator.is_symbol_available("BTCUSDT").await);
        assert!(coordinator.is_symbol_available("ETHUSDT").await);
    }

    #[tokio::test]
    async fn mark_lost_symbol_allows_searching_again() {
        let coordinator = FleetCoordinator::new();
        coordinator.mark_has_symbol("bot-a").await;
        coordinator.mark_lost_symbol("bot-a").await;
        assert!(coordinator.request_search("bot-a").await);
    }

    #[tokio::test]
    async fn restore_seeds_bots_with_symbol() {
        let coordinator = FleetCoordinator::new();
        coordinator.restore(vec!["bot-a".to_string()]).await;
        assert!(!coordinator.request_search("bot-a").await);
    }
}
