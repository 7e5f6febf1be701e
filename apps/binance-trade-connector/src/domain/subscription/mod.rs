//! Pair Subscription Registry
//!
//! Tracks which subscriptions are attached to which trading pair and owns
//! the single upstream feed resource kept open for each pair.
//!
//! # Design
//!
//! The registry tracks:
//! - The set of live subscriptions per pair
//! - One upstream feed per pair, opened by the first subscriber and
//!   released when the last subscriber detaches
//!
//! Membership changes go through the per-entry guard of a concurrent map,
//! so unrelated pairs never contend. Opening a feed is slow and
//! asynchronous; callers serialize it per pair with [`PairRegistry::pair_lock`]
//! so two first-subscribers cannot both open a feed for the same pair.
//! The trade delivery path never touches the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::domain::trade::TradingPair;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a pair subscription.
pub type SubscriptionId = u64;

/// Shared state of one subscription.
///
/// The closed flag is monotonic: once set it is never cleared.
#[derive(Debug)]
pub struct SubscriptionState {
    id: SubscriptionId,
    pair: TradingPair,
    closed: AtomicBool,
}

impl SubscriptionState {
    /// Create an open subscription state.
    #[must_use]
    pub const fn new(id: SubscriptionId, pair: TradingPair) -> Self {
        Self {
            id,
            pair,
            closed: AtomicBool::new(false),
        }
    }

    /// Subscription identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Pair this subscription is attached to.
    #[must_use]
    pub const fn pair(&self) -> &TradingPair {
        &self.pair
    }

    /// Whether the subscription has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the subscription closed.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

/// Upstream feed released from the registry, to be stopped by the caller.
#[derive(Debug)]
pub struct ReleasedFeed<F> {
    /// Pair the feed served.
    pub pair: TradingPair,
    /// The feed resource.
    pub feed: F,
    /// Number of subscriptions still attached when the feed was released.
    pub members: usize,
}

// =============================================================================
// Pair Entry
// =============================================================================

#[derive(Debug)]
struct PairEntry<F> {
    feed: F,
    live: Arc<AtomicBool>,
    members: HashMap<SubscriptionId, Arc<SubscriptionState>>,
}

impl<F> PairEntry<F> {
    fn release(self, pair: TradingPair) -> ReleasedFeed<F> {
        self.live.store(false, Ordering::Release);
        for member in self.members.values() {
            member.mark_closed();
        }
        ReleasedFeed {
            pair,
            feed: self.feed,
            members: self.members.len(),
        }
    }
}

// =============================================================================
// Pair Registry
// =============================================================================

/// Concurrent registry of pair subscriptions and their upstream feeds.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::AtomicBool;
///
/// use binance_trade_connector::domain::subscription::{PairRegistry, SubscriptionState};
/// use binance_trade_connector::domain::trade::TradingPair;
///
/// let registry: PairRegistry<&str> = PairRegistry::new();
/// let pair = TradingPair::new("BTC", "BTCUSDT", "Binance");
///
/// // First subscriber finds no feed and installs one
/// let first = Arc::new(SubscriptionState::new(registry.next_id(), pair.clone()));
/// assert!(!registry.join(&first));
/// registry.install(first.clone(), "feed", Arc::new(AtomicBool::new(true)));
///
/// // Second subscriber shares it
/// let second = Arc::new(SubscriptionState::new(registry.next_id(), pair.clone()));
/// assert!(registry.join(&second));
///
/// // Feed is released only when the last subscriber leaves
/// assert!(registry.leave(&pair, first.id()).is_none());
/// assert_eq!(registry.leave(&pair, second.id()).unwrap().feed, "feed");
/// assert_eq!(registry.pair_count(), 0);
/// ```
#[derive(Debug)]
pub struct PairRegistry<F> {
    entries: DashMap<TradingPair, PairEntry<F>>,
    pair_locks: DashMap<TradingPair, Arc<tokio::sync::Mutex<()>>>,
    next_id: AtomicU64,
}

impl<F> Default for PairRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> PairRegistry<F> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            pair_locks: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a subscription identifier.
    pub fn next_id(&self) -> SubscriptionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Lock serializing feed setup for one pair.
    #[must_use]
    pub fn pair_lock(&self, pair: &TradingPair) -> Arc<tokio::sync::Mutex<()>> {
        let lock = self
            .pair_locks
            .entry(pair.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())));
        Arc::clone(lock.value())
    }

    /// Drop the pair's setup lock once no caller holds a handle to it.
    pub fn prune_lock(&self, pair: &TradingPair) {
        self.pair_locks
            .remove_if(pair, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Attach a subscription to the pair's existing feed.
    ///
    /// Returns `false` when no feed is registered for the pair; the caller
    /// then opens one (holding the pair lock) and calls [`Self::install`].
    pub fn join(&self, state: &Arc<SubscriptionState>) -> bool {
        match self.entries.get_mut(state.pair()) {
            Some(mut entry) => {
                entry.members.insert(state.id(), Arc::clone(state));
                true
            }
            None => false,
        }
    }

    /// Register a freshly opened feed with its first subscription.
    ///
    /// If an entry already exists the subscription joins it and the given
    /// feed is handed back so the caller can stop it.
    pub fn install(
        &self,
        state: Arc<SubscriptionState>,
        feed: F,
        live: Arc<AtomicBool>,
    ) -> Option<F> {
        let pair = state.pair().clone();
        match self.entries.entry(pair) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                occupied.get_mut().members.insert(state.id(), state);
                Some(feed)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let mut members = HashMap::new();
                members.insert(state.id(), state);
                vacant.insert(PairEntry {
                    feed,
                    live,
                    members,
                });
                None
            }
        }
    }

    /// Detach a subscription from its pair.
    ///
    /// Returns the pair's feed when this was the last member; the entry and
    /// its setup lock are removed so nothing is left behind for the pair.
    pub fn leave(&self, pair: &TradingPair, id: SubscriptionId) -> Option<ReleasedFeed<F>> {
        let now_empty = {
            let mut entry = self.entries.get_mut(pair)?;
            entry.members.remove(&id)?;
            entry.members.is_empty()
        };

        if !now_empty {
            return None;
        }

        let released = self
            .entries
            .remove_if(pair, |_, entry| entry.members.is_empty())
            .map(|(pair, entry)| entry.release(pair));

        if released.is_some() {
            self.prune_lock(pair);
        }
        released
    }

    /// Remove every entry, closing all member subscriptions.
    ///
    /// Returns the released feeds for the caller to stop.
    pub fn drain(&self) -> Vec<ReleasedFeed<F>> {
        let pairs: Vec<TradingPair> = self.entries.iter().map(|e| e.key().clone()).collect();

        let released = pairs
            .into_iter()
            .filter_map(|pair| self.entries.remove(&pair))
            .map(|(pair, entry)| entry.release(pair))
            .collect();

        self.pair_locks.clear();
        released
    }

    /// Whether a feed is registered for the pair.
    #[must_use]
    pub fn contains(&self, pair: &TradingPair) -> bool {
        self.entries.contains_key(pair)
    }

    /// Identifiers of subscriptions attached to a pair.
    #[must_use]
    pub fn members(&self, pair: &TradingPair) -> Vec<SubscriptionId> {
        self.entries
            .get(pair)
            .map(|e| e.members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of pairs with a registered feed.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of attached subscriptions across all pairs.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.entries.iter().map(|e| e.members.len()).sum()
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.pair_locks.len()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            pair_count: self.pair_count(),
            subscription_count: self.subscription_count(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    /// Pairs with a live upstream feed.
    pub pair_count: usize,
    /// Attached subscriptions.
    pub subscription_count: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(symbol: &str) -> TradingPair {
        TradingPair::new(symbol, format!("{symbol}USDT"), "Binance")
    }

    fn live() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(true))
    }

    fn subscribe(
        registry: &PairRegistry<u32>,
        p: &TradingPair,
        feed: u32,
    ) -> Arc<SubscriptionState> {
        let state = Arc::new(SubscriptionState::new(registry.next_id(), p.clone()));
        if !registry.join(&state) {
            assert!(registry.install(Arc::clone(&state), feed, live()).is_none());
        }
        state
    }

    #[test]
    fn join_without_feed_fails() {
        let registry: PairRegistry<u32> = PairRegistry::new();
        let state = Arc::new(SubscriptionState::new(registry.next_id(), pair("BTC")));

        assert!(!registry.join(&state));
        assert_eq!(registry.pair_count(), 0);
    }

    #[test]
    fn second_subscriber_shares_feed() {
        let registry = PairRegistry::new();
        let btc = pair("BTC");

        subscribe(&registry, &btc, 1);
        subscribe(&registry, &btc, 2);

        assert_eq!(registry.pair_count(), 1);
        assert_eq!(registry.subscription_count(), 2);
        assert_eq!(registry.members(&btc).len(), 2);
    }

    #[test]
    fn install_on_occupied_entry_returns_feed() {
        let registry = PairRegistry::new();
        let btc = pair("BTC");
        subscribe(&registry, &btc, 1);

        let late = Arc::new(SubscriptionState::new(registry.next_id(), btc.clone()));
        let returned = registry.install(late, 9, live());

        assert_eq!(returned, Some(9));
        assert_eq!(registry.subscription_count(), 2);
    }

    #[test]
    fn leave_with_remaining_members_keeps_feed() {
        let registry = PairRegistry::new();
        let btc = pair("BTC");
        let first = subscribe(&registry, &btc, 1);
        subscribe(&registry, &btc, 1);

        assert!(registry.leave(&btc, first.id()).is_none());
        assert!(registry.contains(&btc));
    }

    #[test]
    fn last_leave_releases_feed_and_removes_entry() {
        let registry = PairRegistry::new();
        let btc = pair("BTC");
        let flag = live();
        let state = Arc::new(SubscriptionState::new(registry.next_id(), btc.clone()));
        registry.install(Arc::clone(&state), 7, Arc::clone(&flag));

        let released = registry.leave(&btc, state.id()).unwrap();

        assert_eq!(released.feed, 7);
        assert_eq!(released.members, 0);
        assert!(!registry.contains(&btc));
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn leave_unknown_subscription_no_changes() {
        let registry = PairRegistry::new();
        let btc = pair("BTC");
        subscribe(&registry, &btc, 1);

        assert!(registry.leave(&btc, 999).is_none());
        assert!(registry.leave(&pair("ETH"), 1).is_none());
        assert_eq!(registry.subscription_count(), 1);
    }

    #[test]
    fn drain_closes_members_and_empties_registry() {
        let registry = PairRegistry::new();
        let a = subscribe(&registry, &pair("BTC"), 1);
        let b = subscribe(&registry, &pair("BTC"), 1);
        let c = subscribe(&registry, &pair("ETH"), 2);

        let mut released = registry.drain();
        released.sort_by_key(|r| r.feed);

        assert_eq!(released.len(), 2);
        assert_eq!(released[0].members, 2);
        assert_eq!(released[1].members, 1);
        assert!(a.is_closed() && b.is_closed() && c.is_closed());
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn mark_closed_is_monotonic() {
        let state = SubscriptionState::new(1, pair("BTC"));

        assert!(!state.is_closed());
        assert!(state.mark_closed());
        assert!(!state.mark_closed());
        assert!(state.is_closed());
    }

    #[test]
    fn pair_lock_is_shared_per_pair() {
        let registry: PairRegistry<u32> = PairRegistry::new();

        let a = registry.pair_lock(&pair("BTC"));
        let b = registry.pair_lock(&pair("BTC"));
        let c = registry.pair_lock(&pair("ETH"));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn last_leave_drops_idle_pair_lock() {
        let registry = PairRegistry::new();
        let btc = pair("BTC");
        let lock = registry.pair_lock(&btc);
        let state = subscribe(&registry, &btc, 1);
        drop(lock);

        assert_eq!(registry.lock_count(), 1);
        assert!(registry.leave(&btc, state.id()).is_some());
        assert_eq!(registry.lock_count(), 0);
    }

    #[test]
    fn held_pair_lock_survives_leave() {
        let registry = PairRegistry::new();
        let btc = pair("BTC");
        let lock = registry.pair_lock(&btc);
        let state = subscribe(&registry, &btc, 1);

        assert!(registry.leave(&btc, state.id()).is_some());

        assert_eq!(registry.lock_count(), 1);
        assert!(Arc::ptr_eq(&lock, &registry.pair_lock(&btc)));
    }

    #[test]
    fn pair_locks_do_not_accumulate() {
        let registry = PairRegistry::new();

        for i in 0..50u32 {
            let p = pair(&format!("SYM{i}"));
            let lock = registry.pair_lock(&p);
            let state = subscribe(&registry, &p, i);
            drop(lock);
            assert!(registry.leave(&p, state.id()).is_some());
        }

        assert_eq!(registry.lock_count(), 0);
        assert_eq!(registry.pair_count(), 0);
    }

    #[test]
    fn ids_are_unique() {
        let registry: PairRegistry<u32> = PairRegistry::new();
        let ids: std::collections::HashSet<_> = (0..100).map(|_| registry.next_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn thread_safety_concurrent_join_and_leave() {
        use std::thread;

        let registry = Arc::new(PairRegistry::new());
        let shared = pair("SHARED");
        let anchor = subscribe(&registry, &shared, 0);

        let mut handles = vec![];
        for i in 0..10u32 {
            let r = Arc::clone(&registry);
            let p = shared.clone();
            handles.push(thread::spawn(move || {
                let own = pair(&format!("SYM{i}"));
                let s1 = subscribe(&r, &own, i);
                let s2 = subscribe(&r, &p, 0);
                assert!(r.leave(&p, s2.id()).is_none());
                s1
            }));
        }

        let states: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // 10 own pairs + the shared one, still anchored
        assert_eq!(registry.pair_count(), 11);
        assert_eq!(registry.members(&shared), vec![anchor.id()]);

        for state in &states {
            assert!(registry.leave(state.pair(), state.id()).is_some());
        }
        assert!(registry.leave(&shared, anchor.id()).is_some());
        assert_eq!(registry.pair_count(), 0);
    }
}
