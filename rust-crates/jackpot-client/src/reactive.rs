//! Edge bookkeeping for the registry -> pool -> user stats graph.
//!
//! The tracker never performs I/O. It is fed every state the store publishes
//! and answers with the fetches that state change makes necessary, at most
//! once per actual change of the upstream slice.

use crate::types::{
    Address,
    GameState,
    ObjectId,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reaction {
    /// The registry was replaced and points at this pool.
    FetchPool(ObjectId),
    /// The registry was replaced but carries no pool pointer.
    DiscoverPool,
    FetchUserStats { pool: ObjectId, account: Address },
    /// The account went away while a pool is loaded.
    ClearUserStats,
}

#[derive(Clone, Debug, Default)]
pub struct DependencyTracker {
    pinned_pool: Option<ObjectId>,
    registry_seen: Option<u64>,
    user_stats_key: Option<(u64, Option<Address>)>,
}

impl DependencyTracker {
    /// A pinned pool takes the place of a missing registry pointer.
    pub fn new(pinned_pool: Option<ObjectId>) -> Self {
        Self {
            pinned_pool,
            ..Self::default()
        }
    }

    pub fn observe(&mut self, state: &GameState, account: Option<Address>) -> Vec<Reaction> {
        let mut reactions = Vec::new();

        if let Some(registry) = &state.registry {
            if self.registry_seen != Some(state.registry_revision) {
                self.registry_seen = Some(state.registry_revision);
                match registry.current_pool_id.or(self.pinned_pool) {
                    Some(pool) => reactions.push(Reaction::FetchPool(pool)),
                    None => reactions.push(Reaction::DiscoverPool),
                }
            }
        }

        if let Some(pool) = &state.current_pool {
            let key = (state.pool_revision, account);
            if self.user_stats_key != Some(key) {
                self.user_stats_key = Some(key);
                match account {
                    Some(account) => reactions.push(Reaction::FetchUserStats {
                        pool: pool.id,
                        account,
                    }),
                    None => reactions.push(Reaction::ClearUserStats),
                }
            }
        }

        reactions
    }
}
