//! Classification of how expensive a loadable's `load` call is against the
//! remote API, used by the rate limiter to decide which calls need gating.

/// How much API budget a loadable's `load` call is expected to consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RatelimitWeight {
    /// No remote call at all (e.g. a replay already resolved from disk).
    None,
    /// A cheap metadata call (leaderboard/user-best listing).
    Light,
    /// A `get_replay`/`get_replay_by_id` call; gated by the rate limiter.
    Heavy,
}
