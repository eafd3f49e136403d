//! Device routing: state tracking and serialized mixer commits.
//!
//! ```text
//! route request -> RoutingState -> MixerUpdate -> Commit Engine worker -> mixer
//!                      |                                   |
//!                 active triple                     last-committed triple
//!               (optimistic, RwLock)                 (confirmed, worker)
//! ```
//!
//! - **RoutingState**: last-writer-wins active triple per direction
//! - **MixerCommitEngine**: single worker serializing control writes,
//!   coalescing stale requests, bounding commit latency

mod commit;
mod state;

pub use commit::{
    CommitOutcome, CommitToken, MixerCommitEngine, MixerUpdate, MIXER_COMMIT_TIMEOUT,
};
pub use state::RoutingState;
