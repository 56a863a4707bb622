pub mod poller;

pub use poller::{LiveMatchState, MatchPoller, MatchTarget, PollerConfig, PollerHandle};
