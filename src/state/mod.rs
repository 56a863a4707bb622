pub mod scheduler_state;
pub mod store;

pub use scheduler_state::{CompetitionSchedule, SchedulerState, WatchKey};
pub use store::{MatchFilter, MemoryStore, MetadataStore, StoreError};
