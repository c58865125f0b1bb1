// Service exports
pub mod cache;
pub mod compatibility;
pub mod memory;
pub mod postgres;
pub mod store;

pub use cache::ConfigCache;
pub use compatibility::{CompatibilityError, CompatibilityScorer, HttpCompatibilityClient, ProfilePair, RetryPolicy};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use store::{
    ConfigStore, MatchResultStore, MatchSetStore, ProfileStore, ProposalStore, ProposalTx, StoreError, UserStore,
};
