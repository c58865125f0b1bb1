// Core matching exports
pub mod admin;
pub mod distance;
pub mod ingestion;
pub mod pairing;
pub mod processor;
pub mod proposal;
pub mod qualifiers;
pub mod scheduler;

pub use admin::MatchAdmin;
pub use distance::{haversine_distance, resolve_radius, RadiusTier};
pub use ingestion::{IngestionError, IngestionOrchestrator};
pub use pairing::{generate_pairs, UserPair};
pub use processor::{MatchProcessor, ProcessError};
pub use proposal::{ProposalError, ProposalMachine};
pub use qualifiers::{Qualifier, QualifierChain, QualifierError};
pub use scheduler::DropScheduler;
