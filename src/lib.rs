//! Lume Matchmaker - batch matchmaking engine for the Lume dating app
//!
//! Pairs the active user population into match sets, runs every pair through
//! the hard qualifier chain and the external compatibility classifier,
//! releases approved matches one per user, and handles the propose/pass
//! decisions that turn a mutual match into a date instance.

pub mod clock;
pub mod config;
pub mod core;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use core::{
    DropScheduler, IngestionOrchestrator, MatchAdmin, MatchProcessor, ProposalMachine, QualifierChain,
};
pub use models::{BatchSummary, DropSummary, MatchConfig, MatchResult, MatchSet, ProposalOutcome, User};
