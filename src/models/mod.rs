// Model exports
pub mod domain;
pub mod report;
pub mod requests;
pub mod responses;

pub use domain::{
    DateInstance, DateInstanceLog, Gender, IngestSource, LifecycleStatus, MatchConfig, MatchForUser,
    MatchResult, MatchSet, Profile, User, UserAction, DEFAULT_MATCH_EXPIRATION_HOURS,
};
pub use report::{CompatibilityReport, CompatibilityResult, QualifierEntry, QualifierFailure, QualifierReport};
pub use requests::{ConfigFilter, IngestOptions, MatchResultFilter, Page, UserFilter};
pub use responses::{BatchSummary, DropSummary, PairOutcome, ProposalOutcome};
