use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of `ProposeMatch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalOutcome {
    #[serde(rename = "matchId")]
    pub match_result_id: Uuid,
    #[serde(rename = "mutualProposal")]
    pub mutual_proposal: bool,
    #[serde(rename = "dateInstanceId")]
    pub date_instance_id: Option<Uuid>,
}

/// Per-pair outcome of the match processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PairOutcome {
    Disqualified { failures: Vec<String> },
    Qualified { score: f64 },
}

/// Totals for one `RunIngestionSet` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub match_set_id: Uuid,
    pub total: usize,
    pub qualified: usize,
    pub disqualified: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.qualified + self.disqualified + self.failed
    }
}

/// Result of one `DropOneMatchPerUser` pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropSummary {
    pub candidates: usize,
    pub dropped: Vec<Uuid>,
    pub skipped: usize,
}
