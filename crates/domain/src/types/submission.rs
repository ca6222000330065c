//! Submission workflow state persisted on sales documents
//!
//! The original pipeline chained fire-and-forget jobs and left the state
//! implicit in a handful of boolean flags. Here the flags stay (they are
//! what survives a crash) but the phase is an explicit enum derived from
//! them, so resumption logic re-enters the workflow at the correct step
//! instead of restarting from scratch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote-issued compliance identifiers persisted after reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScuData {
    pub receipt_number: Option<String>,
    pub receipt_signature: Option<String>,
    pub internal_data: Option<String>,
    pub qr_code_url: Option<String>,
    pub scu_id: Option<String>,
    pub mrc_number: Option<String>,
    pub invoice_number: Option<String>,
    pub receipt_timestamp: Option<DateTime<Utc>>,
}

/// Per-invoice submission state fields.
///
/// `submitted` flips to true only after the sign step succeeds; the SCU
/// data arrives with the final details fetch. Remote-id assignment doubles
/// as the de-facto lock: a job finding a remote id it did not expect
/// treats its own action as a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionState {
    pub submitted: bool,
    pub remote_id: Option<String>,
    pub transitioned: bool,
    pub signed: bool,
    pub scu: Option<ScuData>,
    /// Number of automatic corrective credit notes issued so far.
    pub revision_count: u32,
    /// Attempts consumed by the periodic sweep.
    pub submission_attempts: u32,
}

/// Workflow phase of a sales document, derived from persisted flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionPhase {
    Draft,
    LinesSaved,
    Transitioned,
    Signed,
    Finalized,
    Aborted,
}

impl SubmissionState {
    /// Derive the current phase from the persisted flags.
    ///
    /// `all_lines_saved` is supplied by the caller because line remote ids
    /// live on the lines, not on this state record.
    #[must_use]
    pub fn phase(&self, all_lines_saved: bool) -> SubmissionPhase {
        if self.scu.is_some() {
            return SubmissionPhase::Finalized;
        }
        if self.signed || self.submitted {
            return SubmissionPhase::Signed;
        }
        if self.transitioned {
            return SubmissionPhase::Transitioned;
        }
        if self.remote_id.is_some() && all_lines_saved {
            return SubmissionPhase::LinesSaved;
        }
        SubmissionPhase::Draft
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_draft() {
        let state = SubmissionState::default();
        assert_eq!(state.phase(false), SubmissionPhase::Draft);
    }

    #[test]
    fn remote_id_without_lines_is_still_draft() {
        let state = SubmissionState { remote_id: Some("inv-42".into()), ..Default::default() };
        assert_eq!(state.phase(false), SubmissionPhase::Draft);
    }

    #[test]
    fn remote_id_with_all_lines_is_lines_saved() {
        let state = SubmissionState { remote_id: Some("inv-42".into()), ..Default::default() };
        assert_eq!(state.phase(true), SubmissionPhase::LinesSaved);
    }

    #[test]
    fn transitioned_flag_wins_over_lines() {
        let state = SubmissionState {
            remote_id: Some("inv-42".into()),
            transitioned: true,
            ..Default::default()
        };
        assert_eq!(state.phase(true), SubmissionPhase::Transitioned);
    }

    #[test]
    fn signed_flag_wins_over_transitioned() {
        let state = SubmissionState {
            remote_id: Some("inv-42".into()),
            transitioned: true,
            signed: true,
            ..Default::default()
        };
        assert_eq!(state.phase(true), SubmissionPhase::Signed);
    }

    #[test]
    fn scu_data_means_finalized() {
        let state = SubmissionState {
            remote_id: Some("inv-42".into()),
            transitioned: true,
            signed: true,
            submitted: true,
            scu: Some(ScuData::default()),
            ..Default::default()
        };
        assert_eq!(state.phase(true), SubmissionPhase::Finalized);
    }
}
