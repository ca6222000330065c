//! Submission workflow state machine
//!
//! `Draft → LinesSaved → Transitioned → Signed → Finalized`, with
//! `Aborted` as the hard-failure terminal. Each transition corresponds to
//! one remote call; steps hand off through the background job queue, and
//! the periodic sweep re-derives the next step from persisted flags so a
//! crash between two states resumes in place instead of restarting.

use taxbridge_domain::{SalesInvoice, SubmissionPhase};

/// One executable step of the sales submission chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStep {
    /// Save the invoice header, then each line (POST new, PATCH known).
    SaveLines,
    /// Transition the saved remote invoice.
    Transition,
    /// Request the cryptographic signature.
    Sign,
    /// Fetch the finalized remote record and reconcile.
    FetchDetails,
}

/// Derive the current phase of an invoice, including line-save progress.
#[must_use]
pub fn derive_phase(invoice: &SalesInvoice) -> SubmissionPhase {
    let all_lines_saved =
        !invoice.items.is_empty() && invoice.items.iter().all(|line| line.remote_id.is_some());
    invoice.submission.phase(all_lines_saved)
}

/// The next step to run for an invoice in the given phase, or `None` when
/// the workflow is complete or aborted.
#[must_use]
pub fn next_step(phase: SubmissionPhase) -> Option<SubmissionStep> {
    match phase {
        SubmissionPhase::Draft => Some(SubmissionStep::SaveLines),
        SubmissionPhase::LinesSaved => Some(SubmissionStep::Transition),
        SubmissionPhase::Transitioned => Some(SubmissionStep::Sign),
        SubmissionPhase::Signed => Some(SubmissionStep::FetchDetails),
        SubmissionPhase::Finalized | SubmissionPhase::Aborted => None,
    }
}

#[cfg(test)]
mod tests {
    use taxbridge_domain::{
        InvoiceLine, InvoiceStatus, ScuData, SubmissionState,
    };

    use super::*;

    fn line_with_remote(remote_id: Option<&str>) -> InvoiceLine {
        InvoiceLine {
            name: "SINV-1-1".into(),
            item_code: "ITM-1".into(),
            item_name: "Widget".into(),
            qty: 1.0,
            base_net_rate: 100.0,
            base_net_amount: 100.0,
            base_amount: 100.0,
            item_tax_template: None,
            tax_amount: 0.0,
            tax_rate: 0.0,
            taxation_code: None,
            remote_id: remote_id.map(String::from),
        }
    }

    fn invoice(lines: Vec<InvoiceLine>, submission: SubmissionState) -> SalesInvoice {
        SalesInvoice {
            name: "SINV-1".into(),
            company: "Acme Ltd".into(),
            customer: "CUST-1".into(),
            customer_name: "Customer".into(),
            conversion_rate: 1.0,
            is_return: false,
            return_against: None,
            base_grand_total: 100.0,
            items: lines,
            taxes: vec![],
            status: InvoiceStatus::Submitted,
            prevent_submission: false,
            submission,
        }
    }

    #[test]
    fn full_chain_of_steps() {
        assert_eq!(next_step(SubmissionPhase::Draft), Some(SubmissionStep::SaveLines));
        assert_eq!(next_step(SubmissionPhase::LinesSaved), Some(SubmissionStep::Transition));
        assert_eq!(next_step(SubmissionPhase::Transitioned), Some(SubmissionStep::Sign));
        assert_eq!(next_step(SubmissionPhase::Signed), Some(SubmissionStep::FetchDetails));
        assert_eq!(next_step(SubmissionPhase::Finalized), None);
        assert_eq!(next_step(SubmissionPhase::Aborted), None);
    }

    #[test]
    fn partially_saved_lines_keep_the_invoice_in_draft() {
        let submission =
            SubmissionState { remote_id: Some("inv-1".into()), ..Default::default() };
        let doc = invoice(
            vec![line_with_remote(Some("line-1")), line_with_remote(None)],
            submission,
        );
        assert_eq!(derive_phase(&doc), SubmissionPhase::Draft);
        assert_eq!(next_step(derive_phase(&doc)), Some(SubmissionStep::SaveLines));
    }

    #[test]
    fn crash_between_transition_and_sign_resumes_at_sign() {
        let submission = SubmissionState {
            remote_id: Some("inv-1".into()),
            transitioned: true,
            ..Default::default()
        };
        let doc = invoice(vec![line_with_remote(Some("line-1"))], submission);
        assert_eq!(next_step(derive_phase(&doc)), Some(SubmissionStep::Sign));
    }

    #[test]
    fn finalized_invoice_has_no_next_step() {
        let submission = SubmissionState {
            remote_id: Some("inv-1".into()),
            transitioned: true,
            signed: true,
            submitted: true,
            scu: Some(ScuData::default()),
            ..Default::default()
        };
        let doc = invoice(vec![line_with_remote(Some("line-1"))], submission);
        assert_eq!(next_step(derive_phase(&doc)), None);
    }
}
