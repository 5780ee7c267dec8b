use serde::{Deserialize, Serialize};

use crate::db_types::{FailureReason, MicroUsd, Transaction};

/// The result of reconciling one payment reference against the gateway's ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// This call credited the wallet.
    Credited { transaction: Transaction, balance: MicroUsd },
    /// The payment had already been credited. Nothing changed.
    AlreadyProcessed { transaction: Transaction },
    /// The gateway has not settled the payment yet. Nothing changed; try again later.
    Pending,
    /// The gateway reports a terminal failure. The transaction, if any, is marked failed.
    Failed { reason: FailureReason, transaction: Option<Transaction> },
}

impl ReconciliationOutcome {
    pub fn already_processed(&self) -> bool {
        matches!(self, ReconciliationOutcome::AlreadyProcessed { .. })
    }

    pub fn is_credited(&self) -> bool {
        matches!(self, ReconciliationOutcome::Credited { .. } | ReconciliationOutcome::AlreadyProcessed { .. })
    }

    /// One of the fixed customer-facing explanations.
    pub fn user_message(&self) -> &'static str {
        match self {
            ReconciliationOutcome::Credited { .. } | ReconciliationOutcome::AlreadyProcessed { .. } => {
                "Payment confirmed."
            },
            ReconciliationOutcome::Pending => "Payment not yet confirmed.",
            ReconciliationOutcome::Failed { reason, .. } => reason.user_message(),
        }
    }
}

/// Tally of one pass of the pending-deposit poller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSummary {
    pub checked: usize,
    pub credited: usize,
    pub failed: usize,
    pub expired: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// A freshly opened deposit: the pending transaction and where to send the customer to pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositInitiation {
    pub transaction: Transaction,
    pub reference: String,
    pub checkout_url: String,
}
