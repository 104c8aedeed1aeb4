pub mod pegin_status;
pub mod pegout_status;
pub mod sync_status;

use serde::Serialize;

/// Status of an inbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "pegin_status_kind")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeginStatus {
    Locked,
    RejectedRefund,
    RejectedNoRefund,
}

/// Status of an outbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "pegout_status_kind")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PegoutStatus {
    Received,
    WaitingForConfirmation,
    WaitingForSignature,
    Signed,
    Rejected,
}

impl std::fmt::Display for PegoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PegoutStatus::Received => "RECEIVED",
            PegoutStatus::WaitingForConfirmation => "WAITING_FOR_CONFIRMATION",
            PegoutStatus::WaitingForSignature => "WAITING_FOR_SIGNATURE",
            PegoutStatus::Signed => "SIGNED",
            PegoutStatus::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}
