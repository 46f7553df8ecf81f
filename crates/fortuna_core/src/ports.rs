#![forbid(unsafe_code)]

use fortuna_contracts::inventory::InventoryEntryRecord;
use fortuna_contracts::ledger::TokenId;
use fortuna_engines::notify::MessagingCallError;

/// Outbound messaging seam of the coordinator. Implementations talk to the
/// payment/messaging platform; the coordinator only ever calls them after
/// the relevant transaction committed.
pub trait MessagingPort {
    /// Asks the platform for a payment link bound to `token_id`; returns
    /// the invoice URL.
    fn create_invoice_link(
        &self,
        token_id: &TokenId,
        amount: u64,
    ) -> Result<String, MessagingCallError>;

    /// Notifies the operator channel that `entry` was claimed by `handle`.
    fn notify_claim_requested(
        &self,
        entry: &InventoryEntryRecord,
        handle: &str,
    ) -> Result<(), MessagingCallError>;
}
