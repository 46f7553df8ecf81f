#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use fortuna_contracts::account::UserId;
use fortuna_contracts::inventory::{ClaimOutcome, EntryId, InventoryEntryRecord};
use fortuna_contracts::ledger::TokenId;
use fortuna_contracts::prize::{OverrideRecord, WeightOverride};
use fortuna_contracts::TimestampNs;
use fortuna_core::coordinator::{
    AllocationCoordinator, AllocationError, INVOICE_DESCRIPTION, INVOICE_PRICE_LABEL,
    INVOICE_TITLE,
};
use fortuna_core::config::FortunaConfig;
use fortuna_core::ports::MessagingPort;
use fortuna_engines::notify::{
    claim_requested_text, claim_resolved_text, operator_keyboard, parse_callback_directive,
    MessagingCallError, TelegramClient, TelegramConfig,
};
use fortuna_storage::store::WheelStore;

/// Outbound surface the adapter needs beyond the coordinator's port:
/// webhook acknowledgements and operator-message edits.
pub trait AdapterMessaging: MessagingPort {
    fn answer_pre_checkout(&self, query_id: &str) -> Result<(), MessagingCallError>;
    fn answer_callback(&self, callback_query_id: &str, text: &str)
        -> Result<(), MessagingCallError>;
    fn edit_operator_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), MessagingCallError>;
}

/// Live Bot API implementation of both messaging surfaces.
pub struct TelegramMessaging {
    client: TelegramClient,
    operator_chat_id: String,
}

impl TelegramMessaging {
    pub fn new(bot_token: &str, operator_chat_id: &str) -> Result<Self, MessagingCallError> {
        Ok(Self {
            client: TelegramClient::new(TelegramConfig::bot_api_v1(bot_token))?,
            operator_chat_id: operator_chat_id.to_string(),
        })
    }
}

impl MessagingPort for TelegramMessaging {
    fn create_invoice_link(
        &self,
        token_id: &TokenId,
        amount: u64,
    ) -> Result<String, MessagingCallError> {
        self.client.create_invoice_link(
            token_id.as_str(),
            INVOICE_TITLE,
            INVOICE_DESCRIPTION,
            INVOICE_PRICE_LABEL,
            amount,
        )
    }

    fn notify_claim_requested(
        &self,
        entry: &InventoryEntryRecord,
        handle: &str,
    ) -> Result<(), MessagingCallError> {
        let text = claim_requested_text(entry, handle);
        let keyboard = operator_keyboard(entry.user_id.as_str(), entry.entry_id.as_str());
        self.client
            .send_operator_message(&self.operator_chat_id, &text, &keyboard)
            .map(|_| ())
    }
}

impl AdapterMessaging for TelegramMessaging {
    fn answer_pre_checkout(&self, query_id: &str) -> Result<(), MessagingCallError> {
        self.client.answer_pre_checkout(query_id)
    }

    fn answer_callback(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), MessagingCallError> {
        self.client.answer_callback(callback_query_id, text)
    }

    fn edit_operator_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), MessagingCallError> {
        self.client.edit_message_text(chat_id, message_id, text)
    }
}

// ------------------------
// Wire DTOs.
// ------------------------

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub spin_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub token_id: String,
    pub invoice_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SpinRequest {
    pub user_id: String,
    pub token_id: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PrizeView {
    pub id: String,
    pub name: String,
    pub entry_id: String,
    pub won_at_ns: u64,
    pub status: String,
    pub claim_handle: Option<String>,
}

impl PrizeView {
    fn from_entry(entry: &InventoryEntryRecord) -> Self {
        Self {
            id: entry.prize_id.as_str().to_string(),
            name: entry.prize_name.clone(),
            entry_id: entry.entry_id.as_str().to_string(),
            won_at_ns: entry.won_at.0,
            status: entry.status.as_str().to_string(),
            claim_handle: entry.claim_handle.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpinResponse {
    pub prize: PrizeView,
    pub segment_index: usize,
    pub replayed: bool,
}

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub inventory: Vec<PrizeView>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub user_id: String,
    pub entry_id: String,
    pub handle: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub success: bool,
    pub notified: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AdminOverrideRequest {
    pub secret: String,
    pub user_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Option<WeightOverride>,
}

#[derive(Debug, Serialize)]
pub struct AdminOverrideResponse {
    pub success: bool,
}

// Messaging-platform update payloads, narrowed to the fields the engine
// consumes.

#[derive(Debug, Default, Deserialize)]
pub struct PlatformUpdate {
    #[serde(default)]
    pub pre_checkout_query: Option<PreCheckoutQuery>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct PreCheckoutQuery {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub successful_payment: Option<SuccessfulPayment>,
}

#[derive(Debug, Deserialize)]
pub struct SuccessfulPayment {
    pub invoice_payload: String,
    #[serde(default)]
    pub total_amount: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<CallbackMessage>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMessage {
    pub message_id: i64,
    pub chat: ChatRef,
}

#[derive(Debug, Deserialize)]
pub struct ChatRef {
    pub id: i64,
}

/// What a webhook delivery amounted to. Surfaced for logging; the HTTP
/// reply is 200 regardless so the platform stops redelivering.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookDisposition {
    PreCheckoutAnswered,
    PaymentRecorded { fresh: bool },
    ClaimResolved { outcome: ClaimOutcome },
    Ignored { reason: &'static str },
}

#[derive(Debug)]
pub enum AdapterError {
    Forbidden,
    Allocation(AllocationError),
}

impl From<AllocationError> for AdapterError {
    fn from(err: AllocationError) -> Self {
        AdapterError::Allocation(err)
    }
}

fn wall_clock_ns() -> TimestampNs {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    TimestampNs(nanos)
}

/// Process-wide runtime behind the HTTP surface: coordinator + store +
/// outbound messaging + snapshot durability. One instance lives behind an
/// `Arc<Mutex<_>>` in the adapter binary.
pub struct AdapterRuntime {
    coordinator: AllocationCoordinator,
    store: WheelStore,
    messaging: Box<dyn AdapterMessaging + Send>,
    snapshot_path: Option<PathBuf>,
}

impl AdapterRuntime {
    pub fn from_env() -> Result<Self, String> {
        let config = FortunaConfig::from_env()?;
        let messaging = TelegramMessaging::new(&config.bot_token, &config.operator_chat_id)
            .map_err(|err| format!("messaging client init failed: {err:?}"))?;
        let snapshot_path = env::var("FORTUNA_SNAPSHOT_PATH").ok().map(PathBuf::from);
        let store = match &snapshot_path {
            Some(path) => WheelStore::load_from_path(path)
                .map_err(|err| format!("snapshot load failed: {err:?}"))?
                .unwrap_or_else(WheelStore::new_in_memory),
            None => WheelStore::new_in_memory(),
        };
        Ok(Self {
            coordinator: AllocationCoordinator::new(config),
            store,
            messaging: Box::new(messaging),
            snapshot_path,
        })
    }

    /// Assembled from parts; tests inject a recording messaging fake.
    pub fn with_parts(
        config: FortunaConfig,
        store: WheelStore,
        messaging: Box<dyn AdapterMessaging + Send>,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        Self {
            coordinator: AllocationCoordinator::new(config),
            store,
            messaging,
            snapshot_path,
        }
    }

    pub fn config_response(&self) -> ConfigResponse {
        ConfigResponse {
            spin_price: self.coordinator.config().spin_price,
        }
    }

    fn persist_after_commit(&self) {
        if let Some(path) = &self.snapshot_path {
            if let Err(err) = self.store.persist_to_path(path) {
                eprintln!("fortuna_adapter snapshot persist failed: {err:?}");
            }
        }
    }

    pub fn issue_invoice(
        &mut self,
        request: &InvoiceRequest,
    ) -> Result<InvoiceResponse, AllocationError> {
        let user_id = UserId::new(request.user_id.clone())?;
        let issued = self.coordinator.issue_payment_link(
            &mut self.store,
            &self.messaging,
            wall_clock_ns(),
            &user_id,
        )?;
        self.persist_after_commit();
        Ok(InvoiceResponse {
            token_id: issued.token_id.as_str().to_string(),
            invoice_url: issued.invoice_url,
        })
    }

    pub fn spin(&mut self, request: &SpinRequest) -> Result<SpinResponse, AllocationError> {
        let user_id = UserId::new(request.user_id.clone())?;
        let token_id = TokenId::new(request.token_id.clone())?;
        let mut rng = rand::thread_rng();
        let outcome = self.coordinator.spin(
            &mut self.store,
            &mut rng,
            wall_clock_ns(),
            &user_id,
            &token_id,
        )?;
        self.persist_after_commit();
        Ok(SpinResponse {
            prize: PrizeView::from_entry(&outcome.entry),
            segment_index: outcome.segment_index,
            replayed: outcome.replayed,
        })
    }

    pub fn inventory(&self, user_id: &str) -> Result<InventoryResponse, AllocationError> {
        let user_id = UserId::new(user_id.to_string())?;
        let inventory = self
            .coordinator
            .list_inventory(&self.store, &user_id)
            .iter()
            .map(PrizeView::from_entry)
            .collect();
        Ok(InventoryResponse { inventory })
    }

    pub fn request_claim(
        &mut self,
        request: &ClaimRequest,
    ) -> Result<ClaimResponse, AllocationError> {
        let user_id = UserId::new(request.user_id.clone())?;
        let entry_id = EntryId::new(request.entry_id.clone())?;
        let outcome = self.coordinator.request_claim(
            &mut self.store,
            &self.messaging,
            wall_clock_ns(),
            &user_id,
            &entry_id,
            &request.handle,
        )?;
        self.persist_after_commit();
        if let Some(err) = &outcome.notify_error {
            eprintln!("fortuna_adapter operator notification failed: {err:?}");
        }
        Ok(ClaimResponse {
            success: true,
            notified: outcome.notify_error.is_none(),
        })
    }

    pub fn admin_set_override(
        &mut self,
        request: &AdminOverrideRequest,
    ) -> Result<AdminOverrideResponse, AdapterError> {
        if !self
            .coordinator
            .config()
            .admin_secret_matches(&request.secret)
        {
            return Err(AdapterError::Forbidden);
        }
        let user_id = UserId::new(request.user_id.clone()).map_err(AllocationError::from)?;
        let config = request
            .config
            .clone()
            .unwrap_or(WeightOverride::NoOverride);
        let record = OverrideRecord::v1(user_id, request.enabled, config)
            .map_err(AllocationError::from)?;
        self.coordinator
            .set_override(&mut self.store, record)
            .map_err(AdapterError::from)?;
        self.persist_after_commit();
        Ok(AdminOverrideResponse { success: true })
    }

    /// Routes one platform update. Every mutating branch commits before any
    /// outbound acknowledgement or edit goes out.
    pub fn handle_webhook(
        &mut self,
        update: &PlatformUpdate,
    ) -> Result<WebhookDisposition, AllocationError> {
        if let Some(query) = &update.pre_checkout_query {
            if let Err(err) = self.messaging.answer_pre_checkout(&query.id) {
                eprintln!("fortuna_adapter pre-checkout answer failed: {err:?}");
            }
            return Ok(WebhookDisposition::PreCheckoutAnswered);
        }

        if let Some(payment) = update
            .message
            .as_ref()
            .and_then(|m| m.successful_payment.as_ref())
        {
            return self.apply_payment_confirmation(payment);
        }

        if let Some(callback) = &update.callback_query {
            return self.apply_operator_callback(callback);
        }

        Ok(WebhookDisposition::Ignored {
            reason: "no actionable update field",
        })
    }

    fn apply_payment_confirmation(
        &mut self,
        payment: &SuccessfulPayment,
    ) -> Result<WebhookDisposition, AllocationError> {
        let Some(user_id) = parse_spin_payload_user(&payment.invoice_payload) else {
            return Ok(WebhookDisposition::Ignored {
                reason: "unrecognized invoice payload",
            });
        };
        let user_id = UserId::new(user_id)?;
        let token_id = TokenId::new(payment.invoice_payload.clone())?;
        let amount = payment
            .total_amount
            .unwrap_or(self.coordinator.config().spin_price);
        let recorded = self.coordinator.record_payment(
            &mut self.store,
            wall_clock_ns(),
            &token_id,
            &user_id,
            amount,
        )?;
        self.persist_after_commit();
        Ok(WebhookDisposition::PaymentRecorded {
            fresh: recorded.fresh,
        })
    }

    fn apply_operator_callback(
        &mut self,
        callback: &CallbackQuery,
    ) -> Result<WebhookDisposition, AllocationError> {
        let Some(directive) = callback
            .data
            .as_deref()
            .and_then(parse_callback_directive)
        else {
            return Ok(WebhookDisposition::Ignored {
                reason: "unrecognized callback data",
            });
        };
        let entry_id = EntryId::new(directive.entry_id.clone())?;

        let resolved = match self.coordinator.resolve_claim(
            &mut self.store,
            wall_clock_ns(),
            &entry_id,
            directive.outcome,
        ) {
            Ok(entry) => entry,
            Err(AllocationError::AlreadyProcessed) => {
                self.answer_callback_quietly(&callback.id, "Already processed");
                return Ok(WebhookDisposition::Ignored {
                    reason: "claim already processed",
                });
            }
            Err(AllocationError::NotFound) => {
                self.answer_callback_quietly(&callback.id, "Prize not found");
                return Ok(WebhookDisposition::Ignored {
                    reason: "unknown entry",
                });
            }
            Err(err) => return Err(err),
        };
        self.persist_after_commit();

        if let Some(message) = &callback.message {
            let text = claim_resolved_text(&resolved, directive.outcome);
            if let Err(err) =
                self.messaging
                    .edit_operator_message(message.chat.id, message.message_id, &text)
            {
                eprintln!("fortuna_adapter operator message edit failed: {err:?}");
            }
        }
        let ack = match directive.outcome {
            ClaimOutcome::Approved => "✅ Delivered",
            ClaimOutcome::Rejected => "❌ Rejected",
        };
        self.answer_callback_quietly(&callback.id, ack);
        Ok(WebhookDisposition::ClaimResolved {
            outcome: directive.outcome,
        })
    }

    fn answer_callback_quietly(&self, callback_id: &str, text: &str) {
        if let Err(err) = self.messaging.answer_callback(callback_id, text) {
            eprintln!("fortuna_adapter callback answer failed: {err:?}");
        }
    }
}

/// `spin:<user_id>:<nonce>` → the user id part.
fn parse_spin_payload_user(payload: &str) -> Option<String> {
    let mut parts = payload.splitn(3, ':');
    if parts.next()? != "spin" {
        return None;
    }
    let user_id = parts.next()?;
    if user_id.is_empty() {
        return None;
    }
    Some(user_id.to_string())
}

impl MessagingPort for Box<dyn AdapterMessaging + Send> {
    fn create_invoice_link(
        &self,
        token_id: &TokenId,
        amount: u64,
    ) -> Result<String, MessagingCallError> {
        (**self).create_invoice_link(token_id, amount)
    }

    fn notify_claim_requested(
        &self,
        entry: &InventoryEntryRecord,
        handle: &str,
    ) -> Result<(), MessagingCallError> {
        (**self).notify_claim_requested(entry, handle)
    }
}
