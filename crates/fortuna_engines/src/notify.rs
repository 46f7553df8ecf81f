#![forbid(unsafe_code)]

use std::time::Duration;

use serde_json::{json, Value};

use fortuna_contracts::inventory::{ClaimOutcome, InventoryEntryRecord};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;

/// Stars-denominated invoices carry an empty provider token.
pub const INVOICE_CURRENCY: &str = "XTR";

pub const CALLBACK_CLAIM_APPROVE: &str = "claim_done";
pub const CALLBACK_CLAIM_REJECT: &str = "claim_reject";

#[derive(Debug, Clone, PartialEq)]
pub enum MessagingCallError {
    ConfigInvalid {
        reason: &'static str,
    },
    HttpStatus {
        method: &'static str,
        status: u16,
    },
    Transport {
        method: &'static str,
        detail: String,
    },
    Codec {
        method: &'static str,
    },
    /// The platform answered `ok: false`.
    Rejected {
        method: &'static str,
        description: String,
    },
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub timeout_ms: u32,
}

impl TelegramConfig {
    pub fn bot_api_v1(bot_token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: bot_token.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Thin Bot API client. Callers invoke it strictly after their transaction
/// committed; nothing here touches storage.
pub struct TelegramClient {
    agent: ureq::Agent,
    config: TelegramConfig,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self, MessagingCallError> {
        if config.bot_token.trim().is_empty() {
            return Err(MessagingCallError::ConfigInvalid {
                reason: "bot token must not be empty",
            });
        }
        if config.timeout_ms == 0 {
            return Err(MessagingCallError::ConfigInvalid {
                reason: "timeout must be > 0",
            });
        }
        let timeout = Duration::from_millis(u64::from(config.timeout_ms).max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Ok(Self { agent, config })
    }

    fn call(&self, method: &'static str, payload: &Value) -> Result<Value, MessagingCallError> {
        let url = format!(
            "{}/bot{}/{}",
            self.config.api_base, self.config.bot_token, method
        );
        let response = self
            .agent
            .post(&url)
            .set("Accept", "application/json")
            .send_json(payload.clone())
            .map_err(|err| match err {
                ureq::Error::Status(status, _) => MessagingCallError::HttpStatus { method, status },
                ureq::Error::Transport(transport) => MessagingCallError::Transport {
                    method,
                    detail: transport.to_string(),
                },
            })?;
        let body: Value = serde_json::from_reader(response.into_reader())
            .map_err(|_| MessagingCallError::Codec { method })?;
        unwrap_envelope(method, body)
    }

    /// `createInvoiceLink` for one spin; returns the payment URL.
    pub fn create_invoice_link(
        &self,
        token_id: &str,
        title: &str,
        description: &str,
        price_label: &str,
        amount: u64,
    ) -> Result<String, MessagingCallError> {
        let payload = invoice_link_payload(token_id, title, description, price_label, amount);
        let result = self.call("createInvoiceLink", &payload)?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or(MessagingCallError::Codec {
                method: "createInvoiceLink",
            })
    }

    pub fn answer_pre_checkout(&self, query_id: &str) -> Result<(), MessagingCallError> {
        self.call(
            "answerPreCheckoutQuery",
            &json!({ "pre_checkout_query_id": query_id, "ok": true }),
        )
        .map(|_| ())
    }

    /// Posts the operator claim notification; returns the platform message
    /// id so the resolution path can edit it in place.
    pub fn send_operator_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: &Value,
    ) -> Result<i64, MessagingCallError> {
        let result = self.call(
            "sendMessage",
            &json!({
                "chat_id": chat_id,
                "parse_mode": "HTML",
                "text": text,
                "reply_markup": keyboard,
            }),
        )?;
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or(MessagingCallError::Codec { method: "sendMessage" })
    }

    pub fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), MessagingCallError> {
        self.call(
            "editMessageText",
            &json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "parse_mode": "HTML",
                "text": text,
            }),
        )
        .map(|_| ())
    }

    pub fn answer_callback(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), MessagingCallError> {
        self.call(
            "answerCallbackQuery",
            &json!({
                "callback_query_id": callback_query_id,
                "text": text,
                "show_alert": false,
            }),
        )
        .map(|_| ())
    }
}

fn unwrap_envelope(method: &'static str, body: Value) -> Result<Value, MessagingCallError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body.get("result").cloned().unwrap_or(Value::Null));
    }
    let description = body
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("platform error")
        .to_string();
    Err(MessagingCallError::Rejected {
        method,
        description,
    })
}

pub fn invoice_link_payload(
    token_id: &str,
    title: &str,
    description: &str,
    price_label: &str,
    amount: u64,
) -> Value {
    json!({
        "title": title,
        "description": description,
        "payload": token_id,
        // Empty provider token selects the Stars flow.
        "provider_token": "",
        "currency": INVOICE_CURRENCY,
        "prices": [{ "label": price_label, "amount": amount }],
    })
}

/// Inline approve/reject keyboard under the operator notification.
pub fn operator_keyboard(user_id: &str, entry_id: &str) -> Value {
    json!({
        "inline_keyboard": [[
            {
                "text": "✅ Delivered",
                "callback_data": format!("{CALLBACK_CLAIM_APPROVE}:{user_id}:{entry_id}"),
            },
            {
                "text": "❌ Rejected",
                "callback_data": format!("{CALLBACK_CLAIM_REJECT}:{user_id}:{entry_id}"),
            },
        ]],
    })
}

/// Parsed operator button press. Inverse of [`operator_keyboard`].
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackDirective {
    pub outcome: ClaimOutcome,
    pub user_id: String,
    pub entry_id: String,
}

pub fn parse_callback_directive(data: &str) -> Option<CallbackDirective> {
    let mut parts = data.splitn(3, ':');
    let action = parts.next()?;
    let user_id = parts.next()?;
    let entry_id = parts.next()?;
    if user_id.is_empty() || entry_id.is_empty() {
        return None;
    }
    let outcome = match action {
        CALLBACK_CLAIM_APPROVE => ClaimOutcome::Approved,
        CALLBACK_CLAIM_REJECT => ClaimOutcome::Rejected,
        _ => return None,
    };
    Some(CallbackDirective {
        outcome,
        user_id: user_id.to_string(),
        entry_id: entry_id.to_string(),
    })
}

pub fn claim_requested_text(entry: &InventoryEntryRecord, handle: &str) -> String {
    format!(
        "📤 <b>Claim request</b>\n\n👤 @{handle}\n🆔 <code>{user}</code>\n\n🎁 <b>{prize}</b>\n🔑 <code>{entry_id}</code>\n\n⏳ <b>Pending</b>",
        user = entry.user_id.as_str(),
        prize = entry.prize_name,
        entry_id = entry.entry_id.as_str(),
    )
}

pub fn claim_resolved_text(entry: &InventoryEntryRecord, outcome: ClaimOutcome) -> String {
    let verdict = match outcome {
        ClaimOutcome::Approved => "✅ <b>DELIVERED</b>",
        ClaimOutcome::Rejected => "❌ <b>REJECTED</b>",
    };
    format!(
        "📤 <b>Claim request</b>\n\n👤 @{handle}\n🆔 <code>{user}</code>\n\n🎁 <b>{prize}</b>\n\n{verdict}\n🔑 <code>{entry_id}</code>",
        handle = entry.claim_handle.as_deref().unwrap_or(""),
        user = entry.user_id.as_str(),
        prize = entry.prize_name,
        entry_id = entry.entry_id.as_str(),
    )
}
