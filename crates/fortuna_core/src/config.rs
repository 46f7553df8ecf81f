#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::env;

use fortuna_contracts::account::UserId;
use fortuna_contracts::prize::UserTier;

pub const DEFAULT_SPIN_PRICE: u64 = 1;

/// Runtime configuration of the allocation service. Loaded once at process
/// startup; handlers only ever read it.
#[derive(Debug, Clone)]
pub struct FortunaConfig {
    pub bot_token: String,
    pub operator_chat_id: String,
    /// Price of one spin in platform currency units.
    pub spin_price: u64,
    /// Empty secret disables the admin override surface.
    pub admin_secret: String,
    pub privileged_ids: BTreeSet<String>,
}

impl FortunaConfig {
    pub fn from_env() -> Result<Self, String> {
        let bot_token = env::var("FORTUNA_BOT_TOKEN")
            .map_err(|_| "FORTUNA_BOT_TOKEN must be set".to_string())?;
        let operator_chat_id = env::var("FORTUNA_OPERATOR_CHAT_ID")
            .map_err(|_| "FORTUNA_OPERATOR_CHAT_ID must be set".to_string())?;
        let directive =
            parse_admin_directive(&env::var("FORTUNA_ADMIN_DIRECTIVE").unwrap_or_default());
        Ok(Self {
            bot_token,
            operator_chat_id,
            spin_price: parse_spin_price_from_env(),
            admin_secret: directive.admin_secret,
            privileged_ids: directive.privileged_ids,
        })
    }

    pub fn tier_for(&self, user_id: &UserId) -> UserTier {
        if self.privileged_ids.contains(user_id.as_str()) {
            UserTier::Privileged
        } else {
            UserTier::Standard
        }
    }

    pub fn admin_secret_matches(&self, presented: &str) -> bool {
        !self.admin_secret.is_empty() && presented == self.admin_secret
    }
}

fn parse_spin_price_from_env() -> u64 {
    env::var("FORTUNA_SPIN_PRICE")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_SPIN_PRICE)
}

/// Parsed `FORTUNA_ADMIN_DIRECTIVE` value. Accepted formats:
/// `SECRET=xxx;VIP=1,2,3`, `VIP=1,2,3`, a bare id list `1,2 3`, or a bare
/// secret string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdminDirective {
    pub admin_secret: String,
    pub privileged_ids: BTreeSet<String>,
}

pub fn parse_admin_directive(raw: &str) -> AdminDirective {
    let raw = raw.trim();
    let mut directive = AdminDirective::default();
    let mut saw_vip_key = false;
    let mut saw_secret_key = false;

    for segment in raw.split(';') {
        let segment = segment.trim();
        if let Some(ids) = strip_key(segment, "VIP=") {
            saw_vip_key = true;
            directive
                .privileged_ids
                .extend(split_id_list(ids).map(str::to_string));
        } else if let Some(secret) = strip_key(segment, "SECRET=") {
            saw_secret_key = true;
            directive.admin_secret = secret.trim().to_string();
        }
    }

    if !saw_vip_key && looks_like_bare_id_list(raw) {
        directive
            .privileged_ids
            .extend(split_id_list(raw).map(str::to_string));
        return directive;
    }

    if !saw_secret_key
        && !saw_vip_key
        && directive.privileged_ids.is_empty()
        && !raw.is_empty()
    {
        directive.admin_secret = raw.to_string();
    }
    directive
}

fn strip_key<'a>(segment: &'a str, key: &str) -> Option<&'a str> {
    if segment.len() >= key.len()
        && segment.is_char_boundary(key.len())
        && segment[..key.len()].eq_ignore_ascii_case(key)
    {
        Some(&segment[key.len()..])
    } else {
        None
    }
}

fn split_id_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split([',', ' ']).map(str::trim).filter(|s| !s.is_empty())
}

fn looks_like_bare_id_list(raw: &str) -> bool {
    !raw.is_empty()
        && raw.chars().any(|c| c.is_ascii_digit())
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || c == ',' || c == ' ')
}
