use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

use crate::store::{KeyValueStore, get_one, set_one};

pub const VISION_MONTHLY_LIMIT: u32 = 200;
pub const VISION_API_KEY_STORAGE_KEY: &str = "googleVisionApiKey";
pub const VISION_API_KEY_ENV: &str = "GOOGLE_VISION_API_KEY";
const VISION_COUNT_PREFIX: &str = "vision_usage_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A call may be made; `used` already includes it.
    Reserved { used: u32 },
    Exhausted { used: u32 },
}

/// Monthly escalation quota backed by the key/value store.
///
/// Each reservation is a single atomic read-modify-write on the store, so
/// gates sharing a store never lose or double an increment. The count is
/// bumped before the call is made, so a failed call still consumes quota.
pub struct UsageGate {
    store: Arc<dyn KeyValueStore>,
    limit: u32,
}

impl UsageGate {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_limit(store, VISION_MONTHLY_LIMIT)
    }

    pub fn with_limit(store: Arc<dyn KeyValueStore>, limit: u32) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn used(&self, year_month: &str) -> Result<u32> {
        read_usage(self.store.as_ref(), year_month)
    }

    pub fn try_reserve(&self, year_month: &str) -> Result<Reservation> {
        let limit = self.limit;
        let mut reservation = Reservation::Exhausted { used: limit };
        self.store
            .update(&usage_key(year_month), &mut |current| {
                let used = count_of(current);
                if used >= limit {
                    reservation = Reservation::Exhausted { used };
                    return None;
                }
                reservation = Reservation::Reserved { used: used + 1 };
                Some(json!(used + 1))
            })?;
        if let Reservation::Reserved { used } = reservation {
            debug!("reserved vision call {}/{} for {}", used, limit, year_month);
        }
        Ok(reservation)
    }
}

pub fn read_usage(store: &dyn KeyValueStore, year_month: &str) -> Result<u32> {
    read_count(store, &usage_key(year_month))
}

pub fn usage_key(year_month: &str) -> String {
    format!("{}{}", VISION_COUNT_PREFIX, year_month)
}

/// Local `YYYY-MM`, falling back to UTC when the offset is unavailable.
pub fn current_year_month() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format!("{:04}-{:02}", now.year(), u8::from(now.month()))
}

fn read_count(store: &dyn KeyValueStore, key: &str) -> Result<u32> {
    Ok(count_of(get_one(store, key)?.as_ref()))
}

fn count_of(value: Option<&Value>) -> u32 {
    let count = match value {
        Some(Value::Number(number)) => number.as_u64().unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    };
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Resolves the Vision credential: explicit override, stored key, then env.
pub fn resolve_credential(
    store: &dyn KeyValueStore,
    override_key: Option<&str>,
) -> Result<Option<String>> {
    if let Some(key) = non_empty(override_key) {
        return Ok(Some(key));
    }
    if let Some(Value::String(stored)) = get_one(store, VISION_API_KEY_STORAGE_KEY)?
        && let Some(key) = non_empty(Some(stored.as_str()))
    {
        return Ok(Some(key));
    }
    Ok(non_empty(std::env::var(VISION_API_KEY_ENV).ok().as_deref()))
}

pub fn stored_credential(store: &dyn KeyValueStore) -> Result<Option<String>> {
    match get_one(store, VISION_API_KEY_STORAGE_KEY)? {
        Some(Value::String(stored)) => Ok(non_empty(Some(stored.as_str()))),
        _ => Ok(None),
    }
}

pub fn save_credential(store: &dyn KeyValueStore, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("API key is empty"));
    }
    set_one(store, VISION_API_KEY_STORAGE_KEY, json!(key))
}

pub fn delete_credential(store: &dyn KeyValueStore) -> Result<()> {
    store.remove(&[VISION_API_KEY_STORAGE_KEY])
}

pub fn mask_credential(key: &str) -> String {
    let chars = key.chars().collect::<Vec<_>>();
    if chars.len() < 10 {
        return "(saved)".to_string();
    }
    let head = chars[..6].iter().collect::<String>();
    let tail = chars[chars.len() - 4..].iter().collect::<String>();
    format!("{}...{}", head, tail)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
