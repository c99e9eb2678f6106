// libs/schedule-cell/src/services/presentation.rs
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::ScheduleError;

/// Keys expire well before any realistic conversation gap; a stale
/// list must never satisfy a later "book number N".
const PRESENTED_SLOTS_TTL_SECONDS: i64 = 900;

/// Per-conversation memory of the slot list a caller was last shown.
/// State lives in Redis keyed by conversation id, never in process
/// memory, so any replica can resolve a positional booking request.
pub struct SlotPresentationCache {
    pool: Pool,
}

impl SlotPresentationCache {
    pub fn new(config: &AppConfig) -> Result<Self, ScheduleError> {
        let redis_url = config
            .redis_url
            .clone()
            .ok_or(ScheduleError::CacheUnavailable)?;

        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ScheduleError::CacheError(format!("Pool creation error: {}", e)))?;

        Ok(Self { pool })
    }

    /// Replaces the remembered list for this conversation with the
    /// ordering just presented.
    pub async fn remember(
        &self,
        conversation_id: Uuid,
        slot_ids: &[Uuid],
    ) -> Result<(), ScheduleError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ScheduleError::CacheError(format!("Connection error: {}", e)))?;

        let key = Self::key(conversation_id);
        let values: Vec<String> = slot_ids.iter().map(|id| id.to_string()).collect();

        let _: () = conn
            .del(&key)
            .await
            .map_err(|e| ScheduleError::CacheError(e.to_string()))?;
        if !values.is_empty() {
            let _: () = conn
                .rpush(&key, &values)
                .await
                .map_err(|e| ScheduleError::CacheError(e.to_string()))?;
            let _: () = conn
                .expire(&key, PRESENTED_SLOTS_TTL_SECONDS)
                .await
                .map_err(|e| ScheduleError::CacheError(e.to_string()))?;
        }

        debug!(
            "Remembered {} presented slots for conversation {}",
            values.len(),
            conversation_id
        );
        Ok(())
    }

    /// Resolves a 1-based position ("book number 2") to the slot id at
    /// that place in the remembered list.
    pub async fn resolve(
        &self,
        conversation_id: Uuid,
        position: usize,
    ) -> Result<Option<Uuid>, ScheduleError> {
        let Some(index) = position_to_index(position) else {
            return Ok(None);
        };

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ScheduleError::CacheError(format!("Connection error: {}", e)))?;

        let key = Self::key(conversation_id);
        let value: Option<String> = conn
            .lindex(&key, index)
            .await
            .map_err(|e| ScheduleError::CacheError(e.to_string()))?;

        match value {
            Some(raw) => {
                let slot_id = Uuid::parse_str(&raw)
                    .map_err(|e| ScheduleError::CacheError(format!("Corrupt entry: {}", e)))?;
                info!(
                    "Resolved position {} to slot {} for conversation {}",
                    position, slot_id, conversation_id
                );
                Ok(Some(slot_id))
            }
            None => Ok(None),
        }
    }

    fn key(conversation_id: Uuid) -> String {
        format!("presented_slots:{}", conversation_id)
    }
}

/// 1-based position to a non-negative LINDEX index. Redis reads
/// negative indexes from the tail, so a position too large for isize
/// resolves to nothing rather than wrapping.
fn position_to_index(position: usize) -> Option<isize> {
    if position == 0 {
        return None;
    }
    isize::try_from(position - 1).ok()
}
