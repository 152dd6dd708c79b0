use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;

/// All steward parameters. Loaded from `steward_config` table at startup.
/// First boot writes defaults; subsequent boots read existing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StewardCfg {
    // action history
    pub history_capacity: usize,

    // advisor transcript
    pub transcript_cache_cap: usize,
    pub context_turns: usize,

    // LLM request
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,

    // front end
    pub toast_buffer: usize,
}

impl Default for StewardCfg {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            transcript_cache_cap: 40,
            context_turns: 10,
            llm_max_tokens: 1024,
            llm_temperature: 0.4,
            toast_buffer: 32,
        }
    }
}

impl StewardCfg {
    /// Load config from `steward_config` table. If table is empty, seed with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM steward_config")
            .fetch_all(pool)
            .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Write all default values into `steward_config` table.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        for (key, value, desc) in &self.to_entries() {
            sqlx::query(
                "INSERT INTO steward_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            history_capacity: get_or(m, "history_capacity", d.history_capacity),
            transcript_cache_cap: get_or(m, "transcript_cache_cap", d.transcript_cache_cap),
            context_turns: get_or(m, "context_turns", d.context_turns),
            llm_max_tokens: get_or(m, "llm_max_tokens", d.llm_max_tokens),
            llm_temperature: get_or(m, "llm_temperature", d.llm_temperature),
            toast_buffer: get_or(m, "toast_buffer", d.toast_buffer),
        }
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("history_capacity", self.history_capacity.to_string(), "Action history ring size (0 disables)"),
            ("transcript_cache_cap", self.transcript_cache_cap.to_string(), "Advisor turns kept in local storage"),
            ("context_turns", self.context_turns.to_string(), "Transcript turns sent with each prompt"),
            ("llm_max_tokens", self.llm_max_tokens.to_string(), "Max tokens per advisor reply"),
            ("llm_temperature", self.llm_temperature.to_string(), "Advisor sampling temperature"),
            ("toast_buffer", self.toast_buffer.to_string(), "Pending toast notifications"),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_map_overrides_known_keys_only() {
        let mut m = HashMap::new();
        m.insert("history_capacity".to_string(), "5".to_string());
        m.insert("llm_temperature".to_string(), "0.9".to_string());
        m.insert("unrelated".to_string(), "x".to_string());
        let cfg = StewardCfg::from_map(&m);
        assert_eq!(cfg.history_capacity, 5);
        assert!((cfg.llm_temperature - 0.9).abs() < f32::EPSILON);
        assert_eq!(cfg.context_turns, StewardCfg::default().context_turns);
    }

    #[test]
    fn unparseable_values_fall_back() {
        let mut m = HashMap::new();
        m.insert("toast_buffer".to_string(), "lots".to_string());
        assert_eq!(StewardCfg::from_map(&m).toast_buffer, 32);
    }

    #[test]
    fn entries_cover_every_field() {
        let cfg = StewardCfg::default();
        let m: HashMap<String, String> = cfg
            .to_entries()
            .into_iter()
            .map(|(k, v, _)| (k.to_string(), v))
            .collect();
        assert_eq!(StewardCfg::from_map(&m), cfg);
    }
}
