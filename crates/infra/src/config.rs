//! Environment-driven settings.
//!
//! | variable                            | meaning                                  |
//! |-------------------------------------|------------------------------------------|
//! | `PURCHASEBOOK_DATABASE_URL`         | SQLite URL; unset = in-memory stores     |
//! | `PURCHASEBOOK_INVENTORY_TIMEOUT_MS` | inventory call timeout; unset/0 = none   |

use std::time::Duration;

pub const DATABASE_URL_VAR: &str = "PURCHASEBOOK_DATABASE_URL";
pub const INVENTORY_TIMEOUT_VAR: &str = "PURCHASEBOOK_INVENTORY_TIMEOUT_MS";

/// Knobs for `PostingCoordinator`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostingConfig {
    /// Upper bound for one inventory call. `None` waits indefinitely.
    pub inventory_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub inventory_timeout: Option<Duration>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = lookup(DATABASE_URL_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if database_url.is_none() {
            tracing::warn!(
                "{DATABASE_URL_VAR} not set, using in-memory stores (data is not persisted)"
            );
        }

        let inventory_timeout = match lookup(INVENTORY_TIMEOUT_VAR) {
            None => None,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(_) => {
                    tracing::warn!(
                        value = %raw,
                        "invalid {INVENTORY_TIMEOUT_VAR}, inventory calls will not time out"
                    );
                    None
                }
            },
        };

        Self {
            database_url,
            inventory_timeout,
        }
    }

    pub fn posting_config(&self) -> PostingConfig {
        PostingConfig {
            inventory_timeout: self.inventory_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_in_memory_without_timeout() {
        assert_eq!(settings(&[]), Settings::default());
    }

    #[test]
    fn reads_url_and_timeout() {
        let s = settings(&[
            (DATABASE_URL_VAR, " sqlite://purchases.db "),
            (INVENTORY_TIMEOUT_VAR, "1500"),
        ]);
        assert_eq!(s.database_url.as_deref(), Some("sqlite://purchases.db"));
        assert_eq!(
            s.posting_config().inventory_timeout,
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn zero_or_garbage_timeout_means_none() {
        assert_eq!(settings(&[(INVENTORY_TIMEOUT_VAR, "0")]).inventory_timeout, None);
        assert_eq!(settings(&[(INVENTORY_TIMEOUT_VAR, "soon")]).inventory_timeout, None);
        assert_eq!(settings(&[(DATABASE_URL_VAR, "   ")]).database_url, None);
    }
}
