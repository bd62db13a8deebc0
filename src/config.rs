//! Configuration types.
//!
//! Everything is read from the environment with safe fallbacks: a malformed
//! value logs a warning and the default is used instead.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Default step delays (days) for steps 1→2, 2→3 and 3→4.
pub const DEFAULT_STEP_DELAYS: [u32; 3] = [3, 5, 7];

/// Delay used when a step has no configured entry.
pub const FALLBACK_STEP_DELAY_DAYS: u32 = 7;

/// Tunables for the prospect lifecycle.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum pre-score before enrichment credits are spent.
    pub enrichment_threshold: f64,
    /// Minimum full score before a human is notified about a new lead.
    pub notification_threshold: f64,
    /// Days to wait after step N is approved before composing step N+1.
    pub step_delays: Vec<u32>,
    /// Approve composed follow-ups without review.
    pub auto_approve_followups: bool,
    /// Hours between news-only scans.
    pub scan_interval_hours: u64,
    /// Name used to sign outreach.
    pub sender_name: String,
    /// Company the sender represents.
    pub sender_company: String,
    /// Prefix for delivery campaign names.
    pub campaign_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enrichment_threshold: 0.40,
            notification_threshold: 0.65,
            step_delays: DEFAULT_STEP_DELAYS.to_vec(),
            auto_approve_followups: false,
            scan_interval_hours: 12,
            sender_name: "Alex".to_string(),
            sender_company: "our team".to_string(),
            campaign_prefix: "Outreach".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from `PROSPECT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let enrichment_threshold = lookup("PROSPECT_ENRICHMENT_THRESHOLD")
            .map(|raw| parse_threshold("PROSPECT_ENRICHMENT_THRESHOLD", &raw, defaults.enrichment_threshold))
            .unwrap_or(defaults.enrichment_threshold);

        let notification_threshold = lookup("PROSPECT_NOTIFICATION_THRESHOLD")
            .map(|raw| {
                parse_threshold("PROSPECT_NOTIFICATION_THRESHOLD", &raw, defaults.notification_threshold)
            })
            .unwrap_or(defaults.notification_threshold);

        let step_delays = lookup("PROSPECT_STEP_DELAYS")
            .map(|raw| parse_step_delays(&raw))
            .unwrap_or(defaults.step_delays);

        let auto_approve_followups = lookup("PROSPECT_AUTO_APPROVE_FOLLOWUPS")
            .map(|raw| parse_flag("PROSPECT_AUTO_APPROVE_FOLLOWUPS", &raw))
            .unwrap_or(defaults.auto_approve_followups);

        let scan_interval_hours = lookup("PROSPECT_SCAN_INTERVAL_HOURS")
            .and_then(|raw| match raw.trim().parse::<u64>() {
                Ok(hours) if hours >= 1 => Some(hours),
                _ => {
                    tracing::warn!(value = %raw, "Invalid PROSPECT_SCAN_INTERVAL_HOURS, using default");
                    None
                }
            })
            .unwrap_or(defaults.scan_interval_hours);

        Self {
            enrichment_threshold,
            notification_threshold,
            step_delays,
            auto_approve_followups,
            scan_interval_hours,
            sender_name: lookup("PROSPECT_SENDER_NAME").unwrap_or(defaults.sender_name),
            sender_company: lookup("PROSPECT_SENDER_COMPANY").unwrap_or(defaults.sender_company),
            campaign_prefix: lookup("PROSPECT_CAMPAIGN_PREFIX").unwrap_or(defaults.campaign_prefix),
        }
    }

    /// Required wait before composing the step after `current_step`.
    pub fn delay_after_step(&self, current_step: u32) -> u32 {
        current_step
            .checked_sub(1)
            .and_then(|idx| self.step_delays.get(idx as usize))
            .copied()
            .unwrap_or(FALLBACK_STEP_DELAY_DAYS)
    }
}

/// Parse a comma-separated delay list. Any bad element discards the whole list.
pub fn parse_step_delays(raw: &str) -> Vec<u32> {
    let parsed: Result<Vec<u32>, _> = raw
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect();
    match parsed {
        Ok(delays) if !delays.is_empty() => delays,
        _ => {
            tracing::warn!(value = %raw, "Invalid step delay list, falling back to 3,5,7");
            DEFAULT_STEP_DELAYS.to_vec()
        }
    }
}

fn parse_threshold(key: &str, raw: &str, default: f64) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => v,
        _ => {
            tracing::warn!(key, value = %raw, default, "Threshold must be a number in [0, 1]");
            default
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => {
            tracing::warn!(key, value = %raw, "Unrecognised boolean, treating as false");
            false
        }
    }
}

/// API credentials. Each is optional; a missing one disables its collaborator.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub anthropic: Option<SecretString>,
    pub proxycurl: Option<SecretString>,
    pub hunter: Option<SecretString>,
    pub apify: Option<SecretString>,
    pub smartlead: Option<SecretString>,
    /// Sending mailbox id attached to new delivery campaigns.
    pub smartlead_sending_account: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secret = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };
        Self {
            anthropic: secret("ANTHROPIC_API_KEY"),
            proxycurl: secret("PROXYCURL_API_KEY"),
            hunter: secret("HUNTER_API_KEY"),
            apify: secret("APIFY_API_KEY"),
            smartlead: secret("SMARTLEAD_API_KEY"),
            smartlead_sending_account: lookup("SMARTLEAD_SENDING_ACCOUNT")
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Background job triggers.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Full discovery scan (news, jobs, people).
    pub full_scan_cron: String,
    /// People-only scan.
    pub people_scan_cron: String,
    /// News-only scan interval.
    pub news_scan_every: Duration,
    /// Sequence progression pass.
    pub sequence_check_cron: String,
    /// Delivery status sync interval.
    pub delivery_sync_every: Duration,
}

impl ScheduleConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            full_scan_cron: "0 0 8 * * Mon,Thu".to_string(),
            people_scan_cron: "0 0 6 * * *".to_string(),
            news_scan_every: Duration::from_secs(config.scan_interval_hours * 3600),
            sequence_check_cron: "0 0 10 * * *".to_string(),
            delivery_sync_every: Duration::from_secs(6 * 3600),
        }
    }
}

/// Process-level settings read by the binary.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub model: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("PROSPECT_DB_PATH")
                .unwrap_or_else(|_| "./data/prospects.db".to_string())
                .into(),
            log_dir: std::env::var("PROSPECT_LOG_DIR").ok().map(PathBuf::from),
            model: std::env::var("PROSPECT_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config.enrichment_threshold, 0.40);
        assert_eq!(config.notification_threshold, 0.65);
        assert_eq!(config.step_delays, vec![3, 5, 7]);
        assert!(!config.auto_approve_followups);
        assert_eq!(config.scan_interval_hours, 12);
    }

    #[test]
    fn reads_valid_values() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("PROSPECT_ENRICHMENT_THRESHOLD", "0.5"),
            ("PROSPECT_NOTIFICATION_THRESHOLD", "0.8"),
            ("PROSPECT_STEP_DELAYS", "2, 4 ,6"),
            ("PROSPECT_AUTO_APPROVE_FOLLOWUPS", "true"),
            ("PROSPECT_SCAN_INTERVAL_HOURS", "6"),
        ]));
        assert_eq!(config.enrichment_threshold, 0.5);
        assert_eq!(config.notification_threshold, 0.8);
        assert_eq!(config.step_delays, vec![2, 4, 6]);
        assert!(config.auto_approve_followups);
        assert_eq!(config.scan_interval_hours, 6);
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("PROSPECT_ENRICHMENT_THRESHOLD", "lots"),
            ("PROSPECT_NOTIFICATION_THRESHOLD", "1.5"),
            ("PROSPECT_STEP_DELAYS", "3,five,7"),
            ("PROSPECT_SCAN_INTERVAL_HOURS", "0"),
        ]));
        assert_eq!(config.enrichment_threshold, 0.40);
        assert_eq!(config.notification_threshold, 0.65);
        assert_eq!(config.step_delays, vec![3, 5, 7]);
        assert_eq!(config.scan_interval_hours, 12);
    }

    #[test]
    fn empty_delay_list_falls_back() {
        assert_eq!(parse_step_delays(""), vec![3, 5, 7]);
        assert_eq!(parse_step_delays("1"), vec![1]);
    }

    #[test]
    fn delay_after_step_uses_table_then_seven() {
        let config = EngineConfig::default();
        assert_eq!(config.delay_after_step(1), 3);
        assert_eq!(config.delay_after_step(2), 5);
        assert_eq!(config.delay_after_step(3), 7);
        assert_eq!(config.delay_after_step(4), 7);
        assert_eq!(config.delay_after_step(0), 7);
    }

    #[test]
    fn blank_credentials_are_absent() {
        let creds = Credentials::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("HUNTER_API_KEY", "  "),
        ]));
        assert_eq!(creds.anthropic.unwrap().expose_secret(), "sk-test");
        assert!(creds.hunter.is_none());
        assert!(creds.smartlead.is_none());
    }

    #[test]
    fn schedule_uses_scan_interval() {
        let config = EngineConfig {
            scan_interval_hours: 3,
            ..Default::default()
        };
        let schedule = ScheduleConfig::from_engine(&config);
        assert_eq!(schedule.news_scan_every, Duration::from_secs(3 * 3600));
    }
}
