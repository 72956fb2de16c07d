use std::env;

use chrono::Duration;
use log::info;

/// Process-wide configuration, resolved once at startup. Each provider
/// credential is independently optional; absence selects the mock/fallback
/// mode of the component that would use it.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Score provider (Ahrefs-style domain rating lookups).
    pub ahrefs_api_key: Option<String>,
    /// Content provider (chat-completion email generation).
    pub openai_api_key: Option<String>,
    /// Send provider (transactional email dispatch).
    pub resend_api_key: Option<String>,
    /// Persistence store. Presence-only: the storage stub does not dial out.
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    /// Minimum domain rating worth pursuing.
    pub dr_threshold: u8,
    /// Minimum wait between outreach emails to the same site.
    pub email_delay: Duration,
    pub max_follow_ups: u32,
    pub from_address: String,
    pub sender_name: String,
    pub agency_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            ahrefs_api_key: None,
            openai_api_key: None,
            resend_api_key: None,
            supabase_url: None,
            supabase_key: None,
            dr_threshold: 30,
            email_delay: Duration::hours(24),
            max_follow_ups: 2,
            from_address: "outreach@yourdomain.com".to_string(),
            sender_name: "[Your Name]".to_string(),
            agency_name: "[Your Agency]".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let config = Config {
            port: env_parse("PORT", defaults.port),
            ahrefs_api_key: env_credential("AHREFS_API_KEY"),
            openai_api_key: env_credential("OPENAI_API_KEY"),
            resend_api_key: env_credential("RESEND_API_KEY"),
            supabase_url: env_credential("SUPABASE_URL"),
            supabase_key: env_credential("SUPABASE_KEY"),
            dr_threshold: env_parse("DR_THRESHOLD", defaults.dr_threshold),
            email_delay: Duration::milliseconds(env_parse(
                "EMAIL_DELAY_MS",
                86_400_000,
            )),
            max_follow_ups: env_parse("MAX_FOLLOW_UPS", defaults.max_follow_ups),
            from_address: env_string("OUTREACH_FROM_ADDRESS", &defaults.from_address),
            sender_name: env_string("OUTREACH_SENDER_NAME", &defaults.sender_name),
            agency_name: env_string("OUTREACH_AGENCY_NAME", &defaults.agency_name),
        };

        info!(
            "Config loaded: rating provider {}, content provider {}, send provider {}",
            enabled(config.ahrefs_api_key.is_some()),
            enabled(config.openai_api_key.is_some()),
            enabled(config.resend_api_key.is_some()),
        );

        config
    }
}

fn enabled(present: bool) -> &'static str {
    if present {
        "configured"
    } else {
        "not configured (mock mode)"
    }
}

/// A credential counts as absent when unset, empty, or still the `your-...`
/// placeholder from the sample environment file.
fn env_credential(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.starts_with("your-"))
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
