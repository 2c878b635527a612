// =============================================================================
// config.rs — EVERY KNOB THE FETCHER HAS
// =============================================================================
//
// The fetcher takes no command-line arguments. Cron calls it, it runs, it
// exits. Everything tunable comes from the environment (or a .env file next
// to the binary), and every value has a default that works against the real
// NA Brasil servers out of the box.
//
// Variables are prefixed with NA_MEETINGS_ so they don't collide with
// whatever else is living in the crontab's environment.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::models::LinkPolicy;

/// BMLT root servers, tried in this order. The "ativo" root is the one the
/// NA Brasil site queries; the plain root is the older install.
const DEFAULT_BMLT_ROOTS: &str =
    "https://bmlt.na.org.br/ativo/main_server,https://bmlt.na.org.br/main_server";

const DEFAULT_HTML_URL: &str = "https://www.na.org.br/virtual/";

/// America/Sao_Paulo has not observed DST since 2019, so a fixed -03:00 is exact.
const DEFAULT_UTC_OFFSET_MINUTES: i32 = -180;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory API roots. Each one gets `/client_interface/json/...` appended.
    pub bmlt_roots: Vec<String>,

    /// The landing page scraped when no directory root yields anything.
    pub html_url: String,

    /// Applied to every request, including the insecure retry.
    pub request_timeout: Duration,

    /// Where the JSON array ends up. Relative paths resolve against the
    /// working directory cron starts us in.
    pub output_path: PathBuf,

    /// Permissive keeps every virtual meeting and carries `platform`;
    /// strict drops meetings without a video-conference link.
    pub link_policy: LinkPolicy,

    /// Civil timezone used for every wall-clock time we emit.
    pub civil_offset: FixedOffset,

    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        // No .env is the normal case under cron.
        let _ = dotenvy::dotenv();

        let timeout_secs: u64 = env_or_default("NA_MEETINGS_TIMEOUT_SECS", "20")
            .parse()
            .unwrap_or(20);

        let offset_minutes: i32 = env_or_default(
            "NA_MEETINGS_UTC_OFFSET_MINUTES",
            &DEFAULT_UTC_OFFSET_MINUTES.to_string(),
        )
        .parse()
        .unwrap_or(DEFAULT_UTC_OFFSET_MINUTES);

        Config {
            bmlt_roots: split_roots(&env_or_default("NA_MEETINGS_BMLT_ROOTS", DEFAULT_BMLT_ROOTS)),
            html_url: env_or_default("NA_MEETINGS_HTML_URL", DEFAULT_HTML_URL),
            request_timeout: Duration::from_secs(timeout_secs),
            output_path: PathBuf::from(env_or_default("NA_MEETINGS_OUTPUT_PATH", "meetings.json")),
            link_policy: LinkPolicy::from_require_link(parse_flag(&env_or_default(
                "NA_MEETINGS_REQUIRE_LINK",
                "false",
            ))),
            civil_offset: civil_offset(offset_minutes),
            user_agent: env_or_default("NA_MEETINGS_USER_AGENT", "NA-Meetings-Fetch/2.0"),
        }
    }
}

/// Split a comma-separated root list, keeping order and dropping blanks and
/// trailing slashes (the query path brings its own).
fn split_roots(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|root| root.trim().trim_end_matches('/'))
        .filter(|root| !root.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Out-of-range offsets fall back to Sao Paulo time rather than failing the run.
fn civil_offset(minutes: i32) -> FixedOffset {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .or_else(|| FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60))
        .unwrap_or_else(|| Utc.fix())
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
