// =============================================================================
// NA BRASIL — VIRTUAL MEETINGS FETCHER
// =============================================================================
//
// One run, one file. Cron starts us, we ask the BMLT directory (and, failing
// that, the public landing page) which virtual meetings exist, normalize
// them, write meetings.json, and exit.
//
//   0 * * * * /usr/local/bin/na_virtual_meetings
//
// If no source produced a single meeting, we exit non-zero and leave the
// previous meetings.json exactly as it was.
// =============================================================================

mod config;
mod http;
mod models;
mod patterns;
mod sink;
mod sources;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::http::{HttpFetcher, PageFetcher};
use crate::models::CanonicalMeeting;
use crate::sources::directory_source::DirectorySource;
use crate::sources::html_source::HtmlSource;
use crate::sources::{FallbackChain, MeetingSource};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = Config::from_env();
    info!(
        roots = config.bmlt_roots.len(),
        policy = %config.link_policy,
        output = %config.output_path.display(),
        "Fetching virtual meetings ({} policy)",
        config.link_policy
    );

    let fetcher: Arc<dyn PageFetcher> = Arc::new(
        HttpFetcher::new(config.request_timeout, &config.user_agent)
            .context("building HTTP clients")?,
    );

    let sources: Vec<Box<dyn MeetingSource>> = vec![
        Box::new(DirectorySource::new(
            Arc::clone(&fetcher),
            config.bmlt_roots.clone(),
            config.link_policy,
            config.civil_offset,
        )),
        Box::new(HtmlSource::new(
            Arc::clone(&fetcher),
            config.html_url.clone(),
            config.link_policy,
            config.civil_offset,
        )),
    ];

    let harvest = match FallbackChain::new(sources).run().await {
        Ok(harvest) => harvest,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    for meeting in &harvest.meetings {
        debug!("{}", meeting);
    }
    log_live_now(&harvest.meetings, &config);

    sink::write_meetings(&config.output_path, &harvest.meetings).await?;

    info!(
        source = harvest.source.as_str(),
        "Wrote {} meetings to {}",
        harvest.meetings.len(),
        config.output_path.display()
    );
    Ok(())
}

/// How many of the fetched meetings are in session right now, in civil time.
fn log_live_now(meetings: &[CanonicalMeeting], config: &Config) {
    let now = Utc::now().with_timezone(&config.civil_offset);
    let weekday = now.weekday().num_days_from_sunday() as u8;
    let live = meetings
        .iter()
        .filter(|meeting| meeting.is_live_at(weekday, now.time()))
        .count();
    info!(live = live, "{} meetings in session at {}", live, now.format("%a %H:%M%:z"));
}
