// =============================================================================
// directory_source.rs — THE BMLT DIRECTORY, ROOT BY ROOT
// =============================================================================
//
// BMLT (Basic Meeting List Toolbox) is the meeting directory NA service
// bodies run. Its client interface answers
//
//   {root}/client_interface/json/?switcher=GetSearchResults&recursive=1&weekdays=0,1,2,3,4,5,6
//
// with a JSON array of every meeting, in person or not. We keep the rows
// whose `formats` column carries VM, ONL or HY.
//
// Roots are tried strictly in order:
//   - certificate rejected   -> one retry against the same root with
//                               verification off, logged as a downgrade
//   - any other failure      -> log it, next root, no retry
//   - malformed payload      -> next root
//   - zero qualifying rows   -> next root
//   - at least one meeting   -> done, later roots are never asked
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use chrono::FixedOffset;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::http::{PageFetcher, TlsMode};
use crate::models::{CanonicalMeeting, CivilTime, DirectoryRow, LinkPolicy};
use crate::sources::MeetingSource;

const SEARCH_QUERY: &str =
    "/client_interface/json/?switcher=GetSearchResults&recursive=1&weekdays=0,1,2,3,4,5,6";

pub struct DirectorySource {
    fetcher: Arc<dyn PageFetcher>,
    roots: Vec<String>,
    policy: LinkPolicy,
    offset: FixedOffset,
}

impl DirectorySource {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        roots: Vec<String>,
        policy: LinkPolicy,
        offset: FixedOffset,
    ) -> Self {
        Self {
            fetcher,
            roots,
            policy,
            offset,
        }
    }

    /// GET one root, downgrading TLS at most once.
    async fn fetch_root(&self, root: &str) -> Option<String> {
        let url = search_url(root);

        match self.fetcher.get_text(&url, TlsMode::Verify).await {
            Ok(body) => Some(body),
            Err(e) if e.is_tls() => {
                warn!(
                    root = root,
                    error = %e,
                    "BMLT root {} failed certificate verification; retrying once WITHOUT verification",
                    root
                );
                match self.fetcher.get_text(&url, TlsMode::AcceptInvalid).await {
                    Ok(body) => Some(body),
                    Err(e) => {
                        warn!(root = root, error = %e, "BMLT root {} unreachable even without verification", root);
                        None
                    }
                }
            }
            Err(e) => {
                warn!(root = root, error = %e, "BMLT root {} unreachable", root);
                None
            }
        }
    }
}

#[async_trait]
impl MeetingSource for DirectorySource {
    fn name(&self) -> &str {
        "bmlt-directory"
    }

    async fn fetch(&self) -> Option<Vec<CanonicalMeeting>> {
        for root in &self.roots {
            info!(root = root.as_str(), "Querying BMLT root {}", root);

            let Some(body) = self.fetch_root(root).await else {
                continue;
            };

            let rows: Vec<Value> = match serde_json::from_str(&body) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(root = root.as_str(), error = %e, "BMLT root {} returned a malformed payload", root);
                    continue;
                }
            };

            info!(
                root = root.as_str(),
                rows = rows.len(),
                "BMLT root responded: {} ({} meetings)",
                root,
                rows.len()
            );

            let meetings = map_rows(&rows, self.policy, self.offset);

            if meetings.is_empty() {
                warn!(root = root.as_str(), "BMLT root {} had no qualifying virtual meetings", root);
                continue;
            }

            info!(
                root = root.as_str(),
                kept = meetings.len(),
                "Kept {} of {} rows from {}",
                meetings.len(),
                rows.len(),
                root
            );
            return Some(meetings);
        }

        None
    }
}

fn search_url(root: &str) -> String {
    format!("{}{}", root.trim_end_matches('/'), SEARCH_QUERY)
}

/// Filter and map raw rows, in source order. Bad rows are dropped one by one,
/// including array elements that aren't objects at all.
pub fn map_rows(rows: &[Value], policy: LinkPolicy, offset: FixedOffset) -> Vec<CanonicalMeeting> {
    rows.iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let Some(fields) = raw.as_object() else {
                debug!(row = index, "Dropping BMLT row {}: not an object", index);
                return None;
            };
            match DirectoryRow::from_json(fields) {
                Ok(row) => to_meeting(&row, policy, offset),
                Err(e) => {
                    debug!(row = index, error = %e, "Dropping BMLT row {}: {}", index, e);
                    None
                }
            }
        })
        .collect()
}

/// Non-virtual rows never make it; under [`LinkPolicy::RequireLink`] neither
/// do rows without a video link.
pub fn to_meeting(
    row: &DirectoryRow,
    policy: LinkPolicy,
    offset: FixedOffset,
) -> Option<CanonicalMeeting> {
    if !row.is_virtual() {
        return None;
    }

    let Some(link) = row.link_for(policy) else {
        debug!(meeting = row.meeting_name.as_str(), "No video link, dropping under require-link policy");
        return None;
    };

    let start = CivilTime::new(row.start_time, offset);

    Some(CanonicalMeeting {
        name: row.meeting_name.clone(),
        weekday: row.weekday,
        start,
        end: start.plus_minutes(row.duration_minutes),
        platform: (!policy.requires_link()).then(|| row.formats.clone()),
        link,
    })
}
