// =============================================================================
// models.rs — ONE MEETING SHAPE, NO MATTER WHERE IT CAME FROM
// =============================================================================
//
// The directory API hands us loosely typed rows where every column might be a
// string, a number, null, or missing. The landing page hands us table cells.
// Both end up as a CanonicalMeeting, which is the only thing the front-end
// ever sees.
//
// DirectoryRow is the typed landing zone for the API rows. Defaults and
// validation happen there, once, so the mapping code never has to wonder
// whether a field exists.
// =============================================================================

use std::fmt;

use chrono::{Duration, FixedOffset, NaiveTime};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::patterns;

/// Placeholder used when a source gives a meeting no name.
pub const UNNAMED_MEETING: &str = "Unnamed";

/// Whether a meeting without a video-conference link is still worth
/// publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Keep every virtual meeting. `link` may be empty and `platform` is
    /// always present.
    Permissive,
    /// Drop meetings without a recognizable video-conference link, and omit
    /// `platform`.
    RequireLink,
}

impl LinkPolicy {
    pub fn from_require_link(require_link: bool) -> Self {
        if require_link {
            LinkPolicy::RequireLink
        } else {
            LinkPolicy::Permissive
        }
    }

    pub fn requires_link(self) -> bool {
        self == LinkPolicy::RequireLink
    }
}

impl fmt::Display for LinkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkPolicy::Permissive => write!(f, "permissive"),
            LinkPolicy::RequireLink => write!(f, "require-link"),
        }
    }
}

/// A wall-clock time pinned to the civil UTC offset. There is no date: a
/// meeting recurs weekly and only the time of day matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilTime {
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

impl CivilTime {
    pub fn new(time: NaiveTime, offset: FixedOffset) -> Self {
        Self { time, offset }
    }

    /// Add minutes, wrapping past midnight.
    pub fn plus_minutes(self, minutes: i64) -> Self {
        Self {
            time: self.time + Duration::minutes(minutes),
            offset: self.offset,
        }
    }
}

/// ISO-8601 time-only with offset, e.g. `19:30:00-03:00`.
impl fmt::Display for CivilTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.time.format("%H:%M:%S"), self.offset)
    }
}

impl Serialize for CivilTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The normalized meeting the front-end consumes. Field order here is the
/// key order in meetings.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalMeeting {
    pub name: String,

    /// 0 = Sunday ... 6 = Saturday.
    pub weekday: u8,

    pub start: CivilTime,

    /// May be earlier than `start` when the meeting runs past midnight.
    pub end: CivilTime,

    /// The raw format/medium description. Only carried by the permissive
    /// policy; serialized as a key only when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Video-conference URL. Empty when the permissive policy kept a meeting
    /// without one.
    pub link: String,
}

impl CanonicalMeeting {
    /// Is the meeting in progress on `weekday` at wall-clock `at`?
    ///
    /// Slots that cross midnight (start after end) are live from `start`
    /// until midnight and from midnight until `end`, both on the meeting's
    /// own weekday, the same way the front-end reads them. A zero-length
    /// slot (a zero duration) falls in the second branch and is live all day.
    pub fn is_live_at(&self, weekday: u8, at: NaiveTime) -> bool {
        if self.weekday != weekday {
            return false;
        }
        let (start, end) = (self.start.time, self.end.time);
        if start < end {
            start <= at && at < end
        } else {
            at >= start || at < end
        }
    }
}

impl fmt::Display for CanonicalMeeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (weekday {}, {} to {})",
            self.name, self.weekday, self.start, self.end
        )
    }
}

/// Why a single directory row was dropped. Never fatal: the rest of the rows
/// from the same root are still processed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unparseable start time {0:?}")]
    BadTime(String),

    #[error("weekday {0:?} is not a 0-6 code")]
    BadWeekday(String),
}

/// A directory API row after boundary parsing. Every field has been
/// type-checked and defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRow {
    pub meeting_name: String,
    pub weekday: u8,
    pub start_time: NaiveTime,
    pub duration_minutes: i64,
    pub formats: String,

    /// The designated `conference_url` column, trimmed. `None` when blank.
    pub conference_url: Option<String>,

    /// First video-conference URL found in any string column of the row
    /// (including `conference_url`).
    pub scanned_link: Option<String>,
}

impl DirectoryRow {
    /// Parse one JSON object from the directory API.
    ///
    /// `weekday_tinyint` and `start_time` are required; directory servers
    /// commonly stringify every column, so numbers and numeric strings are
    /// both accepted.
    pub fn from_json(row: &Map<String, Value>) -> Result<Self, RowError> {
        let weekday_raw = row
            .get("weekday_tinyint")
            .and_then(scalar_text)
            .ok_or(RowError::MissingField("weekday_tinyint"))?;
        let weekday = weekday_raw
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|day| *day <= 6)
            .ok_or_else(|| RowError::BadWeekday(weekday_raw.clone()))?;

        let start_raw = row
            .get("start_time")
            .and_then(scalar_text)
            .ok_or(RowError::MissingField("start_time"))?;
        let start_time =
            patterns::parse_clock(&start_raw).ok_or_else(|| RowError::BadTime(start_raw.clone()))?;

        let meeting_name = row
            .get("meeting_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNNAMED_MEETING)
            .to_string();

        let duration_minutes =
            patterns::duration_minutes(row.get("duration_time").and_then(Value::as_str));

        let formats = row
            .get("formats")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let conference_url = row
            .get("conference_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        let scanned_link = row
            .values()
            .filter_map(Value::as_str)
            .find_map(patterns::find_video_link);

        Ok(Self {
            meeting_name,
            weekday,
            start_time,
            duration_minutes,
            formats,
            conference_url,
            scanned_link,
        })
    }

    pub fn is_virtual(&self) -> bool {
        patterns::has_virtual_format(&self.formats)
    }

    /// The link a meeting should be published with under `policy`.
    ///
    /// The designated column wins when it is filled in. Under
    /// [`LinkPolicy::RequireLink`] it must also be a video-conference URL;
    /// otherwise the first one found elsewhere in the row is used, and
    /// `None` means the row has to go.
    pub fn link_for(&self, policy: LinkPolicy) -> Option<String> {
        match policy {
            LinkPolicy::Permissive => Some(
                self.conference_url
                    .clone()
                    .or_else(|| self.scanned_link.clone())
                    .unwrap_or_default(),
            ),
            LinkPolicy::RequireLink => self
                .conference_url
                .clone()
                .filter(|url| patterns::is_video_link(url))
                .or_else(|| self.scanned_link.clone()),
        }
    }
}

/// Strings as-is, numbers rendered. Anything else counts as absent.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
