// =============================================================================
// patterns.rs — THE LITTLE MATCHERS BOTH SOURCES SHARE
// =============================================================================
//
// The directory API and the landing page disagree about nearly everything,
// but they agree on what a virtual meeting looks like: a VM/ONL/HY format
// code, a Zoom/Meet/Teams link somewhere, and wall-clock times written as
// hh:mm or hh:mm:ss. The matchers for those live here, compiled once.
// =============================================================================

use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;
use url::Url;

/// Duration assumed when a meeting doesn't say how long it runs.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Format codes the directory uses for virtual, online and hybrid meetings.
static VIRTUAL_FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(VM|ONL|HY)\b").expect("virtual format pattern is a valid regex")
});

/// Anything URL-shaped. Candidates are checked against
/// [`VIDEO_CONFERENCE_DOMAINS`] afterwards.
static URL_CANDIDATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>]+"#).expect("URL candidate pattern is a valid regex")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is a valid regex"));

static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2}):(\d{2})(?::(\d{2}))?").expect("clock pattern is a valid regex")
});

static HMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})").expect("duration pattern is a valid regex")
});

/// Hosts (and their subdomains) we accept as a video-conference link.
pub const VIDEO_CONFERENCE_DOMAINS: &[&str] = &[
    "zoom.us",
    "zoom.com",
    "meet.google.com",
    "teams.microsoft.com",
    "teams.live.com",
    "meet.jit.si",
    "whereby.com",
    "webex.com",
];

/// Does a free-text formats field carry one of the virtual format codes?
pub fn has_virtual_format(formats: &str) -> bool {
    VIRTUAL_FORMAT_RE.is_match(formats)
}

/// True when `link` is an http(s) URL whose host is a known
/// video-conferencing domain or one of its subdomains.
pub fn is_video_link(link: &str) -> bool {
    let Ok(url) = Url::parse(link.trim()) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    VIDEO_CONFERENCE_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// First video-conference URL embedded anywhere in `text`.
pub fn find_video_link(text: &str) -> Option<String> {
    URL_CANDIDATE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', ')', ']', '!', '?']))
        .find(|candidate| is_video_link(candidate))
        .map(str::to_string)
}

/// Drop anything that looks like a markup tag, keeping the visible text.
pub fn strip_tags(text: &str) -> Cow<'_, str> {
    TAG_RE.replace_all(text, "")
}

/// Parse `hh:mm` or `hh:mm:ss` into a wall-clock time. Seconds are read but
/// not kept; every published time is on the minute.
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let caps = CLOCK_RE.captures(text)?;
    let hours: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: u32 = caps.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}

/// Convert an `hh:mm:ss` duration into whole minutes. Blank or malformed
/// durations count as [`DEFAULT_DURATION_MINUTES`]; seconds are ignored.
pub fn duration_minutes(hms: Option<&str>) -> i64 {
    let Some(caps) = hms.and_then(|text| HMS_RE.captures(text.trim())) else {
        return DEFAULT_DURATION_MINUTES;
    };
    let hours = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok());
    let minutes = caps.get(2).and_then(|m| m.as_str().parse::<i64>().ok());
    match (hours, minutes) {
        (Some(h), Some(m)) => h * 60 + m,
        _ => DEFAULT_DURATION_MINUTES,
    }
}
