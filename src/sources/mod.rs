// =============================================================================
// sources/mod.rs — THE FALLBACK LADDER
// =============================================================================
//
// Two ways to learn which virtual meetings exist:
//
//   1. directory_source  the BMLT directory API. Structured, complete, and
//                        hosted on servers with a complicated relationship
//                        with their TLS certificates.
//   2. html_source       the public landing page. Always the last resort.
//
// FallbackChain walks them in order and stops at the first one that produces
// at least one meeting. Results are never merged across sources. If every
// rung comes back empty, the run fails and meetings.json is left untouched.
// =============================================================================

pub mod directory_source;
pub mod html_source;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::CanonicalMeeting;

/// A provider of canonical meetings.
#[async_trait]
pub trait MeetingSource: Send + Sync {
    /// Short label for logs and error messages.
    fn name(&self) -> &str;

    /// Fetch and normalize. `None` means nothing usable came back. Failures
    /// are logged and absorbed here; they never escape a source.
    async fn fetch(&self) -> Option<Vec<CanonicalMeeting>>;
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no meetings extracted from any source (tried: {}); check network or site layout", .tried.join(", "))]
    Exhausted { tried: Vec<String> },
}

/// The meetings that won, and which source they came from.
#[derive(Debug)]
pub struct Harvest {
    pub source: String,
    pub meetings: Vec<CanonicalMeeting>,
}

pub struct FallbackChain {
    sources: Vec<Box<dyn MeetingSource>>,
}

impl FallbackChain {
    pub fn new(sources: Vec<Box<dyn MeetingSource>>) -> Self {
        Self { sources }
    }

    /// Try each source in order; later sources are only touched when every
    /// earlier one came back empty.
    pub async fn run(&self) -> Result<Harvest, PipelineError> {
        let mut tried = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            tried.push(source.name().to_string());

            match source.fetch().await {
                Some(meetings) if !meetings.is_empty() => {
                    info!(
                        source = source.name(),
                        meetings = meetings.len(),
                        "{} produced {} meetings",
                        source.name(),
                        meetings.len()
                    );
                    return Ok(Harvest {
                        source: source.name().to_string(),
                        meetings,
                    });
                }
                _ => {
                    warn!(source = source.name(), "{} produced nothing usable, falling back", source.name());
                }
            }
        }

        Err(PipelineError::Exhausted { tried })
    }
}
