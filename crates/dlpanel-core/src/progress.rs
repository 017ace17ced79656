//! Downloader output scraping.
//!
//! Every line the downloader prints goes through [`classify`]. Lines that
//! match none of the recognized shapes are opaque status text; nothing here
//! ever fails.

use once_cell::sync::Lazy;
use regex::Regex;

/// Rate reported when the readout carries no `DL:` field.
pub const DEFAULT_RATE: &str = "0B";
/// ETA reported when the readout carries no `ETA:` components.
pub const UNKNOWN_ETA: &str = "Unknown";

/// Phrases the downloader prints when the destination is already complete.
/// Matched case-insensitively against a whole line.
const SATISFIED_PHRASES: &[&str] = &[
    "file already exists",
    "already existed",
    "has already been completed",
    "has already completed",
    "already been downloaded",
];

/// Markers a setup script prints once the tool's web server is up.
const SERVER_READY_MARKERS: &[&str] = &["Running on local URL", "Running on public URL"];

/// aria2c readout, e.g. `[#bc945d 16GiB/31GiB(52%) CN:16 DL:80MiB ETA:3m12s]`.
static READOUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\[#[0-9A-Za-z]+\s+",
        r"([\d.]+(?:[KMGT]?i?B)?)/([\d.]+(?:[KMGT]?i?B)?)",
        r"\((\d+(?:\.\d+)?)%\)",
        r"(?:[^\]]*?DL:([\d.]+(?:[KMGT]?i?B)?))?",
        r"(?:[^\]]*?ETA:(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?)?",
    ))
    .expect("readout pattern is valid")
});

/// One progress readout. Sizes stay as the downloader printed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSample {
    pub bytes_done: String,
    pub bytes_total: String,
    /// Floored, not clamped: values above 100 mean "skip this update".
    pub percent: u32,
    /// Bare rate without the `/s` suffix.
    pub rate: String,
    pub eta: String,
}

impl ProgressSample {
    pub fn percent_in_range(&self) -> bool {
        self.percent <= 100
    }
}

/// What a single output line means to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Progress(ProgressSample),
    /// The downloader reports the destination as already present.
    AlreadySatisfied,
    /// A setup script reports its server is listening.
    ServerReady,
    Text,
}

type ShapeMatcher = fn(&str) -> Option<LineKind>;

/// Recognized line shapes, tried in order.
const SHAPES: &[(&str, ShapeMatcher)] = &[
    ("readout", match_readout),
    ("already-satisfied", match_already_satisfied),
    ("server-ready", match_server_ready),
];

fn match_readout(line: &str) -> Option<LineKind> {
    parse(line).map(LineKind::Progress)
}

fn match_already_satisfied(line: &str) -> Option<LineKind> {
    is_already_satisfied(line).then_some(LineKind::AlreadySatisfied)
}

fn match_server_ready(line: &str) -> Option<LineKind> {
    SERVER_READY_MARKERS
        .iter()
        .any(|m| line.contains(m))
        .then_some(LineKind::ServerReady)
}

/// Classify one output line against [`SHAPES`]; unmatched lines are `Text`.
pub fn classify(line: &str) -> LineKind {
    for (name, matcher) in SHAPES {
        if let Some(kind) = matcher(line) {
            tracing::trace!(shape = *name, "classified output line");
            return kind;
        }
    }
    LineKind::Text
}

/// Extract a progress sample from a readout line, or `None` if the line has no readout.
pub fn parse(line: &str) -> Option<ProgressSample> {
    let caps = READOUT.captures(line)?;
    let bytes_done = caps.get(1)?.as_str().to_string();
    let bytes_total = caps.get(2)?.as_str().to_string();
    let percent = caps.get(3)?.as_str().parse::<f64>().ok()?.floor() as u32;
    let rate = caps
        .get(4)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_RATE.to_string());

    let mut eta = String::new();
    for (idx, unit) in [(5, 'h'), (6, 'm'), (7, 's')] {
        if let Some(m) = caps.get(idx) {
            eta.push_str(m.as_str());
            eta.push(unit);
        }
    }
    if eta.is_empty() {
        eta = UNKNOWN_ETA.to_string();
    }

    Some(ProgressSample {
        bytes_done,
        bytes_total,
        percent,
        rate,
        eta,
    })
}

/// True if the line carries one of the downloader's "already present" phrases.
pub fn is_already_satisfied(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    SATISFIED_PHRASES.iter().any(|p| lower.contains(p))
}
