//! Rule table that turns one line of engine console output into at most one event.
//!
//! Rules are evaluated in table order and the first match wins. The default
//! table is: completion markers, fetch progress, sampling progress, generic
//! progress bars, warnings, errors, informational keywords.

use std::sync::LazyLock;

use regex::Regex;

static FETCHING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Fetching \d+ files:\s*(\d{1,3})%").expect("valid regex"));
static SAMPLING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Sampling:\s*(\d{1,3})%").expect("valid regex"));
static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})%").expect("valid regex"));

const COMPLETION_MARKERS: &[&str] = &[
    "forcing EOS token",
    "alignment_stream_analyzer",
    "WARNING:chatterbox.models.t3.inference.alignment_stream_analyzer",
];

const WARNING_KEYWORDS: &[&str] = &[
    "WARNING:",
    "Warning:",
    "warning:",
    "FutureWarning:",
    "UserWarning:",
    "deprecated",
    "deprecation",
];

const ERROR_KEYWORDS: &[&str] = &[
    "ERROR:",
    "Error:",
    "error:",
    "CRITICAL:",
    "Critical:",
    "critical:",
    "Exception:",
    "Traceback",
    "Failed:",
    "failed:",
];

const INFO_KEYWORDS: &[&str] = &[
    "loaded",
    "Loading",
    "loading",
    "Model",
    "model",
    "Initializing",
    "Generating",
    "generating",
    "Complete",
    "complete",
    "Finished",
];

/// Glyphs a rendered progress bar must contain besides a percentage.
const BAR_GLYPHS: &[&str] = &["|", "█"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Fetching,
    Sampling,
    GenericBar,
}

impl ProgressPhase {
    pub fn label(self, percent: u8) -> String {
        match self {
            ProgressPhase::Fetching => format!("Downloading files: {percent}%"),
            ProgressPhase::Sampling => format!("Generating speech: {percent}%"),
            ProgressPhase::GenericBar => format!("Processing: {percent}%"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    Progress {
        phase: ProgressPhase,
        percent: u8,
        label: String,
    },
    Warning {
        text: String,
    },
    Error {
        text: String,
    },
    InfoLog {
        text: String,
    },
    GenerationComplete,
}

/// Named channel an event is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleChannel {
    Progress,
    Warning,
    Error,
    Completion,
    Log,
}

impl ClassifiedEvent {
    pub fn channel(&self) -> ConsoleChannel {
        match self {
            ClassifiedEvent::Progress { .. } => ConsoleChannel::Progress,
            ClassifiedEvent::Warning { .. } => ConsoleChannel::Warning,
            ClassifiedEvent::Error { .. } => ConsoleChannel::Error,
            ClassifiedEvent::InfoLog { .. } => ConsoleChannel::Log,
            ClassifiedEvent::GenerationComplete => ConsoleChannel::Completion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Completion,
    Progress(ProgressPhase),
    Warning,
    Error,
    Info,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    /// Line contains any of the keywords.
    AnyKeyword(&'static [&'static str]),
    /// First capture group of `pattern` is a percentage in 0..=100 and the
    /// line contains every string in `requires`.
    Percent {
        pattern: Regex,
        requires: &'static [&'static str],
    },
}

enum Match {
    Plain,
    Percent(u8),
}

impl Matcher {
    fn find(&self, line: &str) -> Option<Match> {
        match self {
            Matcher::AnyKeyword(keywords) => keywords
                .iter()
                .any(|keyword| line.contains(keyword))
                .then_some(Match::Plain),
            Matcher::Percent { pattern, requires } => {
                if !requires.iter().all(|glyph| line.contains(glyph)) {
                    return None;
                }
                let captures = pattern.captures(line)?;
                let percent: u8 = captures.get(1)?.as_str().parse().ok()?;
                (percent <= 100).then_some(Match::Percent(percent))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: RuleKind,
    pub matcher: Matcher,
}

impl Rule {
    pub fn new(kind: RuleKind, matcher: Matcher) -> Self {
        Self { kind, matcher }
    }

    fn apply(&self, line: &str) -> Option<ClassifiedEvent> {
        let found = self.matcher.find(line)?;
        let text = || line.to_string();
        let event = match (self.kind, found) {
            (RuleKind::Completion, _) => ClassifiedEvent::GenerationComplete,
            (RuleKind::Progress(phase), Match::Percent(percent)) => ClassifiedEvent::Progress {
                phase,
                percent,
                label: phase.label(percent),
            },
            // A progress rule needs a percentage to produce anything.
            (RuleKind::Progress(_), Match::Plain) => return None,
            (RuleKind::Warning, _) => ClassifiedEvent::Warning { text: text() },
            (RuleKind::Error, _) => ClassifiedEvent::Error { text: text() },
            (RuleKind::Info, _) => ClassifiedEvent::InfoLog { text: text() },
        };
        Some(event)
    }
}

#[derive(Debug, Clone)]
pub struct LineClassifier {
    rules: Vec<Rule>,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::with_rules(default_rules())
    }
}

impl LineClassifier {
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify one line. Trailing whitespace is ignored; blank lines yield nothing.
    pub fn classify(&self, line: &str) -> Option<ClassifiedEvent> {
        let line = line.trim_end();
        if line.trim_start().is_empty() {
            return None;
        }
        self.rules.iter().find_map(|rule| rule.apply(line))
    }
}

fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new(RuleKind::Completion, Matcher::AnyKeyword(COMPLETION_MARKERS)),
        Rule::new(
            RuleKind::Progress(ProgressPhase::Fetching),
            percent_matcher(&FETCHING_RE, &[]),
        ),
        Rule::new(
            RuleKind::Progress(ProgressPhase::Sampling),
            percent_matcher(&SAMPLING_RE, &[]),
        ),
        Rule::new(
            RuleKind::Progress(ProgressPhase::GenericBar),
            percent_matcher(&PERCENT_RE, BAR_GLYPHS),
        ),
        Rule::new(RuleKind::Warning, Matcher::AnyKeyword(WARNING_KEYWORDS)),
        Rule::new(RuleKind::Error, Matcher::AnyKeyword(ERROR_KEYWORDS)),
        Rule::new(RuleKind::Info, Matcher::AnyKeyword(INFO_KEYWORDS)),
    ]
}

fn percent_matcher(pattern: &Regex, requires: &'static [&'static str]) -> Matcher {
    Matcher::Percent {
        pattern: pattern.clone(),
        requires,
    }
}
