//! Status-line classification for job logs.
//!
//! Jobs report progress as free text, so each class carries an ordered rule
//! table. Rules are tried top to bottom and the first match wins; every table
//! keeps the order progress, phase announcements, success, failure.

use std::sync::LazyLock;

use regex::Regex;

use super::JobClass;

static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\S)\s+Provisioning progress:\s*\((\d+)/(\d+)\)")
        .expect("progress regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionProgress {
    pub marker: char,
    pub done: u32,
    pub total: u32,
}

impl ProvisionProgress {
    pub fn parse(line: &str) -> Option<Self> {
        let captures = PROGRESS_LINE.captures(line)?;
        let marker = captures.get(1)?.as_str().chars().next()?;
        let done = captures.get(2)?.as_str().parse().ok()?;
        let total = captures.get(3)?.as_str().parse().ok()?;
        Some(Self {
            marker,
            done,
            total,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.done >= self.total
    }

    pub fn label(&self) -> String {
        format!(
            "{} Provisioning containers ({}/{})",
            self.marker, self.done, self.total
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Progress(ProvisionProgress),
    /// Informational status update; no state change.
    Phase(&'static str),
    Complete(&'static str),
    /// `fatal` failures end the job; others only recolor the status.
    Fail { label: &'static str, fatal: bool },
}

#[derive(Debug, Clone, Copy)]
enum Matcher {
    ProgressLine,
    /// Case-insensitive substring match against any needle.
    AnyOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Progress,
    Phase(&'static str),
    Complete(&'static str),
    Fail { label: &'static str, fatal: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    matcher: Matcher,
    outcome: Outcome,
}

impl Rule {
    fn apply(&self, line: &str, lower: &str) -> Option<Transition> {
        match self.matcher {
            Matcher::ProgressLine => ProvisionProgress::parse(line).map(Transition::Progress),
            Matcher::AnyOf(needles) => {
                if !needles.iter().any(|needle| lower.contains(needle)) {
                    return None;
                }
                match self.outcome {
                    Outcome::Progress => None,
                    Outcome::Phase(label) => Some(Transition::Phase(label)),
                    Outcome::Complete(label) => Some(Transition::Complete(label)),
                    Outcome::Fail { label, fatal } => Some(Transition::Fail { label, fatal }),
                }
            }
        }
    }
}

const PROGRESS: Rule = Rule {
    matcher: Matcher::ProgressLine,
    outcome: Outcome::Progress,
};

const fn phase(needles: &'static [&'static str], label: &'static str) -> Rule {
    Rule {
        matcher: Matcher::AnyOf(needles),
        outcome: Outcome::Phase(label),
    }
}

const fn complete(needles: &'static [&'static str], label: &'static str) -> Rule {
    Rule {
        matcher: Matcher::AnyOf(needles),
        outcome: Outcome::Complete(label),
    }
}

const fn fail(needles: &'static [&'static str], label: &'static str, fatal: bool) -> Rule {
    Rule {
        matcher: Matcher::AnyOf(needles),
        outcome: Outcome::Fail { label, fatal },
    }
}

static UPLOAD_RULES: [Rule; 6] = [
    PROGRESS,
    phase(
        &["creating new competition", "creating competition record"],
        "Creating competition records...",
    ),
    phase(&["generating ssh keypair"], "Generating SSH credentials..."),
    phase(
        &["creating container templates", "provisioning container"],
        "Provisioning containers...",
    ),
    complete(
        &[
            "successfully created competition",
            "provisioning completed successfully",
        ],
        "Provisioning complete",
    ),
    fail(&["error", "failed"], "Provisioning encountered errors", true),
];

// "error:" lines show up as chatter during a redeploy that still succeeds,
// so only the explicit phrase ends the job.
static REDEPLOY_RULES: [Rule; 5] = [
    PROGRESS,
    phase(&["redeploy job started"], "Redeploy in progress..."),
    complete(&["redeploy completed"], "Redeploy complete"),
    fail(&["redeploy failed"], "Redeploy failed", true),
    fail(&["error:"], "Redeploy failed", false),
];

static TEARDOWN_RULES: [Rule; 4] = [
    PROGRESS,
    phase(&["destroying competition"], "Destroying competition..."),
    complete(
        &["torn down successfully", "teardown completed"],
        "Competition destroyed",
    ),
    fail(&["error", "failed"], "Teardown failed", true),
];

pub fn rules(class: JobClass) -> &'static [Rule] {
    match class {
        JobClass::Upload => &UPLOAD_RULES,
        JobClass::Redeploy => &REDEPLOY_RULES,
        JobClass::Teardown => &TEARDOWN_RULES,
    }
}

pub fn classify(class: JobClass, line: &str) -> Option<Transition> {
    if line.trim().is_empty() {
        return None;
    }
    let lower = line.to_lowercase();
    rules(class).iter().find_map(|rule| rule.apply(line, &lower))
}
