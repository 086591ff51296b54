//! Scripted test plans for exercising dialogue programs.
//!
//! A test plan is a line-oriented script of the events a run is expected to
//! produce. `#` starts a comment; every other non-blank line is
//! `kind: contents`, whitespace-trimmed. Recognized kinds are `line`,
//! `option`, `select` and `command`; `select` carries the 1-based index of
//! the option to pick. [`TestPlan`] implements [`DialogueHandler`] and
//! fails the run on the first event that does not match the plan.

use std::io::BufRead;

use skein_core::StringTable;
use thiserror::Error;

use crate::handler::{DialogueHandler, HandlerResult};
use crate::machine::OptionsResume;

/// Kind of a test-plan step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    Line,
    Option,
    Select,
    Command,
}

impl StepKind {
    fn name(self) -> &'static str {
        match self {
            StepKind::Line => "line",
            StepKind::Option => "option",
            StepKind::Select => "select",
            StepKind::Command => "command",
        }
    }
}

/// A single expected event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestStep {
    pub kind: StepKind,
    pub contents: String,
}

/// Errors that can occur when reading a test plan.
#[derive(Debug, Error)]
pub enum TestPlanError {
    #[error("failed to read test plan: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("malformed test plan step {0:?}")]
    Malformed(String),

    #[error("unknown test plan step kind {0:?}")]
    UnknownKind(String),
}

/// Dialogue handler that checks each event against a plan.
///
/// Line and option ids are resolved to localized text through the plan's
/// copy of the string table before comparison; commands are compared
/// verbatim.
#[derive(Debug)]
pub struct TestPlan {
    steps: Vec<TestStep>,
    step: usize,
    dialogue_completed: bool,
    strings: StringTable,
}

impl TestPlan {
    /// Create a plan from already-parsed steps.
    pub fn new(steps: Vec<TestStep>, strings: StringTable) -> Self {
        Self {
            steps,
            step: 0,
            dialogue_completed: false,
            strings,
        }
    }

    /// Read a plan from its text form.
    pub fn parse(text: &str, strings: StringTable) -> Result<Self, TestPlanError> {
        let mut steps = Vec::new();
        for raw in text.lines() {
            if raw.starts_with('#') || raw.trim().is_empty() {
                continue;
            }
            let (kind, contents) = raw
                .split_once(':')
                .ok_or_else(|| TestPlanError::Malformed(raw.to_string()))?;
            let kind = match kind.trim() {
                "line" => StepKind::Line,
                "option" => StepKind::Option,
                "select" => StepKind::Select,
                "command" => StepKind::Command,
                other => return Err(TestPlanError::UnknownKind(other.to_string())),
            };
            steps.push(TestStep {
                kind,
                contents: contents.trim().to_string(),
            });
        }
        Ok(Self::new(steps, strings))
    }

    /// Read a plan from a reader.
    pub fn read(mut r: impl BufRead, strings: StringTable) -> Result<Self, TestPlanError> {
        let mut text = String::new();
        r.read_to_string(&mut text)?;
        Self::parse(&text, strings)
    }

    /// Check that every step was consumed and the dialogue completed.
    pub fn verify_complete(&self) -> Result<(), String> {
        if self.step != self.steps.len() {
            return Err(format!(
                "test plan incomplete: on step {} of {}",
                self.step,
                self.steps.len()
            ));
        }
        if !self.dialogue_completed {
            return Err("test plan did not observe dialogue completion".to_string());
        }
        Ok(())
    }

    /// Take the next step, requiring it to be of `want` kind.
    fn next_step(&mut self, want: StepKind) -> Result<TestStep, String> {
        let step = self
            .steps
            .get(self.step)
            .cloned()
            .ok_or_else(|| format!("got {} past the end of the plan", want.name()))?;
        if step.kind != want {
            return Err(format!(
                "got {}, plan wants {} {:?}",
                want.name(),
                step.kind.name(),
                step.contents
            ));
        }
        self.step += 1;
        Ok(step)
    }

    fn resolve(&self, id: &str) -> Result<String, String> {
        self.strings
            .get(id)
            .map(|row| row.text.clone())
            .ok_or_else(|| format!("no string {id:?} in string table"))
    }
}

impl DialogueHandler for TestPlan {
    fn line(&mut self, line: &str) -> HandlerResult {
        let step = self.next_step(StepKind::Line)?;
        let text = self.resolve(line)?;
        if text != step.contents {
            return Err(format!("got line {text:?}, want {:?}", step.contents));
        }
        Ok(())
    }

    fn command(&mut self, command: &str) -> HandlerResult {
        let step = self.next_step(StepKind::Command)?;
        if command != step.contents {
            return Err(format!("got command {command:?}, want {:?}", step.contents));
        }
        Ok(())
    }

    fn options(&mut self, options: &[String], resume: OptionsResume<'_>) -> HandlerResult {
        for id in options {
            let step = self.next_step(StepKind::Option)?;
            let text = self.resolve(id)?;
            if text != step.contents {
                return Err(format!("got option {text:?}, want {:?}", step.contents));
            }
        }
        let step = self.next_step(StepKind::Select)?;
        let n: usize = step
            .contents
            .parse()
            .map_err(|_| format!("bad select index {:?}", step.contents))?;
        if n == 0 {
            return Err("select indices are 1-based".to_string());
        }
        resume.select(n - 1).map_err(|e| e.to_string())
    }

    fn dialogue_complete(&mut self) -> HandlerResult {
        self.dialogue_completed = true;
        Ok(())
    }
}
