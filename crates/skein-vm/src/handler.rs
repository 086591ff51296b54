//! The dialogue handler contract.

use crate::machine::OptionsResume;

/// Result type for handler callbacks. An `Err` aborts the run.
pub type HandlerResult = Result<(), String>;

/// Sink for dialogue events and lifecycle callbacks.
///
/// Within a single run, callbacks are delivered in program order and never
/// concurrently. Lines and options carry string-table ids, not resolved
/// text; the handler owns localization.
///
/// Only the three event methods are required. Lifecycle callbacks default
/// to doing nothing so small handlers implement exactly what they observe.
pub trait DialogueHandler {
    /// A line of dialogue should be shown. `line` is a string-table id.
    fn line(&mut self, line: &str) -> HandlerResult;

    /// A command should be executed by the embedder.
    fn command(&mut self, command: &str) -> HandlerResult;

    /// The user must choose between `options` (string-table ids of their
    /// display lines). The implementation must arrange for
    /// [`OptionsResume::select`] to be called exactly once before the
    /// machine steps again; blocking inside this callback until the choice
    /// arrives is the supported asynchronous deployment.
    fn options(&mut self, options: &[String], resume: OptionsResume<'_>) -> HandlerResult;

    /// Execution entered the named node.
    fn node_start(&mut self, _node: &str) -> HandlerResult {
        Ok(())
    }

    /// Execution left the named node.
    fn node_complete(&mut self, _node: &str) -> HandlerResult {
        Ok(())
    }

    /// The lines the entered node can deliver, in code order. A hint for
    /// preloading localized assets.
    fn prepare_for_lines(&mut self, _lines: &[String]) -> HandlerResult {
        Ok(())
    }

    /// The run finished cleanly. Not delivered when a run aborts with an
    /// error.
    fn dialogue_complete(&mut self) -> HandlerResult {
        Ok(())
    }
}
