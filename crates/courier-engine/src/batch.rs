//! Completion marker for autonomous batch runs.
//!
//! A driver loop re-invokes the engine on the same session until the reply
//! carries a `BATCH_COMPLETE: <summary>` line or the iteration cap is hit.
//! The marker handling lives here; the loop itself is plain control flow in
//! the embedding application.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a `BATCH_COMPLETE: <summary>` line anywhere in a reply.
pub static COMPLETE_MARKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^BATCH_COMPLETE:[ \t]*(.*)$").expect("pattern is valid"));

/// Whether the reply declares the batch complete.
pub fn is_complete(text: &str) -> bool {
    COMPLETE_MARKER_PATTERN.is_match(text)
}

/// The summary following the marker, if present.
pub fn completion_summary(text: &str) -> Option<&str> {
    COMPLETE_MARKER_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Remove the marker from a reply, leaving surrounding lines intact.
pub fn strip_complete_marker(text: &str) -> String {
    if !is_complete(text) {
        return text.to_string();
    }
    COMPLETE_MARKER_PATTERN
        .replace(text, "")
        .trim_end()
        .to_string()
}

/// Progress of one autonomous batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchLoopState {
    pub max_iterations: u32,
    pub current_iteration: u32,
    pub completed: bool,
}

impl BatchLoopState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_matches_and_captures_summary() {
        let text = "Done!\nBATCH_COMPLETE: finished the task";
        assert!(is_complete(text));
        assert_eq!(completion_summary(text), Some("finished the task"));
    }

    #[test]
    fn marker_matches_in_multiline_reply() {
        let text = "Some output here.\nMore work done.\nBATCH_COMPLETE: all done with the refactor\n";
        assert_eq!(
            completion_summary(text),
            Some("all done with the refactor")
        );
    }

    #[test]
    fn marker_in_middle_still_counts() {
        assert!(is_complete("Done!\nBATCH_COMPLETE: finished\nMore text"));
    }

    #[test]
    fn plain_text_is_not_complete() {
        assert!(!is_complete("Still working on it..."));
    }

    #[test]
    fn strip_removes_trailing_marker_line() {
        let result = strip_complete_marker("Here is the answer\nBATCH_COMPLETE: done");
        assert_eq!(result, "Here is the answer");
    }

    #[test]
    fn strip_preserves_surrounding_lines() {
        let result = strip_complete_marker("Before\nBATCH_COMPLETE: summary here\nAfter");
        assert_eq!(result, "Before\n\nAfter");
    }

    #[test]
    fn strip_without_marker_is_identity() {
        assert_eq!(strip_complete_marker("Just regular text"), "Just regular text");
    }

    #[test]
    fn loop_state_starts_fresh() {
        let state = BatchLoopState::new(3);
        assert_eq!(state.max_iterations, 3);
        assert_eq!(state.current_iteration, 0);
        assert!(!state.completed);
    }
}
