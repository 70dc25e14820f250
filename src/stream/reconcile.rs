/// What the terminal must do to show a newly observed message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderAction {
    /// Print the suffix right after what is already on screen.
    AppendSuffix(String),
    /// Blank `erase_width` columns with a carriage-return redraw, then print `text`.
    RedrawLine { erase_width: usize, text: String },
    Unchanged,
}

/// Compare two observations of the same message.
///
/// A strict extension prints only the new tail. A shorter text redraws the
/// line. Anything else (equal text, or a longer text that does not extend
/// `previous`) prints nothing; the divergent case drops the new text on the
/// floor, matching the long-standing client behavior.
pub fn reconcile(previous: &str, current: &str) -> RenderAction {
    if current.len() > previous.len() && current.starts_with(previous) {
        RenderAction::AppendSuffix(current[previous.len()..].to_owned())
    } else if !previous.is_empty() && current.len() < previous.len() {
        RenderAction::RedrawLine {
            erase_width: previous.chars().count(),
            text: current.to_owned(),
        }
    } else {
        RenderAction::Unchanged
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnPhase {
    #[default]
    Idle,
    Streaming,
    Finalized,
}

/// Last full text seen for the message being streamed in this turn.
#[derive(Debug, Default)]
pub struct ReconcilerState {
    last_known: String,
    phase: TurnPhase,
}

impl ReconcilerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile `current` against the last observation, then remember it.
    pub fn observe(&mut self, current: &str) -> RenderAction {
        let action = reconcile(&self.last_known, current);
        self.last_known.clear();
        self.last_known.push_str(current);
        self.phase = TurnPhase::Streaming;
        action
    }

    /// Reconcile `last_known + delta`, extending the stored text in place.
    pub fn observe_append(&mut self, delta: &str) -> RenderAction {
        self.phase = TurnPhase::Streaming;
        if delta.is_empty() {
            return RenderAction::Unchanged;
        }
        self.last_known.push_str(delta);
        RenderAction::AppendSuffix(delta.to_owned())
    }

    /// Close the turn. The next observation starts a fresh message.
    pub fn finalize(&mut self) {
        self.last_known.clear();
        self.phase = TurnPhase::Finalized;
    }

    pub fn last_known(&self) -> &str {
        &self.last_known
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_text_is_appended_whole() {
        assert_eq!(reconcile("", "Hello"), RenderAction::AppendSuffix("Hello".into()));
    }

    #[test]
    fn empty_to_empty_is_unchanged() {
        assert_eq!(reconcile("", ""), RenderAction::Unchanged);
    }

    #[test]
    fn redraw_width_counts_characters() {
        assert_eq!(
            reconcile("héllo", "h"),
            RenderAction::RedrawLine {
                erase_width: 5,
                text: "h".into()
            }
        );
    }

    #[test]
    fn phases_follow_the_turn() {
        let mut state = ReconcilerState::new();
        assert_eq!(state.phase(), TurnPhase::Idle);
        state.observe("a");
        assert_eq!(state.phase(), TurnPhase::Streaming);
        state.finalize();
        assert_eq!(state.phase(), TurnPhase::Finalized);
        assert_eq!(state.last_known(), "");
    }

    #[test]
    fn appended_delta_extends_in_place() {
        let mut state = ReconcilerState::new();
        state.observe("Hel");
        assert_eq!(state.observe_append("lo"), RenderAction::AppendSuffix("lo".into()));
        assert_eq!(state.observe_append(""), RenderAction::Unchanged);
        assert_eq!(state.last_known(), "Hello");
        assert_eq!(state.phase(), TurnPhase::Streaming);
    }
}
