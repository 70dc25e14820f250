use gcli::stream::{reconcile, ReconcilerState, RenderAction, TurnPhase};

const SAMPLES: [&str; 6] = ["", "a", "Hello", "Hello world", "héllo wörld", "line one\nline two"];

#[test]
fn extension_appends_exactly_the_suffix() {
    for prev in SAMPLES {
        for suffix in ["!", " more", "ü", "\n- item"] {
            let current = format!("{prev}{suffix}");
            assert_eq!(
                reconcile(prev, &current),
                RenderAction::AppendSuffix(suffix.to_owned()),
                "{prev:?} + {suffix:?}"
            );
        }
    }
}

#[test]
fn shorter_text_redraws() {
    for prev in SAMPLES.iter().filter(|s| !s.is_empty()) {
        for end in (0..prev.len()).filter(|&end| prev.is_char_boundary(end)) {
            let shorter = &prev[..end];
            assert_eq!(
                reconcile(prev, shorter),
                RenderAction::RedrawLine {
                    erase_width: prev.chars().count(),
                    text: shorter.to_owned()
                }
            );
        }
    }
    assert!(matches!(
        reconcile("Hello world", "Bye"),
        RenderAction::RedrawLine { .. }
    ));
}

#[test]
fn repeating_a_text_prints_nothing() {
    for text in SAMPLES {
        assert_eq!(reconcile(text, text), RenderAction::Unchanged);
    }

    let mut state = ReconcilerState::new();
    assert_eq!(state.observe("same"), RenderAction::AppendSuffix("same".into()));
    assert_eq!(state.observe("same"), RenderAction::Unchanged);
    assert_eq!(state.observe("same"), RenderAction::Unchanged);
}

#[test]
fn divergent_longer_text_is_silently_dropped() {
    assert_eq!(reconcile("Hello", "Goodbye!"), RenderAction::Unchanged);

    // The state still moves on, so the next extension is relative to the new text.
    let mut state = ReconcilerState::new();
    state.observe("Hello");
    assert_eq!(state.observe("Goodbye!"), RenderAction::Unchanged);
    assert_eq!(state.last_known(), "Goodbye!");
    assert_eq!(
        state.observe("Goodbye!!"),
        RenderAction::AppendSuffix("!".into())
    );
}

#[test]
fn finalized_turn_starts_the_next_one_empty() {
    let mut state = ReconcilerState::new();
    state.observe("partial");
    state.observe("partial answer");
    state.finalize();
    assert_eq!(state.phase(), TurnPhase::Finalized);
    assert_eq!(state.last_known(), "");

    assert_eq!(
        state.observe("next"),
        RenderAction::AppendSuffix("next".into())
    );
}
