//! Properties of frame routing into the session view.

use proptest::prelude::*;
use serde_json::json;

use modchat::protocol::decode_frame;
use modchat::SessionView;

#[derive(Debug, Clone)]
enum Wire {
    System(String),
    Message(String, String),
    Analysis(f64),
    Other(String),
}

impl Wire {
    fn to_json(&self) -> String {
        match self {
            Wire::System(text) => json!({"type": "system", "message": text, "timestamp": "t"}),
            Wire::Message(user, text) => {
                json!({"type": "message", "username": user, "message": text, "timestamp": "t"})
            }
            Wire::Analysis(score) => json!({
                "type": "analysis",
                "analysis": {
                    "toxicity": {"score": score, "is_toxic": *score > 0.5},
                    "intent": {"type": "statement", "confidence": 0.5},
                    "tone": {"type": "neutral", "confidence": 0.5}
                }
            }),
            Wire::Other(kind) => json!({"type": kind, "message": "ignored"}),
        }
        .to_string()
    }
}

fn wire() -> impl Strategy<Value = Wire> {
    prop_oneof![
        "[a-z ]{0,12}".prop_map(Wire::System),
        ("[a-z]{1,6}", "[ -~]{0,16}").prop_map(|(u, t)| Wire::Message(u, t)),
        (0.0f64..=1.0).prop_map(Wire::Analysis),
        "(typing|presence|pong)".prop_map(Wire::Other),
    ]
}

proptest! {
    #[test]
    fn log_holds_exactly_the_chat_and_system_frames_in_order(frames in prop::collection::vec(wire(), 0..40)) {
        let mut view = SessionView::new();
        view.begin("ana");
        for frame in &frames {
            let decoded = decode_frame(&frame.to_json()).unwrap();
            view.apply(decoded);
        }

        let expected: Vec<&str> = frames
            .iter()
            .filter_map(|f| match f {
                Wire::System(text) | Wire::Message(_, text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        let actual: Vec<&str> = view.log.iter().map(|e| e.text.as_str()).collect();
        prop_assert_eq!(actual, expected);

        let last_score = frames.iter().rev().find_map(|f| match f {
            Wire::Analysis(score) => Some(*score),
            _ => None,
        });
        let latest_score = view.latest.map(|l| l.analysis.toxicity.score);
        prop_assert_eq!(latest_score.is_some(), last_score.is_some());
        if let (Some(got), Some(want)) = (latest_score, last_score) {
            prop_assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn stale_epoch_frames_never_land(frames in prop::collection::vec(wire(), 1..20)) {
        let mut view = SessionView::new();
        let old = view.begin("ana");
        view.clear();
        for frame in &frames {
            let decoded = decode_frame(&frame.to_json()).unwrap();
            prop_assert!(view.apply_if_current(old, decoded).is_none());
        }
        prop_assert!(view.log.is_empty());
        prop_assert!(view.latest.is_none());
    }
}
