//! Default catalog of guided exercises.
//!
//! This module provides the built-in exercise wizards: their pages, the
//! fields each page collects, and the default answer shape.

use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::HashSet;

static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog_internal);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Build a fresh, owned copy of the built-in exercises
///
/// Callers that only read should use `get_default_catalog()`.
pub fn build_default_catalog() -> Catalog {
    build_default_catalog_internal()
}

fn build_default_catalog_internal() -> Catalog {
    Catalog {
        exercises: vec![
            cognitive_reframing(),
            good_things_journal(),
            self_awareness(),
        ],
    }
}

// ============================================================================
// Step builders
// ============================================================================

fn info(id: &str, title: &str, prompt: &str, progress: u32) -> StepDefinition {
    StepDefinition {
        id: id.into(),
        title: title.into(),
        prompt: prompt.into(),
        inputs: vec![],
        requirement: Requirement::None,
        progress,
        suspends_timing: false,
        terminal: false,
    }
}

fn completion(title: &str, prompt: &str, progress: u32) -> StepDefinition {
    StepDefinition {
        suspends_timing: true,
        terminal: true,
        ..info("completion", title, prompt, progress)
    }
}

fn text_input(field: &str) -> StepInput {
    StepInput::Text {
        field: field.into(),
    }
}

fn multi_select(field: &str, options: &[&str]) -> StepInput {
    StepInput::MultiSelect {
        field: field.into(),
        options: options.iter().map(|s| s.to_string()).collect(),
        allow_custom: true,
    }
}

fn single_select(field: &str, options: &[&str]) -> StepInput {
    StepInput::SingleSelect {
        field: field.into(),
        options: options.iter().map(|s| s.to_string()).collect(),
    }
}

fn score(field: &str) -> StepInput {
    StepInput::Score {
        field: field.into(),
        min: 1,
        max: 10,
    }
}

/// A page with one required free-text field
fn text_step(id: &str, title: &str, prompt: &str, field: &str, progress: u32) -> StepDefinition {
    StepDefinition {
        inputs: vec![text_input(field)],
        requirement: Requirement::Text(field.into()),
        ..info(id, title, prompt, progress)
    }
}

fn blank() -> AnswerValue {
    AnswerValue::text("")
}

fn none_selected() -> AnswerValue {
    AnswerValue::Selection(vec![])
}

// ============================================================================
// Cognitive reframing (A-B-C-D)
// ============================================================================

const REFRAME_EMOTIONS: &[&str] = &[
    "tense", "angry", "wronged", "anxious", "irritated", "sad", "afraid", "worried",
];
const REFRAME_BODY_REACTIONS: &[&str] = &[
    "racing heart",
    "tight chest",
    "trembling",
    "headache",
    "stomach ache",
    "cold sweat",
    "tense muscles",
];
const REFRAME_BEHAVIORS: &[&str] = &[
    "wanted to run away",
    "went silent",
    "shouted",
    "cried",
    "overate",
    "procrastinated",
    "shut myself off",
];
const INSPIRATION_CARDS: &[&str] = &[
    "What evidence suggests the thought might not be true? What suggests it might be?",
    "What is the worst and the best way this could turn out, and how likely is each?",
    "If my best friend were in this situation, what would I tell them?",
    "Looking back a year from now, how might I see this differently?",
    "Does this thought help me? Does it bring me closer to the life I want?",
];
const MICRO_ACTIONS: &[&str] = &["talk", "breathe", "move", "write"];

fn cognitive_reframing() -> ExerciseDefinition {
    let steps = vec![
        info(
            "intro",
            "Cognitive Reframing",
            "Events rarely upset us on their own; our reading of them does. \
             Walk through A (event), B (thought), C (reaction) and D (a new perspective).",
            0,
        ),
        info(
            "breathing",
            "Take a breath",
            "Breathe in slowly, then breathe out for a little longer.",
            0,
        ),
        text_step(
            "event",
            "A: What happened?",
            "Describe the situation in a sentence or two.",
            "event",
            1,
        ),
        text_step(
            "thought",
            "B: What went through your mind?",
            "Write down the first thought you had.",
            "thought",
            2,
        ),
        StepDefinition {
            inputs: vec![
                multi_select("emotions", REFRAME_EMOTIONS),
                multi_select("body_reactions", REFRAME_BODY_REACTIONS),
                multi_select("behaviors", REFRAME_BEHAVIORS),
            ],
            requirement: Requirement::AnyOf(vec![
                Requirement::Selection("emotions".into()),
                Requirement::Selection("body_reactions".into()),
                Requirement::Selection("behaviors".into()),
            ]),
            ..info(
                "reaction",
                "C: How did you react?",
                "Pick any feelings, body reactions or behaviors you noticed.",
                3,
            )
        },
        StepDefinition {
            inputs: vec![
                single_select("selected_card", INSPIRATION_CARDS),
                text_input("new_perspective"),
            ],
            requirement: Requirement::Text("new_perspective".into()),
            ..info(
                "reframe",
                "D: A new perspective",
                "Use a card for inspiration, then write a more balanced way to see it.",
                4,
            )
        },
        StepDefinition {
            inputs: vec![
                single_select("selected_action", MICRO_ACTIONS),
                text_input("custom_action"),
            ],
            requirement: Requirement::AnyOf(vec![
                Requirement::Chosen("selected_action".into()),
                Requirement::Text("custom_action".into()),
            ]),
            ..info(
                "action",
                "One small action",
                "Choose a small step you can take now, or write your own.",
                5,
            )
        },
        StepDefinition {
            inputs: vec![score("post_score")],
            ..info(
                "assessment",
                "How much has the feeling eased?",
                "1 = not at all, 10 = completely.",
                6,
            )
        },
        StepDefinition {
            suspends_timing: true,
            ..info("review", "Review", "Look back over what you wrote.", 7)
        },
        completion("Well done", "You finished today's cognitive reframing.", 8),
    ];

    let defaults = Answers::new()
        .with("event", blank())
        .with("thought", blank())
        .with("emotions", none_selected())
        .with("body_reactions", none_selected())
        .with("behaviors", none_selected())
        .with("selected_card", AnswerValue::Empty)
        .with("new_perspective", blank())
        .with("selected_action", AnswerValue::Empty)
        .with("custom_action", blank())
        .with("post_score", AnswerValue::Number(5))
        .with("timestamp", AnswerValue::Number(0));

    ExerciseDefinition {
        kind: ExerciseKind::CognitiveReframing,
        title: "Cognitive Reframing".into(),
        aliases: vec!["reframe".into(), "reframing".into(), "cognitive-reframing".into()],
        steps,
        total_steps: 7,
        defaults,
        autosave_interval_secs: 10,
    }
}

// ============================================================================
// Good things journal
// ============================================================================

const GOOD_THINGS_EMOTIONS: &[&str] = &[
    "happy", "calm", "content", "grateful", "confident", "hopeful", "loved", "relaxed", "warm",
    "joyful", "light", "moved",
];

fn good_things_journal() -> ExerciseDefinition {
    let steps = vec![
        info(
            "intro",
            "Good Things Journal",
            "Noticing small good things trains attention toward what goes well.",
            0,
        ),
        text_step(
            "event",
            "What good thing happened today?",
            "A tasty breakfast, a blue sky, a kind message... anything counts.",
            "good_thing",
            1,
        ),
        StepDefinition {
            inputs: vec![multi_select("emotions", GOOD_THINGS_EMOTIONS)],
            requirement: Requirement::Selection("emotions".into()),
            ..info("emotion", "How did it feel?", "Pick one or more feelings.", 2)
        },
        text_step(
            "reason",
            "Why do you think it happened?",
            "Maybe you chose to notice it, or treated someone kindly.",
            "reason",
            3,
        ),
        StepDefinition {
            inputs: vec![score("post_score")],
            ..info("assessment", "How do you feel now?", "1 = low, 10 = great.", 4)
        },
        completion("Well done", "Your good thing is saved to your journal.", 5),
    ];

    let defaults = Answers::new()
        .with("good_thing", blank())
        .with("emotions", none_selected())
        .with("reason", blank())
        .with("post_score", AnswerValue::Number(8))
        .with("timestamp", AnswerValue::Number(0));

    ExerciseDefinition {
        kind: ExerciseKind::GoodThingsJournal,
        title: "Good Things Journal".into(),
        aliases: vec!["goodthings".into(), "good-things".into(), "journal".into()],
        steps,
        total_steps: 4,
        defaults,
        autosave_interval_secs: 10,
    }
}

// ============================================================================
// Self-awareness (legacy)
// ============================================================================

fn self_awareness() -> ExerciseDefinition {
    let form = |id: &str, title: &str, prompt: &str, fields: &[&str], progress: u32| {
        StepDefinition {
            inputs: fields.iter().map(|f| text_input(f)).collect(),
            ..info(id, title, prompt, progress)
        }
    };

    let steps = vec![
        info("welcome", "Self-Awareness", "Ready to start today's practice?", 0),
        info("greeting", "Welcome", "Glad you are here.", 1),
        info(
            "purpose",
            "Why this practice",
            "It helps you settle after mistakes and self-blame.",
            2,
        ),
        info("breathing", "Before we begin", "Take three deep breaths.", 3),
        info(
            "recall",
            "Remember a moment",
            "Recall a recent moment when you blamed or doubted yourself.",
            4,
        ),
        info(
            "dialogue",
            "A short dialogue",
            "A few questions will help you sort your thoughts.",
            5,
        ),
        form(
            "record",
            "Record that moment",
            "What happened, what did you think, how did you feel?",
            &["event", "thought", "mood"],
            6,
        ),
        form(
            "exploration",
            "Where did the thought come from?",
            "Where might it come from, is it valid, how does it affect you?",
            &["thought_origin", "thought_validity", "thought_impact"],
            7,
        ),
        form(
            "response",
            "Respond anew",
            "How could you answer this thought differently?",
            &["response_method", "new_response"],
            8,
        ),
        form(
            "reflection",
            "Reflection",
            "Having written all this, how do you feel now?",
            &["final_feeling"],
            9,
        ),
        completion("Well done", "You finished today's self-awareness practice.", 10),
    ];

    let defaults = [
        "event",
        "thought",
        "mood",
        "thought_origin",
        "thought_validity",
        "thought_impact",
        "response_method",
        "new_response",
        "final_feeling",
    ]
    .into_iter()
    .map(|f| (f, blank()))
    .collect();

    ExerciseDefinition {
        kind: ExerciseKind::SelfAwareness,
        title: "Self-Awareness".into(),
        aliases: vec!["self-awareness".into(), "awareness".into()],
        steps,
        total_steps: 11,
        defaults,
        autosave_interval_secs: 1,
    }
}

// ============================================================================
// Lookup and validation
// ============================================================================

impl Catalog {
    pub fn get(&self, kind: ExerciseKind) -> Option<&ExerciseDefinition> {
        self.exercises.iter().find(|d| d.kind == kind)
    }

    /// Resolve a route name to an exercise
    ///
    /// Matches the exercise label, any alias, or the title, ignoring case.
    pub fn resolve(&self, name: &str) -> Option<&ExerciseDefinition> {
        let needle = name.trim().to_lowercase();
        self.exercises.iter().find(|d| {
            d.label() == needle
                || d.title.to_lowercase() == needle
                || d.aliases.iter().any(|a| a.to_lowercase() == needle)
        })
    }

    /// Validate the catalog for consistency and completeness
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen_names = HashSet::new();

        for def in &self.exercises {
            let id = def.label();

            for name in std::iter::once(id).chain(def.aliases.iter().map(String::as_str)) {
                if !seen_names.insert(name.to_lowercase()) {
                    errors.push(format!("Exercise '{}': route name '{}' is ambiguous", id, name));
                }
            }

            if def.steps.is_empty() {
                errors.push(format!("Exercise '{}' has no steps", id));
                continue;
            }

            let terminal_count = def.steps.iter().filter(|s| s.terminal).count();
            if terminal_count != 1 {
                errors.push(format!(
                    "Exercise '{}' has {} terminal steps, expected 1",
                    id, terminal_count
                ));
            }
            if !def.steps[def.last_index()].terminal {
                errors.push(format!("Exercise '{}': last step is not terminal", id));
            }

            let mut step_ids = HashSet::new();
            let mut last_progress = 0;
            for step in &def.steps {
                if !step_ids.insert(step.id.as_str()) {
                    errors.push(format!("Exercise '{}': duplicate step '{}'", id, step.id));
                }
                if step.progress < last_progress {
                    errors.push(format!(
                        "Exercise '{}': step '{}' goes back in progress ({} < {})",
                        id, step.id, step.progress, last_progress
                    ));
                }
                last_progress = step.progress;

                if !step.terminal && step.progress > def.total_steps {
                    errors.push(format!(
                        "Exercise '{}': step '{}' progress {} exceeds total {}",
                        id, step.id, step.progress, def.total_steps
                    ));
                }

                for field in step.requirement.fields() {
                    if !def.defaults.contains(field) {
                        errors.push(format!(
                            "Exercise '{}': step '{}' requires unknown field '{}'",
                            id, step.id, field
                        ));
                    }
                }

                for input in &step.inputs {
                    validate_input(def, step, input, &mut errors);
                }
            }
        }

        errors
    }
}

fn validate_input(
    def: &ExerciseDefinition,
    step: &StepDefinition,
    input: &StepInput,
    errors: &mut Vec<String>,
) {
    let id = def.label();
    let field = match input {
        StepInput::Info => return,
        StepInput::Text { field }
        | StepInput::MultiSelect { field, .. }
        | StepInput::SingleSelect { field, .. } => field,
        StepInput::Score { field, min, max } => {
            match def.defaults.get(field).and_then(AnswerValue::as_number) {
                Some(default) if default < *min || default > *max => errors.push(format!(
                    "Exercise '{}': default {} for '{}' outside {}..={}",
                    id, default, field, min, max
                )),
                Some(_) => {}
                None => errors.push(format!(
                    "Exercise '{}': score field '{}' has no numeric default",
                    id, field
                )),
            }
            field
        }
    };

    if !def.defaults.contains(field) {
        errors.push(format!(
            "Exercise '{}': step '{}' collects unknown field '{}'",
            id, step.id, field
        ));
    }
}
