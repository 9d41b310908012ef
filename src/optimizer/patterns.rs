//! Deterministic prompt-improvement rules.
//!
//! Each [`Pattern`] pairs a predicate ("this prompt is missing X") with a
//! transform that adds X. Every transform leaves behind the marker its own
//! predicate looks for, so [`apply_patterns`] reaches a fixed point after
//! one pass.

/// A cheap, local rewrite rule.
#[derive(Clone, Copy)]
pub struct Pattern {
    pub name: &'static str,
    /// True when the rule should fire on the given text.
    pub predicate: fn(&str) -> bool,
    pub transform: fn(&str) -> String,
    /// Rough score gain observed for this rule, in (0, 1).
    pub expected_improvement: f64,
}

/// The fixed rule set, applied in declaration order.
pub static PATTERNS: [Pattern; 4] = [
    Pattern {
        name: "role_framing",
        predicate: lacks_role,
        transform: add_role,
        expected_improvement: 0.05,
    },
    Pattern {
        name: "step_by_step",
        predicate: lacks_steps,
        transform: add_steps,
        expected_improvement: 0.15,
    },
    Pattern {
        name: "explicit_constraints",
        predicate: lacks_constraints,
        transform: add_constraints,
        expected_improvement: 0.10,
    },
    Pattern {
        name: "output_format",
        predicate: lacks_output_format,
        transform: add_output_format,
        expected_improvement: 0.10,
    },
];

/// Runs every pattern whose predicate holds against the progressively
/// rewritten text. Returns the final text and the names that fired.
pub fn apply_patterns(text: &str) -> (String, Vec<&'static str>) {
    PATTERNS.iter().fold(
        (text.to_string(), Vec::new()),
        |(current, mut applied), pattern| {
            if (pattern.predicate)(&current) {
                applied.push(pattern.name);
                ((pattern.transform)(&current), applied)
            } else {
                (current, applied)
            }
        },
    )
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    let lower = text.to_lowercase();
    needles.iter().any(|needle| lower.contains(needle))
}

/// True when some line starts like `1.` or `2)`.
pub(crate) fn has_numbered_list(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim_start();
        let digits = line.chars().take_while(char::is_ascii_digit).count();
        digits > 0 && matches!(line[digits..].chars().next(), Some('.') | Some(')'))
    })
}

fn lacks_role(text: &str) -> bool {
    !contains_any(text, &["you are", "act as"])
}

fn add_role(text: &str) -> String {
    format!("You are an expert assistant.\n\n{}", text.trim())
}

fn lacks_steps(text: &str) -> bool {
    !contains_any(text, &["step by step", "step-by-step"]) && !has_numbered_list(text)
}

fn add_steps(text: &str) -> String {
    format!(
        "{}\n\nWork through this step by step:\n\
         1. Restate the goal and identify what is being asked.\n\
         2. Plan the approach before producing the answer.\n\
         3. Carry out the plan and check the result against the goal.",
        text.trim_end()
    )
}

fn lacks_constraints(text: &str) -> bool {
    !contains_any(text, &["constraint", "requirement", "must "])
}

fn add_constraints(text: &str) -> String {
    format!(
        "{}\n\nConstraints:\n\
         - Stay focused on the task as stated.\n\
         - State any assumption you make explicitly.",
        text.trim_end()
    )
}

fn lacks_output_format(text: &str) -> bool {
    !contains_any(
        text,
        &["output format", "format:", "formatted as", "respond with", "output:"],
    )
}

fn add_output_format(text: &str) -> String {
    format!(
        "{}\n\nOutput format: a short summary first, followed by the full answer \
         in clearly separated sections.",
        text.trim_end()
    )
}
