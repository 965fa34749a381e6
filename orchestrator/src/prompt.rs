//! Prompt composition: the exact wrapping is part of the contract because
//! synthesis reuses the same shape with a `<model_outputs>` section
//! appended.

use crate::context::GatheredFile;
use crate::outcome::ModelOutcome;
use std::fmt::Write as _;

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// `<instructions>…</instructions><context><file path="…">…</file>…</context>`
pub fn compose(instructions: &str, files: &[GatheredFile]) -> String {
    let mut out = String::new();
    let _ = write!(out, "<instructions>{instructions}</instructions>");
    out.push_str("<context>");
    for file in files {
        let _ = write!(out, "<file path=\"{}\">", escape_attr(&file.path.display().to_string()));
        out.push_str(&file.content);
        out.push_str("</file>");
    }
    out.push_str("</context>");
    out
}

/// Same shape plus a `<model_outputs>` section containing each successful
/// model's content keyed by model name, in the original model order. Only
/// successes are included: synthesis reasons over what actually produced
/// output.
pub fn compose_synthesis(instructions: &str, files: &[GatheredFile], per_model: &[ModelOutcome]) -> String {
    let mut out = compose(instructions, files);
    out.push_str("<model_outputs>");
    for outcome in per_model {
        if let crate::outcome::Outcome::Success(success) = &outcome.outcome {
            let _ = write!(out, "<model name=\"{}\">", escape_attr(&outcome.model));
            out.push_str(&success.content);
            out.push_str("</model>");
        }
    }
    out.push_str("</model_outputs>");
    out
}
