//! Filename sanitization for per-model and synthesis output files.
//!
//! Replaces `/ \ : * ? " ' < > |` with `-` rather than stripping to
//! alphanumerics, since stripping is not injective (`"gpt-4"` and
//! `"gpt*4"` would collide).

const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '\'', '<', '>', '|'];

/// Replace every reserved character with `-`. Idempotent:
/// `sanitize(sanitize(s)) == sanitize(s)` because `-` is not itself reserved.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED.contains(&c) { '-' } else { c })
        .collect()
}

/// Check that sanitizing every name in `names` produces no collisions.
/// Returns the list of sanitized names that collided with the allocated
/// index set, or `Ok(())` if the mapping is injective over this input.
pub fn check_injective<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Result<(), String> {
    let mut seen = std::collections::HashMap::new();
    for name in names {
        let sanitized = sanitize(name);
        if let Some(prev) = seen.insert(sanitized.clone(), name) {
            return Err(format!(
                "model names '{prev}' and '{name}' both sanitize to '{sanitized}'"
            ));
        }
    }
    Ok(())
}

pub fn model_filename(model: &str, ext: &str) -> String {
    format!("{}.{}", sanitize(model), ext)
}

pub fn synthesis_filename(model: &str, ext: &str) -> String {
    format!("{}-synthesis.{}", sanitize(model), ext)
}
