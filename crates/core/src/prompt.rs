//! Pure prompt transforms applied before a job reaches the engine.

/// Appended to the prompt when a character reference is in play.
pub const CHARACTER_BACKGROUND_HINT: &str = "white background, simple background";

/// Appended to the negative prompt alongside [`CHARACTER_BACKGROUND_HINT`].
pub const CHARACTER_NEGATIVE_HINT: &str = "complex background, detailed background";

/// Append each trigger word missing from `prompt`.
///
/// Presence is a case-insensitive substring check against the original
/// prompt.  Each distinct word is appended at most once, in the order
/// given.
pub fn merge_trigger_words(prompt: &str, triggers: &[&str]) -> String {
    let lowered = prompt.to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    let mut out = prompt.to_string();

    for word in triggers {
        let key = word.to_lowercase();
        if key.is_empty() || lowered.contains(&key) || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        append_clause(&mut out, word);
    }
    out
}

/// Steer character references toward a plain backdrop.
///
/// Returns the updated `(prompt, negative_prompt)`; hints already present
/// are not repeated.
pub fn apply_background_hint(prompt: &str, negative_prompt: &str) -> (String, String) {
    let mut prompt = prompt.to_string();
    let mut negative = negative_prompt.to_string();

    if !prompt.to_lowercase().contains(CHARACTER_BACKGROUND_HINT) {
        append_clause(&mut prompt, CHARACTER_BACKGROUND_HINT);
    }
    if !negative.to_lowercase().contains(CHARACTER_NEGATIVE_HINT) {
        append_clause(&mut negative, CHARACTER_NEGATIVE_HINT);
    }
    (prompt, negative)
}

fn append_clause(target: &mut String, clause: &str) {
    if !target.trim().is_empty() {
        target.push_str(", ");
    }
    target.push_str(clause);
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- merge_trigger_words ----------------------------------------------

    #[test]
    fn appends_missing_words_in_order() {
        let out = merge_trigger_words("a girl on a bridge", &["anime style", "detailed"]);
        assert_eq!(out, "a girl on a bridge, anime style, detailed");
    }

    #[test]
    fn presence_check_ignores_case() {
        let out = merge_trigger_words("Anime Style portrait", &["anime style", "detailed"]);
        assert_eq!(out, "Anime Style portrait, detailed");
    }

    #[test]
    fn duplicates_are_appended_once() {
        let out = merge_trigger_words("city", &["neon", "NEON", "neon"]);
        assert_eq!(out, "city, neon");
    }

    #[test]
    fn no_triggers_leaves_prompt_untouched() {
        assert_eq!(merge_trigger_words("city", &[]), "city");
    }

    // -- apply_background_hint --------------------------------------------

    #[test]
    fn hint_appends_to_both_prompts() {
        let (p, n) = apply_background_hint("knight", "");
        assert_eq!(p, "knight, white background, simple background");
        assert_eq!(n, "complex background, detailed background");
    }

    #[test]
    fn hint_is_not_repeated() {
        let (p, n) = apply_background_hint(
            "knight, white background, simple background",
            "blurry, complex background, detailed background",
        );
        assert_eq!(p, "knight, white background, simple background");
        assert_eq!(n, "blurry, complex background, detailed background");
    }
}
