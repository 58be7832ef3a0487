//! System prompt for the Aria persona
//!
//! Replies are read aloud by the speech synthesizer, so the prompt steers the
//! model toward short conversational text with no markup.

/// Base prompt establishing the assistant's persona
const BASE_PROMPT: &str = r"You are Aria, a friendly voice assistant having a spoken conversation with the user.

Your replies are converted to speech and played aloud. Keep them short and conversational, usually one to three sentences. Do not use markdown, bullet lists, code blocks, emoji, or URLs, since none of these can be spoken naturally.

If you did not understand the user, say so briefly and ask them to repeat.";

/// Build the system prompt for a session speaking `language`.
pub fn build_system_prompt(language: &str) -> String {
    let mut prompt = String::from(BASE_PROMPT);
    let language = language.trim();
    if !language.is_empty() && !language.eq_ignore_ascii_case("en") {
        prompt.push_str(&format!(
            "\n\nAlways reply in the language with code \"{language}\"."
        ));
    }
    prompt
}
