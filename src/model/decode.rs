use super::Generation;

/// Drop a leading copy of the prompt if the backend echoed it back
pub fn strip_prompt_echo<'a>(prompt: &str, text: &'a str) -> &'a str {
    if prompt.is_empty() {
        return text;
    }
    text.strip_prefix(prompt).unwrap_or(text)
}

/// Remove every occurrence of the given special-token markers.
/// Spacing around removed markers is left untouched.
pub fn strip_special_tokens(text: &str, special_tokens: &[String]) -> String {
    special_tokens
        .iter()
        .filter(|token| !token.is_empty())
        .fold(text.to_string(), |acc, token| acc.replace(token.as_str(), ""))
}

/// Newly generated text with special tokens removed
pub fn decode_generation(generation: &Generation, special_tokens: &[String]) -> String {
    let generated = strip_prompt_echo(&generation.prompt, &generation.text);
    strip_special_tokens(generated, special_tokens)
}
