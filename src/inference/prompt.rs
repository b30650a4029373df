//! Chat prompt formatting
//!
//! The engine takes raw text. Chat-tuned models expect their conversation
//! markup around it; this builds the Zephyr-style markup used by TinyLlama
//! chat models.

const SYSTEM_OPEN: &str = "<|system|>";
const USER_OPEN: &str = "<|user|>";
const ASSISTANT_OPEN: &str = "<|assistant|>";
const TURN_END: &str = "</s>";

/// Wraps `user` (and an optional system instruction) in chat markup, ending
/// with an open assistant turn for the model to complete.
pub fn format_chat_prompt(system: Option<&str>, user: &str) -> String {
    let mut prompt = String::new();
    if let Some(system) = system {
        prompt.push_str(SYSTEM_OPEN);
        prompt.push('\n');
        prompt.push_str(system);
        prompt.push_str(TURN_END);
        prompt.push('\n');
    }
    prompt.push_str(USER_OPEN);
    prompt.push('\n');
    prompt.push_str(user);
    prompt.push_str(TURN_END);
    prompt.push('\n');
    prompt.push_str(ASSISTANT_OPEN);
    prompt.push('\n');
    prompt
}
