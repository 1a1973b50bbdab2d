//! System prompt construction.

/// Persona used when the configuration does not supply one.
pub const DEFAULT_PERSONA: &str = "You are a concise and accurate coding assistant.";

/// Build the system message for the current tool availability.
///
/// With no tools the model is told not to attempt calls; otherwise the
/// available names are listed so it knows what it may invoke.
pub fn system_prompt(base: &str, tool_names: &[String]) -> String {
    let base = if base.trim().is_empty() { DEFAULT_PERSONA } else { base.trim() };
    if tool_names.is_empty() {
        return format!("{base}\n\nNo tools are available in this session. Answer directly.");
    }

    let mut prompt = format!("{base}\n\nYou can call these tools when they help answer the user:\n");
    for name in tool_names {
        prompt.push_str("- ");
        prompt.push_str(name);
        prompt.push('\n');
    }
    prompt.push_str(
        "Call tools one step at a time and use their results. \
         Commands that need the user's approval go through confirm_exec.",
    );
    prompt
}
