//! Fixed HTML shown in place of generated content when a turn cannot run.

use blackbox_core::GenerationError;

/// Present in every empty-input fragment.
pub const EMPTY_INPUT_MARKER: &str = "No interaction data provided.";

pub fn configuration(api_key_env: &str) -> String {
    format!(
        "<div class=\"p-4 text-red-400 bg-red-900/50 rounded-md\">\
         <p class=\"font-bold text-lg\">Configuration Error</p>\
         <p class=\"mt-2\">The {env} is not configured. Please set the {env} environment variable.</p>\
         </div>",
        env = escape(api_key_env)
    )
}

pub fn empty_input() -> String {
    format!(
        "<div class=\"p-4 text-orange-400 bg-orange-900/50 rounded-md\">\
         <p class=\"font-bold text-lg\">{EMPTY_INPUT_MARKER}</p>\
         </div>"
    )
}

pub fn transport(detail: &str) -> String {
    let mut message = String::from("An error occurred while generating content.");
    if !detail.trim().is_empty() {
        message.push_str(" Details: ");
        message.push_str(&escape(detail.trim()));
    }
    format!(
        "<div class=\"p-4 text-red-400 bg-red-900/50 rounded-md\">\
         <p class=\"font-bold text-lg\">Error Generating Content</p>\
         <p class=\"mt-2\">{message}</p>\
         <p class=\"mt-1\">This may be due to an API key issue, network problem, or misconfiguration. Run with RUST_LOG=warn for details.</p>\
         </div>"
    )
}

/// The fragment for `error`.
pub fn for_error(error: &GenerationError, api_key_env: &str) -> String {
    match error {
        GenerationError::Configuration => configuration(api_key_env),
        GenerationError::EmptyInput => empty_input(),
        GenerationError::Transport(detail) | GenerationError::Decode(detail) => transport(detail),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_details_are_escaped() {
        let html = transport("bad <gateway>");
        assert!(html.contains("Details: bad &lt;gateway&gt;"));
        assert!(!transport("").contains("Details"));
    }

    #[test]
    fn configuration_names_the_variable() {
        assert!(configuration("GEMINI_KEY").contains("set the GEMINI_KEY environment variable"));
    }
}
