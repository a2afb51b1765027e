//! Chat prompt formatting.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplate {
    /// `<|im_start|>role ... <|im_end|>` turns, ending with an open
    /// assistant turn.
    #[default]
    ChatMl,
    /// System and user text separated by blank lines.
    Plain,
}

impl ChatTemplate {
    /// Formats a single-turn conversation. An empty system prompt is omitted.
    pub fn format(&self, system_prompt: &str, prompt: &str) -> String {
        let system_prompt = system_prompt.trim();
        match self {
            Self::ChatMl => {
                let mut out = String::with_capacity(system_prompt.len() + prompt.len() + 96);
                if !system_prompt.is_empty() {
                    out.push_str("<|im_start|>system\n");
                    out.push_str(system_prompt);
                    out.push_str("<|im_end|>\n");
                }
                out.push_str("<|im_start|>user\n");
                out.push_str(prompt.trim());
                out.push_str("<|im_end|>\n<|im_start|>assistant\n");
                out
            }
            Self::Plain if system_prompt.is_empty() => format!("{}\n\n", prompt.trim()),
            Self::Plain => format!("{}\n\n{}\n\n", system_prompt, prompt.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chatml() {
        let text = ChatTemplate::ChatMl.format("Be brief.", "Summarise.");
        assert_eq!(
            text,
            "<|im_start|>system\nBe brief.<|im_end|>\n<|im_start|>user\nSummarise.<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_empty_system_prompt_omitted() {
        let text = ChatTemplate::ChatMl.format("  ", "Hi");
        assert!(!text.contains("system"));
        assert_eq!(ChatTemplate::Plain.format("", "Hi"), "Hi\n\n");
    }
}
