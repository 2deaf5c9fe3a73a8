//! Single-turn chat templates for servers that only expose raw completion.

use serde::{Deserialize, Serialize};

/// Turn marker that opens the assistant reply in the zephyr template.
/// Generated text sometimes leaks it back.
pub const ASSISTANT_MARKER: &str = "<|assistant|>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTemplate {
    /// `<|user|>` / `<|assistant|>` turns closed by `</s>` (TinyLlama chat, Zephyr).
    Zephyr,
    /// `<|im_start|>role ... <|im_end|>` turns.
    Chatml,
}

impl ChatTemplate {
    /// Render `prompt` as one user turn followed by an open assistant turn.
    pub fn render_user_turn(&self, prompt: &str) -> String {
        match self {
            ChatTemplate::Zephyr => format!("<|user|>\n{prompt}</s>\n{ASSISTANT_MARKER}\n"),
            ChatTemplate::Chatml => {
                format!("<|im_start|>user\n{prompt}<|im_end|>\n<|im_start|>assistant\n")
            }
        }
    }

    /// Tokens that end the assistant turn.
    pub fn stop_sequences(&self) -> &'static [&'static str] {
        match self {
            ChatTemplate::Zephyr => &["</s>", "<|user|>"],
            ChatTemplate::Chatml => &["<|im_end|>"],
        }
    }
}
