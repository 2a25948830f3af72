//! Format/style detection and instruction injection.
//!
//! Some clients write in a roleplay convention where actions are wrapped in
//! asterisks and speech in quotes. When recent user turns follow that
//! convention, a steering instruction is appended to the system message so
//! the model's output matches it. Orthogonal to compression: the instruction
//! is applied to whichever system message survives a pass.

use regex::Regex;
use skein_protocol::{ChatMessage, MessageContent, Role};

/// How many trailing user turns to scan for the convention.
const SCAN_USER_TURNS: usize = 5;

/// Severity of the injected instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatStrictness {
    Lenient,
    #[default]
    Standard,
    Strict,
}

impl FormatStrictness {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "lenient" => Some(Self::Lenient),
            "standard" => Some(Self::Standard),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}

/// Whether the conversation uses the convention, with one illustrative line.
#[derive(Debug, Clone, Default)]
pub struct StyleProfile {
    pub uses_convention: bool,
    pub example: Option<String>,
}

/// Detects the asterisk-action / quoted-speech convention in recent turns.
#[derive(Debug, Clone)]
pub struct StyleDetector {
    action_span: Regex,
    speech_span: Regex,
}

impl Default for StyleDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleDetector {
    pub fn new() -> Self {
        Self {
            action_span: Regex::new(r"\*[^*\n]+\*").expect("valid action regex"),
            speech_span: Regex::new(r#""[^"\n]+""#).expect("valid speech regex"),
        }
    }

    /// Scan the last few user turns; the convention holds when any scanned
    /// turn contains both an asterisk span and a quoted span.
    pub fn detect(&self, messages: &[ChatMessage]) -> StyleProfile {
        let recent_user_text = messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .take(SCAN_USER_TURNS)
            .map(|m| m.content.to_plaintext());

        for text in recent_user_text {
            if self.action_span.is_match(&text) && self.speech_span.is_match(&text) {
                let example = text
                    .lines()
                    .find(|line| self.action_span.is_match(line) && self.speech_span.is_match(line))
                    .map(|line| line.trim().to_string());
                return StyleProfile {
                    uses_convention: true,
                    example,
                };
            }
        }
        StyleProfile::default()
    }
}

/// Render the steering instruction for a detected style.
pub fn build_instruction(style: &StyleProfile, strictness: FormatStrictness) -> String {
    let severity = match strictness {
        FormatStrictness::Lenient => "Where natural, format",
        FormatStrictness::Standard => "Format",
        FormatStrictness::Strict => "You must format",
    };

    let mut instruction = format!(
        "{} your replies in the conversation's convention: wrap physical \
         actions in *asterisks* and spoken dialogue in \"quotes\".",
        severity
    );
    if let Some(example) = &style.example {
        instruction.push_str(&format!(" Example from the conversation: {example}"));
    }
    instruction
}

/// Append the instruction to the first system message, creating one at the
/// front if the conversation has none.
pub fn apply_style_instruction(messages: &mut Vec<ChatMessage>, instruction: &str) {
    match messages.iter_mut().find(|m| m.role == Role::System) {
        Some(system) => {
            let mut text = system.content.to_plaintext();
            text.push_str("\n\n");
            text.push_str(instruction);
            system.content = MessageContent::Text(text);
        }
        None => messages.insert(0, ChatMessage::system(instruction)),
    }
}
