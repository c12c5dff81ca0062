//! Runtime chat options and outbound command construction.
//!
//! The controller keeps one mutable snapshot of the user-adjustable
//! settings; `/config` edits it and sends the resulting `config` command.

use crate::config::Config;
use chatvox_protocol::ClientCommand;
use tracing::warn;

/// Fallback for an empty or unparseable top-k value.
pub const DEFAULT_KB_TOPK: u32 = 4;

/// The user-adjustable settings sent with a `config` command.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatOptions {
    pub provider: String,
    pub model: Option<String>,
    pub asr: String,
    pub tts: String,
    pub kb: bool,
    pub kb_topk: u32,
}

impl ChatOptions {
    /// Seeds the snapshot from the startup configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider: config.provider.clone(),
            model: config.model.clone(),
            asr: config.asr.clone(),
            tts: config.tts.clone(),
            kb: config.kb,
            kb_topk: config.kb_topk,
        }
    }

    /// Applies one `key=value` pair from a `/config` line.
    ///
    /// Unknown keys are rejected so a typo does not silently apply nothing.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "provider" => self.provider = value.to_string(),
            "model" => {
                self.model = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "asr" => self.asr = value.to_string(),
            "tts" => self.tts = value.to_string(),
            "kb" => {
                self.kb = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" => false,
                    other => return Err(format!("'{other}' is not a boolean")),
                }
            }
            "topk" | "kb_topk" => self.kb_topk = parse_topk(value),
            other => return Err(format!("unknown option '{other}'")),
        }
        Ok(())
    }

    /// Builds the `config` command from the current snapshot.
    pub fn to_command(&self) -> ClientCommand {
        ClientCommand::Config {
            provider: self.provider.clone(),
            model: self.model.clone().filter(|m| !m.is_empty()),
            asr: self.asr.clone(),
            tts: self.tts.clone(),
            kb: self.kb,
            kb_topk: self.kb_topk,
        }
    }

    /// One-line human-readable summary for the transcript.
    pub fn summary(&self) -> String {
        format!(
            "provider={} model={} asr={} tts={} kb={} topk={}",
            self.provider,
            self.model.as_deref().unwrap_or("(default)"),
            self.asr,
            self.tts,
            if self.kb { "on" } else { "off" },
            self.kb_topk,
        )
    }
}

/// Parses a top-k value, falling back to the default on empty or
/// non-numeric input. The field is strongly typed on the wire, so an
/// unparseable value is replaced rather than transmitted.
pub fn parse_topk(raw: &str) -> u32 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_KB_TOPK;
    }
    match trimmed.parse::<u32>() {
        Ok(n) => n,
        Err(_) => {
            warn!(input = %trimmed, "top-k is not a number, using default");
            DEFAULT_KB_TOPK
        }
    }
}

/// Turns one typed line into a `user_text` command.
///
/// Whitespace-only input produces nothing, so empty sends are suppressed
/// before they reach the wire.
pub fn text_command(input: &str) -> Option<ClientCommand> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }
    Some(ClientCommand::UserText {
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ChatOptions {
        ChatOptions {
            provider: "aliyun".into(),
            model: None,
            asr: "faster_whisper".into(),
            tts: "pyttsx3".into(),
            kb: false,
            kb_topk: 4,
        }
    }

    #[test]
    fn nonempty_text_becomes_exactly_one_command() {
        assert_eq!(
            text_command("  hello there "),
            Some(ClientCommand::UserText {
                text: "hello there".into()
            })
        );
    }

    #[test]
    fn whitespace_only_text_is_suppressed() {
        assert_eq!(text_command(""), None);
        assert_eq!(text_command("   "), None);
        assert_eq!(text_command("\t\n"), None);
    }

    #[test]
    fn topk_empty_input_uses_default() {
        assert_eq!(parse_topk(""), 4);
        assert_eq!(parse_topk("   "), 4);
    }

    #[test]
    fn topk_numeric_input_is_used() {
        assert_eq!(parse_topk("7"), 7);
        assert_eq!(parse_topk(" 12 "), 12);
    }

    #[test]
    fn topk_non_numeric_input_falls_back_to_default() {
        assert_eq!(parse_topk("abc"), 4);
        assert_eq!(parse_topk("-3"), 4);
        assert_eq!(parse_topk("4.5"), 4);
    }

    #[test]
    fn apply_updates_known_keys() {
        let mut opts = options();
        opts.apply("provider", "openai").unwrap();
        opts.apply("model", "gpt-4o").unwrap();
        opts.apply("kb", "on").unwrap();
        opts.apply("topk", "6").unwrap();
        assert_eq!(opts.provider, "openai");
        assert_eq!(opts.model.as_deref(), Some("gpt-4o"));
        assert!(opts.kb);
        assert_eq!(opts.kb_topk, 6);
    }

    #[test]
    fn apply_rejects_unknown_keys_and_bad_booleans() {
        let mut opts = options();
        assert!(opts.apply("voice", "alloy").is_err());
        assert!(opts.apply("kb", "maybe").is_err());
        // A failed apply leaves the snapshot untouched.
        assert_eq!(opts, options());
    }

    #[test]
    fn blank_model_clears_the_override() {
        let mut opts = options();
        opts.apply("model", "gpt-4o").unwrap();
        opts.apply("model", "").unwrap();
        assert_eq!(opts.model, None);
        match opts.to_command() {
            ClientCommand::Config { model, .. } => assert!(model.is_none()),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
