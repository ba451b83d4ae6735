//! Asks the user on the terminal whether a plugin may have what it requests.

use beacon_plugins::protocol::PluginMetadata;
use beacon_plugins::{Decision, PermissionPrompt};
use beacon_sandbox::PluginPermissions;
use tracing::warn;

use crate::terminal::Terminal;

const PROMPT_TARGET: &str = "beacon::prompt";

/// [`PermissionPrompt`] that lists the requested capabilities and reads a
/// yes/no answer. Anything but an explicit yes denies.
#[derive(Clone)]
pub struct TerminalPrompt {
    terminal: Terminal,
}

impl TerminalPrompt {
    /// Prompts on `terminal`.
    #[must_use]
    pub const fn new(terminal: Terminal) -> Self {
        Self { terminal }
    }
}

/// Interprets one line of user input.
#[must_use]
pub fn parse_answer(answer: &str) -> Decision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Decision::Approve,
        _ => Decision::Deny,
    }
}

impl PermissionPrompt for TerminalPrompt {
    fn decide(
        &self,
        metadata: &PluginMetadata,
        _requested: &PluginPermissions,
        description: &[String],
    ) -> Decision {
        let mut text = format!(
            "Plugin '{}' ({}) requests:",
            metadata.name(),
            metadata.id()
        );
        for line in description {
            text.push('\n');
            text.push_str(line);
        }
        let answer = self
            .terminal
            .say(&text)
            .and_then(|()| self.terminal.ask("Allow? [y/N] "));
        match answer {
            Ok(Some(reply)) => parse_answer(&reply),
            Ok(None) => Decision::Deny,
            Err(error) => {
                warn!(target: PROMPT_TARGET, plugin = metadata.id(), %error, "prompt failed; denying");
                Decision::Deny
            }
        }
    }
}
