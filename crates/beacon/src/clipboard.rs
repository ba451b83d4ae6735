//! Clipboard requests from plugins, surfaced on the terminal.

use std::sync::{Mutex, PoisonError};

use beacon_plugins::HostServices;
use tracing::{info, warn};

use crate::terminal::Terminal;

const CLIPBOARD_TARGET: &str = "beacon::clipboard";

/// [`HostServices`] that keeps the most recent copy and announces it.
pub struct TerminalClipboard {
    terminal: Terminal,
    last: Mutex<Option<String>>,
}

impl TerminalClipboard {
    /// Announces copies on `terminal`.
    #[must_use]
    pub const fn new(terminal: Terminal) -> Self {
        Self {
            terminal,
            last: Mutex::new(None),
        }
    }

    /// The most recently copied text.
    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HostServices for TerminalClipboard {
    fn copy_to_clipboard(&self, plugin: &str, text: &str) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.to_owned());
        info!(target: CLIPBOARD_TARGET, plugin, bytes = text.len(), "copied");
        if let Err(error) = self.terminal.say(&format!("[{plugin}] copied: {text}")) {
            warn!(target: CLIPBOARD_TARGET, plugin, %error, "could not announce copy");
        }
    }
}
