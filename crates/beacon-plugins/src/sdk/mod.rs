//! Unit-side runtime for writing sandboxed plugins.
//!
//! A plugin crate implements [`Plugin`] and calls [`run`] from `main`. The
//! runtime declares the plugin's metadata, answers `search` requests with
//! tokenised results, and runs the action behind a token when the host sends
//! `activate`. Actions never leave the unit; the host only ever sees tokens
//! of the form `<search id>_<index>`.
//!
//! ```no_run
//! use beacon_plugins::protocol::PluginMetadata;
//! use beacon_plugins::sdk::{Plugin, PluginContext, PluginResult, run};
//!
//! #[derive(Default)]
//! struct Echo;
//!
//! impl Plugin for Echo {
//!     fn metadata() -> PluginMetadata {
//!         PluginMetadata::new("echo", "Echo").with_trigger("echo")
//!     }
//!
//!     fn search(&mut self, query: &str, _: &mut PluginContext) -> Vec<PluginResult> {
//!         let text = query.to_owned();
//!         vec![PluginResult::new(query, "Copy to clipboard", 1.0).with_action(
//!             move |ctx: &mut PluginContext| {
//!                 ctx.copy(text.clone());
//!                 Ok(())
//!             },
//!         )]
//!     }
//! }
//!
//! fn main() {
//!     if run::<Echo>().is_err() {
//!         std::process::exit(1);
//!     }
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use crate::launcher::METADATA_FLAG;
use crate::protocol::{
    HostMessage, LogLevel, PluginMetadata, ProtocolError, UnitMessage, WireResult, read_message,
    write_message,
};

/// Number of searches whose result actions stay activatable.
pub const RETAINED_SEARCHES: usize = 16;

/// Outcome of a result action.
pub type ActionResult = Result<(), Box<dyn StdError + Send + Sync>>;

type Action = Rc<dyn Fn(&mut PluginContext) -> ActionResult>;

/// A plugin served by [`serve`].
pub trait Plugin: Default {
    /// The plugin's declaration, including the capabilities it needs.
    fn metadata() -> PluginMetadata;

    /// Answers one query; the trigger has already been stripped.
    fn search(&mut self, query: &str, ctx: &mut PluginContext) -> Vec<PluginResult>;

    /// Called after the action behind `token`, if any, has run.
    fn on_activate(&mut self, _token: &str, _ctx: &mut PluginContext) {}
}

/// Requests a plugin can make of the host while handling a message.
#[derive(Debug, Default)]
pub struct PluginContext {
    outbox: Vec<UnitMessage>,
}

impl PluginContext {
    /// Asks the host to place `text` on the clipboard.
    pub fn copy(&mut self, text: impl Into<String>) {
        self.outbox.push(UnitMessage::Copy { text: text.into() });
    }

    /// Sends a diagnostic line to the host log.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.outbox.push(UnitMessage::Log {
            level,
            message: message.into(),
        });
    }

    fn flush<W: Write + ?Sized>(&mut self, writer: &mut W) -> Result<(), ProtocolError> {
        for message in self.outbox.drain(..) {
            write_message(writer, &message)?;
        }
        Ok(())
    }
}

/// A result as produced inside the unit.
pub struct PluginResult {
    /// Primary text.
    pub title: String,
    /// Secondary text.
    pub subtitle: String,
    /// Relevance; higher wins.
    pub score: f64,
    /// Optional icon reference.
    pub icon: Option<String>,
    action: Option<Action>,
}

impl PluginResult {
    /// Creates a result with no action.
    #[must_use]
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>, score: f64) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            score,
            icon: None,
            action: None,
        }
    }

    /// Sets the icon reference.
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Sets the action run when the user picks this result.
    #[must_use]
    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut PluginContext) -> ActionResult + 'static,
    {
        self.action = Some(Rc::new(action));
        self
    }
}

impl fmt::Debug for PluginResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginResult")
            .field("title", &self.title)
            .field("subtitle", &self.subtitle)
            .field("score", &self.score)
            .field("icon", &self.icon)
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Actions for the most recent searches, keyed by token.
#[derive(Default)]
struct ActionTable {
    generations: VecDeque<Vec<String>>,
    actions: HashMap<String, Option<Action>>,
}

impl ActionTable {
    fn retain(&mut self, id: u64, results: Vec<PluginResult>) -> Vec<WireResult> {
        let mut tokens = Vec::with_capacity(results.len());
        let wire = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                let token = format!("{id}_{index}");
                self.actions.insert(token.clone(), result.action);
                tokens.push(token.clone());
                WireResult {
                    title: result.title,
                    subtitle: result.subtitle,
                    score: result.score,
                    result_token: token,
                    icon: result.icon,
                }
            })
            .collect();
        self.generations.push_back(tokens);
        while self.generations.len() > RETAINED_SEARCHES {
            if let Some(expired) = self.generations.pop_front() {
                for token in expired {
                    self.actions.remove(&token);
                }
            }
        }
        wire
    }

    /// `None` for unknown or expired tokens, `Some(None)` for results
    /// without an action.
    fn get(&self, token: &str) -> Option<Option<Action>> {
        self.actions.get(token).cloned()
    }
}

/// Serves `P` over `reader` and `writer` until the host closes the channel.
///
/// With [`METADATA_FLAG`] among `args`, only the `ready` declaration is
/// written.
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the channel fails. A closed channel is
/// a normal shutdown and returns `Ok(())`.
pub fn serve<P, R, W>(args: &[String], reader: &mut R, writer: &mut W) -> Result<(), ProtocolError>
where
    P: Plugin,
    R: BufRead,
    W: Write + ?Sized,
{
    write_message(writer, &UnitMessage::Ready {
        metadata: P::metadata(),
    })?;
    if args.iter().any(|arg| arg == METADATA_FLAG) {
        return Ok(());
    }

    let mut plugin = P::default();
    let mut table = ActionTable::default();
    loop {
        let message = match read_message::<_, HostMessage>(reader) {
            Ok(message) => message,
            Err(ProtocolError::Closed) => return Ok(()),
            Err(error @ ProtocolError::Io(_)) => return Err(error),
            Err(other) => {
                write_message(writer, &UnitMessage::Log {
                    level: LogLevel::Error,
                    message: format!("ignoring host message: {other}"),
                })?;
                continue;
            }
        };
        let mut ctx = PluginContext::default();
        let reply = match message {
            HostMessage::Search { id, query } => {
                let results = plugin.search(&query, &mut ctx);
                UnitMessage::Results {
                    id,
                    results: table.retain(id, results),
                }
            }
            HostMessage::Activate { id } => {
                match table.get(&id) {
                    Some(Some(action)) => {
                        if let Err(failure) = action(&mut ctx) {
                            ctx.log(LogLevel::Error, format!("action {id} failed: {failure}"));
                        }
                    }
                    Some(None) => {}
                    None => ctx.log(LogLevel::Error, format!("unknown or expired result {id}")),
                }
                plugin.on_activate(&id, &mut ctx);
                UnitMessage::Activated { id }
            }
        };
        ctx.flush(writer)?;
        write_message(writer, &reply)?;
    }
}

/// Serves `P` over the process's standard streams.
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the channel fails.
pub fn run<P: Plugin>() -> Result<(), ProtocolError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve::<P, _, _>(&args, &mut stdin.lock(), &mut stdout.lock())
}
