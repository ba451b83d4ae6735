//! Line-oriented front end: every line is a query unless it starts with `:`.

use std::io;

use beacon_plugins::{SearchOrchestrator, SearchResult};
use tracing::debug;

use crate::host::Host;
use crate::terminal::Terminal;

const SHELL_TARGET: &str = "beacon::shell";
const PROMPT: &str = "> ";
const USAGE: &str =
    "commands: :N activate result N, :install <locator>, :remove <locator>, :reload, :quit";

/// One parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Search for the line as typed.
    Query(&'a str),
    /// Activate the result with this 1-based number.
    Activate(usize),
    /// Add a locator to the registry and reload.
    Install(&'a str),
    /// Remove a locator from the registry and reload.
    Remove(&'a str),
    /// Rebuild the plugin set from the registry.
    Reload,
    /// Leave the shell.
    Quit,
    /// A `:` command that was not understood.
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parses one input line. Query text is kept verbatim, including
    /// trailing spaces, since routing depends on them.
    ///
    /// ```
    /// use beacon::shell::Command;
    ///
    /// assert_eq!(Command::parse("snip "), Command::Query("snip "));
    /// assert_eq!(Command::parse(":2"), Command::Activate(2));
    /// assert_eq!(Command::parse(":install /opt/p"), Command::Install("/opt/p"));
    /// ```
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        let Some(command) = line.strip_prefix(':') else {
            return Self::Query(line);
        };
        let trimmed = command.trim();
        let (word, argument) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(word, rest)| (word, rest.trim()));
        match (word, argument) {
            ("quit" | "q", "") => Self::Quit,
            ("reload", "") => Self::Reload,
            ("install", locator) if !locator.is_empty() => Self::Install(locator),
            ("remove", locator) if !locator.is_empty() => Self::Remove(locator),
            (number, "") => number
                .parse()
                .map_or(Self::Unknown(line), Self::Activate),
            _ => Self::Unknown(line),
        }
    }
}

/// Interactive session over a [`Host`].
pub struct Shell {
    host: Host,
    orchestrator: SearchOrchestrator,
    terminal: Terminal,
    shown: Vec<SearchResult>,
}

impl Shell {
    /// Loads the plugin set and prepares a session on `terminal`.
    #[must_use]
    pub fn start(host: Host, terminal: Terminal) -> Self {
        let loaded = host.load();
        Self {
            orchestrator: SearchOrchestrator::new(loaded.sources),
            host,
            terminal,
            shown: Vec::new(),
        }
    }

    /// The orchestrator serving this session.
    #[must_use]
    pub const fn orchestrator(&self) -> &SearchOrchestrator {
        &self.orchestrator
    }

    /// Reads lines until `:quit` or the end of input.
    ///
    /// # Errors
    ///
    /// Returns the terminal's I/O error.
    pub fn run(&mut self) -> io::Result<()> {
        while let Some(line) = self.terminal.ask(PROMPT)? {
            if !self.handle(&line)? {
                break;
            }
        }
        Ok(())
    }

    /// Handles one line; returns `false` when the session should end.
    ///
    /// # Errors
    ///
    /// Returns the terminal's I/O error.
    pub fn handle(&mut self, line: &str) -> io::Result<bool> {
        match Command::parse(line) {
            Command::Query(query) => self.search(query)?,
            Command::Activate(number) => self.activate(number)?,
            Command::Install(locator) => {
                let outcome = self.host.registry().install(locator);
                self.report_edit(locator, outcome, "installed", "already installed")?;
            }
            Command::Remove(locator) => {
                let outcome = self.host.registry().uninstall(locator);
                self.report_edit(locator, outcome, "removed", "not installed")?;
            }
            Command::Reload => self.reload()?,
            Command::Quit => return Ok(false),
            Command::Unknown(_) => self.terminal.say(USAGE)?,
        }
        Ok(true)
    }

    fn search(&mut self, query: &str) -> io::Result<()> {
        let Some(results) = self.orchestrator.search(query) else {
            debug!(target: SHELL_TARGET, query, "superseded");
            return Ok(());
        };
        if results.is_empty() {
            self.terminal.say("no results")?;
        }
        for (index, result) in results.iter().enumerate() {
            let number = index.saturating_add(1);
            if result.subtitle.is_empty() {
                self.terminal.say(&format!("{number:>2}. {}", result.title))?;
            } else {
                self.terminal
                    .say(&format!("{number:>2}. {}  ({})", result.title, result.subtitle))?;
            }
        }
        self.shown = results;
        Ok(())
    }

    fn activate(&self, number: usize) -> io::Result<()> {
        match number.checked_sub(1).and_then(|index| self.shown.get(index)) {
            Some(result) => {
                debug!(target: SHELL_TARGET, number, title = %result.title, "activating");
                result.activate();
                Ok(())
            }
            None => self.terminal.say(&format!("no result {number}")),
        }
    }

    fn report_edit<E: std::fmt::Display>(
        &mut self,
        locator: &str,
        outcome: Result<bool, E>,
        changed: &str,
        unchanged: &str,
    ) -> io::Result<()> {
        match outcome {
            Ok(true) => {
                self.terminal.say(&format!("{changed} {locator}"))?;
                self.reload()
            }
            Ok(false) => self.terminal.say(&format!("{locator} {unchanged}")),
            Err(error) => self.terminal.say(&format!("registry update failed: {error}")),
        }
    }

    fn reload(&mut self) -> io::Result<()> {
        self.shown.clear();
        let loaded = self.host.load();
        let count = loaded.sources.len();
        self.orchestrator.replace_sources(loaded.sources);
        self.terminal.say(&format!("{count} sources active"))
    }
}
