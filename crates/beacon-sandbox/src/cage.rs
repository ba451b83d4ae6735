//! Single-threaded trampoline that sandboxes one plugin unit.
//!
//! `birdcage` refuses to activate inside a multi-threaded process, and the
//! host runs reader threads for every live unit. The host therefore launches
//! the `beacon-cage` binary, which parses a [`CageInvocation`], activates the
//! sandbox for the requested [`ExecutionMode`], and spawns the unit with the
//! cage's own standard streams. The unit's exit code becomes the cage's.
//!
//! ```
//! use std::ffi::OsString;
//!
//! use beacon_sandbox::{CageInvocation, ExecutionMode};
//!
//! let invocation = CageInvocation::new(ExecutionMode::Probe { remote: false }, "/usr/bin/plugin")
//!     .arg("--beacon-metadata");
//! let argv = invocation.to_args().expect("grant serializes");
//! let parsed = CageInvocation::parse_from(
//!     std::iter::once(OsString::from("beacon-cage")).chain(argv),
//! )
//! .expect("arguments parse");
//! assert_eq!(parsed, invocation);
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use tracing::debug;

use crate::error::SandboxError;
use crate::mode::ExecutionMode;
use crate::permissions::PluginPermissions;
use crate::process::Stdio;
use crate::runtime::resolve_command;
use crate::sandbox::{Sandbox, SandboxCommand};

const CAGE_TARGET: &str = "beacon_sandbox::cage";

/// Exit code reported when the unit ended without one, e.g. on a signal.
pub const SIGNALLED_EXIT: i32 = 128;

/// Execution mode selector on the cage command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CageMode {
    /// Metadata probe with no capabilities.
    Probe,
    /// Long-lived unit with the granted capabilities.
    Execute,
}

/// Command line accepted by the `beacon-cage` binary.
#[derive(Debug, Parser)]
#[command(name = "beacon-cage", about = "Runs one plugin unit inside the sandbox")]
pub struct CageArgs {
    /// How the unit is being run.
    #[arg(long, value_enum)]
    pub mode: CageMode,
    /// The probe fetches a remote unit and needs networking.
    #[arg(long)]
    pub remote: bool,
    /// Capability grant for execute mode, as JSON.
    #[arg(long, default_value = "{}")]
    pub grant: String,
    /// Unit program followed by its arguments.
    #[arg(required = true, last = true)]
    pub command: Vec<OsString>,
}

/// Fully parsed request to run one unit under the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CageInvocation {
    mode: ExecutionMode,
    program: PathBuf,
    args: Vec<OsString>,
}

impl CageInvocation {
    /// Creates an invocation for `program` in `mode`.
    #[must_use]
    pub fn new(mode: ExecutionMode, program: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument passed to the unit.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments passed to the unit.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Execution mode requested for the unit.
    #[must_use]
    pub const fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// Unit program.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the unit.
    #[must_use]
    pub fn unit_args(&self) -> &[OsString] {
        &self.args
    }

    /// Renders the invocation as `beacon-cage` arguments, without `argv[0]`.
    pub fn to_args(&self) -> Result<Vec<OsString>, SandboxError> {
        let mut argv: Vec<OsString> = Vec::new();
        match &self.mode {
            ExecutionMode::Probe { remote } => {
                argv.extend(["--mode", "probe"].map(OsString::from));
                if *remote {
                    argv.push("--remote".into());
                }
            }
            ExecutionMode::Execute { grant } => {
                let json = serde_json::to_string(grant)
                    .map_err(|source| SandboxError::InvalidGrant { source })?;
                argv.extend(["--mode", "execute", "--grant"].map(OsString::from));
                argv.push(json.into());
            }
        }
        argv.push("--".into());
        argv.push(self.program.clone().into_os_string());
        argv.extend(self.args.iter().cloned());
        Ok(argv)
    }

    /// Parses a full command line, `argv[0]` included.
    pub fn parse_from<I, T>(argv: I) -> Result<Self, SandboxError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = CageArgs::try_parse_from(argv).map_err(|error| {
            SandboxError::InvalidInvocation {
                message: error.to_string(),
            }
        })?;
        Self::try_from(args)
    }

    /// Activates the sandbox, runs the unit to completion, and returns its
    /// exit code.
    ///
    /// Must be called before the process starts any other thread.
    pub fn run(self) -> Result<i32, SandboxError> {
        let program = resolve_program(&self.program)?;
        let profile = self.mode.profile(&program);
        debug!(
            target: CAGE_TARGET,
            program = %program.display(),
            mode = ?self.mode,
            "spawning unit"
        );

        let mut command = SandboxCommand::new(&program);
        command
            .args(&self.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = Sandbox::new(profile).spawn(command)?;
        let status = child.wait().map_err(|source| SandboxError::Wait { source })?;
        Ok(status.code().unwrap_or(SIGNALLED_EXIT))
    }
}

impl TryFrom<CageArgs> for CageInvocation {
    type Error = SandboxError;

    fn try_from(args: CageArgs) -> Result<Self, Self::Error> {
        let mut command = args.command.into_iter();
        let program = command
            .next()
            .ok_or_else(|| SandboxError::InvalidInvocation {
                message: "missing unit program".to_owned(),
            })?;
        let mode = match args.mode {
            CageMode::Probe => ExecutionMode::Probe {
                remote: args.remote,
            },
            CageMode::Execute => {
                if args.remote {
                    return Err(SandboxError::InvalidInvocation {
                        message: "--remote only applies to probes".to_owned(),
                    });
                }
                let grant: PluginPermissions = serde_json::from_str(&args.grant)
                    .map_err(|source| SandboxError::InvalidGrant { source })?;
                ExecutionMode::Execute { grant }
            }
        };
        Ok(Self {
            mode,
            program: PathBuf::from(program),
            args: command.collect(),
        })
    }
}

fn resolve_program(program: &Path) -> Result<PathBuf, SandboxError> {
    if program.is_absolute() {
        return Ok(program.to_path_buf());
    }
    resolve_command(&program.to_string_lossy()).ok_or_else(|| SandboxError::InvalidInvocation {
        message: format!("cannot resolve unit program {}", program.display()),
    })
}
