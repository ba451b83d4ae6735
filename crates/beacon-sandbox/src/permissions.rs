//! Capability vocabulary granted to sandboxed plugins.
//!
//! A [`PluginPermissions`] value maps each [`CapabilityKind`] to a
//! [`CapabilityGrant`]. Absent kinds are denied. Comparisons always go through
//! the canonical form produced by [`PluginPermissions::normalize`], so the
//! order of scoped qualifiers never causes a spurious mismatch between what a
//! plugin requests and what the user granted earlier.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Closed set of capabilities a plugin may request.
///
/// The serialized names follow the registry file format.
///
/// ```
/// use beacon_sandbox::CapabilityKind;
///
/// assert_eq!(CapabilityKind::Net.as_str(), "net");
/// assert_eq!("hrtime".parse::<CapabilityKind>().ok(), Some(CapabilityKind::Hrtime));
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CapabilityKind {
    /// Outbound network access.
    Net,
    /// Filesystem reads.
    Read,
    /// Filesystem writes.
    Write,
    /// Spawning subprocesses.
    Run,
    /// Reading environment variables.
    Env,
    /// Reading system information.
    Sys,
    /// Calling native code.
    Ffi,
    /// High resolution timers.
    Hrtime,
}

impl CapabilityKind {
    /// Every capability kind in canonical order.
    pub const ALL: [Self; 8] = [
        Self::Net,
        Self::Read,
        Self::Write,
        Self::Run,
        Self::Env,
        Self::Sys,
        Self::Ffi,
        Self::Hrtime,
    ];

    /// Returns the serialized name of the capability.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Heading used when listing scoped qualifiers.
    #[must_use]
    pub const fn heading(self) -> &'static str {
        match self {
            Self::Net => "Network access",
            Self::Read => "Read files",
            Self::Write => "Write files",
            Self::Run => "Run subprocesses",
            Self::Env => "Environment variables",
            Self::Sys => "System information",
            Self::Ffi => "Native libraries",
            Self::Hrtime => "High resolution time",
        }
    }

    /// Line used when the capability is granted without restriction.
    #[must_use]
    pub const fn unrestricted_label(self) -> &'static str {
        match self {
            Self::Net => "Full network access",
            Self::Read => "Read all files",
            Self::Write => "Write all files",
            Self::Run => "Run all commands",
            Self::Env => "Access all environment variables",
            Self::Sys => "Read all system information",
            Self::Ffi => "FFI (foreign function interface)",
            Self::Hrtime => "High resolution time",
        }
    }
}

/// Value attached to a single capability kind.
///
/// Serialized as `false`, `true`, or an array of string qualifiers such as
/// host names, paths, commands, or variable names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityGrant {
    /// `false` denies the capability, `true` grants it without restriction.
    Flag(bool),
    /// Grants the capability for the listed qualifiers only.
    Scoped(Vec<String>),
}

static DENIED: CapabilityGrant = CapabilityGrant::Flag(false);

impl Default for CapabilityGrant {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl CapabilityGrant {
    /// Builds a scoped grant from any list of qualifiers.
    pub fn scoped<I, S>(qualifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Scoped(qualifiers.into_iter().map(Into::into).collect())
    }

    /// Returns `true` when the grant allows nothing.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        match self {
            Self::Flag(allowed) => !allowed,
            Self::Scoped(qualifiers) => qualifiers.is_empty(),
        }
    }

    /// Returns `true` when the grant is the unrestricted `true` flag.
    #[must_use]
    pub const fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Flag(true))
    }

    /// Returns the scoped qualifiers, or an empty slice for flags.
    #[must_use]
    pub fn qualifiers(&self) -> &[String] {
        match self {
            Self::Flag(_) => &[],
            Self::Scoped(qualifiers) => qualifiers,
        }
    }

    fn canonical(&self) -> Self {
        match self {
            Self::Flag(allowed) => Self::Flag(*allowed),
            Self::Scoped(qualifiers) => {
                let mut sorted = qualifiers.clone();
                sorted.sort();
                sorted.dedup();
                if sorted.is_empty() {
                    Self::Flag(false)
                } else {
                    Self::Scoped(sorted)
                }
            }
        }
    }
}

/// Capability set requested by, or granted to, a plugin.
///
/// Equality is canonical: two sets compare equal when their
/// [`normalize`](Self::normalize)d forms match.
///
/// ```
/// use beacon_sandbox::{CapabilityGrant, CapabilityKind, PluginPermissions};
///
/// let requested = PluginPermissions::new()
///     .with(CapabilityKind::Net, CapabilityGrant::scoped(["b.example", "a.example"]));
/// let granted = PluginPermissions::new()
///     .with(CapabilityKind::Net, CapabilityGrant::scoped(["a.example", "b.example"]))
///     .with(CapabilityKind::Run, CapabilityGrant::Flag(false));
/// assert_eq!(requested, granted);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PluginPermissions {
    grants: BTreeMap<CapabilityKind, CapabilityGrant>,
}

impl PluginPermissions {
    /// Creates an empty (fully denied) capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the set with `kind` mapped to `grant`.
    #[must_use]
    pub fn with(mut self, kind: CapabilityKind, grant: CapabilityGrant) -> Self {
        self.set(kind, grant);
        self
    }

    /// Maps `kind` to `grant`, replacing any previous value.
    pub fn set(&mut self, kind: CapabilityKind, grant: CapabilityGrant) {
        self.grants.insert(kind, grant);
    }

    /// Returns the grant for `kind`; absent kinds are denied.
    #[must_use]
    pub fn grant(&self, kind: CapabilityKind) -> &CapabilityGrant {
        self.grants.get(&kind).unwrap_or(&DENIED)
    }

    /// Returns `true` when no capability is granted at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.values().all(CapabilityGrant::is_denied)
    }

    /// Iterates over the kinds that are granted in any form.
    pub fn granted_kinds(&self) -> impl Iterator<Item = CapabilityKind> + '_ {
        self.grants
            .iter()
            .filter(|(_, grant)| !grant.is_denied())
            .map(|(kind, _)| *kind)
    }

    /// Produces the canonical form: every kind present, qualifier lists
    /// sorted and de-duplicated, empty lists collapsed to `false`.
    #[must_use]
    pub fn normalize(&self) -> CanonicalPermissions {
        CanonicalPermissions(
            CapabilityKind::ALL
                .iter()
                .map(|kind| (*kind, self.grant(*kind).canonical()))
                .collect(),
        )
    }

    /// Lists the granted capabilities as human-readable lines, grouped by
    /// kind. Denied kinds are omitted, so an empty list means the set asks
    /// for nothing.
    ///
    /// ```
    /// use beacon_sandbox::{CapabilityGrant, CapabilityKind, PluginPermissions};
    ///
    /// let lines = PluginPermissions::new()
    ///     .with(CapabilityKind::Net, CapabilityGrant::scoped(["example.com"]))
    ///     .with(CapabilityKind::Env, CapabilityGrant::Flag(true))
    ///     .describe();
    /// assert_eq!(lines, vec![
    ///     "• Network access:".to_owned(),
    ///     "  - example.com".to_owned(),
    ///     "• Access all environment variables".to_owned(),
    /// ]);
    /// ```
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        let canonical = self.normalize();
        let mut lines = Vec::new();
        for (kind, grant) in canonical.iter() {
            match grant {
                CapabilityGrant::Flag(true) => {
                    lines.push(format!("• {}", kind.unrestricted_label()));
                }
                CapabilityGrant::Scoped(qualifiers) => {
                    lines.push(format!("• {}:", kind.heading()));
                    lines.extend(qualifiers.iter().map(|q| format!("  - {q}")));
                }
                CapabilityGrant::Flag(false) => {}
            }
        }
        lines
    }
}

impl PartialEq for PluginPermissions {
    fn eq(&self, other: &Self) -> bool {
        equals(self, other)
    }
}

impl Eq for PluginPermissions {}

impl<'de> Deserialize<'de> for PluginPermissions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Unknown keys are dropped here so they are never written back.
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut grants = BTreeMap::new();
        for (key, value) in raw {
            let Ok(kind) = key.parse::<CapabilityKind>() else {
                continue;
            };
            let grant = CapabilityGrant::deserialize(value).map_err(serde::de::Error::custom)?;
            grants.insert(kind, grant);
        }
        Ok(Self { grants })
    }
}

/// Canonical form of a capability set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CanonicalPermissions(BTreeMap<CapabilityKind, CapabilityGrant>);

impl CanonicalPermissions {
    /// Iterates over every capability kind with its canonical grant.
    pub fn iter(&self) -> impl Iterator<Item = (CapabilityKind, &CapabilityGrant)> {
        self.0.iter().map(|(kind, grant)| (*kind, grant))
    }

    /// Serializes the canonical form as compact JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Keys are unit variants and values are plain JSON, so this cannot fail.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

/// Canonical form of `permissions`.
#[must_use]
pub fn normalize(permissions: &PluginPermissions) -> CanonicalPermissions {
    permissions.normalize()
}

/// Returns `true` when both sets serialize identically once normalized.
#[must_use]
pub fn equals(a: &PluginPermissions, b: &PluginPermissions) -> bool {
    a.normalize().to_json() == b.normalize().to_json()
}

/// Human-readable lines describing `permissions`.
#[must_use]
pub fn describe(permissions: &PluginPermissions) -> Vec<String> {
    permissions.describe()
}
