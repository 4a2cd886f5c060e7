//! Watch target description
//!
//! A `WatchTarget` names the key to observe (root scope plus path) and which
//! kinds of change should fire the notification. It is fixed once built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Predefined root scope of the key hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RootKey {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
    Users,
    CurrentConfig,
}

impl RootKey {
    /// Canonical long name, e.g. `HKEY_LOCAL_MACHINE`
    pub fn name(self) -> &'static str {
        match self {
            RootKey::ClassesRoot => "HKEY_CLASSES_ROOT",
            RootKey::CurrentUser => "HKEY_CURRENT_USER",
            RootKey::LocalMachine => "HKEY_LOCAL_MACHINE",
            RootKey::Users => "HKEY_USERS",
            RootKey::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }

    /// Abbreviated name, e.g. `HKLM`
    pub fn short_name(self) -> &'static str {
        match self {
            RootKey::ClassesRoot => "HKCR",
            RootKey::CurrentUser => "HKCU",
            RootKey::LocalMachine => "HKLM",
            RootKey::Users => "HKU",
            RootKey::CurrentConfig => "HKCC",
        }
    }

    const ALL: [RootKey; 5] = [
        RootKey::ClassesRoot,
        RootKey::CurrentUser,
        RootKey::LocalMachine,
        RootKey::Users,
        RootKey::CurrentConfig,
    ];
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for RootKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        RootKey::ALL
            .into_iter()
            .find(|root| {
                root.name().eq_ignore_ascii_case(wanted)
                    || root.short_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| format!("Unknown root key: {}", s))
    }
}

impl TryFrom<String> for RootKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RootKey> for String {
    fn from(root: RootKey) -> Self {
        root.short_name().to_string()
    }
}

bitflags::bitflags! {
    /// Bitmask selecting which changes to a key fire a notification
    ///
    /// Bit values match the native registry notify filter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NotifyFilter: u32 {
        /// A subkey is added or deleted
        const NAME = 0x1;
        /// Key attributes change
        const ATTRIBUTES = 0x2;
        /// A value of the key is added, changed or deleted
        const LAST_SET = 0x4;
        /// The key's security descriptor changes
        const SECURITY = 0x8;
        /// Every change kind
        const ALL = Self::NAME.bits() | Self::ATTRIBUTES.bits() | Self::LAST_SET.bits() | Self::SECURITY.bits();
    }
}

impl NotifyFilter {
    const NAMES: [(&'static str, NotifyFilter); 4] = [
        ("name", NotifyFilter::NAME),
        ("attributes", NotifyFilter::ATTRIBUTES),
        ("last_set", NotifyFilter::LAST_SET),
        ("security", NotifyFilter::SECURITY),
    ];

    /// Lower-case names of the set bits
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Combine a list of names such as `["last_set", "name"]`
    pub fn from_names<I, S>(names: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .try_fold(NotifyFilter::empty(), |acc, name| Ok(acc | name.as_ref().parse::<NotifyFilter>()?))
    }
}

impl FromStr for NotifyFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        if wanted.eq_ignore_ascii_case("all") {
            return Ok(NotifyFilter::ALL);
        }
        Self::NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, flag)| *flag)
            .ok_or_else(|| format!("Unknown notify filter: {}", s))
    }
}

impl Serialize for NotifyFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NotifyFilter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        NotifyFilter::from_names(names).map_err(serde::de::Error::custom)
    }
}

/// The key to watch and the changes that matter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    root: RootKey,
    path: String,
    watch_subtree: bool,
    filter: NotifyFilter,
}

impl WatchTarget {
    /// Watch `root\path` for value changes, not including subkeys
    pub fn new(root: RootKey, path: impl Into<String>) -> Self {
        Self {
            root,
            path: normalize_key_path(&path.into()),
            watch_subtree: false,
            filter: NotifyFilter::LAST_SET,
        }
    }

    /// Also report changes anywhere below the key
    pub fn watch_subtree(mut self, watch_subtree: bool) -> Self {
        self.watch_subtree = watch_subtree;
        self
    }

    /// Select which changes fire the notification
    pub fn filter(mut self, filter: NotifyFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn root(&self) -> RootKey {
        self.root
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_subtree(&self) -> bool {
        self.watch_subtree
    }

    pub fn notify_filter(&self) -> NotifyFilter {
        self.filter
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.root)
        } else {
            write!(f, "{}\\{}", self.root, self.path)
        }
    }
}

/// Normalize a key path
///
/// - Accepts `/` as a separator and converts it to `\`
/// - Drops empty components (leading, trailing and doubled separators)
pub fn normalize_key_path(path: &str) -> String {
    path.split(['\\', '/'])
        .filter(|component| !component.is_empty())
        .collect::<Vec<_>>()
        .join("\\")
}
