//! Source platforms tracked by the download ledger.

use std::fmt;
use std::str::FromStr;

/// A content platform whose downloads are tracked separately in the ledger.
///
/// The set is closed: ledger keys are never created from arbitrary strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum Platform {
    /// Ariel course pages (the only platform with a browsable course tree).
    Ariel,
    /// Panopto recordings.
    Panopto,
    /// Microsoft Stream recordings.
    Msstream,
}

impl Platform {
    /// Every known platform, in ledger file order.
    pub const ALL: [Platform; 3] = [Platform::Ariel, Platform::Panopto, Platform::Msstream];

    /// Returns the stable identifier used in the ledger file and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ariel => "ariel",
            Self::Panopto => "panopto",
            Self::Msstream => "msstream",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a platform identifier is not one of [`Platform::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform '{0}' (expected one of: ariel, panopto, msstream)")]
pub struct UnknownPlatformError(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatformError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|platform| platform.as_str() == normalized)
            .ok_or_else(|| UnknownPlatformError(value.to_string()))
    }
}
