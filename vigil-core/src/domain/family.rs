//! Operating system families known to the detector

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::application::errors::DetectionError;

/// Operating system family of a scanned host
///
/// The set is closed: supporting a new distribution means adding a variant
/// here and a handler for it wherever families are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Family {
    Debian,
    Ubuntu,
    Raspbian,
    RedHat,
    CentOS,
    Oracle,
    Amazon,
    SuseEnterpriseServer,
    Alpine,
    FreeBsd,
    Windows,
    /// Pseudo server: no operating system, only CPE or third-party detection
    Pseudo,
}

impl Family {
    pub const ALL: [Family; 12] = [
        Family::Debian,
        Family::Ubuntu,
        Family::Raspbian,
        Family::RedHat,
        Family::CentOS,
        Family::Oracle,
        Family::Amazon,
        Family::SuseEnterpriseServer,
        Family::Alpine,
        Family::FreeBsd,
        Family::Windows,
        Family::Pseudo,
    ];

    /// Canonical lowercase name used in scan results and feed URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Debian => "debian",
            Family::Ubuntu => "ubuntu",
            Family::Raspbian => "raspbian",
            Family::RedHat => "redhat",
            Family::CentOS => "centos",
            Family::Oracle => "oracle",
            Family::Amazon => "amazon",
            Family::SuseEnterpriseServer => "suse.linux.enterprise.server",
            Family::Alpine => "alpine",
            Family::FreeBsd => "freebsd",
            Family::Windows => "windows",
            Family::Pseudo => "pseudo",
        }
    }

    /// Debian and its derivatives sharing the dpkg version grammar
    pub fn is_debian_family(&self) -> bool {
        matches!(self, Family::Debian | Family::Ubuntu | Family::Raspbian)
    }

    /// RedHat and its rebuilds that consume the RedHat OVAL feed
    pub fn is_redhat_like(&self) -> bool {
        matches!(self, Family::RedHat | Family::CentOS)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Family::ALL
            .into_iter()
            .find(|family| family.as_str() == normalized)
            .ok_or_else(|| DetectionError::UnsupportedFamily {
                family: s.to_string(),
                reason: "no handler is registered for this family".to_string(),
            })
    }
}

impl TryFrom<String> for Family {
    type Error = DetectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Family> for String {
    fn from(family: Family) -> Self {
        family.as_str().to_string()
    }
}
