//! Activity categories accepted by the enrichment service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Initial-access technique a record is classified under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    ContentInjection,
    DriveByCompromise,
    ExploitPublicFacingApplication,
    ExternalRemoteServices,
    HardwareAdditions,
    Phishing,
    ReplicationThroughRemovableMedia,
    SupplyChainCompromise,
    TrustedRelationship,
    ValidAccounts,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Self::ContentInjection,
        Self::DriveByCompromise,
        Self::ExploitPublicFacingApplication,
        Self::ExternalRemoteServices,
        Self::HardwareAdditions,
        Self::Phishing,
        Self::ReplicationThroughRemovableMedia,
        Self::SupplyChainCompromise,
        Self::TrustedRelationship,
        Self::ValidAccounts,
    ];

    /// Wire token sent to the enrichment service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentInjection => "contentinjection",
            Self::DriveByCompromise => "drivebycompromise",
            Self::ExploitPublicFacingApplication => "exploitpublicfacingapplication",
            Self::ExternalRemoteServices => "externalremoteservices",
            Self::HardwareAdditions => "hardwareadditions",
            Self::Phishing => "phishing",
            Self::ReplicationThroughRemovableMedia => "replicationthroughremovablemedia",
            Self::SupplyChainCompromise => "supplychaincompromise",
            Self::TrustedRelationship => "trustedrelationship",
            Self::ValidAccounts => "validaccounts",
        }
    }

    pub fn is_valid(value: &str) -> bool {
        value.parse::<Category>().is_ok()
    }
}

impl FromStr for Category {
    type Err = Error;

    /// Parses a category token, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalised)
            .ok_or_else(|| Error::validation(format!("invalid category value: {}", s)))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
