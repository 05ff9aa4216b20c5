//! Authentication protocol designation.

use serde::{Deserialize, Serialize};

/// Protocol used for an authentication.
///
/// The designation string is what gets persisted alongside activity rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// SAML 2.0 web browser SSO.
    #[serde(rename = "saml2")]
    Saml2,
    /// OpenID Connect.
    #[serde(rename = "oidc")]
    Oidc,
}

impl Protocol {
    /// Returns the persisted designation for this protocol.
    pub fn designation(self) -> &'static str {
        match self {
            Self::Saml2 => "saml2",
            Self::Oidc => "oidc",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.designation())
    }
}

impl std::str::FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "saml2" => Ok(Self::Saml2),
            "oidc" => Ok(Self::Oidc),
            _ => Err(ParseProtocolError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown protocol designation.
#[derive(Debug, Clone)]
pub struct ParseProtocolError(pub String);

impl std::fmt::Display for ParseProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown protocol designation: {}", self.0)
    }
}

impl std::error::Error for ParseProtocolError {}
