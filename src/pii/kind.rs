//! PII classification types.

use serde::{Deserialize, Serialize};

/// PII classes the detector is asked to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    /// Email addresses
    Email,
    /// Phone numbers
    Phone,
    /// Social Security Numbers
    Ssn,
    /// Credit card numbers
    CreditCard,
    /// Physical addresses
    Address,
    /// Full names of people
    FullName,
    /// Government ID numbers
    GovId,
    /// IP addresses
    Ip,
    /// Dates of birth
    Dob,
}

impl PiiKind {
    /// All kinds, in the order they are offered to the detector.
    pub const ALL: [PiiKind; 9] = [
        PiiKind::Email,
        PiiKind::Phone,
        PiiKind::Ssn,
        PiiKind::CreditCard,
        PiiKind::Address,
        PiiKind::FullName,
        PiiKind::GovId,
        PiiKind::Ip,
        PiiKind::Dob,
    ];

    /// Wire name, matching the serde rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::Email => "email",
            PiiKind::Phone => "phone",
            PiiKind::Ssn => "ssn",
            PiiKind::CreditCard => "credit_card",
            PiiKind::Address => "address",
            PiiKind::FullName => "full_name",
            PiiKind::GovId => "gov_id",
            PiiKind::Ip => "ip",
            PiiKind::Dob => "dob",
        }
    }

    /// Parse a wire name back into a kind.
    pub fn parse(s: &str) -> Option<PiiKind> {
        match s {
            "email" => Some(PiiKind::Email),
            "phone" => Some(PiiKind::Phone),
            "ssn" => Some(PiiKind::Ssn),
            "credit_card" => Some(PiiKind::CreditCard),
            "address" => Some(PiiKind::Address),
            "full_name" => Some(PiiKind::FullName),
            "gov_id" => Some(PiiKind::GovId),
            "ip" => Some(PiiKind::Ip),
            "dob" => Some(PiiKind::Dob),
            _ => None,
        }
    }

    /// Replacement string rendered in place of masked content.
    pub fn placeholder(&self) -> &'static str {
        match self {
            PiiKind::Email => "[EMAIL]",
            PiiKind::Phone => "[PHONE]",
            PiiKind::Ssn => "[SSN]",
            PiiKind::CreditCard => "[CREDIT_CARD]",
            PiiKind::Address => "[ADDRESS]",
            PiiKind::FullName => "[NAME]",
            PiiKind::GovId => "[GOV_ID]",
            PiiKind::Ip => "[IP]",
            PiiKind::Dob => "[DOB]",
        }
    }

    /// Description used when prompting the detector model.
    pub fn description(&self) -> &'static str {
        match self {
            PiiKind::Email => "Email addresses (e.g., user@example.com)",
            PiiKind::Phone => "Phone numbers (e.g., 555-1234, (555) 123-4567, +1-555-123-4567)",
            PiiKind::Ssn => "Social Security Numbers (e.g., 123-45-6789)",
            PiiKind::CreditCard => "Credit card numbers (e.g., 4532-1234-5678-9010)",
            PiiKind::Address => "Physical addresses (street, city, state, zip)",
            PiiKind::FullName => "Full names of people (first and last name together)",
            PiiKind::GovId => "Government ID numbers (passport, driver license, etc.)",
            PiiKind::Ip => "IP addresses (IPv4 or IPv6)",
            PiiKind::Dob => "Date of birth (e.g., 01/15/1990, January 15, 1990)",
        }
    }
}

impl std::fmt::Display for PiiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
