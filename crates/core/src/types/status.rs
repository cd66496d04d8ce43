//! Status and role enums.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Catalog product status.
///
/// The product store keeps status as free text. Known values map to
/// variants; anything else round-trips unchanged through [`Self::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    Discontinued,
    Other(String),
}

impl ProductStatus {
    /// Returns the status as stored in the product record.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
            Self::Discontinued => "Discontinued",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ProductStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "active" => Self::Active,
            "inactive" => Self::Inactive,
            "discontinued" => Self::Discontinued,
            _ => Self::Other(s),
        }
    }
}

impl From<ProductStatus> for String {
    fn from(status: ProductStatus) -> Self {
        status.as_str().to_owned()
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a message on the chat-completion wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("invalid chat role: {s}")),
        }
    }
}
