use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source type of a job's URL, selecting which extraction strategy runs
///
/// A job whose source type is not known yet carries `None` and is classified
/// from its URL at first claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// News article pages
    News,
    /// Social platform posts (X/Twitter, Reddit, ...)
    Social,
    /// Anything else
    Generic,
}

impl SourceType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Social => "social",
            Self::Generic => "generic",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "news" => Some(Self::News),
            "social" => Some(Self::Social),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::News, Self::Social, Self::Generic]
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string().to_uppercase())
    }
}

impl FromStr for SourceType {
    type Err = String;

    /// Case-insensitive; accepts the platform names older clients send
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "news" => Ok(Self::News),
            "social" | "twitter" | "x" | "reddit" => Ok(Self::Social),
            "generic" | "general" => Ok(Self::Generic),
            other => Err(format!(
                "unknown source type '{}', expected news, social or generic",
                other
            )),
        }
    }
}
