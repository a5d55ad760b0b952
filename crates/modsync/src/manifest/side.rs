use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment context a file is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Server,
    Both,
}

impl Side {
    /// Whether a file restricted to `self` belongs in an installation targeting `target`.
    ///
    /// `Both` files go everywhere; a one-sided file only matches its own side, so a
    /// `Both` installation only receives files declared for both.
    pub fn includes(self, target: Side) -> bool {
        self == target || self == Side::Both
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Server => "server",
            Side::Both => "both",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Side::Client),
            "server" => Ok(Side::Server),
            "both" => Ok(Side::Both),
            other => Err(format!("unknown side '{}' (expected client, server or both)", other)),
        }
    }
}

/// Whether a file is mandatory or left to the user
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Optionality {
    #[default]
    Required,
    Optional {
        description: Option<String>,
        default: bool,
    },
}

impl Optionality {
    pub fn is_optional(&self) -> bool {
        matches!(self, Optionality::Optional { .. })
    }

    /// Value a freshly optional file starts with
    pub fn default_value(&self) -> bool {
        match self {
            Optionality::Required => true,
            Optionality::Optional { default, .. } => *default,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Optionality::Optional { description, .. } => description.as_deref(),
            Optionality::Required => None,
        }
    }

    /// Whether the file is installed given the user's stored choice
    pub fn includes(&self, chosen: bool) -> bool {
        match self {
            Optionality::Required => true,
            Optionality::Optional { .. } => chosen,
        }
    }
}

#[derive(Deserialize, Serialize)]
struct RawOption {
    #[serde(default)]
    optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    default: bool,
}

impl<'de> Deserialize<'de> for Optionality {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawOption::deserialize(deserializer)?;
        Ok(if raw.optional {
            Optionality::Optional {
                description: raw.description,
                default: raw.default,
            }
        } else {
            Optionality::Required
        })
    }
}

impl Serialize for Optionality {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = match self {
            Optionality::Required => RawOption {
                optional: false,
                description: None,
                default: false,
            },
            Optionality::Optional { description, default } => RawOption {
                optional: true,
                description: description.clone(),
                default: *default,
            },
        };
        raw.serialize(serializer)
    }
}
