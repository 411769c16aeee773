//! Environment tags
//!
//! The two deployments a sync run moves data between.

use serde::{Deserialize, Serialize};

/// One of the two independent backend deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Live deployment
    Production,
    /// Pre-release deployment
    Staging,
}

impl Environment {
    /// Both environments, production first
    pub const ALL: [Environment; 2] = [Environment::Production, Environment::Staging];

    /// The environment on the other side of a transfer
    pub fn other(self) -> Self {
        match self {
            Environment::Production => Environment::Staging,
            Environment::Staging => Environment::Production,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Staging => write!(f, "staging"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Fixed transfer direction between the two environments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// production -> staging
    Pull,
    /// staging -> production
    Push,
}

impl Direction {
    /// Environment read from
    pub fn source(self) -> Environment {
        match self {
            Direction::Pull => Environment::Production,
            Direction::Push => Environment::Staging,
        }
    }

    /// Environment written to
    pub fn destination(self) -> Environment {
        self.source().other()
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Pull => write!(f, "pull"),
            Direction::Push => write!(f, "push"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_display_and_parse() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Staging.to_string(), "staging");
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("staging".parse::<Environment>(), Ok(Environment::Staging));
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_direction_endpoints() {
        assert_eq!(Direction::Pull.source(), Environment::Production);
        assert_eq!(Direction::Pull.destination(), Environment::Staging);
        assert_eq!(Direction::Push.source(), Environment::Staging);
        assert_eq!(Direction::Push.destination(), Environment::Production);
    }

    #[test]
    fn test_environment_serialization() {
        let json = serde_json::to_string(&Environment::Staging).unwrap();
        assert_eq!(json, r#""staging""#);
    }
}
