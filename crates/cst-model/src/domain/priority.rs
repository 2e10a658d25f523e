use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Scheduling priority of a cluster-state update.
///
/// Ordered from most to least urgent: `Immediate > Urgent > ... > Languid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    Immediate,
    Urgent,
    High,
    #[default]
    Normal,
    Low,
    Languid,
}

impl Priority {
    fn rank(self) -> u8 {
        match self {
            Priority::Immediate => 5,
            Priority::Urgent => 4,
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
            Priority::Languid => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Immediate => "immediate",
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Languid => "languid",
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Priority::Immediate),
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "languid" => Ok(Priority::Languid),
            _ => Err(ModelError::UnknownPriority(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_urgency() {
        assert!(Priority::Immediate > Priority::Urgent);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Low > Priority::Languid);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        assert_eq!(Priority::Languid.to_string(), "languid");
        assert!("whenever".parse::<Priority>().is_err());
    }
}
