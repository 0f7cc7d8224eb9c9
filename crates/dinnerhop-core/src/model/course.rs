//! Courses of a progressive dinner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// One stage of the evening.
///
/// The three hosted courses each have exactly one host per table. The
/// optional afterparty has its own envelope but nobody hosts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Course {
    Starter,
    Main,
    Dessert,
    Afterparty,
}

impl Course {
    /// Hosted courses in serving order.
    pub const HOSTED: [Course; 3] = [Course::Starter, Course::Main, Course::Dessert];

    pub fn is_hosted(self) -> bool {
        !matches!(self, Course::Afterparty)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Course::Starter => "starter",
            Course::Main => "main",
            Course::Dessert => "dessert",
            Course::Afterparty => "afterparty",
        }
    }

    /// Position in serving order (afterparty last).
    pub fn index(self) -> usize {
        match self {
            Course::Starter => 0,
            Course::Main => 1,
            Course::Dessert => 2,
            Course::Afterparty => 3,
        }
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Course {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starter" | "appetizer" => Ok(Course::Starter),
            "main" => Ok(Course::Main),
            "dessert" => Ok(Course::Dessert),
            "afterparty" => Ok(Course::Afterparty),
            other => Err(ValidationError::UnknownCourse(other.to_string())),
        }
    }
}
