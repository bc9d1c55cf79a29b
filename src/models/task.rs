use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Parameter naming the application targeted by ignore/unignore tasks
pub const APP_BUNDLE_ID_PARAM: &str = "app-bundle-id";

/// Side-channel operations understood by `rectangle://execute-task`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RectangleTask {
    IgnoreApp,
    UnignoreApp,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown Rectangle task: {0}")]
pub struct UnknownTask(pub String);

impl RectangleTask {
    pub const ALL: [RectangleTask; 2] = [RectangleTask::IgnoreApp, RectangleTask::UnignoreApp];

    pub fn name(self) -> &'static str {
        match self {
            RectangleTask::IgnoreApp => "ignore-app",
            RectangleTask::UnignoreApp => "unignore-app",
        }
    }
}

impl FromStr for RectangleTask {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|task| task.name() == s)
            .ok_or_else(|| UnknownTask(s.to_string()))
    }
}

impl fmt::Display for RectangleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for RectangleTask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_names() {
        assert_eq!(RectangleTask::IgnoreApp.to_string(), "ignore-app");
        assert_eq!("unignore-app".parse(), Ok(RectangleTask::UnignoreApp));
        assert!("forget-app".parse::<RectangleTask>().is_err());
    }
}
