use std::fmt::Display;

const RESET_DAILY: &str = "resetDaily";
const IGNORE_EXPIRE_PREFIX: &str = "ignoreExpire_";

/// Names of the alarms the timer schedules with the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmName {
    /// Recurring, fires at local midnight.
    ResetDaily,
    /// One shot, ends the ignore period of a domain.
    IgnoreExpire(String),
}

impl AlarmName {
    pub fn parse(name: &str) -> Option<Self> {
        if name == RESET_DAILY {
            return Some(Self::ResetDaily);
        }
        name.strip_prefix(IGNORE_EXPIRE_PREFIX)
            .filter(|domain| !domain.is_empty())
            .map(|domain| Self::IgnoreExpire(domain.to_string()))
    }
}

impl Display for AlarmName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmName::ResetDaily => write!(f, "{RESET_DAILY}"),
            AlarmName::IgnoreExpire(domain) => write!(f, "{IGNORE_EXPIRE_PREFIX}{domain}"),
        }
    }
}
