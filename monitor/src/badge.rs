//! Toolbar badge state.
//!
//! Pure mapping from the latest refresh event and service snapshot to the
//! icon and badge text a front end should display.

use serde::Serialize;

use crate::hub::RefreshEvent;
use crate::service::ServiceSnapshot;

/// Icon shown next to the badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeIcon {
    /// Not connected.
    Disabled,
    /// A poll is running.
    Refreshing,
    /// Connected or connecting, but the last poll failed.
    Warning,
    /// Connected or connecting without error.
    Default,
}

impl BadgeIcon {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Refreshing => "refreshing",
            Self::Warning => "warning",
            Self::Default => "default",
        }
    }
}

/// Icon plus the unread counter text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub icon: BadgeIcon,
    /// Unread count, empty when there is nothing unread.
    pub text: String,
}

impl Default for Badge {
    fn default() -> Self {
        Self {
            icon: BadgeIcon::Disabled,
            text: String::new(),
        }
    }
}

impl Badge {
    /// Computes the badge for a refresh.
    ///
    /// While a poll is in progress only the icon changes; `previous_text`
    /// carries the counter over. `snapshot` is `None` when no service exists.
    #[must_use]
    pub fn compute(
        event: &RefreshEvent,
        snapshot: Option<&ServiceSnapshot>,
        previous_text: &str,
    ) -> Self {
        if event.is_in_progress() {
            return Self {
                icon: BadgeIcon::Refreshing,
                text: previous_text.to_string(),
            };
        }

        let Some(snapshot) = snapshot.filter(|s| s.is_connected() || s.is_connecting()) else {
            return Self::default();
        };

        let icon = if snapshot.last_error_message.is_empty() {
            BadgeIcon::Default
        } else {
            BadgeIcon::Warning
        };
        let unread = snapshot.unread_count();
        let text = if unread > 0 {
            unread.to_string()
        } else {
            String::new()
        };

        Self { icon, text }
    }
}

impl std::fmt::Display for Badge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.text.is_empty() {
            write!(f, "[{}]", self.icon.as_str())
        } else {
            write!(f, "[{}] {}", self.icon.as_str(), self.text)
        }
    }
}
