//! 24-hour standard messaging window classification.
//!
//! Free-form content is allowed only while the user's last inbound message
//! is strictly less than 24 hours old. Everything else needs a template
//! category (and a tag on the wire) or is blocked outright.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of the standard messaging window.
pub const WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyCategory {
    WithinWindow,
    UtilityTemplate,
    FollowUpTemplate,
    ReminderTemplate,
    Blocked,
}

impl PolicyCategory {
    pub fn allows_free_form(&self) -> bool {
        matches!(self, PolicyCategory::WithinWindow)
    }
}

/// Purpose a caller declares for an outside-window, non-broadcast send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowPurpose {
    FollowUp,
    Reminder,
}

/// `true` iff `now - last < 24h`. A contact that never wrote has no window.
pub fn is_window_open(last_interaction: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_interaction {
        Some(last) => now - last < Duration::hours(WINDOW_HOURS),
        None => false,
    }
}

pub fn classify(
    last_interaction: Option<DateTime<Utc>>,
    is_broadcast: bool,
    purpose: Option<FlowPurpose>,
    now: DateTime<Utc>,
) -> PolicyCategory {
    if is_window_open(last_interaction, now) {
        return PolicyCategory::WithinWindow;
    }
    if is_broadcast {
        return PolicyCategory::UtilityTemplate;
    }
    match purpose {
        Some(FlowPurpose::FollowUp) => PolicyCategory::FollowUpTemplate,
        Some(FlowPurpose::Reminder) => PolicyCategory::ReminderTemplate,
        None => PolicyCategory::Blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_boundary_is_exclusive() {
        let now = Utc::now();
        let just_inside = now - Duration::hours(24) + Duration::milliseconds(1);
        let exactly = now - Duration::hours(24);

        assert_eq!(classify(Some(just_inside), false, None, now), PolicyCategory::WithinWindow);
        assert_ne!(classify(Some(exactly), false, None, now), PolicyCategory::WithinWindow);
        assert!(!is_window_open(Some(exactly), now));
    }

    #[test]
    fn test_window_open_for_recent_contact() {
        let now = Utc::now();
        for hours in [0, 1, 12, 23] {
            assert!(is_window_open(Some(now - Duration::hours(hours)), now), "{hours}h");
        }
        for hours in [24, 30, 24 * 7] {
            assert!(!is_window_open(Some(now - Duration::hours(hours)), now), "{hours}h");
        }
        assert!(!is_window_open(None, now));
    }

    #[test]
    fn test_outside_window_categories() {
        let now = Utc::now();
        let stale = Some(now - Duration::hours(30));
        assert_eq!(classify(stale, true, None, now), PolicyCategory::UtilityTemplate);
        assert_eq!(
            classify(stale, true, Some(FlowPurpose::Reminder), now),
            PolicyCategory::UtilityTemplate
        );
        assert_eq!(
            classify(stale, false, Some(FlowPurpose::FollowUp), now),
            PolicyCategory::FollowUpTemplate
        );
        assert_eq!(
            classify(stale, false, Some(FlowPurpose::Reminder), now),
            PolicyCategory::ReminderTemplate
        );
        assert_eq!(classify(stale, false, None, now), PolicyCategory::Blocked);
        assert_eq!(classify(None, false, None, now), PolicyCategory::Blocked);
    }

    #[test]
    fn test_only_within_window_allows_free_form() {
        assert!(PolicyCategory::WithinWindow.allows_free_form());
        assert!(!PolicyCategory::UtilityTemplate.allows_free_form());
        assert!(!PolicyCategory::Blocked.allows_free_form());
    }
}
