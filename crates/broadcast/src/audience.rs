//! Audience filters over the contact list.

use chrono::{DateTime, Duration, Utc};
use messenger_core::campaign::AudienceType;
use messenger_core::types::Contact;

/// Whether `contact` belongs to `audience` at `now`. Recency filters use
/// the last inbound interaction; `NEW_TODAY` uses the UTC creation day.
pub fn in_audience(contact: &Contact, audience: AudienceType, now: DateTime<Utc>) -> bool {
    let seen_within = |window: Duration| {
        contact
            .last_interaction_at
            .is_some_and(|last| now - last < window)
    };
    match audience {
        AudienceType::ActiveIn24h => seen_within(Duration::hours(24)),
        AudienceType::ActiveIn7d => seen_within(Duration::days(7)),
        AudienceType::NewToday => contact.created_at.date_naive() == now.date_naive(),
        AudienceType::All => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn contact(created: DateTime<Utc>, last: Option<DateTime<Utc>>) -> Contact {
        Contact {
            last_interaction_at: last,
            ..Contact::new("p1", "u1", created)
        }
    }

    #[test]
    fn test_recency_filters() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let old = now - Duration::days(30);

        let recent = contact(old, Some(now - Duration::hours(23)));
        assert!(in_audience(&recent, AudienceType::ActiveIn24h, now));
        assert!(in_audience(&recent, AudienceType::ActiveIn7d, now));

        let last_week = contact(old, Some(now - Duration::days(3)));
        assert!(!in_audience(&last_week, AudienceType::ActiveIn24h, now));
        assert!(in_audience(&last_week, AudienceType::ActiveIn7d, now));

        let silent = contact(old, None);
        assert!(!in_audience(&silent, AudienceType::ActiveIn7d, now));
        assert!(in_audience(&silent, AudienceType::All, now));
    }

    #[test]
    fn test_new_today_uses_calendar_day() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 0, 30, 0).unwrap();
        let just_after_midnight = contact(now - Duration::minutes(20), None);
        let yesterday_evening = contact(now - Duration::hours(2), None);
        assert!(in_audience(&just_after_midnight, AudienceType::NewToday, now));
        assert!(!in_audience(&yesterday_evening, AudienceType::NewToday, now));
    }
}
