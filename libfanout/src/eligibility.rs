//! Release-time eligibility

use chrono::{DateTime, Utc};

use crate::types::{Post, Schedule};

/// Whether `post` may be released at `now`.
///
/// Unscheduled posts are always eligible. A date-only schedule opens at the
/// start of that UTC day; a date-time schedule opens at that exact instant.
pub fn is_eligible(post: &Post, now: DateTime<Utc>) -> bool {
    match post.scheduled_at {
        None => true,
        Some(schedule) => schedule_reached(&schedule, now),
    }
}

pub fn schedule_reached(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    match schedule {
        Schedule::Date(date) => *date <= now.date_naive(),
        Schedule::At(instant) => *instant <= now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewPost;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn post_with(schedule: Option<Schedule>) -> Post {
        let mut post = NewPost::new("content").into_post(0).unwrap();
        post.scheduled_at = schedule;
        post
    }

    #[test]
    fn test_unscheduled_always_eligible() {
        let post = post_with(None);
        let instants = [
            Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2999, 12, 31, 23, 59, 59).unwrap(),
        ];
        for now in instants {
            assert!(is_eligible(&post, now), "unscheduled post ineligible at {}", now);
        }
    }

    #[test]
    fn test_date_only_opens_at_start_of_day() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let post = post_with(Some(Schedule::Date(day)));
        let start_of_day = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();

        assert!(!is_eligible(&post, start_of_day - Duration::seconds(1)));
        assert!(!is_eligible(&post, start_of_day - Duration::days(3)));
        assert!(is_eligible(&post, start_of_day));
        assert!(is_eligible(&post, start_of_day + Duration::hours(23)));
        assert!(is_eligible(&post, start_of_day + Duration::days(400)));
    }

    #[test]
    fn test_instant_requires_exact_time() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 15, 30, 0).unwrap();
        let post = post_with(Some(Schedule::At(at)));

        assert!(!is_eligible(&post, at - Duration::seconds(1)));
        // Same calendar day is not enough for a timed schedule
        assert!(!is_eligible(
            &post,
            Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap()
        ));
        assert!(is_eligible(&post, at));
        assert!(is_eligible(&post, at + Duration::minutes(1)));
    }

    #[test]
    fn test_date_vs_instant_asymmetry() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
        let date_only = post_with(Some(Schedule::Date(now.date_naive())));
        let later_today = post_with(Some(Schedule::At(now + Duration::hours(4))));

        assert!(is_eligible(&date_only, now));
        assert!(!is_eligible(&later_today, now));
    }
}
