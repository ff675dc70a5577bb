//! Change detection
//!
//! Pure, deterministic diffing of a stored snapshot against a freshly
//! fetched profile. Rules run in a fixed order so multi-change cycles
//! produce records in a stable relative order.

use chrono::{DateTime, Duration, Utc};

use crate::data::{ActivityType, ProfileSnapshot, ProfileSnapshotCandidate};

/// One detected change, not yet persisted.
///
/// The worker stamps identity fields and converts this into an
/// [`crate::data::ActivityRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub activity_type: ActivityType,
    pub description: String,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
}

/// Elements of `current` not present in `previous`, sorted for
/// deterministic output regardless of input order.
fn sorted_additions<'a>(
    previous: &'a std::collections::HashSet<String>,
    current: &'a std::collections::HashSet<String>,
) -> Vec<&'a String> {
    let mut added: Vec<&String> = current.difference(previous).collect();
    added.sort();
    added
}

/// Diff a stored snapshot against the current profile state.
///
/// A `None` previous snapshot is the baseline case: the first
/// observation of a profile never emits activities, otherwise every
/// badge and group the user already had would flood the feed on first
/// sight.
///
/// `now` is the processing time; photos are only announced when their
/// timestamp falls within the trailing `photo_window` measured from it.
pub fn diff(
    previous: Option<&ProfileSnapshot>,
    current: &ProfileSnapshotCandidate,
    now: DateTime<Utc>,
    photo_window: Duration,
) -> Vec<NewActivity> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    let name = &current.habbo_name;
    let mut activities = Vec::new();

    // 1. Motto
    if previous.motto != current.motto {
        activities.push(NewActivity {
            activity_type: ActivityType::MottoChange,
            description: format!("{} changed their motto", name),
            old_data: Some(serde_json::json!({ "motto": previous.motto })),
            new_data: Some(serde_json::json!({ "motto": current.motto })),
        });
    }

    // 2. Look (figure string)
    if previous.figure_string != current.figure_string {
        activities.push(NewActivity {
            activity_type: ActivityType::LookChange,
            description: format!("{} changed their look", name),
            old_data: Some(serde_json::json!({ "figure_string": previous.figure_string })),
            new_data: Some(serde_json::json!({ "figure_string": current.figure_string })),
        });
    }

    // 3. New badges, one record per code
    for code in sorted_additions(&previous.badge_codes, &current.badge_codes) {
        activities.push(NewActivity {
            activity_type: ActivityType::Badge,
            description: format!("{} earned badge {}", name, code),
            old_data: None,
            new_data: Some(serde_json::json!({ "badge_code": code })),
        });
    }

    // 4. New groups and rooms, one record per id
    for group_id in sorted_additions(&previous.group_ids, &current.group_ids) {
        activities.push(NewActivity {
            activity_type: ActivityType::GroupJoined,
            description: format!("{} joined a group", name),
            old_data: None,
            new_data: Some(serde_json::json!({ "group_id": group_id })),
        });
    }
    for room_id in sorted_additions(&previous.room_ids, &current.room_ids) {
        activities.push(NewActivity {
            activity_type: ActivityType::RoomCreated,
            description: format!("{} created a room", name),
            old_data: None,
            new_data: Some(serde_json::json!({ "room_id": room_id })),
        });
    }

    // 5. Online status, debounced: only the false -> true transition
    if !previous.online && current.online {
        activities.push(NewActivity {
            activity_type: ActivityType::StatusChange,
            description: format!("{} came online", name),
            old_data: Some(serde_json::json!({ "online": false })),
            new_data: Some(serde_json::json!({ "online": true })),
        });
    }

    // 6. New photos inside the trailing window. Photos first seen long
    // after they were taken (or with no timestamp at all) are not
    // retroactively announced.
    let window_start = now - photo_window;
    let mut new_photos: Vec<_> = current
        .photos
        .iter()
        .filter(|photo| !previous.photo_ids.contains(&photo.id))
        .filter(|photo| {
            photo
                .taken_at
                .map(|taken_at| taken_at >= window_start)
                .unwrap_or(false)
        })
        .collect();
    new_photos.sort_by_key(|photo| (photo.taken_at, photo.id.clone()));
    for photo in new_photos {
        activities.push(NewActivity {
            activity_type: ActivityType::PhotoPosted,
            description: format!("{} posted a photo", name),
            old_data: None,
            new_data: Some(serde_json::json!({
                "photo_id": photo.id,
                "taken_at": photo.taken_at,
            })),
        });
    }

    activities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PhotoObservation;
    use std::collections::HashSet;

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn candidate() -> ProfileSnapshotCandidate {
        ProfileSnapshotCandidate {
            habbo_name: "alice".to_string(),
            habbo_id: "hhus-alice".to_string(),
            hotel: "com".to_string(),
            figure_string: "hd-180-1".to_string(),
            motto: "hello".to_string(),
            online: false,
            badge_codes: HashSet::new(),
            group_ids: HashSet::new(),
            room_ids: HashSet::new(),
            photos: Vec::new(),
            raw_profile: serde_json::json!({}),
        }
    }

    fn snapshot_of(candidate: &ProfileSnapshotCandidate) -> ProfileSnapshot {
        candidate.clone().into_snapshot(Utc::now())
    }

    fn window() -> Duration {
        Duration::hours(24)
    }

    #[test]
    fn first_observation_emits_nothing() {
        let mut current = candidate();
        current.motto = "anything".to_string();
        current.badge_codes = set(&["B1", "B2"]);
        current.online = true;

        assert!(diff(None, &current, Utc::now(), window()).is_empty());
    }

    #[test]
    fn identical_state_emits_nothing() {
        let current = candidate();
        let previous = snapshot_of(&current);

        assert!(diff(Some(&previous), &current, Utc::now(), window()).is_empty());
    }

    #[test]
    fn motto_change_emits_exactly_one_activity() {
        let mut previous_state = candidate();
        previous_state.motto = "old".to_string();
        previous_state.badge_codes = set(&["B1"]);
        let previous = snapshot_of(&previous_state);

        let mut current = previous_state;
        current.motto = "new".to_string();

        let activities = diff(Some(&previous), &current, Utc::now(), window());
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::MottoChange);
        assert_eq!(
            activities[0].old_data,
            Some(serde_json::json!({"motto": "old"}))
        );
        assert_eq!(
            activities[0].new_data,
            Some(serde_json::json!({"motto": "new"}))
        );
    }

    #[test]
    fn figure_change_emits_one_look_change() {
        let mut previous_state = candidate();
        previous_state.figure_string = "hd-180-1".to_string();
        let previous = snapshot_of(&previous_state);

        let mut current = previous_state;
        current.figure_string = "hd-190-2.ch-210-66".to_string();

        let activities = diff(Some(&previous), &current, Utc::now(), window());
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::LookChange);
        assert_eq!(
            activities[0].old_data,
            Some(serde_json::json!({"figure_string": "hd-180-1"}))
        );
        assert_eq!(
            activities[0].new_data,
            Some(serde_json::json!({"figure_string": "hd-190-2.ch-210-66"}))
        );
    }

    #[test]
    fn new_group_and_room_each_emit_one_record() {
        let mut previous_state = candidate();
        previous_state.group_ids = set(&["g1"]);
        previous_state.room_ids = set(&["r1"]);
        let previous = snapshot_of(&previous_state);

        let mut current = previous_state;
        current.group_ids = set(&["g1", "g2"]);
        current.room_ids = set(&["r1", "r2"]);

        let activities = diff(Some(&previous), &current, Utc::now(), window());
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].activity_type, ActivityType::GroupJoined);
        assert_eq!(
            activities[0].new_data,
            Some(serde_json::json!({"group_id": "g2"}))
        );
        assert_eq!(activities[1].activity_type, ActivityType::RoomCreated);
        assert_eq!(
            activities[1].new_data,
            Some(serde_json::json!({"room_id": "r2"}))
        );
    }

    #[test]
    fn badge_diff_is_order_independent() {
        let mut previous_state = candidate();
        previous_state.badge_codes = set(&["B1"]);
        let previous = snapshot_of(&previous_state);

        let mut current = previous_state;
        current.badge_codes = set(&["B2", "B1", "B3"]);

        let activities = diff(Some(&previous), &current, Utc::now(), window());
        assert_eq!(activities.len(), 2);
        assert!(
            activities
                .iter()
                .all(|a| a.activity_type == ActivityType::Badge)
        );
        let codes: Vec<_> = activities
            .iter()
            .map(|a| a.new_data.as_ref().unwrap()["badge_code"].clone())
            .collect();
        assert_eq!(
            codes,
            vec![serde_json::json!("B2"), serde_json::json!("B3")]
        );
    }

    #[test]
    fn removed_badges_emit_nothing() {
        let mut previous_state = candidate();
        previous_state.badge_codes = set(&["B1", "B2"]);
        let previous = snapshot_of(&previous_state);

        let mut current = previous_state;
        current.badge_codes = set(&["B1"]);

        assert!(diff(Some(&previous), &current, Utc::now(), window()).is_empty());
    }

    #[test]
    fn online_transition_is_debounced() {
        let offline = candidate();
        let mut online = candidate();
        online.online = true;

        // false -> true emits status_change
        let activities = diff(Some(&snapshot_of(&offline)), &online, Utc::now(), window());
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::StatusChange);

        // true -> true is silent
        assert!(diff(Some(&snapshot_of(&online)), &online, Utc::now(), window()).is_empty());

        // true -> false is silent
        assert!(diff(Some(&snapshot_of(&online)), &offline, Utc::now(), window()).is_empty());
    }

    #[test]
    fn photos_outside_trailing_window_are_not_announced() {
        let now = Utc::now();
        let previous = snapshot_of(&candidate());

        let mut current = candidate();
        current.photos = vec![
            PhotoObservation {
                id: "fresh".to_string(),
                taken_at: Some(now - Duration::hours(1)),
            },
            PhotoObservation {
                id: "stale".to_string(),
                taken_at: Some(now - Duration::hours(48)),
            },
            PhotoObservation {
                id: "undated".to_string(),
                taken_at: None,
            },
        ];

        let activities = diff(Some(&previous), &current, now, window());
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::PhotoPosted);
        assert_eq!(
            activities[0].new_data.as_ref().unwrap()["photo_id"],
            serde_json::json!("fresh")
        );
    }

    #[test]
    fn already_seen_photos_are_not_announced_again() {
        let now = Utc::now();
        let mut previous_state = candidate();
        previous_state.photos = vec![PhotoObservation {
            id: "p1".to_string(),
            taken_at: Some(now),
        }];
        let previous = snapshot_of(&previous_state);

        let current = previous_state;
        assert!(diff(Some(&previous), &current, now, window()).is_empty());
    }

    #[test]
    fn combined_changes_emit_one_record_each_in_rule_order() {
        let mut previous_state = candidate();
        previous_state.motto = "A".to_string();
        let previous = snapshot_of(&previous_state);

        let mut current = previous_state;
        current.motto = "B".to_string();
        current.badge_codes = set(&["X"]);
        current.online = true;

        let activities = diff(Some(&previous), &current, Utc::now(), window());
        let types: Vec<ActivityType> = activities.iter().map(|a| a.activity_type).collect();
        assert_eq!(
            types,
            vec![
                ActivityType::MottoChange,
                ActivityType::Badge,
                ActivityType::StatusChange,
            ]
        );
    }
}
