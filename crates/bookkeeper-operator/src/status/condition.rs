use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use strum::IntoEnumIterator;

use crate::crd::{ClusterCondition, ClusterConditionStatus, ClusterConditionType};

/// Inserts or updates the condition of `condition.type_`.
///
/// The transition time only moves when the status flips, the update time moves whenever status,
/// reason or message change. A condition that is already equal is left untouched, so repeated
/// passes over an unchanged cluster produce an identical list.
pub fn upsert(conditions: &mut Vec<ClusterCondition>, condition: ClusterCondition, now: &Time) {
    let Some(existing) = conditions
        .iter_mut()
        .find(|existing| existing.type_ == condition.type_)
    else {
        conditions.push(ClusterCondition {
            last_transition_time: Some(now.clone()),
            last_update_time: Some(now.clone()),
            ..condition
        });
        return;
    };

    if existing.status != condition.status {
        existing.status = condition.status;
        existing.last_transition_time = Some(now.clone());
        existing.last_update_time = Some(now.clone());
    } else if existing.reason == condition.reason && existing.message == condition.message {
        return;
    } else {
        existing.last_update_time = Some(now.clone());
    }
    existing.reason = condition.reason;
    existing.message = condition.message;
}

/// Every condition type, all `False`. Used for a status that has no conditions yet.
pub fn initial_conditions(now: &Time) -> Vec<ClusterCondition> {
    ClusterConditionType::iter()
        .map(|type_| ClusterCondition {
            type_,
            status: ClusterConditionStatus::False,
            reason: None,
            message: None,
            last_update_time: Some(now.clone()),
            last_transition_time: Some(now.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::time;

    fn ready(status: ClusterConditionStatus, reason: &str) -> ClusterCondition {
        ClusterCondition {
            type_: ClusterConditionType::Ready,
            status,
            reason: Some(reason.to_owned()),
            message: Some(format!("{reason} message")),
            ..ClusterCondition::default()
        }
    }

    #[test]
    fn missing_condition_is_appended() {
        let mut conditions = Vec::new();

        upsert(
            &mut conditions,
            ready(ClusterConditionStatus::True, "Ready"),
            &time(10),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, Some(time(10)));
        assert_eq!(conditions[0].last_update_time, Some(time(10)));
    }

    #[test]
    fn status_flip_moves_both_times() {
        let mut conditions = Vec::new();
        upsert(
            &mut conditions,
            ready(ClusterConditionStatus::False, "NotReady"),
            &time(10),
        );

        upsert(
            &mut conditions,
            ready(ClusterConditionStatus::True, "Ready"),
            &time(20),
        );

        assert_eq!(conditions[0].status, ClusterConditionStatus::True);
        assert_eq!(conditions[0].reason.as_deref(), Some("Ready"));
        assert_eq!(conditions[0].last_transition_time, Some(time(20)));
        assert_eq!(conditions[0].last_update_time, Some(time(20)));
    }

    #[test]
    fn reason_change_only_moves_update_time() {
        let mut conditions = Vec::new();
        upsert(
            &mut conditions,
            ready(ClusterConditionStatus::False, "NotReady"),
            &time(10),
        );

        upsert(
            &mut conditions,
            ready(ClusterConditionStatus::False, "Scaling"),
            &time(20),
        );

        assert_eq!(conditions[0].reason.as_deref(), Some("Scaling"));
        assert_eq!(conditions[0].last_transition_time, Some(time(10)));
        assert_eq!(conditions[0].last_update_time, Some(time(20)));
    }

    #[test]
    fn identical_condition_is_untouched() {
        let mut conditions = Vec::new();
        upsert(
            &mut conditions,
            ready(ClusterConditionStatus::True, "Ready"),
            &time(10),
        );
        let before = conditions.clone();

        upsert(
            &mut conditions,
            ready(ClusterConditionStatus::True, "Ready"),
            &time(20),
        );

        assert_eq!(conditions, before);
    }

    #[test]
    fn initial_conditions_cover_every_type() {
        let conditions = initial_conditions(&time(1));

        let types: Vec<_> = conditions.iter().map(|c| c.type_).collect();
        assert_eq!(types, vec![
            ClusterConditionType::Preparing,
            ClusterConditionType::Ready,
            ClusterConditionType::Error
        ]);
        assert!(
            conditions
                .iter()
                .all(|c| c.status == ClusterConditionStatus::False)
        );
    }
}
