// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gear assignment based on activity rules.
//!
//! Rules map a condition to a Strava gear ID. The only supported condition
//! today is `trainer`: indoor rides get the configured trainer bike.

use crate::services::strava::StravaClient;

/// A rule mapping a condition to a Strava gear ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GearRule {
    pub condition: String,
    pub gear_id: String,
}

/// Result of a gear assignment pass.
#[derive(Debug, Default)]
pub struct GearAssignmentResult {
    pub checked: u32,
    pub updated: u32,
    pub already_correct: u32,
    pub errors: u32,
}

/// Parse gear rules from a config string.
///
/// Format: `condition:gear_id[,condition:gear_id,...]`
/// Example: `trainer:b3513943`
pub fn parse_gear_rules(rules_str: &str) -> Vec<GearRule> {
    let mut rules = Vec::new();
    for part in rules_str.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((condition, gear_id)) = part.split_once(':') else {
            tracing::warn!(rule = part, "Invalid gear rule format");
            continue;
        };
        let condition = condition.trim();
        let gear_id = gear_id.trim();
        if !condition.is_empty() && !gear_id.is_empty() {
            rules.push(GearRule {
                condition: condition.to_string(),
                gear_id: gear_id.to_string(),
            });
        }
    }
    rules
}

fn matches_rule(activity: &crate::services::strava::StravaActivitySummary, rule: &GearRule) -> bool {
    if rule.condition == "trainer" {
        return activity.trainer && activity.sport_type == "Ride";
    }
    tracing::debug!(condition = %rule.condition, "Unknown gear rule condition");
    false
}

/// Check recent Strava activities and assign gear based on rules.
pub async fn apply_gear_rules(
    client: &StravaClient,
    access_token: &str,
    rules: &[GearRule],
    after: i64,
    limit: u32,
) -> GearAssignmentResult {
    let mut result = GearAssignmentResult::default();

    let activities = match client.list_activities(access_token, after, 1, limit).await {
        Ok(activities) => activities,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to fetch activities for gear assignment");
            return result;
        }
    };

    for activity in activities {
        result.checked += 1;

        let Some(rule) = rules.iter().find(|r| matches_rule(&activity, r)) else {
            continue;
        };

        if activity.gear_id.as_deref() == Some(rule.gear_id.as_str()) {
            result.already_correct += 1;
            continue;
        }

        match client
            .update_activity_gear(access_token, activity.id, &rule.gear_id)
            .await
        {
            Ok(()) => {
                result.updated += 1;
                tracing::info!(
                    gear_id = %rule.gear_id,
                    activity_id = activity.id,
                    name = %activity.name,
                    "Assigned gear"
                );
            }
            Err(e) => {
                result.errors += 1;
                tracing::warn!(activity_id = activity.id, error = %e, "Failed to assign gear");
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::strava::StravaActivitySummary;

    #[test]
    fn test_parse_single_rule() {
        let rules = parse_gear_rules("trainer:b3513943");
        assert_eq!(
            rules,
            vec![GearRule {
                condition: "trainer".to_string(),
                gear_id: "b3513943".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_multiple_rules_with_whitespace() {
        let rules = parse_gear_rules(" trainer:b1 , trainer:b2 ");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].gear_id, "b2");
    }

    #[test]
    fn test_parse_skips_malformed_entries() {
        let rules = parse_gear_rules("nonsense,trainer:b1,:,x:");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].condition, "trainer");
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(parse_gear_rules("").is_empty());
        assert!(parse_gear_rules("   ").is_empty());
    }

    fn ride(trainer: bool, sport_type: &str) -> StravaActivitySummary {
        StravaActivitySummary {
            id: 1,
            name: "Test".to_string(),
            sport_type: sport_type.to_string(),
            trainer,
            gear_id: None,
        }
    }

    #[test]
    fn test_trainer_rule_matches_indoor_ride_only() {
        let rule = GearRule {
            condition: "trainer".to_string(),
            gear_id: "b1".to_string(),
        };
        assert!(matches_rule(&ride(true, "Ride"), &rule));
        assert!(!matches_rule(&ride(false, "Ride"), &rule));
        assert!(!matches_rule(&ride(true, "Run"), &rule));
    }

    #[test]
    fn test_unknown_condition_never_matches() {
        let rule = GearRule {
            condition: "raining".to_string(),
            gear_id: "b1".to_string(),
        };
        assert!(!matches_rule(&ride(true, "Ride"), &rule));
    }
}
