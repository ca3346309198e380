//! Strategy implementations. `select` returns the surviving
//! `(value, rule_name, record_id, source_id)` for one field given its
//! observations across a cluster.

use std::cmp::Ordering;
use std::collections::HashMap;

use mdm_core::error::MdmResult;
use mdm_core::types::{AttributeValue, RecordId};

use crate::{config_error, custom::custom_strategy_registry, FieldObservation};

type Survivor = (AttributeValue, String, RecordId, String);

/// Total order over observations for deterministic tie-breaking: higher
/// trust first, then later source_timestamp, then lexicographically
/// smaller source_id, then lexicographically smaller record_id.
fn tie_break_cmp(a: &FieldObservation, b: &FieldObservation) -> Ordering {
    b.trust
        .partial_cmp(&a.trust)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.source_timestamp.cmp(&a.source_timestamp))
        .then_with(|| a.source_id.cmp(&b.source_id))
        .then_with(|| a.record_id.cmp(&b.record_id))
}

fn best_by_tie_break(observations: &[FieldObservation]) -> &FieldObservation {
    observations
        .iter()
        .min_by(|a, b| tie_break_cmp(a, b))
        .expect("observations is non-empty")
}

pub fn select(
    strategy: &str,
    observations: &[FieldObservation],
    source_precedence: &[String],
) -> MdmResult<Option<Survivor>> {
    match strategy {
        "most_trusted" => Ok(Some(most_trusted(observations))),
        "most_recent" => Ok(Some(most_recent(observations))),
        "trusted_source_priority" => Ok(trusted_source_priority(observations, source_precedence)),
        "most_frequent" => Ok(Some(most_frequent(observations))),
        "longest" => Ok(Some(length_based(observations, true))),
        "shortest" => Ok(Some(length_based(observations, false))),
        "weighted_average" => Ok(weighted_average(observations)),
        other => {
            if let Some(custom) = custom_strategy_registry().get(other) {
                Ok(Some(custom(observations)))
            } else {
                Err(config_error(format!("unknown survivorship strategy '{other}'")))
            }
        }
    }
}

fn to_survivor(obs: &FieldObservation) -> Survivor {
    (
        obs.value.clone(),
        String::new(),
        obs.record_id.clone(),
        obs.source_id.clone(),
    )
}

fn most_trusted(observations: &[FieldObservation]) -> Survivor {
    let winner = best_by_tie_break(observations);
    let (value, _, record_id, source_id) = to_survivor(winner);
    (value, "most_trusted".to_string(), record_id, source_id)
}

fn most_recent(observations: &[FieldObservation]) -> Survivor {
    let winner = observations
        .iter()
        .max_by(|a, b| {
            a.source_timestamp
                .cmp(&b.source_timestamp)
                .then_with(|| tie_break_cmp(b, a))
        })
        .expect("observations is non-empty");
    let (value, _, record_id, source_id) = to_survivor(winner);
    (value, "most_recent".to_string(), record_id, source_id)
}

fn trusted_source_priority(
    observations: &[FieldObservation],
    source_precedence: &[String],
) -> Option<Survivor> {
    for source_id in source_precedence {
        if let Some(obs) = observations.iter().find(|o| &o.source_id == source_id) {
            let (value, _, record_id, sid) = to_survivor(obs);
            return Some((value, "trusted_source_priority".to_string(), record_id, sid));
        }
    }
    // no configured source matched; fall back to the tie-break order so the
    // field is never silently dropped when precedence coverage is partial
    observations.first().map(|_| most_trusted(observations)).map(|(v, _, r, s)| {
        (v, "trusted_source_priority:fallback".to_string(), r, s)
    })
}

fn most_frequent(observations: &[FieldObservation]) -> Survivor {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for obs in observations {
        if let Some(text) = obs.value.as_text() {
            *counts.entry(text).or_insert(0) += 1;
        }
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    let tied: Vec<&FieldObservation> = observations
        .iter()
        .filter(|o| {
            o.value
                .as_text()
                .map(|t| counts.get(&t).copied().unwrap_or(0) == max_count)
                .unwrap_or(false)
        })
        .collect();
    let winner = tied
        .iter()
        .min_by(|a, b| tie_break_cmp(a, b))
        .copied()
        .unwrap_or_else(|| best_by_tie_break(observations));
    let (value, _, record_id, source_id) = to_survivor(winner);
    (value, "most_frequent".to_string(), record_id, source_id)
}

fn length_based(observations: &[FieldObservation], longest: bool) -> Survivor {
    let winner = observations
        .iter()
        .filter_map(|o| o.value.as_text().map(|t| (o, t.chars().count())))
        .max_by(|(a_obs, a_len), (b_obs, b_len)| {
            let primary = if longest {
                a_len.cmp(b_len)
            } else {
                b_len.cmp(a_len)
            };
            primary.then_with(|| tie_break_cmp(b_obs, a_obs))
        })
        .map(|(o, _)| o)
        .unwrap_or_else(|| best_by_tie_break(observations));
    let (value, _, record_id, source_id) = to_survivor(winner);
    let rule = if longest { "longest" } else { "shortest" };
    (value, rule.to_string(), record_id, source_id)
}

fn weighted_average(observations: &[FieldObservation]) -> Option<Survivor> {
    let numeric: Vec<(&FieldObservation, f64)> = observations
        .iter()
        .filter_map(|o| o.value.as_number().map(|n| (o, n)))
        .collect();
    if numeric.is_empty() {
        return None;
    }
    let total_trust: f64 = numeric.iter().map(|(o, _)| o.trust).sum();
    let value = if total_trust > 0.0 {
        numeric.iter().map(|(o, n)| o.trust * n).sum::<f64>() / total_trust
    } else {
        numeric.iter().map(|(_, n)| n).sum::<f64>() / numeric.len() as f64
    };
    let representative = best_by_tie_break(observations);
    Some((
        AttributeValue::Number(value),
        "weighted_average".to_string(),
        representative.record_id.clone(),
        representative.source_id.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn obs(record_id: &str, source_id: &str, value: AttributeValue, trust: f64, age_days: i64) -> FieldObservation {
        FieldObservation {
            value,
            source_id: source_id.to_string(),
            record_id: record_id.to_string(),
            trust,
            source_timestamp: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn most_trusted_selects_highest_trust() {
        let observations = vec![
            obs("r1", "legacy", AttributeValue::String("a".into()), 0.2, 0),
            obs("r2", "crm", AttributeValue::String("b".into()), 0.8, 0),
        ];
        let (value, _, record_id, _) = select("most_trusted", &observations, &[]).unwrap().unwrap();
        assert_eq!(value, AttributeValue::String("b".into()));
        assert_eq!(record_id, "r2");
    }

    #[test]
    fn most_recent_selects_latest_timestamp() {
        let observations = vec![
            obs("r1", "legacy", AttributeValue::String("old".into()), 0.9, 30),
            obs("r2", "crm", AttributeValue::String("new".into()), 0.1, 0),
        ];
        let (value, ..) = select("most_recent", &observations, &[]).unwrap().unwrap();
        assert_eq!(value, AttributeValue::String("new".into()));
    }

    #[test]
    fn trusted_source_priority_honors_order() {
        let observations = vec![
            obs("r1", "legacy", AttributeValue::String("a".into()), 0.9, 0),
            obs("r2", "crm", AttributeValue::String("b".into()), 0.1, 0),
        ];
        let precedence = vec!["crm".to_string(), "legacy".to_string()];
        let (value, ..) = select("trusted_source_priority", &observations, &precedence)
            .unwrap()
            .unwrap();
        assert_eq!(value, AttributeValue::String("b".into()));
    }

    #[test]
    fn most_frequent_breaks_ties_with_trust() {
        let observations = vec![
            obs("r1", "a", AttributeValue::String("x".into()), 0.9, 0),
            obs("r2", "b", AttributeValue::String("y".into()), 0.1, 0),
            obs("r3", "c", AttributeValue::String("y".into()), 0.1, 0),
        ];
        let (value, ..) = select("most_frequent", &observations, &[]).unwrap().unwrap();
        assert_eq!(value, AttributeValue::String("y".into()));
    }

    #[test]
    fn weighted_average_computes_trust_weighted_mean() {
        let observations = vec![
            obs("r1", "a", AttributeValue::Number(10.0), 1.0, 0),
            obs("r2", "b", AttributeValue::Number(20.0), 0.0, 0),
        ];
        let (value, ..) = select("weighted_average", &observations, &[]).unwrap().unwrap();
        assert_eq!(value, AttributeValue::Number(10.0));
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let observations = vec![obs("r1", "a", AttributeValue::String("x".into()), 1.0, 0)];
        assert!(select("not_a_strategy", &observations, &[]).is_err());
    }
}
