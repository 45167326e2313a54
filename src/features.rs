//! Feature table construction
//!
//! This module turns attributed offer completions into a flat modeling table:
//! - Offers ranked by their share of attributed completions and labeled
//! - Completions joined to user profiles
//! - Tenure derived from membership start dates
//! - Gender one-hot encoded with the reference category dropped

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::types::{CompositeKey, Event, EventKind, FeatureRow, FeatureTable, Offer, Profile};

/// Offer names assigned by rank, most attributed first
pub const DEFAULT_OFFER_LABELS: [&str; 10] = [
    "discount_1",
    "discount_2",
    "bogo_1",
    "bogo_2",
    "bogo_3",
    "bogo_4",
    "discount_3",
    "discount_4",
    "informational",
    "informational",
];

/// Label table mapping offer rank to a human-readable name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferLabels {
    names: Vec<String>,
}

impl Default for OfferLabels {
    fn default() -> Self {
        Self::new(DEFAULT_OFFER_LABELS.iter().map(|s| s.to_string()).collect())
    }
}

impl OfferLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Pair each ranked offer with the label at the same rank.
    ///
    /// The table and the ranking must have the same length.
    pub fn assign(&self, ranking: Vec<RankedOffer>) -> Result<Vec<LabeledOffer>, PipelineError> {
        if ranking.len() != self.names.len() {
            return Err(PipelineError::RankingMismatch {
                expected: self.names.len(),
                actual: ranking.len(),
            });
        }

        Ok(ranking
            .into_iter()
            .zip(self.names.iter())
            .map(|(ranked, name)| LabeledOffer {
                offer_id: ranked.offer_id,
                share: ranked.share,
                offer_name: name.clone(),
            })
            .collect())
    }
}

/// Offer with its share of attributed completions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOffer {
    pub offer_id: String,
    pub completions: usize,
    pub share: f64,
}

/// Ranked offer with its assigned name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledOffer {
    pub offer_id: String,
    pub share: f64,
    pub offer_name: String,
}

/// Rank catalog offers (plus any uncataloged completed offer) by share of
/// attributed completions, descending.
///
/// Offers without attributed completions rank last with a zero share. Ties
/// keep catalog order, then id order.
pub fn rank_offers(catalog: &[Offer], completions: &[&Event]) -> Vec<RankedOffer> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for event in completions {
        *counts.entry(event.payload_id.as_str()).or_insert(0) += 1;
    }
    let total = completions.len();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut entries: Vec<(usize, &str)> = Vec::new();
    for (position, offer) in catalog.iter().enumerate() {
        if seen.insert(offer.id.as_str()) {
            entries.push((position, offer.id.as_str()));
        }
    }
    for &id in counts.keys() {
        if seen.insert(id) {
            entries.push((usize::MAX, id));
        }
    }

    entries.sort_by(|(pos_a, id_a), (pos_b, id_b)| {
        let count_a = counts.get(id_a).copied().unwrap_or(0);
        let count_b = counts.get(id_b).copied().unwrap_or(0);
        count_b
            .cmp(&count_a)
            .then(pos_a.cmp(pos_b))
            .then(id_a.cmp(id_b))
    });

    entries
        .into_iter()
        .map(|(_, id)| {
            let completions = counts.get(id).copied().unwrap_or(0);
            let share = if total > 0 {
                completions as f64 / total as f64
            } else {
                0.0
            };
            RankedOffer {
                offer_id: id.to_string(),
                completions,
                share,
            }
        })
        .collect()
}

/// What to do with an attributed completion whose user has no profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Keep the row with empty profile fields
    #[default]
    NullFill,
    /// Fail with `MissingJoinTarget`
    Reject,
}

/// Result of feature construction
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureOutput {
    pub offers: Vec<LabeledOffer>,
    pub table: FeatureTable,
}

/// Builder for the flat feature table
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    labels: OfferLabels,
    join_policy: JoinPolicy,
}

impl FeatureBuilder {
    pub fn new(labels: OfferLabels, join_policy: JoinPolicy) -> Self {
        Self {
            labels,
            join_policy,
        }
    }

    /// Build one row per attributed completion event, in log order
    pub fn build(
        &self,
        events: &[Event],
        attributed: &[CompositeKey],
        catalog: &[Offer],
        profiles: &[Profile],
    ) -> Result<FeatureOutput, PipelineError> {
        let attributed: HashSet<&CompositeKey> = attributed.iter().collect();
        let completions: Vec<&Event> = events
            .iter()
            .filter(|e| e.kind == EventKind::Completed && attributed.contains(&e.key))
            .collect();

        let offers = self.labels.assign(rank_offers(catalog, &completions))?;
        let names: HashMap<&str, &str> = offers
            .iter()
            .map(|o| (o.offer_id.as_str(), o.offer_name.as_str()))
            .collect();

        let mut by_user: HashMap<&str, &Profile> = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            by_user.entry(profile.id.as_str()).or_insert(profile);
        }
        let reference_date = profiles.iter().map(|p| p.member_since).max();

        let mut joined: Vec<(&str, Option<&Profile>)> = Vec::with_capacity(completions.len());
        let mut unmatched = 0;
        for event in &completions {
            let offer_name = names
                .get(event.payload_id.as_str())
                .copied()
                .unwrap_or_default();
            let profile = by_user.get(event.user_id.as_str()).copied();
            if profile.is_none() {
                if self.join_policy == JoinPolicy::Reject {
                    return Err(PipelineError::MissingJoinTarget {
                        user_id: event.user_id.clone(),
                    });
                }
                unmatched += 1;
            }
            joined.push((offer_name, profile));
        }
        if unmatched > 0 {
            warn!(rows = unmatched, "attributed completions without a profile, fields left empty");
        }

        let categories: BTreeSet<&str> = joined
            .iter()
            .filter_map(|(_, p)| p.and_then(|p| p.gender.as_deref()))
            .collect();
        let encoded: Vec<&str> = categories.into_iter().skip(1).collect();

        let rows = joined
            .into_iter()
            .map(|(offer_name, profile)| {
                let gender = profile.and_then(|p| p.gender.as_deref());
                FeatureRow {
                    offer_name: offer_name.to_string(),
                    age: profile.map(|p| p.age),
                    income: profile.map(|p| p.income),
                    tenure_days: profile.and_then(|p| {
                        reference_date.map(|reference| (reference - p.member_since).num_days())
                    }),
                    gender_flags: encoded.iter().map(|c| gender == Some(*c)).collect(),
                }
            })
            .collect::<Vec<_>>();

        let table = FeatureTable {
            gender_columns: encoded.iter().map(|c| format!("gender_{c}")).collect(),
            rows,
        };

        info!(
            completions = completions.len(),
            ranked_offers = offers.len(),
            rows = table.rows.len(),
            "built feature table"
        );

        Ok(FeatureOutput { offers, table })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn offer(id: &str) -> Offer {
        Offer {
            id: id.to_string(),
            offer_type: "bogo".to_string(),
            channels: vec!["email".to_string()],
            reward: 5.0,
            difficulty: 5.0,
            duration: 7.0,
        }
    }

    fn profile(id: &str, gender: Option<&str>, since: (i32, u32, u32)) -> Profile {
        Profile {
            id: id.to_string(),
            gender: gender.map(str::to_string),
            age: 40,
            income: 50_000.0,
            member_since: NaiveDate::from_ymd_opt(since.0, since.1, since.2).unwrap(),
        }
    }

    fn completed(user: &str, offer: &str, t: u64) -> Event {
        Event {
            user_id: user.to_string(),
            kind: EventKind::Completed,
            payload_id: offer.to_string(),
            timestamp: t,
            key: CompositeKey::new(user, offer).unwrap(),
        }
    }

    fn key(user: &str, offer: &str) -> CompositeKey {
        CompositeKey::new(user, offer).unwrap()
    }

    #[test]
    fn test_rank_offers_by_share() {
        let catalog = vec![offer("a"), offer("b"), offer("c")];
        let events = vec![
            completed("u1", "b", 1),
            completed("u2", "b", 1),
            completed("u3", "c", 1),
            completed("u4", "z", 1),
        ];
        let refs: Vec<&Event> = events.iter().collect();
        let ranked = rank_offers(&catalog, &refs);

        let ids: Vec<&str> = ranked.iter().map(|r| r.offer_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "z", "a"]);
        assert_eq!(ranked[0].share, 0.5);
        assert_eq!(ranked[1].completions, 1);
        assert_eq!(ranked[3].share, 0.0);
    }

    #[test]
    fn test_label_count_must_match_ranking() {
        let catalog: Vec<Offer> = (0..9).map(|i| offer(&format!("o{i}"))).collect();
        let ranked = rank_offers(&catalog, &[]);

        let err = OfferLabels::default().assign(ranked).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RankingMismatch {
                expected: 10,
                actual: 9
            }
        ));
    }

    #[test]
    fn test_default_labels_cover_ten_offers() {
        let catalog: Vec<Offer> = (0..10).map(|i| offer(&format!("o{i}"))).collect();
        let events = vec![completed("u1", "o7", 3)];
        let refs: Vec<&Event> = events.iter().collect();

        let labeled = OfferLabels::default()
            .assign(rank_offers(&catalog, &refs))
            .unwrap();
        assert_eq!(labeled.len(), 10);
        assert_eq!(labeled[0].offer_id, "o7");
        assert_eq!(labeled[0].offer_name, "discount_1");
        assert_eq!(labeled[9].offer_name, "informational");
    }

    #[test]
    fn test_build_joins_profiles_and_tenure() {
        let events = vec![
            completed("u1", "a", 5),
            completed("u2", "b", 6),
            completed("u3", "a", 7),
        ];
        let attributed = vec![key("u1", "a"), key("u3", "a")];
        let profiles = vec![
            profile("u1", Some("F"), (2018, 1, 1)),
            profile("u2", Some("M"), (2018, 7, 26)),
            profile("u3", Some("M"), (2017, 12, 22)),
        ];
        let builder = FeatureBuilder::new(
            OfferLabels::new(vec!["top".to_string(), "rest".to_string()]),
            JoinPolicy::NullFill,
        );

        let output = builder
            .build(&events, &attributed, &[offer("a"), offer("b")], &profiles)
            .unwrap();

        assert_eq!(output.offers[0].offer_name, "top");
        assert_eq!(output.table.gender_columns, vec!["gender_M"]);
        assert_eq!(
            output.table.rows,
            vec![
                FeatureRow {
                    offer_name: "top".to_string(),
                    age: Some(40),
                    income: Some(50_000.0),
                    tenure_days: Some(206),
                    gender_flags: vec![false],
                },
                FeatureRow {
                    offer_name: "top".to_string(),
                    age: Some(40),
                    income: Some(50_000.0),
                    tenure_days: Some(216),
                    gender_flags: vec![true],
                },
            ]
        );
    }

    #[test]
    fn test_missing_profile_null_fill() {
        let events = vec![completed("ghost", "a", 5)];
        let output = FeatureBuilder::new(
            OfferLabels::new(vec!["only".to_string()]),
            JoinPolicy::NullFill,
        )
        .build(&events, &[key("ghost", "a")], &[offer("a")], &[])
        .unwrap();

        let row = &output.table.rows[0];
        assert_eq!(row.offer_name, "only");
        assert_eq!(row.age, None);
        assert_eq!(row.income, None);
        assert_eq!(row.tenure_days, None);
        assert!(output.table.gender_columns.is_empty());
    }

    #[test]
    fn test_missing_profile_reject() {
        let events = vec![completed("ghost", "a", 5)];
        let err = FeatureBuilder::new(
            OfferLabels::new(vec!["only".to_string()]),
            JoinPolicy::Reject,
        )
        .build(&events, &[key("ghost", "a")], &[offer("a")], &[])
        .unwrap_err();

        assert!(matches!(err, PipelineError::MissingJoinTarget { user_id } if user_id == "ghost"));
    }

    #[test]
    fn test_gender_one_hot_drops_reference_category() {
        let events = vec![
            completed("u1", "a", 1),
            completed("u2", "a", 1),
            completed("u3", "a", 1),
            completed("u4", "a", 1),
        ];
        let attributed: Vec<CompositeKey> =
            ["u1", "u2", "u3", "u4"].iter().map(|u| key(u, "a")).collect();
        let profiles = vec![
            profile("u1", Some("O"), (2018, 1, 1)),
            profile("u2", Some("F"), (2018, 1, 1)),
            profile("u3", Some("M"), (2018, 1, 1)),
        ];

        let output = FeatureBuilder::new(
            OfferLabels::new(vec!["a".to_string()]),
            JoinPolicy::NullFill,
        )
        .build(&events, &attributed, &[offer("a")], &profiles)
        .unwrap();

        assert_eq!(output.table.gender_columns, vec!["gender_M", "gender_O"]);
        let flags: Vec<Vec<bool>> = output
            .table
            .rows
            .iter()
            .map(|r| r.gender_flags.clone())
            .collect();
        assert_eq!(
            flags,
            vec![
                vec![false, true],
                vec![false, false],
                vec![true, false],
                vec![false, false],
            ]
        );
    }
}
