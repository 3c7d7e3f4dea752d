// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The slice of the election manifest that encryption consumes: contest and
//! selection descriptions, ballot styles, and the write-in flag on
//! candidates. Loading and validating a full manifest is a collaborator's
//! job; this module only carries the fields the pipeline reads.

use serde::{Deserialize, Serialize};

use crate::group::ElementModQ;
use crate::hash::{CryptoHashable, HashInput, hash_elems};

/// A selectable option within a contest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectionDescription {
    pub object_id: String,
    pub sequence_order: u64,
    pub candidate_id: String,
}

impl SelectionDescription {
    pub fn new(object_id: &str, sequence_order: u64, candidate_id: &str) -> Self {
        Self {
            object_id: object_id.to_string(),
            sequence_order,
            candidate_id: candidate_id.to_string(),
        }
    }
}

impl CryptoHashable for SelectionDescription {
    fn crypto_hash(&self) -> ElementModQ {
        hash_elems(&[
            (&self.object_id).into(),
            self.sequence_order.into(),
            (&self.candidate_id).into(),
        ])
    }
}

/// A contest as the encryption pipeline sees it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContestDescription {
    pub object_id: String,
    /// The geopolitical unit whose ballot styles carry this contest.
    pub electoral_district_id: String,
    pub sequence_order: u64,
    /// The selection limit `L` witnessed by the contest range proof.
    pub number_elected: u64,
    pub votes_allowed: u64,
    pub selections: Vec<SelectionDescription>,
}

impl ContestDescription {
    pub fn new(
        object_id: &str,
        electoral_district_id: &str,
        sequence_order: u64,
        number_elected: u64,
        votes_allowed: u64,
        selections: Vec<SelectionDescription>,
    ) -> Self {
        Self {
            object_id: object_id.to_string(),
            electoral_district_id: electoral_district_id.to_string(),
            sequence_order,
            number_elected,
            votes_allowed,
            selections,
        }
    }
}

impl CryptoHashable for ContestDescription {
    fn crypto_hash(&self) -> ElementModQ {
        let selection_hashes: Vec<ElementModQ> =
            self.selections.iter().map(|s| s.crypto_hash()).collect();
        let mut items: Vec<HashInput> = vec![
            (&self.object_id).into(),
            (&self.electoral_district_id).into(),
            self.sequence_order.into(),
            self.number_elected.into(),
            self.votes_allowed.into(),
        ];
        items.push(HashInput::List(
            selection_hashes.iter().map(HashInput::from).collect(),
        ));
        hash_elems(&items)
    }
}

/// A contest plus its placeholder selections. Placeholders pad 1.0-era
/// constant proofs; under the 2.0 ranged proof the list stays empty, but the
/// shape is retained for compatibility.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContestDescriptionWithPlaceholders {
    #[serde(flatten)]
    pub contest: ContestDescription,
    pub placeholders: Vec<SelectionDescription>,
}

impl ContestDescriptionWithPlaceholders {
    pub fn without_placeholders(contest: ContestDescription) -> Self {
        Self {
            contest,
            placeholders: Vec::new(),
        }
    }
}

impl CryptoHashable for ContestDescriptionWithPlaceholders {
    fn crypto_hash(&self) -> ElementModQ {
        self.contest.crypto_hash()
    }
}

/// A ballot style naming the geopolitical units whose contests it carries.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BallotStyle {
    pub object_id: String,
    pub geopolitical_unit_ids: Vec<String>,
}

impl BallotStyle {
    pub fn new(object_id: &str, geopolitical_unit_ids: Vec<String>) -> Self {
        Self {
            object_id: object_id.to_string(),
            geopolitical_unit_ids,
        }
    }
}

/// The candidate fields encryption cares about: identity and whether votes
/// for it carry write-in text.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub object_id: String,
    pub is_write_in: bool,
}

impl Candidate {
    pub fn new(object_id: &str, is_write_in: bool) -> Self {
        Self {
            object_id: object_id.to_string(),
            is_write_in,
        }
    }
}

/// The internal (pre-flattened) manifest consumed by ballot encryption.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InternalManifest {
    pub manifest_hash: ElementModQ,
    pub contests: Vec<ContestDescriptionWithPlaceholders>,
    pub ballot_styles: Vec<BallotStyle>,
    pub candidates: Vec<Candidate>,
}

impl InternalManifest {
    pub fn new(
        manifest_hash: ElementModQ,
        contests: Vec<ContestDescriptionWithPlaceholders>,
        ballot_styles: Vec<BallotStyle>,
        candidates: Vec<Candidate>,
    ) -> Self {
        Self {
            manifest_hash,
            contests,
            ballot_styles,
            candidates,
        }
    }

    pub fn ballot_style(&self, style_id: &str) -> Option<&BallotStyle> {
        self.ballot_styles.iter().find(|s| s.object_id == style_id)
    }

    /// The contests on a ballot style, in manifest order: those whose
    /// electoral district is one of the style's geopolitical units. Empty
    /// for an unknown style.
    pub fn contests_for(&self, style_id: &str) -> Vec<&ContestDescriptionWithPlaceholders> {
        let Some(style) = self.ballot_style(style_id) else {
            return Vec::new();
        };
        self.contests
            .iter()
            .filter(|c| {
                style
                    .geopolitical_unit_ids
                    .iter()
                    .any(|unit| *unit == c.contest.electoral_district_id)
            })
            .collect()
    }

    pub fn contest(&self, object_id: &str) -> Option<&ContestDescriptionWithPlaceholders> {
        self.contests.iter().find(|c| c.contest.object_id == object_id)
    }

    pub fn candidate(&self, object_id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.object_id == object_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    /// Two districts, two styles: style 1 sees only contest 1, style 2
    /// sees both.
    fn manifest() -> InternalManifest {
        let city_contest = ContestDescription::new(
            "contest-1",
            "gp-unit-1",
            1,
            1,
            1,
            vec![
                SelectionDescription::new("sel-A", 1, "candidate-A"),
                SelectionDescription::new("sel-B", 2, "candidate-B"),
            ],
        );
        let county_contest = ContestDescription::new(
            "contest-2",
            "gp-unit-2",
            2,
            1,
            1,
            vec![SelectionDescription::new("sel-C", 1, "candidate-A")],
        );
        InternalManifest::new(
            ElementModQ::from_u64(1),
            vec![
                ContestDescriptionWithPlaceholders::without_placeholders(city_contest),
                ContestDescriptionWithPlaceholders::without_placeholders(county_contest),
            ],
            vec![
                BallotStyle::new("ballot-style-1", vec!["gp-unit-1".into()]),
                BallotStyle::new(
                    "ballot-style-2",
                    vec!["gp-unit-1".into(), "gp-unit-2".into()],
                ),
            ],
            vec![
                Candidate::new("candidate-A", false),
                Candidate::new("candidate-B", true),
            ],
        )
    }

    #[test]
    fn style_and_contest_lookup() {
        let m = manifest();
        assert!(m.ballot_style("ballot-style-1").is_some());
        assert!(m.ballot_style("missing").is_none());
        assert!(m.contest("contest-1").is_some());
        assert!(m.candidate("candidate-B").unwrap().is_write_in);
    }

    #[test]
    fn contests_follow_the_style_districts() {
        let m = manifest();

        let narrow: Vec<&str> = m
            .contests_for("ballot-style-1")
            .iter()
            .map(|c| c.contest.object_id.as_str())
            .collect();
        assert_eq!(narrow, vec!["contest-1"]);

        let wide: Vec<&str> = m
            .contests_for("ballot-style-2")
            .iter()
            .map(|c| c.contest.object_id.as_str())
            .collect();
        assert_eq!(wide, vec!["contest-1", "contest-2"]);

        assert!(m.contests_for("missing").is_empty());
    }

    #[test]
    fn description_hashes_bind_their_fields() {
        let a = SelectionDescription::new("sel-A", 1, "candidate-A");
        let b = SelectionDescription::new("sel-A", 2, "candidate-A");
        assert_ne!(a.crypto_hash(), b.crypto_hash());

        let m = manifest();
        let contest = &m.contests[0];
        let mut renamed = contest.clone();
        renamed.contest.number_elected = 2;
        assert_ne!(contest.crypto_hash(), renamed.crypto_hash());

        let mut moved = contest.clone();
        moved.contest.electoral_district_id = "gp-unit-2".to_string();
        assert_ne!(contest.crypto_hash(), moved.crypto_hash());
    }
}
