//! Tag co-occurrence graph and tier classification.
//!
//! The graph is a plain value: it is built from a problem set in one pass, handed
//! to storage as a whole, and loaded back as a whole. Nothing here keeps state
//! between rebuilds.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{Problem, ProblemCounts, TagName, TagNode, Tier};

/// Suggestions returned by [`TagGraph::next_tier_suggestion`].
pub const TIER_SUGGESTION_LIMIT: usize = 5;

/// Classify a tag into a learning tier from its per-difficulty problem counts.
///
/// Pure and total: identical counts always yield the identical tier.
#[must_use]
pub fn classify(counts: &ProblemCounts) -> Tier {
    let ProblemCounts { easy, medium, hard } = *counts;
    let total = counts.total();
    let complexity_ratio = if total > 0 {
        (f64::from(hard) + 0.5 * f64::from(medium)) / f64::from(total)
    } else {
        1.0
    };

    if total >= 150 || (easy > hard && easy >= 10) {
        return Tier::CoreConcept;
    }
    if (medium >= easy && medium >= hard) || (50..150).contains(&total) {
        return Tier::FundamentalTechnique;
    }
    let advanced = (hard > easy && hard > medium) || total < 50 || complexity_ratio >= 0.7;
    if advanced && medium <= hard {
        Tier::AdvancedTechnique
    } else {
        Tier::FundamentalTechnique
    }
}

/// Next tier to work on and the tags suggested within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSuggestion {
    pub classification: Tier,
    #[serde(rename = "unmastered_tags")]
    pub suggested: Vec<TagName>,
}

impl TierSuggestion {
    /// True when every tier is mastered and nothing is left to suggest.
    #[must_use]
    pub fn is_fully_mastered(&self) -> bool {
        self.suggested.is_empty()
    }
}

/// Weighted, undirected co-occurrence graph over normalized tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagGraph {
    nodes: BTreeMap<TagName, TagNode>,
}

impl TagGraph {
    /// Build a fresh graph from a problem set.
    ///
    /// Every unordered pair of distinct tags on a problem gains the problem's
    /// difficulty multiplier in both directions, so weights stay symmetric.
    pub fn build<'a>(problems: impl IntoIterator<Item = &'a Problem>) -> Self {
        let mut counts: BTreeMap<TagName, ProblemCounts> = BTreeMap::new();
        let mut related: HashMap<TagName, BTreeMap<TagName, u32>> = HashMap::new();

        for problem in problems {
            let mut tags: Vec<&TagName> = problem.tags.iter().collect();
            tags.sort();
            tags.dedup();

            let weight = problem.difficulty.weight_multiplier();
            for tag in &tags {
                counts
                    .entry((*tag).clone())
                    .or_default()
                    .record(problem.difficulty);
            }
            for (i, a) in tags.iter().enumerate() {
                for b in &tags[i + 1..] {
                    bump(&mut related, a, b, weight);
                    bump(&mut related, b, a, weight);
                }
            }
        }

        let nodes = counts
            .into_iter()
            .map(|(tag, counts)| {
                let node = TagNode {
                    related: related.remove(&tag).unwrap_or_default(),
                    classification: classify(&counts),
                    counts,
                    tag: tag.clone(),
                };
                (tag, node)
            })
            .collect();

        Self { nodes }
    }

    /// Reassemble a graph from persisted nodes.
    pub fn from_nodes(nodes: impl IntoIterator<Item = TagNode>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.tag.clone(), n)).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn node(&self, tag: &TagName) -> Option<&TagNode> {
        self.nodes.get(tag)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TagNode> {
        self.nodes.values()
    }

    #[must_use]
    pub fn into_nodes(self) -> Vec<TagNode> {
        self.nodes.into_values().collect()
    }

    /// Edge weight between two tags; zero when unrelated.
    #[must_use]
    pub fn weight(&self, a: &TagName, b: &TagName) -> u32 {
        self.nodes.get(a).map_or(0, |node| node.weight_to(b))
    }

    #[must_use]
    pub fn tier_of(&self, tag: &TagName) -> Option<Tier> {
        self.nodes.get(tag).map(|node| node.classification)
    }

    /// Tags classified into `tier`, in name order.
    #[must_use]
    pub fn tags_in_tier(&self, tier: Tier) -> Vec<&TagName> {
        self.nodes
            .values()
            .filter(|node| node.classification == tier)
            .map(|node| &node.tag)
            .collect()
    }

    /// Neighbor-weight map for every tag.
    #[must_use]
    pub fn relationships(&self) -> BTreeMap<TagName, BTreeMap<TagName, u32>> {
        self.nodes
            .iter()
            .map(|(tag, node)| (tag.clone(), node.related.clone()))
            .collect()
    }

    /// Missing tags most related to what is already mastered, with their scores.
    ///
    /// Scores add up across mastered tags. Ordering is by descending score; equal
    /// scores keep the order in which the candidate was first reached.
    #[must_use]
    pub fn related_tags_scored(
        &self,
        mastered: &[TagName],
        missing: &[TagName],
        limit: usize,
    ) -> Vec<(TagName, u64)> {
        let missing: HashSet<&TagName> = missing.iter().collect();
        let mut visited: HashSet<&TagName> = HashSet::new();
        let mut position: HashMap<&TagName, usize> = HashMap::new();
        let mut scored: Vec<(TagName, u64)> = Vec::new();

        for tag in mastered {
            if !visited.insert(tag) {
                continue;
            }
            let Some(node) = self.nodes.get(tag) else {
                continue;
            };
            for (neighbor, weight) in &node.related {
                if !missing.contains(neighbor) {
                    continue;
                }
                let idx = *position.entry(neighbor).or_insert_with(|| {
                    scored.push((neighbor.clone(), 0));
                    scored.len() - 1
                });
                scored[idx].1 += u64::from(*weight);
            }
        }

        // `sort_by` is stable, which preserves first-seen order among ties.
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(limit);
        scored
    }

    #[must_use]
    pub fn related_tags(
        &self,
        mastered: &[TagName],
        missing: &[TagName],
        limit: usize,
    ) -> Vec<TagName> {
        self.related_tags_scored(mastered, missing, limit)
            .into_iter()
            .map(|(tag, _)| tag)
            .collect()
    }

    /// First tier with unmastered tags, and up to `limit` tags to learn next in it.
    ///
    /// Related tags come first; if fewer than `limit` are related to anything
    /// mastered, the rest of the tier's missing tags fill in, most common first.
    /// With every tier mastered the result is the last tier and no suggestions.
    #[must_use]
    pub fn next_tier_suggestion(
        &self,
        mastered: &BTreeSet<TagName>,
        limit: usize,
    ) -> TierSuggestion {
        let mastered_list: Vec<TagName> = mastered.iter().cloned().collect();

        for tier in Tier::ORDER {
            let mut missing: Vec<&TagNode> = self
                .nodes
                .values()
                .filter(|node| node.classification == tier && !mastered.contains(&node.tag))
                .collect();
            if missing.is_empty() {
                continue;
            }

            let missing_tags: Vec<TagName> = missing.iter().map(|n| n.tag.clone()).collect();
            let mut suggested = self.related_tags(&mastered_list, &missing_tags, limit);

            if suggested.len() < limit {
                missing.sort_by(|a, b| {
                    b.counts
                        .total()
                        .cmp(&a.counts.total())
                        .then_with(|| a.tag.cmp(&b.tag))
                });
                for node in missing {
                    if suggested.len() >= limit {
                        break;
                    }
                    if !suggested.contains(&node.tag) {
                        suggested.push(node.tag.clone());
                    }
                }
            }

            return TierSuggestion {
                classification: tier,
                suggested,
            };
        }

        TierSuggestion {
            classification: Tier::AdvancedTechnique,
            suggested: Vec::new(),
        }
    }
}

fn bump(
    related: &mut HashMap<TagName, BTreeMap<TagName, u32>>,
    from: &TagName,
    to: &TagName,
    weight: u32,
) {
    let entry = related
        .entry(from.clone())
        .or_default()
        .entry(to.clone())
        .or_insert(0);
    *entry = entry.saturating_add(weight);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, ProblemId};

    fn tag(name: &str) -> TagName {
        TagName::new(name).unwrap()
    }

    fn problem(id: u64, tags: &[&str], difficulty: Difficulty) -> Problem {
        Problem::new(
            ProblemId::new(id),
            format!("P{id}"),
            tags.iter().map(|t| tag(t)),
            difficulty,
        )
    }

    fn sample_catalog() -> Vec<Problem> {
        vec![
            problem(1, &["array", "hash table"], Difficulty::Easy),
            problem(2, &["array", "two pointers"], Difficulty::Medium),
            problem(3, &["array", "hash table", "sorting"], Difficulty::Hard),
            problem(4, &["graph", "bfs"], Difficulty::Medium),
        ]
    }

    #[test]
    fn weights_follow_difficulty_multipliers() {
        let graph = TagGraph::build(&sample_catalog());
        // Easy (3) + Hard (1)
        assert_eq!(graph.weight(&tag("array"), &tag("hash table")), 4);
        assert_eq!(graph.weight(&tag("array"), &tag("two pointers")), 2);
        assert_eq!(graph.weight(&tag("array"), &tag("graph")), 0);
    }

    #[test]
    fn weights_are_symmetric() {
        let graph = TagGraph::build(&sample_catalog());
        for node in graph.nodes() {
            for (other, w) in &node.related {
                assert_eq!(graph.weight(other, &node.tag), *w);
            }
        }
    }

    #[test]
    fn counts_are_per_difficulty() {
        let graph = TagGraph::build(&sample_catalog());
        let array = graph.node(&tag("array")).unwrap();
        assert_eq!(array.counts, ProblemCounts::new(1, 1, 1));
    }

    #[test]
    fn single_tag_problem_creates_isolated_node() {
        let graph = TagGraph::build(&[problem(1, &["math"], Difficulty::Easy)]);
        let node = graph.node(&tag("math")).unwrap();
        assert!(node.related.is_empty());
        assert_eq!(node.counts.easy, 1);
    }

    #[test]
    fn rebuild_is_deterministic() {
        let catalog = sample_catalog();
        assert_eq!(TagGraph::build(&catalog), TagGraph::build(&catalog));
    }

    #[test]
    fn classify_core_by_volume_or_easy_majority() {
        assert_eq!(classify(&ProblemCounts::new(0, 0, 150)), Tier::CoreConcept);
        assert_eq!(classify(&ProblemCounts::new(10, 30, 5)), Tier::CoreConcept);
    }

    #[test]
    fn classify_fundamental_by_medium_majority_or_mid_volume() {
        assert_eq!(classify(&ProblemCounts::new(2, 5, 3)), Tier::FundamentalTechnique);
        assert_eq!(classify(&ProblemCounts::new(0, 10, 60)), Tier::FundamentalTechnique);
    }

    #[test]
    fn classify_advanced_when_hard_dominates() {
        assert_eq!(classify(&ProblemCounts::new(1, 2, 8)), Tier::AdvancedTechnique);
    }

    #[test]
    fn classify_tie_break_prefers_fundamental_when_medium_exceeds_hard() {
        // Falls to the advanced branch on volume, but medium > hard.
        assert_eq!(classify(&ProblemCounts::new(5, 3, 2)), Tier::FundamentalTechnique);
        // Same shape without the medium lead stays advanced.
        assert_eq!(classify(&ProblemCounts::new(5, 2, 2)), Tier::AdvancedTechnique);
    }

    #[test]
    fn classify_empty_counts_is_fundamental() {
        // medium (0) >= easy (0) and >= hard (0)
        assert_eq!(classify(&ProblemCounts::default()), Tier::FundamentalTechnique);
    }

    #[test]
    fn related_tags_sum_scores_across_mastered() {
        let graph = TagGraph::build(&sample_catalog());
        let ranked = graph.related_tags_scored(
            &[tag("array"), tag("hash table")],
            &[tag("sorting"), tag("two pointers")],
            10,
        );
        // sorting: array(1) + hash table(1) = 2; two pointers: array(2) = 2.
        // Tie keeps first-seen order: `array` neighbors are visited alphabetically.
        assert_eq!(
            ranked,
            vec![(tag("sorting"), 2), (tag("two pointers"), 2)]
        );
    }

    #[test]
    fn related_tags_respect_limit_and_missing_set() {
        let graph = TagGraph::build(&sample_catalog());
        let ranked = graph.related_tags(&[tag("array")], &[tag("hash table"), tag("bfs")], 1);
        assert_eq!(ranked, vec![tag("hash table")]);
    }

    #[test]
    fn related_tags_ignore_duplicate_mastered_entries() {
        let graph = TagGraph::build(&sample_catalog());
        let once = graph.related_tags_scored(&[tag("array")], &[tag("hash table")], 5);
        let twice =
            graph.related_tags_scored(&[tag("array"), tag("array")], &[tag("hash table")], 5);
        assert_eq!(once, twice);
    }

    #[test]
    fn next_tier_walks_tiers_in_order() {
        let mut catalog = Vec::new();
        for i in 0..10 {
            catalog.push(problem(i, &["array", "hash table"], Difficulty::Easy));
        }
        catalog.push(problem(100, &["array", "dp"], Difficulty::Hard));
        catalog.push(problem(101, &["dp"], Difficulty::Hard));
        let graph = TagGraph::build(&catalog);
        assert_eq!(graph.tier_of(&tag("array")), Some(Tier::CoreConcept));
        assert_eq!(graph.tier_of(&tag("dp")), Some(Tier::AdvancedTechnique));

        let none = BTreeSet::new();
        let first = graph.next_tier_suggestion(&none, TIER_SUGGESTION_LIMIT);
        assert_eq!(first.classification, Tier::CoreConcept);
        assert_eq!(first.suggested, vec![tag("array"), tag("hash table")]);

        let core: BTreeSet<_> = [tag("array"), tag("hash table")].into_iter().collect();
        let next = graph.next_tier_suggestion(&core, TIER_SUGGESTION_LIMIT);
        assert_eq!(next.classification, Tier::AdvancedTechnique);
        assert_eq!(next.suggested, vec![tag("dp")]);
    }

    #[test]
    fn next_tier_is_terminal_when_everything_mastered() {
        let graph = TagGraph::build(&sample_catalog());
        let all: BTreeSet<_> = graph.nodes().map(|n| n.tag.clone()).collect();
        let suggestion = graph.next_tier_suggestion(&all, TIER_SUGGESTION_LIMIT);
        assert_eq!(suggestion.classification, Tier::AdvancedTechnique);
        assert!(suggestion.is_fully_mastered());
    }

    #[test]
    fn from_nodes_roundtrips() {
        let graph = TagGraph::build(&sample_catalog());
        let restored = TagGraph::from_nodes(graph.clone().into_nodes());
        assert_eq!(graph, restored);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        const POOL: [&str; 6] = ["array", "bfs", "dp", "graph", "string", "tree"];

        fn arb_problem() -> impl Strategy<Value = (Vec<usize>, u8)> {
            (prop::collection::vec(0..POOL.len(), 1..4), 0_u8..3)
        }

        fn catalog(raw: &[(Vec<usize>, u8)]) -> Vec<Problem> {
            raw.iter()
                .enumerate()
                .map(|(i, (tags, rank))| {
                    let names: Vec<&str> = tags.iter().map(|t| POOL[*t]).collect();
                    let difficulty = Difficulty::from_rank(*rank).unwrap();
                    problem(i as u64, &names, difficulty)
                })
                .collect()
        }

        proptest! {
            #[test]
            fn weights_symmetric_for_any_catalog(raw in prop::collection::vec(arb_problem(), 0..30)) {
                let graph = TagGraph::build(&catalog(&raw));
                for a in POOL {
                    for b in POOL {
                        prop_assert_eq!(graph.weight(&tag(a), &tag(b)), graph.weight(&tag(b), &tag(a)));
                    }
                }
            }

            #[test]
            fn rebuild_twice_is_identical(raw in prop::collection::vec(arb_problem(), 0..30)) {
                let problems = catalog(&raw);
                prop_assert_eq!(TagGraph::build(&problems), TagGraph::build(&problems));
            }

            #[test]
            fn classify_is_total_and_pure(easy in 0_u32..200, medium in 0_u32..200, hard in 0_u32..200) {
                let counts = ProblemCounts::new(easy, medium, hard);
                prop_assert_eq!(classify(&counts), classify(&counts));
            }

            #[test]
            fn related_tags_are_bounded_and_ordered(
                raw in prop::collection::vec(arb_problem(), 0..30),
                split in 0..POOL.len(),
                limit in 0_usize..6,
            ) {
                let graph = TagGraph::build(&catalog(&raw));
                let mastered: Vec<TagName> = POOL[..split].iter().map(|t| tag(t)).collect();
                let missing: Vec<TagName> = POOL[split..].iter().map(|t| tag(t)).collect();
                let ranked = graph.related_tags_scored(&mastered, &missing, limit);

                prop_assert!(ranked.len() <= limit);
                prop_assert!(ranked.iter().all(|(t, _)| missing.contains(t)));
                prop_assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
            }

            #[test]
            fn suggestions_never_include_mastered(
                raw in prop::collection::vec(arb_problem(), 0..30),
                split in 0..=POOL.len(),
            ) {
                let graph = TagGraph::build(&catalog(&raw));
                let mastered: BTreeSet<TagName> = POOL[..split].iter().map(|t| tag(t)).collect();
                let suggestion = graph.next_tier_suggestion(&mastered, TIER_SUGGESTION_LIMIT);
                prop_assert!(suggestion.suggested.len() <= TIER_SUGGESTION_LIMIT);
                prop_assert!(suggestion.suggested.iter().all(|t| !mastered.contains(t)));
            }
        }
    }
}
