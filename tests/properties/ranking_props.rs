use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use element_index::core::{ElementType, IndexEntry, SourceKind, SourcePriorityConfig};
use element_index::index::{CacheSettings, IndexRegistry, SourceCache};
use element_index::manager::{UnifiedIndexManager, merge_candidates};
use element_index::search::{RelevanceScorer, ScoringConfig, token_set};
use element_index::test_utils::{StaticBuilder, entry};
use element_index::SearchOptions;

const NAMES: [&str; 6] = [
    "debug-helper",
    "code-reviewer",
    "formatter",
    "test-writer",
    "planner",
    "explainer",
];

const DESCRIPTIONS: [&str; 4] = [
    "helps debug failing tests",
    "reviews code and suggests fixes",
    "formats code consistently",
    "plans work and explains trade offs",
];

fn arb_priority() -> impl Strategy<Value = Vec<SourceKind>> {
    Just(SourceKind::ALL.to_vec()).prop_shuffle()
}

fn arb_hit() -> impl Strategy<Value = IndexEntry> {
    (
        0..NAMES.len(),
        0..SourceKind::ALL.len(),
        0..DESCRIPTIONS.len(),
        0u64..4,
    )
        .prop_map(|(name, source, description, minor)| {
            let mut hit = entry(
                NAMES[name],
                ElementType::Skill,
                SourceKind::ALL[source],
                &format!("1.{minor}.0"),
            );
            hit.description = Some(DESCRIPTIONS[description].to_string());
            hit
        })
}

fn priority_config(order: Vec<SourceKind>) -> SourcePriorityConfig {
    SourcePriorityConfig::new(order, true, false, true).unwrap()
}

fn arb_entropy_weight() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), 0.0f64..1.0, 1.0f64..1e6, Just(f64::INFINITY)]
}

fn scorer_with(entropy_weight: f64) -> RelevanceScorer {
    RelevanceScorer::new(ScoringConfig {
        entropy_weight,
        ..ScoringConfig::default()
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn manager_over(
    hits: &[IndexEntry],
    order: Vec<SourceKind>,
    scorer: RelevanceScorer,
) -> UnifiedIndexManager {
    let mut registry = IndexRegistry::new();
    for source in SourceKind::ALL {
        let mut seen = BTreeSet::new();
        // One entry per name within a source, as a real build guarantees.
        let entries: Vec<IndexEntry> = hits
            .iter()
            .filter(|h| h.source == source && seen.insert(h.name.clone()))
            .cloned()
            .collect();
        let cache = SourceCache::new(StaticBuilder::new(source, entries), CacheSettings::default());
        registry.register(Arc::new(cache));
    }
    UnifiedIndexManager::new(registry, priority_config(order), scorer)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merged_candidates_follow_priority(
        hits in prop::collection::vec(arb_hit(), 0..24),
        order in arb_priority(),
    ) {
        let priority = priority_config(order);
        let merged = merge_candidates(hits, &priority);

        for unified in &merged {
            let ranks: Vec<usize> = unified
                .candidates
                .iter()
                .map(|c| priority.rank(c.source))
                .collect();
            prop_assert!(ranks.windows(2).all(|w| w[0] < w[1]), "ranks {:?}", ranks);
            prop_assert_eq!(&unified.primary().source, &unified.candidates[0].source);
        }
    }

    #[test]
    fn merging_is_deterministic(hits in prop::collection::vec(arb_hit(), 0..24)) {
        let priority = SourcePriorityConfig::default();
        let first: Vec<(String, Vec<SourceKind>)> = merge_candidates(hits.clone(), &priority)
            .into_iter()
            .map(|u| (u.name.clone(), u.sources()))
            .collect();
        let second: Vec<(String, Vec<SourceKind>)> = merge_candidates(hits, &priority)
            .into_iter()
            .map(|u| (u.name.clone(), u.sources()))
            .collect();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn search_is_deterministic_and_primary_is_highest_priority(
        hits in prop::collection::vec(arb_hit(), 0..24),
        order in arb_priority(),
        query in prop_oneof![Just("code"), Just("debug tests"), Just("plans"), Just("")],
    ) {
        let manager = manager_over(&hits, order, RelevanceScorer::default());
        let options = SearchOptions::new().include_all(true).page(1, 100);
        let rt = runtime();

        let first = rt.block_on(manager.search(query, &options)).unwrap();
        let second = rt.block_on(manager.search(query, &options)).unwrap();

        let summary = |page: &element_index::SearchPage| -> Vec<(String, SourceKind)> {
            page.items
                .iter()
                .map(|u| (u.name.clone(), u.primary().source))
                .collect()
        };
        prop_assert_eq!(summary(&first), summary(&second));
        prop_assert_eq!(first.total, second.total);

        for unified in &first.items {
            let best = unified
                .candidates
                .iter()
                .map(|c| manager.priority().rank(c.source))
                .min()
                .unwrap();
            prop_assert_eq!(manager.priority().rank(unified.primary().source), best);
        }
    }

    #[test]
    fn search_scores_never_increase_down_the_page(
        hits in prop::collection::vec(arb_hit(), 0..24),
        weight in arb_entropy_weight(),
        query in prop_oneof![Just("code"), Just("debug tests"), Just("plans work"), Just("formats code fixes")],
    ) {
        let manager = manager_over(&hits, SourceKind::ALL.to_vec(), scorer_with(weight));
        let options = SearchOptions::new().include_all(true).page(1, 100);
        let page = runtime().block_on(manager.search(query, &options)).unwrap();

        let scores: Vec<f64> = page.items.iter().map(|u| u.score.unwrap()).collect();
        prop_assert!(
            scores.windows(2).all(|w| w[0] >= w[1]),
            "weight {} scores {:?}", weight, scores
        );
    }

    #[test]
    fn sharing_another_query_word_never_ranks_lower(
        query_words in prop::collection::btree_set("q[a-z]{2,5}", 2..8),
        filler in prop::collection::vec("f[a-z]{2,5}", 0..6),
        shared in 0usize..8,
        weight in arb_entropy_weight(),
    ) {
        let query_words: Vec<String> = query_words.into_iter().collect();
        let shared = shared.min(query_words.len() - 1);
        let query = token_set(&query_words.join(" "));

        let mut base_words: Vec<String> = query_words[..shared].to_vec();
        base_words.extend(filler);
        let mut richer_words = base_words.clone();
        richer_words.push(query_words[shared].clone());

        let mut base = entry("element", ElementType::Skill, SourceKind::Local, "1.0.0");
        base.description = Some(base_words.join(" "));
        let mut richer = base.clone();
        richer.description = Some(richer_words.join(" "));

        let scorer = scorer_with(weight);
        let base_rel = scorer.score(&query, &base);
        let richer_rel = scorer.score(&query, &richer);

        prop_assert!(richer_rel.jaccard > base_rel.jaccard);
        prop_assert_eq!(richer_rel.cmp_rank(&base_rel), Ordering::Greater);
        prop_assert!(richer_rel.score >= base_rel.score);
    }

    #[test]
    fn entropy_never_outweighs_overlap(
        repeats in 1usize..10,
        extra in prop::collection::vec("f[a-z]{2,5}", 1..10),
    ) {
        let query = token_set("qalpha qbeta");

        // One shared word, repeated: lowest possible entropy.
        let mut dull = entry("element", ElementType::Skill, SourceKind::Local, "1.0.0");
        dull.description = Some(vec!["qalpha"; repeats].join(" "));
        // Both words shared: more overlap.
        let mut rich = dull.clone();
        rich.description = Some("qalpha qbeta".to_string());
        // Same shared word plus varied filler: more entropy, less overlap.
        let mut noisy = dull.clone();
        let mut noisy_words = vec!["qalpha".to_string()];
        noisy_words.extend(extra);
        noisy.description = Some(noisy_words.join(" "));

        let scorer = RelevanceScorer::default();
        let dull_rel = scorer.score(&query, &dull);
        let rich_rel = scorer.score(&query, &rich);
        let noisy_rel = scorer.score(&query, &noisy);

        prop_assert_eq!(rich_rel.cmp_rank(&dull_rel), Ordering::Greater);
        prop_assert!(noisy_rel.entropy > dull_rel.entropy);
        prop_assert_eq!(dull_rel.cmp_rank(&noisy_rel), Ordering::Greater);
        prop_assert!(dull_rel.score > noisy_rel.score);
    }
}
