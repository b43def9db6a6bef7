//! Batch resolution of scraped mentions against a registry.

use tracing::info;
use valleyvote_core::{
    CanonicalRegistry, EntityResolver, MatchConfig, MatchResult, RawMention, ResolverOptions,
    supersede,
};

use crate::summary::MentionCounts;

/// Resolve `mentions`, each with the threshold for its origin, then replace
/// any `prior` result for the same mention and context.
///
/// Counts cover the fresh results only.
pub fn resolve_mentions(
    registry: &CanonicalRegistry,
    mentions: &[RawMention],
    matching: &MatchConfig,
    prior: Vec<MatchResult>,
) -> (Vec<MatchResult>, MentionCounts) {
    let resolver = EntityResolver::new(
        registry,
        ResolverOptions {
            threshold: matching.threshold,
            tie_epsilon: matching.tie_epsilon,
            narrow_by_context: matching.narrow_by_context,
        },
    );
    let fresh: Vec<MatchResult> = mentions
        .iter()
        .map(|m| resolver.resolve_with_threshold(m, matching.threshold_for(&m.origin)))
        .collect();
    let counts = MentionCounts::tally(&fresh);
    info!(
        mentions = mentions.len(),
        accepted = counts.accepted,
        ambiguous = counts.ambiguous,
        rejected = counts.rejected,
        "resolved mentions"
    );
    (supersede(prior, fresh), counts)
}
