//! Link free-text person mentions to canonical legislators.
//!
//! # Algorithm
//!
//! 1. The mention text is normalised. Finance-filer mentions first have the
//!    candidate name pulled out of the committee name
//!    ([`NameNormalizer::extract_filer_name`]).
//! 2. Candidates are narrowed to records whose chamber and active years fit
//!    the mention context. If nothing fits, the whole registry is scored.
//! 3. Each candidate scores the best [`weighted_ratio`] over its name
//!    variants (display name, "nickname last").
//! 4. The best score below the threshold is `rejected`. At or above it, the
//!    best candidate is `accepted` only when it leads the runner-up by more
//!    than the tie epsilon; otherwise the result is `ambiguous` and lists
//!    every candidate within epsilon of the top.
//!
//! Candidates are ordered by score, then by id, so results are deterministic.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::consolidate::CanonicalRegistry;
use crate::model::{CanonicalRecord, Decision, MatchCandidate, MatchResult, MentionOrigin, RawMention};
use crate::names::NameNormalizer;
use crate::row::{Row, ToRow};
use crate::similarity::weighted_ratio;

/// Default acceptance threshold.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 88.0;
/// Threshold for committee roster names, which are cleaner than filer names.
pub const COMMITTEE_MATCH_THRESHOLD: f64 = 85.0;
/// Scores closer than this are treated as tied.
pub const DEFAULT_TIE_EPSILON: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverOptions {
    pub threshold: f64,
    pub tie_epsilon: f64,
    /// Narrow candidates by mention year and chamber before scoring.
    pub narrow_by_context: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            tie_epsilon: DEFAULT_TIE_EPSILON,
            narrow_by_context: true,
        }
    }
}

struct Entry<'a> {
    record: &'a CanonicalRecord,
    variants: Vec<String>,
}

/// Resolver over one registry snapshot. Registry names are normalised once.
pub struct EntityResolver<'a> {
    entries: Vec<Entry<'a>>,
    normalizer: NameNormalizer,
    options: ResolverOptions,
}

impl<'a> EntityResolver<'a> {
    pub fn new(registry: &'a CanonicalRegistry, options: ResolverOptions) -> Self {
        Self::with_normalizer(registry, options, NameNormalizer::default())
    }

    pub fn with_normalizer(
        registry: &'a CanonicalRegistry,
        options: ResolverOptions,
        normalizer: NameNormalizer,
    ) -> Self {
        let entries = registry
            .iter()
            .map(|record| {
                let mut variants: Vec<String> = record
                    .name_variants()
                    .iter()
                    .map(|v| normalizer.normalize(v))
                    .filter(|v| !v.is_empty())
                    .collect();
                variants.dedup();
                Entry { record, variants }
            })
            .collect();
        Self {
            entries,
            normalizer,
            options,
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve with the configured threshold.
    pub fn resolve(&self, mention: &RawMention) -> MatchResult {
        self.resolve_with_threshold(mention, self.options.threshold)
    }

    /// Resolve a mention. Never fails: no candidates means `rejected`.
    pub fn resolve_with_threshold(&self, mention: &RawMention, threshold: f64) -> MatchResult {
        let scored_name = self.scored_name(mention);
        let candidates = if scored_name.is_empty() {
            Vec::new()
        } else {
            self.score(mention, &scored_name)
        };

        let Some(best) = candidates.first() else {
            debug!(mention = %mention.source_text, "no candidates");
            return MatchResult {
                mention: mention.clone(),
                scored_name,
                canonical_id: None,
                score: 0.0,
                runner_up_score: None,
                decision: Decision::Rejected,
                matched_display_name: None,
                tied_ids: Vec::new(),
                threshold,
            };
        };
        let runner_up = candidates.get(1).map(|c| c.similarity_score);
        let eps = self.options.tie_epsilon;

        let (decision, canonical_id, tied_ids) = if best.similarity_score < threshold {
            (Decision::Rejected, None, Vec::new())
        } else if runner_up.is_none_or(|r| best.similarity_score - r > eps) {
            (Decision::Accepted, Some(best.canonical_id), Vec::new())
        } else {
            let tied = candidates
                .iter()
                .take_while(|c| best.similarity_score - c.similarity_score <= eps)
                .map(|c| c.canonical_id)
                .collect();
            (Decision::Ambiguous, None, tied)
        };

        let matched_display_name = canonical_id
            .and_then(|id| self.entries.iter().find(|e| e.record.canonical_id == id))
            .map(|e| e.record.display_name.clone());

        debug!(
            mention = %mention.source_text,
            scored = %scored_name,
            best_id = best.canonical_id,
            score = best.similarity_score,
            decision = decision.as_str(),
            "resolved mention"
        );

        MatchResult {
            mention: mention.clone(),
            scored_name,
            canonical_id,
            score: best.similarity_score,
            runner_up_score: runner_up,
            decision,
            matched_display_name,
            tied_ids,
            threshold,
        }
    }

    /// Resolve every mention, preserving input order.
    pub fn resolve_all(&self, mentions: &[RawMention]) -> Vec<MatchResult> {
        mentions.iter().map(|m| self.resolve(m)).collect()
    }

    fn scored_name(&self, mention: &RawMention) -> String {
        if mention.origin == MentionOrigin::FinanceFiler {
            if let Some(name) = self.normalizer.extract_filer_name(&mention.source_text) {
                return name;
            }
        }
        self.normalizer.normalize(&mention.source_text)
    }

    fn score<'m>(&self, mention: &'m RawMention, name: &str) -> Vec<MatchCandidate<'m>> {
        let mut pool: Vec<&Entry<'a>> = if self.options.narrow_by_context {
            self.entries
                .iter()
                .filter(|e| e.record.fits_context(&mention.context))
                .collect()
        } else {
            Vec::new()
        };
        if pool.is_empty() {
            pool = self.entries.iter().collect();
        }

        let mut candidates: Vec<MatchCandidate<'m>> = pool
            .into_iter()
            .map(|e| MatchCandidate {
                mention,
                canonical_id: e.record.canonical_id,
                similarity_score: e
                    .variants
                    .iter()
                    .map(|v| weighted_ratio(name, v))
                    .fold(0.0, f64::max),
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(Ordering::Equal)
                .then(a.canonical_id.cmp(&b.canonical_id))
        });
        candidates
    }
}

/// One-off resolution with default options and the given threshold.
pub fn resolve(mention: &RawMention, registry: &CanonicalRegistry, threshold: f64) -> MatchResult {
    EntityResolver::new(registry, ResolverOptions::default()).resolve_with_threshold(mention, threshold)
}

/// Replace prior results whose mention text and context reappear in `fresh`.
///
/// Prior order is kept; fresh results for new mentions are appended.
pub fn supersede(prior: Vec<MatchResult>, fresh: Vec<MatchResult>) -> Vec<MatchResult> {
    let mut out = prior;
    let mut index: HashMap<(String, crate::model::MentionContext), usize> = out
        .iter()
        .enumerate()
        .map(|(i, r)| ((r.mention.source_text.clone(), r.mention.context.clone()), i))
        .collect();

    for result in fresh {
        let key = (result.mention.source_text.clone(), result.mention.context.clone());
        match index.get(&key) {
            Some(&i) => out[i] = result,
            None => {
                index.insert(key, out.len());
                out.push(result);
            }
        }
    }
    out
}

impl ToRow for MatchResult {
    fn to_row(&self) -> Row {
        let ctx = &self.mention.context;
        let tied: Vec<String> = self.tied_ids.iter().map(|id| id.to_string()).collect();
        Row::new()
            .with("source_text", self.mention.source_text.as_str())
            .with("origin", self.mention.origin.label())
            .with("committee", ctx.committee.clone())
            .with("year", ctx.year)
            .with("chamber", ctx.chamber.map(|c| c.as_str()))
            .with("context_role", ctx.role.clone())
            .with("scored_name", self.scored_name.as_str())
            .with("legislator_id", self.canonical_id)
            .with("matched_name", self.matched_display_name.clone())
            .with("score", self.score)
            .with("runner_up_score", self.runner_up_score)
            .with("decision", self.decision.as_str())
            .with("tied_ids", tied.join(";"))
            .with("threshold", self.threshold)
    }
}
