//! Terminal output: run summary card, sync plans and match result tables.

use arrow::util::pretty::print_batches;
use valleyvote_core::{MatchResult, Table, ToRow};
use valleyvote_pipeline::{MentionCounts, RunSummary, SessionPlan};
use valleyvote_store::rows_to_batch;
use valleyvote_sync::SyncPlan;

const MAX_LIST_ITEMS: usize = 10;

/// Print a run summary as a vertical card.
pub fn print_run_summary(summary: &RunSummary) {
    println!(
        "=== {} {}-{} ===",
        summary.state, summary.year_start, summary.year_end
    );
    println!(
        "{}",
        if summary.is_clean() {
            "completed cleanly"
        } else {
            "completed with failures"
        }
    );
    println!();

    println!("Sessions");
    field("attempted", summary.units_attempted);
    field("failed", summary.units_failed);
    field("unchanged", summary.units_unchanged);
    println!();

    println!("Entities");
    field("listed", summary.entities_listed);
    field("new", summary.entities_new);
    field("changed", summary.entities_changed);
    field("unchanged", summary.entities_unchanged);
    field("fetched", summary.entities_fetched);
    println!();

    println!("Registry");
    field("legislators", summary.legislators);
    if !summary.registry_fingerprint.is_empty() {
        field("fingerprint", &summary.registry_fingerprint[..16.min(summary.registry_fingerprint.len())]);
    }
    println!();

    if summary.mentions.total() > 0 {
        print_mention_counts(&summary.mentions);
    }

    if !summary.unit_failures.is_empty() {
        println!("Failed sessions ({}):", summary.unit_failures.len());
        for f in summary.unit_failures.iter().take(MAX_LIST_ITEMS) {
            println!("    {:<12} {}", f.unit, f.error);
        }
        more(summary.unit_failures.len());
        println!();
    }
    if !summary.entity_failures.is_empty() {
        println!("Failed entities ({}):", summary.entity_failures.len());
        for f in summary.entity_failures.iter().take(MAX_LIST_ITEMS) {
            println!("    {:<24} {}", f.key, f.error);
        }
        more(summary.entity_failures.len());
        println!();
    }
    if !summary.storage_errors.is_empty() {
        println!("Storage errors ({}):", summary.storage_errors.len());
        for e in summary.storage_errors.iter().take(MAX_LIST_ITEMS) {
            println!("    {e}");
        }
        more(summary.storage_errors.len());
        println!();
    }

    field("elapsed", format!("{:.1}s", summary.elapsed_secs()));
}

pub fn print_mention_counts(counts: &MentionCounts) {
    println!("Mentions");
    field("accepted", counts.accepted);
    field("ambiguous", counts.ambiguous);
    field("rejected", counts.rejected);
    println!();
}

pub fn print_session_plan(plan: &SessionPlan) {
    println!("=== session {} ===", plan.session_id);
    println!();
    print_sync_plan("People", &plan.people);
    print_sync_plan("Bills", &plan.bills);
}

fn print_sync_plan(header: &str, plan: &SyncPlan) {
    println!("{header}");
    field("listed", plan.listed());
    field("new", plan.new_count);
    field("changed", plan.changed_count);
    field("unchanged", plan.unchanged_count);
    if !plan.to_fetch.is_empty() {
        println!("  would fetch ({}):", plan.to_fetch.len());
        for p in plan.to_fetch.iter().take(MAX_LIST_ITEMS) {
            println!("    {:<24} {:?}", p.entity.key(), p.change);
        }
        more(plan.to_fetch.len());
    }
    println!();
}

/// Print match results as an Arrow table.
pub fn print_match_results(results: &[MatchResult]) -> anyhow::Result<()> {
    if results.is_empty() {
        println!("(no mentions)");
        return Ok(());
    }
    let rows: Vec<_> = results.iter().map(ToRow::to_row).collect();
    let batch = rows_to_batch(&Table::MatchResults.schema(), &rows)?;
    print_batches(&[batch])?;
    println!();
    Ok(())
}

fn field(name: &str, value: impl std::fmt::Display) {
    println!("  {:<26} {}", name, value);
}

fn more(len: usize) {
    if len > MAX_LIST_ITEMS {
        println!("    ... and {} more", len - MAX_LIST_ITEMS);
    }
}
