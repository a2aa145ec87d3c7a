// ABOUTME: Command implementations for the extract-pause CLI
// ABOUTME: Handles pause, resume, schedule, resolve and list-paused against any TableauApi

use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::client::TableauApi;
use crate::engine::{
    BatchResult, BatchStatus, PauseOptions, PauseOrchestrator, PauseReport, PausedTaskSnapshot,
    ResumeReport, ScheduleController, SnapshotStore,
};
use crate::model::{EntityRef, Schedule, ScheduleRef};

/// Pause an entity and report the outcome
pub async fn pause(
    orchestrator: &PauseOrchestrator,
    root_ref: EntityRef,
    options: PauseOptions,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("Pausing {}", root_ref);

    let report = orchestrator
        .pause(&root_ref, options)
        .await
        .map_err(|e| anyhow::anyhow!("Pause of {} aborted: {}", root_ref, e))?;

    match output {
        Some(path) => write_json(&path, &report)?,
        None => print!("{}", render_pause_report(&report)),
    }

    ensure_clean("Pause", &report.batch)?;
    ensure_store_consistent(&report.stale_snapshot_ids)
}

/// Resume everything paused for an entity and report the outcome
pub async fn resume(
    orchestrator: &PauseOrchestrator,
    root_ref: EntityRef,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("Resuming {}", root_ref);

    let report = orchestrator
        .resume_root(&root_ref)
        .await
        .map_err(|e| anyhow::anyhow!("Resume of {} aborted: {}", root_ref, e))?;

    match output {
        Some(path) => write_json(&path, &report)?,
        None => print!("{}", render_resume_report(&report)),
    }

    ensure_clean("Resume", &report.batch)?;
    ensure_store_consistent(&report.unremoved_snapshot_ids)
}

/// Suspend or activate a schedule
pub async fn set_schedule(
    api: Arc<dyn TableauApi>,
    schedule_ref: ScheduleRef,
    suspend: bool,
) -> Result<Schedule> {
    let controller = ScheduleController::new(api);
    let schedule = if suspend {
        controller.suspend(&schedule_ref).await
    } else {
        controller.activate(&schedule_ref).await
    }
    .map_err(|e| anyhow::anyhow!("Could not update {}: {}", schedule_ref, e))?;

    println!(
        "Schedule '{}' ({}) is now {}",
        schedule.name, schedule.id, schedule.state
    );
    Ok(schedule)
}

/// Print what a pause would touch without changing anything
pub async fn resolve(
    orchestrator: &PauseOrchestrator,
    root_ref: EntityRef,
    include_upstream: bool,
) -> Result<()> {
    let resolution = orchestrator
        .resolver()
        .resolve(&root_ref, include_upstream)
        .await
        .map_err(|e| anyhow::anyhow!("Could not resolve {}: {}", root_ref, e))?;
    let tasks = orchestrator
        .inventory()
        .list_for(&resolution.targets)
        .await
        .map_err(|e| anyhow::anyhow!("Could not list tasks: {}", e))?;

    println!("{}", resolution.root);
    for target in resolution.upstream() {
        println!("  upstream: {}", target);
    }
    println!("Extract refresh tasks: {}", tasks.len());
    for (target, task) in &tasks {
        println!(
            "  {} -> schedule {} ({})",
            target,
            task.schedule.name.as_deref().unwrap_or(&task.schedule.id),
            task.trigger.refresh_type
        );
    }

    Ok(())
}

/// Print the snapshot ledger, optionally limited to one root luid
pub async fn list_paused(store: &dyn SnapshotStore, root_id: Option<String>) -> Result<()> {
    let snapshots = store
        .load_all()
        .await
        .map_err(|e| anyhow::anyhow!("Could not read snapshots: {}", e))?;

    let selected = filter_by_root(snapshots, root_id.as_deref());
    print!("{}", render_snapshots(&selected));
    Ok(())
}

pub fn filter_by_root(
    snapshots: Vec<PausedTaskSnapshot>,
    root_id: Option<&str>,
) -> Vec<PausedTaskSnapshot> {
    match root_id {
        Some(root_id) => snapshots
            .into_iter()
            .filter(|s| matches!(&s.root, EntityRef::Id { id, .. } if id == root_id))
            .collect(),
        None => snapshots,
    }
}

pub fn render_pause_report(report: &PauseReport) -> String {
    let mut out = String::new();
    let verb = if report.dry_run { "Would pause" } else { "Paused" };

    let _ = writeln!(out, "{} {}: {}", verb, report.root, report.status());
    let _ = writeln!(out, "  Targets: {}", report.targets.len());
    for target in &report.targets {
        let _ = writeln!(out, "    {}", target);
    }

    if report.dry_run {
        let _ = writeln!(out, "  Tasks that would be deleted: {}", report.snapshots.len());
        for snapshot in &report.snapshots {
            let _ = writeln!(
                out,
                "    {} on schedule {}",
                snapshot.owner,
                snapshot
                    .schedule
                    .name
                    .as_deref()
                    .unwrap_or(&snapshot.schedule.id)
            );
        }
    }

    render_batch(&mut out, &report.batch);
    render_unremoved(&mut out, &report.stale_snapshot_ids);
    out
}

pub fn render_resume_report(report: &ResumeReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Resume: {}", report.batch.status);
    render_batch(&mut out, &report.batch);
    if !report.retained.is_empty() {
        let _ = writeln!(
            out,
            "  {} snapshot(s) kept for a later resume",
            report.retained.len()
        );
    }
    render_unremoved(&mut out, &report.unremoved_snapshot_ids);
    out
}

pub fn render_snapshots(snapshots: &[PausedTaskSnapshot]) -> String {
    let mut out = String::new();
    if snapshots.is_empty() {
        let _ = writeln!(out, "No paused extract refresh tasks");
        return out;
    }

    let _ = writeln!(out, "Paused extract refresh tasks: {}", snapshots.len());
    for snapshot in snapshots {
        let _ = writeln!(
            out,
            "  {} on schedule {} (root: {}, paused {})",
            snapshot.owner,
            snapshot
                .schedule
                .name
                .as_deref()
                .unwrap_or(&snapshot.schedule.id),
            snapshot.root,
            snapshot.paused_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    out
}

fn render_batch(out: &mut String, batch: &BatchResult) {
    if batch.outcomes.is_empty() {
        return;
    }

    let _ = writeln!(
        out,
        "  Operations: {} succeeded, {} failed",
        batch.summary.succeeded, batch.summary.failed
    );
    for outcome in &batch.outcomes {
        let task = outcome.task_id.as_deref().unwrap_or("-");
        match &outcome.error {
            None => {
                let _ = writeln!(
                    out,
                    "    {} {} task {} on schedule {}: ok",
                    outcome.operation, outcome.owner, task, outcome.schedule_id
                );
            }
            Some(err) => {
                let _ = writeln!(
                    out,
                    "    {} {} task {} on schedule {}: FAILED: {}",
                    outcome.operation, outcome.owner, task, outcome.schedule_id, err
                );
            }
        }
    }
}

fn render_unremoved(out: &mut String, snapshot_ids: &[String]) {
    if snapshot_ids.is_empty() {
        return;
    }

    let _ = writeln!(
        out,
        "  WARNING: {} snapshot(s) could not be removed from the store; prune them before resuming:",
        snapshot_ids.len()
    );
    for snapshot_id in snapshot_ids {
        let _ = writeln!(out, "    {}", snapshot_id);
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json_content = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("Failed to serialize report to JSON: {}", e))?;

    std::fs::write(path, json_content)
        .map_err(|e| anyhow::anyhow!("Failed to write output file '{}': {}", path.display(), e))?;

    info!("Report written to: {}", path.display());
    Ok(())
}

// A batch with failures exits non-zero so scripts can retry
fn ensure_clean(operation: &str, batch: &BatchResult) -> Result<()> {
    match batch.status {
        BatchStatus::Success | BatchStatus::Empty => Ok(()),
        status => Err(anyhow::anyhow!(
            "{} finished with status: {} ({} of {} operations failed)",
            operation,
            status,
            batch.summary.failed,
            batch.summary.total_operations
        )),
    }
}

fn ensure_store_consistent(unremoved: &[String]) -> Result<()> {
    if unremoved.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Snapshot store is out of date; remove snapshot ids [{}] before the next resume",
            unremoved.join(", ")
        ))
    }
}
