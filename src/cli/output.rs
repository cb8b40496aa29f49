//! CLI output formatting

use crate::core::{Manifest, PipelineStatus, StepStatus, StepType};
use crate::core::manifest::StageManifest;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a step status for display
pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::Initializing => style("INITIALIZING").dim().to_string(),
        StepStatus::Sending => style("SENDING").yellow().to_string(),
        StepStatus::Finish => style("FINISH").green().to_string(),
        StepStatus::Fail => style("FAIL").red().to_string(),
    }
}

/// Format a pipeline status for display
pub fn format_pipeline_status(status: PipelineStatus) -> String {
    match status {
        PipelineStatus::Running => style("RUNNING").yellow().to_string(),
        PipelineStatus::Finished => style("FINISHED").green().to_string(),
    }
}

/// One line per stage: name followed by its steps and their kinds
pub fn format_stage(index: usize, stage: &StageManifest) -> String {
    let steps: Vec<String> = stage
        .steps
        .iter()
        .map(|step| {
            let kind = match step.step_type {
                StepType::Ci => style("CI").cyan(),
                StepType::Cd => style("CD").magenta(),
            };
            let trigger = if step.trigger {
                String::new()
            } else {
                format!(" {}", style("(manual)").dim())
            };
            format!("{} {}{}", kind, step.name, trigger)
        })
        .collect();

    format!(
        "  {}. {} [{}]",
        index + 1,
        style(&stage.name).bold(),
        steps.join(", ")
    )
}

/// Multi-line overview of a manifest
pub fn format_manifest(manifest: &Manifest) -> String {
    let mut lines = vec![
        format!("  Name: {}", style(&manifest.name).bold()),
        format!(
            "  Stages: {}  Steps: {}",
            style(manifest.stages.len()).cyan(),
            style(manifest.step_count()).cyan()
        ),
    ];
    lines.extend(
        manifest
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| format_stage(i, stage)),
    );
    lines.join("\n")
}
