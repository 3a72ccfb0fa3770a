use anyhow::Result;
use serde::Serialize;

use crate::driver::{BuildOutcome, BuildState};

#[derive(Serialize)]
struct OutcomeSummary<'a> {
    state: &'a str,
    artifact: Option<String>,
    error: Option<String>,
    started_at: String,
    finished_at: String,
    log: &'a str,
}

fn state_name(state: BuildState) -> &'static str {
    match state {
        BuildState::Idle => "idle",
        BuildState::Running => "running",
        BuildState::Succeeded => "succeeded",
        BuildState::Failed => "failed",
        BuildState::Cancelled => "cancelled",
        BuildState::TimedOut => "timed-out",
    }
}

pub fn print_outcome(outcome: &BuildOutcome, json: bool) -> Result<()> {
    if json {
        let summary = OutcomeSummary {
            state: state_name(outcome.state),
            artifact: outcome
                .artifact
                .as_ref()
                .map(|a| a.path.display().to_string()),
            error: outcome.error.as_ref().map(|e| e.to_string()),
            started_at: outcome.started_at.to_rfc3339(),
            finished_at: outcome.finished_at.to_rfc3339(),
            log: &outcome.log,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    match outcome.state {
        BuildState::Succeeded => {
            if let Some(artifact) = &outcome.artifact {
                println!("Build succeeded: {}", artifact.path.display());
            } else {
                println!("Build succeeded");
            }
        }
        BuildState::TimedOut => {
            println!("Build timed out; consider raising build.timeoutHours");
        }
        BuildState::Cancelled => println!("Build cancelled"),
        _ => {
            if let Some(error) = &outcome.error {
                println!("Build failed: {error}");
            } else {
                println!("Build failed");
            }
        }
    }
    let duration = outcome.finished_at - outcome.started_at;
    println!("Total time: {}s", duration.num_seconds());
    Ok(())
}
