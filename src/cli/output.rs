use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use webjob_engine::{EntryStatus, RunRecord};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Print `value` as JSON or YAML, or call `human` for the human format.
pub fn emit<T, F>(value: &T, format: OutputFormat, human: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    let rendered = match format {
        OutputFormat::Human => human(value),
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).context("Failed to render JSON output")?
        }
        OutputFormat::Yaml => serde_yaml::to_string(value).context("Failed to render YAML output")?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

pub fn render_record(record: &RunRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Run {} ({}) {} in {}ms\n",
        record.run_id,
        record.job_name,
        record.outcome.as_str(),
        record.latency_ms
    ));
    out.push_str(&format!(
        "Executed {} instruction(s), {} failed, {} in job\n",
        record.entries.len(),
        record.failed_entries(),
        record.total_instructions
    ));

    for entry in &record.entries {
        let status = match entry.status {
            EntryStatus::Succeeded => "ok",
            EntryStatus::Failed => "FAILED",
        };
        let mut line = format!(
            "  {:>4}  {:<16} {:<20} {:<6} {:>6}ms",
            entry.sequence, entry.position, entry.kind, status, entry.latency_ms
        );
        if entry.attempts > 1 {
            line.push_str(&format!("  attempts={}", entry.attempts));
        }
        if let Some(decision) = &entry.decision {
            line.push_str(&format!("  -> {:?}", decision));
        }
        if let Some(value) = &entry.captured {
            line.push_str(&format!("  = {:?}", value));
        }
        if let Some(error) = &entry.error {
            line.push_str(&format!("  [{}] {}", error.code, error.message));
        }
        out.push_str(&line);
        out.push('\n');
    }

    if !record.return_values.is_empty() {
        out.push_str("Return values:\n");
        for (index, value) in record.return_values.iter().enumerate() {
            match &value.name {
                Some(name) => out.push_str(&format!("  [{index}] {name} = {:?}\n", value.value)),
                None => out.push_str(&format!("  [{index}] {:?}\n", value.value)),
            }
        }
    }

    if let Some(failure) = &record.failure {
        out.push_str(&format!(
            "Failure at {}: [{}] {}\n",
            failure.position.as_deref().unwrap_or("-"),
            failure.error.code,
            failure.error.message
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use webjob_core_types::RunId;
    use webjob_engine::record::RunRecorder;
    use webjob_engine::{ReturnValues, RunOutcome};

    #[test]
    fn human_record_lists_return_values() {
        let mut values = ReturnValues::new();
        values.push(Some("price".into()), "12.50");
        values.push(None, "true");
        let record =
            RunRecorder::new(RunId::new(), "prices", 2).finish(RunOutcome::Completed, None, values);

        let text = render_record(&record);
        assert!(text.contains("(prices) completed"));
        assert!(text.contains("[0] price = \"12.50\""));
        assert!(text.contains("[1] \"true\""));
        assert!(!text.contains("Failure at"));
    }
}
