//! Run one research query and print the result.

use deepsearch_agent::{Services, SolveReport, TaskSolver};
use deepsearch_config::AppConfig;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub async fn run(query: &str, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;
    debug!(?config, "config loaded");

    // Fail before any model call when keys are missing
    if let Err(e) = config.require_credentials() {
        eprintln!();
        eprintln!("  ERROR: {e}");
        eprintln!();
        eprintln!("  Set these environment variables:");
        eprintln!("    OPENAI_API_KEY    (or DEEPSEARCH_API_KEY)");
        eprintln!("    SERPAPI_API_KEY");
        eprintln!();
        eprintln!("  Or add them to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err(e.into());
    }

    let services = Services::from_config(&config)?;
    let solver = TaskSolver::new(Arc::new(services));
    let report = solver.solve(query).await?;

    println!("{}", render(&report));
    eprintln!(
        "tasks: {}, model calls: {}, tokens: {} ({} prompt / {} completion)",
        report.tasks,
        report.usage.calls,
        report.usage.total_tokens,
        report.usage.prompt_tokens,
        report.usage.completion_tokens
    );
    Ok(())
}

/// Answer text followed by its numbered references.
pub fn render(report: &SolveReport) -> String {
    let Some(answer) = &report.answer else {
        return format!("No answer could be produced for: {}", report.query);
    };
    let mut out = String::new();
    if !report.verified {
        out.push_str("(unverified best-effort answer)\n\n");
    }
    out.push_str(answer.answer.trim());
    out.push('\n');
    if !answer.references.is_empty() {
        out.push_str("\nReferences:\n");
        for (i, r) in answer.references.iter().enumerate() {
            let _ = write!(out, "[^{}] {}", i + 1, r.url);
            if let Some(title) = &r.title {
                let _ = write!(out, " - {title}");
            }
            if let Some(datetime) = &r.datetime {
                let _ = write!(out, " ({datetime})");
            }
            out.push('\n');
            if let Some(quote) = &r.exact_quote {
                let _ = writeln!(out, "    > {quote}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepsearch_agent::TaskOutcome;
    use deepsearch_core::{Answer, Evaluation, Reference, UsageSnapshot};

    fn report(answer: Option<Answer>, verified: bool) -> SolveReport {
        SolveReport {
            query: "why is spx down?".into(),
            answer,
            verified,
            outcome: TaskOutcome::Solved,
            usage: UsageSnapshot::default(),
            tasks: 1,
        }
    }

    #[test]
    fn renders_answer_with_references() {
        let answer = Answer {
            answer: "Tariffs [^1].".into(),
            references: vec![Reference {
                url: "https://news.example".into(),
                title: None,
                datetime: Some("2025-04-04".into()),
                exact_quote: Some("stocks tumbled".into()),
            }],
            evaluation: Some(Evaluation::auto_pass("test")),
        };
        let out = render(&report(Some(answer), true));
        assert!(out.starts_with("Tariffs [^1]."));
        assert!(out.contains("[^1] https://news.example (2025-04-04)\n    > stocks tumbled"));
    }

    #[test]
    fn unverified_answers_are_flagged() {
        let answer = Answer {
            answer: "Probably tariffs.".into(),
            references: vec![],
            evaluation: None,
        };
        let out = render(&report(Some(answer), false));
        assert!(out.starts_with("(unverified best-effort answer)"));
        assert!(!out.contains("References:"));
    }

    #[test]
    fn missing_answer_message() {
        assert_eq!(
            render(&report(None, false)),
            "No answer could be produced for: why is spx down?"
        );
    }
}
