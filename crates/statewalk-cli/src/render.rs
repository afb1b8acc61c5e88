//! Terminal rendering of diagnoses.

use colored::Colorize;
use statewalk_diagnose::{ClueOutcome, Diagnosis, Report, ReportStatus};
use statewalk_graph::{GraphPath, Node, Row};

pub fn diagnosis(d: &Diagnosis) {
    println!("{} {}", "message".bold(), d.message);
    println!(
        "  {} {} {} {}",
        "kinds".cyan(),
        d.source_kind.bold(),
        "→".cyan(),
        d.located.destination_kind.bold()
    );
    if !d.preferred_kinds.is_empty() {
        println!("  {} {}", "via".cyan(), d.preferred_kinds.join(", "));
    }
    match d.strategy {
        Some(strategy) => println!("  {} {}", "strategy".cyan(), strategy),
        None => println!("  {} no path between the kinds", "info:".yellow().bold()),
    }

    for analysis in &d.analyses {
        println!();
        println!("{} {}", "path".green().bold(), analysis.path);
        let synthesis = &analysis.synthesis;
        let origin = if synthesis.used_fallback() {
            "template"
        } else {
            "generated"
        };
        println!(
            "  {} {} after {} attempt(s), {} of {} row(s) kept",
            "query".cyan(),
            origin,
            synthesis.attempts,
            analysis.reports.len(),
            synthesis.raw_rows
        );
        for (i, r) in analysis.reports.iter().enumerate() {
            report(i + 1, r);
        }
    }

    println!();
    println!(
        "{} {:.1}s, {} prompt + {} completion tokens",
        "done".green().bold(),
        d.elapsed_secs,
        d.token_usage.prompt_tokens,
        d.token_usage.completion_tokens
    );
}

fn report(n: usize, r: &Report) {
    println!("  {} {}", "report".bold(), n);
    for entity in &r.clues {
        for clue in &entity.clues {
            let marker = match clue.outcome {
                ClueOutcome::StateAbsent => "absent".red().bold(),
                ClueOutcome::StateJudged => "state".normal(),
            };
            println!("    {} [{}] {}", entity.key.bold(), marker, clue.text);
        }
    }
    match (&r.status, &r.summary) {
        (ReportStatus::Summarized, Some(summary)) => {
            let mut scores = summary.summary.clone();
            scores.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
            for s in &scores {
                println!(
                    "    {:>2}/10 {} {}",
                    s.relevance_score,
                    s.kind.bold(),
                    s.explanation
                );
            }
            println!("    {} {}", "conclusion".cyan(), summary.conclusion);
            println!("    {} {}", "resolution".cyan(), summary.resolution);
        }
        _ => println!(
            "    {} {}",
            "error:".red().bold(),
            r.error.as_deref().unwrap_or("report not summarized")
        ),
    }
}

pub fn paths(paths: &[GraphPath]) {
    for p in paths {
        println!("  {} {} ({} hops)", "→".cyan(), p, p.len());
    }
}

pub fn rows(rows: &[Row]) {
    for (i, row) in rows.iter().enumerate() {
        println!("{} {}", "row".bold(), i + 1);
        for (column, value) in &row.columns {
            let text = serde_json::to_string(value).unwrap_or_else(|_| "?".into());
            println!("  {} {}", column.cyan(), text);
        }
    }
}

pub fn states(states: &[Node]) {
    for state in states {
        let id = state.id().unwrap_or_else(|| state.element_id.clone());
        let body = serde_json::to_string_pretty(&state.properties).unwrap_or_default();
        println!("{} {}", id.bold(), body);
    }
}
