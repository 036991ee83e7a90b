use colored::Colorize;

use crate::bundle::{Applied, Outcome};
use crate::deploy::{AppClusters, DigState, DigStatus, StateInfo};
use crate::registry::Controller;

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg.green());
}

fn colored_state(state: DigState) -> String {
    let s = state.to_string();
    match state {
        DigState::Instantiated => s.green().to_string(),
        DigState::Approved | DigState::Updated => s.blue().to_string(),
        DigState::Terminated => s.dimmed().to_string(),
        DigState::InstantiateStopped | DigState::TerminateStopped => s.yellow().to_string(),
        DigState::Created => s,
    }
}

fn colored_status(status: &str) -> String {
    match status {
        "Applied" | "Ready" | "Instantiated" => status.green().to_string(),
        "Failed" | "InstantiateFailed" | "TerminateFailed" | "UpdateFailed" => status.red().to_string(),
        "Retrying" | "NotReady" => status.yellow().to_string(),
        "Deleted" | "Terminated" => status.dimmed().to_string(),
        "Pending" => status.blue().to_string(),
        _ => status.to_string(),
    }
}

pub fn print_applied(applied: &[Applied]) {
    for entry in applied {
        match entry.outcome {
            Outcome::Created => println!("  {} {}", "+".green(), entry.to_string().bold()),
            Outcome::Exists => println!("  {} {} {}", "=".dimmed(), entry, "(exists)".dimmed()),
        }
    }
    let created = applied.iter().filter(|a| a.outcome == Outcome::Created).count();
    println!();
    println!("  {} created, {} unchanged.", created, applied.len() - created);
}

pub fn print_controller_list(controllers: &[Controller]) {
    if controllers.is_empty() {
        println!("{}", "No controllers registered.".dimmed());
        return;
    }

    println!();
    println!("{}", "Controllers".bold().cyan());
    println!("{}", "─".repeat(72));
    println!(
        "  {:<24} {:<10} {:<10} {}",
        "NAME".bold(),
        "TYPE".bold(),
        "PRIORITY".bold(),
        "ENDPOINT".bold()
    );
    println!("{}", "─".repeat(72));
    for c in controllers {
        println!(
            "  {:<24} {:<10} {:<10} {}",
            c.name(),
            c.spec.controller_type,
            c.spec.priority,
            c.endpoint().dimmed()
        );
    }
    println!();
}

/// Print a DIG's action log, oldest first.
pub fn print_state(info: &StateInfo) {
    println!("  {:<18} {}", "State:".bold(), colored_state(info.current_state()));
    if !info.status_context_id.is_empty() {
        println!("  {:<18} {}", "Status context:".bold(), info.status_context_id);
    }
    println!();
    for action in &info.actions {
        println!(
            "    {:<20} {:<4} {:<34} {}",
            colored_state(action.state),
            action.revision,
            action.context_id,
            action.time.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
}

pub fn print_dig_status(status: &DigStatus) {
    println!();
    println!(
        "{} {}/{}/{}/{}",
        "Deployment intent group:".bold().cyan(),
        status.project,
        status.composite_app,
        status.version,
        status.dig.bold()
    );
    println!("{}", "─".repeat(72));
    println!("  {:<18} {}", "State:".bold(), colored_state(status.state));
    println!("  {:<18} {}", "Context:".bold(), status.context_id);
    if let Some(ctx_status) = &status.context_status {
        println!("  {:<18} {}", "Context status:".bold(), colored_status(&ctx_status.to_string()));
    }
    println!("  {:<18} {}", "View:".bold(), status.view);

    for app in &status.apps {
        println!();
        println!("  {} {}", "App".bold(), app.name.bold());
        for cluster in &app.clusters {
            let ready = cluster.ready_status.as_deref().unwrap_or("-");
            println!("    {} {}", cluster.cluster.to_string().cyan(), colored_status(ready));
            for resource in &cluster.resources {
                println!("      {:<44} {}", resource.name, colored_status(&resource.status));
            }
        }
    }

    if !status.resource_counts.is_empty() {
        println!();
        let counts: Vec<String> = status
            .resource_counts
            .iter()
            .map(|(s, n)| format!("{} {}", n, colored_status(s)))
            .collect();
        println!("  {}", counts.join(", "));
    }
    println!();
}

pub fn print_clusters_by_app(apps: &[AppClusters]) {
    for app in apps {
        println!("{}", app.app.bold());
        for cluster in &app.clusters {
            println!("  {}", cluster);
        }
    }
}
