//! Docflow Document Review Demo
//!
//! Runs a four-stage document review pipeline end to end with the simulated
//! handlers: ingest a document, classify it, escalate urgent ones, archive
//! the result. Events stream to the terminal as the pipeline advances, and
//! the final instance state — data bag and audit log included — is printed
//! at the end.

use colored::*;
use docflow_engine::{simulated_handlers, WorkflowOrchestrator};
use docflow_types::{
    TaskDefinition, TaskKind, WorkflowDefinition, WorkflowEvent, WorkflowEventKind,
};
use serde_json::json;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!(
        "{}",
        "╔══════════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║                Docflow Document Review Pipeline                  ║".cyan()
    );
    println!(
        "{}",
        "║                                                                  ║".cyan()
    );
    println!(
        "{}",
        "║  ingest → classify → escalate (priority >= 5) + archive          ║".cyan()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════════╝".cyan()
    );
    println!();

    let engine = WorkflowOrchestrator::new();
    for handler in simulated_handlers() {
        engine.register_handler(handler).await;
    }

    let definition = WorkflowDefinition::new("document-review")
        .with_description("Ingest, classify, escalate and archive a document")
        .with_task(
            TaskDefinition::new("ingest", TaskKind::DocumentProcessing)
                .with_param("operation", json!("extract"))
                .with_param("pages", json!(6))
                .with_output("pages_done", "pages"),
        )
        .with_task(
            TaskDefinition::new("classify", TaskKind::DataTransformation)
                .with_dependency("ingest")
                .with_param("input_key", json!("doc_kind")),
        )
        .with_task(
            TaskDefinition::new("escalate", TaskKind::Notification)
                .with_dependency("classify")
                .with_condition("priority >= 5")
                .with_param("channel", json!("pager")),
        )
        .with_task(
            TaskDefinition::new("archive", TaskKind::ExternalApi)
                .with_dependency("classify")
                .with_param("endpoint", json!("https://records.local/archive")),
        );

    let definition_id = engine.register_workflow(definition).await.unwrap();
    println!(
        "  Registered workflow {} ({})",
        "document-review".bold(),
        definition_id.short()
    );

    let mut events = engine.subscribe();
    let mut data = serde_json::Map::new();
    data.insert("doc_kind".into(), json!("invoice"));
    data.insert("priority".into(), json!(8));
    let instance_id = engine.start_workflow(&definition_id, data).await.unwrap();
    println!("  Started instance {}", instance_id.short().bold());
    println!();
    println!("{}", "  Event stream".yellow().bold());

    loop {
        let event = events.recv().await.unwrap();
        if event.instance_id != instance_id {
            continue;
        }
        print_event(&event);
        if matches!(
            event.kind,
            WorkflowEventKind::WorkflowCompleted
                | WorkflowEventKind::WorkflowFailed
                | WorkflowEventKind::WorkflowCancelled
        ) {
            break;
        }
    }

    let instance = engine.get_instance(&instance_id).await.unwrap();
    println!();
    println!("{}", "  Final state".yellow().bold());
    println!("    Status:    {}", instance.status.to_string().green().bold());
    println!(
        "    Completed: {}",
        instance
            .completed_tasks
            .iter()
            .map(|t| t.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "    Data bag:  {}",
        serde_json::to_string_pretty(&instance.data)
            .unwrap()
            .replace('\n', "\n               ")
    );
    println!();
    println!("{}", "  Audit log".yellow().bold());
    for entry in &instance.audit_log {
        let details = if entry.details.is_null() {
            String::new()
        } else {
            entry.details.to_string()
        };
        println!("    {:>3}  {:<22} {}", entry.sequence, entry.event, details);
    }
    println!();
    println!("{}", "Demo complete!".green().bold());
}

fn print_event(event: &WorkflowEvent) {
    let tag = event.kind.to_string();
    let line = match &event.task_id {
        Some(task) => format!("{:<22} {}", tag, task),
        None => tag,
    };
    let arrow = "→".cyan();
    match event.kind {
        WorkflowEventKind::WorkflowCompleted => println!("    {} {}", arrow, line.green().bold()),
        WorkflowEventKind::WorkflowFailed | WorkflowEventKind::TaskFailed => {
            println!("    {} {}", arrow, line.red().bold())
        }
        WorkflowEventKind::TaskError | WorkflowEventKind::TaskRetryScheduled => {
            println!("    {} {}", arrow, line.red())
        }
        WorkflowEventKind::WorkflowCancelled | WorkflowEventKind::TaskCancelled => {
            println!("    {} {}", arrow, line.yellow())
        }
        _ => println!("    {} {}", arrow, line),
    }
}
