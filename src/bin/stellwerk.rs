use std::{fs, path::PathBuf, process, sync::Arc};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use stellwerk::{
    get_potential_input_schemas, get_union_of_variables, CancellationToken, ChannelSink,
    Conversation, Executor, ExecutorConfig, Graph, NodeRegistry, RunError, ScriptedProvider,
    Severity, ValidationError, ValidationOptions, ValidationReport, Validator,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stellwerk")]
#[command(about = "Validate, inspect and run workflow graphs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a graph document (JSON or YAML)
    Validate {
        graph: PathBuf,
        /// Also report cycles as errors
        #[arg(long)]
        detect_cycles: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the input sources and variables available at a node
    Variables {
        graph: PathBuf,
        #[arg(short, long)]
        node: String,
    },
    /// Print the data schema of every node type
    Schemas,
    /// Run a graph with scripted model responses, printing events as JSON lines
    Run {
        graph: PathBuf,
        /// User message that starts the turn
        #[arg(short, long)]
        message: String,
        /// JSON array of scripted responses for agent nodes
        #[arg(long)]
        script: Option<PathBuf>,
        /// Executor config (YAML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Validate {
            graph,
            detect_cycles,
            json,
        } => {
            let graph = Graph::from_path(&graph)?;
            let registry = NodeRegistry::builtin();
            let report = Validator::new(&registry)
                .with_options(ValidationOptions { detect_cycles })
                .validate(&graph);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if !report.valid {
                process::exit(1);
            }
        }
        Command::Variables { graph, node } => {
            let graph = Graph::from_path(&graph)?;
            if graph.node(&node).is_none() {
                eprintln!("{} node {node} not found", "error:".red().bold());
                process::exit(2);
            }
            let output = json!({
                "sources": get_potential_input_schemas(&node, &graph),
                "variables": get_union_of_variables(&node, &graph),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Schemas => {
            let schemas: serde_json::Map<String, serde_json::Value> = NodeRegistry::builtin()
                .data_schemas()
                .into_iter()
                .map(|(node_type, schema)| (node_type.as_str().to_string(), schema))
                .collect();
            println!("{}", serde_json::to_string_pretty(&schemas)?);
        }
        Command::Run {
            graph,
            message,
            script,
            config,
        } => {
            let graph = Graph::from_path(&graph)?;
            let config = match config {
                Some(path) => ExecutorConfig::from_file(path)?,
                None => ExecutorConfig::default(),
            };
            let provider = match script {
                Some(path) => ScriptedProvider::from_json_str(&fs::read_to_string(path)?)?,
                None => ScriptedProvider::new(),
            };

            let mut registry = NodeRegistry::builtin();
            registry.register(Arc::new(config.agent_handler().with_provider(Arc::new(provider))));
            let executor = Executor::new(registry, config);

            let token = CancellationToken::new();
            let on_interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let (sink, mut receiver) = ChannelSink::new();
            let printer = tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    if let Ok(line) = serde_json::to_string(&event) {
                        println!("{line}");
                    }
                }
            });

            let mut conversation = Conversation::new();
            conversation.push_user(message);
            let outcome = executor.run(&graph, &mut conversation, &sink, &token).await;
            drop(sink);
            printer.await?;

            match outcome {
                Ok(summary) => {
                    eprintln!(
                        "{} {} step(s): {}",
                        "completed".green().bold(),
                        summary.steps,
                        summary.path.join(" → ")
                    );
                }
                Err(RunError::Invalid(errors)) => {
                    print_errors(&errors);
                    process::exit(1);
                }
                Err(error) => {
                    eprintln!("{} {error}", "failed:".red().bold());
                    process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn print_report(report: &ValidationReport) {
    if report.valid {
        println!("{}", "valid".green().bold());
    }
    print_errors(&report.errors);
    print_errors(&report.warnings);
}

fn print_errors(findings: &[ValidationError]) {
    for finding in findings {
        let label = match finding.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
        };
        let nodes = finding.affected_node_ids();
        if nodes.is_empty() {
            println!("{label} [{}] {}", finding.type_name(), finding.message);
        } else {
            println!(
                "{label} [{}] {} ({})",
                finding.type_name(),
                finding.message,
                nodes.join(", ").dimmed()
            );
        }
    }
}
