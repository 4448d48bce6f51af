//! agentflow CLI.
//!
//! Loads a pipeline document (`pipeline.json`) and optional settings
//! (`agentflow.toml`), then runs the configured tasks or a planner-generated
//! plan for a goal.

use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use agentflow::agents::GenerateOptions;
use agentflow::core::types::{TaskFailure, TaskOutcome};
use agentflow::exit_codes;
use agentflow::io::config::DEFAULT_SETTINGS_FILE;
use agentflow::io::init::{DEFAULT_PIPELINE_FILE, InitOptions, init_project};
use agentflow::io::report::{RunReport, write_run_report};
use agentflow::logging;
use agentflow::plan::Plan;
use agentflow::registry::Factories;
use agentflow::scheduler::{RunOutcome, StopReason};
use agentflow::session::{self, ChatSession};
use agentflow::workspace::Workspace;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "agentflow",
    version,
    about = "Configuration-driven task orchestration for pluggable agents"
)]
struct Cli {
    /// Pipeline document.
    #[arg(long, global = true, default_value = DEFAULT_PIPELINE_FILE)]
    pipeline: PathBuf,

    /// Runtime settings; defaults apply when the file is missing.
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a sample pipeline and default settings.
    Init {
        /// Directory to initialize.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the pipeline document, its components and its task graph.
    Validate,
    /// Execute the pipeline's task list.
    Tasks {
        /// Run dependency rounds on the worker pool instead of one by one.
        #[arg(long)]
        parallel: bool,
        /// Write a JSON run report here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the plan the planner agent produces for a goal.
    Plan { goal: String },
    /// Plan a goal, then execute the plan.
    Run {
        goal: String,
        /// Write a JSON run report here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Generate text from a single prompt.
    Generate {
        prompt: String,
        /// Agent to use; defaults to the first configured agent.
        #[arg(long)]
        agent: Option<String>,
        /// Print the reply as it is generated.
        #[arg(long)]
        stream: bool,
    },
    /// Chat with an agent. Reads messages from stdin until EOF or `exit`.
    Chat {
        /// Send one message and print the reply instead of starting a session.
        message: Option<String>,
        /// Agent to use; defaults to the first configured agent.
        #[arg(long)]
        agent: Option<String>,
        /// Print replies as they are generated.
        #[arg(long)]
        stream: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { dir, force } => cmd_init(&dir, force),
        Command::Validate => cmd_validate(&cli.pipeline, &cli.settings),
        Command::Tasks { parallel, report } => {
            let workspace = load(&cli.pipeline, &cli.settings)?;
            let plan = workspace.configured_plan()?;
            if parallel {
                schedule(&workspace, &plan, None, report.as_deref())
            } else {
                run_sequential(&workspace, &plan)
            }
        }
        Command::Plan { goal } => {
            let workspace = load(&cli.pipeline, &cli.settings)?;
            let plan = workspace.plan_goal(&goal)?;
            print_json(&plan.tasks())?;
            Ok(exit_codes::OK)
        }
        Command::Run { goal, report } => {
            let workspace = load(&cli.pipeline, &cli.settings)?;
            let plan = workspace.plan_goal(&goal)?;
            schedule(&workspace, &plan, Some(&goal), report.as_deref())
        }
        Command::Generate {
            prompt,
            agent,
            stream,
        } => {
            let workspace = load(&cli.pipeline, &cli.settings)?;
            let agent = workspace.agent(agent.as_deref())?;
            let options = GenerateOptions {
                stream,
                ..GenerateOptions::default()
            };
            session::generate(agent.as_ref(), &prompt, &options, &mut io::stdout().lock())?;
            Ok(exit_codes::OK)
        }
        Command::Chat {
            message,
            agent,
            stream,
        } => {
            let workspace = load(&cli.pipeline, &cli.settings)?;
            let agent = workspace.agent(agent.as_deref())?;
            let options = GenerateOptions {
                stream,
                ..GenerateOptions::default()
            };
            let mut session = ChatSession::new(agent, options);
            let mut out = io::stdout().lock();
            match message {
                Some(message) => {
                    session.send(&message, &mut out)?;
                }
                None => {
                    session.run(io::stdin().lock(), &mut out)?;
                }
            }
            Ok(exit_codes::OK)
        }
    }
}

fn load(pipeline: &Path, settings: &Path) -> Result<Workspace> {
    Workspace::load(pipeline, settings, &Factories::builtin())
}

fn cmd_init(dir: &Path, force: bool) -> Result<i32> {
    let paths = init_project(dir, &InitOptions { force })?;
    println!("{}", paths.pipeline_path.display());
    println!("{}", paths.settings_path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(pipeline: &Path, settings: &Path) -> Result<i32> {
    let workspace = load(pipeline, settings)?;
    let plan = workspace.configured_plan()?;
    let components = workspace.components();
    print_json(&json!({
        "agents": components.agents.names(),
        "plugins": components.plugins.names(),
        "tools": components.tools.names(),
        "commands": components.commands.names(),
        "tasks": plan.len(),
    }))?;
    Ok(exit_codes::OK)
}

fn run_sequential(workspace: &Workspace, plan: &Plan) -> Result<i32> {
    let mut manager = workspace.task_manager();
    let reports = manager.execute_tasks(plan.tasks());
    let failures: Vec<TaskFailure> = reports
        .into_iter()
        .filter_map(|report| match report.outcome {
            TaskOutcome::Failed(reason) => Some(TaskFailure {
                task_id: report.task_id,
                reason,
            }),
            TaskOutcome::Completed(_) => None,
        })
        .collect();
    print_json(&json!({
        "results": manager.results().clone().into_map(),
        "failures": failures,
    }))?;
    report_failures(&failures);
    Ok(if failures.is_empty() {
        exit_codes::OK
    } else {
        exit_codes::TASK_FAILED
    })
}

fn schedule(
    workspace: &Workspace,
    plan: &Plan,
    goal: Option<&str>,
    report: Option<&Path>,
) -> Result<i32> {
    let started = Instant::now();
    let outcome = workspace.scheduler().run(plan);
    if let Some(path) = report {
        write_run_report(path, &RunReport::new(&outcome, goal, started.elapsed()))
            .context("write run report")?;
    }
    print_json(&outcome.results.clone().into_map())?;
    report_failures(&outcome.failures);
    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &RunOutcome) -> i32 {
    match &outcome.stop {
        StopReason::Stalled { pending } => {
            eprintln!("stalled with pending tasks: {}", pending.join(", "));
            exit_codes::STALLED
        }
        StopReason::Finished if outcome.failures.is_empty() => exit_codes::OK,
        StopReason::Finished => exit_codes::TASK_FAILED,
    }
}

fn report_failures(failures: &[TaskFailure]) {
    for failure in failures {
        eprintln!("task '{}' failed: {}", failure.task_id, failure.reason);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
