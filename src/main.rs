//! Aegis 命令行入口
//!
//! `aegis run <goal-or-playbook.toml> [--config path]`：加载配置、初始化日志、构建编排器，
//! Ctrl+C 触发取消，运行结束后以 JSON 打印结果。

use std::path::PathBuf;

use aegis::config::load_config;
use aegis::core::{OrchestratorBuilder, RunFile, RunOutcome, SessionSupervisor, TerminatedReason};
use aegis::observability;
use aegis::react::RunEvent;
use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a goal or playbook TOML file
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Override agent.max_steps
        #[arg(long)]
        max_steps: Option<u32>,
    },
    /// List registered capabilities with their parameter schemas
    Capabilities,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config).context("Failed to load config")?;

    match cli.command {
        Commands::Capabilities => {
            let orchestrator = OrchestratorBuilder::new(cfg)
                .build()
                .context("Failed to build orchestrator")?;
            let specs = orchestrator.registry().specs();
            println!("{}", serde_json::to_string_pretty(&specs)?);
            Ok(())
        }
        Commands::Run { file, max_steps } => {
            if let Some(n) = max_steps {
                cfg.agent.max_steps = n;
            }
            let run_file = RunFile::load(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;

            let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RunEvent>();
            tokio::spawn(async move {
                while let Some(ev) = event_rx.recv().await {
                    if let Ok(json) = serde_json::to_string(&ev) {
                        tracing::debug!(target: "aegis::events", "{}", json);
                    }
                }
            });

            let orchestrator = OrchestratorBuilder::new(cfg)
                .build()
                .context("Failed to build orchestrator")?
                .with_event_tx(event_tx);

            let supervisor = SessionSupervisor::new();
            let cancel = supervisor.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    supervisor.cancel();
                }
            });

            let outcomes: Vec<RunOutcome> = match run_file {
                RunFile::Goal(goal) => vec![orchestrator.start_run(goal, cancel).await],
                RunFile::Playbook(pb) => orchestrator.run_playbook(&pb, cancel).await,
            };

            println!("{}", serde_json::to_string_pretty(&outcomes)?);

            if let Some(failed) = outcomes
                .iter()
                .find(|o| o.terminated_reason == TerminatedReason::FatalError)
            {
                anyhow::bail!(
                    "run {} failed: {}",
                    failed.run_id,
                    failed.error.as_deref().unwrap_or("unknown error")
                );
            }
            Ok(())
        }
    }
}
