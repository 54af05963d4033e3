//! CodeAgent 命令行入口：交互式 REPL
//!
//! 用法：codeagent [--plan] [--config <path>]
//! 对话中输入 /plan 查看当前计划，/clear 清空会话，/exit 退出；Ctrl-C 取消正在进行的一轮。

use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use codeagent::core::{create_agent_builder, AgentError};
use codeagent::react::{AgentEvent, AgentLoop};

/// 工具输出在终端展示的最大字符数
const TOOL_PREVIEW_CHARS: usize = 500;

struct CliArgs {
    plan_mode: bool,
    config_path: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = CliArgs {
        plan_mode: false,
        config_path: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--plan" => args.plan_mode = true,
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                args.config_path = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn preview(text: &str) -> String {
    if text.chars().count() > TOOL_PREVIEW_CHARS {
        format!("{}...", text.chars().take(TOOL_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

fn print_event(ev: &AgentEvent) {
    match ev {
        AgentEvent::DispatchStarted { count, names } => {
            println!("\n[Executing {} tool call(s): {}]", count, names.join(", "));
        }
        AgentEvent::ToolOutput { name, content, .. } => {
            println!("[Tool Output ({})]: {}", name, preview(content));
        }
        AgentEvent::Answer { text } => println!("\n{}\n", text),
        AgentEvent::Compacted { removed } => {
            println!("[Context compacted: {} message(s) summarized]", removed);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖；写到 stderr，不与对话输出混在一起
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args()?;
    let builder = create_agent_builder(args.config_path).context("Failed to load configuration")?;
    let plan_mode = args.plan_mode || builder.config().app.plan_mode;
    let components = builder.build_components();
    let mut agent = AgentLoop::new(components, plan_mode);

    println!(
        "CodeAgent ready in {} ({}). Type /exit to quit.",
        builder.workspace().display(),
        if plan_mode { "plan mode" } else { "chat mode" }
    );

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<AgentEvent>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                agent.reset();
                println!("Session cleared.");
                continue;
            }
            "/plan" => {
                println!("{}", agent.tasks().plan_summary());
                continue;
            }
            _ => {}
        }

        agent.renew_cancel_token();
        let token = agent.cancel_token();
        let run = agent.run(input, Some(&event_tx));
        tokio::pin!(run);
        // 边跑边打印过程事件；Ctrl-C 只取消，仍等本轮收尾
        let result = loop {
            tokio::select! {
                r = &mut run => break r,
                Some(ev) = event_rx.recv() => print_event(&ev),
                _ = tokio::signal::ctrl_c(), if !token.is_cancelled() => token.cancel(),
            }
        };
        while let Ok(ev) = event_rx.try_recv() {
            print_event(&ev);
        }

        match result {
            Ok(_) => {}
            Err(AgentError::Cancelled) => println!("\n[Cancelled]"),
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "turn failed");
                println!("\n[Error] {}\nCheck the provider configuration before retrying.", e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                println!("\n[Error] {}\nSend the message again to retry.", e);
            }
        }
    }

    Ok(())
}
