//! Chat Relay Monitor CLI
//!
//! 采集多个聊天来源的消息，提供只读快照接口，并把新消息转发到 Telegram

use anyhow::Result;
use chat_relay_monitor::{supervisor, AppConfig, RunOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "crm")]
#[command(about = "Chat Relay Monitor - 多来源聊天消息采集与转发")]
#[command(version)]
struct Cli {
    /// 输出 debug 级别日志（RUST_LOG 优先）
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动轮询、转发和读接口
    Run {
        /// 配置文件路径 (默认: ~/.config/chat-relay-monitor/config.json)
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 覆盖读接口端口
        #[arg(long, short)]
        port: Option<u16>,
        /// 只采集不转发
        #[arg(long)]
        no_relay: bool,
    },
    /// 加载并校验配置
    CheckConfig {
        /// 配置文件路径 (默认: ~/.config/chat-relay-monitor/config.json)
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    // 通过 RUST_LOG 环境变量控制日志级别
    // 例如: RUST_LOG=chat_relay_monitor=debug crm run
    let default = if verbose {
        "chat_relay_monitor=debug,crm=debug"
    } else {
        "chat_relay_monitor=info,crm=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { config, port, no_relay } => {
            let config = AppConfig::load(config.as_deref())?;
            info!(sources = config.sources.len(), "Starting chat relay monitor");
            supervisor::run(config, RunOptions { port, no_relay }).await?;
        }
        Commands::CheckConfig { config, json } => {
            let path = config.unwrap_or_else(AppConfig::default_path);
            let config = AppConfig::load(Some(&path))?;
            config.validate()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("配置有效: {}", path.display());
                println!("  缓冲区容量: {}", config.buffer_capacity);
                println!("  轮询间隔: {}s | 时间窗口: {}h", config.poll_interval_secs, config.recency_window_hours);
                println!("  展示时区: {}", config.display_zone()?);
                println!(
                    "  转发: {}",
                    if config.relay.enabled {
                        format!("telegram -> {}", config.relay.chat_id)
                    } else {
                        "disabled".to_string()
                    }
                );
                println!("\n发现 {} 个来源:\n", config.sources.len());
                for source in &config.sources {
                    let authors = source
                        .allowed_authors
                        .as_ref()
                        .map(|rules| rules.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(", "))
                        .unwrap_or_else(|| "*".to_string());
                    println!(
                        "  ID: {} | 类型: {} | 标签: {} | 作者: {}",
                        source.id,
                        source.kind.as_str(),
                        source.display_label(),
                        authors
                    );
                }
            }
        }
    }

    Ok(())
}
