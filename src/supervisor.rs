//! 任务监督 - 启动所有后台任务并在退出时统一取消
//!
//! 每个来源一个轮询任务，可选一个转发任务，读接口在前台运行。

use crate::config::AppConfig;
use crate::filter::FilterEngine;
use crate::notification::{MessageFormatter, RelayDispatcher, TelegramSink};
use crate::server::{self, AppState};
use crate::snapshot::{DisplayZone, SnapshotReader};
use crate::source::{build_adapter, resolve_label, SourcePoller};
use crate::state::SharedState;
use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// `crm run` 的运行选项
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 覆盖配置中的端口
    pub port: Option<u16>,
    /// 不启动转发
    pub no_relay: bool,
}

/// 已启动的后台任务集合
pub struct Supervisor {
    state: Arc<SharedState>,
    zone: DisplayZone,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    /// 校验配置并启动轮询与转发任务
    pub async fn start(mut config: AppConfig, options: &RunOptions) -> Result<Self> {
        if options.no_relay {
            config.relay.enabled = false;
        }
        config.validate()?;

        let zone = config.display_zone()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("failed to build HTTP client")?;

        let state = Arc::new(SharedState::new(config.buffer_capacity, config.source_ids()));
        let filter = FilterEngine::new(config.recency_window());
        let mut tasks = Vec::new();

        for source in &config.sources {
            let label = resolve_label(&client, &config, source).await;
            info!(source = %source.id, kind = source.kind.as_str(), label = %label, "Starting source");

            let adapter = build_adapter(&client, &config, source, label);
            let poller = SourcePoller::new(
                adapter,
                source.clone(),
                filter,
                Arc::clone(&state),
                config.poll_interval(),
            );
            tasks.push((format!("poller:{}", source.id), tokio::spawn(poller.run())));
        }

        if config.relay.enabled {
            let sink = Arc::new(TelegramSink::from_config(client.clone(), &config.relay)?);
            let dispatcher = RelayDispatcher::new(
                sink,
                Arc::clone(&state),
                config.sources.clone(),
                filter,
                MessageFormatter::new(zone),
            )
            .with_min_send_interval(config.relay.min_send_interval())
            .with_interval(config.relay.interval());
            tasks.push(("relay".to_string(), tokio::spawn(dispatcher.run())));
        } else {
            info!("Relay disabled");
        }

        Ok(Self { state, zone, tasks })
    }

    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            reader: SnapshotReader::new(self.state()),
            zone: self.zone,
        }
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// 取消所有后台任务并等待退出
    pub async fn shutdown(self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
        for (name, handle) in self.tasks {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(task = %name, error = %e, "Task ended abnormally"),
            }
        }
        info!("All tasks stopped");
    }
}

/// 启动全部任务并运行读接口，收到 Ctrl-C 后退出
pub async fn run(config: AppConfig, options: RunOptions) -> Result<()> {
    let addr = format!(
        "{}:{}",
        config.server.bind,
        options.port.unwrap_or(config.server.port)
    );
    let supervisor = Supervisor::start(config, &options).await?;

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    };
    let served = server::serve(&addr, supervisor.app_state(), shutdown).await;

    supervisor.shutdown().await;
    served
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, SourceKind};

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        // 不可达地址，轮询只会失败并记录日志
        config.flyzoo.api_base = "http://127.0.0.1:9".to_string();
        config.display_timezone = Some("UTC".to_string());
        config.sources = vec![
            SourceConfig::new(
                "flyzoo",
                SourceKind::Flyzoo {
                    chatroom_id: "r".into(),
                    website_id: "w".into(),
                    page_size: 25,
                },
            ),
            SourceConfig::new(
                "labelled",
                SourceKind::Discord {
                    channel_id: "1".into(),
                    page_limit: 50,
                },
            )
            .with_label("all-trades"),
        ];
        config.discord.api_base = "http://127.0.0.1:9".to_string();
        config
    }

    #[tokio::test]
    async fn test_start_without_relay() {
        let options = RunOptions {
            port: None,
            no_relay: true,
        };
        let supervisor = Supervisor::start(offline_config(), &options).await.unwrap();
        assert_eq!(supervisor.task_names(), vec!["poller:flyzoo", "poller:labelled"]);
        assert_eq!(supervisor.app_state().zone, DisplayZone::Named(chrono_tz::UTC));
        assert!(supervisor.state().is_empty());
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_rejects_relay_without_token() {
        let mut config = offline_config();
        config.relay.chat_id = "-100".to_string();
        config.relay.bot_token = None;
        assert!(Supervisor::start(config, &RunOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_start_with_relay_spawns_dispatcher() {
        let mut config = offline_config();
        config.relay.chat_id = "-100".to_string();
        config.relay.bot_token = Some("123:abc".to_string());
        config.relay.api_base = "http://127.0.0.1:9".to_string();
        let supervisor = Supervisor::start(config, &RunOptions::default()).await.unwrap();
        assert!(supervisor.task_names().contains(&"relay"));
        supervisor.shutdown().await;
    }
}
