//! keel-daemon：机载运行时的装配入口。
//!
//! 职责刻意压到最薄：解析两个命令行参数（配置文件、Profile），装好日志订阅器，
//! 读配置文本、搭总线、起任务线程，然后守着进程活下去。所有行为都在各任务里。

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use keel_core::bus::Bus;
use keel_core::config::Config;
use keel_core::entity::EntityRegistry;
use keel_core::shared::SharedServices;
use keel_core::task::{TaskHandle, TaskSettings, spawn};
use keel_core::time::SystemClock;
use keel_helm::{IdleTask, LineOfSight, PathController};
use keel_supervisor::{EntityMonitor, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "keel-daemon", about = "onboard vehicle control runtime")]
struct Cli {
    /// INI 式配置文件路径；缺省时全部任务吃参数默认值。
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// 配置 Profile（如 Simulation / Hardware）。
    #[arg(short, long)]
    profile: Option<String>,

    /// 本机系统 id。
    #[arg(long, default_value_t = 0x10)]
    system: u16,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match load_config(&cli) {
        Ok(config) => Arc::new(config),
        Err(error) => {
            tracing::error!(%error, "configuration rejected");
            std::process::exit(1);
        }
    };

    let clock: Arc<SystemClock> = Arc::new(SystemClock::new());
    let bus = Bus::new(cli.system, clock.clone());
    let entities = Arc::new(EntityRegistry::new());
    let shared = SharedServices::new();

    let settings = |name: &str| {
        TaskSettings::new(
            name,
            bus.clone(),
            clock.clone(),
            config.clone(),
            entities.clone(),
            shared.clone(),
        )
    };

    let mut handles: Vec<TaskHandle> = Vec::new();
    match spawn(Supervisor::new(), settings("Supervisor")) {
        Ok(handle) => handles.push(handle),
        Err(error) => tracing::error!(%error, "failed to start supervisor"),
    }
    match spawn(EntityMonitor::new(), settings("Entity Monitor")) {
        Ok(handle) => handles.push(handle),
        Err(error) => tracing::error!(%error, "failed to start entity monitor"),
    }
    match spawn(
        PathController::new(LineOfSight::new()),
        settings("Path Controller"),
    ) {
        Ok(handle) => handles.push(handle),
        Err(error) => tracing::error!(%error, "failed to start path controller"),
    }
    match spawn(IdleTask::new(), settings("Idle")) {
        Ok(handle) => handles.push(handle),
        Err(error) => tracing::error!(%error, "failed to start idle maneuver"),
    }
    tracing::info!(tasks = handles.len(), profile = ?config.profile(), "keel runtime up");

    // 任务各自在自己的线程上跑；入口线程只负责活着。
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(Config::from_text(&text, cli.profile.as_deref())?)
        }
        None => Ok(match &cli.profile {
            Some(profile) => Config::with_profile(profile),
            None => Config::new(),
        }),
    }
}
