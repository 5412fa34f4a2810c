use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tokio::signal;
use tracing::{error, info, warn};

use dispatch_core::{init_logging, AppConfig, LogLevel, OutputFormat};
use dispatch_domain::{DispatchOutcome, TimeSource};
use dispatch_engine::{DispatchSession, SessionState};
use dispatch_infrastructure::{
    build_time_source, FixedClock, ScriptedConversationBackend, StaticContractRepository,
};

mod scenario;

use scenario::Scenario;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("chat-dispatch")
        .version("1.0.0")
        .about("多合约客服会话分发模拟")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认路径查找"),
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("模拟场景文件")
                .required(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let scenario_path = matches
        .get_one::<String>("scenario")
        .context("缺少场景文件参数")?;

    // 加载配置
    let mut config = AppConfig::load(config_path.map(String::as_str)).context("加载配置失败")?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }

    init_logging(&config.logging)?;

    info!("启动会话分发模拟");
    info!("场景文件: {scenario_path}");

    let scenario = Scenario::load(Path::new(scenario_path))?;
    let outcome = run_scenario(&config, scenario).await?;

    println!("分发结果: {}", outcome.as_str());
    match &outcome {
        DispatchOutcome::Connected(conversation) => println!(
            "接起会话: {} (合约 {})",
            conversation.id, conversation.contract_id
        ),
        DispatchOutcome::Aborted(reason) => println!("终止原因: {reason}"),
        _ => println!("{}", outcome.user_message()),
    }

    Ok(())
}

async fn run_scenario(config: &AppConfig, scenario: Scenario) -> Result<DispatchOutcome> {
    let backend = Arc::new(ScriptedConversationBackend::new(scenario.scripts()));
    let contracts = Arc::new(StaticContractRepository::new(scenario.contracts()));
    let time_source: Arc<dyn TimeSource> = match scenario.now {
        Some(now) => {
            info!("使用场景指定的时间: {}", now);
            Arc::new(FixedClock::new(now))
        }
        None => build_time_source(&config.time_service)?,
    };

    let session = Arc::new(DispatchSession::new(
        backend,
        contracts,
        time_source,
        config.dispatch.clone(),
        config.status_watch.clone(),
    ));

    let mut states = session.subscribe();
    let state_logger = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            info!("会话状态: {:?}", state);
            if state.is_terminal() {
                break;
            }
        }
    });

    // Ctrl+C 取消等待中的会话
    let cancel_session = Arc::clone(&session);
    let cancel_watcher = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，取消会话");
            cancel_session.cancel();
        }
    });

    let result = session.submit(scenario.customer).await;
    cancel_watcher.abort();

    if let Err(e) = state_logger.await {
        error!("状态日志任务异常退出: {e}");
    }

    match result {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            if let SessionState::Rejected { reason } = session.state() {
                error!("提交被拒绝: {reason}");
            }
            println!("{}", e.user_message());
            Err(e).context("会话提交失败")
        }
    }
}
