use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};

mod api;
mod bus;
mod cli;
mod config;
mod deputy;
mod error;
mod metrics;
mod models;
mod services;
mod state;

use api::{get_host, get_metrics, health, list_processes};
use bus::UdpMulticastBus;
use cli::CommandArgs;
use config::DeputyConfig;
use deputy::Deputy;
use services::{CommandIngress, IsolationManager, StatusPublisher, Supervisor};
use state::new_state;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();

    let config = match &args.config {
        Some(path) => DeputyConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DeputyConfig::default(),
    };
    let hostname = resolve_hostname(&args, &config);

    let isolation = IsolationManager::from_host(
        &config.isolation.reserved_cpus,
        config.isolation.realtime_priority,
    )?;
    log::info!(
        "🧩 Isolation: {} CPU(s) available for isolated processes",
        isolation.free_cpus()
    );
    let supervisor = Supervisor::new(
        isolation,
        config.stop_timeout(),
        config.output.max_buffer_bytes,
    );

    let bus = UdpMulticastBus::new(
        &config.bus,
        config.multicast_group()?,
        &config.channels.command,
    )
    .context("failed to open the multicast bus")?;

    let state = new_state(&hostname);
    let ingress = CommandIngress::new(hostname.clone());
    let publisher = StatusPublisher::new(
        &hostname,
        config.channels.clone(),
        config.output.max_message_bytes,
    )
    .with_state(state.clone());

    let mut deputy = Deputy::new(bus, supervisor, ingress, publisher, &config);

    print_banner(&args, &hostname, &config);

    if args.no_http {
        deputy.run(shutdown_signal()).await;
        return Ok(());
    }

    let bind_address = format!("{}:{}", args.address, args.port);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .route("/api/process/list", web::get().to(list_processes))
            .route("/api/host", web::get().to(get_host))
            .route("/metrics", web::get().to(get_metrics))
            .route("/health", web::get().to(health))
    })
        .workers(1)
        .disable_signals()
        .bind(&bind_address)
        .with_context(|| format!("failed to bind HTTP exporter on {}", bind_address))?
        .run();
    let handle = server.handle();
    tokio::pin!(server);

    let server_exit = tokio::select! {
        res = &mut server => Some(res),
        _ = deputy.run(shutdown_signal()) => None,
    };

    match server_exit {
        Some(res) => {
            log::error!("❌ HTTP exporter stopped unexpectedly, stopping all processes");
            deputy.shutdown().await;
            res?;
        }
        None => handle.stop(true).await,
    }

    log::info!("👋 Deputy exited");
    Ok(())
}

/// 命令行 > 配置文件 > 系统主机名
fn resolve_hostname(args: &CommandArgs, config: &DeputyConfig) -> String {
    args.hostname
        .clone()
        .or_else(|| config.hostname.clone())
        .or_else(sysinfo::System::host_name)
        .unwrap_or_else(|| "localhost".to_string())
}

async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Received Ctrl-C"),
        _ = terminate.recv() => log::info!("Received SIGTERM"),
    }
}

fn print_banner(args: &CommandArgs, hostname: &str, config: &DeputyConfig) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      Procman Deputy v{:<37}║", env!("CARGO_PKG_VERSION"));
    println!("║      Host Process Supervisor                              ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🖥  Host: {}", hostname);
    println!(
        "📡 Bus: {}:{} (commands on '{}')",
        config.bus.group, config.bus.port, config.channels.command
    );
    println!();
    println!("📤 Publishing:");
    println!(
        "  {:<24} every {}s",
        config.channels.host_info, config.timers.host_status_interval
    );
    println!(
        "  {:<24} every {}s",
        config.channels.host_procs, config.timers.procs_status_interval
    );
    println!(
        "  {:<24} every {}s",
        config.channels.proc_outputs, config.timers.output_interval
    );
    println!();
    if args.no_http {
        println!("🔕 HTTP exporter disabled");
    } else {
        println!("🚀 HTTP exporter on http://{}:{}", args.address, args.port);
        println!();
        println!("📋 Available endpoints:");
        println!("  GET    /api/process/list       - Last process table snapshot");
        println!("  GET    /api/host               - Last host snapshot");
        println!("  GET    /metrics                - Prometheus metrics");
        println!("  GET    /health                 - Health check");
    }
    println!("═══════════════════════════════════════════════════════════");
}
