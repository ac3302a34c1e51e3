use std::future::Future;
use std::time::{Duration, Instant};

use crate::bus::Bus;
use crate::config::DeputyConfig;
use crate::services::{CommandIngress, StatusPublisher, Supervisor, Timer};

/// 各周期任务的定时器
struct Timers {
    monitor: Timer,
    output: Timer,
    host_status: Timer,
    procs_status: Timer,
}

/// 单线程事件循环：轮询总线、分发命令、按定时器执行监控与发布。
///
/// 进程表只在这里被修改，不需要任何锁。
pub struct Deputy<B: Bus> {
    bus: B,
    supervisor: Supervisor,
    ingress: CommandIngress,
    publisher: StatusPublisher,
    timers: Timers,
    poll_timeout: Duration,
    stop_timeout: Duration,
}

impl<B: Bus> Deputy<B> {
    pub fn new(
        bus: B,
        supervisor: Supervisor,
        ingress: CommandIngress,
        publisher: StatusPublisher,
        config: &DeputyConfig,
    ) -> Self {
        let now = Instant::now();
        let timers = Timers {
            monitor: Timer::new(config.timers.monitor(), now),
            output: Timer::new(config.timers.output(), now),
            host_status: Timer::new(config.timers.host_status(), now),
            procs_status: Timer::new(config.timers.procs_status(), now),
        };

        Self {
            bus,
            supervisor,
            ingress,
            publisher,
            timers,
            poll_timeout: config.poll_timeout(),
            stop_timeout: config.stop_timeout(),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// 运行事件循环直到 `shutdown` 完成，然后停止所有子进程
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) {
        log::info!(
            "Deputy: event loop started for host '{}'",
            self.ingress.hostname()
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.step() => {}
            }
        }

        log::info!("Deputy: shutting down, stopping all processes");
        self.shutdown().await;
    }

    /// 一次循环：最多等待一个轮询周期接收命令，然后执行到期的定时任务
    pub async fn step(&mut self) {
        match self.bus.recv(self.poll_timeout).await {
            Ok(Some(frame)) => self.ingress.handle_frame(&frame, &mut self.supervisor),
            Ok(None) => {}
            Err(e) => {
                log::warn!("Deputy: bus receive failed: {}", e);
                tokio::time::sleep(self.poll_timeout).await;
            }
        }
        self.run_due(Instant::now());
    }

    fn run_due(&mut self, now: Instant) {
        self.supervisor.poll_stopping(now);

        if self.timers.monitor.timeout(now) {
            self.supervisor.monitor();
        }
        if self.timers.output.timeout(now) {
            self.supervisor.drain_outputs();
            self.publisher
                .publish_outputs(&self.bus, self.supervisor.table_mut());
        }
        if self.timers.host_status.timeout(now) {
            self.publisher.publish_host_info(&self.bus);
        }
        if self.timers.procs_status.timeout(now) {
            self.publisher.publish_procs(&self.bus, self.supervisor.table());
        }
    }

    /// 对所有子进程发起优雅停止，等待回收，最多到停止超时再加一秒
    pub async fn shutdown(&mut self) {
        self.supervisor.stop_all();
        let deadline = Instant::now() + self.stop_timeout + Duration::from_secs(1);

        while self.supervisor.has_stopping() && Instant::now() < deadline {
            self.supervisor.poll_stopping(Instant::now());
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if self.supervisor.has_stopping() {
            log::warn!("Deputy: some processes were not reaped before exit");
        }

        self.supervisor.drain_outputs();
        self.publisher
            .publish_outputs(&self.bus, self.supervisor.table_mut());
        self.publisher.publish_procs(&self.bus, self.supervisor.table());
    }
}
