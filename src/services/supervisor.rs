//! 进程监管：状态机、优雅停止与自动重启。
//!
//! 所有方法都只在事件循环线程中调用，不会阻塞。停止流程是两阶段的：
//! `stop_process` 发送 SIGTERM 并记录截止时间，`poll_stopping` 在每轮循环中
//! 回收已退出的子进程，超时则发送 SIGKILL。

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::DeputyError;
use crate::models::{ProcessSpec, ProcessState};
use crate::services::isolation::IsolationManager;
use crate::services::output_capture::OutputPipe;
use crate::services::process_table::{
    AfterStop, PendingStop, ProcessHandle, ProcessRecord, ProcessTable,
};

pub struct Supervisor {
    table: ProcessTable,
    isolation: IsolationManager,
    stop_timeout: Duration,
    buffer_limit: usize,
}

impl Supervisor {
    pub fn new(isolation: IsolationManager, stop_timeout: Duration, buffer_limit: usize) -> Self {
        Self {
            table: ProcessTable::new(),
            isolation,
            stop_timeout,
            buffer_limit,
        }
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ProcessTable {
        &mut self.table
    }

    pub fn isolation(&self) -> &IsolationManager {
        &self.isolation
    }

    /// 创建（或覆盖）一条记录。运行中的旧进程先被停止，停止完成后记录重置。
    pub fn create_process(&mut self, spec: ProcessSpec) {
        let name = spec.name.clone();
        log::info!(
            "Create Process: {} command='{}' group='{}' auto_restart={} realtime={} isolated={}",
            name,
            spec.command,
            spec.group,
            spec.auto_restart,
            spec.realtime,
            spec.isolated
        );

        if let Some(record) = self.table.get_mut(&name) {
            if let Some(pending) = record.stopping.as_mut() {
                pending.then = AfterStop::Reset(spec);
                log::info!(
                    "Create Process: {} is stopping; new definition applies once it exits",
                    name
                );
                return;
            }
            if record.is_running() {
                log::info!("Create Process: {} is running; stopping it first", name);
                begin_stop(record, AfterStop::Reset(spec), self.stop_timeout);
                return;
            }
        }

        if let Some(old) = self.table.remove(&name) {
            self.retire(old);
        }
        self.table.insert(ProcessRecord::new(spec, self.buffer_limit));
    }

    pub fn start_process(&mut self, name: &str) {
        let Some(record) = self.table.get_mut(name) else {
            log::warn!("Start Process: {} not found in the process table, ignoring", name);
            return;
        };

        if record.is_stopping() {
            log::info!("Start Process: {} is stopping, ignoring", name);
            return;
        }
        if let Some(pid) = record.pid() {
            if record.state == ProcessState::Running {
                log::info!("Start Process: {} already running with PID {}", name, pid);
                return;
            }
        }

        launch(record, &mut self.isolation);
    }

    pub fn stop_process(&mut self, name: &str) {
        let Some(record) = self.table.get_mut(name) else {
            log::warn!("Stop Process: {} not found, ignoring", name);
            return;
        };

        if record.is_stopping() {
            log::info!("Stop Process: {} is already stopping", name);
            return;
        }
        if !record.is_running() {
            log::info!("Stop Process: {} is not running ({}), ignoring", name, record.state);
            return;
        }

        begin_stop(record, AfterStop::Settle, self.stop_timeout);
    }

    pub fn delete_process(&mut self, name: &str) {
        let Some(record) = self.table.get_mut(name) else {
            log::warn!("Delete Process: {} not found, ignoring", name);
            return;
        };

        if let Some(pending) = record.stopping.as_mut() {
            pending.then = AfterStop::Remove;
            log::info!("Delete Process: {} is stopping; removing once it exits", name);
            return;
        }
        if record.is_running() {
            begin_stop(record, AfterStop::Remove, self.stop_timeout);
            return;
        }

        if let Some(old) = self.table.remove(name) {
            self.retire(old);
        }
        log::info!("Delete Process: deleted {}", name);
    }

    /// 监控周期：核对运行中的进程是否仍然存活，采集输出，按策略重启
    pub fn monitor(&mut self) {
        for name in self.table.names() {
            let restart = {
                let Some(record) = self.table.get_mut(&name) else {
                    continue;
                };
                record.drain_output();

                if record.state != ProcessState::Running || record.is_stopping() {
                    continue;
                }
                let Some(handle) = record.handle.as_mut() else {
                    continue;
                };

                match handle.child.try_wait() {
                    Ok(None) => false,
                    Ok(Some(status)) => {
                        let pid = handle.pid;
                        let code = exit_code_of(status);
                        if let Some(cpu) = record.handle.take().and_then(|h| h.cpu) {
                            self.isolation.release(cpu);
                        }
                        record.state = ProcessState::Failed;
                        record.exit_code = code;
                        record.drain_output();
                        log::warn!(
                            "Monitor Process: {} (PID {}) exited unexpectedly with code {}",
                            name,
                            pid,
                            code
                        );
                        record.spec.auto_restart
                    }
                    Err(e) => {
                        log::error!("Monitor Process: failed to poll {}: {}", name, e);
                        false
                    }
                }
            };

            if restart {
                if let Some(record) = self.table.get_mut(&name) {
                    record.restarts += 1;
                    log::info!(
                        "Monitor Process: restarting {} (restart #{})",
                        name,
                        record.restarts
                    );
                }
                self.start_process(&name);
            }
        }
    }

    /// 推进所有进行中的停止：回收已退出的进程，超时的发送 SIGKILL
    pub fn poll_stopping(&mut self, now: Instant) {
        for name in self.table.names() {
            let finished = {
                let Some(record) = self.table.get_mut(&name) else {
                    continue;
                };
                let Some((deadline, escalated)) =
                    record.stopping.as_ref().map(|p| (p.deadline, p.escalated))
                else {
                    continue;
                };
                record.drain_output();

                let Some(handle) = record.handle.as_mut() else {
                    record.stopping = None;
                    continue;
                };

                match handle.child.try_wait() {
                    Ok(Some(status)) => Some(status),
                    Ok(None) => {
                        if !escalated && now >= deadline {
                            log::warn!(
                                "Stop Process: {} (PID {}) did not exit within {:?}, killing",
                                name,
                                handle.pid,
                                self.stop_timeout
                            );
                            if let Err(e) = handle.child.start_kill() {
                                log::error!("Stop Process: failed to kill {}: {}", name, e);
                            }
                            if let Some(pending) = record.stopping.as_mut() {
                                pending.escalated = true;
                            }
                        }
                        None
                    }
                    Err(e) => {
                        log::error!("Stop Process: failed to poll {}: {}", name, e);
                        None
                    }
                }
            };

            if let Some(status) = finished {
                self.finish_stop(&name, status);
            }
        }
    }

    /// 对所有运行中的进程发起优雅停止（deputy 退出时使用）
    pub fn stop_all(&mut self) {
        for name in self.table.names() {
            if let Some(record) = self.table.get_mut(&name) {
                if record.is_running() && !record.is_stopping() {
                    begin_stop(record, AfterStop::Settle, self.stop_timeout);
                }
            }
        }
    }

    /// 把所有进程已读到的输出搬进缓冲，供输出周期发布
    pub fn drain_outputs(&mut self) {
        for record in self.table.iter_mut() {
            record.drain_output();
        }
    }

    pub fn has_stopping(&self) -> bool {
        self.table.iter().any(|r| r.is_stopping())
    }

    fn finish_stop(&mut self, name: &str, status: ExitStatus) {
        let Some(record) = self.table.get_mut(name) else {
            return;
        };
        let Some(pending) = record.stopping.take() else {
            return;
        };

        let code = exit_code_of(status);
        let pid = record.pid().unwrap_or(0);
        if let Some(cpu) = record.handle.take().and_then(|h| h.cpu) {
            self.isolation.release(cpu);
        }
        record.exit_code = code;
        record.drain_output();

        if pending.escalated {
            record.state = ProcessState::Killed;
            log::warn!("Stop Process: forcefully killed {} (PID {}), code {}", name, pid, code);
        } else {
            record.state = ProcessState::Stopped;
            log::info!("Stop Process: gracefully stopped {} (PID {}), code {}", name, pid, code);
        }

        match pending.then {
            AfterStop::Settle => {}
            AfterStop::Reset(spec) => {
                log::info!("Create Process: {} reset with its new definition", name);
                if let Some(old) = self.table.remove(name) {
                    self.retire(old);
                }
                self.table.insert(ProcessRecord::new(spec, self.buffer_limit));
            }
            AfterStop::Remove => {
                if let Some(old) = self.table.remove(name) {
                    self.retire(old);
                }
                log::info!("Delete Process: deleted {}", name);
            }
        }
    }

    /// 丢弃一条不再运行的记录，归还其占用的 CPU
    fn retire(&mut self, mut record: ProcessRecord) {
        if let Some(cpu) = record.handle.take().and_then(|h| h.cpu) {
            self.isolation.release(cpu);
        }
    }
}

/// 启动记录对应的进程，失败时记录为 Failed
fn launch(record: &mut ProcessRecord, isolation: &mut IsolationManager) {
    let name = record.spec.name.clone();
    log::info!("Start Process: starting {} with command '{}'", name, record.spec.command);

    // 上一次运行残留的输出先收进缓冲
    record.drain_output();

    let mut parts = record.spec.command.split_whitespace();
    let Some(program) = parts.next() else {
        log::error!("Start Process: {} has an empty command", name);
        record.state = ProcessState::Failed;
        record.last_error = format!("empty command for process {}", name);
        return;
    };

    let mut cmd = Command::new(program);
    cmd.args(parts)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            let err = DeputyError::Spawn {
                command: record.spec.command.clone(),
                source,
            };
            log::error!("Start Process: failed to start {}: {}", name, err);
            record.state = ProcessState::Failed;
            record.handle = None;
            record.last_error = err.to_string();
            return;
        }
    };

    let pid = child.id().unwrap_or(0);
    record.pipe = Some(OutputPipe::attach(
        &name,
        record.output.limit(),
        child.stdout.take(),
        child.stderr.take(),
    ));
    log::info!("Start Process: started {} with PID {}", name, pid);

    let cpu = if record.spec.isolated {
        match isolation.allocate() {
            Some(lease) => match isolation.apply_affinity(pid, &lease) {
                Ok(()) => {
                    log::info!("Start Process: pinned {} to CPU {}", name, lease.cpu());
                    Some(lease)
                }
                Err(e) => {
                    log::warn!("Start Process: {}", e);
                    record.last_error = e.to_string();
                    isolation.release(lease);
                    None
                }
            },
            None => {
                log::warn!("Start Process: no free CPU to isolate {}, running unpinned", name);
                record.last_error = format!("no free CPU to isolate process {}", name);
                None
            }
        }
    } else {
        None
    };

    if record.spec.realtime {
        match isolation.apply_realtime(pid) {
            Ok(()) => log::info!(
                "Start Process: set FIFO real-time scheduling for {} (PID {})",
                name,
                pid
            ),
            Err(e) => {
                log::error!("Start Process: {}", e);
                record.last_error = e.to_string();
            }
        }
    }

    record.handle = Some(ProcessHandle { child, pid, cpu });
    record.state = ProcessState::Running;
    record.exit_code = -1;
    record.started_at = Some(Instant::now());
}

/// 发送 SIGTERM 并记录截止时间
fn begin_stop(record: &mut ProcessRecord, then: AfterStop, timeout: Duration) {
    let Some(pid) = record.pid() else {
        return;
    };

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => log::info!("Stop Process: sent SIGTERM to {} (PID {})", record.name(), pid),
        Err(Errno::ESRCH) => {
            log::debug!("Stop Process: {} (PID {}) already gone", record.name(), pid)
        }
        Err(e) => {
            log::warn!("Stop Process: failed to signal {} (PID {}): {}", record.name(), pid, e);
            record.last_error = format!("failed to signal PID {}: {}", pid, e);
        }
    }

    record.stopping = Some(PendingStop {
        deadline: Instant::now() + timeout,
        escalated: false,
        then,
    });
}

/// 退出码；被信号终止时为 -signum
fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|s| -s))
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn supervisor(stop_timeout: Duration) -> Supervisor {
        let isolation = IsolationManager::new(4, &BTreeSet::from([0]), 40);
        Supervisor::new(isolation, stop_timeout, 64 * 1024)
    }

    fn spec(name: &str, command: &str, auto_restart: bool) -> ProcessSpec {
        ProcessSpec {
            name: name.to_string(),
            command: command.to_string(),
            group: "test".to_string(),
            auto_restart,
            realtime: false,
            isolated: false,
        }
    }

    /// 反复执行 monitor / poll_stopping，直到条件满足或超时
    async fn tick_until<F>(sup: &mut Supervisor, limit: Duration, mut done: F) -> bool
    where
        F: FnMut(&Supervisor) -> bool,
    {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            sup.poll_stopping(Instant::now());
            sup.monitor();
            if done(sup) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn state_of(sup: &Supervisor, name: &str) -> Option<ProcessState> {
        sup.table().get(name).map(|r| r.state())
    }

    /// 忽略 SIGTERM 的脚本
    fn stubborn_script() -> tempfile::TempPath {
        use std::io::Write;
        let mut file = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
        writeln!(file, "trap '' TERM\nsleep 5").unwrap();
        file.into_temp_path()
    }

    #[tokio::test]
    async fn test_scenario_a_exit_without_restart() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("worker", "/bin/true", false));

        assert_eq!(sup.table().len(), 1);
        assert_eq!(state_of(&sup, "worker"), Some(ProcessState::Stopped));

        sup.start_process("worker");
        let record = sup.table().get("worker").unwrap();
        assert_eq!(record.state(), ProcessState::Running);
        assert!(record.pid().unwrap() > 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        sup.monitor();

        let record = sup.table().get("worker").unwrap();
        assert_eq!(record.state(), ProcessState::Failed);
        assert_eq!(record.exit_code(), 0);
        assert_eq!(record.pid(), None);
        assert_eq!(record.restarts(), 0);
    }

    #[tokio::test]
    async fn test_scenario_b_restart_after_external_kill() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("daemon", "/bin/sleep 9999", true));
        sup.start_process("daemon");

        let first_pid = sup.table().get("daemon").unwrap().pid().unwrap();
        let first_start = sup.table().get("daemon").unwrap().started_at().unwrap();
        kill(Pid::from_raw(first_pid as i32), Signal::SIGKILL).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        sup.monitor();

        let record = sup.table().get("daemon").unwrap();
        assert_eq!(record.state(), ProcessState::Running);
        assert_eq!(record.restarts(), 1);
        assert_eq!(record.exit_code(), -1);
        assert_ne!(record.pid().unwrap(), first_pid);
        assert!(record.started_at().unwrap() > first_start);

        sup.delete_process("daemon");
        assert!(tick_until(&mut sup, Duration::from_secs(3), |s| s.table().is_empty()).await);
    }

    #[tokio::test]
    async fn test_crash_without_restart_policy_stays_failed() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("crash", "/bin/false", false));
        sup.start_process("crash");

        assert!(
            tick_until(&mut sup, Duration::from_secs(2), |s| {
                state_of(s, "crash") == Some(ProcessState::Failed)
            })
            .await
        );
        let record = sup.table().get("crash").unwrap();
        assert_eq!(record.exit_code(), 1);

        sup.monitor();
        assert_eq!(state_of(&sup, "crash"), Some(ProcessState::Failed));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_running() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("svc", "/bin/sleep 30", false));
        sup.start_process("svc");

        let pid = sup.table().get("svc").unwrap().pid();
        let started = sup.table().get("svc").unwrap().started_at();

        sup.start_process("svc");
        assert_eq!(sup.table().get("svc").unwrap().pid(), pid);
        assert_eq!(sup.table().get("svc").unwrap().started_at(), started);

        sup.delete_process("svc");
        assert!(tick_until(&mut sup, Duration::from_secs(3), |s| s.table().is_empty()).await);
    }

    #[tokio::test]
    async fn test_unknown_names_are_ignored() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.start_process("ghost");
        sup.stop_process("ghost");
        sup.delete_process("ghost");
        sup.delete_process("ghost");
        assert!(sup.table().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_marks_failed() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("missing", "/nonexistent/binary --flag", true));
        sup.start_process("missing");

        let record = sup.table().get("missing").unwrap();
        assert_eq!(record.state(), ProcessState::Failed);
        assert_eq!(record.pid(), None);
        assert!(record.last_error().contains("/nonexistent/binary"));

        sup.create_process(spec("blank", "   ", false));
        sup.start_process("blank");
        assert_eq!(state_of(&sup, "blank"), Some(ProcessState::Failed));
    }

    #[tokio::test]
    async fn test_graceful_stop_ends_stopped() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("polite", "/bin/sleep 30", false));
        sup.start_process("polite");

        sup.stop_process("polite");
        assert!(sup.table().get("polite").unwrap().is_stopping());

        assert!(
            tick_until(&mut sup, Duration::from_secs(2), |s| !s.has_stopping()).await
        );
        let record = sup.table().get("polite").unwrap();
        assert_eq!(record.state(), ProcessState::Stopped);
        assert_eq!(record.exit_code(), -(Signal::SIGTERM as i32));
        assert_eq!(record.pid(), None);
    }

    #[tokio::test]
    async fn test_stubborn_child_is_killed_after_timeout() {
        let script = stubborn_script();
        let mut sup = supervisor(Duration::from_millis(300));
        sup.create_process(spec("stubborn", &format!("/bin/sh {}", script.display()), false));
        sup.start_process("stubborn");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        sup.stop_process("stubborn");
        assert!(
            tick_until(&mut sup, Duration::from_secs(3), |s| !s.has_stopping()).await
        );

        let record = sup.table().get("stubborn").unwrap();
        assert_eq!(record.state(), ProcessState::Killed);
        assert_eq!(record.exit_code(), -(Signal::SIGKILL as i32));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_stop_does_not_block_other_duties() {
        let script = stubborn_script();
        let mut sup = supervisor(Duration::from_secs(5));
        sup.create_process(spec("stubborn", &format!("/bin/sh {}", script.display()), false));
        sup.create_process(spec("quick", "/bin/true", false));
        sup.start_process("stubborn");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        sup.stop_process("stubborn");
        assert!(started.elapsed() < Duration::from_millis(100));

        // 停止进行中，其他进程仍然可以启动和被监控
        sup.start_process("quick");
        assert!(
            tick_until(&mut sup, Duration::from_secs(2), |s| {
                state_of(s, "quick") == Some(ProcessState::Failed)
            })
            .await
        );
        assert!(sup.table().get("stubborn").unwrap().is_stopping());
        assert_eq!(state_of(&sup, "stubborn"), Some(ProcessState::Running));

        sup.start_process("stubborn");
        assert!(sup.table().get("stubborn").unwrap().is_stopping());

        sup.poll_stopping(Instant::now() + Duration::from_secs(10));
        assert!(
            tick_until(&mut sup, Duration::from_secs(3), |s| !s.has_stopping()).await
        );
        assert_eq!(state_of(&sup, "stubborn"), Some(ProcessState::Killed));
    }

    #[tokio::test]
    async fn test_create_over_running_process_resets_record() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("svc", "/bin/sleep 30", false));
        sup.start_process("svc");
        let old_pid = sup.table().get("svc").unwrap().pid();

        sup.create_process(spec("svc", "/bin/sleep 60", true));

        // 旧进程退出前，记录仍然描述旧进程
        let record = sup.table().get("svc").unwrap();
        assert!(record.is_stopping());
        assert_eq!(record.pid(), old_pid);
        assert_eq!(record.spec().command, "/bin/sleep 30");
        assert!(!record.spec().auto_restart);

        assert!(
            tick_until(&mut sup, Duration::from_secs(3), |s| !s.has_stopping()).await
        );

        let record = sup.table().get("svc").unwrap();
        assert_eq!(record.state(), ProcessState::Stopped);
        assert_eq!(record.exit_code(), -1);
        assert_eq!(record.pid(), None);
        assert_eq!(record.spec().command, "/bin/sleep 60");
        assert!(record.spec().auto_restart);
    }

    #[tokio::test]
    async fn test_delete_running_process_stops_then_removes() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("svc", "/bin/sleep 30", false));
        sup.start_process("svc");
        let pid = sup.table().get("svc").unwrap().pid().unwrap();

        sup.delete_process("svc");
        assert!(sup.table().contains("svc"));
        assert!(tick_until(&mut sup, Duration::from_secs(3), |s| s.table().is_empty()).await);

        // 进程已被回收
        assert_eq!(
            kill(Pid::from_raw(pid as i32), None),
            Err(Errno::ESRCH)
        );
    }

    #[tokio::test]
    async fn test_output_is_captured_into_record() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("echo", "/bin/echo hello", false));
        sup.start_process("echo");

        assert!(
            tick_until(&mut sup, Duration::from_secs(2), |s| {
                s.table().get("echo").map(|r| r.has_output()).unwrap_or(false)
                    && state_of(s, "echo") == Some(ProcessState::Failed)
            })
            .await
        );

        let record = sup.table_mut().get_mut("echo").unwrap();
        assert_eq!(record.take_output(), "hello\n");
        assert!(!record.has_output());
        assert_eq!(record.take_output(), "");
    }

    #[tokio::test]
    async fn test_noisy_child_keeps_monitor_fast_and_bounded() {
        let mut sup = supervisor(Duration::from_secs(2));
        sup.create_process(spec("noisy", "/usr/bin/yes", false));
        sup.start_process("noisy");

        tokio::time::sleep(Duration::from_millis(500)).await;
        let started = Instant::now();
        sup.monitor();
        assert!(started.elapsed() < Duration::from_millis(50));

        let record = sup.table_mut().get_mut("noisy").unwrap();
        let captured = record.take_output();
        assert!(!captured.is_empty());
        assert!(captured.len() <= 64 * 1024);

        sup.delete_process("noisy");
        assert!(tick_until(&mut sup, Duration::from_secs(3), |s| s.table().is_empty()).await);
    }

    #[tokio::test]
    async fn test_isolated_process_gets_and_returns_cpu() {
        let mut sup = supervisor(Duration::from_secs(2));
        let free_before = sup.isolation().free_cpus();

        let mut isolated = spec("pinned", "/bin/sleep 30", false);
        isolated.isolated = true;
        sup.create_process(isolated);
        sup.start_process("pinned");

        let record = sup.table().get("pinned").unwrap();
        assert_eq!(record.state(), ProcessState::Running);
        if record.cpu_affinity().is_some() {
            assert_eq!(sup.isolation().free_cpus(), free_before - 1);
        } else {
            // 主机 CPU 不足时只记录错误，进程照常运行
            assert!(!record.last_error().is_empty());
        }

        sup.delete_process("pinned");
        assert!(tick_until(&mut sup, Duration::from_secs(3), |s| s.table().is_empty()).await);
        assert_eq!(sup.isolation().free_cpus(), free_before);
    }

    #[tokio::test]
    async fn test_realtime_failure_is_not_fatal() {
        let mut sup = supervisor(Duration::from_secs(2));
        let mut rt = spec("rt", "/bin/sleep 30", false);
        rt.realtime = true;
        sup.create_process(rt);
        sup.start_process("rt");

        // 无论是否有权限，进程都应处于运行状态
        assert_eq!(state_of(&sup, "rt"), Some(ProcessState::Running));

        sup.stop_process("rt");
        assert!(
            tick_until(&mut sup, Duration::from_secs(3), |s| !s.has_stopping()).await
        );
        assert_eq!(state_of(&sup, "rt"), Some(ProcessState::Stopped));
    }
}
