use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::process::Child;

use crate::models::{ProcessSpec, ProcessState};
use crate::services::isolation::CpuLease;
use crate::services::output_capture::{OutputBuffers, OutputPipe};

/// 运行中进程的操作系统句柄，只属于一条记录
#[derive(Debug)]
pub struct ProcessHandle {
    pub(crate) child: Child,
    pub(crate) pid: u32,
    pub(crate) cpu: Option<CpuLease>,
}

/// 停止完成后要执行的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterStop {
    /// 保持停止状态
    Settle,
    /// 用新定义重置记录（create_process 覆盖运行中的进程）。
    /// 旧进程退出前，记录仍展示旧定义。
    Reset(ProcessSpec),
    /// 从进程表删除（delete_process）
    Remove,
}

/// 已发送 SIGTERM、等待退出的停止过程
#[derive(Debug, Clone)]
pub struct PendingStop {
    pub deadline: Instant,
    /// 已超时并发送 SIGKILL
    pub escalated: bool,
    pub then: AfterStop,
}

/// 进程表中的一条记录
#[derive(Debug)]
pub struct ProcessRecord {
    pub(crate) spec: ProcessSpec,
    pub(crate) state: ProcessState,
    pub(crate) exit_code: i32,
    pub(crate) last_error: String,
    pub(crate) restarts: u32,
    pub(crate) handle: Option<ProcessHandle>,
    pub(crate) pipe: Option<OutputPipe>,
    pub(crate) output: OutputBuffers,
    pub(crate) started_at: Option<Instant>,
    pub(crate) stopping: Option<PendingStop>,
}

impl ProcessRecord {
    pub fn new(spec: ProcessSpec, buffer_limit: usize) -> Self {
        Self {
            spec,
            state: ProcessState::Stopped,
            exit_code: -1,
            last_error: String::new(),
            restarts: 0,
            handle: None,
            pipe: None,
            output: OutputBuffers::new(buffer_limit),
            started_at: None,
            stopping: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// 运行中的 PID
    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.pid)
    }

    pub fn cpu_affinity(&self) -> Option<usize> {
        self.handle
            .as_ref()
            .and_then(|h| h.cpu.as_ref())
            .map(|lease| lease.cpu())
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// 本次运行时长，未运行时为零
    pub fn runtime(&self) -> Duration {
        match (self.state, self.started_at) {
            (ProcessState::Running, Some(t)) => t.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running && self.handle.is_some()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.is_some()
    }

    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    /// 取走缓冲的 stdout + stderr 并清空
    pub fn take_output(&mut self) -> String {
        self.output.take()
    }

    /// 把读取任务已转发的输出搬进缓冲；流关闭后丢弃管道
    pub(crate) fn drain_output(&mut self) {
        if let Some(pipe) = self.pipe.as_mut() {
            pipe.drain(&mut self.output);
            if pipe.is_closed() {
                self.pipe = None;
            }
        }
    }
}

/// 名称 -> 记录
#[derive(Debug, Default)]
pub struct ProcessTable {
    records: HashMap<String, ProcessRecord>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ProcessRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProcessRecord> {
        self.records.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn insert(&mut self, record: ProcessRecord) {
        self.records.insert(record.spec.name.clone(), record);
    }

    pub fn remove(&mut self, name: &str) -> Option<ProcessRecord> {
        self.records.remove(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 名称快照，便于在遍历中修改表
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ProcessRecord> {
        self.records.values_mut()
    }
}
