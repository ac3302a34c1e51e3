use crate::bus::{frame_len, publish_json, Bus, MAX_DATAGRAM};
use crate::config::ChannelConfig;
use crate::metrics::METRICS;
use crate::models::{
    timestamp_us, HostInfoMsg, HostProcsMsg, ProcInfoMsg, ProcOutputMsg, ProcessStats,
};
use crate::services::process_table::ProcessTable;
use crate::services::stats_collector::{local_ip, nice_of, StatsCollector};
use crate::state::AppState;

/// 进程快照中 `cmd` 与 `errors` 的上限（字节）
const MAX_FIELD_BYTES: usize = 1024;

/// 周期性地把主机状态、进程表和进程输出发布到总线
pub struct StatusPublisher {
    hostname: String,
    channels: ChannelConfig,
    collector: StatsCollector,
    max_message_bytes: usize,
    state: Option<AppState>,
    /// 进程快照超过数据报上限，已报告过错误
    procs_oversize: bool,
}

impl StatusPublisher {
    pub fn new(hostname: &str, channels: ChannelConfig, max_message_bytes: usize) -> Self {
        Self {
            hostname: hostname.to_string(),
            channels,
            collector: StatsCollector::new(),
            max_message_bytes,
            state: None,
            procs_oversize: false,
        }
    }

    /// 同时把快照写入 HTTP 端共享的状态
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn host_info(&mut self) -> HostInfoMsg {
        let stats = self.collector.host_stats();
        HostInfoMsg {
            timestamp: timestamp_us(),
            hostname: self.hostname.clone(),
            ip: local_ip(),
            cpus: stats.cpu_count,
            cpu_usage: stats.cpu_usage,
            mem_total: stats.mem_total,
            mem_free: stats.mem_free,
            mem_used: stats.mem_used,
            mem_usage: stats.mem_usage,
            net_sent_kbps: stats.net_sent_kbps,
            net_recv_kbps: stats.net_recv_kbps,
            uptime: stats.uptime,
        }
    }

    pub fn procs_snapshot(&mut self, table: &ProcessTable) -> HostProcsMsg {
        let pids: Vec<u32> = table
            .iter()
            .filter(|r| r.is_running())
            .filter_map(|r| r.pid())
            .collect();
        let mut stats = self.collector.process_stats(&pids);

        let mut procs: Vec<ProcInfoMsg> = table
            .iter()
            .map(|record| {
                let spec = record.spec();
                let pid = record.pid().filter(|_| record.is_running());
                let usage = pid
                    .and_then(|p| stats.remove(&p))
                    .unwrap_or_else(ProcessStats::empty);

                ProcInfoMsg {
                    name: spec.name.clone(),
                    group: spec.group.clone(),
                    cmd: clip(&spec.command, MAX_FIELD_BYTES),
                    state: record.state(),
                    status: usage.status,
                    cpu: usage.cpu,
                    mem_rss_kb: usage.mem_rss_kb,
                    mem_vms_kb: usage.mem_vms_kb,
                    priority: pid.map(nice_of).unwrap_or(-1),
                    pid: pid.map(|p| p as i32).unwrap_or(-1),
                    ppid: usage.ppid,
                    auto_restart: spec.auto_restart,
                    realtime: spec.realtime,
                    isolated: spec.isolated,
                    cpu_affinity: record.cpu_affinity().map(|c| c as i32).unwrap_or(-1),
                    exit_code: record.exit_code(),
                    errors: clip(record.last_error(), MAX_FIELD_BYTES),
                    runtime: record.runtime().as_secs(),
                    restarts: record.restarts(),
                }
            })
            .collect();
        procs.sort_by(|a, b| a.name.cmp(&b.name));

        HostProcsMsg {
            timestamp: timestamp_us(),
            hostname: self.hostname.clone(),
            procs,
        }
    }

    /// 取走每个进程的待发输出（取走即清空），没有输出的进程不产生消息。
    ///
    /// 编码后超过 `max_message_bytes` 的输出按顺序拆成多条消息。
    pub fn take_outputs(&self, table: &mut ProcessTable) -> Vec<ProcOutputMsg> {
        let timestamp = timestamp_us();
        let mut records: Vec<_> = table.iter_mut().filter(|r| r.has_output()).collect();
        records.sort_by(|a, b| a.name().cmp(b.name()));

        let mut outputs = Vec::new();
        for record in records {
            let template = ProcOutputMsg {
                timestamp,
                hostname: self.hostname.clone(),
                name: record.name().to_string(),
                group: record.spec().group.clone(),
                stdout: String::new(),
            };
            let overhead = serde_json::to_vec(&template)
                .map(|v| frame_len(&self.channels.proc_outputs, &v))
                .unwrap_or(0);
            let budget = self.max_message_bytes.saturating_sub(overhead).max(6);

            let text = record.take_output();
            for chunk in split_escaped(&text, budget) {
                outputs.push(ProcOutputMsg {
                    stdout: chunk.to_string(),
                    ..template.clone()
                });
            }
        }
        outputs
    }

    pub fn publish_host_info<B: Bus + ?Sized>(&mut self, bus: &B) {
        let msg = self.host_info();
        if let Err(e) = publish_json(bus, &self.channels.host_info, &msg) {
            log::warn!("Host Status Publish: {}", e);
        }
        METRICS.observe_host(&msg);
        if let Some(state) = &self.state {
            if let Ok(mut guard) = state.lock() {
                guard.last_host = Some(msg);
            }
        }
    }

    pub fn publish_procs<B: Bus + ?Sized>(&mut self, bus: &B, table: &ProcessTable) {
        let msg = self.procs_snapshot(table);
        match serde_json::to_vec(&msg) {
            Ok(payload) if frame_len(&self.channels.host_procs, &payload) > MAX_DATAGRAM => {
                if !self.procs_oversize {
                    log::error!(
                        "Procs Status Publish: snapshot of {} processes is {} bytes, over the {} byte datagram limit; not published",
                        msg.procs.len(),
                        payload.len(),
                        MAX_DATAGRAM
                    );
                    self.procs_oversize = true;
                }
            }
            Ok(payload) => {
                self.procs_oversize = false;
                if let Err(e) = bus.publish(&self.channels.host_procs, &payload) {
                    log::warn!("Procs Status Publish: {}", e);
                }
            }
            Err(e) => log::warn!("Procs Status Publish: cannot encode snapshot: {}", e),
        }
        METRICS.observe_procs(&msg);
        if let Some(state) = &self.state {
            if let Ok(mut guard) = state.lock() {
                guard.last_procs = Some(msg);
            }
        }
    }

    pub fn publish_outputs<B: Bus + ?Sized>(&self, bus: &B, table: &mut ProcessTable) {
        for msg in self.take_outputs(table) {
            if let Err(e) = publish_json(bus, &self.channels.proc_outputs, &msg) {
                log::warn!("Output Publish: {} ({})", e, msg.name);
            }
        }
    }
}

/// 字符在 JSON 字符串中转义后的字节数
fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{8}' | '\u{c}' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

/// 按字符边界切分，每段转义后不超过 `budget` 字节
fn split_escaped(text: &str, budget: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut size = 0;
    for (i, c) in text.char_indices() {
        let n = escaped_len(c);
        if size + n > budget && i > start {
            chunks.push(&text[start..i]);
            start = i;
            size = 0;
        }
        size += n;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// 超过上限时保留开头（按字符边界）
fn clip(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
