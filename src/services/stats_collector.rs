use crate::models::{HostStats, ProcessStats};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Instant;
use sysinfo::{CpuRefreshKind, Networks, Pid, ProcessesToUpdate, RefreshKind, System};

/// 主机与子进程的资源采样。保留上一次的采样以计算 CPU 使用率和网络速率。
pub struct StatsCollector {
    system: System,
    networks: Networks,
    last_net: Option<NetSample>,
}

#[derive(Debug, Clone, Copy)]
struct NetSample {
    at: Instant,
    sent: u64,
    recv: u64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            networks: Networks::new_with_refreshed_list(),
            last_net: None,
        }
    }

    /// 主机快照；网络速率为距上次调用的增量，第一次调用为 0
    pub fn host_stats(&mut self) -> HostStats {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.networks.refresh(true);

        let now = Instant::now();
        let (sent, recv) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(s, r), (_, data)| {
                (s + data.total_transmitted(), r + data.total_received())
            });
        let current = NetSample { at: now, sent, recv };
        let (net_sent_kbps, net_recv_kbps) = match self.last_net {
            Some(prev) => rate_kbps(&prev, &current),
            None => (0.0, 0.0),
        };
        self.last_net = Some(current);

        let mem_total = self.system.total_memory();
        let mem_used = self.system.used_memory();

        HostStats {
            cpu_count: self.system.cpus().len() as u32,
            cpu_usage: self.system.global_cpu_usage() / 100.0,
            mem_total,
            mem_free: self.system.free_memory(),
            mem_used,
            mem_usage: if mem_total > 0 {
                mem_used as f32 / mem_total as f32
            } else {
                0.0
            },
            net_sent_kbps,
            net_recv_kbps,
            uptime: System::uptime(),
        }
    }

    /// 采集指定 PID 的资源使用；已消失的进程不在结果中
    pub fn process_stats(&mut self, pids: &[u32]) -> HashMap<u32, ProcessStats> {
        let targets: Vec<Pid> = pids.iter().map(|p| Pid::from_u32(*p)).collect();
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&targets), true);

        let mut stats = HashMap::new();
        for pid in pids {
            let Some(process) = self.system.process(Pid::from_u32(*pid)) else {
                continue;
            };
            stats.insert(
                *pid,
                ProcessStats {
                    cpu: process.cpu_usage() / 100.0,
                    mem_rss_kb: process.memory() / 1024,
                    mem_vms_kb: process.virtual_memory() / 1024,
                    ppid: process.parent().map(|p| p.as_u32() as i32).unwrap_or(-1),
                    status: process.status().to_string(),
                },
            );
        }
        stats
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn rate_kbps(prev: &NetSample, current: &NetSample) -> (f64, f64) {
    let elapsed = current.at.duration_since(prev.at).as_secs_f64();
    if elapsed <= 0.0 {
        return (0.0, 0.0);
    }
    // 网卡计数器可能被重置
    let sent = current.sent.saturating_sub(prev.sent) as f64;
    let recv = current.recv.saturating_sub(prev.recv) as f64;
    (sent / elapsed / 1024.0, recv / elapsed / 1024.0)
}

/// 主机 CPU 数，与主机快照中的 `cpus` 同源
pub fn host_cpu_count() -> usize {
    let system =
        System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing()));
    system.cpus().len().max(1)
}

/// 进程的 nice 值
pub fn nice_of(pid: u32) -> i32 {
    unsafe { libc::getpriority(libc::PRIO_PROCESS, pid as libc::id_t) }
}

/// 本机对外 IP；UDP connect 不会真正发包
pub fn local_ip() -> String {
    let detect = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(("10.254.254.254", 1))?;
        Ok(socket.local_addr()?.ip())
    };
    detect()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .to_string()
}
