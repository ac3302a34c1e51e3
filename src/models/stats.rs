use serde::Serialize;

/// 单个进程的资源使用快照
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct ProcessStats {
    /// CPU 使用率 (0-1，多核时可能大于 1)
    pub cpu: f32,

    /// 常驻内存 (KB)
    pub mem_rss_kb: u64,

    /// 虚拟内存 (KB)
    pub mem_vms_kb: u64,

    /// 父进程 ID，未知时为 -1
    pub ppid: i32,

    /// 操作系统报告的进程状态，例如 "Sleeping"
    pub status: String,
}

impl ProcessStats {
    /// 创建一个空的统计数据
    pub fn empty() -> Self {
        Self {
            ppid: -1,
            ..Self::default()
        }
    }
}

/// 主机资源快照，每个 host-status 周期重新计算
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct HostStats {
    pub cpu_count: u32,
    /// CPU 使用率 (0-1)
    pub cpu_usage: f32,
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_used: u64,
    /// 内存使用率 (0-1)
    pub mem_usage: f32,
    /// 自上次采样以来的发送速率 (KB/s)
    pub net_sent_kbps: f64,
    /// 自上次采样以来的接收速率 (KB/s)
    pub net_recv_kbps: f64,
    pub uptime: u64,
}
