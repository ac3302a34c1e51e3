use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::bus::MAX_DATAGRAM;
use crate::error::{DeputyError, Result};

/// 时间类配置的取值范围
const MIN_DURATION: Duration = Duration::from_millis(1);
const MAX_DURATION: Duration = Duration::from_secs(24 * 3600);

/// deputy 配置（TOML），所有字段均有默认值
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeputyConfig {
    /// 本机标识，默认使用系统主机名
    pub hostname: Option<String>,
    /// 单次总线轮询的最长等待（毫秒）
    pub poll_timeout_ms: u64,
    /// 优雅停止的等待上限（秒）
    pub stop_timeout: f64,
    pub channels: ChannelConfig,
    pub timers: TimerConfig,
    pub bus: BusConfig,
    pub isolation: IsolationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub command: String,
    pub host_info: String,
    pub host_procs: String,
    pub proc_outputs: String,
}

/// 各定时器周期（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimerConfig {
    pub monitor_interval: f64,
    pub output_interval: f64,
    pub host_status_interval: f64,
    pub procs_status_interval: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// 组播地址
    pub group: String,
    pub port: u16,
    pub ttl: u32,
    /// 是否接收本机发出的组播
    pub loopback: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IsolationConfig {
    /// 保留给系统使用的 CPU 列表，例如 "0-1,4"
    pub reserved_cpus: String,
    /// SCHED_FIFO 优先级 (1-99)
    pub realtime_priority: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// 每个输出流缓冲上限（字节）
    pub max_buffer_bytes: usize,
    /// 单条输出消息编码后的上限（字节），超出时拆成多条
    pub max_message_bytes: usize,
}

impl Default for DeputyConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            poll_timeout_ms: 50,
            stop_timeout: 2.0,
            channels: ChannelConfig::default(),
            timers: TimerConfig::default(),
            bus: BusConfig::default(),
            isolation: IsolationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command: "procman3/commands".to_string(),
            host_info: "procman3/host_info".to_string(),
            host_procs: "procman3/host_procs".to_string(),
            proc_outputs: "procman3/proc_outputs".to_string(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            monitor_interval: 0.5,
            output_interval: 0.5,
            host_status_interval: 1.0,
            procs_status_interval: 1.0,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            group: "239.255.76.67".to_string(),
            port: 7667,
            ttl: 0,
            loopback: true,
        }
    }
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            reserved_cpus: "0".to_string(),
            realtime_priority: 40,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 64 * 1024,
            max_message_bytes: 60_000,
        }
    }
}

impl DeputyConfig {
    /// 从 TOML 文件加载并校验
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeputyError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: DeputyConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        checked_duration("stop_timeout", self.stop_timeout)?;
        checked_duration("timers.monitor_interval", self.timers.monitor_interval)?;
        checked_duration("timers.output_interval", self.timers.output_interval)?;
        checked_duration("timers.host_status_interval", self.timers.host_status_interval)?;
        checked_duration("timers.procs_status_interval", self.timers.procs_status_interval)?;

        if !(1024..=MAX_DATAGRAM).contains(&self.output.max_message_bytes) {
            return Err(DeputyError::Config(format!(
                "output.max_message_bytes must be within 1024..={}, got {}",
                MAX_DATAGRAM, self.output.max_message_bytes
            )));
        }
        if self.poll_timeout_ms == 0 {
            return Err(DeputyError::Config("poll_timeout_ms must be > 0".into()));
        }
        if !(1..=99).contains(&self.isolation.realtime_priority) {
            return Err(DeputyError::Config(format!(
                "isolation.realtime_priority must be within 1..=99, got {}",
                self.isolation.realtime_priority
            )));
        }
        self.multicast_group()?;
        crate::services::isolation::parse_cpu_list(&self.isolation.reserved_cpus)?;

        let channels = [
            &self.channels.command,
            &self.channels.host_info,
            &self.channels.host_procs,
            &self.channels.proc_outputs,
        ];
        if channels.iter().any(|c| c.is_empty() || c.contains('\0')) {
            return Err(DeputyError::Config(
                "channel names must be non-empty and contain no NUL".into(),
            ));
        }
        Ok(())
    }

    pub fn multicast_group(&self) -> Result<Ipv4Addr> {
        let addr: Ipv4Addr = self.bus.group.parse().map_err(|_| {
            DeputyError::Config(format!("invalid multicast address: {}", self.bus.group))
        })?;
        if !addr.is_multicast() {
            return Err(DeputyError::Config(format!(
                "address {} is not a multicast address",
                self.bus.group
            )));
        }
        Ok(addr)
    }

    pub fn stop_timeout(&self) -> Duration {
        seconds(self.stop_timeout)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl TimerConfig {
    pub fn monitor(&self) -> Duration {
        seconds(self.monitor_interval)
    }

    pub fn output(&self) -> Duration {
        seconds(self.output_interval)
    }

    pub fn host_status(&self) -> Duration {
        seconds(self.host_status_interval)
    }

    pub fn procs_status(&self) -> Duration {
        seconds(self.procs_status_interval)
    }
}

/// 秒数转换为 Duration，必须落在 [1ms, 24h] 内
fn checked_duration(key: &str, value: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(d) if (MIN_DURATION..=MAX_DURATION).contains(&d) => Ok(d),
        _ => Err(DeputyError::Config(format!(
            "{} must be between {:?} and {:?}, got {}",
            key, MIN_DURATION, MAX_DURATION, value
        ))),
    }
}

/// 取值越界时收敛到范围边界，不会 panic
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value)
        .map(|d| d.clamp(MIN_DURATION, MAX_DURATION))
        .unwrap_or(MIN_DURATION)
}
