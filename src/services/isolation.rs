//! CPU 独占与实时调度。
//!
//! 实时调度是尽力而为的：权限不足时只记录警告，进程照常运行。

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use regex::Regex;
use std::collections::BTreeSet;

use crate::error::{DeputyError, Result};
use crate::services::stats_collector::host_cpu_count;

/// 一个已分配的 CPU。不可复制，只能通过 [`IsolationManager::release`] 归还。
#[derive(Debug, PartialEq, Eq)]
pub struct CpuLease {
    cpu: usize,
}

impl CpuLease {
    pub fn cpu(&self) -> usize {
        self.cpu
    }
}

/// 资源隔离管理器：拥有可用 CPU 池
#[derive(Debug)]
pub struct IsolationManager {
    available: BTreeSet<usize>,
    allocated: BTreeSet<usize>,
    realtime_priority: i32,
}

impl IsolationManager {
    /// `cpu_count` 个 CPU 中去掉 `reserved` 后剩余的作为可分配池
    pub fn new(cpu_count: usize, reserved: &BTreeSet<usize>, realtime_priority: i32) -> Self {
        let available = (0..cpu_count).filter(|c| !reserved.contains(c)).collect();
        Self {
            available,
            allocated: BTreeSet::new(),
            realtime_priority,
        }
    }

    /// 按主机 CPU 数构建，与发布的主机信息一致
    pub fn from_host(reserved_cpus: &str, realtime_priority: i32) -> Result<Self> {
        let reserved = parse_cpu_list(reserved_cpus)?;
        Ok(Self::new(host_cpu_count(), &reserved, realtime_priority))
    }

    /// 分配编号最小的空闲 CPU；没有空闲时返回 None
    pub fn allocate(&mut self) -> Option<CpuLease> {
        let cpu = *self.available.iter().next()?;
        self.available.remove(&cpu);
        self.allocated.insert(cpu);
        Some(CpuLease { cpu })
    }

    pub fn release(&mut self, lease: CpuLease) {
        if self.allocated.remove(&lease.cpu) {
            self.available.insert(lease.cpu);
            log::debug!("Released CPU {}", lease.cpu);
        }
    }

    pub fn free_cpus(&self) -> usize {
        self.available.len()
    }

    /// 将进程绑定到租用的 CPU
    pub fn apply_affinity(&self, pid: u32, lease: &CpuLease) -> Result<()> {
        let mut set = CpuSet::new();
        set.set(lease.cpu)
            .map_err(|e| DeputyError::Isolation(format!("invalid CPU {}: {}", lease.cpu, e)))?;
        sched_setaffinity(Pid::from_raw(pid as i32), &set).map_err(|e| {
            DeputyError::Isolation(format!(
                "failed to pin PID {} to CPU {}: {}",
                pid, lease.cpu, e
            ))
        })
    }

    /// 为进程设置 SCHED_FIFO
    pub fn apply_realtime(&self, pid: u32) -> Result<()> {
        set_fifo_priority(pid, self.realtime_priority)
    }
}

#[cfg(target_os = "linux")]
fn set_fifo_priority(pid: u32, priority: i32) -> Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };

    let result = unsafe { libc::sched_setscheduler(pid as libc::pid_t, libc::SCHED_FIFO, &param) };

    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return Err(DeputyError::Isolation(format!(
                "failed to set real-time priority for PID {}: permission denied",
                pid
            )));
        }
        return Err(DeputyError::Isolation(format!(
            "failed to set real-time priority for PID {}: {}",
            pid, err
        )));
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_fifo_priority(pid: u32, _priority: i32) -> Result<()> {
    Err(DeputyError::Isolation(format!(
        "real-time scheduling is not supported on this platform (PID {})",
        pid
    )))
}

/// 解析 "0-2,5,7-8" 形式的 CPU 列表，空串表示不保留
pub fn parse_cpu_list(list: &str) -> Result<BTreeSet<usize>> {
    let item = Regex::new(r"^(\d+)(?:-(\d+))?$")
        .map_err(|e| DeputyError::Config(format!("cpu list pattern: {}", e)))?;

    let mut cpus = BTreeSet::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let caps = item
            .captures(part)
            .ok_or_else(|| DeputyError::Config(format!("invalid CPU list entry '{}'", part)))?;

        let parse = |s: &str| {
            s.parse::<usize>()
                .map_err(|_| DeputyError::Config(format!("invalid CPU index '{}'", s)))
        };
        let start = parse(&caps[1])?;
        let end = match caps.get(2) {
            Some(m) => parse(m.as_str())?,
            None => start,
        };
        if end < start {
            return Err(DeputyError::Config(format!(
                "invalid CPU range '{}'",
                part
            )));
        }
        cpus.extend(start..=end);
    }
    Ok(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        let cpus = parse_cpu_list("0-2, 5,7-8").unwrap();
        assert_eq!(cpus.into_iter().collect::<Vec<_>>(), vec![0, 1, 2, 5, 7, 8]);
        assert!(parse_cpu_list("").unwrap().is_empty());
        assert!(parse_cpu_list("3-1").is_err());
        assert!(parse_cpu_list("a,b").is_err());
    }

    #[test]
    fn test_allocate_skips_reserved_and_releases() {
        let reserved = parse_cpu_list("0").unwrap();
        let mut mgr = IsolationManager::new(3, &reserved, 40);
        assert_eq!(mgr.free_cpus(), 2);

        let a = mgr.allocate().unwrap();
        let b = mgr.allocate().unwrap();
        assert_eq!((a.cpu(), b.cpu()), (1, 2));
        assert!(mgr.allocate().is_none());

        mgr.release(a);
        assert_eq!(mgr.free_cpus(), 1);
        assert_eq!(mgr.allocate().unwrap().cpu(), 1);
    }

    #[test]
    fn test_pool_is_sized_from_host_cpus() {
        let mgr = IsolationManager::from_host("0", 40).unwrap();
        assert_eq!(mgr.free_cpus(), host_cpu_count() - 1);
    }

    #[test]
    fn test_realtime_on_missing_pid_is_an_error() {
        let mgr = IsolationManager::new(1, &BTreeSet::new(), 40);
        // pid_max 之外的 PID
        assert!(mgr.apply_realtime(u32::MAX >> 1).is_err());
    }
}
