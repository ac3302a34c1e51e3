//! 总线消息结构。编码为 JSON，时间戳单位为微秒。

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::process::{ProcessSpec, ProcessState};

/// 命令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    CreateProcess,
    StartProcess,
    StopProcess,
    DeleteProcess,
}

/// 命令通道消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMsg {
    /// 目标主机
    pub hostname: String,
    pub command: CommandKind,
    pub name: String,
    #[serde(default)]
    pub proc_command: String,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default)]
    pub realtime: bool,
    #[serde(default)]
    pub isolated: bool,
    #[serde(default)]
    pub group: String,
}

impl CommandMsg {
    pub fn to_spec(&self) -> ProcessSpec {
        ProcessSpec {
            name: self.name.clone(),
            command: self.proc_command.clone(),
            group: self.group.clone(),
            auto_restart: self.auto_restart,
            realtime: self.realtime,
            isolated: self.isolated,
        }
    }
}

/// 主机信息通道消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfoMsg {
    pub timestamp: i64,
    pub hostname: String,
    pub ip: String,
    pub cpus: u32,
    pub cpu_usage: f32,
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_used: u64,
    pub mem_usage: f32,
    pub net_sent_kbps: f64,
    pub net_recv_kbps: f64,
    pub uptime: u64,
}

/// 进程表中单个进程的状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcInfoMsg {
    pub name: String,
    pub group: String,
    pub cmd: String,
    pub state: ProcessState,
    pub status: String,
    pub cpu: f32,
    pub mem_rss_kb: u64,
    pub mem_vms_kb: u64,
    pub priority: i32,
    pub pid: i32,
    pub ppid: i32,
    pub auto_restart: bool,
    pub realtime: bool,
    pub isolated: bool,
    pub cpu_affinity: i32,
    pub exit_code: i32,
    pub errors: String,
    pub runtime: u64,
    pub restarts: u32,
}

/// 进程表通道消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostProcsMsg {
    pub timestamp: i64,
    pub hostname: String,
    pub procs: Vec<ProcInfoMsg>,
}

/// 进程输出通道消息，stdout 在前 stderr 在后
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcOutputMsg {
    pub timestamp: i64,
    pub hostname: String,
    pub name: String,
    pub group: String,
    pub stdout: String,
}

/// 当前 Unix 时间（微秒）
pub fn timestamp_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_kind_wire_names() {
        let msg: CommandMsg = serde_json::from_str(
            r#"{"hostname":"agv1","command":"create_process","name":"ukf",
                "proc_command":"/bin/ukf_node","auto_restart":true,"group":"Perception"}"#,
        )
        .unwrap();

        assert_eq!(msg.command, CommandKind::CreateProcess);
        assert!(msg.auto_restart);
        assert!(!msg.realtime);
        assert!(!msg.isolated);

        let spec = msg.to_spec();
        assert_eq!(spec.command, "/bin/ukf_node");
        assert_eq!(spec.group, "Perception");
    }

    #[test]
    fn test_unknown_command_kind_is_rejected() {
        let res: Result<CommandMsg, _> = serde_json::from_str(
            r#"{"hostname":"agv1","command":"reboot_host","name":"x"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProcessState::Killed).unwrap(),
            "\"killed\""
        );
    }
}
