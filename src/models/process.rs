use serde::{Deserialize, Serialize};
use std::fmt;

/// 进程配置信息（由 create_process 命令给出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// 进程名称（唯一标识符）
    pub name: String,
    /// 启动命令行
    pub command: String,
    /// 仅用于展示的分组标签
    #[serde(default)]
    pub group: String,
    /// 异常退出后自动重启
    #[serde(default)]
    pub auto_restart: bool,
    /// 启动后尝试设置 SCHED_FIFO
    #[serde(default)]
    pub realtime: bool,
    /// 独占一个 CPU
    #[serde(default)]
    pub isolated: bool,
}

/// 进程生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Running,
    Failed,
    Killed,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Running => "running",
            ProcessState::Failed => "failed",
            ProcessState::Killed => "killed",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
