use crate::bus::BusFrame;
use crate::models::{CommandKind, CommandMsg};
use crate::services::supervisor::Supervisor;

/// 命令入口：按目标主机过滤后分发给 Supervisor
pub struct CommandIngress {
    hostname: String,
}

impl CommandIngress {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// 解码并处理一帧命令。无法解码或不是发给本机的命令会被丢弃。
    pub fn handle_frame(&self, frame: &BusFrame, supervisor: &mut Supervisor) {
        match frame.decode::<CommandMsg>() {
            Ok(msg) => self.dispatch(msg, supervisor),
            Err(e) => log::warn!("Command handler: discarded undecodable command: {}", e),
        }
    }

    pub fn dispatch(&self, msg: CommandMsg, supervisor: &mut Supervisor) {
        if msg.hostname != self.hostname {
            log::info!(
                "Command handler: ignored {:?} for {} addressed to {}",
                msg.command,
                msg.name,
                msg.hostname
            );
            return;
        }

        log::info!(
            "Command handler: received {:?} for process {}",
            msg.command,
            msg.name
        );

        match msg.command {
            CommandKind::CreateProcess => supervisor.create_process(msg.to_spec()),
            CommandKind::StartProcess => supervisor.start_process(&msg.name),
            CommandKind::StopProcess => supervisor.stop_process(&msg.name),
            CommandKind::DeleteProcess => supervisor.delete_process(&msg.name),
        }
    }
}
