pub mod message;
pub mod process;
pub mod stats;

pub use message::{
    timestamp_us, CommandKind, CommandMsg, HostInfoMsg, HostProcsMsg, ProcInfoMsg, ProcOutputMsg,
};
pub use process::{ProcessSpec, ProcessState};
pub use stats::{HostStats, ProcessStats};
