use crate::models::{HostInfoMsg, HostProcsMsg};
use std::sync::{Arc, Mutex};

/// HTTP 端读取的最近一次快照。进程表本身只属于事件循环。
#[derive(Debug, Default)]
pub struct AppStateInner {
    pub hostname: String,
    pub last_host: Option<HostInfoMsg>,
    pub last_procs: Option<HostProcsMsg>,
}

pub type AppState = Arc<Mutex<AppStateInner>>;

pub fn new_state(hostname: &str) -> AppState {
    Arc::new(Mutex::new(AppStateInner {
        hostname: hostname.to_string(),
        ..AppStateInner::default()
    }))
}
