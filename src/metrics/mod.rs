use prometheus::{
    Encoder, GaugeVec, Opts, Registry, TextEncoder,
    register_gauge_vec_with_registry,
};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::{HostInfoMsg, HostProcsMsg};

pub struct MetricsRegistry {
    registry: Registry,

    // 进程 metrics
    pub process_up: GaugeVec,
    pub process_cpu_usage: GaugeVec,
    pub process_memory_rss_bytes: GaugeVec,
    pub process_memory_vms_bytes: GaugeVec,
    pub process_exit_code: GaugeVec,
    pub process_runtime_seconds: GaugeVec,
    pub process_restarts: GaugeVec,

    // 主机 metrics
    pub host_cpu_usage: GaugeVec,
    pub host_memory_usage: GaugeVec,
    pub host_network_sent_kbps: GaugeVec,
    pub host_network_recv_kbps: GaugeVec,
    pub host_uptime_seconds: GaugeVec,

    /// 上次发布的进程 -> 分组，用于清理已删除进程的 label
    published: Mutex<HashMap<String, String>>,
}

fn gauge(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    register_gauge_vec_with_registry!(Opts::new(name, help), labels, registry)
        .expect("metric names are unique and valid")
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        // 定义通用的标签
        let proc_labels = &["name", "group", "hostname"];
        let host_labels = &["hostname"];

        Self {
            process_up: gauge(&registry, "deputy_process_up", "Process is running (1) or not (0)", proc_labels),
            process_cpu_usage: gauge(&registry, "deputy_process_cpu_usage", "Process CPU usage (1.0 = one core)", proc_labels),
            process_memory_rss_bytes: gauge(&registry, "deputy_process_memory_rss_bytes", "Process resident memory in bytes", proc_labels),
            process_memory_vms_bytes: gauge(&registry, "deputy_process_memory_vms_bytes", "Process virtual memory in bytes", proc_labels),
            process_exit_code: gauge(&registry, "deputy_process_exit_code", "Last exit code, -1 while running", proc_labels),
            process_runtime_seconds: gauge(&registry, "deputy_process_runtime_seconds", "Seconds since the process was started", proc_labels),
            process_restarts: gauge(&registry, "deputy_process_restarts", "Automatic restarts since creation", proc_labels),
            host_cpu_usage: gauge(&registry, "deputy_host_cpu_usage", "Host CPU usage (0-1)", host_labels),
            host_memory_usage: gauge(&registry, "deputy_host_memory_usage", "Host memory usage (0-1)", host_labels),
            host_network_sent_kbps: gauge(&registry, "deputy_host_network_sent_kbps", "Host network send rate in KB/s", host_labels),
            host_network_recv_kbps: gauge(&registry, "deputy_host_network_recv_kbps", "Host network receive rate in KB/s", host_labels),
            host_uptime_seconds: gauge(&registry, "deputy_host_uptime_seconds", "Host uptime in seconds", host_labels),
            published: Mutex::new(HashMap::new()),
            registry,
        }
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn observe_host(&self, msg: &HostInfoMsg) {
        let labels = &[msg.hostname.as_str()];
        self.host_cpu_usage.with_label_values(labels).set(msg.cpu_usage as f64);
        self.host_memory_usage.with_label_values(labels).set(msg.mem_usage as f64);
        self.host_network_sent_kbps.with_label_values(labels).set(msg.net_sent_kbps);
        self.host_network_recv_kbps.with_label_values(labels).set(msg.net_recv_kbps);
        self.host_uptime_seconds.with_label_values(labels).set(msg.uptime as f64);
    }

    /// 用进程表快照更新 metrics，并删除已不在表中的进程
    pub fn observe_procs(&self, msg: &HostProcsMsg) {
        let mut current = HashMap::new();

        for proc in &msg.procs {
            let labels = &[proc.name.as_str(), proc.group.as_str(), msg.hostname.as_str()];
            let running = proc.pid > 0;

            self.process_up.with_label_values(labels).set(if running { 1.0 } else { 0.0 });
            self.process_cpu_usage.with_label_values(labels).set(proc.cpu as f64);
            self.process_memory_rss_bytes
                .with_label_values(labels)
                .set((proc.mem_rss_kb * 1024) as f64);
            self.process_memory_vms_bytes
                .with_label_values(labels)
                .set((proc.mem_vms_kb * 1024) as f64);
            self.process_exit_code.with_label_values(labels).set(proc.exit_code as f64);
            self.process_runtime_seconds.with_label_values(labels).set(proc.runtime as f64);
            self.process_restarts.with_label_values(labels).set(proc.restarts as f64);

            current.insert(proc.name.clone(), proc.group.clone());
        }

        let mut published = match self.published.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (name, group) in published.iter() {
            if current.get(name) != Some(group) {
                self.reset_process_metrics(name, group, &msg.hostname);
            }
        }
        *published = current;
    }

    pub fn reset_process_metrics(&self, name: &str, group: &str, hostname: &str) {
        let labels = &[name, group, hostname];

        // 删除旧的 metric 值
        let _ = self.process_up.remove_label_values(labels);
        let _ = self.process_cpu_usage.remove_label_values(labels);
        let _ = self.process_memory_rss_bytes.remove_label_values(labels);
        let _ = self.process_memory_vms_bytes.remove_label_values(labels);
        let _ = self.process_exit_code.remove_label_values(labels);
        let _ = self.process_runtime_seconds.remove_label_values(labels);
        let _ = self.process_restarts.remove_label_values(labels);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProcInfoMsg, ProcessState};

    fn proc_info(name: &str, pid: i32) -> ProcInfoMsg {
        ProcInfoMsg {
            name: name.to_string(),
            group: "g".to_string(),
            cmd: "/bin/sleep 1".to_string(),
            state: ProcessState::Running,
            status: "Sleeping".to_string(),
            cpu: 0.5,
            mem_rss_kb: 10,
            mem_vms_kb: 20,
            priority: 0,
            pid,
            ppid: 1,
            auto_restart: false,
            realtime: false,
            isolated: false,
            cpu_affinity: -1,
            exit_code: -1,
            errors: String::new(),
            runtime: 3,
            restarts: 0,
        }
    }

    #[test]
    fn test_removed_processes_disappear_from_render() {
        let metrics = MetricsRegistry::new();
        let mut msg = HostProcsMsg {
            timestamp: 0,
            hostname: "agv1".to_string(),
            procs: vec![proc_info("alpha", 10), proc_info("beta", 11)],
        };
        metrics.observe_procs(&msg);

        let text = metrics.render().unwrap();
        assert!(text.contains("name=\"alpha\""));
        assert!(text.contains("name=\"beta\""));
        assert!(text.contains("deputy_process_memory_rss_bytes"));

        msg.procs.retain(|p| p.name == "alpha");
        metrics.observe_procs(&msg);

        let text = metrics.render().unwrap();
        assert!(text.contains("name=\"alpha\""));
        assert!(!text.contains("name=\"beta\""));
    }
}
