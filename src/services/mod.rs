pub mod command_ingress;
pub mod isolation;
pub mod output_capture;
pub mod process_table;
pub mod stats_collector;
pub mod status_publisher;
pub mod supervisor;
pub mod timer;

pub use command_ingress::CommandIngress;
pub use isolation::IsolationManager;
pub use status_publisher::StatusPublisher;
pub use supervisor::Supervisor;
pub use timer::Timer;
