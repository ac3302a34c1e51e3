use clap::Parser;
use std::path::PathBuf;

/// Procman Deputy - 单机进程托管守护进程
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// 配置文件 (TOML)，不指定时使用默认配置
    #[arg(short, long, env = "DEPUTY_CONFIG")]
    pub config: Option<PathBuf>,

    /// 覆盖本机标识
    #[arg(long, env = "DEPUTY_HOSTNAME")]
    pub hostname: Option<String>,

    /// HTTP 监听端口
    #[arg(short, long, env = "PORT", default_value_t = 9999)]
    pub port: u16,

    /// HTTP 监听地址
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// 不启动 HTTP exporter
    #[arg(long)]
    pub no_http: bool,
}
