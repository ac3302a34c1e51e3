use thiserror::Error;

/// deputy 内部错误类型
#[derive(Error, Debug)]
pub enum DeputyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("isolation error: {0}")]
    Isolation(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, DeputyError>;
