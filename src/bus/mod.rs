//! 发布/订阅总线。
//!
//! 数据报格式：通道名 + `\0` + JSON 负载。

pub mod udp;

#[cfg(test)]
pub mod memory;

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{DeputyError, Result};

pub use udp::UdpMulticastBus;

/// 最大 UDP 数据报
pub const MAX_DATAGRAM: usize = 65_507;

/// 收到的一帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusFrame {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl BusFrame {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| DeputyError::Bus(format!("bad payload on {}: {}", self.channel, e)))
    }
}

/// 总线抽象。生产环境使用 [`UdpMulticastBus`]，测试使用内存实现。
pub trait Bus {
    /// 发送一帧
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<()>;

    /// 最多等待 `timeout`，返回订阅通道上的下一帧
    fn recv(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BusFrame>>> + '_>>;
}

/// 序列化后发布
pub fn publish_json<B: Bus + ?Sized, T: Serialize>(bus: &B, channel: &str, msg: &T) -> Result<()> {
    let payload = serde_json::to_vec(msg)
        .map_err(|e| DeputyError::Bus(format!("cannot encode message for {}: {}", channel, e)))?;
    bus.publish(channel, &payload)
}

/// 编码后整帧的字节数
pub fn frame_len(channel: &str, payload: &[u8]) -> usize {
    channel.len() + 1 + payload.len()
}

pub fn encode_frame(channel: &str, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(channel.len() + 1 + payload.len());
    datagram.extend_from_slice(channel.as_bytes());
    datagram.push(0);
    datagram.extend_from_slice(payload);
    datagram
}

pub fn decode_frame(datagram: &[u8]) -> Option<BusFrame> {
    let split = datagram.iter().position(|b| *b == 0)?;
    let channel = std::str::from_utf8(&datagram[..split]).ok()?;
    if channel.is_empty() {
        return None;
    }
    Some(BusFrame {
        channel: channel.to_string(),
        payload: datagram[split + 1..].to_vec(),
    })
}
