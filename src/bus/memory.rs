use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{Bus, BusFrame};
use crate::error::Result;

/// 测试用的内存总线：入站帧预先排队，出站帧被记录下来
#[derive(Default)]
pub struct MemoryBus {
    inbound: VecDeque<BusFrame>,
    published: RefCell<Vec<BusFrame>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_inbound(&mut self, channel: &str, payload: &[u8]) {
        self.inbound.push_back(BusFrame {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        });
    }

    pub fn take_published(&self) -> Vec<BusFrame> {
        std::mem::take(&mut *self.published.borrow_mut())
    }

    pub fn published_on(&self, channel: &str) -> Vec<BusFrame> {
        self.published
            .borrow()
            .iter()
            .filter(|f| f.channel == channel)
            .cloned()
            .collect()
    }
}

impl Bus for MemoryBus {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        self.published.borrow_mut().push(BusFrame {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn recv(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BusFrame>>> + '_>> {
        Box::pin(async move {
            match self.inbound.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => {
                    tokio::time::sleep(timeout).await;
                    Ok(None)
                }
            }
        })
    }
}
