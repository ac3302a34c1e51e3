//! 子进程输出的非阻塞采集。
//!
//! 每个输出流由一个读取任务写入有界的共享缓冲，超出上限时丢弃最旧的字节。
//! 监控周期里只做一次交换取走数据，从不等待。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// 读取任务与事件循环之间共享的单个输出流
#[derive(Debug, Default)]
struct StreamBuffer {
    data: VecDeque<u8>,
    /// 自上次取走以来丢弃的字节数
    dropped: usize,
    closed: bool,
}

type SharedStream = Arc<Mutex<StreamBuffer>>;

fn lock(stream: &SharedStream) -> MutexGuard<'_, StreamBuffer> {
    stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 一个子进程 stdout/stderr 的接收端
#[derive(Debug)]
pub struct OutputPipe {
    name: String,
    stdout: Option<SharedStream>,
    stderr: Option<SharedStream>,
}

impl OutputPipe {
    /// 为两个流各启动一个读取任务，每个流最多缓存 `limit` 字节
    pub fn attach<O, E>(name: &str, limit: usize, stdout: Option<O>, stderr: Option<E>) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let limit = limit.max(1);
        Self {
            name: name.to_string(),
            stdout: stdout.map(|s| forward(format!("{}:stdout", name), s, limit)),
            stderr: stderr.map(|s| forward(format!("{}:stderr", name), s, limit)),
        }
    }

    /// 取走当前已到达的全部数据，不会阻塞
    pub fn drain(&mut self, buffers: &mut OutputBuffers) {
        let dropped = drain_into(&mut self.stdout, &mut buffers.stdout, buffers.limit)
            + drain_into(&mut self.stderr, &mut buffers.stderr, buffers.limit);
        if dropped > 0 {
            log::warn!(
                "Output capture: buffer full for {}, dropped {} oldest bytes",
                self.name,
                dropped
            );
        }
    }

    /// 两个流都已结束且数据已取完
    pub fn is_closed(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }
}

fn forward<R>(label: String, mut reader: R, limit: usize) -> SharedStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let shared = SharedStream::default();
    let stream = shared.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let mut guard = lock(&stream);
                    guard.data.extend(&buf[..n]);
                    if guard.data.len() > limit {
                        let overflow = guard.data.len() - limit;
                        guard.data.drain(..overflow);
                        guard.dropped += overflow;
                    }
                }
                Err(e) => {
                    log::warn!("Output capture: read error on {}: {}", label, e);
                    break;
                }
            }
        }
        lock(&stream).closed = true;
        log::debug!("Output capture: {} closed", label);
    });
    shared
}

/// 把共享缓冲整体搬进 `out`，返回丢弃的字节数
fn drain_into(stream: &mut Option<SharedStream>, out: &mut Vec<u8>, limit: usize) -> usize {
    let Some(shared) = stream.as_ref() else {
        return 0;
    };
    let (data, dropped, closed) = {
        let mut guard = lock(shared);
        (
            std::mem::take(&mut guard.data),
            std::mem::take(&mut guard.dropped),
            guard.closed,
        )
    };

    let (front, back) = data.as_slices();
    out.extend_from_slice(front);
    out.extend_from_slice(back);

    if closed {
        *stream = None;
    }
    dropped + trim_front(out, limit)
}

/// 只保留最新的 `limit` 字节
fn trim_front(out: &mut Vec<u8>, limit: usize) -> usize {
    if out.len() <= limit {
        return 0;
    }
    let overflow = out.len() - limit;
    out.drain(..overflow);
    overflow
}

/// 记录上累积的输出，只在输出发布时清空
#[derive(Debug, Clone)]
pub struct OutputBuffers {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    limit: usize,
}

impl OutputBuffers {
    pub fn new(limit: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }

    /// 取出 stdout + stderr（无效 UTF-8 被替换）并清空缓冲
    pub fn take(&mut self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        self.stdout.clear();
        self.stderr.clear();
        text
    }
}
