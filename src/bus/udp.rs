use nix::sys::socket::{
    bind, setsockopt, socket, sockopt, AddressFamily, SockFlag, SockType, SockaddrIn,
};
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::AsRawFd;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::UdpSocket;

use super::{decode_frame, encode_frame, Bus, BusFrame, MAX_DATAGRAM};
use crate::config::BusConfig;
use crate::error::{DeputyError, Result};

/// UDP 组播总线，只接收一个订阅通道
pub struct UdpMulticastBus {
    socket: UdpSocket,
    target: SocketAddrV4,
    subscription: String,
    buf: Vec<u8>,
}

impl UdpMulticastBus {
    pub fn new(config: &BusConfig, group: Ipv4Addr, subscription: &str) -> Result<Self> {
        let fd = socket(
            AddressFamily::Inet,
            SockType::Datagram,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(|e| DeputyError::Bus(format!("cannot create socket: {}", e)))?;

        // 同一主机上的多个订阅者共享端口
        setsockopt(&fd, sockopt::ReuseAddr, &true)
            .map_err(|e| DeputyError::Bus(format!("cannot set SO_REUSEADDR: {}", e)))?;

        let bind_addr = SockaddrIn::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
        bind(fd.as_raw_fd(), &bind_addr)
            .map_err(|e| DeputyError::Bus(format!("cannot bind port {}: {}", config.port, e)))?;

        let std_socket = std::net::UdpSocket::from(fd);
        std_socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        std_socket.set_multicast_ttl_v4(config.ttl)?;
        std_socket.set_multicast_loop_v4(config.loopback)?;
        std_socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(std_socket)?;
        log::info!(
            "Bus: joined {}:{} (ttl={}, loopback={}), subscribed to '{}'",
            group,
            config.port,
            config.ttl,
            config.loopback,
            subscription
        );

        Ok(Self {
            socket,
            target: SocketAddrV4::new(group, config.port),
            subscription: subscription.to_string(),
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    async fn recv_inner(&mut self, timeout: Duration) -> Result<Option<BusFrame>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = tokio::time::timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await;
            let (len, from) = match received {
                Err(_) => return Ok(None),
                Ok(res) => res?,
            };

            match decode_frame(&self.buf[..len]) {
                Some(frame) if frame.channel == self.subscription => return Ok(Some(frame)),
                Some(_) => {}
                None => log::debug!("Bus: dropped malformed datagram from {}", from),
            }
        }
    }
}

impl Bus for UdpMulticastBus {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        let datagram = encode_frame(channel, payload);
        if datagram.len() > MAX_DATAGRAM {
            return Err(DeputyError::Bus(format!(
                "message on {} is {} bytes, larger than a datagram",
                channel,
                datagram.len()
            )));
        }
        match self.socket.try_send_to(&datagram, self.target.into()) {
            Ok(_) => Ok(()),
            // 发送缓冲满时丢弃这一帧，下个周期会再发
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                log::debug!("Bus: send buffer full, dropped message on {}", channel);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn recv(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BusFrame>>> + '_>> {
        Box::pin(self.recv_inner(timeout))
    }
}
