// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! UDP plumbing between the sensor and a [`FrameAssembler`].
//!
//! [`listen`] runs on its own thread and runtime, forwarding datagrams over a
//! bounded kanal channel to [`process`], which owns the assembler.  Both
//! loops poll their [`StopSignal`] at least every [`RECV_TIMEOUT`].

use crate::{
    assembler::{AssemblerStats, FrameAssembler},
    common::set_socket_bufsize,
    eth::IsysError,
};
use kanal::{AsyncReceiver, AsyncSender};
use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::UdpSocket, time::timeout};
use tracing::{debug, error, info, instrument, trace, warn};

/// UDP port the sensor transmits to.
pub const ISYS_PORT: u16 = 2050;
/// Receive buffer size, larger than any ISYS datagram.
pub const MAX_DATAGRAM: usize = 2048;
/// Upper bound on the time a loop takes to notice a stop request.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

const SOCKET_BUFSIZE: usize = 2 * 1024 * 1024;

/// Cooperative cancellation shared by the receive and processing loops.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a signal in the running state.
    pub fn new() -> StopSignal {
        StopSignal::default()
    }

    /// Requests both loops to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once [`StopSignal::stop`] has been called on any clone.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Binds the non-blocking receive socket with an enlarged kernel buffer.  The
/// socket is registered with a runtime by [`listen`].
pub fn bind(addr: SocketAddr) -> Result<std::net::UdpSocket, IsysError> {
    let sock = std::net::UdpSocket::bind(addr)?;
    let sock = set_socket_bufsize(sock, SOCKET_BUFSIZE);
    sock.set_nonblocking(true)?;
    Ok(sock)
}

/// Forwards every datagram received on `sock` to `tx` until `stop` is raised
/// or the channel is closed.  When `source` is set datagrams from any other
/// sender address are dropped.
#[instrument(skip_all)]
pub async fn listen(
    sock: std::net::UdpSocket,
    source: Option<IpAddr>,
    tx: AsyncSender<Vec<u8>>,
    stop: StopSignal,
) -> Result<(), IsysError> {
    let sock = UdpSocket::from_std(sock)?;
    let mut buf = vec![0u8; MAX_DATAGRAM];
    info!("listening on {}", sock.local_addr()?);

    while !stop.is_stopped() {
        let (n, addr) = match timeout(RECV_TIMEOUT, sock.recv_from(&mut buf)).await {
            Ok(Ok(msg)) => msg,
            Ok(Err(e)) => {
                error!("isys read error: {:?}", e);
                continue;
            }
            Err(_) => continue,
        };

        if let Some(source) = source {
            if addr.ip() != source {
                trace!(%addr, "dropping datagram from unexpected sender");
                continue;
            }
        }

        if tx.send(buf[..n].to_vec()).await.is_err() {
            debug!("datagram channel closed");
            break;
        }
    }

    Ok(())
}

/// Feeds datagrams from `rx` into `assembler` until `stop` is raised or every
/// sender is gone.  Decode errors are logged and never end the loop.  A
/// partially received frame is discarded on exit.
#[instrument(skip_all)]
pub async fn process(
    rx: AsyncReceiver<Vec<u8>>,
    assembler: &mut FrameAssembler,
    stop: &StopSignal,
) -> AssemblerStats {
    while !stop.is_stopped() {
        let datagram = match timeout(RECV_TIMEOUT, rx.recv()).await {
            Ok(Ok(datagram)) => datagram,
            Ok(Err(_)) => break,
            Err(_) => continue,
        };

        if let Err(err) = assembler.push(&datagram) {
            warn!("dropping frame: {}", err);
        }
    }

    assembler.reset();
    let stats = assembler.stats();
    debug!(?stats, "processing stopped");
    stats
}

/// Transmits a header and its payload datagrams to `addr`, pausing `gap`
/// between datagrams.
pub async fn send_frame<P: AsRef<[u8]>>(
    sock: &UdpSocket,
    addr: SocketAddr,
    header: &[u8],
    payloads: &[P],
    gap: Duration,
) -> Result<(), IsysError> {
    sock.send_to(header, addr).await?;
    for payload in payloads {
        if !gap.is_zero() {
            tokio::time::sleep(gap).await;
        }
        sock.send_to(payload.as_ref(), addr).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{eth::TargetRecord, store::FrameStore, synth::FrameBuilder};

    #[test]
    fn test_stop_signal() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!other.is_stopped());
        stop.stop();
        assert!(other.is_stopped());
    }

    #[tokio::test]
    async fn test_loopback() {
        let rx_sock = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let rx_addr = rx_sock.local_addr().unwrap();
        let tx_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let stop = StopSignal::new();
        let (tx, rx) = kanal::bounded_async(16);
        let listener = tokio::spawn(listen(
            rx_sock,
            Some("127.0.0.1".parse().unwrap()),
            tx,
            stop.clone(),
        ));

        let store = FrameStore::default();
        let mut assembler = FrameAssembler::new().with_store(store.clone());
        let frames = assembler.subscribe();
        let processor = {
            let stop = stop.clone();
            tokio::spawn(async move { process(rx, &mut assembler, &stop).await })
        };

        let targets = vec![
            TargetRecord::new(12.5, 30.0, -3.2, 90.0),
            TargetRecord::new(40.0, 110.0, 7.5, 270.0),
        ];
        let (header, payloads) = FrameBuilder::new(9).targets(targets.clone()).build().unwrap();
        send_frame(&tx_sock, rx_addr, &header, &payloads, Duration::from_millis(5))
            .await
            .unwrap();

        let frame = timeout(Duration::from_secs(5), frames.to_async().recv())
            .await
            .unwrap()
            .unwrap();
        assert!(frame.checksum_valid);
        assert_eq!(frame.targets, targets);
        assert_eq!(store.get(9), vec![targets]);

        stop.stop();
        listener.await.unwrap().unwrap();
        let stats = processor.await.unwrap();
        assert_eq!(stats.frames, 1);
    }

    #[tokio::test]
    async fn test_source_filter() {
        let rx_sock = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let rx_addr = rx_sock.local_addr().unwrap();
        let tx_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let stop = StopSignal::new();
        let (tx, rx) = kanal::bounded_async(16);
        let listener = tokio::spawn(listen(
            rx_sock,
            Some("192.0.2.1".parse().unwrap()),
            tx,
            stop.clone(),
        ));

        tx_sock.send_to(&[1, 2, 3], rx_addr).await.unwrap();
        assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());

        stop.stop();
        listener.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_discards_partial_frame() {
        let rx_sock = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let rx_addr = rx_sock.local_addr().unwrap();
        let tx_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let stop = StopSignal::new();
        let (tx, rx) = kanal::bounded_async(16);
        let listener = tokio::spawn(listen(rx_sock, None, tx, stop.clone()));

        let store = FrameStore::default();
        let mut assembler = FrameAssembler::new().with_store(store.clone());
        let processor = {
            let stop = stop.clone();
            tokio::spawn(async move { process(rx, &mut assembler, &stop).await })
        };

        let targets = (0..50)
            .map(|n| TargetRecord::new(20.0, n as f32, 1.0, 45.0))
            .collect::<Vec<_>>();
        let (header, payloads) = FrameBuilder::new(4).targets(targets).build().unwrap();
        assert_eq!(payloads.len(), 2);

        // Second payload never arrives.
        send_frame(&tx_sock, rx_addr, &header, &payloads[..1], Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        stop.stop();
        listener.await.unwrap().unwrap();
        let stats = processor.await.unwrap();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.discarded, 1);
        assert!(store.is_empty());
    }
}
