// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use isysrx::{eth::TargetRecord, net::send_frame, synth::FrameBuilder};
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{net::SocketAddr, time::Duration};
use tokio::net::UdpSocket;

/// Synthetic ISYS radar sending random target lists.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Receiver address
    #[arg(short, long, env, default_value = "127.0.0.1:2050")]
    target: SocketAddr,

    /// Local address to send from
    #[arg(short, long, env, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Delay between frames in milliseconds
    #[arg(short, long, env, default_value_t = 1000)]
    interval: u64,

    /// Delay between the header and each payload datagram in milliseconds
    #[arg(short, long, env, default_value_t = 100)]
    gap: u64,

    /// Largest number of targets in a frame, each frame carries between one
    /// and this many
    #[arg(short, long, env, default_value_t = 42)]
    max_targets: usize,

    /// Detection count reported in every header
    #[arg(short, long, env, default_value_t = 5)]
    detections: u16,

    /// Stop after sending this many frames
    #[arg(short, long, env)]
    count: Option<u64>,

    /// Seed for reproducible target lists
    #[arg(short, long, env)]
    seed: Option<u64>,
}

fn random_target<R: Rng>(rng: &mut R) -> TargetRecord {
    TargetRecord::new(
        rng.gen_range(0.0..100.0),
        rng.gen_range(0.0..200.0),
        rng.gen_range(-20.0..20.0),
        rng.gen_range(0.0..360.0),
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let sock = UdpSocket::bind(args.bind).await?;
    info!("sending to {} from {}", args.target, sock.local_addr()?);

    let gap = Duration::from_millis(args.gap);
    let interval = Duration::from_millis(args.interval);
    let max_targets = args.max_targets.max(1);
    let mut frame_id: u16 = 1;
    let mut sent = 0;

    while args.count.map_or(true, |count| sent < count) {
        let n = rng.gen_range(1..=max_targets);
        let builder = FrameBuilder::new(frame_id)
            .detection_count(args.detections)
            .targets((0..n).map(|_| random_target(&mut rng)));
        let (header, payloads) = builder.build()?;

        send_frame(&sock, args.target, &header, &payloads, gap).await?;
        debug!("{}", builder.header()?);
        info!("frame {} sent with {} targets", frame_id, n);

        frame_id = frame_id.wrapping_add(1);
        sent += 1;
        tokio::time::sleep(interval).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_target_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let target = random_target(&mut rng);
            assert!((0.0..100.0).contains(&target.signal_strength));
            assert!((0.0..200.0).contains(&target.range));
            assert!((-20.0..20.0).contains(&target.velocity));
            assert!((0.0..360.0).contains(&target.azimuth));
        }
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["isyssim", "-c", "3", "-s", "42"]).unwrap();
        assert_eq!(args.target, "127.0.0.1:2050".parse().unwrap());
        assert_eq!(args.count, Some(3));
        assert_eq!(args.seed, Some(42));
        assert_eq!(args.max_targets, 42);
    }
}
