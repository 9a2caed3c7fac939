// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use isysrx::{
    assembler::{DecodedFrame, FrameAssembler},
    common::set_process_priority,
    net::{self, StopSignal},
    store::FrameStore,
};
use kanal::Receiver;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};
use tracy_client::{frame_mark, plot};

#[cfg(feature = "zenoh")]
use tracing::instrument;
#[cfg(feature = "zenoh")]
use zenoh::{
    bytes::Encoding,
    config::Config,
    qos::{CongestionControl, Priority},
    Session,
};

#[cfg(feature = "profiling")]
#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    args.tracy.then(tracy_client::Client::start);

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(args.rust_log)),
        Err(_) => None,
    };

    let tracy = match args.tracy {
        true => Some(tracing_tracy::TracyLayer::default().with_filter(args.rust_log)),
        false => None,
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    let store = FrameStore::new(args.history.into());
    if let Some(path) = &args.import {
        store.load(path)?;
        info!("imported {} frame ids from {}", store.len(), path.display());
    }

    let mut assembler = FrameAssembler::new().with_store(store.clone());
    let printer = spawn_printer(assembler.subscribe(), args.quiet, args.tracy)?;

    #[cfg(feature = "zenoh")]
    {
        let config = Config::try_from(&args).map_err(|e| e.to_string())?;
        let session = zenoh::open(config).await.map_err(|e| e.to_string())?;
        let frames = assembler.subscribe().to_async();
        tokio::spawn(publish_frames(session, args.frames_topic.clone(), frames));
    }

    #[cfg(feature = "pcap")]
    let replayed = match &args.pcap {
        Some(path) => {
            let stats = isysrx::pcap::replay(path, Some(args.bind.port()), &mut assembler)?;
            info!(?stats, "replayed {}", path.display());
            true
        }
        None => false,
    };
    #[cfg(not(feature = "pcap"))]
    let replayed = false;

    if !replayed {
        receive(&args, &mut assembler).await?;
    }

    // Closes the subscriber channels so the printer drains and exits.
    drop(assembler);
    if printer.join().is_err() {
        error!("printer thread panicked");
    }

    if let Some(path) = &args.export {
        store.save(path)?;
        info!("exported {} frame ids to {}", store.len(), path.display());
    }

    Ok(())
}

/// Runs the live receiver until Ctrl-C or the receiver thread ends.
async fn receive(
    args: &Args,
    assembler: &mut FrameAssembler,
) -> Result<(), Box<dyn std::error::Error>> {
    let stop = StopSignal::new();
    let sock = net::bind(args.bind)?;
    let (tx, rx) = kanal::bounded_async(128);

    let receiver = {
        let stop = stop.clone();
        let source = args.source;
        thread::Builder::new()
            .name("isys".to_string())
            .spawn(move || {
                set_process_priority();
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("isys receiver runtime error: {:?}", e);
                        return;
                    }
                };

                if let Err(e) = runtime.block_on(net::listen(sock, source, tx, stop)) {
                    error!("isys receiver error: {}", e);
                }
            })?
    };

    {
        let stop = stop.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("stopping receiver"),
                Err(e) => warn!("unable to listen for ctrl-c: {:?}", e),
            }
            stop.stop();
        });
    }

    let stats = net::process(rx, assembler, &stop).await;
    stop.stop();
    if receiver.join().is_err() {
        error!("isys receiver thread panicked");
    }

    info!(
        frames = stats.frames,
        checksum_failures = stats.checksum_failures,
        incomplete_headers = stats.incomplete_headers,
        invalid_headers = stats.invalid_headers,
        incomplete_payloads = stats.incomplete_payloads,
        "receiver stopped"
    );

    Ok(())
}

fn spawn_printer(
    frames: Receiver<DecodedFrame>,
    quiet: bool,
    tracy: bool,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("printer".to_string())
        .spawn(move || {
            while let Ok(frame) = frames.recv() {
                tracy.then(|| plot!("targets", frame.targets.len() as f64));

                if !frame.checksum_valid {
                    warn!(
                        frame_id = frame.frame_id(),
                        "checksum mismatch: calculated 0x{:08X} expected 0x{:08X}",
                        frame.computed_checksum,
                        frame.header.checksum
                    );
                }

                if !quiet {
                    println!("{}", frame);
                }

                tracy.then(frame_mark);
            }
        })
}

#[cfg(feature = "zenoh")]
#[instrument(skip_all, fields(topic = %topic))]
async fn publish_frames(session: Session, topic: String, frames: kanal::AsyncReceiver<DecodedFrame>) {
    let publisher = match session
        .declare_publisher(&topic)
        .priority(Priority::DataHigh)
        .congestion_control(CongestionControl::Drop)
        .await
    {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to create publisher {}: {:?}", topic, e);
            return;
        }
    };

    while let Ok(frame) = frames.recv().await {
        let msg = match serde_json::to_vec(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                error!("frame serialization error: {:?}", e);
                continue;
            }
        };

        if let Err(e) = publisher.put(msg).encoding(Encoding::APPLICATION_JSON).await {
            error!("publish frame error: {:?}", e);
        }
    }
}
