mod loopback;
mod rtp;

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::RngExt;
use vpx_rtp::config::parse_bandwidth;
use vpx_rtp::{
    CodecSession, ControlCommand, DecodeOutcome, InboundPacket, PayloadVariant, SessionConfig,
    payload,
};

use loopback::{SyntheticEngine, SyntheticPicture};
use rtp::RtpSender;

#[derive(Parser)]
#[command(
    name = "vpx-rtp-sim",
    about = "Loopback VP8/VP9 RTP stream over a lossy in-memory channel"
)]
struct Args {
    /// Payload format (VP8 or VP9)
    #[arg(long, short, default_value = "VP8")]
    codec: PayloadVariant,

    /// Maximum RTP payload size in bytes (descriptor included)
    #[arg(long, default_value_t = 1200)]
    mtu: usize,

    /// Number of pictures to send
    #[arg(long, short = 'n', default_value_t = 300)]
    frames: u32,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Coded size of an inter frame in bytes
    #[arg(long, default_value_t = 4000)]
    frame_size: usize,

    /// Probability of dropping each packet (0.0 - 1.0)
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// Target bandwidth, e.g. "800", "512kb", "2mb"
    #[arg(long)]
    bandwidth: Option<String>,

    /// Double the picture size starting at this frame
    #[arg(long)]
    resize_at: Option<u32>,
}

#[derive(Debug, Default)]
struct Stats {
    packets_sent: u64,
    packets_lost: u64,
    bytes_sent: u64,
    key_frames_sent: u64,
    encode_failures: u64,
    pictures: u64,
    restarts: u64,
    dropped: u64,
    key_frame_requests: u64,
}

/// Picture `n` of the run, doubled in size once `--resize-at` is reached.
fn picture_at(args: &Args, n: u32) -> SyntheticPicture {
    let scale = if args.resize_at.is_some_and(|at| n >= at) { 2 } else { 1 };
    SyntheticPicture {
        width: args.width.saturating_mul(scale),
        height: args.height.saturating_mul(scale),
        sequence: u64::from(n),
    }
}

fn run(args: &Args) -> vpx_rtp::Result<Stats> {
    let mut config =
        SessionConfig::new(args.codec, args.mtu).with_dimensions(args.width, args.height);
    if let Some(bandwidth) = &args.bandwidth {
        config = config.with_bandwidth(parse_bandwidth(bandwidth)?);
    }

    let engine = SyntheticEngine::new(args.frame_size);
    let mut tx = CodecSession::new(engine.clone(), config.clone().with_roles(true, false))?;
    let mut rx = CodecSession::new(engine, config.with_roles(false, true))?;
    let tx_control = tx.control_handle();

    let fps = args.fps.max(1);
    let frame_interval = Duration::from_secs(1) / fps;
    let mut rtp_sender = RtpSender::with_random_ssrc(rtp::PAYLOAD_TYPE);
    let mut rng = rand::rng();
    let mut stats = Stats::default();
    let start = Instant::now();

    for n in 0..args.frames {
        let now = start + frame_interval * n;
        let picture = picture_at(args, n);

        let mut packet = match tx.encode(&picture, now)? {
            Some(packet) => packet,
            None => {
                stats.encode_failures += 1;
                tx.next_packet()
            }
        };
        if payload::is_key_frame_start(args.codec, &packet.data) {
            stats.key_frames_sent += 1;
        }

        loop {
            let end_of_frame = packet.end_of_frame;
            let wire = rtp_sender.wrap(&packet.data, end_of_frame);
            stats.packets_sent += 1;
            stats.bytes_sent += wire.len() as u64;

            if rng.random::<f64>() < args.loss {
                stats.packets_lost += 1;
                tracing::trace!(frame = n, "packet lost");
            } else if let Some(view) = rtp::parse(&wire) {
                tracing::trace!(seq = view.sequence, ts = view.timestamp, "packet received");
                let inbound = InboundPacket {
                    data: view.payload,
                    timestamp: view.timestamp,
                    end_of_frame: view.marker,
                };
                match rx.decode(inbound)? {
                    DecodeOutcome::Picture(decoded) => {
                        stats.pictures += 1;
                        tracing::debug!(
                            sequence = decoded.sequence,
                            width = decoded.width,
                            height = decoded.height,
                            "picture decoded"
                        );
                    }
                    DecodeOutcome::MoreDataNeeded => {}
                    DecodeOutcome::Restart(err) => {
                        stats.restarts += 1;
                        tracing::debug!(%err, frame = n, "receiver restart");
                    }
                    DecodeOutcome::Dropped(err) => {
                        stats.dropped += 1;
                        tracing::warn!(%err, frame = n, "packet dropped");
                    }
                }
            }

            if end_of_frame {
                break;
            }
            packet = tx.next_packet();
        }

        rtp_sender.advance_timestamp(rtp::CLOCK_RATE / fps);

        if rx.needs_key_frame() {
            stats.key_frame_requests += 1;
            tx_control.send(ControlCommand::GenerateKeyFrame);
        }
    }

    tracing::info!(
        final_timestamp = rtp_sender.timestamp(),
        bitrate_kbps = tx.encoder_settings().bitrate_kbps,
        "simulation finished"
    );
    Ok(stats)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let stats = match run(&args) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("{} over {}-byte packets, {} frames", args.codec, args.mtu, args.frames);
    println!(
        "  sent     {} packets, {} bytes, {} key frames",
        stats.packets_sent, stats.bytes_sent, stats.key_frames_sent
    );
    println!("  lost     {} packets", stats.packets_lost);
    println!(
        "  decoded  {} pictures, {} restarts, {} dropped",
        stats.pictures, stats.restarts, stats.dropped
    );
    println!(
        "  requests {} key frames, {} encode failures",
        stats.key_frame_requests, stats.encode_failures
    );

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_doubles_from_the_given_frame() {
        let args = Args::parse_from([
            "vpx-rtp-sim",
            "--width",
            "320",
            "--height",
            "240",
            "--resize-at",
            "5",
        ]);
        assert_eq!((picture_at(&args, 4).width, picture_at(&args, 4).height), (320, 240));
        assert_eq!((picture_at(&args, 5).width, picture_at(&args, 5).height), (640, 480));
        assert_eq!(picture_at(&args, 5).sequence, 5);
    }

    #[test]
    fn resize_saturates_huge_dimensions() {
        let args = Args::parse_from([
            "vpx-rtp-sim",
            "--width",
            "4294967295",
            "--height",
            "3000000000",
            "--resize-at",
            "0",
        ]);
        let picture = picture_at(&args, 0);
        assert_eq!(picture.width, u32::MAX);
        assert_eq!(picture.height, u32::MAX);
    }
}
