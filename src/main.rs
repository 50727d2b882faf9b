use anyhow::{Context, Result};
use roomcast::{Core, EventBridge, OverlayConfig, RoomEvent};
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .try_init()
        .ok();
}

fn print_usage(program_name: &str) {
    eprintln!("roomcast - P2P room chat and frame streaming over UDP");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  {} <room>", program_name);
    eprintln!();
    eprintln!("Everyone who joins the same room exchanges chat lines and video");
    eprintln!("frames directly over UDP; the signalling server only introduces");
    eprintln!("the peers to each other.");
    eprintln!();
    eprintln!("ENVIRONMENT VARIABLES:");
    eprintln!("  SIGNALLING_HOST   host:port of the signalling service");
    eprintln!("                    (default: 127.0.0.1:8080)");
    eprintln!();
    eprintln!("IN THE CHAT:");
    eprintln!("  <text>            send a chat line to the room");
    eprintln!("  !path/to/img.jpg  send an encoded image as a video frame");
    eprintln!("  Ctrl+D            exit");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }
    let room = &args[1];

    let mut config = OverlayConfig::default();
    if let Ok(host) = env::var("SIGNALLING_HOST") {
        config.signalling_host = host;
    }

    let (events, mut rx) = EventBridge::channel();
    let core = Core::start(config, events)
        .await
        .context("start overlay core")?;

    let identity = core.identity();
    println!(
        "local endpoint: public {} / private {} / udp port {}",
        identity.public_ip, identity.private_ip, identity.port
    );

    println!("{}", core.join_room(room).await);

    tokio::spawn(async move {
        let mut frame_count = 0u32;
        while let Some(event) = rx.recv().await {
            match event {
                RoomEvent::PeerListUpdated(roster) => {
                    println!("room members: {}", roster.len());
                    for member in &roster {
                        println!(
                            "  {}:{} (private {})",
                            member.public_ip, member.port, member.private_ip
                        );
                    }
                }
                RoomEvent::MessageReceived { sender, message } => {
                    println!("{}: {}", sender, message);
                }
                RoomEvent::FrameReceived(frame) => {
                    frame_count += 1;
                    let path = format!("frame-{:04}.jpg", frame_count);
                    match std::fs::write(&path, &frame) {
                        Ok(()) => println!("frame saved to {} ({} bytes)", path, frame.len()),
                        Err(e) => eprintln!("could not save frame: {}", e),
                    }
                }
            }
        }
    });

    println!("type a message and press Enter; !path/to/image sends a frame; Ctrl+D exits");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(path) = line.strip_prefix('!') {
            match std::fs::read(path) {
                Ok(bytes) => {
                    core.send_frame(&bytes).await;
                    println!("frame sent ({} bytes)", bytes.len());
                }
                Err(e) => eprintln!("could not read {}: {}", path, e),
            }
        } else {
            core.send_message(line).await;
        }
    }

    Ok(())
}
