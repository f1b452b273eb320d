//! Simple AirTunes receiver
//!
//! Advertising is left to the host (`dns-sd -R` or avahi); the service name
//! and TXT records to publish are printed at startup.
//!
//! ```text
//! AIRTUNES_KEY=airport.pem AIRTUNES_PASSWORD=secret cargo run --example receiver --features decoders
//! ```

use std::sync::Arc;

use airtunes::{AirTunesReceiver, AudioStream, ReceiverConfig, ReceiverEvent, ServerKey};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let verbose = std::env::var_os("AIRTUNES_VERBOSE").is_some();
    let default_directive = if verbose { "airtunes=debug" } else { "airtunes=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .init();

    let key = match std::env::var("AIRTUNES_KEY") {
        Ok(path) => ServerKey::from_pem_file(path)?,
        Err(_) => {
            println!("AIRTUNES_KEY not set; generating a throwaway key (senders expecting the AirPort key will refuse it)");
            ServerKey::generate()?
        }
    };

    let mut config = ReceiverConfig::with_name("Rust AirTunes").verbose(verbose);
    if let Ok(password) = std::env::var("AIRTUNES_PASSWORD") {
        config = config.password(password);
    }

    println!("Service: {}._raop._tcp", config.service_name());
    for (key, value) in config.txt_records() {
        println!("  {key}={value}");
    }

    let mut receiver = AirTunesReceiver::new(config, Arc::new(key));
    let mut events = receiver.take_events().ok_or("event channel already taken")?;

    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ReceiverEvent::Started { name, port } => {
                    println!("Receiver '{name}' listening on port {port}");
                }
                ReceiverEvent::ClientConnected(stream) => {
                    println!("Client connected");
                    tokio::spawn(drain_audio(stream));
                }
                ReceiverEvent::ClientNameChanged(name) => println!("Sender: {name}"),
                ReceiverEvent::MetadataChanged(meta) => {
                    if let (Some(title), Some(artist)) = (meta.title(), meta.artist()) {
                        println!("Now playing: {artist} - {title}");
                    }
                }
                ReceiverEvent::ArtworkChanged(art) => println!("Artwork: {} bytes", art.len()),
                ReceiverEvent::VolumeChanged(db) => println!("Volume: {db:.2} dB"),
                ReceiverEvent::ProgressChanged(progress) => println!("Progress: {progress}"),
                ReceiverEvent::ClientDisconnected => println!("Client disconnected"),
                ReceiverEvent::Error { code, message } => println!("Error {code}: {message}"),
                ReceiverEvent::Stopped => break,
            }
        }
    });

    receiver.start().await?;
    println!("Receiver running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    receiver.stop().await?;
    event_task.await?;
    println!("Receiver stopped.");

    Ok(())
}

/// Stand-in for an audio device: count what arrives
async fn drain_audio(mut stream: AudioStream) {
    let mut total = 0usize;
    while let Some(chunk) = stream.recv().await {
        total += chunk.len();
    }
    println!("Audio stream ended after {total} bytes of PCM");
}
