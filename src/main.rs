mod cli;

use tonecast::{config, server};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tonecast_av::{Encoding, SpawnLock, TranscodeParameters, Transcoder};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tonecast=trace,tonecast_av=trace,tower_http=debug".to_string()
        } else {
            "tonecast=debug,tonecast_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Transcode {
            input,
            format,
            offset,
            output,
        } => transcode_file(&input, &format, offset, output.as_deref(), cli.config.as_deref()),
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::CheckTools => check_tools(),
        Commands::Version => {
            println!("tonecast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_server(host: String, port: u16, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting tonecast server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    server::start_server(config).await
}

fn transcode_file(
    input: &Path,
    format: &str,
    offset: u64,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let encoding: Encoding = format.parse()?;
    let encoder = tonecast_av::resolve_tool("ffmpeg", config.encoder.path.as_deref())?;
    let ffprobe = tonecast_av::resolve_tool("ffprobe", config.encoder.ffprobe_path.as_deref())?;

    let probe = tonecast_av::probe(&ffprobe, input)?;
    if !probe.has_streams() {
        anyhow::bail!("No playable streams in {:?}", input);
    }

    let params = TranscodeParameters::new(input, encoding)
        .with_streams(probe.selector(encoding.is_video()))
        .with_offset(Duration::from_secs(offset))
        .with_audio_bitrate(config.encoder.audio_bitrate)
        .with_video_bitrate(config.encoder.video_bitrate);

    let lock = SpawnLock::new();
    let mut transcoder = Transcoder::spawn(&encoder, &params, &lock)?;

    let stdout = std::io::stdout();
    let mut sink: Box<dyn Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(stdout.lock()),
    };

    let mut total = 0usize;
    while !transcoder.is_complete() {
        transcoder.pump(64 * 1024);
        let chunk = transcoder.take_buffered();
        sink.write_all(&chunk)?;
        total += chunk.len();
    }
    sink.flush()?;

    tracing::info!(bytes = total, "transcode finished");
    Ok(())
}

fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let ffprobe = tonecast_av::resolve_tool("ffprobe", config.encoder.ffprobe_path.as_deref())?;
    let probe = tonecast_av::probe(&ffprobe, file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
    } else {
        println!("File: {}", file.display());
        if let Some(duration) = probe.duration {
            println!("Duration: {}s", duration.as_secs());
        }
        println!("Audio streams: {:?}", probe.audio_streams);
        println!("Video streams: {:?}", probe.video_streams);
        println!("Subtitle streams: {:?}", probe.subtitle_streams);
    }

    Ok(())
}

fn check_tools() -> Result<()> {
    for info in tonecast_av::check_tools() {
        let status = if info.available {
            match &info.path {
                Some(path) => format!("ok ({})", path.display()),
                None => "ok".to_string(),
            }
        } else {
            "missing".to_string()
        };
        println!("{:<10} {}", info.name, status);
    }
    Ok(())
}
