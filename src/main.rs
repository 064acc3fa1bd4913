use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use multicam::config::DEFAULT_CONFIG_FILE;
use multicam::counter::DEFAULT_COUNTER_FILE;
use multicam::supervisor::DEFAULT_JOIN_TIMEOUT;
use multicam::{
    Decision, ExitReason, FailureDecider, FixedDecision, JpegFrameSink, LogPreview, PromptDecider,
    RunCounter, Settings, Supervisor, SupervisorOptions, SystemBackend,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long, env = "MULTICAM_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// File holding the run counter used to name saved frames
    #[arg(long, default_value = DEFAULT_COUNTER_FILE)]
    counter_file: PathBuf,

    /// Override target frames per second (0 disables pacing)
    #[arg(long)]
    fps: Option<u32>,

    /// Override capture resolution width
    #[arg(long)]
    width: Option<u32>,

    /// Override capture resolution height
    #[arg(long)]
    height: Option<u32>,

    /// Override seconds each camera gets to deliver its first frame
    #[arg(long)]
    connect_timeout_secs: Option<u64>,

    /// Override seconds between starting network cameras and the USB camera
    #[arg(long)]
    stagger_secs: Option<u64>,

    /// Seconds to wait for cameras to stop at shutdown (0 waits forever)
    #[arg(long, default_value_t = DEFAULT_JOIN_TIMEOUT.as_secs())]
    join_timeout_secs: u64,

    /// What to do when a camera cannot connect. With `prompt`, Ctrl-C takes
    /// effect once the pending question is answered.
    #[arg(long, value_enum, default_value_t = OnFailure::Prompt)]
    on_failure: OnFailure,

    /// Write logs to this file instead of the terminal
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the resolved cameras and exit
    #[arg(long)]
    print_config: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnFailure {
    /// Ask on the terminal (Ctrl-C waits for the answer)
    Prompt,
    /// Keep going without the camera
    Continue,
    /// Stop everything
    Abort,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args)?;
    tracing::info!("multicam starting");

    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    apply_overrides(&mut settings, &args);
    settings.validate().context("Invalid settings")?;

    if args.print_config {
        for source in settings.sources(0) {
            println!(
                "{}: {} -> {} ({}x{} @ {} fps)",
                source.label(),
                source.address,
                source.output_folder.display(),
                source.frame_width,
                source.frame_height,
                source.target_fps
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let run_iteration = RunCounter::new(&args.counter_file)
        .next_run()
        .context("Failed to advance run counter")?;

    tracing::info!("Run: {}", run_iteration);
    tracing::info!("Capture: {}x{}", settings.width, settings.height);
    tracing::info!("Target FPS: {}", settings.fps);

    let options = SupervisorOptions {
        connect_timeout: settings.connect_timeout,
        usb_stagger: settings.usb_stagger,
        join_timeout: (args.join_timeout_secs > 0)
            .then(|| Duration::from_secs(args.join_timeout_secs)),
        ..SupervisorOptions::default()
    };

    let decider: Box<dyn FailureDecider> = match args.on_failure {
        OnFailure::Prompt => Box::new(PromptDecider::stdio()),
        OnFailure::Continue => Box::new(FixedDecision(Decision::Continue)),
        OnFailure::Abort => Box::new(FixedDecision(Decision::Abort)),
    };

    let mut supervisor = Supervisor::new(
        options,
        Arc::new(SystemBackend::new()),
        Arc::new(JpegFrameSink::new(settings.jpeg_quality)),
        Arc::new(LogPreview::new()),
        decider,
    );

    let trigger = supervisor.shutdown_trigger();
    ctrlc::set_handler(move || {
        if trigger.is_triggered() {
            tracing::info!("Already shutting down");
        } else {
            tracing::info!("Interrupted");
            trigger.trigger();
        }
    })
    .context("Failed to install Ctrl+C handler")?;
    tracing::info!("Press Ctrl+C to stop");

    let summary = supervisor.run(settings.sources(run_iteration));

    for report in &summary.sessions {
        tracing::info!(
            "Camera {}: {:?}, {} frames, {:.1} fps",
            report.source_id + 1,
            report.state,
            report.frames_emitted,
            report.achieved_fps
        );
    }

    let code = match summary.exit_reason {
        ExitReason::ShutdownRequested => {
            tracing::info!("multicam finished");
            ExitCode::SUCCESS
        }
        ExitReason::SourceFailure { source_id } => {
            tracing::info!("multicam stopped because camera {} failed", source_id + 1);
            ExitCode::from(2)
        }
        ExitReason::InternalError => {
            tracing::error!("multicam stopped after an internal error");
            ExitCode::FAILURE
        }
    };
    Ok(code)
}

fn init_logging(args: &Args) -> Result<()> {
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_max_level(log_level)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(log_level)
                .with_target(false)
                .init();
        }
    }
    Ok(())
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(fps) = args.fps {
        settings.fps = fps;
    }
    if let Some(width) = args.width {
        settings.width = width;
    }
    if let Some(height) = args.height {
        settings.height = height;
    }
    if let Some(secs) = args.connect_timeout_secs {
        settings.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.stagger_secs {
        settings.usb_stagger = Duration::from_secs(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = Settings::from_toml(
            r#"
            [usb]
            index = 0
            folder = "usb"
            "#,
        )
        .unwrap();
        let args = Args::parse_from([
            "multicam",
            "--fps",
            "0",
            "--width",
            "640",
            "--stagger-secs",
            "0",
        ]);
        apply_overrides(&mut settings, &args);

        assert_eq!(settings.fps, 0);
        assert_eq!(settings.width, 640);
        assert_eq!(settings.usb_stagger, Duration::ZERO);
        assert_eq!(args.on_failure, OnFailure::Prompt);
        assert_eq!(args.join_timeout_secs, 15);
    }
}
