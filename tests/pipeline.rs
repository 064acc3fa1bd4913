mod common;

use common::wait_until;
use multicam::{
    Decision, ExitReason, FixedDecision, JpegFrameSink, NullPreview, RunCounter, SessionState,
    Settings, Supervisor, SupervisorOptions, SystemBackend,
};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn jpegs_in(folder: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(folder)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| name.ends_with(".jpg"))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn settings_file_to_jpegs_on_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let short = dir.path().join("short");
    let broken = dir.path().join("broken");
    let settings_path = dir.path().join("settings.toml");
    std::fs::write(
        &settings_path,
        format!(
            r#"
            [general]
            fps = 0
            width = 320
            height = 240
            connect_timeout_secs = 1
            jpeg_quality = 80

            [[network]]
            address = "stub://pattern?frames=3"
            folder = '{}'

            [[network]]
            address = "stub://offline"
            folder = '{}'
            "#,
            short.display(),
            broken.display()
        ),
    )?;

    let settings = Settings::load(&settings_path)?;
    let counter_path = dir.path().join("start_count.txt");
    std::fs::write(&counter_path, "2")?;
    let run_iteration = RunCounter::new(&counter_path).next_run()?;
    assert_eq!(run_iteration, 2);
    assert_eq!(std::fs::read_to_string(&counter_path)?, "3");

    let options = SupervisorOptions {
        connect_timeout: settings.connect_timeout,
        poll_interval: Duration::from_millis(10),
        usb_stagger: settings.usb_stagger,
        join_timeout: Some(Duration::from_secs(5)),
    };
    let mut supervisor = Supervisor::new(
        options,
        Arc::new(SystemBackend::new()),
        Arc::new(JpegFrameSink::new(settings.jpeg_quality)),
        Arc::new(NullPreview),
        Box::new(FixedDecision(Decision::Continue)),
    );
    let trigger = supervisor.shutdown_trigger();
    let sources = settings.sources(run_iteration);
    let run = thread::spawn(move || supervisor.run(sources));

    assert!(wait_until(Duration::from_secs(5), || jpegs_in(&short).len() == 3));
    trigger.trigger();
    let summary = run.join().expect("supervisor thread panicked");

    assert_eq!(summary.exit_reason, ExitReason::ShutdownRequested);
    assert_eq!(summary.failures, vec![1]);
    assert_eq!(summary.sessions[0].state, SessionState::Stopped);
    assert_eq!(summary.sessions[0].frames_emitted, 3);
    assert_eq!(summary.sessions[1].state, SessionState::Failed);

    assert_eq!(
        jpegs_in(&short),
        vec!["2 frame_0.jpg", "2 frame_1.jpg", "2 frame_2.jpg"]
    );
    let saved = image::open(short.join("2 frame_0.jpg"))?;
    assert_eq!((saved.width(), saved.height()), (320, 240));
    assert!(!broken.exists());
    Ok(())
}
