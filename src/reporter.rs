use crossbeam_channel::{unbounded, Receiver, Sender};

/// Queue of camera ids whose connection attempt failed.
///
/// Many sessions push, the supervisor's monitor loop is the only reader.
/// The channel is unbounded so a push never blocks.
#[derive(Debug)]
pub struct FailureReporter {
    tx: Sender<usize>,
    rx: Receiver<usize>,
}

/// Producer side handed to each session.
#[derive(Debug, Clone)]
pub struct FailureNotifier {
    tx: Sender<usize>,
}

impl FailureReporter {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn notifier(&self) -> FailureNotifier {
        FailureNotifier {
            tx: self.tx.clone(),
        }
    }

    /// Remove and return everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<usize> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for FailureReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureNotifier {
    pub fn push(&self, source_id: usize) {
        // Only fails once the reporter itself has been dropped.
        if self.tx.send(source_id).is_err() {
            tracing::debug!(camera = source_id + 1, "Failure reporter already closed");
        }
    }
}
