use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination for the plain-text fallback notification.
pub trait FallbackOutlet: Send + Sync {
    fn emit(&self, text: &str);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutOutlet;

impl FallbackOutlet for StdoutOutlet {
    fn emit(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(error) = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
            tracing::warn!(
                event_name = "notify.stdout_failed",
                %error,
                "failed to write notification"
            );
        }
    }
}

/// Keeps stdout free for structured command output.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrOutlet;

impl FallbackOutlet for StderrOutlet {
    fn emit(&self, text: &str) {
        let mut stderr = std::io::stderr().lock();
        if let Err(error) = stderr.write_all(text.as_bytes()).and_then(|()| stderr.flush()) {
            tracing::warn!(
                event_name = "notify.stderr_failed",
                %error,
                "failed to write notification"
            );
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryOutlet {
    emitted: Arc<Mutex<Vec<String>>>,
}

impl MemoryOutlet {
    pub fn emitted(&self) -> Vec<String> {
        match self.emitted.lock() {
            Ok(emitted) => emitted.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl FallbackOutlet for MemoryOutlet {
    fn emit(&self, text: &str) {
        match self.emitted.lock() {
            Ok(mut emitted) => emitted.push(text.to_owned()),
            Err(poisoned) => poisoned.into_inner().push(text.to_owned()),
        }
    }
}
