use std::future::Future;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::icons::{CHECK, CROSS};

/// Spinner shown on stderr while a request is pending.
///
/// Draws nothing when stderr is not a terminal, so piped output stays clean.
pub struct Pending {
    bar: ProgressBar,
}

impl Pending {
    pub fn start(message: impl Into<String>) -> Self {
        Self::with_target(message, ProgressDrawTarget::stderr())
    }

    /// Spinner that never draws.
    pub fn hidden(message: impl Into<String>) -> Self {
        Self::with_target(message, ProgressDrawTarget::hidden())
    }

    fn with_target(message: impl Into<String>, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        if let Ok(spinner) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            bar.set_style(spinner);
        }
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn message(&self) -> String {
        self.bar.message()
    }

    pub fn succeed(self, message: impl AsRef<str>) {
        self.bar
            .finish_with_message(format!("{}{}", CHECK, style(message.as_ref()).green()));
    }

    pub fn fail(self, message: impl AsRef<str>) {
        self.bar
            .abandon_with_message(format!("{}{}", CROSS, style(message.as_ref()).red()));
    }

    /// Remove the spinner without a final line.
    pub fn clear(self) {
        self.bar.finish_and_clear();
    }
}

/// Await `future` behind a spinner, clearing it afterwards.
pub async fn with_spinner<F, T>(message: impl Into<String>, future: F) -> T
where
    F: Future<Output = T>,
{
    let pending = Pending::start(message);
    let output = future.await;
    pending.clear();
    output
}
