// Operator notifications
pub mod discord;

pub use discord::DiscordNotifier;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyLevel::Info => "INFO",
            NotifyLevel::Warning => "WARNING",
            NotifyLevel::Error => "ERROR",
        })
    }
}

/// Fire-and-forget operator channel
///
/// Calls must return immediately and never fail: a broken notification
/// path is not allowed to stall or abort trading.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, text: &str);

    /// Attach an image such as a rendered chart (PNG bytes)
    fn notify_image(&self, _image: Vec<u8>) {}
}

/// Writes notifications to the tracing log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NotifyLevel, text: &str) {
        log_at(level, text);
    }

    fn notify_image(&self, image: Vec<u8>) {
        tracing::debug!("image notification dropped ({} bytes)", image.len());
    }
}

pub(crate) fn log_at(level: NotifyLevel, text: &str) {
    match level {
        NotifyLevel::Info => tracing::info!("{}", text),
        NotifyLevel::Warning => tracing::warn!("{}", text),
        NotifyLevel::Error => tracing::error!("{}", text),
    }
}
