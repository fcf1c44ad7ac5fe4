use chrono::{DateTime, Utc};

/// A fact published after the change it describes is visible to readers.
pub trait Event: Clone + core::fmt::Debug + Send + 'static {
    /// Dotted `<context>.<subject>.<verb>` name, e.g. "inventory.movement.appended".
    fn event_type(&self) -> &'static str;

    /// Business time of the change, as supplied by the caller.
    fn occurred_at(&self) -> DateTime<Utc>;
}
