pub mod notifier;

pub use notifier::{Notification, NotificationResult, NotifierPlugin, NotifySink};

#[cfg(test)]
pub use notifier::MockNotifySink;
