pub mod health_monitor;
pub mod notifier;
