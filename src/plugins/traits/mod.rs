pub mod automation;
pub mod notifier;

pub use automation::{AutomationFactory, ElementHandle, Locator, PageAutomation};
pub use notifier::MailTransport;
