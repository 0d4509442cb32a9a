pub mod notifiers;
pub mod traits;

pub use notifiers::SmtpMailer;
pub use traits::{AutomationFactory, MailTransport, PageAutomation};
