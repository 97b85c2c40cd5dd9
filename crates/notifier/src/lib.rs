pub mod mailer;
pub mod notifier;
pub mod smtp;

pub use mailer::Mailer;
pub use notifier::Notifier;
pub use smtp::SmtpMailer;
