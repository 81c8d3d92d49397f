//! Transactional email: templates, transports, the dispatcher and its route.

pub mod dispatcher;
pub mod email_type;
pub mod routes;
pub mod templates;
pub mod transport;

pub use dispatcher::{DeliveryOutcome, NotificationDispatcher};
pub use email_type::{EmailType, Recipient};
pub use routes::{NotifyRouteState, notify_routes};
pub use templates::{EmailPayload, RenderedEmail};
pub use transport::{MailTransport, OutgoingEmail};
