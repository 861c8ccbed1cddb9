//! Per-call session management: lifecycle, conversation state, reply
//! delivery and lead hand-off.

pub mod delivery;
pub mod lead;
mod manager;
mod registry;
mod session;
mod state;
mod transport;

pub use delivery::{
    Announcer, DeliveryError, DeliveryMode, LoggingAnnouncer, ReplyDelivery, TwilioCallUpdater,
};
pub use lead::{LeadError, LeadRecord, LeadSink, LoggingLeadSink, WebhookLeadSink};
pub use manager::{SessionError, SessionManager, SessionManagerBuilder};
pub use registry::SessionRegistry;
pub use session::{CallSession, SessionEvent, SessionId};
pub use state::{ConversationHandle, ConversationStats, GenerationGuard};
pub use transport::{CallMetadata, TransportEvent, TransportRoute, TransportSender};
