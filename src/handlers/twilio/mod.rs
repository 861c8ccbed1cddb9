pub mod handler;
pub mod messages;
pub mod voice;

pub use handler::twilio_stream_handler;
pub use voice::voice_webhook;
