//! Deepgram live streaming speech-to-text.
//!
//! One [`DeepgramSTT`] wraps one `wss://api.deepgram.com/v1/listen`
//! connection configured for Twilio audio (8 kHz mono mu-law, punctuation
//! on, interim results off). Only final, non-blank transcripts are passed to
//! the result callback.
//!
//! # Example
//!
//! ```rust,no_run
//! use gusto_gateway::core::stt::{BaseSTT, DeepgramSTT, STTConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut stt = DeepgramSTT::new(STTConfig {
//!         api_key: "your-deepgram-api-key".to_string(),
//!         ..Default::default()
//!     })?;
//!
//!     stt.on_result(Arc::new(|result| {
//!         Box::pin(async move {
//!             println!("Caller said: {}", result.transcript);
//!         })
//!     }))
//!     .await?;
//!     stt.connect().await?;
//!
//!     stt.send_audio(vec![0xFFu8; 160].into()).await?;
//!     stt.disconnect().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod messages;


pub use client::{DeepgramConnector, DeepgramSTT};
pub use config::{DEEPGRAM_LISTEN_URL, DEFAULT_KEEPALIVE_INTERVAL, DeepgramSTTConfig};
pub use messages::{ControlMessage, DeepgramMessage, ResultsMessage};
