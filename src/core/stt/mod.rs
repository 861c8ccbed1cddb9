mod base;
pub mod deepgram;

pub use base::{
    BaseSTT, STTConfig, STTConnector, STTError, STTErrorCallback, STTResult, STTResultCallback,
};

pub use deepgram::{DeepgramConnector, DeepgramSTT, DeepgramSTTConfig};

/// Supported STT providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum STTProvider {
    /// Deepgram live streaming WebSocket API
    Deepgram,
}

impl std::fmt::Display for STTProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            STTProvider::Deepgram => write!(f, "deepgram"),
        }
    }
}

impl std::str::FromStr for STTProvider {
    type Err = STTError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deepgram" => Ok(STTProvider::Deepgram),
            _ => Err(STTError::ConfigurationError(format!(
                "Unsupported STT provider: {s}. Supported providers: deepgram"
            ))),
        }
    }
}

/// Connector for the provider named in `config.provider`.
pub fn create_stt_connector(config: &STTConfig) -> Result<Box<dyn STTConnector>, STTError> {
    match config.provider.parse::<STTProvider>()? {
        STTProvider::Deepgram => Ok(Box::new(DeepgramConnector)),
    }
}
