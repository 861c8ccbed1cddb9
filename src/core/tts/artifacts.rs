//! On-disk copies of synthesized replies, one file per call.

use std::io::Cursor;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use super::base::{AudioData, AudioFormat};
use crate::core::codec::pcm16_from_le_bytes;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to write audio artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode WAV artifact: {0}")]
    Wav(#[from] hound::Error),
}

/// Writes the latest reply of each session to `{dir}/reply_{session_id}.{ext}`.
#[derive(Debug, Clone)]
pub struct AudioArtifactStore {
    dir: PathBuf,
}

impl AudioArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, session_id: &str, format: AudioFormat) -> PathBuf {
        let ext = match format {
            AudioFormat::Mp3 => "mp3",
            // Raw PCM is stored with a WAV header so it can be played back
            AudioFormat::Wav | AudioFormat::Pcm => "wav",
        };
        self.dir.join(format!("reply_{session_id}.{ext}"))
    }

    /// Persist one reply, replacing the previous reply of the same session.
    pub async fn persist(&self, session_id: &str, audio: &AudioData) -> Result<PathBuf, ArtifactError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(session_id, audio.format);
        let bytes = match audio.format {
            AudioFormat::Pcm => wrap_pcm_as_wav(&audio.data, audio.sample_rate)?,
            AudioFormat::Mp3 | AudioFormat::Wav => audio.data.to_vec(),
        };

        tokio::fs::write(&path, bytes).await?;
        debug!("Audio artifact saved to {}", path.display());
        Ok(path)
    }
}

fn wrap_pcm_as_wav(pcm_le: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in pcm16_from_le_bytes(pcm_le) {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
