use super::ServerConfig;
use crate::core::tts::{MAX_SPEED, MIN_SPEED};

/// Check cross-field constraints on a fully merged configuration.
pub(crate) fn validate(config: &ServerConfig) -> Result<(), String> {
    if config.deepgram_api_key.is_none() {
        return Err(
            "DEEPGRAM_API_KEY is required (env or providers.deepgram_api_key in YAML)".to_string(),
        );
    }
    if config.openai_api_key.is_none() {
        return Err(
            "OPENAI_API_KEY is required (env or providers.openai_api_key in YAML)".to_string(),
        );
    }

    validate_tts_speed(config.tts_speed)?;
    validate_temperature(config.llm_temperature)?;

    if config.llm_max_tokens == 0 {
        return Err("LLM_MAX_TOKENS must be greater than zero".to_string());
    }

    validate_pair(
        "TWILIO_ACCOUNT_SID",
        config.twilio_account_sid.is_some(),
        "TWILIO_AUTH_TOKEN",
        config.twilio_auth_token.is_some(),
    )?;

    if config.rate_limit_requests_per_second == 0 {
        return Err("RATE_LIMIT_REQUESTS_PER_SECOND must be greater than zero".to_string());
    }

    if let Some(url) = &config.public_url {
        url::Url::parse(url).map_err(|e| format!("Invalid PUBLIC_URL '{url}': {e}"))?;
    }
    if let Some(url) = &config.lead_webhook_url {
        url::Url::parse(url).map_err(|e| format!("Invalid LEAD_WEBHOOK_URL '{url}': {e}"))?;
    }

    Ok(())
}

pub(crate) fn validate_tts_speed(speed: f32) -> Result<(), String> {
    if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(format!(
            "TTS_SPEED must be between {MIN_SPEED} and {MAX_SPEED}, got {speed}"
        ));
    }
    Ok(())
}

pub(crate) fn validate_temperature(temperature: f32) -> Result<(), String> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(format!(
            "LLM_TEMPERATURE must be between 0.0 and 2.0, got {temperature}"
        ));
    }
    Ok(())
}

/// Both or neither of two settings must be present.
pub(crate) fn validate_pair(
    first: &str,
    has_first: bool,
    second: &str,
    has_second: bool,
) -> Result<(), String> {
    match (has_first, has_second) {
        (true, false) => Err(format!("{first} is set but {second} is missing")),
        (false, true) => Err(format!("{second} is set but {first} is missing")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_range() {
        assert!(validate_tts_speed(1.0).is_ok());
        assert!(validate_tts_speed(0.25).is_ok());
        assert!(validate_tts_speed(4.0).is_ok());
        assert!(validate_tts_speed(0.1).is_err());
        assert!(validate_tts_speed(f32::NAN).is_err());
    }

    #[test]
    fn test_temperature_range() {
        assert!(validate_temperature(0.0).is_ok());
        assert!(validate_temperature(2.0).is_ok());
        assert!(validate_temperature(-0.1).is_err());
        assert!(validate_temperature(2.5).is_err());
    }

    #[test]
    fn test_pair_rule() {
        assert!(validate_pair("A", true, "B", true).is_ok());
        assert!(validate_pair("A", false, "B", false).is_ok());
        assert_eq!(
            validate_pair("A", true, "B", false).unwrap_err(),
            "A is set but B is missing"
        );
        assert_eq!(
            validate_pair("A", false, "B", true).unwrap_err(),
            "B is set but A is missing"
        );
    }
}
