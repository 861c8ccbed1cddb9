//! TwiML rendering for call control.

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Escape text for use in XML content and attribute values.
pub fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// `<Say>` a reply, then hold the line for `pause_secs`.
pub fn say(text: &str, voice: &str, pause_secs: u32) -> String {
    let mut twiml = String::with_capacity(text.len() + 128);
    twiml.push_str(XML_HEADER);
    twiml.push_str("<Response>");
    twiml.push_str(&format!(
        r#"<Say voice="{}">{}</Say>"#,
        escape_xml(voice),
        escape_xml(text)
    ));
    if pause_secs > 0 {
        twiml.push_str(&format!(r#"<Pause length="{pause_secs}"/>"#));
    }
    twiml.push_str("</Response>");
    twiml
}

/// Greet the caller, then connect the call audio to a media stream.
pub fn connect_stream(
    greeting: Option<(&str, &str)>,
    stream_url: &str,
    parameters: &[(&str, &str)],
) -> String {
    let mut twiml = String::with_capacity(256);
    twiml.push_str(XML_HEADER);
    twiml.push_str("<Response>");
    if let Some((text, voice)) = greeting {
        twiml.push_str(&format!(
            r#"<Say voice="{}">{}</Say>"#,
            escape_xml(voice),
            escape_xml(text)
        ));
    }
    twiml.push_str(&format!(
        r#"<Connect><Stream url="{}">"#,
        escape_xml(stream_url)
    ));
    for (name, value) in parameters {
        twiml.push_str(&format!(
            r#"<Parameter name="{}" value="{}"/>"#,
            escape_xml(name),
            escape_xml(value)
        ));
    }
    twiml.push_str("</Stream></Connect></Response>");
    twiml
}
