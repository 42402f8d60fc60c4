//! TwiML response bodies.

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// `<Response></Response>`: acknowledge without instructions.
pub fn empty() -> String {
    format!("{XML_HEADER}<Response></Response>")
}

/// Connect the call audio to our media-stream websocket on `host`.
pub fn connect_stream(host: &str) -> String {
    format!(
        r#"{XML_HEADER}<Response><Connect><Stream url="wss://{}/media-stream"/></Connect></Response>"#,
        escape(host)
    )
}

/// End the call.
pub fn hangup() -> String {
    format!("{XML_HEADER}<Response><Hangup/></Response>")
}

/// Reply to an inbound SMS.
pub fn message(text: &str) -> String {
    format!(
        "{XML_HEADER}<Response><Message>{}</Message></Response>",
        escape(text)
    )
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
