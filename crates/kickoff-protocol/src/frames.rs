//! STOMP 1.2 text frames, as spoken by the live-update broker.
//!
//! One WebSocket text message carries exactly one frame, or a bare EOL when
//! it is a heartbeat.

use serde_json::Value;

use crate::error::FrameError;

pub const STOMP_VERSION: &str = "1.2";
/// Heartbeat payload: a single end-of-line, no command.
pub const HEARTBEAT_FRAME: &str = "\n";
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED headers are never escaped (STOMP 1.2 §Value Encoding).
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

/// A single STOMP frame.
///
/// Wire: `SUBSCRIBE\nid:sub-1\ndestination:/topic/matches\n\n\0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Header lookup. A repeated header keeps its first value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Client → Server: open a session.
    /// Wire: `CONNECT\naccept-version:1.2\nhost:…\nheart-beat:4000,4000\n\n\0`
    pub fn connect(host: &str, heart_beat: HeartBeat, auth_token: Option<&str>) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .with_header("accept-version", STOMP_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", heart_beat.header_value());
        if let Some(token) = auth_token {
            frame = frame.with_header("Authorization", format!("Bearer {}", token));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    /// Client → Server: publish a JSON payload to an application destination.
    pub fn send_json(destination: &str, payload: &Value) -> Self {
        Frame::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", JSON_CONTENT_TYPE)
            .with_body(payload.to_string())
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Serialize to wire text, NUL-terminated. A `content-length` header is
    /// added for non-empty bodies unless the caller already set one.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Result of parsing one inbound WebSocket text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Heartbeat,
    Frame(Frame),
}

/// Parse one inbound text message into a frame or a heartbeat.
pub fn parse(raw: &str) -> Result<Inbound, FrameError> {
    let trimmed = raw.trim_start_matches(|c: char| c == '\n' || c == '\r');
    if trimmed.is_empty() || trimmed == "\0" {
        return Ok(Inbound::Heartbeat);
    }

    let (command_line, mut cursor) = split_line(trimmed).ok_or(FrameError::Empty)?;
    let command = Command::parse(command_line)
        .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;
    let unescape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, rest) = split_line(cursor).ok_or(FrameError::TruncatedBody)?;
        cursor = rest;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if unescape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let frame = Frame {
        command,
        headers,
        body: String::new(),
    };
    let body = match frame.get("content-length").and_then(|v| v.trim().parse::<usize>().ok()) {
        Some(len) => cursor.get(..len).ok_or(FrameError::TruncatedBody)?,
        None => {
            let end = cursor.find('\0').ok_or(FrameError::TruncatedBody)?;
            &cursor[..end]
        }
    };

    Ok(Inbound::Frame(Frame {
        body: body.to_string(),
        ..frame
    }))
}

/// Split off one line, accepting both `\n` and `\r\n` endings.
fn split_line(s: &str) -> Option<(&str, &str)> {
    let idx = s.find('\n')?;
    let line = s[..idx].strip_suffix('\r').unwrap_or(&s[..idx]);
    Some((line, &s[idx + 1..]))
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::MalformedHeader(s.to_string())),
        }
    }
    Ok(out)
}

/// `heart-beat` header value: `<outgoing ms>,<incoming ms>`, 0 = disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (out, inc) = value.split_once(',')?;
        Some(Self {
            outgoing_ms: out.trim().parse().ok()?,
            incoming_ms: inc.trim().parse().ok()?,
        })
    }

    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Effective client-side intervals given what the server answered in CONNECTED.
    ///
    /// Each direction is active only when both ends allow it, at the slower of
    /// the two rates.
    pub fn negotiate(client: HeartBeat, server: HeartBeat) -> HeartBeat {
        let outgoing_ms = if client.outgoing_ms == 0 || server.incoming_ms == 0 {
            0
        } else {
            client.outgoing_ms.max(server.incoming_ms)
        };
        let incoming_ms = if client.incoming_ms == 0 || server.outgoing_ms == 0 {
            0
        } else {
            client.incoming_ms.max(server.outgoing_ms)
        };
        HeartBeat {
            outgoing_ms,
            incoming_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_eol_is_heartbeat() {
        assert_eq!(parse("\n").unwrap(), Inbound::Heartbeat);
        assert_eq!(parse("\r\n").unwrap(), Inbound::Heartbeat);
    }

    #[test]
    fn command_without_eol_is_empty_frame() {
        assert!(matches!(parse("CONNECTED"), Err(FrameError::Empty)));
        assert!(matches!(parse("\nMESSAGE"), Err(FrameError::Empty)));
        assert!(matches!(
            parse("MESSAGE\ndestination:/topic/a"),
            Err(FrameError::TruncatedBody)
        ));
    }

    #[test]
    fn header_escaping_survives_the_wire() {
        let frame = Frame::subscribe("sub-1", "/topic/a:b");
        let wire = frame.encode();
        assert!(wire.contains("destination:/topic/a\\cb"));
        let Inbound::Frame(back) = parse(&wire).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(back.get("destination"), Some("/topic/a:b"));
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let wire = Frame::connect("localhost", HeartBeat::new(4000, 4000), None).encode();
        assert!(wire.starts_with("CONNECT\n"));
        assert!(wire.contains("heart-beat:4000,4000\n"));
        assert!(wire.ends_with("\n\n\0"));
    }

    #[test]
    fn content_length_bounds_the_body() {
        let wire = "MESSAGE\ndestination:/topic/x\ncontent-length:2\n\n{}\0\n\n";
        let Inbound::Frame(frame) = parse(wire).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.body, "{}");
    }

    #[test]
    fn missing_nul_is_truncated() {
        let err = parse("MESSAGE\ndestination:/topic/x\n\n{}").unwrap_err();
        assert!(matches!(err, FrameError::TruncatedBody));
    }

    #[test]
    fn unknown_command_rejected() {
        let err = parse("HELLO\n\n\0").unwrap_err();
        assert!(matches!(err, FrameError::UnknownCommand(ref c) if c == "HELLO"));
    }

    #[test]
    fn bad_escape_rejected() {
        let err = parse("MESSAGE\ndestination:/topic/\\x\n\n\0").unwrap_err();
        assert!(matches!(err, FrameError::MalformedHeader(_)));
    }

    #[test]
    fn heartbeat_negotiation_takes_slower_side() {
        let client = HeartBeat::new(4000, 4000);
        assert_eq!(
            HeartBeat::negotiate(client, HeartBeat::new(10000, 10000)),
            HeartBeat::new(10000, 10000)
        );
        assert_eq!(
            HeartBeat::negotiate(client, HeartBeat::new(0, 0)),
            HeartBeat::new(0, 0)
        );
        assert_eq!(
            HeartBeat::negotiate(client, HeartBeat::new(1000, 0)),
            HeartBeat::new(0, 4000)
        );
    }
}
