//! Payload formatting.
//!
//! Converts raw characteristic payloads into the timestamped, human-readable
//! lines delivered through [`SessionEvent::DataReceived`](crate::events::SessionEvent).

/// How a payload reached the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadKind {
    /// An explicit characteristic read.
    Read,
    /// A peripheral-initiated notification or indication.
    Notification,
    /// A polling-fallback read.
    Polled,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "Read"),
            Self::Notification => write!(f, "Notification"),
            Self::Polled => write!(f, "Polled"),
        }
    }
}

/// Current wall-clock time as `HH:MM:SS`.
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Format a payload as a timestamped line.
///
/// Valid UTF-8 renders as `[HH:MM:SS] <Kind>: '<text>'\n`; anything else
/// falls back to `[HH:MM:SS] <Kind> (hex): <aa bb cc>\n` with lowercase
/// space-separated hex bytes.
pub fn format_payload(data: &[u8], kind: PayloadKind) -> String {
    render(&timestamp(), data, kind)
}

fn render(timestamp: &str, data: &[u8], kind: PayloadKind) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => format!("[{timestamp}] {kind}: '{text}'\n"),
        Err(_) => {
            let hex = data
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            format!("[{timestamp}] {kind} (hex): {hex}\n")
        }
    }
}
