//! Lines read from stdin while the kiosk runs.
//!
//! A keyboard-wedge scanner or the external decoder writes one decoded code
//! per line. Lines starting with `:` are operator commands.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    /// A decoded barcode.
    Code(String),

    /// `:retry`, operator recovery after a failed dispense.
    Retry,

    /// `:status`, print the current state.
    Status,

    /// `:events`, print the recent event log.
    Events,

    /// `:quit`
    Quit,

    /// A `:` command nobody understands.
    Unknown(String),
}

impl InputLine {
    /// Parse one line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let parsed = match line.strip_prefix(':') {
            Some("retry") => Self::Retry,
            Some("status") => Self::Status,
            Some("events") => Self::Events,
            Some("quit") | Some("exit") => Self::Quit,
            Some(other) => Self::Unknown(other.to_string()),
            None => Self::Code(line.to_string()),
        };
        Some(parsed)
    }
}
