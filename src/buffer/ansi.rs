//! ANSI escape sequence stripping

/// Where the filter is inside an escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    Escape,
    Csi,
    Osc,
    OscEscape,
    Charset,
}

/// Streaming ANSI stripper.
///
/// Sequences split across reads are carried over, so a prompt preceded by
/// `ESC [ ? 2 0 0 4 h` arriving in two chunks still comes out clean.
#[derive(Debug, Default)]
pub struct AnsiFilter {
    state: State,
}

impl AnsiFilter {
    /// Create a filter in the ground state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter one chunk, returning the printable remainder.
    pub fn feed(&mut self, data: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(data.len());

        for &byte in data {
            self.state = match (self.state, byte) {
                (State::Ground, 0x1b) => State::Escape,
                (State::Ground, _) => {
                    result.push(byte);
                    State::Ground
                }
                (State::Escape, b'[') => State::Csi,
                (State::Escape, b']') => State::Osc,
                (State::Escape, b'(' | b')') => State::Charset,
                // Two-byte sequences such as ESC = or ESC M
                (State::Escape, _) => State::Ground,
                // Final byte of a control sequence
                (State::Csi, 0x40..=0x7e) => State::Ground,
                (State::Csi, _) => State::Csi,
                (State::Osc, 0x07) => State::Ground,
                (State::Osc, 0x1b) => State::OscEscape,
                (State::Osc, _) => State::Osc,
                (State::OscEscape, b'\\') => State::Ground,
                (State::OscEscape, _) => State::Osc,
                (State::Charset, _) => State::Ground,
            };
        }

        result
    }
}

/// Strip ANSI escape sequences from a complete byte slice
pub fn strip_ansi(data: &[u8]) -> Vec<u8> {
    AnsiFilter::new().feed(data)
}
