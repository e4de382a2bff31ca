//! Decode Result Codes
//!
//! The closed set of outcomes every session operation reports to its caller.

/// Result of a session operation.
///
/// Integer-backed so hosts on the other side of a language boundary see
/// stable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DecodeResult {
    /// The requested path (e.g. secure decode) is not available
    Unsupported = -2,
    /// Configuration or lookup failure outside the decode loop
    OtherError = -1,
    Ok = 0,
    /// The engine rejected input or failed to produce a picture
    DecodeError = 1,
    /// The engine needs more input (or polling) before it can produce output
    TryAgain = 3,
    /// No more pictures will be produced for this stream
    EndOfStream = 4,
    /// The output buffer could not be sized for the picture; drop the frame
    OutputAllocationFailed = 5,
}

impl DecodeResult {
    /// Raw integer code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parse a raw integer code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(DecodeResult::Unsupported),
            -1 => Some(DecodeResult::OtherError),
            0 => Some(DecodeResult::Ok),
            1 => Some(DecodeResult::DecodeError),
            3 => Some(DecodeResult::TryAgain),
            4 => Some(DecodeResult::EndOfStream),
            5 => Some(DecodeResult::OutputAllocationFailed),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == DecodeResult::Ok
    }

    /// Whether the caller should treat this as a failure of the stream
    /// (as opposed to a transient, terminal, or dropped-frame outcome).
    pub fn is_error(self) -> bool {
        matches!(
            self,
            DecodeResult::Unsupported | DecodeResult::OtherError | DecodeResult::DecodeError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeResult::Unsupported => "unsupported",
            DecodeResult::OtherError => "other-error",
            DecodeResult::Ok => "ok",
            DecodeResult::DecodeError => "decode-error",
            DecodeResult::TryAgain => "try-again",
            DecodeResult::EndOfStream => "end-of-stream",
            DecodeResult::OutputAllocationFailed => "output-allocation-failed",
        }
    }
}

impl std::fmt::Display for DecodeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DecodeResult> for i32 {
    fn from(result: DecodeResult) -> i32 {
        result.code()
    }
}
