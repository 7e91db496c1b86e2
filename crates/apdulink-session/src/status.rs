use std::fmt;

/// Two-byte status word closing every response APDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(pub u16);

impl StatusWord {
    /// Normal processing.
    pub const SUCCESS: StatusWord = StatusWord(0x9000);

    pub fn from_bytes(sw1: u8, sw2: u8) -> Self {
        StatusWord(u16::from_be_bytes([sw1, sw2]))
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn sw1(self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    pub fn sw2(self) -> u8 {
        self.0.to_be_bytes()[1]
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Split a response APDU into its data and trailing status word.
///
/// Returns `None` for responses shorter than two bytes.
pub fn split_status(response: &[u8]) -> Option<(&[u8], StatusWord)> {
    let split = response.len().checked_sub(2)?;
    let (data, sw) = response.split_at(split);
    Some((data, StatusWord::from_bytes(sw[0], sw[1])))
}
