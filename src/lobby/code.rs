use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a shareable lobby code
pub const LOBBY_CODE_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Short human-shareable lobby identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyCode(String);

impl LobbyCode {
    /// Normalize user input (trim, upper-case).
    ///
    /// No validation happens here; an unknown code simply fails lookup.
    pub fn normalize(input: &str) -> Self {
        Self(input.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LobbyCode {
    fn from(value: &str) -> Self {
        Self::normalize(value)
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn random_code<R: Rng + ?Sized>(rng: &mut R) -> LobbyCode {
    let code: String = (0..LOBBY_CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    LobbyCode(code)
}

/// Draw codes until one is not taken
pub fn generate_unique<R, F>(rng: &mut R, is_taken: F) -> LobbyCode
where
    R: Rng + ?Sized,
    F: Fn(&LobbyCode) -> bool,
{
    loop {
        let code = random_code(rng);
        if !is_taken(&code) {
            return code;
        }
    }
}
