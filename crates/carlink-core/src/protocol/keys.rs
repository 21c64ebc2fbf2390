//! Named key codes understood by the phone side of the dongle.
//!
//! Key events travel as a bare little-endian `u32` inside a CarPlay (0x08)
//! frame.  Any integer is accepted on the wire; the constants here only give
//! the common ones a name so the console and configuration can refer to them.

/// A key code forwarded to the phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub const SIRI: KeyCode = KeyCode(5);
    pub const LEFT: KeyCode = KeyCode(100);
    pub const RIGHT: KeyCode = KeyCode(101);
    pub const SELECT_DOWN: KeyCode = KeyCode(104);
    pub const SELECT_UP: KeyCode = KeyCode(105);
    pub const BACK: KeyCode = KeyCode(106);
    pub const DOWN: KeyCode = KeyCode(114);
    pub const HOME: KeyCode = KeyCode(200);
    pub const PLAY: KeyCode = KeyCode(201);
    pub const PAUSE: KeyCode = KeyCode(202);
    pub const NEXT_TRACK: KeyCode = KeyCode(204);
    pub const PREV_TRACK: KeyCode = KeyCode(205);

    const NAMED: [(&'static str, KeyCode); 12] = [
        ("siri", Self::SIRI),
        ("left", Self::LEFT),
        ("right", Self::RIGHT),
        ("selectdown", Self::SELECT_DOWN),
        ("selectup", Self::SELECT_UP),
        ("back", Self::BACK),
        ("down", Self::DOWN),
        ("home", Self::HOME),
        ("play", Self::PLAY),
        ("pause", Self::PAUSE),
        ("next", Self::NEXT_TRACK),
        ("prev", Self::PREV_TRACK),
    ];

    /// Looks up a key by its case-insensitive name.
    ///
    /// Underscores and dashes are ignored, so `select-down`, `SELECT_DOWN`
    /// and `selectdown` all resolve to [`KeyCode::SELECT_DOWN`].
    pub fn from_name(name: &str) -> Option<KeyCode> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == normalized)
            .map(|(_, code)| *code)
    }

    /// Returns the canonical name for a well-known code.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(_, code)| *code == self)
            .map(|(n, _)| *n)
    }
}

impl From<u32> for KeyCode {
    fn from(value: u32) -> Self {
        KeyCode(value)
    }
}

impl From<KeyCode> for u32 {
    fn from(value: KeyCode) -> Self {
        value.0
    }
}
