//! The osu! gamemodes. Replay normalization (§4.9) is std (`Osu`)-only; the
//! other variants exist so a loader can recognise and discard non-std
//! replay data rather than silently misinterpreting it.

/// A gamemode a replay or beatmap was recorded/set in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    /// osu!standard.
    Osu = 0,
    /// osu!taiko.
    Taiko = 1,
    /// osu!catch.
    Catch = 2,
    /// osu!mania.
    Mania = 3,
}

impl Mode {
    /// Whether this is the only gamemode the replay-analysis core supports.
    pub fn is_std(&self) -> bool {
        matches!(self, Mode::Osu)
    }
}
