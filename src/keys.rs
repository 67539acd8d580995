//! Keys/buttons pressed during a replay frame.

bitflags! {
    /// Keys and mouse buttons a player can hold during a frame.
    #[derive(Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct Key: u32 {
        /// First mouse button.
        const M1 = 1;
        /// Second mouse button.
        const M2 = 2;
        /// First keyboard button.
        const K1 = 4;
        /// Second keyboard button.
        const K2 = 8;
        /// Smoke button.
        const SMOKE = 16;
    }
}

/// The bits that count towards a keydown for notelock/judgment purposes.
/// `K1` implies `M1` and `K2` implies `M2` in the actual game input, so
/// masking to just the mouse-button bits avoids double-counting a single
/// physical press as two keydowns.
pub const KEY_MASK: Key = Key {
    bits: Key::M1.bits | Key::M2.bits,
};
