//! The osu! mod bitset: parsing, formatting, and canonical decomposition.
//!
//! Two flags are "composite" in the sense that the game only ever sets them
//! alongside another bit: Nightcore is really `DoubleTime | _Nightcore`, and
//! Perfect is really `SuddenDeath | _Perfect`. [`Mods::NC`] and [`Mods::PF`]
//! are defined as those unions so callers rarely need to think about the
//! underlying bits; [`Mods::_NIGHTCORE`] and [`Mods::_PERFECT`] are exposed
//! for the rare caller that needs to distinguish them.

use std::fmt;

bitflags! {
    /// A set of osu! gameplay modifiers.
    #[derive(Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct Mods: u32 {
        /// No mods selected.
        const NONE = 0;
        /// No Fail.
        const NF = 1 << 0;
        /// Easy.
        const EZ = 1 << 1;
        /// Touch Device.
        const TD = 1 << 2;
        /// Hidden.
        const HD = 1 << 3;
        /// Hard Rock.
        const HR = 1 << 4;
        /// Sudden Death (technical bit; prefer [`Mods::PF`] for the ingame mod).
        const SD = 1 << 5;
        /// Double Time.
        const DT = 1 << 6;
        /// Relax.
        const RX = 1 << 7;
        /// Half Time.
        const HT = 1 << 8;
        /// Nightcore's own bit (technical; never set without [`Mods::DT`] in
        /// practice). Prefer [`Mods::NC`].
        const _NIGHTCORE = 1 << 9;
        /// Flashlight.
        const FL = 1 << 10;
        /// Autoplay.
        const AT = 1 << 11;
        /// Spun Out.
        const SO = 1 << 12;
        /// Autopilot.
        const AP = 1 << 13;
        /// Perfect's own bit (technical; never set without [`Mods::SD`] in
        /// practice). Prefer [`Mods::PF`].
        const _PERFECT = 1 << 14;
        /// 4 Key.
        const K4 = 1 << 15;
        /// 5 Key.
        const K5 = 1 << 16;
        /// 6 Key.
        const K6 = 1 << 17;
        /// 7 Key.
        const K7 = 1 << 18;
        /// 8 Key.
        const K8 = 1 << 19;
        /// Fade In.
        const FI = 1 << 20;
        /// Random.
        const RD = 1 << 21;
        /// Cinema.
        const CN = 1 << 22;
        /// Target Practice.
        const TP = 1 << 23;
        /// 9 Key.
        const K9 = 1 << 24;
        /// Key Coop.
        const CO = 1 << 25;
        /// 1 Key.
        const K1 = 1 << 26;
        /// 3 Key.
        const K3 = 1 << 27;
        /// 2 Key.
        const K2 = 1 << 28;
        /// Score V2.
        const V2 = 1 << 29;
        /// Mirror.
        const MR = 1 << 30;

        /// Nightcore as the game actually sets it: Double Time + its own bit.
        const NC = Self::_NIGHTCORE.bits | Self::DT.bits;
        /// Perfect as the game actually sets it: Sudden Death + its own bit.
        const PF = Self::_PERFECT.bits | Self::SD.bits;

        /// All key-count mods.
        const KEY_MOD = Self::K1.bits | Self::K2.bits | Self::K3.bits | Self::K4.bits
            | Self::K5.bits | Self::K6.bits | Self::K7.bits | Self::K8.bits
            | Self::K9.bits | Self::CO.bits;

        /// Common combination: Hidden + Double Time.
        const HDDT = Self::HD.bits | Self::DT.bits;
        /// Common combination: Hidden + Hard Rock.
        const HDHR = Self::HD.bits | Self::HR.bits;
        /// Common combination: Hidden + Double Time + Hard Rock.
        const HDDTHR = Self::HD.bits | Self::DT.bits | Self::HR.bits;
    }
}

/// The order mods are listed in when displayed as a combination, e.g.
/// `HDDTHR` rather than `DTHRHD`. Mirrors how the game itself orders mod
/// icons, not alphabetical or bit order.
const ORDER: &[Mods] = &[
    Mods::NONE,
    Mods::EZ,
    Mods::HD,
    Mods::HT,
    Mods::DT,
    Mods::_NIGHTCORE,
    Mods::HR,
    Mods::FL,
    Mods::NF,
    Mods::SD,
    Mods::_PERFECT,
    Mods::RX,
    Mods::AP,
    Mods::SO,
    Mods::AT,
    Mods::V2,
    Mods::TD,
    Mods::FI,
    Mods::RD,
    Mods::CN,
    Mods::TP,
    Mods::K1,
    Mods::K2,
    Mods::K3,
    Mods::K4,
    Mods::K5,
    Mods::K6,
    Mods::K7,
    Mods::K8,
    Mods::K9,
    Mods::CO,
    Mods::MR,
];

fn short_name_of(single: Mods) -> &'static str {
    match single {
        Mods::NONE => "NM",
        Mods::NF => "NF",
        Mods::EZ => "EZ",
        Mods::TD => "TD",
        Mods::HD => "HD",
        Mods::HR => "HR",
        Mods::SD => "SD",
        Mods::DT => "DT",
        Mods::RX => "RX",
        Mods::HT => "HT",
        Mods::_NIGHTCORE => "NC",
        Mods::FL => "FL",
        Mods::AT => "AT",
        Mods::SO => "SO",
        Mods::AP => "AP",
        Mods::_PERFECT => "PF",
        Mods::K4 => "K4",
        Mods::K5 => "K5",
        Mods::K6 => "K6",
        Mods::K7 => "K7",
        Mods::K8 => "K8",
        Mods::FI => "FI",
        Mods::RD => "RD",
        Mods::CN => "CN",
        Mods::TP => "TP",
        Mods::K9 => "K9",
        Mods::CO => "CO",
        Mods::K1 => "K1",
        Mods::K3 => "K3",
        Mods::K2 => "K2",
        Mods::V2 => "V2",
        Mods::MR => "MR",
        _ => "",
    }
}

fn long_name_of(single: Mods) -> &'static str {
    match single {
        Mods::NONE => "NoMod",
        Mods::NF => "NoFail",
        Mods::EZ => "Easy",
        Mods::TD => "TouchDevice",
        Mods::HD => "Hidden",
        Mods::HR => "HardRock",
        Mods::SD => "SuddenDeath",
        Mods::DT => "DoubleTime",
        Mods::RX => "Relax",
        Mods::HT => "HalfTime",
        Mods::_NIGHTCORE => "Nightcore",
        Mods::FL => "Flashlight",
        Mods::AT => "Autoplay",
        Mods::SO => "SpunOut",
        Mods::AP => "Autopilot",
        Mods::_PERFECT => "Perfect",
        Mods::K4 => "Key4",
        Mods::K5 => "Key5",
        Mods::K6 => "Key6",
        Mods::K7 => "Key7",
        Mods::K8 => "Key8",
        Mods::FI => "FadeIn",
        Mods::RD => "Random",
        Mods::CN => "Cinema",
        Mods::TP => "Target",
        Mods::K9 => "Key9",
        Mods::CO => "KeyCoop",
        Mods::K1 => "Key1",
        Mods::K3 => "Key3",
        Mods::K2 => "Key2",
        Mods::V2 => "ScoreV2",
        Mods::MR => "Mirror",
        _ => "",
    }
}

impl Mods {
    /// Splits this set into its single-bit components, ordered per
    /// [`ORDER`]. When `clean` is true, drops `DT` if `NC`'s own bit is also
    /// present and `SD` if `PF`'s own bit is also present, since those pairs
    /// are always shown to the user as the single combined mod.
    pub fn decompose(self, clean: bool) -> Vec<Mods> {
        let mut mods: Vec<Mods> = ORDER.iter().copied().filter(|&m| self.contains(m)).collect();
        if clean {
            if mods.contains(&Mods::_NIGHTCORE) {
                mods.retain(|&m| m != Mods::DT);
            }
            if mods.contains(&Mods::_PERFECT) {
                mods.retain(|&m| m != Mods::SD);
            }
        }
        mods
    }

    /// The acronym-ized name of this mod set, e.g. `"HDHR"` or `"NC"`.
    ///
    /// A set matching exactly one table entry (including the composite `NC`
    /// and `PF`) is looked up directly; anything else is decomposed
    /// (cleanly) and its components' short names are concatenated.
    pub fn short_name(self) -> String {
        if let Some(&single) = ORDER.iter().find(|&&m| m == self) {
            return short_name_of(single).to_string();
        }
        if self == Mods::NC {
            return "NC".to_string();
        }
        if self == Mods::PF {
            return "PF".to_string();
        }
        self.decompose(true)
            .into_iter()
            .map(short_name_of)
            .collect()
    }

    /// The spelled-out name of this mod set, e.g. `"Hidden HardRock"`.
    pub fn long_name(self) -> String {
        if let Some(&single) = ORDER.iter().find(|&&m| m == self) {
            return long_name_of(single).to_string();
        }
        if self == Mods::NC {
            return "Nightcore".to_string();
        }
        if self == Mods::PF {
            return "Perfect".to_string();
        }
        self.decompose(true)
            .into_iter()
            .map(long_name_of)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parses a string of concatenated two-letter mod tokens, e.g. `"HDHR"`
    /// or `"NC"` (which parses to `DT|_NIGHTCORE`). Rejects empty or
    /// odd-length strings and unrecognized tokens.
    pub fn parse(s: &str) -> Result<Mods, ParseModError> {
        if s.is_empty() {
            return Err(ParseModError::Empty);
        }
        let chars: Vec<char> = s.chars().collect();
        if chars.len() % 2 != 0 {
            return Err(ParseModError::OddLength(s.to_string()));
        }

        let mut value = Mods::NONE;
        for chunk in chars.chunks(2) {
            let token: String = chunk.iter().collect::<String>().to_uppercase();
            let single = ORDER
                .iter()
                .copied()
                .find(|&m| short_name_of(m) == token)
                .ok_or_else(|| ParseModError::UnknownToken(token.clone()))?;
            let resolved = match single {
                Mods::_NIGHTCORE => Mods::NC,
                Mods::_PERFECT => Mods::PF,
                other => other,
            };
            value |= resolved;
        }
        Ok(value)
    }
}

impl fmt::Display for Mods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Error parsing a mod string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseModError {
    /// The mod string was empty.
    #[error("mod string cannot be empty")]
    Empty,
    /// The mod string had an odd number of characters, so it can't be split
    /// into two-letter tokens.
    #[error("mod string {0:?} is not of even length")]
    OddLength(String),
    /// A two-letter token didn't match any known mod.
    #[error("no mod matches token {0:?}")]
    UnknownToken(String),
}

/// Returns every combination of `required` with some subset of `optional`
/// independently present or absent (the powerset of `optional`, each unioned
/// with `required`). Useful when mods aren't known exactly but one wants to
/// try every plausible combination, e.g. when looking up a score by mods.
pub fn fuzzy_mods(required: Mods, optional: &[Mods]) -> Vec<Mods> {
    let mut combos = vec![required];
    for &opt in optional {
        let mut next = Vec::with_capacity(combos.len() * 2);
        for &combo in &combos {
            next.push(combo);
            next.push(combo | opt);
        }
        combos = next;
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nc_is_dt_plus_nightcore_bit() {
        assert_eq!(Mods::NC, Mods::DT | Mods::_NIGHTCORE);
    }

    #[test]
    fn pf_is_sd_plus_perfect_bit() {
        assert_eq!(Mods::PF, Mods::SD | Mods::_PERFECT);
    }

    #[test]
    fn decompose_clean_drops_dt_when_nc_present() {
        let components = Mods::NC.decompose(true);
        assert!(components.contains(&Mods::_NIGHTCORE));
        assert!(!components.contains(&Mods::DT));
    }

    #[test]
    fn decompose_clean_drops_sd_when_pf_present() {
        let components = Mods::PF.decompose(true);
        assert!(components.contains(&Mods::_PERFECT));
        assert!(!components.contains(&Mods::SD));
    }

    #[test]
    fn decompose_orders_canonically() {
        // HR is set before HD in bit order, but ORDER puts HD first.
        let components = (Mods::HR | Mods::HD).decompose(false);
        assert_eq!(components, vec![Mods::HD, Mods::HR]);
    }

    #[test]
    fn short_name_round_trips_combo() {
        assert_eq!((Mods::HD | Mods::HR).short_name(), "HDHR");
    }

    #[test]
    fn parse_nc_yields_dt_and_nightcore_bit() {
        assert_eq!(Mods::parse("NC").unwrap(), Mods::DT | Mods::_NIGHTCORE);
    }

    #[test]
    fn parse_pf_yields_sd_and_perfect_bit() {
        assert_eq!(Mods::parse("PF").unwrap(), Mods::SD | Mods::_PERFECT);
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(Mods::parse(""), Err(ParseModError::Empty));
    }

    #[test]
    fn parse_rejects_odd_length() {
        assert!(matches!(Mods::parse("HDD"), Err(ParseModError::OddLength(_))));
    }

    #[test]
    fn parse_rejects_unknown_token() {
        assert!(matches!(Mods::parse("ZZ"), Err(ParseModError::UnknownToken(_))));
    }

    #[test]
    fn parse_combo() {
        assert_eq!(Mods::parse("HDHR").unwrap(), Mods::HD | Mods::HR);
    }

    #[test]
    fn fuzzy_mods_is_powerset_unioned_with_required() {
        let combos = fuzzy_mods(Mods::HD, &[Mods::DT, Mods::HR]);
        assert_eq!(combos.len(), 4);
        assert!(combos.contains(&Mods::HD));
        assert!(combos.contains(&(Mods::HD | Mods::DT)));
        assert!(combos.contains(&(Mods::HD | Mods::HR)));
        assert!(combos.contains(&(Mods::HD | Mods::DT | Mods::HR)));
    }

    use proptest::prelude::*;
    use proptest::proptest;

    proptest! {
        #[test]
        fn decompose_clean_never_pairs_the_technical_bits(bits: u32) {
            let mods = Mods::from_bits_truncate(bits);
            let components = mods.decompose(true);
            prop_assert!(!(components.contains(&Mods::DT) && components.contains(&Mods::_NIGHTCORE)));
            prop_assert!(!(components.contains(&Mods::SD) && components.contains(&Mods::_PERFECT)));
        }

        #[test]
        fn decompose_canonicalizes_order_regardless_of_bit_order(bits: u32) {
            let mods = Mods::from_bits_truncate(bits);
            let forward = mods.decompose(false);
            let by_order_index: Vec<usize> = forward
                .iter()
                .map(|m| ORDER.iter().position(|o| o == m).unwrap())
                .collect();
            let mut sorted = by_order_index.clone();
            sorted.sort_unstable();
            prop_assert_eq!(by_order_index, sorted);
        }
    }
}
