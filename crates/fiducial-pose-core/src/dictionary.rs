//! Predefined ArUco dictionary selection.
//!
//! Only metadata lives here; the bit patterns belong to whichever detector
//! backend is in use.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned for a dictionary id or name outside the predefined set.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown dictionary `{0}` (expected 0..=16 or a DICT_* name)")]
pub struct UnknownDictionary(pub String);

/// The 17 predefined dictionaries, numbered as in OpenCV's
/// `PREDEFINED_DICTIONARY_NAME`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum PredefinedDictionary {
    DICT_4X4_50 = 0,
    DICT_4X4_100 = 1,
    DICT_4X4_250 = 2,
    DICT_4X4_1000 = 3,
    DICT_5X5_50 = 4,
    DICT_5X5_100 = 5,
    DICT_5X5_250 = 6,
    DICT_5X5_1000 = 7,
    DICT_6X6_50 = 8,
    DICT_6X6_100 = 9,
    DICT_6X6_250 = 10,
    DICT_6X6_1000 = 11,
    DICT_7X7_50 = 12,
    DICT_7X7_100 = 13,
    DICT_7X7_250 = 14,
    DICT_7X7_1000 = 15,
    DICT_ARUCO_ORIGINAL = 16,
}

impl PredefinedDictionary {
    pub const ALL: [PredefinedDictionary; 17] = [
        Self::DICT_4X4_50,
        Self::DICT_4X4_100,
        Self::DICT_4X4_250,
        Self::DICT_4X4_1000,
        Self::DICT_5X5_50,
        Self::DICT_5X5_100,
        Self::DICT_5X5_250,
        Self::DICT_5X5_1000,
        Self::DICT_6X6_50,
        Self::DICT_6X6_100,
        Self::DICT_6X6_250,
        Self::DICT_6X6_1000,
        Self::DICT_7X7_50,
        Self::DICT_7X7_100,
        Self::DICT_7X7_250,
        Self::DICT_7X7_1000,
        Self::DICT_ARUCO_ORIGINAL,
    ];

    /// Numeric id used on the command line and by OpenCV.
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::DICT_4X4_50 => "DICT_4X4_50",
            Self::DICT_4X4_100 => "DICT_4X4_100",
            Self::DICT_4X4_250 => "DICT_4X4_250",
            Self::DICT_4X4_1000 => "DICT_4X4_1000",
            Self::DICT_5X5_50 => "DICT_5X5_50",
            Self::DICT_5X5_100 => "DICT_5X5_100",
            Self::DICT_5X5_250 => "DICT_5X5_250",
            Self::DICT_5X5_1000 => "DICT_5X5_1000",
            Self::DICT_6X6_50 => "DICT_6X6_50",
            Self::DICT_6X6_100 => "DICT_6X6_100",
            Self::DICT_6X6_250 => "DICT_6X6_250",
            Self::DICT_6X6_1000 => "DICT_6X6_1000",
            Self::DICT_7X7_50 => "DICT_7X7_50",
            Self::DICT_7X7_100 => "DICT_7X7_100",
            Self::DICT_7X7_250 => "DICT_7X7_250",
            Self::DICT_7X7_1000 => "DICT_7X7_1000",
            Self::DICT_ARUCO_ORIGINAL => "DICT_ARUCO_ORIGINAL",
        }
    }

    /// Inner bits per marker side.
    pub fn marker_size(self) -> usize {
        match self.id() {
            0..=3 => 4,
            4..=7 => 5,
            8..=11 => 6,
            12..=15 => 7,
            _ => 5,
        }
    }

    /// Number of distinct marker ids in the dictionary.
    pub fn capacity(self) -> u32 {
        match self {
            Self::DICT_ARUCO_ORIGINAL => 1024,
            _ => [50, 100, 250, 1000][usize::from(self.id() % 4)],
        }
    }
}

impl Default for PredefinedDictionary {
    fn default() -> Self {
        Self::DICT_6X6_50
    }
}

impl fmt::Display for PredefinedDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for PredefinedDictionary {
    type Error = UnknownDictionary;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| UnknownDictionary(id.to_string()))
    }
}

impl From<PredefinedDictionary> for u8 {
    fn from(dict: PredefinedDictionary) -> Self {
        dict.id()
    }
}

/// Accepts either the numeric id (`"8"`) or the name (`"DICT_6X6_50"`).
impl FromStr for PredefinedDictionary {
    type Err = UnknownDictionary;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u8>() {
            return Self::try_from(id);
        }
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownDictionary(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_declaration_order() {
        for (i, dict) in PredefinedDictionary::ALL.iter().enumerate() {
            assert_eq!(usize::from(dict.id()), i);
            assert_eq!(PredefinedDictionary::from_id(i as u8), Some(*dict));
        }
        assert_eq!(PredefinedDictionary::from_id(17), None);
    }

    #[test]
    fn parses_numbers_and_names() {
        assert_eq!(
            "8".parse::<PredefinedDictionary>(),
            Ok(PredefinedDictionary::DICT_6X6_50)
        );
        assert_eq!(
            "dict_aruco_original".parse::<PredefinedDictionary>(),
            Ok(PredefinedDictionary::DICT_ARUCO_ORIGINAL)
        );
        assert!("17".parse::<PredefinedDictionary>().is_err());
        assert!("DICT_9X9_50".parse::<PredefinedDictionary>().is_err());
    }

    #[test]
    fn metadata() {
        let d = PredefinedDictionary::DICT_5X5_250;
        assert_eq!(d.marker_size(), 5);
        assert_eq!(d.capacity(), 250);
        assert_eq!(PredefinedDictionary::DICT_7X7_1000.capacity(), 1000);
        assert_eq!(PredefinedDictionary::DICT_ARUCO_ORIGINAL.capacity(), 1024);
    }

    #[test]
    fn serde_uses_numeric_id() {
        let json = serde_json::to_string(&PredefinedDictionary::DICT_4X4_250).expect("ser");
        assert_eq!(json, "2");
        let back: PredefinedDictionary = serde_json::from_str("16").expect("de");
        assert_eq!(back, PredefinedDictionary::DICT_ARUCO_ORIGINAL);
        assert!(serde_json::from_str::<PredefinedDictionary>("42").is_err());
    }
}
