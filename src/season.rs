use crate::error::TaylorError;
use std::fmt;
use std::str::FromStr;

/// Seasonal aggregations of a monthly climatology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    Ann,
    Djf,
    Jja,
    Mam,
    Son,
}

impl Season {
    pub const ALL: [Season; 5] = [Season::Ann, Season::Djf, Season::Jja, Season::Mam, Season::Son];

    pub fn label(self) -> &'static str {
        match self {
            Season::Ann => "ANN",
            Season::Djf => "DJF",
            Season::Jja => "JJA",
            Season::Mam => "MAM",
            Season::Son => "SON",
        }
    }

    /// Calendar months (1 = January) averaged for this season.
    pub fn months(self) -> &'static [u32] {
        match self {
            Season::Ann => &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
            Season::Djf => &[12, 1, 2],
            Season::Jja => &[6, 7, 8],
            Season::Mam => &[3, 4, 5],
            Season::Son => &[9, 10, 11],
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Season {
    type Err = TaylorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Season::ALL
            .into_iter()
            .find(|season| season.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                TaylorError::Unsupported(format!(
                    "unknown season '{}'; expected one of ANN, DJF, JJA, MAM, SON",
                    s
                ))
            })
    }
}
