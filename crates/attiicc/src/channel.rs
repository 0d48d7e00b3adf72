//! Acquisition channels and per-channel parameters.
//!
//! Channel identity is encoded in directory names by a trailing `d0`/`d1`/`d2`
//! suffix. The same suffix selects preprocessing parameters, names the
//! intensity column of a loaded table and picks the classification threshold.

use std::fmt;
use std::path::Path;

/// One of the three fluorescence/imaging channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    D0,
    D1,
    D2,
}

impl Channel {
    /// All channels in suffix order.
    pub const ALL: [Channel; 3] = [Channel::D0, Channel::D1, Channel::D2];

    /// Directory/column suffix for this channel.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::D0 => "d0",
            Self::D1 => "d1",
            Self::D2 => "d2",
        }
    }

    /// Parse a bare suffix (`"d1"`).
    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "d0" => Some(Self::D0),
            "d1" => Some(Self::D1),
            "d2" => Some(Self::D2),
            _ => None,
        }
    }

    /// Channel encoded by a directory name ending in `d0`/`d1`/`d2`.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| name.ends_with(c.suffix()))
    }

    /// Channel of the last component of `dir`, if it carries a suffix.
    pub fn from_dir(dir: &Path) -> Option<Self> {
        dir.file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_dir_name)
    }

    /// Name of the mean-intensity column for this channel.
    pub fn intensity_column(self) -> String {
        format!("mean_intensity_{}", self.suffix())
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::D0 => 0,
            Self::D1 => 1,
            Self::D2 => 2,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_suffix(s.trim())
            .ok_or_else(|| format!("unknown channel '{}' (expected d0, d1 or d2)", s))
    }
}

/// One value per channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ChannelParams<T> {
    pub d0: T,
    pub d1: T,
    pub d2: T,
}

impl<T: Copy> ChannelParams<T> {
    pub fn new(d0: T, d1: T, d2: T) -> Self {
        Self { d0, d1, d2 }
    }

    pub fn splat(v: T) -> Self {
        Self { d0: v, d1: v, d2: v }
    }

    pub fn get(&self, channel: Channel) -> T {
        match channel {
            Channel::D0 => self.d0,
            Channel::D1 => self.d1,
            Channel::D2 => self.d2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_round_trips() {
        for c in Channel::ALL {
            assert_eq!(Channel::from_suffix(c.suffix()), Some(c));
            assert_eq!(c.to_string().parse::<Channel>(), Ok(c));
        }
        assert!("d3".parse::<Channel>().is_err());
    }

    #[test]
    fn dir_name_suffix_selects_channel() {
        assert_eq!(Channel::from_dir_name("field01d1"), Some(Channel::D1));
        assert_eq!(Channel::from_dir(Path::new("/data/f02_d2")), Some(Channel::D2));
        assert_eq!(Channel::from_dir_name("masks"), None);
    }

    #[test]
    fn params_pick_by_channel() {
        let p = ChannelParams::new(1.0, 2.0, 3.0);
        assert_eq!(p.get(Channel::D1), 2.0);
        assert_eq!(ChannelParams::splat(4.0).get(Channel::D2), 4.0);
        assert_eq!(Channel::D2.intensity_column(), "mean_intensity_d2");
    }
}
