//! Waveform refresh modes
//!
//! Each mode selects a hardware waveform, trading refresh speed against image
//! quality and ghosting.
//!
//! | Mode    | Id | Levels | Clears ghosting | Typical use            |
//! |---------|----|--------|-----------------|------------------------|
//! | INIT    | 0  | 16     | yes             | blanking to white      |
//! | DU      | 1  | 2      | no              | fast text, menus       |
//! | GC16    | 2  | 16     | yes             | images, page turns     |
//! | GL16    | 3  | 16     | no              | text on white          |
//! | A2      | 4  | 2      | no              | animation, scrolling   |
//! | FULL    | 5  | 16     | yes             | anti-ghosting refresh  |
//! | PARTIAL | 6  | 16     | no              | incremental updates    |

use crate::error::Error;

/// Refresh (waveform) mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RefreshMode {
    /// Initialization waveform, drives the panel to white
    Init = 0,
    /// Direct update, black and white only, no flashing
    Du = 1,
    /// Grayscale clearing, 16 levels (default quality mode)
    #[default]
    Gc16 = 2,
    /// Grayscale, 16 levels, reduced flashing
    Gl16 = 3,
    /// Animation mode, black and white only, fastest
    A2 = 4,
    /// Full refresh waveform
    Full = 5,
    /// Partial refresh waveform
    Partial = 6,
}

impl RefreshMode {
    /// All modes in waveform-id order
    pub const ALL: [Self; 7] = [
        Self::Init,
        Self::Du,
        Self::Gc16,
        Self::Gl16,
        Self::A2,
        Self::Full,
        Self::Partial,
    ];

    /// Hardware waveform identifier
    pub fn waveform_id(self) -> u8 {
        self as u8
    }

    /// Look up a mode by its waveform identifier
    pub fn from_waveform_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Short upper-case name, as used on the command line
    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Du => "DU",
            Self::Gc16 => "GC16",
            Self::Gl16 => "GL16",
            Self::A2 => "A2",
            Self::Full => "FULL",
            Self::Partial => "PARTIAL",
        }
    }

    /// Number of gray levels the waveform can settle on
    pub fn grayscale_levels(self) -> u8 {
        match self {
            Self::Du | Self::A2 => 2,
            _ => 16,
        }
    }

    /// Whether refreshing with this waveform removes accumulated ghosting
    pub fn clears_ghosting(self) -> bool {
        matches!(self, Self::Init | Self::Gc16 | Self::Full)
    }
}

impl core::fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for RefreshMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::from_waveform_id)
            .ok_or(Error::InvalidMode { requested: value })
    }
}

impl core::str::FromStr for RefreshMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownModeName(s.to_owned()))
    }
}
