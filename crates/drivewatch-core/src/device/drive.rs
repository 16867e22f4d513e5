/// Drive identifier resolution — expands a volume unit mask into drive letters.
///
/// The OS encodes the volumes touched by one notification as a 26-bit mask:
/// bit 0 is drive A, bit 1 is drive B, ... bit 25 is drive Z.
/// `GetLogicalDrives` uses the same encoding, so startup enumeration reuses
/// this module as well.
use std::fmt;

/// Number of addressable drive letters (A–Z).
pub const DRIVE_SLOTS: u32 = 26;

/// Bits that carry a drive letter. Anything above bit 25 is discarded.
const SLOT_BITS: u32 = (1 << DRIVE_SLOTS) - 1;

/// A set of drive letters encoded as a 26-bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UnitMask(u32);

impl UnitMask {
    /// The mask with no drives set.
    pub const EMPTY: UnitMask = UnitMask(0);

    /// Wrap a raw mask as delivered by the OS, dropping bits above Z.
    pub const fn new(bits: u32) -> Self {
        Self(bits & SLOT_BITS)
    }

    /// Build a mask from drive letters. Characters outside A–Z
    /// (case-insensitive) are ignored.
    pub fn from_letters(letters: impl IntoIterator<Item = char>) -> Self {
        let bits = letters
            .into_iter()
            .filter_map(DriveIdentifier::from_letter)
            .fold(0u32, |acc, drive| acc | (1 << drive.index()));
        Self(bits)
    }

    /// Raw 26-bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of drives in the mask.
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn contains(self, drive: DriveIdentifier) -> bool {
        self.0 & (1 << drive.index()) != 0
    }

    /// Iterate the drives in ascending letter order.
    pub fn drives(self) -> Drives {
        Drives { remaining: self.0 }
    }
}

impl IntoIterator for UnitMask {
    type Item = DriveIdentifier;
    type IntoIter = Drives;

    fn into_iter(self) -> Drives {
        self.drives()
    }
}

/// Iterator over the drives of a [`UnitMask`], lowest bit first.
#[derive(Debug, Clone)]
pub struct Drives {
    remaining: u32,
}

impl Iterator for Drives {
    type Item = DriveIdentifier;

    fn next(&mut self) -> Option<DriveIdentifier> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.remaining.trailing_zeros();
        // Clear the lowest set bit.
        self.remaining &= self.remaining - 1;
        Some(DriveIdentifier(index as u8))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Drives {}

/// Resolve a mask into its drives, one per set bit, in ascending order.
///
/// An empty mask resolves to an empty vec; that is not an error.
pub fn resolve(mask: UnitMask) -> Vec<DriveIdentifier> {
    mask.drives().collect()
}

/// A single drive letter, e.g. `E`.
///
/// Displays as the root path (`E:\`), which is the form handed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DriveIdentifier(u8);

impl DriveIdentifier {
    /// Drive for a bit position in a unit mask. `None` past bit 25.
    pub const fn from_index(index: u32) -> Option<Self> {
        if index < DRIVE_SLOTS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Drive for a letter, case-insensitive. `None` for anything but A–Z.
    pub fn from_letter(letter: char) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        if upper.is_ascii_uppercase() {
            Some(Self(upper as u8 - b'A'))
        } else {
            None
        }
    }

    /// Bit position in a unit mask (A = 0).
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Upper-case drive letter.
    pub const fn letter(self) -> char {
        (b'A' + self.0) as char
    }

    /// Root path with a trailing separator, e.g. `E:\`.
    pub fn root_path(self) -> String {
        format!("{}:\\", self.letter())
    }
}

impl fmt::Display for DriveIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:\\", self.letter())
    }
}
