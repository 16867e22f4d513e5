/// Startup enumeration of mounted volumes.
///
/// Notifications only report changes, so the host seeds its view with the
/// volumes already present. `GetLogicalDrives` returns the same 26-bit mask
/// as a volume notification and is resolved with the same code. Each drive's
/// type and readiness are queried; labels and filesystem names are not read.
use crate::device::{DriveIdentifier, UnitMask};

// Drive type constants from the Windows API.
const DRIVE_NO_ROOT_DIR_VAL: u32 = 1;
const DRIVE_REMOVABLE_VAL: u32 = 2;
const DRIVE_FIXED_VAL: u32 = 3;
const DRIVE_REMOTE_VAL: u32 = 4;
const DRIVE_CDROM_VAL: u32 = 5;

/// Drive type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    Fixed,
    Removable,
    Network,
    CdRom,
    NoRootDirectory,
    Unknown,
}

impl DriveType {
    /// Classify a `GetDriveTypeW` result.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            DRIVE_FIXED_VAL => Self::Fixed,
            DRIVE_REMOVABLE_VAL => Self::Removable,
            DRIVE_REMOTE_VAL => Self::Network,
            DRIVE_CDROM_VAL => Self::CdRom,
            DRIVE_NO_ROOT_DIR_VAL => Self::NoRootDirectory,
            _ => Self::Unknown,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::Removable => "Removable",
            Self::Network => "Network",
            Self::CdRom => "CDRom",
            Self::NoRootDirectory => "NoRootDirectory",
            Self::Unknown => "Unknown",
        }
    }
}

/// A volume found at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountedDrive {
    pub drive: DriveIdentifier,
    pub drive_type: DriveType,
    /// Media present and the volume answers queries. An empty card-reader
    /// slot is listed by `GetLogicalDrives` but not ready.
    pub ready: bool,
}

/// Pair each drive in `mask` with its type and readiness, in ascending
/// letter order.
pub fn classify_drives(
    mask: UnitMask,
    mut query: impl FnMut(DriveIdentifier) -> (DriveType, bool),
) -> Vec<MountedDrive> {
    mask.drives()
        .map(|drive| {
            let (drive_type, ready) = query(drive);
            MountedDrive {
                drive,
                drive_type,
                ready,
            }
        })
        .collect()
}

/// Enumerate all mounted volumes on the system.
///
/// Returns an empty vec if `GetLogicalDrives` fails (should not happen on
/// any supported Windows version).
#[cfg(windows)]
pub fn enumerate_drives() -> Vec<MountedDrive> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::{
        GetDriveTypeW, GetLogicalDrives, GetVolumeInformationW,
    };

    let bits = unsafe { GetLogicalDrives() };
    if bits == 0 {
        tracing::warn!("GetLogicalDrives returned 0");
        return Vec::new();
    }

    let drives = classify_drives(UnitMask::new(bits), |drive| {
        let root_wide: Vec<u16> = drive
            .root_path()
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();
        let root = PCWSTR(root_wide.as_ptr());
        let raw = unsafe { GetDriveTypeW(root) };
        // No output buffers: only whether the volume answers matters.
        let ready = unsafe { GetVolumeInformationW(root, None, None, None, None, None).is_ok() };
        (DriveType::from_raw(raw), ready)
    });
    tracing::debug!("Enumerated {} mounted drives", drives.len());
    drives
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_type_from_raw() {
        assert_eq!(DriveType::from_raw(2), DriveType::Removable);
        assert_eq!(DriveType::from_raw(3), DriveType::Fixed);
        assert_eq!(DriveType::from_raw(1), DriveType::NoRootDirectory);
        assert_eq!(DriveType::from_raw(0), DriveType::Unknown);
        assert_eq!(DriveType::from_raw(6), DriveType::Unknown);
    }

    #[test]
    fn test_classify_drives_in_letter_order() {
        let mask = UnitMask::from_letters(['E', 'C', 'D']);
        let drives = classify_drives(mask, |d| match d.letter() {
            'C' => (DriveType::Fixed, true),
            'D' => (DriveType::CdRom, false),
            _ => (DriveType::Removable, true),
        });
        let summary: Vec<(String, &str, bool)> = drives
            .iter()
            .map(|m| (m.drive.root_path(), m.drive_type.label(), m.ready))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("C:\\".to_string(), "Fixed", true),
                ("D:\\".to_string(), "CDRom", false),
                ("E:\\".to_string(), "Removable", true),
            ]
        );
    }
}
