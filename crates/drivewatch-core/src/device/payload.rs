/// Payload decoding — turns a raw `WM_DEVICECHANGE` notification into a
/// [`DeviceChangeRecord`].
///
/// The notification consists of the event code (`wParam`) and, for most
/// events, a `DEV_BROADCAST_HDR` block that `lParam` points at. The block is
/// read as little-endian bytes:
///
/// ```text
/// offset  size  field
///      0     4  dbch_size        total size of the block
///      4     4  dbch_devicetype  2 = volume
///      8     4  dbch_reserved
///     12     4  dbcv_unitmask    (volume only)
///     16     2  dbcv_flags       (volume only)
/// ```
///
/// Decoding is pure: every field is copied out, nothing borrowed from the
/// payload survives the call. Anything that is not a volume arrival,
/// remove-complete or query-remove produces no record.
use super::drive::UnitMask;
use super::event::EventKind;
use tracing::debug;

// Event codes (wParam) from dbt.h.
pub const DBT_DEVICEARRIVAL: u32 = 0x8000;
pub const DBT_DEVICEQUERYREMOVE: u32 = 0x8001;
pub const DBT_DEVICEQUERYREMOVEFAILED: u32 = 0x8002;
pub const DBT_DEVICEREMOVEPENDING: u32 = 0x8003;
pub const DBT_DEVICEREMOVECOMPLETE: u32 = 0x8004;
pub const DBT_DEVNODES_CHANGED: u32 = 0x0007;

// Device types (dbch_devicetype).
pub const DBT_DEVTYP_OEM: u32 = 0;
pub const DBT_DEVTYP_VOLUME: u32 = 2;
pub const DBT_DEVTYP_PORT: u32 = 3;
pub const DBT_DEVTYP_DEVICEINTERFACE: u32 = 5;

// Volume flags (dbcv_flags).
const DBTF_MEDIA: u16 = 0x0001;
const DBTF_NET: u16 = 0x0002;

/// Size of `DEV_BROADCAST_HDR`.
pub const HEADER_LEN: usize = 12;
/// Bytes needed to read a `DEV_BROADCAST_VOLUME` (without trailing padding).
pub const VOLUME_LEN: usize = 18;
/// Size the OS reports for `DEV_BROADCAST_VOLUME`, padding included.
pub const VOLUME_STRUCT_LEN: usize = 20;

/// What happened, as far as this engine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    VolumeArrived,
    VolumeRemoved,
    VolumeQueryRemove,
    Other,
}

impl ChangeKind {
    /// Map an event code. Unknown codes are `Other`.
    pub fn from_event_code(code: u32) -> Self {
        match code {
            DBT_DEVICEARRIVAL => Self::VolumeArrived,
            DBT_DEVICEREMOVECOMPLETE => Self::VolumeRemoved,
            DBT_DEVICEQUERYREMOVE => Self::VolumeQueryRemove,
            _ => Self::Other,
        }
    }

    /// The subscriber-facing event kind, if any.
    pub fn event_kind(self) -> Option<EventKind> {
        match self {
            Self::VolumeArrived => Some(EventKind::Arrived),
            Self::VolumeRemoved => Some(EventKind::Removed),
            Self::VolumeQueryRemove => Some(EventKind::QueryRemove),
            Self::Other => None,
        }
    }
}

/// Class of hardware the notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Volume,
    /// Any other `dbch_devicetype` (ports, device interfaces, OEM, ...).
    Other(u32),
}

impl DeviceClass {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            DBT_DEVTYP_VOLUME => Self::Volume,
            other => Self::Other(other),
        }
    }
}

/// `dbcv_flags` of a volume notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeFlags {
    /// The change affects media in the drive, not the drive itself.
    pub media: bool,
    /// The volume is a network volume.
    pub network: bool,
}

impl VolumeFlags {
    pub fn from_raw(raw: u16) -> Self {
        Self {
            media: raw & DBTF_MEDIA != 0,
            network: raw & DBTF_NET != 0,
        }
    }

    pub fn to_raw(self) -> u16 {
        let mut raw = 0;
        if self.media {
            raw |= DBTF_MEDIA;
        }
        if self.network {
            raw |= DBTF_NET;
        }
        raw
    }
}

/// The decoded form of one notification. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceChangeRecord {
    change_kind: ChangeKind,
    device_class: DeviceClass,
    unit_mask: UnitMask,
    flags: VolumeFlags,
}

impl DeviceChangeRecord {
    /// Build a record directly. For non-volume classes the mask is cleared,
    /// since it carries no meaning there.
    pub fn new(change_kind: ChangeKind, device_class: DeviceClass, unit_mask: UnitMask) -> Self {
        let unit_mask = match device_class {
            DeviceClass::Volume => unit_mask,
            DeviceClass::Other(_) => UnitMask::EMPTY,
        };
        Self {
            change_kind,
            device_class,
            unit_mask,
            flags: VolumeFlags::default(),
        }
    }

    /// Shorthand for a volume record.
    pub fn volume(change_kind: ChangeKind, unit_mask: UnitMask) -> Self {
        Self::new(change_kind, DeviceClass::Volume, unit_mask)
    }

    pub fn with_flags(mut self, flags: VolumeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn change_kind(&self) -> ChangeKind {
        self.change_kind
    }

    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    /// Affected drives. Always empty unless the class is `Volume`.
    pub fn unit_mask(&self) -> UnitMask {
        self.unit_mask
    }

    pub fn flags(&self) -> VolumeFlags {
        self.flags
    }
}

/// Decode one notification.
///
/// `event_code` is the `wParam` of `WM_DEVICECHANGE`; `payload` the bytes of
/// the broadcast block (empty when `lParam` was null). Returns `None` for
/// every notification that is not a volume arrival, remove-complete or
/// query-remove, including truncated payloads.
pub fn decode(event_code: u32, payload: &[u8]) -> Option<DeviceChangeRecord> {
    if payload.len() < HEADER_LEN {
        if !payload.is_empty() {
            debug!(
                "Decoder: truncated header ({} bytes) for event {:#06x}",
                payload.len(),
                event_code
            );
        }
        return None;
    }

    let device_type = read_u32(payload, 4)?;
    if DeviceClass::from_raw(device_type) != DeviceClass::Volume {
        debug!(
            "Decoder: ignoring device type {} for event {:#06x}",
            device_type, event_code
        );
        return None;
    }

    let change_kind = ChangeKind::from_event_code(event_code);
    if change_kind == ChangeKind::Other {
        debug!("Decoder: ignoring volume event {:#06x}", event_code);
        return None;
    }

    // dbch_size is advisory; trust only the bytes actually handed to us.
    if payload.len() < VOLUME_LEN {
        debug!(
            "Decoder: truncated volume payload ({} bytes)",
            payload.len()
        );
        return None;
    }

    let unit_mask = UnitMask::new(read_u32(payload, 12)?);
    let flags = VolumeFlags::from_raw(read_u16(payload, 16)?);

    Some(DeviceChangeRecord::volume(change_kind, unit_mask).with_flags(flags))
}

/// Encode a volume broadcast block exactly as the OS lays it out.
///
/// Used to drive the decoder with synthetic notifications.
pub fn encode_volume(unit_mask: UnitMask, flags: VolumeFlags) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(VOLUME_STRUCT_LEN);
    bytes.extend_from_slice(&(VOLUME_STRUCT_LEN as u32).to_le_bytes());
    bytes.extend_from_slice(&DBT_DEVTYP_VOLUME.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&unit_mask.bits().to_le_bytes());
    bytes.extend_from_slice(&flags.to_raw().to_le_bytes());
    bytes.resize(VOLUME_STRUCT_LEN, 0);
    bytes
}

/// Encode a bare header for a non-volume device type.
pub fn encode_header(device_type: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN);
    bytes.extend_from_slice(&(HEADER_LEN as u32).to_le_bytes());
    bytes.extend_from_slice(&device_type.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes
}

/// Read the `dbch_size` field, if the header is present.
pub fn declared_size(header: &[u8]) -> Option<usize> {
    read_u32(header, 0).map(|n| n as usize)
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(raw.try_into().ok()?))
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes(raw.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_arrival() {
        let payload = encode_volume(UnitMask::new(1 << 4), VolumeFlags::default());
        let record = decode(DBT_DEVICEARRIVAL, &payload).expect("volume arrival decodes");
        assert_eq!(record.change_kind(), ChangeKind::VolumeArrived);
        assert_eq!(record.device_class(), DeviceClass::Volume);
        assert_eq!(record.unit_mask().bits(), 1 << 4);
    }

    #[test]
    fn test_decode_event_code_mapping() {
        let payload = encode_volume(UnitMask::new(1), VolumeFlags::default());
        let kind = |code| decode(code, &payload).map(|r| r.change_kind());
        assert_eq!(kind(DBT_DEVICEREMOVECOMPLETE), Some(ChangeKind::VolumeRemoved));
        assert_eq!(kind(DBT_DEVICEQUERYREMOVE), Some(ChangeKind::VolumeQueryRemove));
        assert_eq!(kind(DBT_DEVICEQUERYREMOVEFAILED), None);
        assert_eq!(kind(DBT_DEVICEREMOVEPENDING), None);
        assert_eq!(kind(DBT_DEVNODES_CHANGED), None);
    }

    #[test]
    fn test_non_volume_classes_ignored() {
        for device_type in [DBT_DEVTYP_OEM, DBT_DEVTYP_PORT, DBT_DEVTYP_DEVICEINTERFACE, 6, 99] {
            // Pad out to a full volume-sized block so only the class differs.
            let mut payload = encode_header(device_type);
            payload.extend_from_slice(&[0xFF; 8]);
            for code in [DBT_DEVICEARRIVAL, DBT_DEVICEREMOVECOMPLETE, DBT_DEVICEQUERYREMOVE] {
                assert!(decode(code, &payload).is_none(), "type {device_type} code {code:#x}");
            }
        }
    }

    #[test]
    fn test_truncated_payloads() {
        let full = encode_volume(UnitMask::new(0b11), VolumeFlags::default());
        assert!(decode(DBT_DEVICEARRIVAL, &[]).is_none());
        assert!(decode(DBT_DEVICEARRIVAL, &full[..HEADER_LEN - 1]).is_none());
        assert!(decode(DBT_DEVICEARRIVAL, &full[..VOLUME_LEN - 1]).is_none());
        assert!(decode(DBT_DEVICEARRIVAL, &full[..VOLUME_LEN]).is_some());
    }

    #[test]
    fn test_flags_decoded() {
        let flags = VolumeFlags { media: true, network: false };
        let payload = encode_volume(UnitMask::new(1 << 3), flags);
        let record = decode(DBT_DEVICEARRIVAL, &payload).unwrap();
        assert_eq!(record.flags(), flags);
        assert_eq!(VolumeFlags::from_raw(0x3), VolumeFlags { media: true, network: true });
    }

    #[test]
    fn test_round_trip_b_d_z() {
        let mask = UnitMask::new((1 << 1) | (1 << 3) | (1 << 25));
        let payload = encode_volume(mask, VolumeFlags::default());
        assert_eq!(declared_size(&payload), Some(VOLUME_STRUCT_LEN));
        let record = decode(DBT_DEVICEARRIVAL, &payload).unwrap();
        let roots: Vec<String> = record.unit_mask().drives().map(|d| d.root_path()).collect();
        assert_eq!(roots, vec!["B:\\", "D:\\", "Z:\\"]);
    }

    #[test]
    fn test_decode_does_not_retain_payload() {
        let mut payload = encode_volume(UnitMask::new(1 << 2), VolumeFlags::default());
        let record = decode(DBT_DEVICEARRIVAL, &payload).unwrap();
        payload.iter_mut().for_each(|b| *b = 0);
        drop(payload);
        assert_eq!(record.unit_mask().bits(), 1 << 2);
    }

    #[test]
    fn test_other_class_record_has_empty_mask() {
        let record = DeviceChangeRecord::new(
            ChangeKind::VolumeArrived,
            DeviceClass::Other(DBT_DEVTYP_PORT),
            UnitMask::new(0xFF),
        );
        assert!(record.unit_mask().is_empty());
    }
}
