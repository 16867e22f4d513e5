/// Device history — one row per observed arrival or removal, exportable as CSV.
///
/// Rows are only ever appended. The history lives for the process lifetime;
/// nothing is loaded back on the next start.
use crate::config::Identity;
use anyhow::Context;
use chrono::{DateTime, Local};
use drivewatch_core::platform::{DriveType, MountedDrive};
use drivewatch_core::DriveIdentifier;
use serde::{Serialize, Serializer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Format used for timestamps in rows.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format used for the timestamp suffix of export file names.
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Written instead of a table when there is nothing to export.
pub const NO_DEVICES_LINE: &str = "No removable devices available";

/// Whether the row describes a drive that is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceStatus {
    #[serde(rename = "Plugged In")]
    PluggedIn,
    #[serde(rename = "Removed")]
    Removed,
}

impl DeviceStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::PluggedIn => "Plugged In",
            Self::Removed => "Removed",
        }
    }
}

/// One history row. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    #[serde(rename = "USER NAME")]
    pub user_name: String,
    #[serde(rename = "MACHINE NAME")]
    pub machine_name: String,
    /// Root path, e.g. `E:\`.
    #[serde(rename = "DIRECTORY")]
    pub directory: String,
    #[serde(rename = "PLUGGED IN TIME", serialize_with = "serialize_timestamp")]
    pub plugged_in_time: Option<DateTime<Local>>,
    #[serde(rename = "REMOVED TIME", serialize_with = "serialize_timestamp")]
    pub removed_time: Option<DateTime<Local>>,
    #[serde(rename = "PLUGGED IN OR REMOVED")]
    pub status: DeviceStatus,
    #[serde(rename = "DEVICE TYPE")]
    pub device_type: String,
}

fn serialize_timestamp<S: Serializer>(
    value: &Option<DateTime<Local>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(ts) => serializer.collect_str(&ts.format(TIMESTAMP_FORMAT)),
        None => serializer.serialize_str(""),
    }
}

/// Append-only list of [`DeviceRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct DeviceHistory {
    identity: Identity,
    records: Vec<DeviceRecord>,
}

impl DeviceHistory {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record the volumes that were already mounted at startup.
    ///
    /// A drive counts as plugged in when it is ready, or is a fixed or
    /// optical drive; anything else (an empty card-reader slot) is listed as
    /// removed. Only ready removable drives get `now` as plugged-in time.
    pub fn record_mounted(&mut self, mounted: &[MountedDrive], now: DateTime<Local>) {
        for m in mounted {
            let plugged_in_time = (m.ready && m.drive_type == DriveType::Removable).then_some(now);
            let status = if m.ready || matches!(m.drive_type, DriveType::Fixed | DriveType::CdRom) {
                DeviceStatus::PluggedIn
            } else {
                DeviceStatus::Removed
            };
            let record = self.row(m.drive, plugged_in_time, None, status, m.drive_type.label());
            self.records.push(record);
        }
    }

    /// A removable drive arrived.
    pub fn record_arrival(&mut self, drive: DriveIdentifier, now: DateTime<Local>) {
        let record = self.row(
            drive,
            Some(now),
            None,
            DeviceStatus::PluggedIn,
            DriveType::Removable.label(),
        );
        self.records.push(record);
    }

    /// A removable drive was removed.
    pub fn record_removal(&mut self, drive: DriveIdentifier, now: DateTime<Local>) {
        let record = self.row(
            drive,
            None,
            Some(now),
            DeviceStatus::Removed,
            DriveType::Removable.label(),
        );
        self.records.push(record);
    }

    fn row(
        &self,
        drive: DriveIdentifier,
        plugged_in_time: Option<DateTime<Local>>,
        removed_time: Option<DateTime<Local>>,
        status: DeviceStatus,
        device_type: &str,
    ) -> DeviceRecord {
        DeviceRecord {
            user_name: self.identity.user_name.clone(),
            machine_name: self.identity.machine_name.clone(),
            directory: drive.root_path(),
            plugged_in_time,
            removed_time,
            status,
            device_type: device_type.to_string(),
        }
    }

    /// Write the history as CSV: a header row and one row per record, or the
    /// single line [`NO_DEVICES_LINE`] when the history is empty.
    pub fn write_csv<W: Write>(&self, mut out: W) -> anyhow::Result<()> {
        if self.records.is_empty() {
            writeln!(out, "{NO_DEVICES_LINE}")?;
            return Ok(());
        }

        let mut writer = csv::Writer::from_writer(out);
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Export to `{dir}/{name}_{yyyyMMddHHmmss}.csv`, creating `dir` if
    /// needed. Returns the path written.
    pub fn export_csv(
        &self,
        dir: &Path,
        name: &str,
        now: DateTime<Local>,
    ) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating export directory {}", dir.display()))?;

        let path = dir.join(export_file_name(name, now));
        let file = fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        self.write_csv(std::io::BufWriter::new(file))
            .with_context(|| format!("writing {}", path.display()))?;

        tracing::info!("Exported {} records to {}", self.records.len(), path.display());
        Ok(path)
    }
}

/// `{name}_{yyyyMMddHHmmss}.csv`
pub fn export_file_name(name: &str, now: DateTime<Local>) -> String {
    format!("{}_{}.csv", name, now.format(FILE_STAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap()
    }

    fn drive(letter: char) -> DriveIdentifier {
        DriveIdentifier::from_letter(letter).unwrap()
    }

    fn history() -> DeviceHistory {
        DeviceHistory::new(Identity {
            user_name: "alex".into(),
            machine_name: "WS-01".into(),
        })
    }

    fn csv_string(history: &DeviceHistory) -> String {
        let mut buf = Vec::new();
        history.write_csv(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_empty_history_writes_placeholder() {
        assert_eq!(csv_string(&history()), "No removable devices available\n");
    }

    #[test]
    fn test_arrival_and_removal_rows() {
        let mut h = history();
        h.record_arrival(drive('E'), at(9, 5, 1));
        h.record_removal(drive('E'), at(9, 7, 30));

        let csv = csv_string(&h);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "USER NAME,MACHINE NAME,DIRECTORY,PLUGGED IN TIME,REMOVED TIME,PLUGGED IN OR REMOVED,DEVICE TYPE",
                "alex,WS-01,E:\\,2024-03-09 09:05:01,,Plugged In,Removable",
                "alex,WS-01,E:\\,,2024-03-09 09:07:30,Removed,Removable",
            ]
        );
    }

    #[test]
    fn test_mounted_drives() {
        let mut h = history();
        let mounted = [
            MountedDrive { drive: drive('C'), drive_type: DriveType::Fixed, ready: true },
            MountedDrive { drive: drive('F'), drive_type: DriveType::Removable, ready: true },
            MountedDrive { drive: drive('G'), drive_type: DriveType::NoRootDirectory, ready: false },
        ];
        h.record_mounted(&mounted, at(8, 0, 0));

        let rows = h.records();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].plugged_in_time, None);
        assert_eq!(rows[0].status, DeviceStatus::PluggedIn);
        assert_eq!(rows[0].device_type, "Fixed");
        assert_eq!(rows[1].plugged_in_time, Some(at(8, 0, 0)));
        assert_eq!(rows[1].status, DeviceStatus::PluggedIn);
        assert_eq!(rows[2].status, DeviceStatus::Removed);
        assert_eq!(rows[2].status.label(), "Removed");
    }

    #[test]
    fn test_mounted_drives_not_ready() {
        let mut h = history();
        let mounted = [
            // Empty card-reader slot.
            MountedDrive { drive: drive('H'), drive_type: DriveType::Removable, ready: false },
            // Optical drive without a disc, and an unmapped network share.
            MountedDrive { drive: drive('D'), drive_type: DriveType::CdRom, ready: false },
            MountedDrive { drive: drive('N'), drive_type: DriveType::Network, ready: false },
            MountedDrive { drive: drive('Z'), drive_type: DriveType::Network, ready: true },
        ];
        h.record_mounted(&mounted, at(8, 0, 0));

        let summary: Vec<(DeviceStatus, bool)> = h
            .records()
            .iter()
            .map(|r| (r.status, r.plugged_in_time.is_some()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (DeviceStatus::Removed, false),
                (DeviceStatus::PluggedIn, false),
                (DeviceStatus::Removed, false),
                (DeviceStatus::PluggedIn, false),
            ]
        );
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(export_file_name("devices", at(13, 4, 5)), "devices_20240309130405.csv");
    }
}
