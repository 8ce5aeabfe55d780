//! Block-device abstraction the core depends on (spec.md §6).
//!
//! The core never touches a filesystem path or a BIOS call directly; it
//! only knows the `BlockDevice` trait below. `FileBlockDevice` is the
//! concrete implementation the CLI binaries wire in — a flat,
//! sector-addressable image file standing in for the original C
//! implementation's `int 13h` disk access, since there is no portable
//! equivalent of that call on a general-purpose OS.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Payload size of a single sector, fixed by the wire format.
pub const SECTOR_SIZE: usize = 512;

/// Cylinder/Head/Sector position, used only when invoking a sector read
/// (spec.md §3: "the tuple is used only when invoking the block-device
/// read").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chs {
    /// Cylinder.
    pub cylinder: u32,
    /// Head.
    pub head: u8,
    /// Sector, 1-based per spec.md §3.
    pub sector: u32,
}

/// Disk geometry as reported by `BlockDevice::geometry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Number of cylinders.
    pub cylinders: u32,
    /// Number of heads.
    pub heads: u8,
    /// Sectors per track.
    pub sectors_per_track: u32,
}

impl Geometry {
    /// Total addressable sectors under this geometry.
    #[must_use]
    pub fn total_sectors(&self) -> u64 {
        u64::from(self.cylinders) * u64::from(self.heads) * u64::from(self.sectors_per_track)
    }

    /// Translate a linear sector index into its CHS tuple.
    #[must_use]
    pub fn to_chs(&self, linear: u64) -> Chs {
        let spt = u64::from(self.sectors_per_track);
        let heads = u64::from(self.heads);
        let cylinder = linear / (spt * heads);
        let head = (linear / spt) % heads;
        let sector = 1 + (linear % spt);
        #[allow(clippy::cast_possible_truncation)]
        Chs {
            cylinder: cylinder as u32,
            head: head as u8,
            sector: sector as u32,
        }
    }
}

/// Block-addressable source disk, consumed by the core (spec.md §6).
pub trait BlockDevice {
    /// Query the device's geometry, or fail with a device error.
    fn geometry(&mut self) -> Result<Geometry>;

    /// Read one 512-byte sector at the given CHS position into `buf`.
    fn read_sector(&mut self, chs: Chs, buf: &mut [u8; SECTOR_SIZE]) -> Result<()>;

    /// Reset the device's controller, used between retries on a failing
    /// sector (spec.md §4.3).
    fn reset_controller(&mut self) -> Result<()>;
}

/// A flat image file addressed as a linear sequence of 512-byte sectors.
///
/// Geometry is supplied at construction (it cannot be queried from a plain
/// file the way a BIOS call queries a physical drive); it exists purely
/// for the CHS display the original tooling showed, not for addressing —
/// `read_sector` seeks by the sector's linear offset.
pub struct FileBlockDevice {
    file: File,
    geometry: Geometry,
}

impl FileBlockDevice {
    /// Open `path` as a block device with the given geometry.
    pub fn open(path: &Path, geometry: Geometry) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self { file, geometry })
    }

    /// Derive a geometry that makes `total_sectors` match the file's
    /// length, using the given heads/sectors-per-track for CHS display.
    pub fn open_with_derived_geometry(
        path: &Path,
        heads: u8,
        sectors_per_track: u32,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let total_sectors = len / SECTOR_SIZE as u64;
        let per_cylinder = u64::from(heads) * u64::from(sectors_per_track);
        let cylinders = if per_cylinder == 0 {
            0
        } else {
            total_sectors.div_ceil(per_cylinder)
        };
        #[allow(clippy::cast_possible_truncation)]
        let geometry = Geometry {
            cylinders: cylinders as u32,
            heads,
            sectors_per_track,
        };
        Ok(Self { file, geometry })
    }

    fn linear_offset(&self, chs: Chs) -> u64 {
        let spt = u64::from(self.geometry.sectors_per_track);
        let heads = u64::from(self.geometry.heads);
        let linear = u64::from(chs.cylinder) * heads * spt
            + u64::from(chs.head) * spt
            + u64::from(chs.sector - 1);
        linear * SECTOR_SIZE as u64
    }
}

impl BlockDevice for FileBlockDevice {
    fn geometry(&mut self) -> Result<Geometry> {
        Ok(self.geometry)
    }

    fn read_sector(&mut self, chs: Chs, buf: &mut [u8; SECTOR_SIZE]) -> Result<()> {
        let offset = self.linear_offset(chs);
        self.file.seek(SeekFrom::Start(offset))?;
        match self.file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::Device {
                code: 0xAA,
                message: "read past end of image".to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn reset_controller(&mut self) -> Result<()> {
        // A plain file has no controller state to reset; this is a no-op
        // kept so the retry reader's behavior is identical regardless of
        // the concrete BlockDevice in use.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn geometry_round_trips_chs() {
        let geometry = Geometry {
            cylinders: 10,
            heads: 2,
            sectors_per_track: 18,
        };
        let chs = geometry.to_chs(37);
        assert!(chs.sector >= 1);
        let spt = u64::from(geometry.sectors_per_track);
        let heads = u64::from(geometry.heads);
        let linear = u64::from(chs.cylinder) * heads * spt
            + u64::from(chs.head) * spt
            + u64::from(chs.sector - 1);
        assert_eq!(linear, 37);
    }

    #[test]
    fn file_block_device_reads_expected_sector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        let mut data = Vec::new();
        for i in 0..4u8 {
            data.extend(std::iter::repeat_n(i, SECTOR_SIZE));
        }
        std::fs::File::create(&path).unwrap().write_all(&data).unwrap();

        let mut device =
            FileBlockDevice::open_with_derived_geometry(&path, 1, 4).unwrap();
        let geometry = device.geometry().unwrap();
        assert_eq!(geometry.total_sectors(), 4);

        let mut buf = [0u8; SECTOR_SIZE];
        device
            .read_sector(Chs { cylinder: 0, head: 0, sector: 3 }, &mut buf)
            .unwrap();
        assert!(buf.iter().all(|&b| b == 2));
    }

    #[test]
    fn read_past_end_is_device_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0u8; SECTOR_SIZE])
            .unwrap();

        let mut device = FileBlockDevice::open_with_derived_geometry(&path, 1, 1).unwrap();
        let mut buf = [0u8; SECTOR_SIZE];
        let err = device
            .read_sector(Chs { cylinder: 0, head: 0, sector: 2 }, &mut buf)
            .unwrap_err();
        assert!(matches!(err, Error::Device { .. }));
    }
}
