//! Block device target
//!
//! Raw block devices (e.g. /dev/sdb, /dev/zd0) and, for dry runs and tests,
//! regular files. Writer handles are opened write-only with O_SYNC by default
//! so a successful write has reached the device before it is recorded.
//!
//! # Example
//!
//! ```no_run
//! use blockstress::target::{AccessMode, Device};
//! use blockstress::target::block::BlockDevice;
//!
//! let device = BlockDevice::new("/dev/sdb");
//! let handle = device.open(AccessMode::Read)?;
//! println!("{} bytes", handle.size()?);
//! # Ok::<(), std::io::Error>(())
//! ```

use super::{AccessMode, Device, DeviceHandle};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

// ioctl request code for getting block device size
#[cfg(target_os = "linux")]
const BLKGETSIZE64: libc::c_ulong = 0x80081272;

/// Block device or regular file addressed by path
#[derive(Debug, Clone)]
pub struct BlockDevice {
    path: PathBuf,
    sync: bool,
}

impl BlockDevice {
    /// Writer handles use O_SYNC
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync: true,
        }
    }

    /// Enable or disable O_SYNC on writer handles
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn sync(&self) -> bool {
        self.sync
    }
}

impl Device for BlockDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, mode: AccessMode) -> io::Result<Box<dyn DeviceHandle>> {
        let mut options = OpenOptions::new();
        match mode {
            AccessMode::Read => {
                options.read(true);
            }
            AccessMode::Write => {
                options.write(true);
                if self.sync {
                    options.custom_flags(libc::O_SYNC);
                }
            }
        }

        let file = options.open(&self.path)?;
        Ok(Box::new(BlockHandle { file }))
    }

    fn is_present(&self) -> bool {
        std::fs::metadata(&self.path).is_ok()
    }
}

/// Open handle on a `BlockDevice`
struct BlockHandle {
    file: File,
}

impl BlockHandle {
    #[cfg(target_os = "linux")]
    fn block_device_size(&self) -> io::Result<u64> {
        use std::os::unix::io::AsRawFd;

        let mut size: u64 = 0;
        // SAFETY: BLKGETSIZE64 writes a single u64 through the pointer, and
        // the fd stays open for the duration of the call.
        let result = unsafe { libc::ioctl(self.file.as_raw_fd(), BLKGETSIZE64, &mut size) };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(size)
    }

    #[cfg(not(target_os = "linux"))]
    fn block_device_size(&self) -> io::Result<u64> {
        use std::io::{Seek, SeekFrom};
        (&self.file).seek(SeekFrom::End(0))
    }
}

impl DeviceHandle for BlockHandle {
    fn size(&self) -> io::Result<u64> {
        let metadata = self.file.metadata()?;
        if metadata.file_type().is_block_device() {
            self.block_device_size()
        } else {
            Ok(metadata.len())
        }
    }

    #[inline]
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.file.write_at(buf, offset)
    }

    #[inline]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.read_at(buf, offset)
    }
}
