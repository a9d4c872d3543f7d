//! The raw handle underneath a stream.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::io::IntoRawFd;

/// An unbuffered, exclusively owned OS handle.
///
/// Reads and writes go straight to the OS; the stream does all buffering.
pub trait Descriptor: Read + Write {
    /// The filesystem's preferred transfer size, or 0 if it reports none.
    fn preferred_block_size(&self) -> io::Result<usize>;

    /// Whether the handle is a pipe or FIFO.
    fn is_pipe(&self) -> io::Result<bool>;

    /// Release the handle, reporting any error from the final close.
    fn close(self) -> io::Result<()>
    where
        Self: Sized,
    {
        drop(self);
        Ok(())
    }
}

impl Descriptor for File {
    fn preferred_block_size(&self) -> io::Result<usize> {
        Ok(self.metadata()?.blksize() as usize)
    }

    fn is_pipe(&self) -> io::Result<bool> {
        Ok(self.metadata()?.file_type().is_fifo())
    }

    fn close(self) -> io::Result<()> {
        let fd = self.into_raw_fd();
        // SAFETY: `into_raw_fd` transferred sole ownership of `fd` to us.
        if unsafe { libc::close(fd) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}
