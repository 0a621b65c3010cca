//! # Medium Module
//!
//! This is a container for storage media.  A medium serves as the underlying
//! storage for the filesystem and is represented by the `Medium` trait, which
//! exposes byte-level primitives over a linear address space of known size.
//! Addresses are opaque byte offsets within the device.
//!
//! The trait mirrors the access pattern of a typical MCU EEPROM driver:
//! plain reads and writes, an update variant that skips bytes which already
//! hold the requested value (each byte of such a device has a limited
//! rewrite budget), and a dword-wide zero write used only by the wipe
//! operation.  All operations are synchronous; a power loss is assumed to
//! leave at most the word in flight partially written.

pub mod ram;

use crate::STDRESULT;

/// Enumerates medium errors.  The `Display` trait will print the long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("address out of range")]
    AddressOutOfRange,
    #[error("medium access failed")]
    AccessFailed
}

/// The main trait for working with any kind of storage medium.
/// The corresponding trait object serves as storage for `fs::Fs`.
pub trait Medium {
    /// Size of the device in bytes.
    fn capacity(&self) -> usize;
    /// Read `len` bytes starting at `addr`.
    fn read_bytes(&self,addr: usize,len: usize) -> Result<Vec<u8>,crate::DYNERR>;
    /// Write all of `dat` starting at `addr`.
    fn write_bytes(&mut self,addr: usize,dat: &[u8]) -> STDRESULT;
    /// Write only the bytes of `dat` that differ from what is stored.
    /// The default reads back the affected range and rewrites the differing
    /// runs; a medium with native update support can override this, and a
    /// medium without any can leave it equivalent to `write_bytes`.
    fn update_bytes(&mut self,addr: usize,dat: &[u8]) -> STDRESULT {
        let old = self.read_bytes(addr,dat.len())?;
        let mut i = 0;
        while i < dat.len() {
            if dat[i]==old[i] {
                i += 1;
                continue;
            }
            let mut j = i + 1;
            while j < dat.len() && dat[j]!=old[j] {
                j += 1;
            }
            self.write_bytes(addr+i,&dat[i..j])?;
            i = j;
        }
        Ok(())
    }
    /// Write a zeroed dword at `addr`.  Used only by the wipe operation.
    fn write_dword_zero(&mut self,addr: usize) -> STDRESULT {
        self.write_bytes(addr,&[0;4])
    }
}
