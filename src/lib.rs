//! # `eefs` main library
//!
//! This library implements a miniature wear-levelling filesystem for small
//! byte-addressable non-volatile memories, such as the EEPROM found on many
//! microcontrollers.  Files are named by small integers and stored as chains
//! of fixed-size blocks, each block carrying a link to the next one.  The
//! architecture is FAT-like, with the allocation table located statically at
//! the start of the memory; the table is therefore a known wear hotspot over
//! several tens of thousands of file writes.
//!
//! ## Architecture
//!
//! Storage operations are built around two layers:
//! * `mem::Medium` provides byte-level access to the device, does not try to interpret a file system
//! * `fs::Fs` imposes the file system on the medium it owns
//!
//! When an `Fs` object is created with `Fs::mount` it takes ownership of some
//! `Medium`.  The allocation table is cached in RAM and mirrored to the
//! medium slot-by-slot as operations commit.  Data blocks are never rewritten
//! whole on the hot path: taking a fresh block writes only its payload, and
//! chain surgery rewrites only the 2-byte link field.  This is the source of
//! the wear-levelling property.
//!
//! ## Typical use
//!
//! ```no_run
//! use eefs::fs::Fs;
//! use eefs::mem::ram::RamMedium;
//! use eefs::fs::layout::FS_SIZE;
//!
//! let mut fs = Fs::mount(Box::new(RamMedium::new(FS_SIZE))).unwrap();
//! let mut fh = fs.open_write(6);
//! fs.write(&mut fh,b"Hello World!\n").unwrap();
//! fs.close(fh).unwrap();
//! let fh = fs.open_read(6);
//! let dat = fs.read(&fh).unwrap();
//! ```
//!
//! ## Diagnostics
//!
//! All diagnostics go through the `log` facade; the host installs whatever
//! logger it likes and `set_debug` caps the verbosity with the 0-4 ladder the
//! original debug channel used.

pub mod mem;
pub mod fs;

use log::LevelFilter;
use log::warn;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub type DYNERR = Box<dyn std::error::Error>;
pub type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Enumerates the verbosity ladder accepted by `set_debug`.
/// Raw bytes convert via `Verbosity::from_u8` (FromPrimitive trait).
#[derive(FromPrimitive)]
pub enum Verbosity {
    Errors = 0,
    Operations = 1,
    Steps = 2,
    Chains = 3,
    Bytes = 4
}

/// Set the debug level of the filesystem.
/// Level 0 shows errors only, 1 adds per-operation messages, 2 adds the
/// steps within an operation, 3 and 4 add chain and byte level detail.
/// This caps the global `log` filter; the host's logger may filter further.
pub fn set_debug(level: u8) {
    let verbosity = match Verbosity::from_u8(level) {
        Some(v) => v,
        None => {
            warn!("debug level {} out of range, using maximum",level);
            Verbosity::Bytes
        }
    };
    log::set_max_level(match verbosity {
        Verbosity::Errors => LevelFilter::Error,
        Verbosity::Operations => LevelFilter::Info,
        Verbosity::Steps => LevelFilter::Debug,
        Verbosity::Chains | Verbosity::Bytes => LevelFilter::Trace
    });
}
