//! ## Filesystem types
//!
//! On-medium structures, handle types, and the error enumeration.
//! Multi-byte integers are stored little-endian, the native order of the
//! MCU targets this layout comes from.

use std::fmt;
use super::layout;

/// Upper bound for any chain walk.  No well-formed chain can be longer than
/// the block count, so running past this means the links are damaged.
pub const MAX_CHAIN_REPS: usize = layout::NUM_BLOCKS;

/// Enumerates filesystem errors.  The `Display` trait will print the long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("block out of range")]
    BlockOutOfRange,
    #[error("medium full")]
    MediumFull,
    #[error("null file handle")]
    NullHandle,
    #[error("wrong handle mode")]
    WrongMode,
    #[error("file too large")]
    FileTooLarge,
    #[error("chain damaged")]
    ChainDamaged
}

/// Flattening between structures and the bytes kept on the medium.
pub trait DiskStruct {
    /// Create an empty structure
    fn new() -> Self;
    /// Create structure using flattened bytes (typically from the medium)
    fn from_bytes(dat: &Vec<u8>) -> Self;
    /// Return flattened bytes (typically written to the medium)
    fn to_bytes(&self) -> Vec<u8>;
    /// Length of the flattened structure
    fn len(&self) -> usize;
}

/// Logical block address.  Signed, with `-1` as the null sentinel; the
/// on-medium bit pattern of the sentinel is preserved exactly.  Valid
/// addresses satisfy `0 <= v < NUM_BLOCKS` and are obtained with `idx`.
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub struct Lba(i16);

impl Lba {
    pub const NULL: Lba = Lba(-1);
    pub fn new(v: i16) -> Self {
        Self(v)
    }
    pub fn is_null(&self) -> bool {
        self.0 == -1
    }
    /// The data-region index, or None if this is the sentinel or out of range.
    pub fn idx(&self) -> Option<usize> {
        if self.0 >= 0 && (self.0 as usize) < layout::NUM_BLOCKS {
            return Some(self.0 as usize);
        }
        None
    }
    /// A link target may be the sentinel; an origin block may not.
    pub fn is_link_target(&self) -> bool {
        self.0 >= -1 && (self.0 as i32) < layout::NUM_BLOCKS as i32
    }
    pub fn from_bytes(dat: [u8;2]) -> Self {
        Self(i16::from_le_bytes(dat))
    }
    pub fn to_bytes(&self) -> [u8;2] {
        i16::to_le_bytes(self.0)
    }
}

/// Prints the raw signed value, so diagnostics show `-1` for the sentinel.
impl fmt::Display for Lba {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,"{}",self.0)
    }
}

/// One allocation table entry: the file's size in bytes and the head of its
/// block chain.  `head` is null exactly when the slot is empty, and then
/// `size` is 0.  The entry at slot `MAX_FILES` is distinguished: its `head`
/// is the free-list head and its `size` is unused.
#[derive(PartialEq,Eq,Clone,Copy)]
pub struct FileAlloc {
    pub size: u16,
    pub head: Lba
}

impl DiskStruct for FileAlloc {
    fn new() -> Self {
        Self {
            size: 0,
            head: Lba::NULL
        }
    }
    fn from_bytes(dat: &Vec<u8>) -> Self {
        Self {
            size: u16::from_le_bytes([dat[0],dat[1]]),
            head: Lba::from_bytes([dat[2],dat[3]])
        }
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut ans: Vec<u8> = Vec::new();
        ans.append(&mut u16::to_le_bytes(self.size).to_vec());
        ans.append(&mut self.head.to_bytes().to_vec());
        return ans;
    }
    fn len(&self) -> usize {
        return layout::ALLOC_ENTRY_SIZE;
    }
}

/// The metadata header at the start of the region.  There is no magic number
/// or version; a formatted filesystem is recognized by these fields matching
/// the compile-time configuration exactly.
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub struct Metadata {
    pub block_size: u16,
    pub start_address: u16,
    pub fs_size: u16,
    pub max_files: u16,
    pub max_blocks_per_file: u16
}

impl Metadata {
    /// The header matching the compile-time configuration in `layout`.
    pub fn current() -> Self {
        Self {
            block_size: layout::BLOCK_SIZE as u16,
            start_address: layout::FS_START as u16,
            fs_size: layout::FS_SIZE as u16,
            max_files: layout::MAX_FILES as u16,
            max_blocks_per_file: layout::MAX_BLOCKS_PER_FILE as u16
        }
    }
}

impl DiskStruct for Metadata {
    fn new() -> Self {
        Self {
            block_size: 0,
            start_address: 0,
            fs_size: 0,
            max_files: 0,
            max_blocks_per_file: 0
        }
    }
    fn from_bytes(dat: &Vec<u8>) -> Self {
        Self {
            block_size: u16::from_le_bytes([dat[0],dat[1]]),
            start_address: u16::from_le_bytes([dat[2],dat[3]]),
            fs_size: u16::from_le_bytes([dat[4],dat[5]]),
            max_files: u16::from_le_bytes([dat[6],dat[7]]),
            max_blocks_per_file: u16::from_le_bytes([dat[8],dat[9]])
        }
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut ans: Vec<u8> = Vec::new();
        ans.append(&mut u16::to_le_bytes(self.block_size).to_vec());
        ans.append(&mut u16::to_le_bytes(self.start_address).to_vec());
        ans.append(&mut u16::to_le_bytes(self.fs_size).to_vec());
        ans.append(&mut u16::to_le_bytes(self.max_files).to_vec());
        ans.append(&mut u16::to_le_bytes(self.max_blocks_per_file).to_vec());
        return ans;
    }
    fn len(&self) -> usize {
        return layout::META_SIZE;
    }
}

#[derive(PartialEq,Eq,Clone,Copy)]
pub enum HandleMode {
    Read,
    Write,
    Append
}

#[derive(PartialEq,Eq,Clone,Copy)]
pub enum FormatMode {
    /// Rewrite every block whole, zeroing the payloads.  Slow, full wear cost.
    Full,
    /// Relink the free chain and reset the table only.
    Quick,
    /// Zero the entire region dword by dword, then quick format.
    Wipe
}

/// Per-open bookkeeping.  Handles are plain values the caller owns; `close`
/// commits and consumes the handle, `abort` rolls back and consumes it.
/// A handle that is merely dropped leaks the blocks already taken for it
/// until the next format.
pub struct FileHandle {
    /// identifier, already wrapped modulo `MAX_FILES`
    pub id: u16,
    /// running size; for Append this starts at the stored size and grows by
    /// the accepted user bytes, so it always names the final file size
    pub size: usize,
    pub mode: HandleMode,
    /// first block of the chain accumulated by `write` (not the stored chain)
    pub first: Lba,
    /// last block of the chain accumulated by `write`
    pub last: Lba
}
