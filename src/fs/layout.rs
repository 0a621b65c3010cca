//! ## Layout module
//!
//! Compile-time geometry of the filesystem region and the pure address
//! arithmetic over it.  The region is divided, in order, into the metadata
//! header, the allocation table, and the data blocks.  Changing any constant
//! here makes the stored metadata mismatch, which triggers a quick format on
//! the next mount.

/// Base byte offset of the filesystem region within the medium.
pub const FS_START: usize = 0x0;
/// Size of the filesystem region in bytes.
pub const FS_SIZE: usize = 2048;
/// Size of one data block, link field included.
pub const BLOCK_SIZE: usize = 32;
/// Upper limit on the chain length of a single file.
pub const MAX_BLOCKS_PER_FILE: usize = 8;
/// Number of file slots in the allocation table.  A prime count is
/// recommended so that wrapped identifiers spread over the slots.
pub const MAX_FILES: usize = 29;

/// Size of the on-medium link field (an `Lba`).
pub const LBA_SIZE: usize = 2;
/// Payload bytes per block.
pub const BLOCK_DATA_SIZE: usize = BLOCK_SIZE - LBA_SIZE;

pub const META_OFFSET: usize = 0;
/// Five u16 fields, see `types::Metadata`.
pub const META_SIZE: usize = 10;
pub const ALLOC_TABLE_OFFSET: usize = META_OFFSET + META_SIZE;
/// u16 size plus i16 head, see `types::FileAlloc`.
pub const ALLOC_ENTRY_SIZE: usize = 4;
/// The table carries one entry per file slot plus the free-head slot.
pub const ALLOC_TABLE_SIZE: usize = (MAX_FILES + 1) * ALLOC_ENTRY_SIZE;
pub const DATA_OFFSET: usize = ALLOC_TABLE_OFFSET + ALLOC_TABLE_SIZE;
/// Count of data blocks; trailing bytes that do not fill a block are unused.
pub const NUM_BLOCKS: usize = (FS_SIZE - DATA_OFFSET) / BLOCK_SIZE;

/// Byte address of the block with the given index.
/// The mod is defensive wrap arithmetic; valid indices never trigger it.
pub fn block_addr(idx: usize) -> usize {
    FS_START + DATA_OFFSET + (idx * BLOCK_SIZE) % FS_SIZE
}

/// Byte address of the payload of the block with the given index.
pub fn block_data_addr(idx: usize) -> usize {
    block_addr(idx) + LBA_SIZE
}

/// Byte address of an allocation table slot.
/// Slot `MAX_FILES` is the free-head slot.
pub fn alloc_slot_addr(slot: usize) -> usize {
    FS_START + ALLOC_TABLE_OFFSET + slot * ALLOC_ENTRY_SIZE
}

#[test]
fn region_layout() {
    assert_eq!(ALLOC_TABLE_OFFSET,10);
    assert_eq!(DATA_OFFSET,130);
    assert_eq!(NUM_BLOCKS,59);
    assert_eq!(BLOCK_DATA_SIZE,30);
    assert_eq!(block_addr(0),130);
    assert_eq!(block_data_addr(0),132);
    assert_eq!(alloc_slot_addr(MAX_FILES),10 + 29*4);
    // the last block must fit inside the region
    assert!(block_addr(NUM_BLOCKS-1) + BLOCK_SIZE <= FS_START + FS_SIZE);
}
