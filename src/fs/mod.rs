//! # Filesystem Module
//!
//! The filesystem stores each file as a chain of fixed-size blocks, linked
//! through a 2-byte address kept at the front of every block.  A statically
//! located allocation table maps each file identifier to the head of its
//! chain and records the file's length; the table's trailing slot holds the
//! head of the free chain, which threads through the same link fields.
//!
//! Writing takes blocks off the free chain head and fills only their
//! payloads.  Because blocks are taken in the order the free chain linked
//! them, a fresh file chain inherits its topology from the free chain and
//! the intermediate links never need rewriting; only the final block's link
//! is set (to the null sentinel) when the file commits.  `close` is the
//! commit point: the table starts pointing at the new chain before the
//! terminator is written, so a power loss never leaves an orphaned chain.
//!
//! File identifiers wrap modulo `MAX_FILES`; collisions overwrite, which is
//! lossy by design and reported as a warning rather than an error.

pub mod types;
pub mod layout;

use std::fmt::Write;
use log::{trace,debug,info,warn,error};
use self::types::*;
use self::layout::*;
use crate::mem::Medium;
use crate::{DYNERR,STDRESULT};

fn wrap_filename(filename: u16) -> u16 {
    if filename >= MAX_FILES as u16 {
        let wrapped = filename % MAX_FILES as u16;
        warn!("filename {} too large, wrapped to {}",filename,wrapped);
        return wrapped;
    }
    filename
}

/// The primary interface for filesystem operations.
pub struct Fs {
    mem: Box<dyn Medium>,
    // cached allocation table; the last entry's head is the free chain head
    alloc_table: [FileAlloc;MAX_FILES + 1]
}

impl Fs {
    /// Mount the filesystem on the given medium, taking ownership of it.
    /// If the stored metadata does not match the compile-time configuration
    /// in `layout`, the medium is quick-formatted first.  Finishes by
    /// loading the allocation table into RAM.
    pub fn mount(mem: Box<dyn Medium>) -> Result<Self,DYNERR> {
        info!("initialising filesystem");
        let mut fs = Self {
            mem,
            alloc_table: [FileAlloc::new();MAX_FILES + 1]
        };
        debug!("loading metadata");
        let dat = fs.mem.read_bytes(FS_START + META_OFFSET,META_SIZE)?;
        if Metadata::from_bytes(&dat) != Metadata::current() {
            warn!("stored metadata does not match configuration");
            fs.format(FormatMode::Quick)?;
        }
        debug!("loading file allocation table");
        fs.load_table()?;
        trace!("next free block: {}",fs.alloc_table[MAX_FILES].head);
        info!("filesystem initialised");
        Ok(fs)
    }
    /// Format the medium for the filesystem.  Called by `mount` if the
    /// stored metadata does not match the configuration.
    pub fn format(&mut self,mode: FormatMode) -> STDRESULT {
        info!("formatting filesystem");
        if mode==FormatMode::Wipe {
            self.wipe()?;
        }
        // Build the free chain: block i points at i-1, block 0 terminates,
        // so the last block becomes the free head.
        for i in 0..NUM_BLOCKS {
            let prev = Lba::new(i as i16 - 1);
            if mode==FormatMode::Full {
                trace!("relinking block {} -> {}",i,prev);
                let mut block = prev.to_bytes().to_vec();
                block.resize(BLOCK_SIZE,0);
                self.mem.update_bytes(block_addr(i),&block)?;
            } else {
                self.relink(Lba::new(i as i16),prev)?;
            }
        }
        debug!("writing file allocation table");
        for slot in 0..MAX_FILES {
            self.alloc_table[slot] = FileAlloc::new();
        }
        self.alloc_table[MAX_FILES] = FileAlloc {
            size: 0,
            head: Lba::new(NUM_BLOCKS as i16 - 1)
        };
        let mut tab: Vec<u8> = Vec::new();
        for slot in 0..MAX_FILES + 1 {
            tab.append(&mut self.alloc_table[slot].to_bytes());
        }
        self.mem.update_bytes(FS_START + ALLOC_TABLE_OFFSET,&tab)?;
        debug!("writing metadata");
        self.mem.write_bytes(FS_START + META_OFFSET,&Metadata::current().to_bytes())?;
        info!("successfully formatted");
        Ok(())
    }
    /// Prepare a file for writing.  Any file already stored under the
    /// identifier is overwritten when the handle is closed.
    pub fn open_write(&self,filename: u16) -> FileHandle {
        let id = wrap_filename(filename);
        debug!("preparing file {} for writing",id);
        FileHandle {
            id,
            size: 0,
            mode: HandleMode::Write,
            first: Lba::NULL,
            last: Lba::NULL
        }
    }
    /// Prepare a file for appending.  The handle's size starts at the
    /// stored size; the stored chain itself is looked up at close time.
    pub fn open_append(&self,filename: u16) -> FileHandle {
        let id = wrap_filename(filename);
        debug!("preparing file {} for appending",id);
        FileHandle {
            id,
            size: self.alloc_table[id as usize].size as usize,
            mode: HandleMode::Append,
            first: Lba::NULL,
            last: Lba::NULL
        }
    }
    /// Prepare a file for reading.  If there is no file under the
    /// identifier a diagnostic is emitted and the handle is still returned;
    /// reading through it will fail as a null handle.
    pub fn open_read(&self,filename: u16) -> FileHandle {
        let id = wrap_filename(filename);
        debug!("preparing file {} for reading",id);
        let first = self.alloc_table[id as usize].head;
        if first.is_null() {
            error!("file {} not found",id);
        }
        FileHandle {
            id,
            size: self.alloc_table[id as usize].size as usize,
            mode: HandleMode::Read,
            first,
            last: Lba::NULL
        }
    }
    /// Write data through a handle opened for writing or appending.
    /// Data goes into fresh blocks taken off the free chain; nothing is
    /// committed until `close`.  Returns the number of user bytes accepted,
    /// which is less than `dat.len()` when the medium runs out of blocks or
    /// a plain write exceeds the per-file block budget (both reported).  An
    /// append that would exceed the budget is refused outright, since
    /// truncating it could drop bytes already on the medium.
    pub fn write(&mut self,fh: &mut FileHandle,dat: &[u8]) -> Result<usize,DYNERR> {
        if fh.mode!=HandleMode::Write && fh.mode!=HandleMode::Append {
            error!("tried to write through read-only handle for file {}",fh.id);
            return Err(Box::new(Error::WrongMode));
        }
        let slot = fh.id as usize;
        let existing = self.alloc_table[slot].size as usize;
        // An append onto a partially filled tail absorbs the tail's bytes as
        // the prefix of the new chain, so that only the final block of the
        // file ends up partially filled.  Only the first write through the
        // handle can need this; later writes continue the new chain.
        let mut buf: Vec<u8> = Vec::new();
        if fh.mode==HandleMode::Append && fh.first.is_null() && fh.size % BLOCK_DATA_SIZE > 0 {
            let overflow = fh.size % BLOCK_DATA_SIZE;
            let head = self.alloc_table[slot].head;
            let tail = self.tail_of(head)?;
            debug!("absorbing {} bytes from block {}",overflow,tail);
            buf = self.read_payload(tail,overflow)?;
        }
        let overflow = buf.len();
        buf.extend_from_slice(dat);
        // block budget
        let blocks_in_use = match fh.mode {
            HandleMode::Append => (existing + BLOCK_DATA_SIZE - 1) / BLOCK_DATA_SIZE,
            _ => 0
        };
        let mut needed = (buf.len() + BLOCK_DATA_SIZE - 1) / BLOCK_DATA_SIZE;
        if blocks_in_use + needed > MAX_BLOCKS_PER_FILE {
            if fh.mode==HandleMode::Append {
                error!("append to file {} would exceed {} blocks, refused",fh.id,MAX_BLOCKS_PER_FILE);
                return Err(Box::new(Error::FileTooLarge));
            }
            needed = MAX_BLOCKS_PER_FILE - blocks_in_use;
            buf.truncate(needed * BLOCK_DATA_SIZE);
            error!("file {} too large, write truncated to {} bytes",fh.id,buf.len());
        }
        if needed==0 {
            debug!("nothing to write to file {}",fh.id);
            return Ok(0);
        }
        debug!("writing {} bytes to file {}",buf.len(),fh.id);
        let mut taken = 0;
        for chunk in buf.chunks(BLOCK_DATA_SIZE) {
            match self.take_head()? {
                Some(idx) => {
                    debug!("overwriting block {}",idx);
                    self.write_payload(idx,chunk)?;
                    if fh.first.is_null() {
                        fh.first = Lba::new(idx as i16);
                    }
                    fh.last = Lba::new(idx as i16);
                    taken += 1;
                },
                None => {
                    error!("no more space available for file {}",fh.id);
                    break;
                }
            }
        }
        if taken==0 {
            return Err(Box::new(Error::MediumFull));
        }
        let stored = match buf.len() < taken * BLOCK_DATA_SIZE {
            true => buf.len(),
            false => taken * BLOCK_DATA_SIZE
        };
        let accepted = stored - overflow;
        fh.size += accepted;
        debug!("file {} holds {} new bytes",fh.id,accepted);
        Ok(accepted)
    }
    /// Read the whole file backing a handle opened for reading.
    /// Fails as a null handle if the handle does not reference a chain.
    pub fn read(&self,fh: &FileHandle) -> Result<Vec<u8>,DYNERR> {
        let mut idx = match fh.first.idx() {
            Some(idx) => idx,
            None => {
                error!("tried to read from null file handle");
                return Err(Box::new(Error::NullHandle));
            }
        };
        let mut ans: Vec<u8> = Vec::new();
        for _try in 0..MAX_CHAIN_REPS {
            trace!("reading from block {}",idx);
            let next = self.read_next(idx)?;
            let remainder = fh.size - ans.len();
            let num_bytes = match remainder < BLOCK_DATA_SIZE {
                true => remainder,
                false => BLOCK_DATA_SIZE
            };
            ans.append(&mut self.read_payload(idx,num_bytes)?);
            if next.is_null() {
                return Ok(ans);
            }
            idx = match next.idx() {
                Some(idx) => idx,
                None => {
                    error!("block {} is not a valid link",next);
                    return Err(Box::new(Error::ChainDamaged));
                }
            };
        }
        error!("chain for file {} does not terminate",fh.id);
        return Err(Box::new(Error::ChainDamaged));
    }
    /// Close a handle, committing its chain.  This is the commit point: the
    /// new chain is linked into the allocation table before its terminator
    /// is written, so a power loss between the two leaves either the old
    /// file or a file whose chain harmlessly rejoins the free chain past
    /// the file's real end, never an orphaned chain.
    pub fn close(&mut self,fh: FileHandle) -> STDRESULT {
        debug!("finalising file {}",fh.id);
        if fh.mode==HandleMode::Read {
            return Ok(());
        }
        if fh.first.is_null() {
            debug!("no data was written to file {}, nothing to commit",fh.id);
            return Ok(());
        }
        let slot = fh.id as usize;
        let existing = self.alloc_table[slot].size as usize;
        if fh.mode==HandleMode::Append && existing >= BLOCK_DATA_SIZE {
            // the stored chain ends on a block boundary or is longer than
            // one block; it keeps its head, and the new chain is grafted
            // onto its tail before the size is updated
            let head = self.alloc_table[slot].head;
            let tail = self.tail_of(head)?;
            debug!("appending block {} to block {}",fh.first,tail);
            self.relink(Lba::new(tail as i16),fh.first)?;
            self.alloc_table[slot].size = fh.size as u16;
            self.mirror_slot(slot)?;
            self.mirror_free_head()?;
        } else if fh.mode==HandleMode::Append {
            // the stored file fits in one block and was absorbed into the
            // new chain; discard it and point the table at the new chain
            if existing > 0 {
                let old = self.alloc_table[slot].head;
                self.unlink(old)?;
            }
            self.link(&fh)?;
        } else {
            self.link(&fh)?;
        }
        debug!("marking end of file {}",fh.id);
        self.relink(fh.last,Lba::NULL)?;
        debug!("file {} successfully finalised",fh.id);
        Ok(())
    }
    /// Roll back a handle opened for writing or appending, returning the
    /// blocks taken so far to the free chain.  The stored file is untouched.
    pub fn abort(&mut self,fh: FileHandle) -> STDRESULT {
        debug!("rolling back file {}",fh.id);
        if fh.mode==HandleMode::Read || fh.first.is_null() {
            return Ok(());
        }
        // terminate before returning, else the stale tail link would splice
        // the live free chain into itself
        self.relink(fh.last,Lba::NULL)?;
        self.unlink(fh.first)?;
        self.mirror_free_head()?;
        Ok(())
    }
    /// Delete a file, returning its entire chain to the free list.
    /// Deleting an empty slot is a no-op.
    pub fn delete(&mut self,filename: u16) -> STDRESULT {
        let id = wrap_filename(filename);
        debug!("deleting file {}",id);
        let slot = id as usize;
        if self.alloc_table[slot].head.is_null() {
            debug!("file {} not present",id);
            return Ok(());
        }
        let old = self.alloc_table[slot].head;
        self.unlink(old)?;
        self.alloc_table[slot] = FileAlloc::new();
        self.mirror_slot(slot)?;
        debug!("file {} successfully deleted",id);
        Ok(())
    }
    /// The size of the stored file, or None for an empty slot.
    pub fn stat(&self,filename: u16) -> Option<usize> {
        let id = wrap_filename(filename);
        let entry = &self.alloc_table[id as usize];
        match entry.head.is_null() {
            true => None,
            false => Some(entry.size as usize)
        }
    }
    /// Render every byte of the filesystem region in a hex-dump format,
    /// 16 bytes per row with an ASCII column.
    pub fn dump(&self) -> Result<String,DYNERR> {
        let dat = self.mem.read_bytes(FS_START,FS_SIZE)?;
        let mut ans = String::new();
        for (row,slice) in dat.chunks(16).enumerate() {
            write!(&mut ans,"{:#06x} : ",row*16).expect("unreachable");
            for byte in slice {
                write!(&mut ans,"{:02x} ",byte).expect("unreachable");
            }
            let txt: Vec<u8> = slice.iter().map(|b| match *b {
                x if x < 0x20 => '.' as u8,
                x if x > 0x7e => '.' as u8,
                x => x
            }).collect();
            writeln!(&mut ans,": {}",String::from_utf8_lossy(&txt)).expect("unreachable");
        }
        Ok(ans)
    }
    /// Zero the entire filesystem region one dword at a time.
    /// Destructive and slow, with full wear cost.
    pub fn wipe(&mut self) -> STDRESULT {
        info!("wiping medium");
        let mut i = 0;
        while i < FS_SIZE {
            self.mem.write_dword_zero(FS_START + i)?;
            i += 4;
        }
        Ok(())
    }
    /// Direct access to the underlying medium, e.g. to transfer its bytes
    /// elsewhere or inspect raw state.
    pub fn get_mem(&mut self) -> &mut Box<dyn Medium> {
        &mut self.mem
    }

    // Chain primitives.  These are the only operations that mutate data
    // blocks: a block's link and its payload are always rewritten
    // separately, never the whole block.

    fn read_next(&self,idx: usize) -> Result<Lba,DYNERR> {
        let dat = self.mem.read_bytes(block_addr(idx),LBA_SIZE)?;
        Ok(Lba::from_bytes([dat[0],dat[1]]))
    }
    fn read_payload(&self,idx: usize,len: usize) -> Result<Vec<u8>,DYNERR> {
        self.mem.read_bytes(block_data_addr(idx),len)
    }
    /// Overwrite only the link field of a block.  The target may be the
    /// null sentinel, the origin may not.
    fn relink(&mut self,block: Lba,target: Lba) -> STDRESULT {
        let idx = match block.idx() {
            Some(idx) => idx,
            None => {
                error!("attempted to relink invalid block {}",block);
                return Err(Box::new(Error::BlockOutOfRange));
            }
        };
        if !target.is_link_target() {
            error!("attempted to relink to invalid block {}",target);
            return Err(Box::new(Error::BlockOutOfRange));
        }
        trace!("relinking block {} -> {}",block,target);
        self.mem.write_bytes(block_addr(idx),&target.to_bytes())
    }
    /// Overwrite only the payload of a block, leaving its link intact.
    fn write_payload(&mut self,idx: usize,dat: &[u8]) -> STDRESULT {
        self.mem.write_bytes(block_data_addr(idx),dat)
    }
    /// Follow links from `start` to the last block of its chain.
    fn tail_of(&self,start: Lba) -> Result<usize,DYNERR> {
        let mut idx = match start.idx() {
            Some(idx) => idx,
            None => {
                error!("block {} is not part of a chain",start);
                return Err(Box::new(Error::BlockOutOfRange));
            }
        };
        trace!("searching for last block in chain");
        for _try in 0..MAX_CHAIN_REPS {
            trace!("checking block {}",idx);
            let next = self.read_next(idx)?;
            if next.is_null() {
                trace!("last block in chain: {}",idx);
                return Ok(idx);
            }
            idx = match next.idx() {
                Some(idx) => idx,
                None => {
                    error!("block {} is not a valid link",next);
                    return Err(Box::new(Error::ChainDamaged));
                }
            };
        }
        error!("chain starting at block {} does not terminate",start);
        return Err(Box::new(Error::ChainDamaged));
    }
    /// Take the head of the free chain, advancing the cached head to the
    /// taken block's successor.  Returns None when the medium is full.
    /// The taken block's link field is left as it was; a fresh chain
    /// inherits its topology from the free chain.
    fn take_head(&mut self) -> Result<Option<usize>,DYNERR> {
        let idx = match self.alloc_table[MAX_FILES].head.idx() {
            Some(idx) => idx,
            None => return Ok(None)
        };
        let next = self.read_next(idx)?;
        self.alloc_table[MAX_FILES].head = next;
        trace!("next free block: {}",next);
        Ok(Some(idx))
    }
    /// Return a null-terminated chain to the free list by relinking the
    /// free tail to it; the chain's own links are already in place, so it
    /// is never walked.  If the free chain is empty (the medium was full)
    /// the chain becomes the new free head.
    fn unlink(&mut self,block: Lba) -> STDRESULT {
        if block.idx().is_none() {
            error!("cannot unlink invalid block {}",block);
            return Err(Box::new(Error::BlockOutOfRange));
        }
        debug!("unlinking block {}",block);
        match self.alloc_table[MAX_FILES].head.idx() {
            Some(_) => {
                let free_head = self.alloc_table[MAX_FILES].head;
                let last_free = self.tail_of(free_head)?;
                self.relink(Lba::new(last_free as i16),block)?;
            },
            None => {
                self.alloc_table[MAX_FILES].head = block;
                self.mirror_free_head()?;
            }
        }
        debug!("unlink successful");
        Ok(())
    }
    /// Point the allocation table at a handle's chain and persist the slot,
    /// then the free head.  The chain is still unterminated at this point;
    /// the caller writes the terminator after the table owns the chain.
    fn link(&mut self,fh: &FileHandle) -> STDRESULT {
        match fh.first.idx() {
            Some(first) => {
                debug!("linking file {} to block {}",fh.id,first);
                let slot = fh.id as usize;
                self.alloc_table[slot].size = fh.size as u16;
                self.alloc_table[slot].head = fh.first;
                self.mirror_slot(slot)?;
                self.mirror_free_head()?;
                debug!("link successful");
                Ok(())
            },
            None => {
                error!("cannot link file {} to invalid block {}",fh.id,fh.first);
                Err(Box::new(Error::BlockOutOfRange))
            }
        }
    }

    // Allocation table mirroring.

    fn mirror_slot(&mut self,slot: usize) -> STDRESULT {
        self.mem.update_bytes(alloc_slot_addr(slot),&self.alloc_table[slot].to_bytes())
    }
    fn mirror_free_head(&mut self) -> STDRESULT {
        self.mirror_slot(MAX_FILES)
    }
    fn load_table(&mut self) -> STDRESULT {
        let dat = self.mem.read_bytes(FS_START + ALLOC_TABLE_OFFSET,ALLOC_TABLE_SIZE)?;
        for slot in 0..MAX_FILES + 1 {
            let entry = dat[slot*ALLOC_ENTRY_SIZE..(slot+1)*ALLOC_ENTRY_SIZE].to_vec();
            self.alloc_table[slot] = FileAlloc::from_bytes(&entry);
        }
        Ok(())
    }
}
