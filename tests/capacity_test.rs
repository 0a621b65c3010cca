// free-list exhaustion, per-file block budget, recovery after a full medium
use eefs::fs::Fs;
use eefs::fs::layout::*;
use eefs::fs::types::{DiskStruct,FileAlloc,Lba};
use eefs::mem::Medium;
use eefs::mem::ram::RamMedium;

const MAX_BYTES: usize = MAX_BLOCKS_PER_FILE * BLOCK_DATA_SIZE;

fn table_slot(mem: &mut Box<dyn Medium>,slot: usize) -> FileAlloc {
    let dat = mem.read_bytes(alloc_slot_addr(slot),ALLOC_ENTRY_SIZE).expect("read failed");
    FileAlloc::from_bytes(&dat)
}

fn walk_chain(mem: &mut Box<dyn Medium>,head: Lba) -> Vec<usize> {
    let mut ans: Vec<usize> = Vec::new();
    let mut curs = head;
    while let Some(idx) = curs.idx() {
        ans.push(idx);
        assert!(ans.len() <= NUM_BLOCKS,"chain does not terminate");
        let dat = mem.read_bytes(block_addr(idx),LBA_SIZE).expect("read failed");
        curs = Lba::from_bytes([dat[0],dat[1]]);
    }
    return ans;
}

/// every block is either in some file's chain or on the free chain, once
fn assert_partition(fs: &mut Fs) {
    let mem = fs.get_mem();
    let mut seen = vec![false;NUM_BLOCKS];
    for slot in 0..MAX_FILES + 1 {
        let entry = table_slot(mem,slot);
        if entry.head.is_null() {
            continue;
        }
        for idx in walk_chain(mem,entry.head) {
            assert!(!seen[idx],"block {} linked twice",idx);
            seen[idx] = true;
        }
    }
    assert!(seen.iter().all(|b| *b),"some block is orphaned");
}

fn fill_medium(fs: &mut Fs) -> u16 {
    // seven full files plus one truncated one consume all 59 blocks
    let big = vec![0xee;MAX_BYTES];
    let mut filename = 0;
    loop {
        let mut fh = fs.open_write(filename);
        let accepted = fs.write(&mut fh,&big).expect("write failed");
        fs.close(fh).expect("close failed");
        if accepted < MAX_BYTES {
            return filename;
        }
        filename += 1;
    }
}

#[test]
fn fill_until_exhausted() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut fs = Fs::mount(Box::new(RamMedium::new(FS_SIZE))).expect("mount failed");
    let last = fill_medium(&mut fs);
    // 59 blocks: seven files of eight blocks, then three blocks remain
    assert_eq!(last,7);
    assert_eq!(fs.stat(last),Some(3 * BLOCK_DATA_SIZE));
    assert!(table_slot(fs.get_mem(),MAX_FILES).head.is_null());

    // with nothing free, a new write reports no space and allocates nothing
    let mut fh = fs.open_write(20);
    match fs.write(&mut fh,b"one more") {
        Ok(n) => panic!("accepted {} bytes on a full medium",n),
        Err(e) => assert_eq!(e.to_string(),"medium full")
    }
    fs.close(fh).expect("close failed");
    assert_eq!(fs.stat(20),None);
    assert_partition(&mut fs);
}

#[test]
fn delete_recovers_full_medium() {
    let mut fs = Fs::mount(Box::new(RamMedium::new(FS_SIZE))).expect("mount failed");
    fill_medium(&mut fs);
    // free head is null; the deleted chain must become the new free chain
    fs.delete(0).expect("delete failed");
    assert_partition(&mut fs);
    let free_head = table_slot(fs.get_mem(),MAX_FILES).head;
    let free = walk_chain(fs.get_mem(),free_head);
    assert_eq!(free.len(),MAX_BLOCKS_PER_FILE);

    let mut fh = fs.open_write(20);
    assert_eq!(fs.write(&mut fh,b"recovered").expect("write failed"),9);
    fs.close(fh).expect("close failed");
    let fh = fs.open_read(20);
    assert_eq!(fs.read(&fh).expect("read failed"),b"recovered".to_vec());
    assert_partition(&mut fs);
}

#[test]
fn oversize_write_truncates() {
    let mut fs = Fs::mount(Box::new(RamMedium::new(FS_SIZE))).expect("mount failed");
    let big: Vec<u8> = (0..MAX_BYTES + 50).map(|i| i as u8).collect();
    let mut fh = fs.open_write(9);
    assert_eq!(fs.write(&mut fh,&big).expect("write failed"),MAX_BYTES);
    fs.close(fh).expect("close failed");
    assert_eq!(fs.stat(9),Some(MAX_BYTES));
    let fh = fs.open_read(9);
    assert_eq!(fs.read(&fh).expect("read failed"),big[0..MAX_BYTES].to_vec());
    assert_partition(&mut fs);
}

#[test]
fn oversize_append_refused() {
    let mut fs = Fs::mount(Box::new(RamMedium::new(FS_SIZE))).expect("mount failed");
    let stored: Vec<u8> = (0..100).map(|i| i as u8).collect();
    let mut fh = fs.open_write(9);
    fs.write(&mut fh,&stored).expect("write failed");
    fs.close(fh).expect("close failed");
    let before = fs.get_mem().read_bytes(FS_START,FS_SIZE).expect("read failed");

    // 100 bytes hold 4 blocks; absorbing the 10-byte tail into 200 more
    // bytes would need 7, exceeding the budget, so nothing may move
    let mut fh = fs.open_append(9);
    match fs.write(&mut fh,&vec![0x77;200]) {
        Ok(n) => panic!("accepted {} bytes past the block budget",n),
        Err(e) => assert_eq!(e.to_string(),"file too large")
    }
    fs.close(fh).expect("close failed");
    let after = fs.get_mem().read_bytes(FS_START,FS_SIZE).expect("read failed");
    assert_eq!(before,after);
    let fh = fs.open_read(9);
    assert_eq!(fs.read(&fh).expect("read failed"),stored);
}

#[test]
fn partial_write_when_free_runs_out() {
    let mut fs = Fs::mount(Box::new(RamMedium::new(FS_SIZE))).expect("mount failed");
    // leave exactly two free blocks
    for filename in 0..7 {
        let mut fh = fs.open_write(filename);
        fs.write(&mut fh,&vec![0xee;MAX_BYTES]).expect("write failed");
        fs.close(fh).expect("close failed");
    }
    let mut fh = fs.open_write(7);
    fs.write(&mut fh,&vec![0xee;BLOCK_DATA_SIZE]).expect("write failed");
    fs.close(fh).expect("close failed");

    let mut fh = fs.open_write(8);
    let accepted = fs.write(&mut fh,&vec![0x33;4 * BLOCK_DATA_SIZE]).expect("write failed");
    fs.close(fh).expect("close failed");
    assert_eq!(accepted,2 * BLOCK_DATA_SIZE);
    assert_eq!(fs.stat(8),Some(2 * BLOCK_DATA_SIZE));
    assert_partition(&mut fs);
}
