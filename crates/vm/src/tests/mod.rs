// Scenario tests for the vm crate.
//
// The host mocks from `test-support` are wired to the crate's traits here, and `Process`
// drives a `SupplementalPageTable` the way the kernel's fault path would: user accesses go
// through `MockMmu`, and every fault is fed back into `handle_fault` until the access succeeds.

use alloc::sync::Arc;

use test_support::mock::device::MockRamDisk;
use test_support::mock::fs::MockFile;
use test_support::mock::mm::{MockFault, MockMmu, MockPagePool};

use crate::address::{AlignOps, Kva, Vaddr};
use crate::arch_ops::{Mmu, PagePool};
use crate::config::VmConfig;
use crate::error::VmResult;
use crate::fault::{handle_fault, FaultFlags, PageFault};
use crate::file::MmFile;
use crate::manager::Vm;
use crate::spt::SupplementalPageTable;
use crate::swap::SwapDevice;

mod spt;

impl PagePool for MockPagePool {
    fn alloc_page(&self) -> Option<Kva> {
        MockPagePool::alloc_page(self).map(Kva::new)
    }

    fn free_page(&self, kva: Kva) {
        MockPagePool::free_page(self, kva.as_usize())
    }
}

impl Mmu for MockMmu {
    fn set_mapping(&self, va: Vaddr, kva: Kva, writable: bool) -> bool {
        MockMmu::set_mapping(self, va.as_usize(), kva.as_usize(), writable)
    }

    fn clear_mapping(&self, va: Vaddr) -> bool {
        MockMmu::clear_mapping(self, va.as_usize())
    }

    fn is_dirty(&self, va: Vaddr) -> bool {
        MockMmu::is_dirty(self, va.as_usize())
    }

    fn set_dirty(&self, va: Vaddr, dirty: bool) {
        MockMmu::set_dirty(self, va.as_usize(), dirty)
    }

    fn is_accessed(&self, va: Vaddr) -> bool {
        MockMmu::is_accessed(self, va.as_usize())
    }

    fn set_accessed(&self, va: Vaddr, accessed: bool) {
        MockMmu::set_accessed(self, va.as_usize(), accessed)
    }
}

impl SwapDevice for MockRamDisk {
    fn sector_size(&self) -> usize {
        MockRamDisk::sector_size(self)
    }

    fn total_sectors(&self) -> usize {
        MockRamDisk::total_sectors(self)
    }

    fn read_sector(&self, sector: usize, buf: &mut [u8]) -> bool {
        MockRamDisk::read_sector(self, sector, buf)
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) -> bool {
        MockRamDisk::write_sector(self, sector, buf)
    }
}

impl MmFile for MockFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        MockFile::read_at(self, offset, buf)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        MockFile::write_at(self, offset, buf)
    }

    fn len(&self) -> usize {
        MockFile::len(self)
    }
}

pub(crate) const PAGE: usize = 4096;
const SECTOR: usize = 512;
const MAX_RETRIES: usize = 1000;

/// Base of the heap-like area the tests allocate pages in.
pub(crate) const BASE: usize = 0x1000_0000;

pub(crate) fn stack_top() -> usize {
    VmConfig::default().user_stack_top
}

pub(crate) fn va(addr: usize) -> Vaddr {
    Vaddr::new(addr)
}

/// One `Vm` with a bounded frame pool and swap disk.
pub(crate) struct Harness {
    pub(crate) pool: Arc<MockPagePool>,
    pub(crate) disk: Arc<MockRamDisk>,
    pub(crate) vm: Arc<Vm>,
}

impl Harness {
    pub(crate) fn new(frames: usize, swap_slots: usize) -> Self {
        let pool = Arc::new(MockPagePool::new(frames, PAGE));
        let disk = Arc::new(MockRamDisk::new(swap_slots * (PAGE / SECTOR), SECTOR));
        let vm = Vm::new(VmConfig::default(), pool.clone(), Some(disk.clone() as Arc<dyn SwapDevice>))
            .unwrap();
        Self { pool, disk, vm }
    }

    pub(crate) fn process(&self) -> Process {
        let mmu = Arc::new(MockMmu::new(PAGE));
        Process {
            spt: SupplementalPageTable::new(self.vm.clone(), mmu.clone()),
            mmu,
        }
    }

    pub(crate) fn swap_used(&self) -> usize {
        self.vm.swap().stats().used_slots
    }
}

/// A user process: its page table and its MMU.
pub(crate) struct Process {
    pub(crate) spt: SupplementalPageTable,
    pub(crate) mmu: Arc<MockMmu>,
}

impl Process {
    pub(crate) fn write(&mut self, addr: usize, data: &[u8]) -> VmResult<()> {
        self.write_with_rsp(addr, data, stack_top())
    }

    pub(crate) fn write_with_rsp(&mut self, addr: usize, data: &[u8], rsp: usize) -> VmResult<()> {
        self.access(rsp, true, |mmu| mmu.user_write(addr, data))
    }

    pub(crate) fn read(&mut self, addr: usize, len: usize) -> VmResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.access(stack_top(), false, |mmu| mmu.user_read(addr, &mut buf))?;
        Ok(buf)
    }

    pub(crate) fn fault(&mut self, addr: usize, flags: FaultFlags, rsp: usize) -> VmResult<()> {
        handle_fault(&mut self.spt, &PageFault::new(va(addr), flags, va(rsp)))
    }

    fn access<F>(&mut self, rsp: usize, write: bool, mut op: F) -> VmResult<()>
    where
        F: FnMut(&MockMmu) -> Result<(), MockFault>,
    {
        for _ in 0..MAX_RETRIES {
            let fault = match op(&self.mmu) {
                Ok(()) => return Ok(()),
                Err(fault) => fault,
            };
            let mut flags = FaultFlags::USER;
            if write {
                flags |= FaultFlags::WRITE;
            }
            if let MockFault::NotPresent(_) = fault {
                flags |= FaultFlags::NOT_PRESENT;
            }
            self.fault(fault.addr(), flags, rsp)?;
        }
        panic!("user access kept faulting");
    }

    pub(crate) fn is_resident(&self, addr: usize) -> bool {
        self.spt
            .lookup(va(addr))
            .is_some_and(|page| page.lock().is_resident())
    }
}

/// A page-sized buffer filled with `byte`.
pub(crate) fn page_of(byte: u8) -> Vec<u8> {
    vec![byte; PAGE]
}

pub(crate) fn mock_file(data: Vec<u8>) -> Arc<MockFile> {
    Arc::new(MockFile::from_bytes(data))
}
