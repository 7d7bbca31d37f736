use core::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::error::VmError;
use crate::page::{FileSpan, LazyLoad, PageType};

#[test]
fn test_register_lookup_remove() {
    let h = Harness::new(4, 4);
    let mut p = h.process();

    let page = p.spt.alloc_page(PageType::Anon, va(BASE), true).unwrap();
    assert!(Arc::ptr_eq(&p.spt.lookup(va(BASE)).unwrap(), &page));
    // 页内任意地址都找到同一页
    assert!(Arc::ptr_eq(&p.spt.lookup(va(BASE + 5)).unwrap(), &page));
    assert!(Arc::ptr_eq(&p.spt.lookup(va(BASE + PAGE - 1)).unwrap(), &page));
    assert!(p.spt.lookup(va(BASE + PAGE)).is_none());

    p.spt.remove(va(BASE)).unwrap();
    assert!(p.spt.lookup(va(BASE)).is_none());
    assert_eq!(p.spt.remove(va(BASE)), Err(VmError::NotMapped));
}

#[test]
fn test_duplicate_registration_fails() {
    let h = Harness::new(4, 4);
    let mut p = h.process();

    let first = p.spt.alloc_page(PageType::Anon, va(BASE), true).unwrap();
    assert_eq!(
        p.spt.alloc_page(PageType::Anon, va(BASE), false).err(),
        Some(VmError::AlreadyMapped)
    );
    let found = p.spt.lookup(va(BASE)).unwrap();
    assert!(Arc::ptr_eq(&found, &first));
    assert!(found.lock().writable());
    assert_eq!(p.spt.len(), 1);
}

#[test]
fn test_unaligned_page_rejected() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    assert_eq!(
        p.spt.alloc_page(PageType::Anon, va(BASE + 4), true).err(),
        Some(VmError::InvalidAddress)
    );
    assert!(p.spt.is_empty());
}

#[test]
fn test_alloc_rejects_unusable_types() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    assert_eq!(
        p.spt.alloc_page(PageType::Uninit, va(BASE), true).err(),
        Some(VmError::InvalidArgument)
    );
    assert_eq!(
        p.spt.alloc_page(PageType::PageCache, va(BASE), true).err(),
        Some(VmError::UnsupportedType)
    );
    // 文件页必须带文件区段
    assert_eq!(
        p.spt.alloc_page(PageType::File, va(BASE), true).err(),
        Some(VmError::InvalidArgument)
    );
    assert!(p.spt.is_empty());
}

#[test]
fn test_page_type_reports_target_until_loaded() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    let file = mock_file(vec![7u8; PAGE]);
    let span = FileSpan::new(file, 0, PAGE, 0);
    let page = p
        .spt
        .alloc_page_with_initializer(PageType::File, va(BASE), false, Some(LazyLoad::File(span)))
        .unwrap();

    assert_eq!(p.spt.page_type(va(BASE)), Some(PageType::File));
    assert_eq!(page.lock().kind_type(), PageType::Uninit);

    assert_eq!(p.read(BASE, 4).unwrap(), vec![7u8; 4]);
    assert_eq!(page.lock().kind_type(), PageType::File);
    assert_eq!(p.spt.page_type(va(BASE + 1)), Some(PageType::File));
    assert_eq!(p.spt.page_type(va(BASE + PAGE)), None);
}

#[test]
fn test_first_access_is_zero_filled() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    p.spt.alloc_page(PageType::Anon, va(BASE), true).unwrap();

    // 页池返回的页被填充了垃圾数据，读到的必须是零
    assert_eq!(p.read(BASE + 5, 16).unwrap(), vec![0u8; 16]);
    assert!(p.is_resident(BASE));
    assert_eq!(p.spt.lookup(va(BASE)).unwrap().lock().kind_type(), PageType::Anon);
}

#[test]
fn test_custom_loader_runs_once() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let loader = LazyLoad::custom(move |buf| {
        counter.fetch_add(1, Ordering::SeqCst);
        buf[..3].copy_from_slice(b"abc");
        Ok(())
    });
    p.spt
        .alloc_page_with_initializer(PageType::Anon, va(BASE), true, Some(loader))
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    p.spt.claim_page(va(BASE)).unwrap();
    p.spt.claim_page(va(BASE)).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(p.read(BASE, 4).unwrap(), b"abc\0".to_vec());
}

#[test]
fn test_claim_installs_mapping() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    p.spt.alloc_page(PageType::Anon, va(BASE), false).unwrap();

    p.spt.claim_page(va(BASE + 10)).unwrap();
    let pte = p.mmu.pte(BASE).unwrap();
    assert!(!pte.writable);
    let kva = p.spt.lookup(va(BASE)).unwrap().lock().frame_kva().unwrap();
    assert_eq!(pte.kva, kva.as_usize());
    assert_eq!(h.vm.frame_table().stats().resident, 1);
    assert_eq!(h.vm.frame_table().stats().pinned, 0);

    assert_eq!(p.spt.claim_page(va(BASE + PAGE)), Err(VmError::NotMapped));
}

#[test]
fn test_segment_loader_fills_anon_page() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    let data: Vec<u8> = (0..200u8).collect();
    let file = mock_file(data.clone());
    let span = FileSpan::new(file.clone(), 50, 100, PAGE - 100);
    p.spt
        .alloc_page_with_initializer(PageType::Anon, va(BASE), true, Some(LazyLoad::File(span)))
        .unwrap();

    let content = p.read(BASE, PAGE).unwrap();
    assert_eq!(&content[..100], &data[50..150]);
    assert!(content[100..].iter().all(|&b| b == 0));

    // 可执行段装载后是匿名页，修改不会写回文件
    p.write(BASE, b"patched").unwrap();
    p.spt.remove(va(BASE)).unwrap();
    assert!(file.writes().is_empty());
    assert_eq!(file.contents(), data);
}

#[test]
fn test_short_read_fails_claim_cleanly() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    let file = mock_file(vec![1u8; PAGE]);
    file.set_short_reads(true);
    let span = FileSpan::new(file.clone(), 0, PAGE, 0);
    p.spt
        .alloc_page_with_initializer(PageType::File, va(BASE), true, Some(LazyLoad::File(span)))
        .unwrap();

    assert_eq!(p.spt.claim_page(va(BASE)), Err(VmError::ShortRead));
    assert!(!p.is_resident(BASE));
    assert_eq!(h.pool.in_use(), 0);
    assert_eq!(p.mmu.mapped_count(), 0);
    assert_eq!(h.vm.frame_table().stats().resident, 0);

    // 装载失败后页保持未初始化，可以重试
    file.set_short_reads(false);
    assert_eq!(p.read(BASE, 2).unwrap(), vec![1u8; 2]);
}

#[test]
fn test_mapping_failure_returns_frame() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    p.spt.alloc_page(PageType::Anon, va(BASE), true).unwrap();
    p.mmu.set_refuse_mappings(true);

    assert_eq!(p.spt.claim_page(va(BASE)), Err(VmError::MappingFailed));
    assert_eq!(h.pool.in_use(), 0);
    assert_eq!(h.vm.frame_table().stats().resident, 0);
}

#[test]
fn test_teardown_releases_everything() {
    let h = Harness::new(2, 8);
    let mut p = h.process();
    for i in 0..5 {
        p.spt.alloc_page(PageType::Anon, va(BASE + i * PAGE), true).unwrap();
        p.write(BASE + i * PAGE, &page_of(i as u8 + 1)).unwrap();
    }
    p.spt.alloc_page(PageType::Anon, va(BASE + 10 * PAGE), true).unwrap();
    assert!(h.swap_used() > 0);
    assert_eq!(h.pool.in_use(), 2);

    p.spt.teardown();
    assert!(p.spt.is_empty());
    assert_eq!(h.pool.in_use(), 0);
    assert_eq!(h.swap_used(), 0);
    assert_eq!(p.mmu.mapped_count(), 0);
    assert_eq!(h.vm.frame_table().stats().resident, 0);

    // 重复销毁无副作用，之后不再接受新页
    p.spt.teardown();
    assert_eq!(
        p.spt.alloc_page(PageType::Anon, va(BASE), true).err(),
        Some(VmError::TornDown)
    );
}

#[test]
fn test_drop_tears_down() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    p.spt.alloc_page(PageType::Anon, va(BASE), true).unwrap();
    p.write(BASE, b"x").unwrap();
    assert_eq!(h.pool.in_use(), 1);

    drop(p);
    assert_eq!(h.pool.in_use(), 0);
}

#[test]
fn test_remove_writes_back_dirty_file_page() {
    let h = Harness::new(4, 4);
    let mut p = h.process();
    let file = Arc::new(test_support::mock::fs::MockFile::from_bytes(vec![0u8; PAGE]));
    p.spt.mmap(va(BASE), PAGE, true, file.clone(), 0).unwrap();
    p.write(BASE + 3, b"abc").unwrap();
    assert!(p.mmu.translate(BASE + 3).is_some());

    p.spt.remove(va(BASE)).unwrap();
    assert!(p.mmu.translate(BASE + 3).is_none());
    assert!(!p.spt.contains(va(BASE)));
    assert_eq!(&file.contents()[3..6], b"abc");
    assert_eq!(h.pool.in_use(), 0);
}
