//! DMA chain engine scenarios: plain copies, FIFO repacking and 2-D
//! reshapes with negative strides.

use oscar::{DmaAddr, DmaEngine, DmaWordSize, OscarError};

#[test]
fn chain_memcpy_equals_memcmp_for_word_multiples() {
    let mut dma = DmaEngine::new();
    let chain = dma.allocate_chain().unwrap();

    for n in [4usize, 32, 100, 4096] {
        let src: Vec<u8> = (0..n).map(|i| (i * 31 % 255) as u8).collect();
        let mut dst = vec![0u8; n];
        dma.memcpy_sync(chain, dst.as_mut_ptr(), src.as_ptr(), n as u32)
            .unwrap();
        assert_eq!(src, dst, "copy of {n} bytes");
    }
}

#[test]
fn one_dimensional_move_with_sync_point() {
    let mut dma = DmaEngine::new();
    let chain = dma.allocate_chain().unwrap();

    let src: Vec<u8> = (0..64u8).collect();
    let mut dst = vec![0u8; 64];
    dma.add_1d_move(
        chain,
        DmaAddr::Host(dst.as_mut_ptr()),
        DmaWordSize::Bits32,
        16,
        4,
        DmaAddr::Host(src.as_ptr().cast_mut()),
        DmaWordSize::Bits32,
        16,
        4,
    )
    .unwrap();
    dma.add_sync_point(chain).unwrap();
    dma.start(chain).unwrap();
    dma.sync(chain).unwrap();
    assert_eq!(src, dst);
}

#[test]
fn two_dimensional_reshape_with_reversed_row_stride() {
    let mut dma = DmaEngine::new();
    let chain = dma.allocate_chain().unwrap();

    // 256 distinct u32 words.
    let src_words: Vec<u32> = (0..256u32).map(|i| 0x10000 + i).collect();
    let src: Vec<u8> = src_words.iter().flat_map(|w| w.to_le_bytes()).collect();
    let mut tmp = vec![0u8; 1024];
    let mut dst = vec![0u8; 1024];

    // Stage 1: linear copy into the staging buffer.
    dma.add_1d_move(
        chain,
        DmaAddr::Host(tmp.as_mut_ptr()),
        DmaWordSize::Bits32,
        256,
        4,
        DmaAddr::Host(src.as_ptr().cast_mut()),
        DmaWordSize::Bits32,
        256,
        4,
    )
    .unwrap();

    // Stage 2: write the staging buffer back as a 16x16 word block with
    // the destination rows walked bottom-to-top.
    let last_row = unsafe { dst.as_mut_ptr().add(15 * 16 * 4) };
    dma.add_2d_move(
        chain,
        DmaAddr::Host(last_row),
        DmaWordSize::Bits32,
        16,
        4,
        16,
        -((15 * 4) + 16 * 4),
        DmaAddr::Host(tmp.as_mut_ptr()),
        DmaWordSize::Bits32,
        16,
        4,
        16,
        4,
    )
    .unwrap();

    dma.add_sync_point(chain).unwrap();
    dma.start(chain).unwrap();
    dma.sync(chain).unwrap();

    let dst_words: Vec<u32> = dst
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    for row in 0..16 {
        assert_eq!(
            &dst_words[row * 16..(row + 1) * 16],
            &src_words[(15 - row) * 16..(16 - row) * 16],
            "destination row {row}"
        );
    }
}

#[test]
fn fifo_repacks_across_word_sizes() {
    let mut dma = DmaEngine::new();
    let chain = dma.allocate_chain().unwrap();

    let src: Vec<u8> = (0..32u8).collect();
    let mut dst = vec![0u8; 32];
    // 32-bit reads drain into the FIFO; 16-bit writes refill from it.
    dma.add_1d_move(
        chain,
        DmaAddr::Host(dst.as_mut_ptr()),
        DmaWordSize::Bits16,
        16,
        2,
        DmaAddr::Host(src.as_ptr().cast_mut()),
        DmaWordSize::Bits32,
        8,
        4,
    )
    .unwrap();
    dma.add_sync_point(chain).unwrap();
    dma.start(chain).unwrap();
    dma.sync(chain).unwrap();
    assert_eq!(src, dst);
}

#[test]
fn chain_pool_and_reset_semantics() {
    let mut dma = DmaEngine::new();
    let a = dma.allocate_chain().unwrap();
    let _b = dma.allocate_chain().unwrap();
    assert!(matches!(
        dma.allocate_chain(),
        Err(OscarError::NoMoreChainsAvailable)
    ));

    // A reset chain behaves like a freshly allocated one.
    let src = [1u8, 2, 3, 4];
    let mut dst = [0u8; 4];
    dma.memcpy_sync(a, dst.as_mut_ptr(), src.as_ptr(), 4).unwrap();
    dma.reset_chain(a);
    dma.start(a).unwrap();
    assert!(matches!(dma.sync(a), Err(OscarError::Timeout)));
}
