//! Re-usable memory-DMA chains.
//!
//! A chain is a fixed-capacity list of 1-D or 2-D memory moves plus an
//! optional sync point. On the camera the chain is executed by the two
//! memory-DMA channels of the DSP, which are connected through a
//! hardware FIFO; on the host the engine executes each move in
//! software against a FIFO-equivalent temporary buffer, reproducing
//! the hardware semantics exactly, including word-size changes
//! between the source and destination side of one move, which the FIFO
//! repacks.
//!
//! Chains come from a fixed pool of two and are reused by resetting
//! them; they are not reference counted.
//!
//! # Safety
//!
//! Descriptors carry raw addresses and the engine moves memory through
//! them. Callers own the safety argument that every descriptor added
//! to a chain points at live, sufficiently sized memory when
//! [`DmaEngine::start`] runs; the individual transfer loops document
//! the invariants they rely on.

// Software DMA emulation moves raw memory by design.
#![allow(unsafe_code)]

use tracing::{debug, error};

use crate::error::{OscarError, OscarResult};

/// The maximum number of moves in one chain.
pub const MAX_MOVES_PER_CHAIN: usize = 4;
/// The number of chains in the pool.
pub const MAX_CHAINS: usize = 2;

/// Configuration-word bits of a DMA channel, as the hardware defines
/// them.
mod config {
    /// Channel enable.
    pub const DMAEN: u16 = 0x0001;
    /// Direction: write (set) or read (clear).
    pub const WNR: u16 = 0x0002;
    /// Word size 16 bits.
    pub const WDSIZE_16: u16 = 0x0004;
    /// Word size 32 bits.
    pub const WDSIZE_32: u16 = 0x0008;
    /// 2-D addressing.
    pub const DMA2D: u16 = 0x0010;
    /// Synchronized execution; required when the word size changes
    /// between descriptors.
    pub const SYNC: u16 = 0x0020;
}

/// Transfer word size of one DMA cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaWordSize {
    Bits8,
    Bits16,
    Bits32,
}

impl DmaWordSize {
    /// Bytes moved per DMA cycle.
    pub fn bytes(self) -> usize {
        match self {
            DmaWordSize::Bits8 => 1,
            DmaWordSize::Bits16 => 2,
            DmaWordSize::Bits32 => 4,
        }
    }

    fn config_bits(self) -> u16 {
        match self {
            DmaWordSize::Bits8 => 0,
            DmaWordSize::Bits16 => config::WDSIZE_16,
            DmaWordSize::Bits32 => config::WDSIZE_32,
        }
    }

    fn from_config(cfg: u16) -> Self {
        if cfg & config::WDSIZE_16 != 0 {
            DmaWordSize::Bits16
        } else if cfg & config::WDSIZE_32 != 0 {
            DmaWordSize::Bits32
        } else {
            DmaWordSize::Bits8
        }
    }
}

/// A transfer start address. Hardware addresses describe the DSP
/// address space; host addresses are process-virtual and are the only
/// kind the software emulation can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaAddr {
    Hardware(u32),
    Host(*mut u8),
}

impl DmaAddr {
    /// Address of the first byte of a slice.
    pub fn from_slice(slice: &mut [u8]) -> Self {
        DmaAddr::Host(slice.as_mut_ptr())
    }
}

/// One side (source or destination) of a scheduled move.
#[derive(Debug, Clone, Copy)]
struct DmaDescriptor {
    start: DmaAddr,
    config: u16,
    x_count: u16,
    x_modify: i16,
    y_count: u16,
    y_modify: i16,
}

impl DmaDescriptor {
    const fn empty() -> Self {
        DmaDescriptor {
            start: DmaAddr::Hardware(0),
            config: 0,
            x_count: 0,
            x_modify: 0,
            y_count: 0,
            y_modify: 0,
        }
    }

    fn word_size(&self) -> DmaWordSize {
        DmaWordSize::from_config(self.config)
    }
}

#[derive(Debug)]
struct DmaChain {
    /// Zeroed when a transfer starts, overwritten with ones by the
    /// final operation of the chain if a sync point was added.
    sync_flag: u32,
    has_sync_point: bool,
    n_moves: usize,
    src: [DmaDescriptor; MAX_MOVES_PER_CHAIN],
    dst: [DmaDescriptor; MAX_MOVES_PER_CHAIN],
}

impl DmaChain {
    const fn new() -> Self {
        DmaChain {
            sync_flag: 0,
            has_sync_point: false,
            n_moves: 0,
            src: [DmaDescriptor::empty(); MAX_MOVES_PER_CHAIN],
            dst: [DmaDescriptor::empty(); MAX_MOVES_PER_CHAIN],
        }
    }

    fn reset(&mut self) {
        *self = DmaChain::new();
    }
}

/// Handle to an allocated chain in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHandle(usize);

/// The DMA engine with its chain pool.
#[derive(Debug)]
pub struct DmaEngine {
    chains: [DmaChain; MAX_CHAINS],
    allocated: [bool; MAX_CHAINS],
}

impl Default for DmaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaEngine {
    pub fn new() -> Self {
        DmaEngine {
            chains: [DmaChain::new(), DmaChain::new()],
            allocated: [false; MAX_CHAINS],
        }
    }

    /// Allocate a zero-initialized, re-usable chain from the pool.
    pub fn allocate_chain(&mut self) -> OscarResult<ChainHandle> {
        let Some(idx) = self.allocated.iter().position(|used| !used) else {
            error!("chain pool exhausted");
            return Err(OscarError::NoMoreChainsAvailable);
        };
        self.allocated[idx] = true;
        self.chains[idx].reset();
        Ok(ChainHandle(idx))
    }

    /// Drop all moves pending in the chain.
    pub fn reset_chain(&mut self, handle: ChainHandle) {
        self.chains[handle.0].reset();
    }

    fn chain_mut(&mut self, handle: ChainHandle) -> &mut DmaChain {
        &mut self.chains[handle.0]
    }

    fn push_move(
        &mut self,
        handle: ChainHandle,
        dst: DmaDescriptor,
        src: DmaDescriptor,
    ) -> OscarResult<()> {
        let chain = self.chain_mut(handle);
        if chain.n_moves >= MAX_MOVES_PER_CHAIN {
            return Err(OscarError::InvalidParameter(format!(
                "chain already holds {MAX_MOVES_PER_CHAIN} moves"
            )));
        }
        // All source word sizes in a chain must match, and likewise all
        // destination word sizes; the hardware locks up otherwise.
        if chain.n_moves > 0 {
            if chain.src[0].word_size() != src.word_size()
                || chain.dst[0].word_size() != dst.word_size()
            {
                return Err(OscarError::InvalidParameter(
                    "word size differs from earlier moves in the chain".into(),
                ));
            }
        }
        chain.src[chain.n_moves] = src;
        chain.dst[chain.n_moves] = dst;
        chain.n_moves += 1;
        Ok(())
    }

    /// Append a 1-D memory move to the chain. The transfer does not
    /// start until [`Self::start`].
    #[allow(clippy::too_many_arguments)]
    pub fn add_1d_move(
        &mut self,
        handle: ChainHandle,
        dst: DmaAddr,
        dst_word: DmaWordSize,
        dst_count: u16,
        dst_modify: i16,
        src: DmaAddr,
        src_word: DmaWordSize,
        src_count: u16,
        src_modify: i16,
    ) -> OscarResult<()> {
        let sync = if dst_word != src_word { config::SYNC } else { 0 };
        self.push_move(
            handle,
            DmaDescriptor {
                start: dst,
                config: config::DMAEN | config::WNR | dst_word.config_bits() | sync,
                x_count: dst_count,
                x_modify: dst_modify,
                y_count: 1,
                y_modify: 0,
            },
            DmaDescriptor {
                start: src,
                config: config::DMAEN | src_word.config_bits() | sync,
                x_count: src_count,
                x_modify: src_modify,
                y_count: 1,
                y_modify: 0,
            },
        )
    }

    /// Append a 2-D memory move to the chain. Counts are in words, the
    /// X modify is applied after every word, the Y modify after every
    /// row (replacing the last X modify).
    #[allow(clippy::too_many_arguments)]
    pub fn add_2d_move(
        &mut self,
        handle: ChainHandle,
        dst: DmaAddr,
        dst_word: DmaWordSize,
        dst_x_count: u16,
        dst_x_modify: i16,
        dst_y_count: u16,
        dst_y_modify: i16,
        src: DmaAddr,
        src_word: DmaWordSize,
        src_x_count: u16,
        src_x_modify: i16,
        src_y_count: u16,
        src_y_modify: i16,
    ) -> OscarResult<()> {
        let sync = if dst_word != src_word { config::SYNC } else { 0 };
        self.push_move(
            handle,
            DmaDescriptor {
                start: dst,
                config: config::DMAEN
                    | config::WNR
                    | config::DMA2D
                    | dst_word.config_bits()
                    | sync,
                x_count: dst_x_count,
                x_modify: dst_x_modify,
                y_count: dst_y_count,
                y_modify: dst_y_modify,
            },
            DmaDescriptor {
                start: src,
                config: config::DMAEN | config::DMA2D | src_word.config_bits() | sync,
                x_count: src_x_count,
                x_modify: src_x_modify,
                y_count: src_y_count,
                y_modify: src_y_modify,
            },
        )
    }

    /// Append the final descriptor that raises the chain's sync flag
    /// once every preceding move has fully retired. Without a sync
    /// point, [`Self::sync`] has nothing to wait on.
    pub fn add_sync_point(&mut self, handle: ChainHandle) -> OscarResult<()> {
        self.chain_mut(handle).has_sync_point = true;
        Ok(())
    }

    /// Execute the chain. On the host this performs every move
    /// synchronously before returning.
    pub fn start(&mut self, handle: ChainHandle) -> OscarResult<()> {
        let chain = &mut self.chains[handle.0];
        chain.sync_flag = 0;

        for mv in 0..chain.n_moves {
            let src = chain.src[mv];
            let dst = chain.dst[mv];

            // The FIFO between the two hardware channels, as a
            // temporary buffer sized by what the source channel drains.
            let mut fifo_len = src.word_size().bytes() * usize::from(src.x_count);
            if src.config & config::DMA2D != 0 {
                fifo_len *= usize::from(src.y_count);
            }
            let mut fifo = vec![0u8; fifo_len];

            channel_copy(&src, &mut fifo)?;
            channel_copy(&dst, &mut fifo)?;
        }

        if chain.has_sync_point {
            chain.sync_flag = !0;
        }
        debug!(moves = chain.n_moves, "chain executed");
        Ok(())
    }

    /// Wait until the chain's sync point has been reached. A chain
    /// executed by hardware is bounded by a watchdog of roughly twenty
    /// seconds; chains executed in software complete within
    /// [`Self::start`], so only the flag needs checking.
    pub fn sync(&mut self, handle: ChainHandle) -> OscarResult<()> {
        let chain = &self.chains[handle.0];
        if chain.sync_flag != 0 {
            Ok(())
        } else {
            Err(OscarError::Timeout)
        }
    }

    /// Copy `len` bytes without waiting for completion. `len` must be a
    /// multiple of four; the copy runs as a single 32-bit 1-D move.
    pub fn memcpy(
        &mut self,
        handle: ChainHandle,
        dst: *mut u8,
        src: *const u8,
        len: u32,
    ) -> OscarResult<()> {
        if len % 4 != 0 {
            return Err(OscarError::InvalidParameter(format!(
                "copy length {len} is not a multiple of 4"
            )));
        }
        self.reset_chain(handle);
        let words = (len / 4) as u16;
        self.add_1d_move(
            handle,
            DmaAddr::Host(dst),
            DmaWordSize::Bits32,
            words,
            4,
            DmaAddr::Host(src.cast_mut()),
            DmaWordSize::Bits32,
            words,
            4,
        )?;
        self.add_sync_point(handle)?;
        self.start(handle)
    }

    /// Copy `len` bytes and wait for completion.
    pub fn memcpy_sync(
        &mut self,
        handle: ChainHandle,
        dst: *mut u8,
        src: *const u8,
        len: u32,
    ) -> OscarResult<()> {
        self.memcpy(handle, dst, src, len)?;
        self.sync(handle)
    }
}

/// Move the data of one channel descriptor between its memory and the
/// FIFO buffer. Write-direction descriptors drain the FIFO into their
/// memory; read-direction descriptors fill it.
///
/// The loop mirrors the hardware exactly: the X modify is applied
/// after every word, and at the end of each row the last X modify is
/// replaced by the Y modify.
fn channel_copy(desc: &DmaDescriptor, fifo: &mut [u8]) -> OscarResult<()> {
    let DmaAddr::Host(addr) = desc.start else {
        return Err(OscarError::InvalidParameter(
            "hardware address in software-executed chain".into(),
        ));
    };

    // SAFETY: the caller of `start` guarantees that `addr` points at
    // live memory covering every address the descriptor walk visits.
    // The FIFO side stays in bounds because it was sized from the
    // source descriptor and the word loop below never writes more than
    // x_count * y_count words.
    unsafe {
        match desc.word_size() {
            DmaWordSize::Bits8 => copy_words::<u8>(desc, addr.cast(), fifo.as_mut_ptr().cast()),
            DmaWordSize::Bits16 => copy_words::<u16>(desc, addr.cast(), fifo.as_mut_ptr().cast()),
            DmaWordSize::Bits32 => copy_words::<u32>(desc, addr.cast(), fifo.as_mut_ptr().cast()),
        }
    }
    Ok(())
}

/// # Safety
///
/// `mem` must be valid for the full descriptor walk and `fifo` for
/// `x_count * y_count` elements of `T`.
unsafe fn copy_words<T: Copy>(desc: &DmaDescriptor, mem: *mut T, fifo: *mut T) {
    let word = std::mem::size_of::<T>() as isize;
    // Address modifies are in bytes; pointer arithmetic below works in
    // words, as the hardware does.
    let mem_mod_x = isize::from(desc.x_modify) / word;
    let mem_mod_y = isize::from(desc.y_modify) / word;

    let write = desc.config & config::WNR != 0;
    let (mut rd, mut wr) = if write { (fifo, mem) } else { (mem, fifo) };
    let (rd_mod_x, rd_mod_y, wr_mod_x, wr_mod_y) = if write {
        (1, 1, mem_mod_x, mem_mod_y)
    } else {
        (mem_mod_x, mem_mod_y, 1, 1)
    };

    for _ in 0..desc.y_count {
        for _ in 0..desc.x_count {
            // Byte buffers give no alignment guarantee for wider words.
            wr.write_unaligned(rd.read_unaligned());
            wr = wr.offset(wr_mod_x);
            rd = rd.offset(rd_mod_x);
        }
        wr = wr.offset(wr_mod_y - wr_mod_x);
        rd = rd.offset(rd_mod_y - rd_mod_x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_holds_exactly_two_chains() {
        let mut dma = DmaEngine::new();
        dma.allocate_chain().unwrap();
        dma.allocate_chain().unwrap();
        assert!(matches!(
            dma.allocate_chain(),
            Err(OscarError::NoMoreChainsAvailable)
        ));
    }

    #[test]
    fn memcpy_copies_and_raises_the_sync_flag() {
        let mut dma = DmaEngine::new();
        let chain = dma.allocate_chain().unwrap();

        let src: Vec<u8> = (0..64u8).collect();
        let mut dst = vec![0u8; 64];
        dma.memcpy_sync(chain, dst.as_mut_ptr(), src.as_ptr(), 64)
            .unwrap();
        assert_eq!(src, dst);
    }

    #[test]
    fn memcpy_rejects_unaligned_lengths() {
        let mut dma = DmaEngine::new();
        let chain = dma.allocate_chain().unwrap();
        let src = [0u8; 8];
        let mut dst = [0u8; 8];
        assert!(matches!(
            dma.memcpy(chain, dst.as_mut_ptr(), src.as_ptr(), 6),
            Err(OscarError::InvalidParameter(_))
        ));
    }

    #[test]
    fn sync_without_a_sync_point_times_out() {
        let mut dma = DmaEngine::new();
        let chain = dma.allocate_chain().unwrap();

        let src = [0u8; 8];
        let mut dst = [0u8; 8];
        dma.add_1d_move(
            chain,
            DmaAddr::Host(dst.as_mut_ptr()),
            DmaWordSize::Bits32,
            2,
            4,
            DmaAddr::Host(src.as_ptr().cast_mut()),
            DmaWordSize::Bits32,
            2,
            4,
        )
        .unwrap();
        dma.start(chain).unwrap();
        assert!(matches!(dma.sync(chain), Err(OscarError::Timeout)));
    }

    #[test]
    fn word_size_change_repacks_through_the_fifo() {
        let mut dma = DmaEngine::new();
        let chain = dma.allocate_chain().unwrap();

        // Read 32-bit words, write the same bytes back as 8-bit words.
        let src: Vec<u8> = (0..16u8).collect();
        let mut dst = vec![0u8; 16];
        dma.add_1d_move(
            chain,
            DmaAddr::Host(dst.as_mut_ptr()),
            DmaWordSize::Bits8,
            16,
            1,
            DmaAddr::Host(src.as_ptr().cast_mut()),
            DmaWordSize::Bits32,
            4,
            4,
        )
        .unwrap();
        dma.add_sync_point(chain).unwrap();
        dma.start(chain).unwrap();
        dma.sync(chain).unwrap();
        assert_eq!(src, dst);
    }

    #[test]
    fn mixed_word_sizes_within_a_chain_are_rejected() {
        let mut dma = DmaEngine::new();
        let chain = dma.allocate_chain().unwrap();
        let a = [0u8; 8];
        let mut b = [0u8; 8];

        dma.add_1d_move(
            chain,
            DmaAddr::Host(b.as_mut_ptr()),
            DmaWordSize::Bits32,
            2,
            4,
            DmaAddr::Host(a.as_ptr().cast_mut()),
            DmaWordSize::Bits32,
            2,
            4,
        )
        .unwrap();
        let err = dma.add_1d_move(
            chain,
            DmaAddr::Host(b.as_mut_ptr()),
            DmaWordSize::Bits16,
            4,
            2,
            DmaAddr::Host(a.as_ptr().cast_mut()),
            DmaWordSize::Bits32,
            2,
            4,
        );
        assert!(matches!(err, Err(OscarError::InvalidParameter(_))));
    }

    #[test]
    fn reset_restores_the_freshly_allocated_state() {
        let mut dma = DmaEngine::new();
        let chain = dma.allocate_chain().unwrap();
        let a = [0u8; 8];
        let mut b = [0u8; 8];
        dma.add_1d_move(
            chain,
            DmaAddr::Host(b.as_mut_ptr()),
            DmaWordSize::Bits32,
            2,
            4,
            DmaAddr::Host(a.as_ptr().cast_mut()),
            DmaWordSize::Bits32,
            2,
            4,
        )
        .unwrap();
        dma.add_sync_point(chain).unwrap();
        dma.reset_chain(chain);

        // After a reset, running the chain does nothing and sync has
        // nothing to report.
        dma.start(chain).unwrap();
        assert!(matches!(dma.sync(chain), Err(OscarError::Timeout)));
    }

    #[test]
    fn negative_y_modify_reverses_rows() {
        let mut dma = DmaEngine::new();
        let chain = dma.allocate_chain().unwrap();

        // 4x4 matrix of bytes, copied with the destination rows walked
        // bottom-to-top.
        let src: Vec<u8> = (0..16u8).collect();
        let mut dst = vec![0u8; 16];
        dma.add_2d_move(
            chain,
            DmaAddr::Host(unsafe { dst.as_mut_ptr().add(12) }),
            DmaWordSize::Bits8,
            4,
            1,
            4,
            -(3 + 4),
            DmaAddr::Host(src.as_ptr().cast_mut()),
            DmaWordSize::Bits8,
            4,
            1,
            4,
            1,
        )
        .unwrap();
        dma.add_sync_point(chain).unwrap();
        dma.start(chain).unwrap();
        dma.sync(chain).unwrap();

        for row in 0..4 {
            assert_eq!(
                &dst[row * 4..row * 4 + 4],
                &src[(3 - row) * 4..(3 - row) * 4 + 4]
            );
        }
    }
}
