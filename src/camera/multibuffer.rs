//! Multi-buffer rotation.
//!
//! A multi buffer is an ordered rotation over 2..=8 registered frame
//! buffers with two cursors: the buffer the next capture will write
//! (`next_capture`) and the oldest buffer with an unread frame
//! (`next_sync`). The cursor rules guarantee FIFO reads and that a
//! reader never sees a frame still being written.

use tracing::{info, warn};

use crate::camera::sensor::MAX_FRAME_BUFFERS;

/// Sentinel marking "no buffer": the sync cursor takes this value when
/// no captured frame is waiting.
pub const INVALID_BUFFER_ID: u8 = 255;

#[derive(Debug)]
pub(crate) struct MultiBuffer {
    ids: Vec<u8>,
    next_capture: u8,
    next_sync: u8,
}

impl MultiBuffer {
    /// Build a rotation over `ids`. The caller has already validated
    /// depth and membership.
    pub(crate) fn new(ids: &[u8]) -> Self {
        debug_assert!(ids.len() >= 2 && ids.len() <= usize::from(MAX_FRAME_BUFFERS));
        MultiBuffer {
            next_capture: ids[0],
            // No capture has happened, so there is nothing to sync to.
            next_sync: INVALID_BUFFER_ID,
            ids: ids.to_vec(),
        }
    }

    pub(crate) fn contains(&self, id: u8) -> bool {
        self.ids.contains(&id)
    }

    /// The buffer the next capture will be written to.
    pub(crate) fn capture_buffer(&self) -> u8 {
        self.next_capture
    }

    /// The oldest buffer holding an unread frame, if any.
    pub(crate) fn sync_buffer(&self) -> Option<u8> {
        if self.next_sync == INVALID_BUFFER_ID {
            None
        } else {
            Some(self.next_sync)
        }
    }

    fn next_after(&self, id: u8) -> u8 {
        match self.ids.iter().position(|&i| i == id) {
            Some(pos) => self.ids[(pos + 1) % self.ids.len()],
            None => INVALID_BUFFER_ID,
        }
    }

    /// Account for a successfully scheduled capture.
    ///
    /// Arming more captures than the rotation holds unread frames laps
    /// the writer; the sync cursor then skips the overwritten frame and
    /// may coincide with the capture cursor until the next arm moves it
    /// along again.
    pub(crate) fn on_capture(&mut self) {
        let current = self.next_capture;
        self.next_capture = self.next_after(current);

        if self.next_sync == INVALID_BUFFER_ID {
            // The capture just scheduled becomes the next to read.
            self.next_sync = current;
        } else if self.next_sync == current {
            // Sync must keep lagging behind capture.
            self.next_sync = self.next_after(current);
        }
    }

    /// Account for a successfully completed read.
    pub(crate) fn on_sync(&mut self) {
        let current = self.next_sync;
        self.next_sync = self.next_after(current);

        if self.next_sync == self.next_capture {
            // Nothing captured beyond this point yet.
            self.next_sync = INVALID_BUFFER_ID;
        }
    }
}

/// Slot holding the camera's optional multi buffer.
#[derive(Debug, Default)]
pub(crate) struct MultiBufferSlot(Option<MultiBuffer>);

impl MultiBufferSlot {
    pub(crate) fn create(&mut self, ids: &[u8]) {
        if self.0.is_some() {
            info!("replacing existing multi buffer");
        }
        self.0 = Some(MultiBuffer::new(ids));
    }

    pub(crate) fn destroy(&mut self) {
        if self.0.is_none() {
            warn!("no multi buffer to delete");
        }
        self.0 = None;
    }

    pub(crate) fn get(&self) -> Option<&MultiBuffer> {
        self.0.as_ref()
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut MultiBuffer> {
        self.0.as_mut()
    }

    pub(crate) fn member(&self, id: u8) -> bool {
        self.0.as_ref().is_some_and(|mb| mb.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_rotation_over_depth_four() {
        let mut mb = MultiBuffer::new(&[4, 5, 6, 7]);
        assert_eq!(mb.sync_buffer(), None);

        let mut captured = Vec::new();
        for _ in 0..4 {
            captured.push(mb.capture_buffer());
            mb.on_capture();
        }
        assert_eq!(captured, [4, 5, 6, 7]);

        let mut read = Vec::new();
        for _ in 0..4 {
            read.push(mb.sync_buffer().unwrap());
            mb.on_sync();
        }
        assert_eq!(read, [4, 5, 6, 7]);
        assert_eq!(mb.sync_buffer(), None);
    }

    #[test]
    fn sync_lags_capture_when_the_rotation_laps() {
        let mut mb = MultiBuffer::new(&[0, 1]);
        mb.on_capture(); // writes 0, sync -> 0
        mb.on_capture(); // writes 1, capture wraps to 0
        assert_eq!(mb.sync_buffer(), Some(0));
        // A third capture overwrites 0, which the reader has not seen;
        // the sync cursor skips the lost frame and moves on to 1 while
        // the capture cursor wraps back to 1 as well.
        mb.on_capture();
        assert_eq!(mb.sync_buffer(), Some(1));
        assert_eq!(mb.capture_buffer(), 1);
    }

    #[test]
    fn cursors_never_alias_unless_sync_is_invalid() {
        let mut mb = MultiBuffer::new(&[2, 3, 5]);
        for _ in 0..10 {
            mb.on_capture();
            if let Some(sync) = mb.sync_buffer() {
                assert_ne!(sync, mb.capture_buffer());
            }
            mb.on_sync();
            if let Some(sync) = mb.sync_buffer() {
                assert_ne!(sync, mb.capture_buffer());
            }
        }
    }

    #[test]
    fn interleaved_capture_and_sync_preserve_order() {
        let mut mb = MultiBuffer::new(&[1, 2, 3]);
        mb.on_capture();
        assert_eq!(mb.sync_buffer(), Some(1));
        mb.on_sync();
        assert_eq!(mb.sync_buffer(), None);
        mb.on_capture();
        mb.on_capture();
        assert_eq!(mb.sync_buffer(), Some(2));
        mb.on_sync();
        assert_eq!(mb.sync_buffer(), Some(3));
    }
}
