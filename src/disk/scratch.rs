//! Per-thread scratch buffer for pixel reads.

use std::cell::RefCell;

thread_local! {
    static SCRATCH: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Hands the calling thread exclusive access to its scratch buffer.
///
/// The buffer grows to the largest read the thread has performed and
/// never shrinks. Data left in it is only valid until the next borrow
/// from the same thread, so anything that outlives the closure must be
/// copied into an owned buffer first.
pub(crate) fn with<R>(f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
    SCRATCH.with(|scratch| f(&mut scratch.borrow_mut()))
}

/// Grows `scratch` so that at least `len` bytes are addressable.
pub(crate) fn reserve(scratch: &mut Vec<u8>, len: usize) {
    if scratch.len() < len {
        scratch.resize(len, 0);
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn capacity_grows_monotonically() {
        super::with(|scratch| {
            super::reserve(scratch, 4096);
            assert!(scratch.len() >= 4096);
        });

        super::with(|scratch| {
            let before = scratch.capacity();
            super::reserve(scratch, 16);
            assert!(scratch.capacity() >= before);
            assert!(scratch.len() >= 4096);
        });
    }
}
