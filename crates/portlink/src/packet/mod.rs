// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference-counted pool of outbound packets.
//!
//! One logical write is bound to a packet and shared, without copying, by
//! every connection that transmits it. The packet returns to the free list
//! only once its use count has dropped to zero and its completion callback
//! has fired.
//!
//! # Lifecycle
//!
//! ```text
//!   inactive ──get_free_packet──► active (count 0)
//!                                   │ set_content       count = 1
//!                                   │ inc / dec         count = n
//!                                   ▼ check_packet      count == 0
//!   inactive ◄───── complete (callback once), recycle ──┘
//! ```
//!
//! [`PortCorePackets`] does no locking of its own. [`SharedPackets`] wraps
//! it in a mutex and hands out [`PacketRef`] guards whose clone and drop do
//! the `inc`/`dec`/`check_packet` dance.

mod shared;

pub use shared::{PacketRef, SharedPackets};

use std::sync::Arc;

use crate::error::PacketError;
use crate::protocol::SizedWriter;

/// Invoked once with the packet's content when the last user is done.
pub type CompletionCallback = Box<dyn FnOnce(&SizedWriter) + Send>;

/// Handle to a pool slot.
///
/// The generation changes each time the slot is handed out again, so a
/// handle kept past recycling is detected instead of aliasing a new packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId {
    index: u32,
    generation: u32,
}

impl PacketId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A pending completion taken out of the pool, to be run outside any lock.
pub struct Completion {
    callback: CompletionCallback,
    content: Arc<SizedWriter>,
}

impl Completion {
    pub fn run(self) {
        (self.callback)(&self.content);
    }
}

/// What `check_packet` did.
pub(crate) enum Release {
    /// Still referenced.
    Held,
    /// Back on the free list; the completion (if any) is handed out.
    Recycled(Option<Completion>),
}

#[derive(Default)]
struct PortCorePacket {
    content: Option<Arc<SizedWriter>>,
    callback: Option<CompletionCallback>,
    use_count: u32,
    completed: bool,
    active: bool,
    generation: u32,
}

impl PortCorePacket {
    fn reset(&mut self) {
        self.content = None;
        self.callback = None;
        self.use_count = 0;
        self.completed = false;
    }

    /// Take the completion exactly once.
    fn complete(&mut self) -> Option<Completion> {
        if self.completed {
            return None;
        }
        self.completed = true;
        match (self.callback.take(), self.content.clone()) {
            (Some(callback), Some(content)) => Some(Completion { callback, content }),
            _ => None,
        }
    }
}

/// Pool of packets split into an active and an inactive list.
///
/// Every slot index is in exactly one of the two lists.
#[derive(Default)]
pub struct PortCorePackets {
    slots: Vec<PortCorePacket>,
    active: Vec<u32>,
    inactive: Vec<u32>,
}

impl PortCorePackets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a free packet (allocating one when the free list is empty) and
    /// move it to the active list.
    pub fn get_free_packet(&mut self) -> PacketId {
        let index = match self.inactive.pop() {
            Some(index) => index,
            None => {
                self.slots.push(PortCorePacket::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        debug_assert!(!slot.active, "free list held an active packet");
        slot.reset();
        slot.active = true;
        slot.generation = slot.generation.wrapping_add(1);
        self.active.push(index);
        PacketId {
            index,
            generation: slot.generation,
        }
    }

    fn slot_mut(&mut self, id: PacketId) -> Result<&mut PortCorePacket, PacketError> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .ok_or(PacketError::StaleHandle {
                index: id.index,
                generation: id.generation,
            })?;
        if slot.generation != id.generation {
            return Err(PacketError::StaleHandle {
                index: id.index,
                generation: id.generation,
            });
        }
        if !slot.active {
            return Err(PacketError::NotActive { index: id.index });
        }
        Ok(slot)
    }

    fn slot(&self, id: PacketId) -> Result<&PortCorePacket, PacketError> {
        let slot = self
            .slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .ok_or(PacketError::StaleHandle {
                index: id.index,
                generation: id.generation,
            })?;
        if !slot.active {
            return Err(PacketError::NotActive { index: id.index });
        }
        Ok(slot)
    }

    /// Bind a packet to a message. The use count starts at one.
    pub fn set_content(
        &mut self,
        id: PacketId,
        content: Arc<SizedWriter>,
        callback: Option<CompletionCallback>,
    ) -> Result<(), PacketError> {
        let slot = self.slot_mut(id)?;
        slot.content = Some(content);
        slot.callback = callback;
        slot.use_count = 1;
        slot.completed = false;
        Ok(())
    }

    /// One more connection is about to transmit the packet.
    pub fn inc(&mut self, id: PacketId) -> Result<u32, PacketError> {
        let slot = self.slot_mut(id)?;
        slot.use_count += 1;
        Ok(slot.use_count)
    }

    /// A connection is done with the packet, successfully or not.
    pub fn dec(&mut self, id: PacketId) -> Result<u32, PacketError> {
        let slot = self.slot_mut(id)?;
        if slot.use_count == 0 {
            debug_assert!(slot.use_count > 0, "packet {} count underflow", id.index);
            log::error!("[packet] count underflow on packet {}", id.index);
            return Err(PacketError::CountUnderflow { index: id.index });
        }
        slot.use_count -= 1;
        Ok(slot.use_count)
    }

    pub fn use_count(&self, id: PacketId) -> Result<u32, PacketError> {
        Ok(self.slot(id)?.use_count)
    }

    pub fn content(&self, id: PacketId) -> Result<Option<Arc<SizedWriter>>, PacketError> {
        Ok(self.slot(id)?.content.clone())
    }

    /// Recycle the packet if nobody uses it any more, firing its completion
    /// first. Returns whether the packet went back to the free list.
    pub fn check_packet(&mut self, id: PacketId) -> Result<bool, PacketError> {
        match self.release(id)? {
            Release::Held => Ok(false),
            Release::Recycled(completion) => {
                if let Some(completion) = completion {
                    completion.run();
                }
                Ok(true)
            }
        }
    }

    /// [`check_packet`](Self::check_packet) without running the callback;
    /// the caller runs it after dropping its lock.
    pub(crate) fn release(&mut self, id: PacketId) -> Result<Release, PacketError> {
        let slot = self.slot_mut(id)?;
        if slot.use_count > 0 {
            return Ok(Release::Held);
        }
        let completion = slot.complete();
        slot.reset();
        slot.active = false;
        if let Some(pos) = self.active.iter().position(|&i| i == id.index) {
            self.active.swap_remove(pos);
        }
        self.inactive.push(id.index);
        log::trace!("[packet] recycled packet {}", id.index);
        Ok(Release::Recycled(completion))
    }

    /// Fire the completion without recycling. Later calls do nothing.
    pub fn complete_packet(&mut self, id: PacketId) -> Result<(), PacketError> {
        if let Some(completion) = self.slot_mut(id)?.complete() {
            completion.run();
        }
        Ok(())
    }

    pub fn is_active(&self, id: PacketId) -> bool {
        self.slot(id).is_ok()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn inactive_count(&self) -> usize {
        self.inactive.len()
    }

    /// Slots ever allocated.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl std::fmt::Debug for PortCorePackets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortCorePackets")
            .field("active", &self.active.len())
            .field("inactive", &self.inactive.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, CompletionCallback) {
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&fired);
        (
            fired,
            Box::new(move |_: &SizedWriter| {
                hook.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn msg() -> Arc<SizedWriter> {
        Arc::new(SizedWriter::from_text("payload"))
    }

    #[test]
    fn test_get_free_packet_moves_to_active() {
        let mut pool = PortCorePackets::new();
        let a = pool.get_free_packet();
        let b = pool.get_free_packet();
        assert_ne!(a.index(), b.index());
        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.inactive_count(), 0);
        assert!(pool.is_active(a));
    }

    #[test]
    fn test_check_packet_recycles_at_zero() {
        let mut pool = PortCorePackets::new();
        let (fired, cb) = counter();
        let id = pool.get_free_packet();
        pool.set_content(id, msg(), Some(cb)).unwrap();

        assert!(!pool.check_packet(id).unwrap());
        assert_eq!(pool.dec(id).unwrap(), 0);
        assert!(pool.check_packet(id).unwrap());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.inactive_count(), 1);
    }

    #[test]
    fn test_recycled_handle_is_rejected() {
        let mut pool = PortCorePackets::new();
        let id = pool.get_free_packet();
        pool.set_content(id, msg(), None).unwrap();
        pool.dec(id).unwrap();
        pool.check_packet(id).unwrap();

        assert_eq!(pool.inc(id), Err(PacketError::NotActive { index: id.index() }));

        let again = pool.get_free_packet();
        assert_eq!(again.index(), id.index());
        assert_ne!(again.generation(), id.generation());
        assert!(matches!(pool.inc(id), Err(PacketError::StaleHandle { .. })));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "count underflow"))]
    fn test_dec_below_zero() {
        let mut pool = PortCorePackets::new();
        let id = pool.get_free_packet();
        assert_eq!(pool.dec(id), Err(PacketError::CountUnderflow { index: id.index() }));
    }

    #[test]
    fn test_complete_packet_fires_once() {
        let mut pool = PortCorePackets::new();
        let (fired, cb) = counter();
        let id = pool.get_free_packet();
        pool.set_content(id, msg(), Some(cb)).unwrap();
        pool.complete_packet(id).unwrap();
        pool.complete_packet(id).unwrap();
        assert!(pool.is_active(id));
        pool.dec(id).unwrap();
        assert!(pool.check_packet(id).unwrap());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_balanced_inc_dec_any_order() {
        for _ in 0..200 {
            let mut pool = PortCorePackets::new();
            let (fired, cb) = counter();
            let id = pool.get_free_packet();
            pool.set_content(id, msg(), Some(cb)).unwrap();

            let users = fastrand::u32(1..8);
            let mut incs = users;
            let mut decs = users;
            let mut count = 1u32;
            while incs + decs > 0 {
                let do_inc = incs > 0 && (count == 1 || decs == 0 || fastrand::bool());
                if do_inc {
                    incs -= 1;
                    count = pool.inc(id).unwrap();
                } else {
                    decs -= 1;
                    count = pool.dec(id).unwrap();
                    assert!(!pool.check_packet(id).unwrap());
                }
                assert!(count >= 1);
            }
            assert_eq!(fired.load(Ordering::SeqCst), 0);
            pool.dec(id).unwrap();
            assert!(pool.check_packet(id).unwrap());
            assert_eq!(fired.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_get_free_never_returns_active() {
        let mut pool = PortCorePackets::new();
        let mut live: Vec<PacketId> = Vec::new();
        for _ in 0..500 {
            if live.is_empty() || fastrand::bool() {
                let id = pool.get_free_packet();
                assert!(!live.iter().any(|p| p.index() == id.index()));
                pool.set_content(id, msg(), None).unwrap();
                live.push(id);
            } else {
                let id = live.swap_remove(fastrand::usize(..live.len()));
                pool.dec(id).unwrap();
                assert!(pool.check_packet(id).unwrap());
            }
            assert_eq!(pool.active_count(), live.len());
            assert_eq!(pool.active_count() + pool.inactive_count(), pool.capacity());
        }
    }

    #[test]
    fn test_three_senders_complete_once() {
        let pool = Arc::new(parking_lot::Mutex::new(PortCorePackets::new()));
        let (fired, cb) = counter();
        let id = {
            let mut p = pool.lock();
            let id = p.get_free_packet();
            p.set_content(id, msg(), Some(cb)).unwrap();
            p.inc(id).unwrap();
            p.inc(id).unwrap();
            id
        };

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let mut p = pool.lock();
                    p.dec(id).unwrap();
                    p.check_packet(id).unwrap()
                })
            })
            .collect();
        let recycled: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();

        assert_eq!(recycled, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let mut p = pool.lock();
        assert_eq!(p.get_free_packet().index(), id.index());
    }
}
