// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thread-safe packet pool with RAII references.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{CompletionCallback, PacketId, PortCorePackets, Release};
use crate::protocol::SizedWriter;

/// A [`PortCorePackets`] shared by the threads of one port.
#[derive(Clone, Default)]
pub struct SharedPackets {
    inner: Arc<Mutex<PortCorePackets>>,
}

impl SharedPackets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `writer` to a free packet and return the first reference.
    ///
    /// Each clone of the returned [`PacketRef`] counts as one more user;
    /// `callback` runs once, on the thread dropping the last reference.
    pub fn acquire(&self, writer: SizedWriter, callback: Option<CompletionCallback>) -> PacketRef {
        let content = Arc::new(writer);
        let mut pool = self.inner.lock();
        let id = pool.get_free_packet();
        if let Err(e) = pool.set_content(id, Arc::clone(&content), callback) {
            // Fresh handle from the same locked pool.
            log::error!("[packet] set_content on fresh packet failed: {}", e);
        }
        PacketRef {
            pool: self.clone(),
            id,
            content,
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active_count()
    }

    pub fn inactive_count(&self) -> usize {
        self.inner.lock().inactive_count()
    }

    /// Current use count of a packet, if it is still active.
    pub fn use_count(&self, id: PacketId) -> Option<u32> {
        self.inner.lock().use_count(id).ok()
    }
}

impl std::fmt::Debug for SharedPackets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedPackets").field(&*self.inner.lock()).finish()
    }
}

/// One user's claim on a packet. Cloning increments the use count,
/// dropping decrements it and recycles the packet when it reaches zero.
pub struct PacketRef {
    pool: SharedPackets,
    id: PacketId,
    content: Arc<SizedWriter>,
}

impl PacketRef {
    pub fn id(&self) -> PacketId {
        self.id
    }

    pub fn writer(&self) -> &SizedWriter {
        &self.content
    }
}

impl Clone for PacketRef {
    fn clone(&self) -> Self {
        let result = self.pool.inner.lock().inc(self.id);
        debug_assert!(result.is_ok(), "inc on a live packet reference failed");
        if let Err(e) = result {
            log::error!("[packet] {}", e);
        }
        Self {
            pool: self.pool.clone(),
            id: self.id,
            content: Arc::clone(&self.content),
        }
    }
}

impl Drop for PacketRef {
    fn drop(&mut self) {
        let released = {
            let mut pool = self.pool.inner.lock();
            pool.dec(self.id).and_then(|_| pool.release(self.id))
        };
        match released {
            Ok(Release::Recycled(Some(completion))) => completion.run(),
            Ok(_) => {}
            Err(e) => log::error!("[packet] release failed: {}", e),
        }
    }
}

impl std::fmt::Debug for PacketRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketRef").field("id", &self.id).finish()
    }
}
