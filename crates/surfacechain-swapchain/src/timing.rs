//! Bounded presentation timing history.

use parking_lot::Mutex;
use surfacechain_core::constants::MAX_PRESENTATION_HISTORY;
use surfacechain_core::{Enumeration, PresentTiming};

struct Ring {
    records: [PresentTiming; MAX_PRESENTATION_HISTORY],
    /// Oldest unread record.
    head: usize,
    /// Slot the next record is written to.
    next: usize,
    /// Unread records.
    count: usize,
}

/// Circular history of the most recent presentation timings.
///
/// Guarded by its own lock so recording from the compositor's delivery path
/// never contends with acquisition or surface reconfiguration. Once full, new
/// records evict the oldest unread one; each record is read back at most once.
pub struct PresentHistory {
    ring: Mutex<Ring>,
}

impl Default for PresentHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(Ring {
                records: [PresentTiming::default(); MAX_PRESENTATION_HISTORY],
                head: 0,
                next: 0,
                count: 0,
            }),
        }
    }

    /// Append a record, evicting the oldest unread one when full.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn record(&self, timing: PresentTiming) {
        let mut ring = self.ring.lock();
        if ring.count < MAX_PRESENTATION_HISTORY {
            ring.count += 1;
        } else {
            ring.head = (ring.head + 1) % MAX_PRESENTATION_HISTORY;
        }
        let slot = ring.next;
        ring.records[slot] = timing;
        ring.next = (slot + 1) % MAX_PRESENTATION_HISTORY;
    }

    /// Number of unread records.
    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    /// Check if there are no unread records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move unread records into `dest`, oldest first.
    ///
    /// Without a destination only the unread count is reported and nothing
    /// is consumed.
    pub fn read(&self, dest: Option<&mut [PresentTiming]>) -> Enumeration {
        let mut ring = self.ring.lock();
        let total = ring.count;
        let Some(dest) = dest else {
            return Enumeration::count_only(total);
        };

        let written = dest.len().min(total);
        for slot in dest.iter_mut().take(written) {
            *slot = ring.records[ring.head];
            ring.head = (ring.head + 1) % MAX_PRESENTATION_HISTORY;
            ring.count -= 1;
        }
        Enumeration::filled(written, total)
    }

    /// Move every unread record out, oldest first.
    pub fn drain(&self) -> Vec<PresentTiming> {
        let mut records = vec![PresentTiming::default(); self.len()];
        let result = self.read(Some(&mut records));
        records.truncate(result.written);
        records
    }
}
