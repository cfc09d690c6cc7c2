//! Per-file hole tracking.
//!
//! A [`HoleList`] records the byte ranges of a destination file that have not
//! yet been copied from the source, as an ordered singly linked chain of
//! [`Hole`] nodes. Writes only ever *subtract* ranges, so the algebra needs
//! removal with splitting but never merging, and the ordering invariant is
//! preserved by construction:
//!
//! - nodes are in strictly increasing offset order;
//! - no two nodes overlap or touch (`node.end() < next.off`);
//! - every node has `len > 0`.

use std::path::Path;

use tracing::{debug, trace};

/// One un-migrated byte range: `[off, off + len)`.
#[derive(Debug)]
pub(crate) struct Hole {
    off: u64,
    len: u64,
    next: Option<Box<Hole>>,
}

impl Hole {
    /// The last byte covered by this hole (inclusive).
    fn end(&self) -> u64 {
        self.off + self.len - 1
    }

    fn contains(&self, offset: u64) -> bool {
        self.off <= offset && offset <= self.end()
    }
}

/// Ordered list of the holes remaining in one destination file.
#[derive(Debug, Default)]
pub(crate) struct HoleList {
    head: Option<Box<Hole>>,
}

impl HoleList {
    /// An empty list: the destination can service every read.
    pub(crate) fn new() -> Self {
        Self { head: None }
    }

    /// A list holding the single hole `[0, len)`, or an empty list when
    /// `len == 0`. Used to back a freshly created destination file with the
    /// full extent of its source file.
    pub(crate) fn whole_file(len: u64) -> Self {
        if len == 0 {
            return Self::new();
        }
        Self {
            head: Some(Box::new(Hole {
                off: 0,
                len,
                next: None,
            })),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn clear(&mut self) {
        // Drop iteratively: a long chain of Box nodes would otherwise recurse
        // on drop.
        let mut cur = self.head.take();
        while let Some(mut hole) = cur {
            cur = hole.next.take();
        }
    }

    /// The first hole as `(offset, len)`, if any.
    pub(crate) fn first(&self) -> Option<(u64, u64)> {
        self.head.as_deref().map(|hole| (hole.off, hole.len))
    }

    /// The inclusive end of the final hole, if any.
    pub(crate) fn last_end(&self) -> Option<u64> {
        let mut cur = self.head.as_deref()?;
        while let Some(next) = cur.next.as_deref() {
            cur = next;
        }
        Some(cur.end())
    }

    /// All holes as `(offset, len)` pairs, in offset order.
    pub(crate) fn ranges(&self) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        let mut cur = self.head.as_deref();
        while let Some(hole) = cur {
            out.push((hole.off, hole.len));
            cur = hole.next.as_deref();
        }
        out
    }

    /// Record that `[offset, offset + len)` now holds destination data by
    /// removing it from every hole it overlaps.
    ///
    /// Walks the chain in order; a hole fully covered by the range is
    /// unlinked, a hole strictly containing it is split in two, and a hole
    /// overlapped on one side is shrunk. The walk stops at the first hole
    /// starting past the range.
    pub(crate) fn remove_range(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        let write_end = offset + (len - 1);
        trace!(offset, write_end, "remove hole range");

        let mut cur = &mut self.head;
        loop {
            let Some(mut hole) = cur.take() else { break };
            if write_end < hole.off {
                // No later hole can overlap. Stop searching.
                *cur = Some(hole);
                break;
            }
            let hole_off = hole.off;
            let hole_end = hole.end();

            if offset <= hole_off && write_end >= hole_end {
                // The range fully covers this hole. Unlink it and re-examine
                // its successor from the same link.
                trace!(hole_off, hole_end, "range fully covers hole");
                *cur = hole.next.take();
                continue;
            }

            if offset > hole_off && write_end < hole_end {
                // The range is strictly inside the hole. Shrink the hole to
                // the left of the range and chain a new node to its right;
                // the new node starts past the range so the walk is done.
                trace!(hole_off, hole_end, "range splits hole");
                let tail = hole.next.take();
                hole.len = offset - hole_off;
                hole.next = Some(Box::new(Hole {
                    off: write_end + 1,
                    len: hole_end - write_end,
                    next: tail,
                }));
                *cur = Some(hole);
                break;
            }

            if offset <= hole_off {
                // The range covers the front of the hole (and ends inside
                // it, or the full-cover arm above would have taken it).
                trace!(hole_off, hole_end, "range overlaps front of hole");
                hole.off = write_end + 1;
                hole.len = hole_end - write_end;
                *cur = Some(hole);
                break;
            }

            if offset <= hole_end {
                // The range covers the tail of the hole and extends past it.
                trace!(hole_off, hole_end, "range overlaps tail of hole");
                hole.len = offset - hole_off;
            }
            // Either a tail shrink (the range may still reach later holes)
            // or no overlap at all: advance.
            *cur = Some(hole);
            let Some(hole) = cur else { unreachable!() };
            cur = &mut hole.next;
        }
    }

    /// Whether a read of `[offset, offset + len)` can be serviced entirely by
    /// the destination file.
    ///
    /// Returns `false` when the read falls entirely inside one hole, `true`
    /// when it is disjoint from every hole.
    ///
    /// # Panics
    ///
    /// Panics when the read partially overlaps a hole. Callers issue
    /// block-aligned, hole-aligned requests; a straddling read means the
    /// caller's alignment contract is broken and servicing it would mix
    /// destination bytes with un-migrated ones.
    pub(crate) fn can_service(&self, offset: u64, len: u64) -> bool {
        assert!(len > 0, "zero-length read");
        let read_end = offset + (len - 1);

        let mut cur = self.head.as_deref();
        while let Some(hole) = cur {
            if read_end < hole.off {
                // All later holes start past the read.
                break;
            }
            if offset <= hole.end() {
                // The read overlaps this hole; it must be contained exactly.
                let begins_inside = hole.contains(offset);
                let ends_inside = hole.contains(read_end);
                if begins_inside && ends_inside {
                    return false;
                }
                panic!(
                    "read {offset}..={read_end} partially covers hole {}..={}",
                    hole.off,
                    hole.end()
                );
            }
            cur = hole.next.as_deref();
        }
        true
    }

    /// Log the list contents and report whether the ordering invariant
    /// holds. Used on the failure path of open-time verification.
    pub(crate) fn dump(&self, name: &Path) -> bool {
        debug!(name = %name.display(), "dumping hole list");
        let mut valid = true;
        let mut prev_end: Option<u64> = None;
        let mut cur = self.head.as_deref();
        while let Some(hole) = cur {
            debug!(off = hole.off, end = hole.end(), "hole");
            if hole.len == 0 || prev_end.is_some_and(|end| end >= hole.off) {
                valid = false;
            }
            prev_end = Some(hole.end());
            cur = hole.next.as_deref();
        }
        valid
    }
}

impl Drop for HoleList {
    fn drop(&mut self) {
        self.clear();
    }
}
