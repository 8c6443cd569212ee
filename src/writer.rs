//! The outgoing half of the buffer-brokerage engine: [`Writer`] brokers a
//! single transport buffer plus an optional queue between a provider (the
//! record layer) and a consumer (the caller writing a message); [`WriterExt`]
//! layers bounded, nestable groups and a declared total length on top.
//!
//! Ported from mbedtls's `mps/writer.c`. The C version hands out raw
//! pointers into a buffer that is *borrowed* from the provider for the
//! consuming cycle and handed back on reclaim; here, the provider instead
//! *moves* the buffer into the `Writer` on `feed` and gets it back by value
//! from `reclaim`, which sidesteps the self-referential-borrow problem the
//! C pointer style runs into when the same discipline is wanted in safe
//! Rust (see DESIGN.md).

use crate::error::Error;

/// Outcome of a successful [`Writer::reclaim`]: the transport buffer
/// that was fed in, handed back to the provider for dispatch, together
/// with how much of it (and of the queue) holds committed data.
#[derive(Debug, PartialEq, Eq)]
pub struct ReclaimOutcome {
    /// The buffer most recently passed to `feed`, given back to the
    /// provider now that the writer is done with it.
    pub buf: Vec<u8>,
    /// Bytes committed into `buf`; only `buf[..written]` is meaningful.
    pub written: usize,
    /// Bytes committed beyond `buf`, now pending in the queue and
    /// waiting to be dispatched into a future `feed`.
    pub queued: usize,
}

/// Brokers a single outgoing transport buffer, plus an optional queue, for
/// a consumer that writes messages whose size isn't known to line up with
/// transport buffer boundaries.
///
/// A `Writer` is always either *providing* (no buffer held, awaiting
/// `feed`) or *consuming* (`out` is `Some`). The queue, if any, is
/// supplied once at construction and lives for the writer's entire life.
#[derive(Debug)]
pub struct Writer {
    queue: Option<Vec<u8>>,
    queue_len: usize,
    queue_next: usize,
    queue_remaining: usize,

    out: Option<Vec<u8>>,
    out_len: usize,
    committed: usize,
    end: usize,
}

impl Writer {
    /// Creates a writer in providing state. `queue`, if given, is held for
    /// the writer's entire lifetime and used to absorb writes that would
    /// otherwise overflow whatever buffer is fed to it.
    pub fn new(queue: Option<Vec<u8>>) -> Self {
        let queue_len = queue.as_ref().map_or(0, Vec::len);
        Writer {
            queue,
            queue_len,
            queue_next: 0,
            queue_remaining: 0,
            out: None,
            out_len: 0,
            committed: 0,
            end: 0,
        }
    }

    pub fn is_providing(&self) -> bool {
        self.out.is_none()
    }

    /// `committed` as last reported by `reclaim`. Only meaningful in
    /// providing state; returns 0 before the first `reclaim`, matching the
    /// source (which zeroes `committed` as part of returning to providing
    /// state, so this accessor is really only ever observed to be 0 -- kept
    /// for parity with the original API regardless).
    pub fn bytes_written(&self) -> Result<usize, Error> {
        if !self.is_providing() {
            return Err(Error::OperationUnexpected);
        }
        Ok(self.committed)
    }

    /// Providing -> consuming. If the queue holds bytes left over from a
    /// previous cycle, drains as much of it as fits into `buf` first.
    ///
    /// Fails with [`Error::NeedMore`] (staying in providing state) if the
    /// queue alone filled `buf`; the caller must dispatch `buf` and feed a
    /// fresh one before anything new can be written.
    pub fn feed(&mut self, buf: Vec<u8>) -> Result<(), Error> {
        if !self.is_providing() {
            return Err(Error::OperationUnexpected);
        }

        let buf_len = buf.len();
        let mut buf = buf;
        let mut copied = 0usize;

        if self.queue.is_some() {
            let qr = self.queue_remaining;
            let qa = self.queue_next;
            copied = qr.min(buf_len);

            if copied != 0 {
                let queue = self.queue.as_ref().expect("checked above");
                buf[..copied].copy_from_slice(&queue[qa..qa + copied]);
            }

            let qr_after = qr - copied;
            if qr_after > 0 {
                self.queue_remaining = qr_after;
                self.queue_next = qa + copied;
                return Err(Error::NeedMore);
            }

            self.queue_next = 0;
            self.queue_remaining = 0;
        }

        self.out_len = buf_len;
        self.committed = copied;
        self.end = copied;
        self.out = Some(buf);
        trace!("writer: fed {}-byte buffer, {} bytes drained from queue", buf_len, copied);
        Ok(())
    }

    /// Hands out a slice of `desired` bytes starting at the fetch cursor,
    /// transparently switching from the output buffer to the queue (and
    /// from the queue to further queue bytes) as needed. When
    /// `allow_partial` is `false`, the call fails with
    /// [`Error::OutOfData`] rather than serve a short slice.
    pub fn get(&mut self, desired: usize, allow_partial: bool) -> Result<(&mut [u8], usize), Error> {
        if self.is_providing() {
            return Err(Error::OperationUnexpected);
        }

        let out_len = self.out_len;
        let end = self.end;

        // Already serving from the queue.
        if end > out_len {
            let queue_len = self.queue_len;
            let qn = self.queue_next;
            let qo = qn + (end - out_len);
            let queue_avail = queue_len - qo;

            let served = if queue_avail < desired {
                if !allow_partial {
                    return Err(Error::OutOfData);
                }
                queue_avail
            } else {
                desired
            };

            self.end = end + served;
            let queue = self.queue.as_mut().expect("end > out_len implies a queue is attached");
            return Ok((&mut queue[qo..qo + served], served));
        }

        // Still serving from the output buffer.
        let out_avail = out_len - end;
        if out_avail < desired {
            let queue_len = self.queue_len;
            if self.queue.is_some() && queue_len > out_avail {
                let mut served = desired;
                if allow_partial && served > queue_len {
                    served = queue_len;
                }
                let overflow = end.checked_add(served).is_none();
                if overflow || served > queue_len {
                    return Err(Error::OutOfData);
                }

                // Remember the overlap between queue and output buffer.
                self.queue_next = out_avail;
                self.end = end + served;
                let queue = self.queue.as_mut().expect("checked above");
                return Ok((&mut queue[..served], served));
            }

            if !allow_partial {
                return Err(Error::OutOfData);
            }
            let served = out_avail;
            self.end = end + served;
            let out = self.out.as_mut().expect("consuming state implies out is present");
            return Ok((&mut out[end..end + served], served));
        }

        self.end = end + desired;
        let out = self.out.as_mut().expect("consuming state implies out is present");
        Ok((&mut out[end..end + desired], desired))
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        self.commit_partial(0)
    }

    /// Ratifies all but the last `omit` bytes handed out since the last
    /// commit. If this commit crosses from the output buffer into the
    /// queue, materialises the overlapping queue prefix into the tail of
    /// the output buffer, since whatever the provider reclaims must be
    /// contiguous.
    pub fn commit_partial(&mut self, omit: usize) -> Result<(), Error> {
        if self.is_providing() {
            return Err(Error::OperationUnexpected);
        }

        let committed = self.committed;
        let end = self.end;
        let out_len = self.out_len;
        let queue_overlap = self.queue_next;

        if omit > end - committed {
            return Err(Error::InvalidArg);
        }
        let to_be_committed = end - omit;

        if end > out_len && committed < out_len && to_be_committed > out_len - queue_overlap {
            let mut copy_from_queue = to_be_committed - (out_len - queue_overlap);
            if copy_from_queue > queue_overlap {
                copy_from_queue = queue_overlap;
            }
            let start = out_len - queue_overlap;

            let queue = self.queue.as_ref().expect("queue_overlap > 0 implies a queue is attached");
            let tail = queue[..copy_from_queue].to_vec();
            let out = self.out.as_mut().expect("consuming state implies out is present");
            out[start..start + copy_from_queue].copy_from_slice(&tail);
        }

        if to_be_committed < out_len {
            self.queue_next = 0;
        }

        self.end = to_be_committed;
        self.committed = to_be_committed;
        Ok(())
    }

    /// Consuming -> providing. Fails with [`Error::DataLeft`] if there is
    /// unconsumed space left in the output buffer and `force` is `false`.
    pub fn reclaim(&mut self, force: bool) -> Result<ReclaimOutcome, Error> {
        if self.is_providing() {
            return Err(Error::OperationUnexpected);
        }

        let committed = self.committed;
        let out_len = self.out_len;
        let written;

        if committed <= out_len {
            written = committed;
            self.queue_next = 0;

            if committed < out_len && !force {
                self.end = committed;
                return Err(Error::DataLeft);
            }
        } else {
            self.queue_remaining = committed - out_len;
            written = out_len;
        }

        let queued = self.queue_remaining;
        let buf = self.out.take().expect("consuming state implies out is present");

        self.end = 0;
        self.committed = 0;
        self.out_len = 0;

        debug!("writer: reclaimed, written={} queued={}", written, queued);
        Ok(ReclaimOutcome { buf, written, queued })
    }

    /// Direct access to the first `len` bytes of the output buffer, used
    /// by Layer 3 to fill in a header that was reserved via `get` earlier
    /// in this consuming cycle (see `WriterExt`/Layer 3's use for the case
    /// where the header can't be written until the message's total length
    /// becomes known).
    pub(crate) fn header_slot(&mut self, len: usize) -> &mut [u8] {
        let out = self.out.as_mut().expect("header_slot requires consuming state");
        &mut out[..len]
    }
}

/// How a [`WriterExt`] forwards commits to the [`Writer`] it wraps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Passthrough {
    /// Forward every commit to the underlying writer immediately.
    Pass,
    /// Accumulate commits but don't forward them; a single partial commit
    /// (`omit > 0`) is permitted, after which the extended writer enters
    /// `Block`.
    Hold,
    /// All further `get`/`commit` calls fail; reached from `Hold` after a
    /// partial commit.
    Block,
}

/// Maximum nesting depth of [`WriterExt`]/`ReaderExt` groups.
pub const MAX_GROUPS: usize = 5;

/// Wraps a [`Writer`] with nestable length-scoped *groups* and an enforced
/// total message length.
///
/// Group 0 always exists and represents the whole logical message; opening
/// further groups (`group_open`) carves out length-bounded substructures
/// (e.g. a TLS extension) nested within it.
pub struct WriterExt {
    writer: Option<Writer>,
    grp_end: [usize; MAX_GROUPS],
    cur_grp: usize,
    ofs_fetch: usize,
    ofs_commit: usize,
    passthrough: Passthrough,
}

impl WriterExt {
    /// `size` is the declared total length of the message (group 0);
    /// `MpsSize::Unknown` defers that decision until `check_done` is
    /// called with the final committed length.
    pub fn new(size: crate::MpsSize) -> Self {
        let total = size.known().map(|s| s as usize).unwrap_or(usize::MAX);
        let mut grp_end = [0usize; MAX_GROUPS];
        grp_end[0] = total;
        WriterExt {
            writer: None,
            grp_end,
            cur_grp: 0,
            ofs_fetch: 0,
            ofs_commit: 0,
            passthrough: Passthrough::Pass,
        }
    }

    pub fn attach(&mut self, writer: Writer, passthrough: Passthrough) -> Result<(), Error> {
        if self.writer.is_some() {
            return Err(Error::OperationUnexpected);
        }
        self.passthrough = passthrough;
        self.writer = Some(writer);
        Ok(())
    }

    fn ensure_usable(&self) -> Result<(), Error> {
        if self.writer.is_none() {
            return Err(Error::OperationUnexpected);
        }
        if self.passthrough == Passthrough::Block {
            return Err(Error::OperationUnexpected);
        }
        Ok(())
    }

    pub fn get_ext(
        &mut self,
        desired: usize,
        allow_partial: bool,
    ) -> Result<(&mut [u8], usize), Error> {
        self.ensure_usable()?;

        let logic_avail = self.grp_end[self.cur_grp] - self.ofs_fetch;
        if desired > logic_avail {
            return Err(Error::BoundsViolation);
        }

        let writer = self.writer.as_mut().expect("checked by ensure_usable");
        let (buf, served) = writer.get(desired, allow_partial)?;
        self.ofs_fetch += served;
        Ok((buf, served))
    }

    pub fn commit_ext(&mut self) -> Result<(), Error> {
        self.commit_partial_ext(0)
    }

    pub fn commit_partial_ext(&mut self, omit: usize) -> Result<(), Error> {
        self.ensure_usable()?;

        let ofs_fetch = self.ofs_fetch;
        let ofs_commit = self.ofs_commit;
        if omit > ofs_fetch - ofs_commit {
            return Err(Error::BoundsViolation);
        }
        let new_commit = ofs_fetch - omit;
        let mut new_fetch = ofs_fetch;

        if self.passthrough == Passthrough::Pass {
            let writer = self.writer.as_mut().expect("checked by ensure_usable");
            writer.commit_partial(omit)?;
            new_fetch = new_commit;
        }

        if self.passthrough == Passthrough::Hold && omit > 0 {
            self.passthrough = Passthrough::Block;
        }

        self.ofs_fetch = new_fetch;
        self.ofs_commit = new_commit;
        Ok(())
    }

    pub fn group_open(&mut self, size: usize) -> Result<(), Error> {
        if self.cur_grp + 1 >= MAX_GROUPS {
            return Err(Error::TooManyGroups);
        }
        let logic_avail = self.grp_end[self.cur_grp] - self.ofs_fetch;
        if logic_avail < size {
            return Err(Error::BoundsViolation);
        }
        self.cur_grp += 1;
        self.grp_end[self.cur_grp] = self.ofs_fetch + size;
        Ok(())
    }

    pub fn group_close(&mut self) -> Result<(), Error> {
        let logic_avail = self.grp_end[self.cur_grp] - self.ofs_fetch;
        if logic_avail != 0 {
            return Err(Error::BoundsViolation);
        }
        if self.cur_grp > 0 {
            self.cur_grp -= 1;
        }
        Ok(())
    }

    /// Releases the underlying writer back to the caller, reporting the
    /// committed and uncommitted offsets. Resets the fetch cursor back to
    /// the commit cursor.
    pub fn detach(&mut self) -> Result<(Writer, usize, usize), Error> {
        let writer = self.writer.take().ok_or(Error::OperationUnexpected)?;
        let committed = self.ofs_commit;
        let uncommitted = self.ofs_fetch - self.ofs_commit;
        self.ofs_fetch = self.ofs_commit;
        Ok((writer, committed, uncommitted))
    }

    pub fn check_done(&self) -> Result<(), Error> {
        if self.cur_grp > 0 {
            return Err(Error::BoundsViolation);
        }
        if self.grp_end[0] != usize::MAX && self.ofs_commit != self.grp_end[0] {
            return Err(Error::BoundsViolation);
        }
        Ok(())
    }

    pub(crate) fn writer_mut(&mut self) -> Option<&mut Writer> {
        self.writer.as_mut()
    }
}
