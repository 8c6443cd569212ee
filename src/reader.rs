//! The incoming half of the buffer-brokerage engine: [`Reader`] brokers a
//! single transport buffer plus an optional accumulator between a provider
//! (the record layer) and a consumer (the caller parsing a message);
//! [`ReaderExt`] layers bounded, nestable groups on top, mirroring
//! [`crate::writer::WriterExt`].
//!
//! Where `Writer`'s queue absorbs a single cycle's *overflow* (more was
//! written than the buffer could hold), `Reader`'s accumulator absorbs a
//! read that *spans* `feed` cycles (more was asked for than the current
//! buffer holds). A read that starts against one buffer and needs bytes
//! from the next is reassembled in the accumulator across as many `feed`
//! calls as it takes.

use crate::error::Error;

/// Brokers a single incoming transport buffer, plus an optional
/// accumulator, for a consumer that parses messages whose size isn't known
/// to line up with transport buffer boundaries.
#[derive(Debug)]
pub struct Reader {
    acc: Option<Vec<u8>>,
    acc_len: usize,
    acc_avail: usize,
    acc_need: usize,
    acc_consumed_cur_buf: usize,
    serving_from_acc: bool,

    inbuf: Option<Vec<u8>>,
    in_len: usize,
    committed: usize,
    fetch: usize,
}

impl Reader {
    /// Creates a reader in providing state. `acc`, if given, is held for
    /// the reader's entire lifetime and used to reassemble a read that
    /// spans more than one fed buffer.
    pub fn new(acc: Option<Vec<u8>>) -> Self {
        let acc_len = acc.as_ref().map_or(0, Vec::len);
        Reader {
            acc,
            acc_len,
            acc_avail: 0,
            acc_need: 0,
            acc_consumed_cur_buf: 0,
            serving_from_acc: false,
            inbuf: None,
            in_len: 0,
            committed: 0,
            fetch: 0,
        }
    }

    pub fn is_providing(&self) -> bool {
        self.inbuf.is_none()
    }

    /// Providing -> consuming. If a read is in flight in the accumulator,
    /// tops it up from the front of `buf` first; the rest of `buf` is then
    /// available for ordinary `get` calls starting right after whatever
    /// was consumed into the accumulator.
    pub fn feed(&mut self, buf: Vec<u8>) -> Result<(), Error> {
        if !self.is_providing() {
            return Err(Error::OperationUnexpected);
        }

        let mut consumed = 0usize;
        if self.acc_need > 0 && self.acc_avail < self.acc_need {
            let need_more = self.acc_need - self.acc_avail;
            let take = need_more.min(buf.len());
            if take > 0 {
                let acc = self.acc.as_mut().expect("acc_need > 0 implies an accumulator is attached");
                acc[self.acc_avail..self.acc_avail + take].copy_from_slice(&buf[..take]);
            }
            self.acc_avail += take;
            consumed = take;
        }

        self.in_len = buf.len();
        self.committed = consumed;
        self.fetch = consumed;
        self.acc_consumed_cur_buf = consumed;
        self.inbuf = Some(buf);
        trace!("reader: fed buffer, {} bytes routed into accumulator", consumed);
        Ok(())
    }

    /// Hands out a slice of `desired` bytes starting at the fetch cursor.
    /// If the current buffer doesn't hold enough and an accumulator is
    /// attached, starts (or continues) an accumulated read and fails with
    /// [`Error::OutOfData`] until enough has been fed to satisfy it --
    /// the caller is expected to retry the same request (same `desired`)
    /// after the next `feed`.
    pub fn get(&mut self, desired: usize, allow_partial: bool) -> Result<(&[u8], usize), Error> {
        if self.is_providing() {
            return Err(Error::OperationUnexpected);
        }

        if self.acc_need > 0 {
            if desired != self.acc_need {
                return Err(Error::OperationUnexpected);
            }
            if self.acc_avail < self.acc_need {
                return Err(Error::OutOfData);
            }
            self.serving_from_acc = true;
            let acc = self.acc.as_ref().expect("acc_need > 0 implies an accumulator is attached");
            return Ok((&acc[..desired], desired));
        }

        let avail = self.in_len - self.fetch;
        if avail >= desired {
            let start = self.fetch;
            self.fetch += desired;
            let inbuf = self.inbuf.as_ref().expect("consuming state implies inbuf is present");
            return Ok((&inbuf[start..start + desired], desired));
        }

        if self.acc.is_some() {
            let avail_from_committed = self.in_len - self.committed;
            if avail_from_committed > 0 {
                let tail = {
                    let inbuf = self.inbuf.as_ref().expect("consuming state implies inbuf is present");
                    inbuf[self.committed..self.in_len].to_vec()
                };
                let acc = self.acc.as_mut().expect("checked above");
                acc[..avail_from_committed].copy_from_slice(&tail);
            }
            self.acc_avail = avail_from_committed;
            self.acc_need = desired;
            self.fetch = self.committed;
            debug!("reader: read of {} bytes spans a feed boundary, parking in accumulator", desired);
            return Err(Error::OutOfData);
        }

        if !allow_partial {
            return Err(Error::OutOfData);
        }
        let served = avail;
        let start = self.fetch;
        self.fetch += served;
        let inbuf = self.inbuf.as_ref().expect("consuming state implies inbuf is present");
        Ok((&inbuf[start..start + served], served))
    }

    /// Ratifies everything handed out since the last commit.
    pub fn commit(&mut self) -> Result<(), Error> {
        if self.is_providing() {
            return Err(Error::OperationUnexpected);
        }

        if self.serving_from_acc {
            self.serving_from_acc = false;
            self.acc_avail = 0;
            self.acc_need = 0;
            self.committed = self.acc_consumed_cur_buf;
            self.fetch = self.committed;
        } else {
            self.committed = self.fetch;
        }
        Ok(())
    }

    /// Consuming -> providing. Fails with [`Error::DataLeft`] if there is
    /// uncommitted, un-accumulated data left in the buffer: a read in
    /// flight in the accumulator does *not* block reclaim, since its
    /// remainder lives in the accumulator rather than in the buffer being
    /// reclaimed.
    pub fn reclaim(&mut self) -> Result<(), Error> {
        if self.is_providing() {
            return Err(Error::OperationUnexpected);
        }

        let pending_acc = self.acc_need > 0 && self.acc_avail < self.acc_need;
        if self.committed != self.in_len && !pending_acc {
            return Err(Error::DataLeft);
        }

        self.inbuf = None;
        self.in_len = 0;
        self.committed = 0;
        self.fetch = 0;
        Ok(())
    }

    pub(crate) fn acc_capacity(&self) -> usize {
        self.acc_len
    }
}

/// Maximum nesting depth of [`ReaderExt`] groups, matching
/// [`crate::writer::MAX_GROUPS`].
pub const MAX_GROUPS: usize = crate::writer::MAX_GROUPS;

/// Wraps a [`Reader`] with nestable length-scoped groups, mirroring
/// [`crate::writer::WriterExt`]. Reads never need a passthrough mode --
/// there is nothing to "hold back" on the way in.
pub struct ReaderExt {
    reader: Option<Reader>,
    grp_end: [usize; MAX_GROUPS],
    cur_grp: usize,
    ofs_fetch: usize,
    ofs_commit: usize,
}

impl ReaderExt {
    pub fn new(size: crate::MpsSize) -> Self {
        let total = size.known().map(|s| s as usize).unwrap_or(usize::MAX);
        let mut grp_end = [0usize; MAX_GROUPS];
        grp_end[0] = total;
        ReaderExt {
            reader: None,
            grp_end,
            cur_grp: 0,
            ofs_fetch: 0,
            ofs_commit: 0,
        }
    }

    pub fn attach(&mut self, reader: Reader) -> Result<(), Error> {
        if self.reader.is_some() {
            return Err(Error::OperationUnexpected);
        }
        self.reader = Some(reader);
        Ok(())
    }

    pub fn get_ext(&mut self, desired: usize, allow_partial: bool) -> Result<(&[u8], usize), Error> {
        if self.reader.is_none() {
            return Err(Error::OperationUnexpected);
        }
        let logic_avail = self.grp_end[self.cur_grp] - self.ofs_fetch;
        if desired > logic_avail {
            return Err(Error::BoundsViolation);
        }
        let reader = self.reader.as_mut().expect("checked above");
        let (buf, served) = reader.get(desired, allow_partial)?;
        self.ofs_fetch += served;
        Ok((buf, served))
    }

    pub fn commit_ext(&mut self) -> Result<(), Error> {
        let reader = self.reader.as_mut().ok_or(Error::OperationUnexpected)?;
        reader.commit()?;
        self.ofs_commit = self.ofs_fetch;
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

    pub fn detach(&mut self) -> Result<Reader, Error> {
        let reader = self.reader.take().ok_or(Error::OperationUnexpected)?;
        self.ofs_fetch = self.ofs_commit;
        Ok(reader)
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

    pub(crate) fn reader_mut(&mut self) -> Option<&mut Reader> {
        self.reader.as_mut()
    }
}
