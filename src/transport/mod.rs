//! Message-passing layer the communication strategies are written against.
//!
//! A transport provides tagged point-to-point [`Endpoint::send`] and
//! [`Endpoint::receive`] with synchronous-send semantics (a send returns once
//! the receiver has matched it), plus [`Endpoint::exchange`] for non-blocking
//! batches. Collectives have default implementations on top of
//! point-to-point; transports with native collectives override them.

use crate::error::TransportError;

mod local;
#[cfg(feature = "mpi")]
mod mpi;
mod request;

pub use local::{LocalEndpoint, LocalWorld};
#[cfg(feature = "mpi")]
pub use self::mpi::MpiEndpoint;
pub use request::{Request, wait_all};

/// Rank that owns the full matrices and receives reductions
pub const ROOT: usize = 0;

/// Message tag. `Data` tags belong to callers; the rest are used by the
/// collectives and never collide with point-to-point traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Data(u16),
    Broadcast,
    Scatter,
    Gather,
    Reduce,
    Barrier,
}

/// One non-blocking operation of an [`Endpoint::exchange`]
#[derive(Debug)]
pub enum Operation<'a> {
    Send {
        dest: usize,
        tag: Tag,
        data: &'a [f64],
    },
    Receive {
        src: usize,
        tag: Tag,
        buf: &'a mut [f64],
    },
    /// `root` sends `buf`; every other rank receives into it
    Broadcast { root: usize, buf: &'a mut [f64] },
}

/// When the operations of an exchange are waited on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Post every operation, then wait for all of them
    WaitAll,
    /// Wait for each operation right after posting it
    WaitEach,
}

/// One rank's view of a fixed-size worker group
pub trait Endpoint {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Blocking send of `data` to `dest`
    fn send(&self, dest: usize, tag: Tag, data: &[f64]) -> Result<(), TransportError>;

    /// Blocking receive from `src` into `buf`; the message must match `buf.len()`
    fn receive(&self, src: usize, tag: Tag, buf: &mut [f64]) -> Result<(), TransportError>;

    /// Post `ops` as non-blocking operations and complete them as `completion`
    /// says. Buffers stay borrowed until every operation has completed.
    fn exchange(
        &self,
        ops: Vec<Operation<'_>>,
        completion: Completion,
    ) -> Result<(), TransportError>;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    fn check_rank(&self, rank: usize) -> Result<(), TransportError> {
        if rank >= self.size() {
            return Err(TransportError::InvalidRank {
                rank,
                size: self.size(),
            });
        }
        Ok(())
    }

    /// Block until every rank has entered the barrier
    fn barrier(&self) -> Result<(), TransportError> {
        if self.rank() == ROOT {
            for peer in 1..self.size() {
                self.receive(peer, Tag::Barrier, &mut [])?;
            }
            for peer in 1..self.size() {
                self.send(peer, Tag::Barrier, &[])?;
            }
            Ok(())
        } else {
            self.send(ROOT, Tag::Barrier, &[])?;
            self.receive(ROOT, Tag::Barrier, &mut [])
        }
    }

    /// Copy `buf` on `root` into `buf` on every other rank
    fn broadcast(&self, root: usize, buf: &mut [f64]) -> Result<(), TransportError> {
        self.check_rank(root)?;
        if self.rank() == root {
            for peer in (0..self.size()).filter(|&peer| peer != root) {
                self.send(peer, Tag::Broadcast, buf)?;
            }
            Ok(())
        } else {
            self.receive(root, Tag::Broadcast, buf)
        }
    }

    /// Split `send` (root only) into `size()` equal blocks; rank `i` receives block `i`
    fn scatter(
        &self,
        root: usize,
        send: Option<&[f64]>,
        recv: &mut [f64],
    ) -> Result<(), TransportError> {
        self.check_rank(root)?;
        let block = recv.len();
        if block == 0 {
            return Ok(());
        }

        if self.rank() != root {
            return self.receive(root, Tag::Scatter, recv);
        }

        let send = send.ok_or(TransportError::MissingRootBuffer("scatter send"))?;
        if send.len() != block * self.size() {
            return Err(TransportError::SizeMismatch {
                peer: root,
                expected: block * self.size(),
                actual: send.len(),
            });
        }

        for (peer, chunk) in send.chunks_exact(block).enumerate() {
            if peer == root {
                recv.copy_from_slice(chunk);
            } else {
                self.send(peer, Tag::Scatter, chunk)?;
            }
        }
        Ok(())
    }

    /// Concatenate every rank's `send` block, in rank order, into `recv` on root
    fn gather(
        &self,
        root: usize,
        send: &[f64],
        recv: Option<&mut [f64]>,
    ) -> Result<(), TransportError> {
        self.check_rank(root)?;
        let block = send.len();
        if block == 0 {
            return Ok(());
        }

        if self.rank() != root {
            return self.send(root, Tag::Gather, send);
        }

        let recv = recv.ok_or(TransportError::MissingRootBuffer("gather receive"))?;
        if recv.len() != block * self.size() {
            return Err(TransportError::SizeMismatch {
                peer: root,
                expected: block * self.size(),
                actual: recv.len(),
            });
        }

        for (peer, chunk) in recv.chunks_exact_mut(block).enumerate() {
            if peer == root {
                chunk.copy_from_slice(send);
            } else {
                self.receive(peer, Tag::Gather, chunk)?;
            }
        }
        Ok(())
    }

    /// Maximum of `value` over all ranks, available on `root` only
    fn reduce_max(&self, root: usize, value: f64) -> Result<Option<f64>, TransportError> {
        self.check_rank(root)?;
        if self.rank() != root {
            self.send(root, Tag::Reduce, &[value])?;
            return Ok(None);
        }

        let mut max = value;
        for peer in (0..self.size()).filter(|&peer| peer != root) {
            let mut incoming = [0.0];
            self.receive(peer, Tag::Reduce, &mut incoming)?;
            max = max.max(incoming[0]);
        }
        Ok(Some(max))
    }
}

/// Create the in-process transport for a group of `size` ranks
pub fn create_world(size: usize) -> Result<LocalWorld, TransportError> {
    LocalWorld::new(size)
}
