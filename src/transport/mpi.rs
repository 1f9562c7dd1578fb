use super::{Completion, Endpoint, Operation, Tag};
use crate::error::TransportError;
use mpi::collective::SystemOperation;
use mpi::point_to_point::Status;
use mpi::topology::{Rank, SimpleCommunicator};
use mpi::traits::*;

/// Tags below this value are reserved for collective traffic
const DATA_TAG_BASE: mpi::Tag = 16;

fn mpi_tag(tag: Tag) -> mpi::Tag {
    match tag {
        Tag::Data(tag) => DATA_TAG_BASE + mpi::Tag::from(tag),
        Tag::Broadcast => 1,
        Tag::Scatter => 2,
        Tag::Gather => 3,
        Tag::Reduce => 4,
        Tag::Barrier => 5,
    }
}

/// Endpoint backed by an MPI communicator, one process per rank.
///
/// Point-to-point traffic uses `MPI_Send`/`MPI_Recv` and the immediate
/// variants; the collectives map onto the native MPI ones.
pub struct MpiEndpoint {
    world: SimpleCommunicator,
}

impl MpiEndpoint {
    pub fn new(world: SimpleCommunicator) -> Self {
        MpiEndpoint { world }
    }

    fn peer(&self, rank: usize) -> Result<Rank, TransportError> {
        self.check_rank(rank)?;
        Rank::try_from(rank).map_err(|_| TransportError::InvalidRank {
            rank,
            size: self.size(),
        })
    }

    fn check_count(peer: usize, expected: usize, status: Status) -> Result<(), TransportError> {
        let actual = status.count(f64::equivalent_datatype());
        match usize::try_from(actual) {
            Ok(actual) if actual == expected => Ok(()),
            Ok(actual) => Err(TransportError::SizeMismatch {
                peer,
                expected,
                actual,
            }),
            Err(_) => Err(TransportError::Disconnected { peer }),
        }
    }
}

impl Endpoint for MpiEndpoint {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn send(&self, dest: usize, tag: Tag, data: &[f64]) -> Result<(), TransportError> {
        let peer = self.peer(dest)?;
        self.world
            .process_at_rank(peer)
            .send_with_tag(data, mpi_tag(tag));
        Ok(())
    }

    fn receive(&self, src: usize, tag: Tag, buf: &mut [f64]) -> Result<(), TransportError> {
        let peer = self.peer(src)?;
        let expected = buf.len();
        let status = self
            .world
            .process_at_rank(peer)
            .receive_into_with_tag(buf, mpi_tag(tag));
        Self::check_count(src, expected, status)
    }

    fn exchange(
        &self,
        ops: Vec<Operation<'_>>,
        completion: Completion,
    ) -> Result<(), TransportError> {
        for op in &ops {
            match op {
                Operation::Send { dest: rank, .. }
                | Operation::Receive { src: rank, .. }
                | Operation::Broadcast { root: rank, .. } => {
                    self.peer(*rank)?;
                }
            }
        }

        mpi::request::scope(|scope| {
            // (peer, expected receive length, request)
            let mut pending = Vec::with_capacity(ops.len());

            for op in ops {
                let posted = match op {
                    Operation::Send { dest, tag, data } => {
                        let request = self
                            .world
                            .process_at_rank(dest as Rank)
                            .immediate_send_with_tag(scope, data, mpi_tag(tag));
                        (dest, None, request)
                    }
                    Operation::Receive { src, tag, buf } => {
                        let expected = buf.len();
                        let request = self
                            .world
                            .process_at_rank(src as Rank)
                            .immediate_receive_into_with_tag(scope, buf, mpi_tag(tag));
                        (src, Some(expected), request)
                    }
                    Operation::Broadcast { root, buf } => {
                        let request = self
                            .world
                            .process_at_rank(root as Rank)
                            .immediate_broadcast_into(scope, buf);
                        (root, None, request)
                    }
                };

                match completion {
                    Completion::WaitEach => {
                        let (peer, expected, request) = posted;
                        let status = request.wait();
                        if let Some(expected) = expected {
                            Self::check_count(peer, expected, status)?;
                        }
                    }
                    Completion::WaitAll => pending.push(posted),
                }
            }

            // Every request must complete before the scope ends, even after a failure
            let mut result = Ok(());
            for (peer, expected, request) in pending {
                let status = request.wait();
                if let (Some(expected), Ok(())) = (expected, &result) {
                    result = Self::check_count(peer, expected, status);
                }
            }
            result
        })
    }

    fn barrier(&self) -> Result<(), TransportError> {
        self.world.barrier();
        Ok(())
    }

    fn broadcast(&self, root: usize, buf: &mut [f64]) -> Result<(), TransportError> {
        let root = self.peer(root)?;
        self.world.process_at_rank(root).broadcast_into(buf);
        Ok(())
    }

    fn scatter(
        &self,
        root: usize,
        send: Option<&[f64]>,
        recv: &mut [f64],
    ) -> Result<(), TransportError> {
        let root_rank = self.peer(root)?;
        let root_process = self.world.process_at_rank(root_rank);

        if self.rank() != root {
            root_process.scatter_into(recv);
            return Ok(());
        }

        let send = send.ok_or(TransportError::MissingRootBuffer("scatter send"))?;
        let expected = recv.len() * self.size();
        if send.len() != expected {
            return Err(TransportError::SizeMismatch {
                peer: root,
                expected,
                actual: send.len(),
            });
        }
        root_process.scatter_into_root(send, recv);
        Ok(())
    }

    fn gather(
        &self,
        root: usize,
        send: &[f64],
        recv: Option<&mut [f64]>,
    ) -> Result<(), TransportError> {
        let root_rank = self.peer(root)?;
        let root_process = self.world.process_at_rank(root_rank);

        if self.rank() != root {
            root_process.gather_into(send);
            return Ok(());
        }

        let recv = recv.ok_or(TransportError::MissingRootBuffer("gather receive"))?;
        let expected = send.len() * self.size();
        if recv.len() != expected {
            return Err(TransportError::SizeMismatch {
                peer: root,
                expected,
                actual: recv.len(),
            });
        }
        root_process.gather_into_root(send, recv);
        Ok(())
    }

    fn reduce_max(&self, root: usize, value: f64) -> Result<Option<f64>, TransportError> {
        let root_rank = self.peer(root)?;
        let root_process = self.world.process_at_rank(root_rank);

        if self.rank() != root {
            root_process.reduce_into(&value, SystemOperation::max());
            return Ok(None);
        }

        let mut max = value;
        root_process.reduce_into_root(&value, &mut max, SystemOperation::max());
        Ok(Some(max))
    }
}
