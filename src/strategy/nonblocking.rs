use super::{Protocol, StrategyKind, TAG_A_BLOCK, TAG_C_BLOCK, Workspace};
use crate::error::BenchError;
use crate::partition::Partition;
use crate::transport::{Completion, Endpoint, Operation, ROOT};

/// Non-blocking sends, receives and broadcast for both communication phases.
///
/// Both async strategies post the same operations in the same order. The
/// overlapped one keeps them all outstanding and waits once per phase, the
/// naive one waits on each right after posting it.
#[derive(Debug, Clone, Copy)]
pub struct NonBlocking {
    completion: Completion,
}

impl NonBlocking {
    pub const OVERLAPPED: NonBlocking = NonBlocking {
        completion: Completion::WaitAll,
    };

    pub const NAIVE: NonBlocking = NonBlocking {
        completion: Completion::WaitEach,
    };
}

impl Protocol for NonBlocking {
    fn kind(&self) -> StrategyKind {
        match self.completion {
            Completion::WaitAll => StrategyKind::AsyncOverlapped,
            Completion::WaitEach => StrategyKind::AsyncNaive,
        }
    }

    fn distribute<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        partition: &Partition,
        ws: &mut Workspace,
    ) -> Result<(), BenchError> {
        if !endpoint.is_root() {
            endpoint.exchange(
                vec![
                    Operation::Receive {
                        src: ROOT,
                        tag: TAG_A_BLOCK,
                        buf: &mut ws.local_a,
                    },
                    Operation::Broadcast {
                        root: ROOT,
                        buf: &mut ws.b.data,
                    },
                ],
                self.completion,
            )?;
            return Ok(());
        }

        let a = ws.a.as_ref().ok_or(BenchError::MissingMatrix("A"))?;
        ws.local_a
            .copy_from_slice(&a.data[partition.element_range(ROOT)]);

        let mut ops: Vec<Operation<'_>> = (1..endpoint.size())
            .map(|peer| Operation::Send {
                dest: peer,
                tag: TAG_A_BLOCK,
                data: &a.data[partition.element_range(peer)],
            })
            .collect();
        ops.push(Operation::Broadcast {
            root: ROOT,
            buf: &mut ws.b.data,
        });

        endpoint.exchange(ops, self.completion)?;
        Ok(())
    }

    fn collect<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        partition: &Partition,
        ws: &mut Workspace,
    ) -> Result<(), BenchError> {
        if !endpoint.is_root() {
            endpoint.exchange(
                vec![Operation::Send {
                    dest: ROOT,
                    tag: TAG_C_BLOCK,
                    data: &ws.local_c,
                }],
                self.completion,
            )?;
            return Ok(());
        }

        let block = partition.elements_per_worker();
        let c = ws.c.as_mut().ok_or(BenchError::MissingMatrix("C"))?;
        let (own, rest) = c.data.split_at_mut(block);
        own.copy_from_slice(&ws.local_c);

        // Blocks after the root's own arrive from ranks 1, 2, ... in order
        let ops = rest
            .chunks_exact_mut(block)
            .enumerate()
            .map(|(offset, chunk)| Operation::Receive {
                src: ROOT + 1 + offset,
                tag: TAG_C_BLOCK,
                buf: chunk,
            })
            .collect();

        endpoint.exchange(ops, self.completion)?;
        Ok(())
    }
}
