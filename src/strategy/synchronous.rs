use super::{Protocol, StrategyKind, TAG_A_BLOCK, TAG_C_BLOCK, Workspace};
use crate::error::BenchError;
use crate::partition::Partition;
use crate::transport::{Endpoint, ROOT};

/// Blocking point-to-point fan-out and fan-in, one peer at a time
pub struct Synchronous;

impl Protocol for Synchronous {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Synchronous
    }

    fn distribute<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        partition: &Partition,
        ws: &mut Workspace,
    ) -> Result<(), BenchError> {
        if endpoint.is_root() {
            let a = ws.a.as_ref().ok_or(BenchError::MissingMatrix("A"))?;
            for peer in 1..endpoint.size() {
                endpoint.send(peer, TAG_A_BLOCK, &a.data[partition.element_range(peer)])?;
            }
            ws.local_a
                .copy_from_slice(&a.data[partition.element_range(ROOT)]);
        } else {
            endpoint.receive(ROOT, TAG_A_BLOCK, &mut ws.local_a)?;
        }

        endpoint.broadcast(ROOT, &mut ws.b.data)?;
        Ok(())
    }

    fn collect<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        partition: &Partition,
        ws: &mut Workspace,
    ) -> Result<(), BenchError> {
        if !endpoint.is_root() {
            endpoint.send(ROOT, TAG_C_BLOCK, &ws.local_c)?;
            return Ok(());
        }

        let c = ws.c.as_mut().ok_or(BenchError::MissingMatrix("C"))?;
        c.data[partition.element_range(ROOT)].copy_from_slice(&ws.local_c);
        for peer in 1..endpoint.size() {
            endpoint.receive(peer, TAG_C_BLOCK, &mut c.data[partition.element_range(peer)])?;
        }
        Ok(())
    }
}
