use super::{Protocol, StrategyKind, Workspace};
use crate::error::BenchError;
use crate::partition::Partition;
use crate::transport::{Endpoint, ROOT};

/// Library collectives only: scatter A, broadcast B, gather C
pub struct Collective;

impl Protocol for Collective {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Collective
    }

    fn distribute<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        _partition: &Partition,
        ws: &mut Workspace,
    ) -> Result<(), BenchError> {
        let a = ws.a.as_ref().map(|a| a.data.as_slice());
        endpoint.scatter(ROOT, a, &mut ws.local_a)?;
        endpoint.broadcast(ROOT, &mut ws.b.data)?;
        Ok(())
    }

    fn collect<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        _partition: &Partition,
        ws: &mut Workspace,
    ) -> Result<(), BenchError> {
        let c = ws.c.as_mut().map(|c| c.data.as_mut_slice());
        endpoint.gather(ROOT, &ws.local_c, c)?;
        Ok(())
    }
}
