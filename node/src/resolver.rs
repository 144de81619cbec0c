// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use opml_kernel::protocol::JudgeCall;
use opml_kernel::snapshot::PreimagePool;
use opml_kernel::witness::{WitnessCollector, WitnessSet};

use crate::errors::DisputeError;
use crate::judge::{Judge, JudgeError};

/// Probe-and-supply witness discovery against a live judge.
pub struct WitnessResolver;

impl WitnessResolver {
    /// Dry-runs `call` until the judge stops asking for nodes. Each revert
    /// grows the witness by exactly one node from `pool`; the collector caps
    /// the loop at `pool.len()` additions.
    pub async fn resolve(
        judge: &dyn Judge,
        call: &JudgeCall,
        pool: &PreimagePool,
    ) -> Result<WitnessSet, DisputeError> {
        let op = call.name();
        let mut collector = WitnessCollector::new(pool);

        loop {
            match judge.call_with_witness(call, collector.witness().nodes()).await {
                Ok(()) => {
                    let witness = collector.finish();
                    metrics::counter!("opml_witness_nodes_total", witness.len() as u64, "call" => op);
                    tracing::debug!(call = op, nodes = witness.len(), "Witness resolved");
                    return Ok(witness);
                }
                Err(JudgeError::Reverted(reason)) => {
                    let hash = collector
                        .absorb(&reason)
                        .map_err(|e| DisputeError::from_witness(op, e))?;
                    tracing::debug!(
                        call = op,
                        node = %hash,
                        size = collector.witness().len(),
                        "Judge requested trie node"
                    );
                }
                Err(e) => return Err(DisputeError::from_judge(op, e)),
            }
        }
    }

    /// Hands the nodes to the judge in discovery order.
    pub async fn supply(judge: &dyn Judge, witness: &WitnessSet) -> Result<(), DisputeError> {
        for node in witness.nodes() {
            judge
                .supply_node(node)
                .await
                .map_err(|e| DisputeError::from_judge("supplyNode", e))?;
        }
        Ok(())
    }
}
