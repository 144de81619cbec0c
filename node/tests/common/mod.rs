// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

//! Test harness: a toy execution engine and an in-memory judge.
//!
//! The machine has a phase counter, a step counter and four registers. Its
//! state is committed through a two-level trie: one branch node holding the
//! hashes of five leaves (meta, r0..r3). The outer layer runs phases, the
//! finest layer runs single register updates inside one phase. Games with
//! more than two layers split every phase into `BLOCKS` blocks per middle
//! layer.

use async_trait::async_trait;
use opml_kernel::config::SessionConfig;
use opml_kernel::protocol::JudgeCall;
use opml_kernel::snapshot::{EncodedNode, Snapshot};
use opml_kernel::types::{ChallengeId, Coordinate, Hash32, Role, FINAL_STEP};
use opml_node::config::{NodeConfig, RetryPolicy};
use opml_node::engine::{ExecutionEngine, ReplayRequest};
use opml_node::errors::DisputeError;
use opml_node::judge::{Judge, JudgeError, JudgeResult};
use opml_node::persistence::SnapshotStore;
use opml_node::provider::SnapshotProvider;
use opml_node::session::DisputeSession;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const PHASES: u64 = 4;
pub const BLOCKS: u64 = 3;
pub const STEPS: u64 = 6;

/// Step count of every layer of a `total`-layer game, outermost first.
pub fn layer_sizes(total: u32) -> Vec<u64> {
    let mut sizes = vec![PHASES];
    sizes.extend(std::iter::repeat(BLOCKS).take(total.saturating_sub(2) as usize));
    sizes.push(STEPS);
    sizes
}

const LEAF: u8 = 0;
const BRANCH: u8 = 1;

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MachineState {
    pub phase: u64,
    pub step: u64,
    pub regs: [u64; 4],
}

fn le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn meta_leaf(phase: u64, step: u64) -> Vec<u8> {
    let mut node = vec![LEAF];
    node.extend_from_slice(&phase.to_le_bytes());
    node.extend_from_slice(&step.to_le_bytes());
    node
}

fn reg_leaf(value: u64) -> Vec<u8> {
    let mut node = vec![LEAF];
    node.extend_from_slice(&value.to_le_bytes());
    node
}

fn branch(children: &[Hash32; 5]) -> Vec<u8> {
    let mut node = vec![BRANCH];
    for child in children {
        node.extend_from_slice(child.as_bytes());
    }
    node
}

fn parse_branch(node: &[u8]) -> Option<[Hash32; 5]> {
    if node.len() != 1 + 5 * 32 || node[0] != BRANCH {
        return None;
    }
    let mut children = [Hash32::ZERO; 5];
    for (i, child) in children.iter_mut().enumerate() {
        let mut h = [0u8; 32];
        h.copy_from_slice(&node[1 + i * 32..1 + (i + 1) * 32]);
        *child = Hash32(h);
    }
    Some(children)
}

/// The one honest register update. Both the engine and the judge use it.
pub fn update(phase: u64, step: u64, regs: &mut [u64; 4]) -> (usize, usize) {
    let a = (step % 4) as usize;
    let b = ((step + 1) % 4) as usize;
    regs[a] = regs[a]
        .wrapping_mul(31)
        .wrapping_add(regs[b])
        .wrapping_add(phase)
        .wrapping_add(step);
    (a, b)
}

impl MachineState {
    pub fn from_seed(seed: &[u8]) -> Self {
        let h = Hash32::digest(seed);
        let b = h.as_bytes();
        Self {
            phase: 0,
            step: 0,
            regs: [le(&b[0..]), le(&b[8..]), le(&b[16..]), le(&b[24..])],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(48);
        out.extend_from_slice(&self.phase.to_le_bytes());
        out.extend_from_slice(&self.step.to_le_bytes());
        for r in &self.regs {
            out.extend_from_slice(&r.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 48 {
            return None;
        }
        Some(Self {
            phase: le(&bytes[0..]),
            step: le(&bytes[8..]),
            regs: [le(&bytes[16..]), le(&bytes[24..]), le(&bytes[32..]), le(&bytes[40..])],
        })
    }

    /// `(hash, bytes)` of every trie node, root first.
    pub fn nodes(&self) -> Vec<(Hash32, Vec<u8>)> {
        let mut leaves = vec![meta_leaf(self.phase, self.step)];
        leaves.extend(self.regs.iter().map(|r| reg_leaf(*r)));
        let mut children = [Hash32::ZERO; 5];
        for (i, leaf) in leaves.iter().enumerate() {
            children[i] = Hash32::digest(leaf);
        }
        let root = branch(&children);
        let mut nodes = vec![(Hash32::digest(&root), root)];
        nodes.extend(leaves.into_iter().map(|l| (Hash32::digest(&l), l)));
        nodes
    }

    pub fn root(&self) -> Hash32 {
        self.nodes()[0].0
    }

    pub fn meta_hash(&self) -> Hash32 {
        self.nodes()[1].0
    }
}

/// Flips a register bit while executing `step` of `phase`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fault {
    pub phase: u64,
    pub step: u64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Deterministic engine. Faults are attached to a base directory, so one
/// engine can serve an honest and a faulty role at once.
#[derive(Default)]
pub struct ToyEngine {
    faults: HashMap<String, Fault>,
    replays: AtomicUsize,
    delay: Duration,
}

impl ToyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(mut self, basedir: &str, fault: Fault) -> Self {
        self.faults.insert(basedir.to_string(), fault);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn replays(&self) -> usize {
        self.replays.load(Ordering::SeqCst)
    }

    fn step(&self, fault: Option<Fault>, mut s: MachineState) -> MachineState {
        update(s.phase, s.step, &mut s.regs);
        if fault == Some(Fault { phase: s.phase, step: s.step }) {
            s.regs[0] ^= 1;
        }
        s.step += 1;
        s
    }

    /// One step of the layer at `depth`. Outer steps are whole phases.
    fn unit(&self, fault: Option<Fault>, sizes: &[u64], depth: usize, mut s: MachineState) -> MachineState {
        let updates: u64 = sizes[depth + 1..].iter().product();
        for _ in 0..updates {
            s = self.step(fault, s);
        }
        if depth == 0 {
            s = MachineState { phase: s.phase + 1, step: 0, regs: s.regs };
        }
        s
    }
}

fn target(index: i64, max: u64) -> u64 {
    if index == FINAL_STEP {
        max
    } else {
        (index.max(0) as u64).min(max)
    }
}

#[async_trait]
impl ExecutionEngine for ToyEngine {
    async fn replay(&self, request: &ReplayRequest) -> Result<(), DisputeError> {
        self.replays.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let cfg = &request.config;
        let coord = &request.coordinate;
        let fault = self.faults.get(&cfg.basedir).copied();
        let store = SnapshotStore::new(&cfg.basedir);
        let fail = |reason: String| DisputeError::EngineReplayFailed { coordinate: coord.clone(), reason };

        let input = tokio::fs::read(&cfg.data_path)
            .await
            .map_err(|e| fail(format!("input {}: {}", cfg.data_path, e)))?;

        let sizes = layer_sizes(cfg.total_phase);
        let indices = coord.indices();
        let depth = indices.len() - 1;
        if cfg.total_phase < 2 || depth >= sizes.len() {
            return Err(fail(format!("no layer {} in a {}-layer game", depth, cfg.total_phase)));
        }
        let (prefix, index) = (&indices[..depth], indices[depth]);

        let mut s = if depth == 0 {
            MachineState::from_seed(&input)
        } else {
            MachineState::from_bytes(&input).ok_or_else(|| fail("malformed parent output".into()))?
        };
        let mut states = vec![s];
        for _ in 0..target(index, sizes[depth]) {
            s = self.unit(fault, &sizes, depth, s);
            states.push(s);
        }

        // every reached step of a non-final layer is a child input
        if depth + 1 < sizes.len() {
            for (j, state) in states.iter().enumerate() {
                let mut child = prefix.to_vec();
                child.push(j as i64);
                store.save_data(&Coordinate::new(child), &state.to_bytes()).await?;
            }
        }
        let step_count = sizes[..=depth].to_vec();

        let last = states[states.len() - 1];
        let mut preimages = BTreeMap::new();
        for state in &states {
            for (hash, node) in state.nodes() {
                preimages.insert(hash, EncodedNode(node));
            }
        }
        let snapshot = Snapshot {
            root: last.root(),
            checkpoints: coord.indices().to_vec(),
            step_count,
            preimages,
        };
        store.save(coord, &snapshot).await
    }
}

// ---------------------------------------------------------------------------
// Judge
// ---------------------------------------------------------------------------

fn revert(reason: impl Into<String>) -> JudgeError {
    JudgeError::Reverted(reason.into())
}

/// Executes one register update on the state committed by `root`, fetching
/// nodes through `lookup`. `Err` names the first missing node.
pub fn execute_step(root: Hash32, lookup: &dyn Fn(&Hash32) -> Option<Vec<u8>>) -> JudgeResult<Hash32> {
    let missing = |h: &Hash32| revert(h.to_hex());
    let root_node = lookup(&root).ok_or_else(|| missing(&root))?;
    let mut children = parse_branch(&root_node).ok_or_else(|| revert("malformed root node"))?;

    let meta = lookup(&children[0]).ok_or_else(|| missing(&children[0]))?;
    if meta.len() != 17 {
        return Err(revert("malformed meta node"));
    }
    let (phase, step) = (le(&meta[1..]), le(&meta[9..]));

    let mut regs = [0u64; 4];
    let a = (step % 4) as usize;
    let b = ((step + 1) % 4) as usize;
    for idx in [a, b] {
        let leaf = lookup(&children[1 + idx]).ok_or_else(|| missing(&children[1 + idx]))?;
        regs[idx] = le(&leaf[1..]);
    }
    update(phase, step, &mut regs);

    children[0] = Hash32::digest(&meta_leaf(phase, step + 1));
    children[1 + a] = Hash32::digest(&reg_leaf(regs[a]));
    Ok(Hash32::digest(&branch(&children)))
}

#[derive(Clone, Debug, Default)]
pub struct LayerSearch {
    pub left: u64,
    pub right: u64,
    pub total: u64,
    pub step_number: u64,
    pub searching: bool,
    pub asserted: BTreeMap<u64, Hash32>,
    pub defended: BTreeMap<u64, Hash32>,
}

impl LayerSearch {
    fn new(total: u64, asserted: (Hash32, Hash32), defended: (Hash32, Hash32)) -> Self {
        let mut layer = LayerSearch { left: 0, right: total, total, ..Default::default() };
        layer.asserted.insert(0, asserted.0);
        layer.asserted.insert(total, asserted.1);
        layer.defended.insert(0, defended.0);
        layer.defended.insert(total, defended.1);
        layer.settle_pointer();
        layer
    }

    fn settle_pointer(&mut self) {
        if self.right - self.left <= 1 {
            self.searching = false;
            self.step_number = self.left;
        } else {
            self.searching = true;
            self.step_number = (self.left + self.right) / 2;
        }
    }

    fn record(&mut self, proposed: Hash32, response: Hash32) {
        let mid = self.step_number;
        self.asserted.insert(mid, proposed);
        self.defended.insert(mid, response);
        if proposed == response {
            self.left = mid;
        } else {
            self.right = mid;
        }
        self.settle_pointer();
    }
}

#[derive(Clone, Debug)]
pub struct Challenge {
    pub total_layer: u32,
    pub layers: Vec<LayerSearch>,
    pub proposed: Hash32,
    pending: HashMap<Role, (Hash32, Hash32, u64)>,
}

impl Challenge {
    fn current(&self) -> &LayerSearch {
        &self.layers[self.layers.len() - 1]
    }

    fn current_mut(&mut self) -> &mut LayerSearch {
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }
}

#[derive(Default)]
pub struct JudgeState {
    pub genesis: Hash32,
    pub claimed: Hash32,
    pub nodes: HashMap<Hash32, Vec<u8>>,
    pub challenges: HashMap<u64, Challenge>,
    next_id: u64,
    /// Every mutation attempt, in order.
    pub calls: Vec<(Role, String)>,
    pub probes: usize,
    pub settled: Vec<(ChallengeId, Role)>,
    transport_faults: usize,
}

impl JudgeState {
    fn open(&mut self, root: Hash32, step_total: u64, total_layers: u32) -> ChallengeId {
        self.next_id += 1;
        let layer = LayerSearch::new(step_total, (self.genesis, root), (self.genesis, self.claimed));
        let challenge = Challenge {
            total_layer: total_layers,
            layers: vec![layer],
            proposed: Hash32::ZERO,
            pending: HashMap::new(),
        };
        self.challenges.insert(self.next_id, challenge);
        ChallengeId(self.next_id)
    }

    fn challenge(&self, id: ChallengeId) -> JudgeResult<&Challenge> {
        self.challenges.get(&id.0).ok_or_else(|| revert("unknown challenge"))
    }

    fn challenge_mut(&mut self, id: ChallengeId) -> JudgeResult<&mut Challenge> {
        self.challenges.get_mut(&id.0).ok_or_else(|| revert("unknown challenge"))
    }

    fn check_initiate(&self, root: Hash32, step_total: u64, extra: &HashMap<Hash32, Vec<u8>>) -> JudgeResult<()> {
        let lookup = |h: &Hash32| self.nodes.get(h).or_else(|| extra.get(h)).cloned();
        let root_node = lookup(&root).ok_or_else(|| revert(root.to_hex()))?;
        let children = parse_branch(&root_node).ok_or_else(|| revert("malformed root node"))?;
        let meta = lookup(&children[0]).ok_or_else(|| revert(children[0].to_hex()))?;
        if meta.len() != 17 || le(&meta[1..]) != step_total {
            return Err(revert("root does not commit to stepTotal"));
        }
        Ok(())
    }

    fn check_settle(&self, id: ChallengeId, role: Role, extra: &HashMap<Hash32, Vec<u8>>) -> JudgeResult<()> {
        let ch = self.challenge(id)?;
        if ch.layers.len() as u32 != ch.total_layer {
            return Err(revert("not at the finest layer"));
        }
        let layer = ch.current();
        if layer.searching {
            return Err(revert("still searching"));
        }
        let (l, r) = (layer.left, layer.left + 1);
        let claims = match role {
            Role::Challenger => &layer.asserted,
            Role::Submitter => &layer.defended,
        };
        let (from, to) = match (claims.get(&l), claims.get(&r)) {
            (Some(from), Some(to)) => (*from, *to),
            _ => return Err(revert("no claim recorded for the disputed step")),
        };

        let lookup = |h: &Hash32| self.nodes.get(h).or_else(|| extra.get(h)).cloned();
        let next = execute_step(from, &lookup)?;
        if next != to {
            return Err(revert("invalid transition"));
        }
        if role == Role::Challenger && layer.asserted.get(&r) == layer.defended.get(&r) {
            return Err(revert("no disagreement on the disputed step"));
        }
        Ok(())
    }
}

/// Shared judge. Hand out one [`JudgeHandle`] per role.
#[derive(Clone, Default)]
pub struct ReferenceJudge {
    state: Arc<Mutex<JudgeState>>,
}

impl ReferenceJudge {
    /// `genesis` is the deployed golden root, `claimed` the submitter's
    /// committed final root.
    pub fn new(genesis: Hash32, claimed: Hash32) -> Self {
        let state = JudgeState { genesis, claimed, ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    pub fn handle(&self, role: Role) -> Arc<JudgeHandle> {
        Arc::new(JudgeHandle { state: self.state.clone(), role })
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, JudgeState> {
        self.state.lock().unwrap()
    }

    pub fn mutations_by(&self, role: Role) -> Vec<String> {
        self.state().calls.iter().filter(|(r, _)| *r == role).map(|(_, op)| op.clone()).collect()
    }

    /// The next `n` calls of any kind fail at the transport level.
    pub fn fail_next(&self, n: usize) {
        self.state().transport_faults = n;
    }

    /// Opens a challenge directly, bypassing the witness requirement.
    pub fn open(&self, root: Hash32, step_total: u64, total_layers: u32) -> ChallengeId {
        self.state().open(root, step_total, total_layers)
    }
}

pub struct JudgeHandle {
    state: Arc<Mutex<JudgeState>>,
    role: Role,
}

impl JudgeHandle {
    fn with<T>(&self, mutation: Option<&str>, f: impl FnOnce(&mut JudgeState) -> JudgeResult<T>) -> JudgeResult<T> {
        let mut st = self.state.lock().unwrap();
        if st.transport_faults > 0 {
            st.transport_faults -= 1;
            return Err(JudgeError::Transport("connection reset by peer".into()));
        }
        if let Some(op) = mutation {
            st.calls.push((self.role, op.to_string()));
        }
        f(&mut st)
    }

    fn require(&self, role: Role) -> JudgeResult<()> {
        if self.role != role {
            return Err(revert(format!("caller is not the {}", role)));
        }
        Ok(())
    }
}

#[async_trait]
impl Judge for JudgeHandle {
    fn role(&self) -> Role {
        self.role
    }

    async fn current_step(&self, id: ChallengeId) -> JudgeResult<u64> {
        self.with(None, |st| Ok(st.challenge(id)?.current().step_number))
    }

    async fn current_layer(&self, id: ChallengeId) -> JudgeResult<u32> {
        self.with(None, |st| Ok(st.challenge(id)?.layers.len() as u32 - 1))
    }

    async fn total_layer(&self, id: ChallengeId) -> JudgeResult<u32> {
        self.with(None, |st| Ok(st.challenge(id)?.total_layer))
    }

    async fn node_id(&self, id: ChallengeId) -> JudgeResult<u64> {
        self.with(None, |st| {
            let ch = st.challenge(id)?;
            let n = ch.layers.len();
            Ok(if n > 1 { ch.layers[n - 2].left } else { 0 })
        })
    }

    async fn is_searching(&self, id: ChallengeId) -> JudgeResult<bool> {
        self.with(None, |st| Ok(st.challenge(id)?.current().searching))
    }

    async fn proposed_state(&self, id: ChallengeId) -> JudgeResult<Hash32> {
        self.with(None, |st| Ok(st.challenge(id)?.proposed))
    }

    async fn checkpoint_at(&self, id: ChallengeId, layer: u32) -> JudgeResult<i64> {
        self.with(None, |st| {
            let ch = st.challenge(id)?;
            let cur = ch.layers.len() - 1;
            match (layer as usize).cmp(&cur) {
                std::cmp::Ordering::Less => Ok(ch.layers[layer as usize].left as i64),
                std::cmp::Ordering::Equal => Ok(ch.current().step_number as i64),
                std::cmp::Ordering::Greater => Err(revert("layer not reached")),
            }
        })
    }

    async fn step_count_at(&self, id: ChallengeId, layer: u32) -> JudgeResult<u64> {
        self.with(None, |st| {
            st.challenge(id)?
                .layers
                .get(layer as usize)
                .map(|l| l.total)
                .ok_or_else(|| revert("layer not reached"))
        })
    }

    async fn claimed_result(&self) -> JudgeResult<Hash32> {
        self.with(None, |st| Ok(st.claimed))
    }

    async fn submit_result(&self, root: Hash32) -> JudgeResult<()> {
        self.require(Role::Submitter)?;
        self.with(Some("submitResult"), |st| {
            st.claimed = root;
            Ok(())
        })
    }

    async fn initiate_challenge(&self, root: Hash32, step_total: u64, total_layers: u32) -> JudgeResult<ChallengeId> {
        self.require(Role::Challenger)?;
        self.with(Some("initiateChallenge"), |st| {
            st.check_initiate(root, step_total, &HashMap::new())?;
            Ok(st.open(root, step_total, total_layers))
        })
    }

    async fn propose_state(&self, id: ChallengeId, root: Hash32) -> JudgeResult<()> {
        self.require(Role::Challenger)?;
        self.with(Some("proposeState"), |st| {
            let ch = st.challenge_mut(id)?;
            if !ch.current().searching || !ch.proposed.is_zero() {
                return Err(revert("not proposing"));
            }
            ch.proposed = root;
            Ok(())
        })
    }

    async fn respond_state(&self, id: ChallengeId, root: Hash32) -> JudgeResult<()> {
        self.require(Role::Submitter)?;
        self.with(Some("respondState"), |st| {
            let ch = st.challenge_mut(id)?;
            if !ch.current().searching || ch.proposed.is_zero() {
                return Err(revert("nothing to respond to"));
            }
            let proposed = ch.proposed;
            ch.current_mut().record(proposed, root);
            ch.proposed = Hash32::ZERO;
            Ok(())
        })
    }

    async fn advance_layer(&self, id: ChallengeId, start_root: Hash32, end_root: Hash32, end_step_count: u64) -> JudgeResult<()> {
        let role = self.role;
        self.with(Some("advanceLayer"), |st| {
            let ch = st.challenge_mut(id)?;
            if ch.current().searching || ch.layers.len() as u32 + 1 > ch.total_layer {
                return Err(revert("cannot advance"));
            }
            ch.pending.insert(role, (start_root, end_root, end_step_count));
            let (Some(a), Some(d)) = (
                ch.pending.get(&Role::Challenger).copied(),
                ch.pending.get(&Role::Submitter).copied(),
            ) else {
                return Ok(());
            };
            if a.2 != d.2 {
                return Err(revert("step count mismatch"));
            }
            let layer = LayerSearch::new(a.2, (a.0, a.1), (d.0, d.1));
            ch.pending.clear();
            ch.layers.push(layer);
            Ok(())
        })
    }

    async fn confirm_transition(&self, id: ChallengeId) -> JudgeResult<()> {
        self.require(Role::Challenger)?;
        self.with(Some("confirmStateTransition"), |st| {
            st.check_settle(id, Role::Challenger, &HashMap::new())?;
            st.settled.push((id, Role::Challenger));
            Ok(())
        })
    }

    async fn deny_transition(&self, id: ChallengeId) -> JudgeResult<()> {
        self.require(Role::Submitter)?;
        self.with(Some("denyStateTransition"), |st| {
            st.check_settle(id, Role::Submitter, &HashMap::new())?;
            st.settled.push((id, Role::Submitter));
            Ok(())
        })
    }

    async fn call_with_witness(&self, call: &JudgeCall, nodes: &[Vec<u8>]) -> JudgeResult<()> {
        let extra: HashMap<Hash32, Vec<u8>> = nodes.iter().map(|n| (Hash32::digest(n), n.clone())).collect();
        let role = self.role;
        self.with(None, |st| {
            st.probes += 1;
            match call {
                JudgeCall::InitiateChallenge { root, step_total, .. } => st.check_initiate(*root, *step_total, &extra),
                JudgeCall::ConfirmStateTransition { id } if role == Role::Challenger => {
                    st.check_settle(*id, Role::Challenger, &extra)
                }
                JudgeCall::DenyStateTransition { id } if role == Role::Submitter => {
                    st.check_settle(*id, Role::Submitter, &extra)
                }
                _ => Err(revert("caller may not make this call")),
            }
        })
    }

    async fn supply_node(&self, node: &[u8]) -> JudgeResult<()> {
        self.with(Some("supplyNode"), |st| {
            st.nodes.insert(Hash32::digest(node), node.to_vec());
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Scripted judge
// ---------------------------------------------------------------------------

/// Answers `call_with_witness` from a fixed script of results and records
/// the witness size of every probe. Everything else is unsupported.
pub struct ScriptedJudge {
    script: Mutex<VecDeque<JudgeResult<()>>>,
    pub probe_sizes: Mutex<Vec<usize>>,
}

impl ScriptedJudge {
    pub fn new(script: Vec<JudgeResult<()>>) -> Self {
        Self { script: Mutex::new(script.into()), probe_sizes: Mutex::new(Vec::new()) }
    }
}

fn unsupported<T>() -> JudgeResult<T> {
    Err(JudgeError::Transport("unsupported".into()))
}

#[async_trait]
impl Judge for ScriptedJudge {
    fn role(&self) -> Role {
        Role::Challenger
    }
    async fn current_step(&self, _: ChallengeId) -> JudgeResult<u64> { unsupported() }
    async fn current_layer(&self, _: ChallengeId) -> JudgeResult<u32> { unsupported() }
    async fn total_layer(&self, _: ChallengeId) -> JudgeResult<u32> { unsupported() }
    async fn node_id(&self, _: ChallengeId) -> JudgeResult<u64> { unsupported() }
    async fn is_searching(&self, _: ChallengeId) -> JudgeResult<bool> { unsupported() }
    async fn proposed_state(&self, _: ChallengeId) -> JudgeResult<Hash32> { unsupported() }
    async fn checkpoint_at(&self, _: ChallengeId, _: u32) -> JudgeResult<i64> { unsupported() }
    async fn step_count_at(&self, _: ChallengeId, _: u32) -> JudgeResult<u64> { unsupported() }
    async fn claimed_result(&self) -> JudgeResult<Hash32> { unsupported() }
    async fn submit_result(&self, _: Hash32) -> JudgeResult<()> { unsupported() }
    async fn initiate_challenge(&self, _: Hash32, _: u64, _: u32) -> JudgeResult<ChallengeId> { unsupported() }
    async fn propose_state(&self, _: ChallengeId, _: Hash32) -> JudgeResult<()> { unsupported() }
    async fn respond_state(&self, _: ChallengeId, _: Hash32) -> JudgeResult<()> { unsupported() }
    async fn advance_layer(&self, _: ChallengeId, _: Hash32, _: Hash32, _: u64) -> JudgeResult<()> { unsupported() }
    async fn confirm_transition(&self, _: ChallengeId) -> JudgeResult<()> { unsupported() }
    async fn deny_transition(&self, _: ChallengeId) -> JudgeResult<()> { unsupported() }

    async fn call_with_witness(&self, _: &JudgeCall, nodes: &[Vec<u8>]) -> JudgeResult<()> {
        self.probe_sizes.lock().unwrap().push(nodes.len());
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn supply_node(&self, _: &[u8]) -> JudgeResult<()> { unsupported() }
}

// ---------------------------------------------------------------------------
// Game setup
// ---------------------------------------------------------------------------

pub const SEED: &[u8] = b"mnist-input-7";

pub struct Game {
    pub dir: TempDir,
    pub node: NodeConfig,
    pub engine: Arc<ToyEngine>,
    pub provider: Arc<SnapshotProvider>,
    pub judge: ReferenceJudge,
    pub submitter: SessionConfig,
    pub challenger: SessionConfig,
}

impl Game {
    pub fn session(&self) -> DisputeSession {
        DisputeSession::new(
            self.judge.handle(Role::Challenger),
            self.judge.handle(Role::Submitter),
            self.provider.clone(),
            self.node.retry.clone(),
        )
    }
}

pub fn node_config(dir: &TempDir) -> NodeConfig {
    node_config_with_layers(dir, 2)
}

pub fn node_config_with_layers(dir: &TempDir, layers: u32) -> NodeConfig {
    let input = dir.path().join("input.dat");
    std::fs::write(&input, SEED).unwrap();
    NodeConfig {
        submitter_dir: dir.path().join("cannon"),
        challenger_dir: dir.path().join("cannon_fault"),
        data_path: input.to_string_lossy().into_owned(),
        total_phase: layers,
        retry: RetryPolicy { max_attempts: 3, base_delay_ms: 1, max_delay_ms: 5 },
        ..NodeConfig::default()
    }
}

/// Two-layer game: phases, then single updates.
pub async fn game(submitter_fault: Option<Fault>, challenger_fault: Option<Fault>) -> Game {
    game_with_layers(2, submitter_fault, challenger_fault).await
}

/// Both roles with their own base directory; the judge is deployed with the
/// golden root and the submitter's final root.
pub async fn game_with_layers(layers: u32, submitter_fault: Option<Fault>, challenger_fault: Option<Fault>) -> Game {
    let dir = tempfile::tempdir().unwrap();
    let node = node_config_with_layers(&dir, layers);
    let submitter = node.role_config(Role::Submitter);
    let challenger = node.role_config(Role::Challenger);

    let mut engine = ToyEngine::new();
    if let Some(fault) = submitter_fault {
        engine = engine.with_fault(&submitter.basedir, fault);
    }
    if let Some(fault) = challenger_fault {
        engine = engine.with_fault(&challenger.basedir, fault);
    }
    let engine = Arc::new(engine);
    let provider = Arc::new(SnapshotProvider::new(engine.clone()));

    let genesis = provider.get(&submitter, &Coordinate::root(0)).await.unwrap().root;
    let claimed = provider.get(&submitter, &Coordinate::root(FINAL_STEP)).await.unwrap().root;
    let judge = ReferenceJudge::new(genesis, claimed);

    Game { dir, node, engine, provider, judge, submitter, challenger }
}

/// Honest final state of a `layers`-layer game.
pub fn final_state(layers: u32) -> MachineState {
    let engine = ToyEngine::new();
    let sizes = layer_sizes(layers);
    let mut s = MachineState::from_seed(SEED);
    for _ in 0..PHASES {
        s = engine.unit(None, &sizes, 0, s);
    }
    s
}

/// Honest final state of the two-layer game.
pub fn honest_final() -> MachineState {
    final_state(2)
}
