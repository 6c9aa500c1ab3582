use std::sync::{Arc, Mutex};

use idea_rank::integrity::{
    verify_blocks, Clock, FaultKind, IntegrityBlock, IntegrityChain, MemoryChainStore,
    GENESIS_PREVIOUS_HASH,
};
use idea_rank::{HashAlgorithm, IdeaId};

struct TickClock(Mutex<i64>);

impl Clock for TickClock {
    fn now_ms(&self) -> i64 {
        let mut now = self.0.lock().unwrap();
        *now += 7;
        *now
    }
}

fn build_chain(n: usize, alg: HashAlgorithm) -> IntegrityChain {
    let chain = IntegrityChain::in_memory(alg).with_clock(Arc::new(TickClock(Mutex::new(
        1_700_000_000_000,
    ))));
    for i in 0..n {
        chain
            .append(
                &IdeaId::new(format!("idea-{i}")),
                &alg.hash_text(&format!("content-{i}")),
            )
            .unwrap();
    }
    chain
}

fn reopen(blocks: Vec<IntegrityBlock>, alg: HashAlgorithm) -> IntegrityChain {
    IntegrityChain::open(Box::new(MemoryChainStore::from_blocks(blocks)), alg).unwrap()
}

type Tamper = fn(&mut IntegrityBlock);

fn bump_index(b: &mut IntegrityBlock) {
    b.index += 100;
}

fn bump_timestamp(b: &mut IntegrityBlock) {
    b.timestamp_ms += 1;
}

fn swap_idea(b: &mut IntegrityBlock) {
    b.payload.idea_id = IdeaId::from("forged");
}

fn swap_content(b: &mut IntegrityBlock) {
    b.payload.content_hash = HashAlgorithm::Blake3.hash_text("forged");
}

fn swap_previous(b: &mut IntegrityBlock) {
    b.previous_hash = "f".repeat(64);
}

fn swap_hash(b: &mut IntegrityBlock) {
    b.hash = "e".repeat(64);
}

const TAMPERS: [(&str, Tamper); 6] = [
    ("index", bump_index),
    ("timestamp", bump_timestamp),
    ("idea_id", swap_idea),
    ("content_hash", swap_content),
    ("previous_hash", swap_previous),
    ("hash", swap_hash),
];

#[test]
fn untouched_chains_verify_for_every_length() {
    for alg in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
        for n in 0..=12 {
            let chain = build_chain(n, alg);
            assert_eq!(chain.verify().unwrap().as_tuple(), (true, None), "n={n}");
            assert_eq!(chain.len().unwrap(), n);
        }
    }
}

#[test]
fn any_field_mutation_is_reported_at_its_index() {
    let alg = HashAlgorithm::Blake3;
    let pristine = build_chain(6, alg).blocks().unwrap();
    for i in 0..pristine.len() {
        for (field, tamper) in TAMPERS {
            let mut blocks = pristine.clone();
            tamper(&mut blocks[i]);
            let chain = reopen(blocks, alg);
            let verification = chain.verify().unwrap();
            assert_eq!(
                verification.as_tuple(),
                (false, Some(i as u64)),
                "field {field} at block {i}"
            );
            assert!(verification.into_result().is_err());
        }
    }
}

#[test]
fn fault_kind_names_the_broken_check() {
    let alg = HashAlgorithm::Sha256;
    let pristine = build_chain(3, alg).blocks().unwrap();

    let mut blocks = pristine.clone();
    blocks[1].index = 9;
    assert_eq!(
        verify_blocks(&blocks, alg).fault.unwrap().kind,
        FaultKind::IndexMismatch
    );

    let mut blocks = pristine.clone();
    blocks[2].timestamp_ms -= 1;
    assert_eq!(
        verify_blocks(&blocks, alg).fault.unwrap().kind,
        FaultKind::HashMismatch
    );

    // genesis resealed over a non-zero previous hash
    let mut blocks = pristine;
    blocks[0].previous_hash = "1".repeat(64);
    blocks[0].hash = blocks[0].compute_hash(alg);
    let fault = verify_blocks(&blocks, alg).fault.unwrap();
    assert_eq!((fault.index, fault.kind), (0, FaultKind::LinkMismatch));
}

#[test]
fn removing_a_block_is_detected() {
    let alg = HashAlgorithm::Blake3;
    let mut blocks = build_chain(5, alg).blocks().unwrap();
    blocks.remove(2);
    assert_eq!(verify_blocks(&blocks, alg).as_tuple(), (false, Some(2)));
}

#[test]
fn serde_round_trip_preserves_block_hashes() {
    let alg = HashAlgorithm::Sha256;
    let blocks = build_chain(4, alg).blocks().unwrap();
    let json = serde_json::to_string(&blocks).unwrap();
    let back: Vec<IntegrityBlock> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, blocks);
    for block in &back {
        assert_eq!(block.compute_hash(alg), block.hash);
    }
    assert_eq!(back[0].previous_hash, GENESIS_PREVIOUS_HASH);
    assert_eq!(verify_blocks(&back, alg).as_tuple(), (true, None));
}

#[test]
fn reopened_chain_keeps_extending_the_same_links() {
    let alg = HashAlgorithm::Blake3;
    let blocks = build_chain(3, alg).blocks().unwrap();
    let last_hash = blocks[2].hash.clone();
    let chain = reopen(blocks, alg);
    let next = chain
        .append(&IdeaId::from("late"), &alg.hash_text("late"))
        .unwrap();
    assert_eq!(next.index, 3);
    assert_eq!(next.previous_hash, last_hash);
    assert_eq!(chain.verify().unwrap().as_tuple(), (true, None));
}

#[test]
fn concurrent_appends_stay_linked() {
    let alg = HashAlgorithm::Blake3;
    let chain = Arc::new(IntegrityChain::in_memory(alg));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let chain = Arc::clone(&chain);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let id = IdeaId::new(format!("t{t}-{i}"));
                    chain.append(&id, &alg.hash_text(id.as_str())).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let verification = chain.verify().unwrap();
    assert_eq!(verification.as_tuple(), (true, None));
    assert_eq!(verification.blocks_checked, 100);
    let blocks = chain.blocks().unwrap();
    assert!(blocks
        .windows(2)
        .all(|w| w[1].timestamp_ms >= w[0].timestamp_ms));
}
