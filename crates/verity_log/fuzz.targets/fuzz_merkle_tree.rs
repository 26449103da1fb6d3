#![no_main]
use libfuzzer_sys::fuzz_target;
use verity_log::{root_from_leaves, CompactMerkleTree};

fuzz_target!(|data: &[u8]| {
    // Split the input into leaves on zero bytes
    let leaves: Vec<&[u8]> = data.split(|b| *b == 0).take(300).collect();

    let mut tree = CompactMerkleTree::new();
    for leaf in &leaves {
        tree.add_leaf(leaf);
    }

    assert_eq!(tree.leaf_count(), leaves.len() as u64);
    assert_eq!(tree.current_root(), root_from_leaves(&leaves));
});
