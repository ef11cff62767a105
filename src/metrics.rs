use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Color, Core, Owner};

/// Compute the high-order entropy (HOE) of the store's word bytes.
///
/// HOE = compressed_size / raw_size, where compression uses brotli at
/// quality 2. This approximates the normalized Kolmogorov complexity of
/// the store: ~1.0 for a freshly randomized core, well below 1.0 once
/// warriors have spread structure through it.
pub fn high_order_entropy(core: &Core) -> f64 {
    let data: Vec<u8> = core
        .cells()
        .flat_map(|(word, _)| word.to_le_bytes())
        .collect();

    let mut compressed = Vec::new();
    let params = brotli::enc::BrotliEncoderParams {
        quality: 2,
        ..Default::default()
    };
    brotli::BrotliCompress(&mut &data[..], &mut compressed, &params)
        .expect("brotli compression should not fail on valid input");

    compressed.len() as f64 / data.len() as f64
}

/// Count cells held per distinct owner, most cells first.
///
/// Owners are counted by identity (shared handle), not by color
/// equality; two owners that happen to share a color stay separate.
pub fn owner_census(core: &Core) -> Vec<(Color, usize)> {
    let mut counts: HashMap<*const Owner, (Color, usize)> = HashMap::new();
    for i in 0..core.size() {
        let owner = core.owner(i as i64);
        let entry = counts
            .entry(Arc::as_ptr(owner))
            .or_insert((owner.color, 0));
        entry.1 += 1;
    }
    let mut census: Vec<(Color, usize)> = counts.into_values().collect();
    census.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.r.cmp(&b.0.r)));
    census
}

/// Count cells holding a non-zero word.
pub fn live_cell_count(core: &Core) -> usize {
    core.cells().filter(|&(word, _)| word != 0).count()
}
