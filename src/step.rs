use std::sync::Arc;

use rayon::prelude::*;

use crate::core::{Core, Owner, normalize};
use crate::word::{AddressField, Word, decode};

/// One proposed write for this generation: destination cell, computed
/// value, and the writer's own current owner.
struct Commit {
    dest: usize,
    value: Word,
    owner: Arc<Owner>,
}

/// Resolve an address field relative to the cell at `i`, against the
/// frozen snapshot. Single-level indirection: the word at the direct
/// address is added in, then wrapped again.
fn effective_address(field: AddressField, i: usize, words: &[Word]) -> usize {
    let n = words.len();
    let p = normalize(i as i64 + field.offset as i64, n);
    if field.indirect {
        normalize(p as i64 + words[p] as i64, n)
    } else {
        p
    }
}

impl Core {
    /// Advance the whole store by exactly one generation.
    ///
    /// Every cell is decoded as a candidate instruction against a
    /// frozen pre-step snapshot; no cell observes another cell's
    /// same-generation write. Evaluation runs data-parallel, which is
    /// safe because the commit outcome only depends on how many writers
    /// targeted each destination, never on arrival order.
    pub fn step(&mut self) {
        let words = self.snapshot_words();
        let owners = self.snapshot_ownership();
        let n = words.len();

        let commits: Vec<Commit> = (0..n)
            .into_par_iter()
            .filter_map(|i| {
                let instr = decode(words[i]);
                // Undefined opcodes are inert data, never a fault.
                let op = instr.opcode()?;
                let cond_value = words[effective_address(instr.cond_addr, i, &words)];
                if !instr.cond.holds(cond_value) {
                    return None;
                }
                let s1 = words[effective_address(instr.source1, i, &words)];
                let s2 = words[effective_address(instr.source2, i, &words)];
                Some(Commit {
                    dest: effective_address(instr.target, i, &words),
                    value: op.apply(s1, s2),
                    owner: Arc::clone(&owners[i]),
                })
            })
            .collect();

        // Commit phase. A destination targeted exactly once takes its
        // writer's value and owner, even when the value is unchanged. A
        // destination targeted more than once keeps its pre-step word
        // and owner: the first writer's update is discarded too.
        let mut writers = vec![0u32; n];
        for commit in &commits {
            writers[commit.dest] += 1;
        }
        for commit in commits {
            if writers[commit.dest] == 1 {
                self.words[commit.dest] = commit.value;
                self.owners[commit.dest] = commit.owner;
            }
        }

        self.instruction_counter += 1;
    }
}
