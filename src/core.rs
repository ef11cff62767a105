use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::error::CoreError;
use crate::word::{INSTRUCTION_BITS, Word, decode};

/// A display color for one owner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn random(rng: &mut SmallRng) -> Color {
        Color {
            r: rng.gen_range(0..=255),
            g: rng.gen_range(0..=255),
            b: rng.gen_range(0..=255),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// The identity stamped on every cell a warrior has written.
///
/// Owners are shared by reference: two cells belong to the same owner
/// exactly when their handles point at the same allocation
/// (`Arc::ptr_eq`), never by comparing colors.
#[derive(Debug)]
pub struct Owner {
    pub color: Color,
}

impl Owner {
    pub fn new(color: Color) -> Arc<Owner> {
        Arc::new(Owner { color })
    }
}

/// Wraparound index normalization shared by the store, the assembler,
/// and the step engine.
pub(crate) fn normalize(i: i64, size: usize) -> usize {
    let n = size as i64;
    (((i % n) + n) % n) as usize
}

/// The store: a fixed-size circular array of words with a parallel
/// ownership array and a monotonic generation counter.
///
/// There is no internal locking. Assembly and stepping mutate the store
/// only between discrete, fully sequential operations; callers serialize
/// them on a single timeline.
#[derive(Debug)]
pub struct Core {
    pub(crate) words: Vec<Word>,
    pub(crate) owners: Vec<Arc<Owner>>,
    pub(crate) instruction_counter: u64,
    /// Rebased label table from past assemblies. Display only; the step
    /// engine never reads it.
    labels: HashMap<String, usize>,
}

impl Core {
    /// Create a store of `size` cells.
    ///
    /// Randomized: every cell holds a random 24-bit word under its own
    /// distinct random-colored owner. Zeroed: every cell holds 0 and all
    /// cells share one black owner. All randomness comes from `seed`;
    /// equal seeds build equal stores.
    pub fn new(size: usize, randomize: bool, seed: u64) -> Result<Core, CoreError> {
        if size == 0 {
            return Err(CoreError::InvalidSize);
        }
        let mut words = Vec::with_capacity(size);
        let mut owners = Vec::with_capacity(size);
        if randomize {
            let mut rng = SmallRng::seed_from_u64(seed);
            for _ in 0..size {
                words.push(rng.gen_range(0..1u32 << INSTRUCTION_BITS) as Word);
                owners.push(Owner::new(Color::random(&mut rng)));
            }
        } else {
            let black = Owner::new(Color::BLACK);
            words.resize(size, 0);
            owners.resize(size, black);
        }
        Ok(Core {
            words,
            owners,
            instruction_counter: 0,
            labels: HashMap::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }

    /// Generations completed so far. Bumped only by `step`.
    pub fn instruction_counter(&self) -> u64 {
        self.instruction_counter
    }

    pub(crate) fn normalize(&self, i: i64) -> usize {
        normalize(i, self.words.len())
    }

    /// Read the word at `i`, wrapping the index into range.
    pub fn read(&self, i: i64) -> Word {
        self.words[self.normalize(i)]
    }

    /// Write `word` at `i` (wrapped) and stamp `owner` on the cell.
    pub fn write(&mut self, i: i64, word: Word, owner: &Arc<Owner>) {
        let p = self.normalize(i);
        self.words[p] = word;
        self.owners[p] = Arc::clone(owner);
    }

    /// Owner handle of the cell at `i` (wrapped).
    pub fn owner(&self, i: i64) -> &Arc<Owner> {
        &self.owners[self.normalize(i)]
    }

    /// Frozen copy of the word array for a step's pre-state.
    pub fn snapshot_words(&self) -> Vec<Word> {
        self.words.clone()
    }

    /// Frozen copy of the ownership array for a step's pre-state.
    pub fn snapshot_ownership(&self) -> Vec<Arc<Owner>> {
        self.owners.clone()
    }

    /// Read-only per-cell view for rendering collaborators: each cell's
    /// word and its owner's color, in address order.
    pub fn cells(&self) -> impl Iterator<Item = (Word, Color)> + '_ {
        self.words
            .iter()
            .zip(self.owners.iter())
            .map(|(&w, o)| (w, o.color))
    }

    /// Labels bound by past assemblies, rebased to absolute addresses.
    pub fn labels(&self) -> &HashMap<String, usize> {
        &self.labels
    }

    pub(crate) fn bind_labels(&mut self, rebased: HashMap<String, usize>) {
        self.labels.extend(rebased);
    }

    /// Debugging dump of addresses `[lo, hi)`, wrapped: address, raw
    /// word, decoded instruction text, with bound label names announced
    /// at their addresses. Display only; never re-parsed.
    pub fn dump(&self, lo: i64, hi: i64) -> String {
        let mut names_at: HashMap<usize, Vec<&str>> = HashMap::new();
        for (name, &addr) in &self.labels {
            names_at.entry(addr).or_default().push(name);
        }
        for names in names_at.values_mut() {
            names.sort_unstable();
        }

        let mut out = String::new();
        for i in lo..hi {
            let p = self.normalize(i);
            if let Some(names) = names_at.get(&p) {
                for name in names {
                    let _ = writeln!(out, "{name}:");
                }
            }
            let word = self.words[p];
            let instr = decode(word);
            if instr.opcode().is_some() {
                let _ = writeln!(out, "{p:5}: {word:10}  {instr}");
            } else {
                let _ = writeln!(out, "{p:5}: {word:10}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_size_rejected() {
        assert_eq!(Core::new(0, true, 42).unwrap_err(), CoreError::InvalidSize);
        assert_eq!(Core::new(0, false, 42).unwrap_err(), CoreError::InvalidSize);
    }

    #[test]
    fn test_core_is_debuggable() {
        // Keeps Core usable with unwrap_err/assert in tests and dbg! in
        // driver code.
        let core = Core::new(4, false, 0).unwrap();
        assert!(format!("{core:?}").contains("instruction_counter"));
    }

    #[test]
    fn test_zeroed_construction() {
        let core = Core::new(16, false, 0).unwrap();
        assert!(core.cells().all(|(w, c)| w == 0 && c == Color::BLACK));
        // One shared owner across every cell.
        for i in 1..16 {
            assert!(Arc::ptr_eq(core.owner(0), core.owner(i)));
        }
        assert_eq!(core.instruction_counter(), 0);
    }

    #[test]
    fn test_randomized_construction_is_deterministic() {
        let a = Core::new(64, true, 42).unwrap();
        let b = Core::new(64, true, 42).unwrap();
        assert_eq!(a.snapshot_words(), b.snapshot_words());
        assert!(a.cells().zip(b.cells()).all(|(x, y)| x.1 == y.1));

        let c = Core::new(64, true, 43).unwrap();
        assert_ne!(a.snapshot_words(), c.snapshot_words());
    }

    #[test]
    fn test_randomized_words_fit_instruction_width() {
        let core = Core::new(256, true, 7).unwrap();
        for (w, _) in core.cells() {
            assert!((0..1 << INSTRUCTION_BITS).contains(&w));
        }
    }

    #[test]
    fn test_randomized_owners_distinct() {
        let core = Core::new(8, true, 1).unwrap();
        for i in 0..8 {
            for j in (i + 1)..8 {
                assert!(!Arc::ptr_eq(core.owner(i as i64), core.owner(j as i64)));
            }
        }
    }

    #[test]
    fn test_wraparound_indexing() {
        let owner = Owner::new(Color { r: 1, g: 2, b: 3 });
        let mut core = Core::new(8, false, 0).unwrap();
        core.write(10, 7, &owner);
        assert_eq!(core.read(2), 7);
        assert_eq!(core.read(10), 7);
        assert!(Arc::ptr_eq(core.owner(2), &owner));
        core.write(-1, 9, &owner);
        assert_eq!(core.read(7), 9);
    }

    #[test]
    fn test_dump_formats_instructions() {
        let owner = Owner::new(Color::BLACK);
        let mut core = Core::new(8, false, 0).unwrap();
        // SUB 1 0 0 under the default condition.
        let w = crate::word::encode(
            crate::word::Opcode::Sub as u8,
            crate::word::Cond::NonZero,
            crate::word::AddressField::DIRECT_ZERO,
            crate::word::AddressField { indirect: false, offset: 1 },
            crate::word::AddressField::DIRECT_ZERO,
            crate::word::AddressField::DIRECT_ZERO,
        );
        core.write(3, w, &owner);
        let dump = core.dump(3, 4);
        assert!(dump.contains("SUB 1 0 0"), "{dump}");
        assert!(dump.starts_with("    3:"), "{dump}");
    }
}
