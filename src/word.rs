use std::fmt;

/// A machine word.
///
/// Instructions occupy the low 24 bits. Arithmetic results are *not*
/// masked back down to 24 bits, so words roam the full signed range
/// between generations; decoding only ever looks at the low 24 bits.
pub type Word = i32;

/// Number of bits in the instruction encoding.
pub const INSTRUCTION_BITS: u32 = 24;

/// Mask selecting the instruction bits of a word.
pub const WORD_MASK: u32 = (1 << INSTRUCTION_BITS) - 1;

/// Smallest representable relative offset.
pub const OFFSET_MIN: i64 = -4;

/// Largest representable relative offset.
pub const OFFSET_MAX: i64 = 3;

/// One 4-bit address field: an indirect flag plus a 3-bit
/// two's-complement offset relative to the executing cell's address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AddressField {
    pub indirect: bool,
    /// Always in `[-4, 3]`.
    pub offset: i8,
}

impl AddressField {
    /// The default condition address: the executing cell itself.
    pub const DIRECT_ZERO: AddressField = AddressField {
        indirect: false,
        offset: 0,
    };

    fn decode(nibble: u32) -> Self {
        let magnitude = (nibble & 0x7) as i8;
        AddressField {
            indirect: nibble & 0x8 != 0,
            offset: if magnitude >= 4 {
                magnitude - 8
            } else {
                magnitude
            },
        }
    }

    fn encode(self) -> u32 {
        let magnitude = (self.offset as u32) & 0x7;
        if self.indirect { magnitude | 0x8 } else { magnitude }
    }
}

impl fmt::Display for AddressField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.indirect {
            write!(f, "@{}", self.offset)
        } else {
            write!(f, "{}", self.offset)
        }
    }
}

/// Condition codes, in encoding order.
///
/// `NonZero` is pattern 0 on purpose: the assembler's default condition
/// (no `IF.` prefix) is "NonZero, condaddr direct 0", so the default
/// encodes as zero bits and the all-zero word tests its own zero word
/// and never fires.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Cond {
    NonZero = 0,
    Zero = 1,
    Positive = 2,
    Negative = 3,
}

impl Cond {
    fn decode(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Cond::NonZero,
            1 => Cond::Zero,
            2 => Cond::Positive,
            _ => Cond::Negative,
        }
    }

    /// Does a dereferenced condition value satisfy this code?
    pub fn holds(self, value: Word) -> bool {
        match self {
            Cond::NonZero => value != 0,
            Cond::Zero => value == 0,
            Cond::Positive => value > 0,
            Cond::Negative => value < 0,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Cond::NonZero => "NZ",
            Cond::Zero => "Z",
            Cond::Positive => "+",
            Cond::Negative => "-",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Cond> {
        match s.to_ascii_uppercase().as_str() {
            "NZ" => Some(Cond::NonZero),
            "Z" => Some(Cond::Zero),
            "+" => Some(Cond::Positive),
            "-" => Some(Cond::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// The six defined operators, in encoding order. The other 58 opcode
/// patterns decode fine but never produce a write.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Opcode {
    Add = 0,
    Sub = 1,
    And = 2,
    Bic = 3,
    Or = 4,
    Xor = 5,
}

impl Opcode {
    pub fn from_bits(bits: u8) -> Option<Opcode> {
        match bits {
            0 => Some(Opcode::Add),
            1 => Some(Opcode::Sub),
            2 => Some(Opcode::And),
            3 => Some(Opcode::Bic),
            4 => Some(Opcode::Or),
            5 => Some(Opcode::Xor),
            _ => None,
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Opcode> {
        match s.to_ascii_uppercase().as_str() {
            "ADD" => Some(Opcode::Add),
            "SUB" => Some(Opcode::Sub),
            "AND" => Some(Opcode::And),
            "BIC" => Some(Opcode::Bic),
            "OR" => Some(Opcode::Or),
            "XOR" => Some(Opcode::Xor),
            _ => None,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::And => "AND",
            Opcode::Bic => "BIC",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
        }
    }

    /// Combine two dereferenced source values. ADD/SUB wrap at the
    /// natural width of `Word`, not at 24 bits.
    pub fn apply(self, a: Word, b: Word) -> Word {
        match self {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::And => a & b,
            Opcode::Bic => a & !b,
            Opcode::Or => a | b,
            Opcode::Xor => a ^ b,
        }
    }
}

/// Decoded, read-only projection of a word. Never stored; always
/// derived on the fly from the word it projects.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Instruction {
    /// Raw 6-bit opcode pattern, defined or not.
    pub opcode_bits: u8,
    pub cond: Cond,
    pub cond_addr: AddressField,
    pub target: AddressField,
    pub source1: AddressField,
    pub source2: AddressField,
}

impl Instruction {
    /// The defined operator, if the opcode pattern names one.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_bits(self.opcode_bits)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.opcode() else {
            return f.write_str("???");
        };
        if self.cond != Cond::NonZero || self.cond_addr != AddressField::DIRECT_ZERO {
            write!(f, "IF.{} {} ", self.cond, self.cond_addr)?;
        }
        write!(
            f,
            "{} {} {} {}",
            op.mnemonic(),
            self.target,
            self.source1,
            self.source2
        )
    }
}

/// Unpack the low 24 bits of a word. Total: every bit pattern decodes.
///
/// Layout: `[23:18]` opcode, `[17:16]` condition code, `[15:12]`
/// condition address, `[11:8]` target, `[7:4]` source1, `[3:0]` source2.
pub fn decode(word: Word) -> Instruction {
    let w = (word as u32) & WORD_MASK;
    Instruction {
        opcode_bits: ((w >> 18) & 0x3f) as u8,
        cond: Cond::decode((w >> 16) & 0x3),
        cond_addr: AddressField::decode((w >> 12) & 0xf),
        target: AddressField::decode((w >> 8) & 0xf),
        source1: AddressField::decode((w >> 4) & 0xf),
        source2: AddressField::decode(w & 0xf),
    }
}

/// Pack fields into a word. Inverse of [`decode`] on the low 24 bits.
pub fn encode(
    opcode_bits: u8,
    cond: Cond,
    cond_addr: AddressField,
    target: AddressField,
    source1: AddressField,
    source2: AddressField,
) -> Word {
    let w = ((opcode_bits as u32 & 0x3f) << 18)
        | ((cond as u32) << 16)
        | (cond_addr.encode() << 12)
        | (target.encode() << 8)
        | (source1.encode() << 4)
        | source2.encode();
    w as Word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_every_word() {
        // decode is total and encode inverts it, over all 2^24 patterns.
        for w in 0..(1u32 << INSTRUCTION_BITS) {
            let i = decode(w as Word);
            let back = encode(i.opcode_bits, i.cond, i.cond_addr, i.target, i.source1, i.source2);
            assert_eq!(back as u32 & WORD_MASK, w);
        }
    }

    #[test]
    fn test_field_round_trip() {
        for opcode_bits in 0..64u8 {
            for cond_bits in 0..4u32 {
                let cond = Cond::decode(cond_bits);
                for nibble in 0..16u32 {
                    let field = AddressField::decode(nibble);
                    let w = encode(opcode_bits, cond, field, field, field, field);
                    let i = decode(w);
                    assert_eq!(i.opcode_bits, opcode_bits);
                    assert_eq!(i.cond, cond);
                    assert_eq!(i.cond_addr, field);
                    assert_eq!(i.target, field);
                    assert_eq!(i.source1, field);
                    assert_eq!(i.source2, field);
                }
            }
        }
    }

    #[test]
    fn test_offset_sign_extension() {
        // Nibbles 0..3 are offsets 0..3, nibbles 4..7 are -4..-1.
        assert_eq!(AddressField::decode(0x0).offset, 0);
        assert_eq!(AddressField::decode(0x3).offset, 3);
        assert_eq!(AddressField::decode(0x4).offset, -4);
        assert_eq!(AddressField::decode(0x7).offset, -1);
        assert!(!AddressField::decode(0x7).indirect);
        // Bit 3 is the indirect flag, magnitude unchanged.
        assert!(AddressField::decode(0xc).indirect);
        assert_eq!(AddressField::decode(0xc).offset, -4);
    }

    #[test]
    fn test_zero_word_is_default_add() {
        let i = decode(0);
        assert_eq!(i.opcode(), Some(Opcode::Add));
        assert_eq!(i.cond, Cond::NonZero);
        assert_eq!(i.cond_addr, AddressField::DIRECT_ZERO);
        assert_eq!(i.target, AddressField::DIRECT_ZERO);
    }

    #[test]
    fn test_decode_ignores_high_bits() {
        // Words above 24 bits (e.g. unmasked arithmetic results) decode
        // from their low 24 bits only.
        assert_eq!(decode(-1), decode(WORD_MASK as Word));
        let w = 0x12_3456;
        assert_eq!(decode(w), decode(w | 0x7f00_0000));
    }

    #[test]
    fn test_known_encoding() {
        // XOR (op 5) with target +1, source1 -1 indirect, source2 0:
        // opcode 000101, cond 00, condaddr 0000, target 0001,
        // source1 1111, source2 0000.
        let w = encode(
            Opcode::Xor as u8,
            Cond::NonZero,
            AddressField::DIRECT_ZERO,
            AddressField { indirect: false, offset: 1 },
            AddressField { indirect: true, offset: -1 },
            AddressField::DIRECT_ZERO,
        );
        assert_eq!(w, 0b000101_00_0000_0001_1111_0000);
    }

    #[test]
    fn test_cond_holds() {
        assert!(Cond::Zero.holds(0));
        assert!(!Cond::Zero.holds(5));
        assert!(Cond::Positive.holds(1));
        assert!(!Cond::Positive.holds(0));
        assert!(!Cond::Positive.holds(-1));
        assert!(Cond::Negative.holds(-1));
        assert!(!Cond::Negative.holds(0));
        assert!(Cond::NonZero.holds(-7));
        assert!(!Cond::NonZero.holds(0));
    }

    #[test]
    fn test_opcode_apply() {
        assert_eq!(Opcode::Add.apply(2, 3), 5);
        assert_eq!(Opcode::Sub.apply(2, 3), -1);
        assert_eq!(Opcode::And.apply(0b1100, 0b1010), 0b1000);
        assert_eq!(Opcode::Bic.apply(0b1100, 0b1010), 0b0100);
        assert_eq!(Opcode::Or.apply(0b1100, 0b1010), 0b1110);
        assert_eq!(Opcode::Xor.apply(0b1100, 0b1010), 0b0110);
        // No re-masking to 24 bits: results wrap at the word width.
        assert_eq!(Opcode::Add.apply(Word::MAX, 1), Word::MIN);
        assert_eq!(Opcode::Sub.apply(Word::MIN, 1), Word::MAX);
    }

    #[test]
    fn test_undefined_opcodes() {
        for bits in 6..64u8 {
            assert_eq!(Opcode::from_bits(bits), None);
        }
    }

    #[test]
    fn test_display() {
        let w = encode(
            Opcode::Add as u8,
            Cond::Zero,
            AddressField { indirect: false, offset: 2 },
            AddressField { indirect: false, offset: 1 },
            AddressField { indirect: true, offset: -1 },
            AddressField { indirect: false, offset: 0 },
        );
        assert_eq!(decode(w).to_string(), "IF.Z 2 ADD 1 @-1 0");
        // Default condition is elided.
        assert_eq!(decode(0).to_string(), "ADD 0 0 0");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn address_field() -> impl Strategy<Value = AddressField> {
        (any::<bool>(), -4i8..=3).prop_map(|(indirect, offset)| AddressField { indirect, offset })
    }

    fn cond() -> impl Strategy<Value = Cond> {
        prop_oneof![
            Just(Cond::NonZero),
            Just(Cond::Zero),
            Just(Cond::Positive),
            Just(Cond::Negative),
        ]
    }

    proptest! {
        #[test]
        fn decode_never_panics(w in any::<i32>()) {
            let _ = decode(w).to_string();
        }

        #[test]
        fn encode_then_decode(
            opcode_bits in 0u8..64,
            c in cond(),
            ca in address_field(),
            t in address_field(),
            s1 in address_field(),
            s2 in address_field(),
        ) {
            let i = decode(encode(opcode_bits, c, ca, t, s1, s2));
            prop_assert_eq!(i.opcode_bits, opcode_bits);
            prop_assert_eq!(i.cond, c);
            prop_assert_eq!(i.cond_addr, ca);
            prop_assert_eq!(i.target, t);
            prop_assert_eq!(i.source1, s1);
            prop_assert_eq!(i.source2, s2);
        }
    }
}
