#[cfg(test)]
mod tests {
    use crate::assembly::isa::Opcode;
    use std::collections::HashSet;

    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    const EXPECTED_ISA_HASH: u64 = 6564576222989354090;

    fn fnv1a64(mut h: u64, bytes: &[u8]) -> u64 {
        for b in bytes {
            h ^= *b as u64;
            h = h.wrapping_mul(FNV_PRIME);
        }
        h
    }

    macro_rules! hash_isa {
        (
            $( $(#[$doc:meta])* $name:ident = $byte:expr, $mnemonic:literal, $code:literal => [ $( $kind:ident ),* $(,)? ] ),* $(,)?
        ) => {{
            let mut h = FNV_OFFSET;
            $(
                h = fnv1a64(h, stringify!($name).as_bytes());
                h = fnv1a64(h, &[Opcode::$name as u8]);
                h = fnv1a64(h, $mnemonic.as_bytes());
                h = fnv1a64(h, $code.as_bytes());
                $( h = fnv1a64(h, stringify!($kind).as_bytes()); )*
            )*
            h
        }};
    }

    fn current_isa_hash() -> u64 {
        crate::for_each_opcode!(hash_isa)
    }

    #[test]
    #[ignore]
    fn print_isa_hash() {
        println!("ISA_HASH={}", current_isa_hash());
    }

    /// Bytecode files and generated x86 depend on this table; changing it must be deliberate.
    #[test]
    fn isa_hash_unchanged() {
        assert_eq!(current_isa_hash(), EXPECTED_ISA_HASH);
    }

    #[test]
    fn bytes_mnemonics_and_codes_are_unique() {
        let bytes: HashSet<u8> = Opcode::ALL.iter().map(|op| *op as u8).collect();
        let mnemonics: HashSet<&str> = Opcode::ALL.iter().map(|op| op.mnemonic()).collect();
        let codes: HashSet<&str> = Opcode::ALL.iter().map(|op| op.code()).collect();
        assert_eq!(bytes.len(), Opcode::ALL.len());
        assert_eq!(mnemonics.len(), Opcode::ALL.len());
        assert_eq!(codes.len(), Opcode::ALL.len());
    }

    #[test]
    fn opcode_bytes_avoid_prefix_range() {
        // 0xF1..=0xF3 are repeat prefixes in the bytecode stream.
        for op in Opcode::ALL {
            assert!((*op as u8) < 0xF0, "{op:?} collides with prefix bytes");
        }
    }

    #[test]
    fn every_mnemonic_resolves_to_itself() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(*op));
            assert_eq!(Opcode::from_code(op.code()), Some(*op));
        }
    }
}
