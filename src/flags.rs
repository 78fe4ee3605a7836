use bitflags::bitflags;

use crate::structs::Condition;

bitflags! {
    /// The EFLAGS bits this machine defines, at their architectural positions.
    #[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
    pub struct Flags: u32 {
        // unsigned overflow, or a borrow out of the top bit on subtraction
        const Carry = 1 << 0;
        const Zero = 1 << 6;
        // most significant bit of the result
        const Sign = 1 << 7;
        // signed overflow
        const Overflow = 1 << 11;
    }
}

/// Subtracts `right` from `left` and returns the wrapped result with the flags it defines.
/// Byte operands are zero-extended by the caller, so flags are always taken at 32 bits.
pub fn execute_sub(left: u32, right: u32) -> (u32, Flags) {
    // computed wide so the borrow shows up in bit 32
    let result = u64::from(left).wrapping_sub(u64::from(right));
    let truncated = result as u32;

    let sign_of = |value: u32| value >> 31;
    let left_sign = sign_of(left);
    let right_sign = sign_of(right);
    let result_sign = sign_of(truncated);

    let mut flags = Flags::empty();
    flags.set(Flags::Carry, (result >> 32) & 0b1 != 0);
    flags.set(Flags::Zero, truncated == 0);
    flags.set(Flags::Sign, result_sign != 0);
    flags.set(
        Flags::Overflow,
        left_sign != right_sign && left_sign != result_sign,
    );

    (truncated, flags)
}

impl Condition {
    pub fn holds(self, flags: Flags) -> bool {
        let sign_ne_overflow = flags.contains(Flags::Sign) != flags.contains(Flags::Overflow);

        match self {
            Condition::Overflow => flags.contains(Flags::Overflow),
            Condition::NotOverflow => !flags.contains(Flags::Overflow),
            Condition::Carry => flags.contains(Flags::Carry),
            Condition::NotCarry => !flags.contains(Flags::Carry),
            Condition::Zero => flags.contains(Flags::Zero),
            Condition::NotZero => !flags.contains(Flags::Zero),
            Condition::Sign => flags.contains(Flags::Sign),
            Condition::NotSign => !flags.contains(Flags::Sign),
            Condition::Less => sign_ne_overflow,
            Condition::LessOrEqual => flags.contains(Flags::Zero) || sign_ne_overflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOUNDARIES: [u32; 5] = [0, 1, 0x7fff_ffff, 0x8000_0000, 0xffff_ffff];

    fn check_sub_laws(v1: u32, v2: u32) {
        let (result, flags) = execute_sub(v1, v2);

        assert_eq!(result, v1.wrapping_sub(v2));
        assert_eq!(flags.contains(Flags::Carry), v1 < v2, "carry {v1:#x} - {v2:#x}");
        assert_eq!(flags.contains(Flags::Zero), v1 == v2, "zero {v1:#x} - {v2:#x}");
        assert_eq!(
            flags.contains(Flags::Sign),
            v1.wrapping_sub(v2) >> 31 == 1,
            "sign {v1:#x} - {v2:#x}"
        );
        assert_eq!(
            flags.contains(Flags::Overflow),
            (v1 as i32).checked_sub(v2 as i32).is_none(),
            "overflow {v1:#x} - {v2:#x}"
        );
    }

    #[test]
    fn sub_flags_on_boundaries() {
        for v1 in BOUNDARIES {
            for v2 in BOUNDARIES {
                check_sub_laws(v1, v2);
            }
        }
    }

    #[test]
    fn sub_flags_known_values() {
        assert_eq!(execute_sub(5, 5), (0, Flags::Zero));
        assert_eq!(execute_sub(1, 2), (0xffff_ffff, Flags::Carry | Flags::Sign));
        assert_eq!(
            execute_sub(0x8000_0000, 1),
            (0x7fff_ffff, Flags::Overflow)
        );
        assert_eq!(
            execute_sub(0x7fff_ffff, 0xffff_ffff),
            (0x8000_0000, Flags::Carry | Flags::Sign | Flags::Overflow)
        );
    }

    #[test]
    fn zero_extended_bytes_use_bit_thirty_one() {
        // 0x41 - 0xf0 borrows, and the borrow reaches the sign bit
        assert_eq!(execute_sub(0x41, 0xf0), (0xffff_ff51, Flags::Carry | Flags::Sign));
        // bit 7 of a byte operand is not a sign bit
        assert_eq!(execute_sub(0x80, 0x00), (0x80, Flags::empty()));
        assert_eq!(execute_sub(0x80, 0x01), (0x7f, Flags::empty()));
        assert_eq!(execute_sub(0xcd, 0xcd), (0, Flags::Zero));
    }

    #[test]
    fn conditions() {
        let none = Flags::empty();
        assert!(Condition::NotZero.holds(none));
        assert!(!Condition::Zero.holds(none));
        assert!(!Condition::Less.holds(none));
        assert!(!Condition::LessOrEqual.holds(none));

        assert!(Condition::LessOrEqual.holds(Flags::Zero));
        assert!(Condition::Less.holds(Flags::Sign));
        assert!(Condition::Less.holds(Flags::Overflow));
        assert!(!Condition::Less.holds(Flags::Sign | Flags::Overflow));
        assert!(Condition::Carry.holds(Flags::Carry));
        assert!(Condition::NotSign.holds(Flags::Carry));
        assert!(Condition::NotOverflow.holds(Flags::Zero | Flags::Sign));
    }

    #[test]
    fn conditions_match_signed_and_unsigned_comparisons() {
        for v1 in BOUNDARIES {
            for v2 in BOUNDARIES {
                let (_, flags) = execute_sub(v1, v2);
                assert_eq!(Condition::Carry.holds(flags), v1 < v2);
                assert_eq!(Condition::Less.holds(flags), (v1 as i32) < (v2 as i32));
                assert_eq!(
                    Condition::LessOrEqual.holds(flags),
                    (v1 as i32) <= (v2 as i32)
                );
            }
        }
    }

    proptest! {
        #[test]
        fn sub_flags_match_reference(v1 in any::<u32>(), v2 in any::<u32>()) {
            check_sub_laws(v1, v2);
        }
    }
}
