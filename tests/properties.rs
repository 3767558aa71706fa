//! Property-based tests for the shared lowering policies
//!
//! These verify the numeric and emission laws the backends rely on:
//! - masking really is arithmetic modulo 2^W
//! - the rotation expansion agrees with true rotation
//! - sequence slicing laws hold for the operations the runtimes implement
//! - reserved-word sanitization never produces another reserved word
//! - the emission substrate renders deterministically

use num_bigint::BigUint;
use num_traits::Zero;
use proptest::prelude::*;

use slate::codegen::backend::Backend;
use slate::codegen::backends::backend_for;
use slate::codegen::numeric::{mask_hex, native_width_for, needs_mask, pow2_mask};
use slate::codegen::writer::{BraceStyle, Emitter};
use slate::TargetTag;

// ============================================================================
// Bitvector arithmetic
// ============================================================================

proptest! {
    #[test]
    fn prop_mask_is_mod_pow2(width in 1u32..=24, a in 0u64..=1 << 24, b in 0u64..=1 << 24) {
        let mask = pow2_mask(width);
        let a = BigUint::from(a) & &mask;
        let b = BigUint::from(b) & &mask;
        let masked = (&a + &b) & &mask;
        let modular = (&a + &b) % (pow2_mask(width) + BigUint::from(1u32));
        prop_assert_eq!(masked, modular);
    }

    #[test]
    fn prop_mask_hex_parses_back(width in 1u32..=128) {
        let parsed = BigUint::parse_bytes(mask_hex(width).as_bytes(), 16).unwrap();
        prop_assert_eq!(parsed, pow2_mask(width));
    }

    #[test]
    fn prop_rotation_expansion_is_rotation(width in 2u32..=16, value in 0u64..=1 << 16, k in 1u32..=15) {
        prop_assume!(k < width);
        let mask = pow2_mask(width);
        let v = BigUint::from(value) & &mask;
        // The emitted form: mask(v << k) | mask(v >> (W - k)).
        let expanded = ((&v << k) & &mask) | ((&v >> (width - k)) & &mask);
        // True rotation by repeated single-bit rotate.
        let mut rotated = v.clone();
        for _ in 0..k {
            let high = (&rotated >> (width - 1)) & BigUint::from(1u32);
            rotated = ((&rotated << 1u32) & &mask) | high;
        }
        prop_assert_eq!(expanded, rotated);
    }

    #[test]
    fn prop_native_width_fits(width in 1u32..=80) {
        for tag in TargetTag::ALL {
            let backend = backend_for(tag);
            let caps = backend.caps();
            if let Some(k) = native_width_for(width, &caps) {
                prop_assert!(k >= width);
                prop_assert!(caps.native_int_widths.contains(&k));
                // Smallest fitting width wins.
                for &smaller in caps.native_int_widths {
                    if smaller >= width {
                        prop_assert!(k <= smaller);
                    }
                }
            } else {
                for &w in caps.native_int_widths {
                    prop_assert!(w < width);
                }
            }
        }
    }

    #[test]
    fn prop_exact_backing_needs_no_mask(width in 1u32..=64) {
        prop_assert!(!needs_mask(width, Some(width)));
        prop_assert!(needs_mask(width, Some(width + 1)));
        prop_assert!(needs_mask(width, None));
    }
}

// ============================================================================
// Sequence slicing laws (mirrors the runtime contract)
// ============================================================================

fn subsequence(s: &[i64], lo: usize, hi: usize) -> Vec<i64> {
    s[lo..hi].to_vec()
}

proptest! {
    #[test]
    fn prop_subsequence_length_and_agreement(
        s in prop::collection::vec(any::<i64>(), 0..32),
        lo_frac in 0.0f64..=1.0,
        hi_frac in 0.0f64..=1.0,
    ) {
        let lo = ((lo_frac * s.len() as f64) as usize).min(s.len());
        let hi = (lo + ((hi_frac * (s.len() - lo) as f64) as usize)).min(s.len());
        let sub = subsequence(&s, lo, hi);
        prop_assert_eq!(sub.len(), hi - lo);
        for (i, x) in sub.iter().enumerate() {
            prop_assert_eq!(*x, s[lo + i]);
        }
    }

    #[test]
    fn prop_take_drop_partition(s in prop::collection::vec(any::<i64>(), 0..32), n_frac in 0.0f64..=1.0) {
        let n = ((n_frac * s.len() as f64) as usize).min(s.len());
        let take = subsequence(&s, 0, n);
        let drop = subsequence(&s, n, s.len());
        let mut rejoined = take;
        rejoined.extend(drop);
        prop_assert_eq!(rejoined, s);
    }
}

// ============================================================================
// Reserved words and escaping
// ============================================================================

#[test]
fn test_sanitize_never_yields_a_reserved_word() {
    for tag in TargetTag::ALL {
        let backend = backend_for(tag);
        for word in backend.reserved_words() {
            let sanitized = backend.sanitize(word);
            assert_ne!(&sanitized, word, "{}: {} unchanged", tag, word);
            assert!(
                !backend.is_reserved(&sanitized),
                "{}: {} still reserved",
                tag,
                sanitized
            );
        }
    }
}

proptest! {
    #[test]
    fn prop_string_quote_is_delimited_and_escaped(s in "[ -~\n\t]{0,40}") {
        for tag in TargetTag::ALL {
            let backend = backend_for(tag);
            let quoted = backend.string_quote(&s);
            prop_assert!(quoted.starts_with('"'));
            prop_assert!(quoted.ends_with('"'));
            // No raw newlines survive; interior quotes are escaped.
            prop_assert!(!quoted.contains('\n'));
            let interior = &quoted[1..quoted.len() - 1];
            let mut chars = interior.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    chars.next();
                } else {
                    prop_assert!(c != '"');
                }
            }
        }
    }
}

// ============================================================================
// Emission substrate determinism
// ============================================================================

proptest! {
    #[test]
    fn prop_writer_renders_deterministically(ops in prop::collection::vec(0u8..4, 1..40)) {
        let render = |ops: &[u8]| {
            let mut em = Emitter::new();
            let file = em.new_file("out.txt");
            let mut stack = vec![file];
            for (i, op) in ops.iter().enumerate() {
                let top = *stack.last().unwrap();
                match op {
                    0 => em.writeln(top, &format!("line {}", i)),
                    1 => {
                        let fork = em.fork(top);
                        em.writeln(fork, &format!("fork {}", i));
                    }
                    2 => {
                        let block = em.new_block(
                            top,
                            &format!("block {}", i),
                            "{",
                            "}",
                            BraceStyle::SameLine,
                        );
                        stack.push(block);
                    }
                    _ => {
                        if stack.len() > 1 {
                            let done = stack.pop().unwrap();
                            em.seal(done);
                        }
                    }
                }
            }
            em.flush().unwrap()
        };
        prop_assert_eq!(render(&ops), render(&ops));
    }
}

#[test]
fn test_zero_mask_is_zero() {
    // Guards the mask table against an off-by-one at width 1.
    assert_eq!(pow2_mask(1), BigUint::from(1u32));
    assert!(!pow2_mask(64).is_zero());
    assert_eq!(mask_hex(1), "1");
}
