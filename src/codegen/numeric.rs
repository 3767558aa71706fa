//! Numeric, bitvector, and collection lowering policies
//!
//! These policies are shared by every backend; backends contribute only the
//! target spelling of each primitive. Integer division and modulus follow
//! the source language's Euclidean definition regardless of the target's
//! native truncation. Bitvector arithmetic is masked to `2^W - 1` whenever
//! the value width is narrower than its native backing, and rotation is
//! expanded into shifts with a mask after each one.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, Zero};

use super::backend::{Backend, Capabilities, CollOp};
use super::LowerError;
use crate::rir::{BinOp, Tok, Type};

/// `2^width - 1`.
pub fn pow2_mask(width: u32) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

/// The mask as lowercase hex, without any target prefix.
pub fn mask_hex(width: u32) -> String {
    format!("{:x}", pow2_mask(width))
}

/// Smallest native width the target offers that holds `width` bits, if any.
pub fn native_width_for(width: u32, caps: &Capabilities) -> Option<u32> {
    caps.native_int_widths
        .iter()
        .copied()
        .filter(|&k| k >= width)
        .min()
}

/// Whether masking is required: a bitvector narrower than its backing is
/// masked after every arithmetic operation; a width equal to its backing
/// emits no mask.
pub fn needs_mask(width: u32, native: Option<u32>) -> bool {
    match native {
        Some(k) => width < k,
        // Big-integer backed bitvectors are unbounded and always masked.
        None => true,
    }
}

/// The backing a bitvector actually gets on this target: the declared
/// native width when the target offers it, big-integer otherwise.
pub fn effective_backing(width: u32, native: Option<u32>, caps: &Capabilities) -> Option<u32> {
    native
        .filter(|k| caps.native_int_widths.contains(k))
        .or_else(|| native_width_for(width, caps))
}

fn masked(backend: &dyn Backend, expr: String, ty: &Type) -> String {
    if let Type::Bitvector { width, native } = ty {
        let backing = effective_backing(*width, *native, &backend.caps());
        if needs_mask(*width, backing) {
            return backend.mask(&expr, &mask_hex(*width), ty);
        }
    }
    expr
}

/// Rotation expanded to `(x << k) | (x >> (W - k))`, masking after each
/// shift.
pub fn lower_rotate(
    backend: &dyn Backend,
    left: bool,
    ty: &Type,
    a: &str,
    k: &str,
    tok: Tok,
) -> Result<String, LowerError> {
    let width = match ty {
        Type::Bitvector { width, .. } => *width,
        _ => {
            return Err(LowerError::internal(
                "rotation lowering",
                format!("rotation on non-bitvector type {} at {}", ty, tok),
            ));
        }
    };
    let complement = format!("({} - {})", width, k);
    let (fwd_amt, back_amt) = if left {
        (k.to_string(), complement)
    } else {
        (complement, k.to_string())
    };
    let fwd = masked(backend, backend.arith_raw(BinOp::Shl, a, &fwd_amt, ty), ty);
    let back = masked(backend, backend.arith_raw(BinOp::Shr, a, &back_amt, ty), ty);
    Ok(backend.arith_raw(BinOp::BitOr, &fwd, &back, ty))
}

/// Exact decimal rendering of `mantissa * 10^exponent`, e.g. `(1234, -2)`
/// becomes `12.34`. Backends hand this string to their runtime's exact-real
/// parser.
pub fn real_decimal_string(mantissa: &BigInt, exponent: i32) -> String {
    if mantissa.is_zero() {
        return "0.0".to_string();
    }
    let sign = if mantissa.is_negative() { "-" } else { "" };
    let digits = mantissa.abs().to_string();
    if exponent >= 0 {
        return format!("{}{}{}.0", sign, digits, "0".repeat(exponent as usize));
    }
    let frac_len = (-exponent) as usize;
    if digits.len() > frac_len {
        let (int_part, frac_part) = digits.split_at(digits.len() - frac_len);
        format!("{}{}.{}", sign, int_part, frac_part)
    } else {
        format!("{}0.{}{}", sign, "0".repeat(frac_len - digits.len()), digits)
    }
}

/// The collection operation corresponding to a binary operator on a
/// collection-typed operand, if there is one.
pub fn collection_op_for(op: BinOp, operand_ty: &Type) -> Option<CollOp> {
    match (op, operand_ty) {
        (BinOp::Concat, Type::Seq(_)) => Some(CollOp::Concat),
        (BinOp::Union, _) => Some(CollOp::Union),
        (BinOp::Intersection, _) => Some(CollOp::Intersection),
        (BinOp::Difference, _) => Some(CollOp::Difference),
        (BinOp::In, _) | (BinOp::NotIn, _) => Some(CollOp::Contains),
        _ => None,
    }
}

fn is_comparison(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
    )
}

/// Lower one binary operation, applying the numeric and collection policies
/// on top of the backend's raw spellings. `operand_ty` is the resolved type
/// of the left operand; `result_ty` of the whole expression.
pub fn lower_binop(
    backend: &dyn Backend,
    op: BinOp,
    operand_ty: &Type,
    result_ty: &Type,
    a: &str,
    b: &str,
    tok: Tok,
) -> Result<String, LowerError> {
    if is_comparison(op) {
        return Ok(backend.compare(op, a, b, operand_ty));
    }

    if let Some(coll_op) = collection_op_for(op, operand_ty) {
        let call = backend.collection_call(coll_op, &[a, b]);
        return Ok(match op {
            BinOp::NotIn => format!("(!{})", call),
            _ => call,
        });
    }

    match op {
        BinOp::And | BinOp::Or => Ok(backend.arith_raw(op, a, b, operand_ty)),

        BinOp::Div => match result_ty {
            // Euclidean policy, never the target's truncated division.
            Type::Int => Ok(backend.euclid_div(a, b, result_ty)),
            Type::Real => Ok(backend.arith_raw(op, a, b, result_ty)),
            Type::Bitvector { .. } => {
                Ok(masked(backend, backend.arith_raw(op, a, b, result_ty), result_ty))
            }
            other => Err(LowerError::internal(
                "binary op lowering",
                format!("division on {} at {}", other, tok),
            )),
        },
        BinOp::Mod => match result_ty {
            Type::Int => Ok(backend.euclid_mod(a, b, result_ty)),
            Type::Bitvector { .. } => {
                Ok(masked(backend, backend.arith_raw(op, a, b, result_ty), result_ty))
            }
            other => Err(LowerError::internal(
                "binary op lowering",
                format!("modulus on {} at {}", other, tok),
            )),
        },

        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            Ok(masked(backend, backend.arith_raw(op, a, b, result_ty), result_ty))
        }

        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
            // Operands are already in range; no mask needed.
            Ok(backend.arith_raw(op, a, b, result_ty))
        }

        BinOp::Shl | BinOp::Shr => {
            Ok(masked(backend, backend.arith_raw(op, a, b, result_ty), result_ty))
        }

        BinOp::RotateLeft => lower_rotate(backend, true, result_ty, a, b, tok),
        BinOp::RotateRight => lower_rotate(backend, false, result_ty, a, b, tok),

        BinOp::Concat | BinOp::Union | BinOp::Intersection | BinOp::Difference | BinOp::In
        | BinOp::NotIn => Err(LowerError::internal(
            "binary op lowering",
            format!("collection operator {:?} on {} at {}", op, operand_ty, tok),
        )),

        BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            unreachable!("comparisons handled above")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow2_mask() {
        assert_eq!(pow2_mask(1), BigUint::from(1u32));
        assert_eq!(pow2_mask(8), BigUint::from(255u32));
        assert_eq!(mask_hex(8), "ff");
        assert_eq!(mask_hex(13), "1fff");
        assert_eq!(mask_hex(64), "ffffffffffffffff");
    }

    #[test]
    fn test_native_width_fitting() {
        let caps = Capabilities {
            erased_generics: true,
            native_int_widths: &[8, 16, 32, 64],
            trait_collection_elements: true,
            native_codata: false,
            labeled_loops: true,
            max_tuple_arity: None,
            strings_are_code_units: true,
        };
        assert_eq!(native_width_for(1, &caps), Some(8));
        assert_eq!(native_width_for(8, &caps), Some(8));
        assert_eq!(native_width_for(9, &caps), Some(16));
        assert_eq!(native_width_for(33, &caps), Some(64));
        assert_eq!(native_width_for(65, &caps), None);
    }

    #[test]
    fn test_exact_width_needs_no_mask() {
        assert!(!needs_mask(8, Some(8)));
        assert!(needs_mask(7, Some(8)));
        assert!(needs_mask(90, None));
    }

    #[test]
    fn test_real_decimal_rendering() {
        assert_eq!(real_decimal_string(&BigInt::from(0), 0), "0.0");
        assert_eq!(real_decimal_string(&BigInt::from(1234), -2), "12.34");
        assert_eq!(real_decimal_string(&BigInt::from(5), -3), "0.005");
        assert_eq!(real_decimal_string(&BigInt::from(-7), -1), "-0.7");
        assert_eq!(real_decimal_string(&BigInt::from(42), 2), "4200.0");
    }

    #[test]
    fn test_collection_op_classification() {
        assert_eq!(
            collection_op_for(BinOp::Concat, &Type::seq(Type::Int)),
            Some(CollOp::Concat)
        );
        assert_eq!(
            collection_op_for(BinOp::Union, &Type::set(Type::Int)),
            Some(CollOp::Union)
        );
        assert_eq!(collection_op_for(BinOp::Add, &Type::Int), None);
    }
}
