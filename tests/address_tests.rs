//! Properties of A1 addressing and formula offsetting

use proptest::prelude::*;
use royalbit_stencil::core::address::{
    column_index, column_letter, offset_formula, parse_reference, to_reference, MAX_COL,
};

proptest! {
    #[test]
    fn column_letters_round_trip(col in 0u16..=MAX_COL) {
        prop_assert_eq!(column_index(&column_letter(col)), Some(col));
    }

    #[test]
    fn references_round_trip(row in 0u32..1_000_000, col in 0u16..=MAX_COL) {
        prop_assert_eq!(parse_reference(&to_reference(row, col)), Some((row, col)));
    }

    /// Shifting by (dr, dc) and back restores the formula while every
    /// reference stays on the grid.
    #[test]
    fn offset_is_invertible(
        r1 in 10u32..5_000, c1 in 10u16..600,
        r2 in 10u32..5_000, c2 in 10u16..600,
        dr in -10i64..=10, dc in -10i64..=10,
    ) {
        let formula = format!(
            "=SUM({}:{})*{}+ROUND({}, 2)",
            to_reference(r1, c1),
            to_reference(r2, c2),
            to_reference(r2, c1),
            to_reference(r1, c2),
        );
        let shifted = offset_formula(&formula, dr, dc);
        prop_assert_eq!(offset_formula(&shifted, -dr, -dc), formula);
    }

    #[test]
    fn offset_moves_single_reference(row in 0u32..10_000, col in 0u16..700, dr in 0i64..50, dc in 0i64..50) {
        let formula = format!("={}*2", to_reference(row, col));
        let expected = format!("={}*2", to_reference(row + dr as u32, col + dc as u16));
        prop_assert_eq!(offset_formula(&formula, dr, dc), expected);
    }
}

#[test]
fn test_offset_leaves_strings_of_function_names() {
    assert_eq!(offset_formula("=IF(A1>0,\"ok\",\"no\")", 1, 0), "=IF(A2>0,\"ok\",\"no\")");
    assert_eq!(offset_formula("=AVERAGE(B2:B9)", 0, 2), "=AVERAGE(D2:D9)");
}
