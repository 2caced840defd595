//! Deterministic cache keys for page results.
//!
//! A [`Fingerprint`] is the BLAKE3 digest of the `MessagePack` encoding of
//! everything that can change which rows a page contains: the full
//! interaction state, the model, the planned eager-load set, and the visible
//! searchable columns. Any mutation of the state therefore changes the key,
//! and equal inputs always hash equally.

use std::collections::BTreeSet;
use std::fmt;

use gridfetch_core::InteractionState;
use serde::Serialize;

/// Fingerprint of a query-affecting state, used as the result-cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

#[derive(Serialize)]
struct FingerprintInput<'a> {
    model: &'a str,
    state: &'a InteractionState,
    eager_loads: &'a BTreeSet<String>,
    searchable: &'a BTreeSet<String>,
}

impl Fingerprint {
    /// Computes the fingerprint of one page request.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be encoded as `MessagePack`.
    pub fn compute(
        model: &str,
        state: &InteractionState,
        eager_loads: &BTreeSet<String>,
        searchable: &BTreeSet<String>,
    ) -> Result<Self, rmp_serde::encode::Error> {
        let input = FingerprintInput {
            model,
            state,
            eager_loads,
            searchable,
        };
        let bytes = rmp_serde::to_vec_named(&input)?;
        Ok(Self(*blake3::hash(&bytes).as_bytes()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

#[cfg(test)]
mod tests {
    use gridfetch_core::{FilterOperator, FilterValue, SortDirection};
    use proptest::prelude::*;

    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn fp(state: &InteractionState) -> Fingerprint {
        Fingerprint::compute("Order", state, &set(&["customer"]), &set(&["name"])).unwrap()
    }

    #[test]
    fn hex_is_64_chars() {
        let hex = fp(&InteractionState::new()).to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn model_and_plan_are_part_of_the_key() {
        let state = InteractionState::new();
        let base = fp(&state);
        let other_model =
            Fingerprint::compute("Invoice", &state, &set(&["customer"]), &set(&["name"])).unwrap();
        let other_plan = Fingerprint::compute("Order", &state, &set(&[]), &set(&["name"])).unwrap();
        let other_search =
            Fingerprint::compute("Order", &state, &set(&["customer"]), &set(&[])).unwrap();

        assert_ne!(base, other_model);
        assert_ne!(base, other_plan);
        assert_ne!(base, other_search);
    }

    /// One mutation per query-affecting field.
    fn mutate(state: &mut InteractionState, field: u8, text: &str, n: u32) {
        match field {
            0 => {
                state.set_search_term(format!("s{text}"));
            }
            1 => {
                state.set_filter_column(Some(format!("c{text}")));
            }
            2 => {
                state.set_filter_operator(Some(FilterOperator::Gte));
            }
            3 => {
                state.set_filter_value(Some(FilterValue::Single(format!("v{text}"))));
            }
            4 => {
                state.set_date_range(Some(format!("2024-01-{:02}", n % 28 + 1)), None);
            }
            5 => {
                state.set_date_range(None, Some(format!("2024-02-{:02}", n % 28 + 1)));
            }
            6 => {
                state.set_sort(Some(format!("k{text}")), SortDirection::Asc);
            }
            7 => {
                state.set_sort(None, SortDirection::Desc);
            }
            8 => {
                state.set_page(n % 50 + 2);
            }
            _ => {
                state.set_page_size(n % 50 + 11, 100);
            }
        }
    }

    proptest! {
        #[test]
        fn equal_states_have_equal_fingerprints(field in 0u8..10, text in "[a-z]{0,8}", n in 0u32..1000) {
            let mut a = InteractionState::new();
            let mut b = InteractionState::new();
            mutate(&mut a, field, &text, n);
            mutate(&mut b, field, &text, n);
            prop_assert_eq!(fp(&a), fp(&b));
        }

        #[test]
        fn any_single_field_change_changes_the_fingerprint(field in 0u8..10, text in "[a-z]{0,8}", n in 0u32..1000) {
            let base = InteractionState::new();
            let mut changed = base.clone();
            mutate(&mut changed, field, &text, n);
            prop_assert_ne!(&base, &changed);
            prop_assert_ne!(fp(&base), fp(&changed));
        }
    }
}
