use crate::schema::ScalarKind;
use crate::value::Scalar;
use proptest::prelude::*;
use std::collections::BTreeMap;

pub fn arb_scalar_kind() -> impl Strategy<Value = ScalarKind> {
    prop_oneof![
        Just(ScalarKind::Bool),
        Just(ScalarKind::U8),
        Just(ScalarKind::U16),
        Just(ScalarKind::U32),
        Just(ScalarKind::U64),
        Just(ScalarKind::I64),
        Just(ScalarKind::Str),
    ]
}

pub fn arb_scalar_for_kind(kind: ScalarKind) -> BoxedStrategy<Scalar> {
    match kind {
        ScalarKind::Bool => any::<bool>().prop_map(Scalar::Bool).boxed(),
        ScalarKind::U8 => any::<u8>().prop_map(Scalar::U8).boxed(),
        ScalarKind::U16 => any::<u16>().prop_map(Scalar::U16).boxed(),
        ScalarKind::U32 => any::<u32>().prop_map(Scalar::U32).boxed(),
        ScalarKind::U64 => any::<u64>().prop_map(Scalar::U64).boxed(),
        ScalarKind::I64 => any::<i64>().prop_map(Scalar::I64).boxed(),
        ScalarKind::Str => "[a-z]{1,8}".prop_map(Scalar::Str).boxed(),
    }
}

/// Route tables keyed by `(dst, len)` with a `next_hop` value; the
/// workhorse fixture for mutator properties.
pub fn arb_routes() -> impl Strategy<Value = BTreeMap<(u32, u8), u32>> {
    prop::collection::btree_map((any::<u32>(), any::<u8>()), any::<u32>(), 0..8)
}

/// Renders routes as the JSON entry list `add`/`set` payloads use.
pub fn routes_payload(routes: &BTreeMap<(u32, u8), u32>) -> String {
    let entries: Vec<String> = routes
        .iter()
        .map(|((dst, len), next_hop)| {
            format!("{{\"dst\":{dst},\"len\":{len},\"next_hop\":{next_hop}}}")
        })
        .collect();
    format!("[{}]", entries.join(","))
}

pub fn arb_weights() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(any::<u32>(), 0..16)
}
