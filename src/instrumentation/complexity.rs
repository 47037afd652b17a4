//! Query complexity scoring.
//!
//! A cheap structural estimate of how expensive a call's arguments are.
//! Recognised argument keys: `where`, `include`, `select`, `order` /
//! `order_by`, `take` / `limit`.

use serde_json::Value;

pub const MIN_COMPLEXITY: u32 = 1;
pub const MAX_COMPLEXITY: u32 = 100;

/// Requested limits above this add to the score.
const LARGE_LIMIT: u64 = 100;

/// Score the arguments of an entity operation, clamped to `[1, 100]`.
///
/// - base 1
/// - +1 per top-level filter predicate, +1 more for each predicate that is
///   itself a map
/// - +2 per relation include (+2 flat when the include is not enumerable)
/// - +1 per selected field
/// - +1 for an ordering clause
/// - +2 for a requested limit above 100
pub fn complexity_score(args: &Value) -> u32 {
    let Some(args) = args.as_object() else {
        return MIN_COMPLEXITY;
    };

    let mut score: u64 = u64::from(MIN_COMPLEXITY);

    if let Some(filter) = args.get("where") {
        score += filter_score(filter);
    }

    if let Some(include) = args.get("include") {
        score += match include {
            Value::Object(map) => 2 * map.len() as u64,
            Value::Array(items) => 2 * items.len() as u64,
            Value::Null => 0,
            _ => 2,
        };
    }

    if let Some(select) = args.get("select") {
        score += match select {
            Value::Object(map) => map.len() as u64,
            Value::Array(items) => items.len() as u64,
            _ => 0,
        };
    }

    if args.get("order").or_else(|| args.get("order_by")).is_some_and(|v| !v.is_null()) {
        score += 1;
    }

    let limit = args
        .get("take")
        .or_else(|| args.get("limit"))
        .and_then(requested_limit);
    if limit.is_some_and(|n| n > LARGE_LIMIT) {
        score += 2;
    }

    score.clamp(u64::from(MIN_COMPLEXITY), u64::from(MAX_COMPLEXITY)) as u32
}

fn filter_score(filter: &Value) -> u64 {
    match filter {
        Value::Object(predicates) => predicates
            .values()
            .map(|predicate| if predicate.is_object() { 2 } else { 1 })
            .sum(),
        Value::Array(predicates) => predicates.iter().map(filter_score).sum(),
        _ => 0,
    }
}

/// `take` may be negative to page backwards; magnitude is what matters.
fn requested_limit(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_i64().map(i64::unsigned_abs))
}
