//! Backend-neutral text matching.
//!
//! Both storage backends build their text predicates from the needles
//! produced here, so a query matches the same memories whether it is
//! executed as bind-parameter SQL or as generated Cypher. The SQL backend
//! wraps each needle as an escaped `LIKE '%…%'` pattern; the Cypher backend
//! renders a lowercased `CONTAINS` comparison.

mod patterns;
mod stem;

pub use patterns::{WeightedNeedle, expand_query, expand_word};
pub use stem::simple_stem;
