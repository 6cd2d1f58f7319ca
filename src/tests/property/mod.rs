//! Property-based tests
//!
//! Property tests verify invariants that should hold for all inputs, rather
//! than testing specific cases.
//!
//! ## Running Property Tests
//!
//! ```sh
//! cargo test property --release
//! ```
//!
//! ## Test Modules
//!
//! - `query_escaper_props`: Tests for the query builder and escaper
//!   - Escaped text cannot close the MATCH literal
//!   - No control characters reach the engine
//!   - Filter values are allow-listed or rejected
//!
//! - `graph_bounds_props`: Tests for network traversal
//!   - Depth, edge and frontier caps always hold
//!   - Edges only reference returned nodes

mod graph_bounds_props;
mod query_escaper_props;
