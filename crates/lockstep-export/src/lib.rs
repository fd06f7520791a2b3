//! Output serializers for materialized networks: GraphML and edge-list
//! CSV, plus the standalone user-node annotation CSV.
//!
//! Both network writers stream nodes before edges, so memory is bounded by
//! distinct-users × n_messages rather than by edge count.

mod edgelist;
mod graphml;

pub mod error;

use lockstep_core::network::Edge;

pub use edgelist::{write_edge_csv, write_user_nodes_csv};
pub use error::{Error, Result};
pub use graphml::write_graphml;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Shared export knobs.
#[derive(Debug, Clone)]
pub struct ExportOptions {
  /// Drop edges below this weight (the network table may hold more than
  /// the caller wants to ship).
  pub min_weight:         u64,
  /// Latest-message annotations per node.
  pub n_messages:         usize,
  /// Self-loops are recorded in the tables but filtered here by default.
  pub include_self_loops: bool,
}

impl Default for ExportOptions {
  fn default() -> Self {
    Self {
      min_weight:         1,
      n_messages:         10,
      include_self_loops: false,
    }
  }
}

/// The edges an export retains under `options`, in table order.
pub(crate) fn retained<'a>(
  edges: &'a [Edge],
  options: &'a ExportOptions,
) -> impl Iterator<Item = &'a Edge> {
  edges.iter().filter(move |e| {
    e.weight >= options.min_weight
      && (options.include_self_loops || e.user_a != e.user_b)
  })
}
