//! CSV writers: the network edge list and the standalone user-node
//! annotation file.

use std::io::Write;

use lockstep_core::network::{Edge, NetworkKind};
use lockstep_core::store::UserSnapshot;

use crate::{ExportOptions, Result, retained};

/// Write the edge list: `user_a,user_b,edge_type,weight`, one row per
/// retained edge, standard quoting.
pub fn write_edge_csv<W: Write>(
  out: W,
  network: NetworkKind,
  edges: &[Edge],
  options: &ExportOptions,
) -> Result<()> {
  let mut writer = csv::Writer::from_writer(out);
  writer.write_record(["user_a", "user_b", "edge_type", "weight"])?;

  for edge in retained(edges, options) {
    writer.write_record([
      edge.user_a.as_str(),
      edge.user_b.as_str(),
      network.name(),
      &edge.weight.to_string(),
    ])?;
  }

  writer.flush()?;
  Ok(())
}

/// Write the user-node annotation file: `Id,username,message_1…message_N`,
/// one row per user, fully quoted for Gephi-style imports.
pub fn write_user_nodes_csv<W: Write>(
  out: W,
  snapshots: &[UserSnapshot],
  n_messages: usize,
) -> Result<()> {
  let mut writer = csv::WriterBuilder::new()
    .quote_style(csv::QuoteStyle::Always)
    .from_writer(out);

  let mut header = vec!["Id".to_owned(), "username".to_owned()];
  for i in 1..=n_messages {
    header.push(format!("message_{i}"));
  }
  writer.write_record(&header)?;

  for snapshot in snapshots {
    let mut row = vec![snapshot.user_id.clone(), snapshot.username.clone()];
    for i in 0..n_messages {
      row.push(snapshot.messages.get(i).cloned().unwrap_or_default());
    }
    writer.write_record(&row)?;
  }

  writer.flush()?;
  Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn edge(a: &str, b: &str, weight: u64) -> Edge {
    Edge { user_a: a.into(), user_b: b.into(), weight }
  }

  fn render_edges(edges: &[Edge], options: &ExportOptions) -> String {
    let mut out = Vec::new();
    write_edge_csv(&mut out, NetworkKind::CoLink, edges, options).unwrap();
    String::from_utf8(out).unwrap()
  }

  #[test]
  fn edge_rows_carry_the_network_name() {
    let csv =
      render_edges(&[edge("u", "v", 3)], &ExportOptions::default());
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("user_a,user_b,edge_type,weight"));
    assert_eq!(lines.next(), Some("u,v,co_link,3"));
    assert_eq!(lines.next(), None);
  }

  #[test]
  fn values_with_commas_are_quoted() {
    let csv =
      render_edges(&[edge("u,1", "v", 1)], &ExportOptions::default());
    assert!(csv.contains("\"u,1\",v,co_link,1"));
  }

  #[test]
  fn self_loops_and_light_edges_are_filtered() {
    let edges =
      [edge("u", "u", 9), edge("u", "v", 1), edge("v", "w", 2)];
    let options =
      ExportOptions { min_weight: 2, ..ExportOptions::default() };
    let csv = render_edges(&edges, &options);
    assert_eq!(csv.lines().count(), 2); // header + v,w
    assert!(csv.contains("v,w,co_link,2"));
  }

  #[test]
  fn user_nodes_pad_missing_messages() {
    let snapshots = vec![UserSnapshot {
      user_id:  "u".into(),
      username: "@u".into(),
      messages: vec!["only".into()],
    }];
    let mut out = Vec::new();
    write_user_nodes_csv(&mut out, &snapshots, 3).unwrap();
    let csv = String::from_utf8(out).unwrap();

    let mut lines = csv.lines();
    assert_eq!(
      lines.next(),
      Some("\"Id\",\"username\",\"message_1\",\"message_2\",\"message_3\"")
    );
    assert_eq!(lines.next(), Some("\"u\",\"@u\",\"only\",\"\",\"\""));
  }
}
