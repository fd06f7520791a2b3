//! GraphML writer.
//!
//! Emits one `<graph edgedefault="directed">` conforming to the GraphML
//! 1.1 schema. Node attributes: `user_id`, `username`, `message_1` …
//! `message_N` (omitted where a user has fewer). Edge attributes:
//! `edge_type` (the network name) and `weight` (int). Node ids equal user
//! ids.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use lockstep_core::network::{Edge, NetworkKind};
use lockstep_core::store::UserSnapshot;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::{ExportOptions, Result, retained};

const NS_GRAPHML: &str = "http://graphml.graphdrawing.org/xmlns";

pub fn write_graphml<W: Write>(
  out: W,
  network: NetworkKind,
  edges: &[Edge],
  snapshots: &HashMap<String, UserSnapshot>,
  options: &ExportOptions,
) -> Result<()> {
  let mut writer = Writer::new(out);
  let w = &mut writer;

  write_event(w, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

  let mut root = BytesStart::new("graphml");
  root.push_attribute(("xmlns", NS_GRAPHML));
  write_event(w, Event::Start(root))?;

  // Attribute declarations.
  write_key(w, "user_id", "node", "string")?;
  write_key(w, "username", "node", "string")?;
  for i in 1..=options.n_messages {
    write_key(w, &format!("message_{i}"), "node", "string")?;
  }
  write_key(w, "edge_type", "edge", "string")?;
  write_key(w, "weight", "edge", "int")?;

  let mut graph = BytesStart::new("graph");
  graph.push_attribute(("id", network.name()));
  graph.push_attribute(("edgedefault", "directed"));
  write_event(w, Event::Start(graph))?;

  // Nodes first: the distinct users touched by any retained edge, so the
  // writer's memory stays bounded by users, not edges.
  let users: BTreeSet<&str> = retained(edges, options)
    .flat_map(|e| [e.user_a.as_str(), e.user_b.as_str()])
    .collect();

  for user in &users {
    let mut node = BytesStart::new("node");
    node.push_attribute(("id", *user));
    write_event(w, Event::Start(node))?;
    write_data(w, "user_id", user)?;

    if let Some(snapshot) = snapshots.get(*user) {
      write_data(w, "username", &snapshot.username)?;
      for (i, message) in
        snapshot.messages.iter().take(options.n_messages).enumerate()
      {
        write_data(w, &format!("message_{}", i + 1), message)?;
      }
    }

    write_event(w, Event::End(BytesEnd::new("node")))?;
  }

  for edge in retained(edges, options) {
    let mut el = BytesStart::new("edge");
    el.push_attribute(("source", edge.user_a.as_str()));
    el.push_attribute(("target", edge.user_b.as_str()));
    write_event(w, Event::Start(el))?;
    write_data(w, "edge_type", network.name())?;
    write_data(w, "weight", &edge.weight.to_string())?;
    write_event(w, Event::End(BytesEnd::new("edge")))?;
  }

  write_event(w, Event::End(BytesEnd::new("graph")))?;
  write_event(w, Event::End(BytesEnd::new("graphml")))?;
  Ok(())
}

// ─── Writer helpers ──────────────────────────────────────────────────────────

fn write_event<W: Write>(w: &mut Writer<W>, event: Event<'_>) -> Result<()> {
  w.write_event(event)?;
  Ok(())
}

fn write_key<W: Write>(
  w: &mut Writer<W>,
  id: &str,
  target: &str,
  attr_type: &str,
) -> Result<()> {
  let mut key = BytesStart::new("key");
  key.push_attribute(("id", id));
  key.push_attribute(("for", target));
  key.push_attribute(("attr.name", id));
  key.push_attribute(("attr.type", attr_type));
  write_event(w, Event::Empty(key))
}

fn write_data<W: Write>(
  w: &mut Writer<W>,
  key: &str,
  text: &str,
) -> Result<()> {
  let mut data = BytesStart::new("data");
  data.push_attribute(("key", key));
  write_event(w, Event::Start(data))?;
  write_event(w, Event::Text(BytesText::new(text)))?;
  write_event(w, Event::End(BytesEnd::new("data")))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
