use crate::ir::Graph;
use crate::layout::LayoutKind;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serialisable snapshot of a finished layout: node boxes and edge polylines.
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub strategy: String,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    pub points: Vec<[f32; 2]>,
}

impl LayoutDump {
    pub fn from_graph(graph: &Graph, kind: LayoutKind) -> Self {
        let nodes = graph
            .nodes()
            .iter()
            .map(|node| NodeDump {
                name: node.name.clone(),
                x: node.x,
                y: node.y,
                width: node.half_width * 2.0,
                height: node.half_height * 2.0,
            })
            .collect();

        let edges = graph
            .edges()
            .iter()
            .map(|edge| EdgeDump {
                from: graph.node(edge.from).name.clone(),
                to: graph.node(edge.to).name.clone(),
                points: edge.points.iter().map(|p| [p.x, p.y]).collect(),
            })
            .collect();

        LayoutDump {
            strategy: kind.as_str().to_string(),
            nodes,
            edges,
        }
    }

    pub fn write_to(&self, writer: impl Write) -> anyhow::Result<()> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

pub fn write_layout_dump(path: &Path, graph: &Graph, kind: LayoutKind) -> anyhow::Result<()> {
    let file = File::create(path)?;
    LayoutDump::from_graph(graph, kind).write_to(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Point;

    #[test]
    fn dump_uses_names_and_full_sizes() {
        let mut graph = Graph::new();
        let a = graph.add_node("a", 30.0, 10.0);
        let b = graph.add_node("b", 20.0, 5.0);
        graph.add_edge(a, b).unwrap();
        graph.set_position(b, 0.0, 100.0);
        graph.edge_mut(crate::ir::EdgeId(0)).points =
            vec![Point::new(0.0, 10.0), Point::new(0.0, 95.0)];

        let dump = LayoutDump::from_graph(&graph, LayoutKind::Flow);
        assert_eq!(dump.strategy, "flow");
        assert_eq!(dump.nodes[0].width, 60.0);
        assert_eq!(dump.nodes[1].height, 10.0);
        assert_eq!(dump.nodes[1].y, 100.0);
        assert_eq!(dump.edges[0].from, "a");
        assert_eq!(dump.edges[0].to, "b");
        assert_eq!(dump.edges[0].points, vec![[0.0, 10.0], [0.0, 95.0]]);
    }

    #[test]
    fn dump_is_pretty_json() {
        let mut graph = Graph::new();
        graph.add_node("solo", 5.0, 5.0);
        let mut out = Vec::new();
        LayoutDump::from_graph(&graph, LayoutKind::Smart)
            .write_to(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["strategy"], "smart");
        assert_eq!(value["nodes"][0]["name"], "solo");
        assert!(value["edges"].as_array().unwrap().is_empty());
        assert!(text.ends_with("}\n"));
    }
}
