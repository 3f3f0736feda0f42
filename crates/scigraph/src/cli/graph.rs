use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;

use scigraph_core::artifacts::read_graph;
use scigraph_core::{GraphNode, KnowledgeGraph};

fn load(path: &Path) -> Result<KnowledgeGraph> {
    read_graph(path).with_context(|| format!("failed to read graph {}", path.display()))
}

/// Looks a node up by id, falling back to a case-insensitive match on its text.
fn find_node<'g>(graph: &'g KnowledgeGraph, key: &str) -> Option<&'g GraphNode> {
    graph.node(key).or_else(|| {
        graph
            .nodes()
            .iter()
            .find(|node| node.text.eq_ignore_ascii_case(key))
    })
}

fn label(graph: &KnowledgeGraph, id: &str) -> String {
    graph
        .node(id)
        .map_or_else(|| id.to_string(), |node| format!("{} ({})", node.text, node.entity_type))
}

pub fn run_path(path: &Path, from: &str, to: &str) -> Result<()> {
    let graph = load(path)?;
    let Some(start) = find_node(&graph, from) else {
        bail!("no node matches '{from}'");
    };
    let Some(end) = find_node(&graph, to) else {
        bail!("no node matches '{to}'");
    };

    let hops = graph.find_path(&start.id, &end.id);
    if hops.is_empty() {
        bail!("no path from '{from}' to '{to}'");
    }

    let rendered: Vec<String> = hops.iter().map(|id| label(&graph, id)).collect();
    println!("{}", rendered.join(" -> "));
    eprintln!("{} {} hop(s)", style("●").green(), hops.len() - 1);
    Ok(())
}

pub fn run_cycles(path: &Path) -> Result<()> {
    let graph = load(path)?;
    let cycles = graph.find_cycles();

    if cycles.is_empty() {
        eprintln!("{} No cycles", style("○").dim());
        return Ok(());
    }

    for cycle in &cycles {
        let rendered: Vec<String> = cycle.iter().map(|id| label(&graph, id)).collect();
        println!("{}", rendered.join(", "));
    }
    eprintln!("{} {} cycle(s)", style("●").yellow(), cycles.len());
    Ok(())
}

pub fn run_stats(path: &Path) -> Result<()> {
    let graph = load(path)?;
    println!("{}", serde_json::to_string_pretty(&graph.statistics())?);
    Ok(())
}
