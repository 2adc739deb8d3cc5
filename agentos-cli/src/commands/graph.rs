//! `agentos graph` — inspect and rebuild the knowledge graph.

use agentos_core::error::GraphError;
use agentos_core::graph::migration::GraphMigration;
use agentos_core::graph::GraphStore;
use agentos_core::memory_store::MemoryStore;
use agentos_types::AgentOsError;
use clap::{Args, Subcommand};
use serde_json::json;

use crate::commands::CmdResult;
use crate::data_dir::DataDir;
use crate::output::print_json;

#[derive(Debug, Subcommand)]
pub enum GraphCommand {
    /// Node/edge counts by kind.
    Status,
    /// Rebuild every node/edge derivable from the memory store.
    Migrate,
    /// Show a single node and its recorded properties.
    Show { id: String },
    /// Memories reachable from `id` within `--depth` hops.
    Related(RelatedArgs),
    /// Pairs of memories linked by a `CONTRADICTS` edge.
    Contradictions,
    /// Shortest path between two nodes.
    Path(PathArgs),
    /// Run a raw read query against the graph database.
    Query { sql: String },
    /// List every tag node.
    Tags,
}

#[derive(Debug, Args)]
pub struct RelatedArgs {
    id: String,
    #[arg(long, default_value_t = 2)]
    depth: u32,
    /// Comma-separated edge type labels, e.g. `RELATES_TO,HAS_TAG`.
    #[arg(long)]
    types: Option<String>,
}

#[derive(Debug, Args)]
pub struct PathArgs {
    from: String,
    to: String,
    #[arg(long, default_value_t = 6)]
    depth: u32,
}

fn open_graph(dir: &DataDir) -> CmdResult<GraphStore> {
    dir.ensure_knowledge_graph_dir().map_err(|e| AgentOsError::Fatal(e.to_string()))?;
    GraphStore::open(dir.knowledge_graph_db()).map_err(AgentOsError::from)
}

pub fn run(dir: &DataDir, json_out: bool, cmd: GraphCommand) -> CmdResult<()> {
    match cmd {
        GraphCommand::Status => status(dir, json_out),
        GraphCommand::Migrate => migrate(dir, json_out),
        GraphCommand::Show { id } => show(dir, json_out, &id),
        GraphCommand::Related(args) => related(dir, json_out, args),
        GraphCommand::Contradictions => contradictions(dir, json_out),
        GraphCommand::Path(args) => path(dir, json_out, args),
        GraphCommand::Query { sql } => query(dir, json_out, &sql),
        GraphCommand::Tags => tags(dir, json_out),
    }
}

fn status(dir: &DataDir, json_out: bool) -> CmdResult<()> {
    let graph = open_graph(dir)?;
    let stats = graph.get_stats();
    if json_out {
        print_json(&serde_json::to_value(&stats)?);
    } else {
        println!("nodes:");
        for (kind, count) in &stats.node_counts {
            println!("  {kind}: {count}");
        }
        println!("edges:");
        for (label, count) in &stats.edge_counts {
            println!("  {label}: {count}");
        }
    }
    Ok(())
}

fn migrate(dir: &DataDir, json_out: bool) -> CmdResult<()> {
    let graph = open_graph(dir)?;
    let memories = MemoryStore::open(dir.embeddings_db())?.list_all()?;
    let report = GraphMigration::run(&graph, &memories).map_err(AgentOsError::from)?;
    if json_out {
        print_json(&json!({
            "memory_nodes": report.memory_nodes,
            "tag_nodes": report.tag_nodes,
            "scope_nodes": report.scope_nodes,
            "has_tag_edges": report.has_tag_edges,
            "in_scope_edges": report.in_scope_edges,
            "supersedes_edges": report.supersedes_edges,
            "related_edges": report.related_edges,
            "tag_cooccurs_edges": report.tag_cooccurs_edges,
        }));
    } else {
        println!(
            "migrated {} memories, {} tags, {} scopes",
            report.memory_nodes, report.tag_nodes, report.scope_nodes
        );
    }
    Ok(())
}

fn show(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let graph = open_graph(dir)?;
    let node = graph.get_node(id).ok_or_else(|| AgentOsError::not_found("node", id))?;
    if json_out {
        print_json(&json!({ "id": node.id, "kind": node.kind, "properties": node.properties }));
    } else {
        println!("{} ({:?})", node.id, node.kind);
        println!("{}", node.properties);
    }
    Ok(())
}

fn related(dir: &DataDir, json_out: bool, args: RelatedArgs) -> CmdResult<()> {
    let graph = open_graph(dir)?;
    let labels: Option<Vec<&str>> = args.types.as_deref().map(|s| s.split(',').map(str::trim).collect());
    let ids = graph.get_related_memories(&args.id, args.depth, labels.as_deref());
    if json_out {
        print_json(&json!({ "related": ids }));
    } else {
        for id in &ids {
            println!("{id}");
        }
    }
    Ok(())
}

fn contradictions(dir: &DataDir, json_out: bool) -> CmdResult<()> {
    let graph = open_graph(dir)?;
    let pairs = graph.get_contradiction_pairs();
    if json_out {
        let rows: Vec<_> = pairs
            .iter()
            .map(|(lo, hi, desc)| json!({ "m1": lo, "m2": hi, "description": desc }))
            .collect();
        print_json(&json!(rows));
    } else {
        for (lo, hi, desc) in &pairs {
            println!("{lo} <-> {hi}: {desc}");
        }
    }
    Ok(())
}

fn path(dir: &DataDir, json_out: bool, args: PathArgs) -> CmdResult<()> {
    let graph = open_graph(dir)?;
    let found = graph.find_path(&args.from, &args.to, args.depth);
    if json_out {
        print_json(&json!({ "path": found }));
    } else {
        match &found {
            Some(p) => println!("{}", p.join(" -> ")),
            None => println!("no path found"),
        }
    }
    Ok(())
}

fn query(dir: &DataDir, json_out: bool, sql: &str) -> CmdResult<()> {
    let graph = open_graph(dir)?;
    let rows = graph.execute_sql(sql).map_err(|e: GraphError| AgentOsError::from(e))?;
    if json_out {
        print_json(&json!(rows));
    } else {
        for row in &rows {
            println!("{row:?}");
        }
    }
    Ok(())
}

fn tags(dir: &DataDir, json_out: bool) -> CmdResult<()> {
    let graph = open_graph(dir)?;
    let rows = graph
        .execute_sql("SELECT id FROM graph_nodes WHERE kind = 'tag' ORDER BY id")
        .map_err(AgentOsError::from)?;
    let ids: Vec<String> = rows.into_iter().filter_map(|r| r.get("id").cloned()).collect();
    if json_out {
        print_json(&json!({ "tags": ids }));
    } else {
        for id in &ids {
            println!("{id}");
        }
    }
    Ok(())
}
