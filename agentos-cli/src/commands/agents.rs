//! `agentos agents` — inspect agent/skill/tool registries and match tasks.

use agentos_core::graph::GraphStore;
use agentos_core::registry::{AgentMatcher, AgentRegistry, SkillRegistry, ToolRegistry};
use agentos_types::AgentOsError;
use clap::{Args, Subcommand};
use serde_json::json;

use crate::commands::CmdResult;
use crate::data_dir::DataDir;
use crate::loader::{YamlAgentLoader, YamlSkillLoader, YamlToolLoader};
use crate::output::print_json;

#[derive(Debug, Subcommand)]
pub enum AgentsCommand {
    /// Agent registry operations.
    Agent(EntityArgs),
    /// Skill registry operations.
    Skill(EntityArgs),
    /// Tool registry operations.
    Tool(EntityArgs),
    /// Upsert agent/skill/tool nodes and their edges into the knowledge graph.
    SyncGraph,
    /// Score agents against a task description.
    Match(MatchArgs),
}

#[derive(Debug, Args)]
pub struct EntityArgs {
    #[command(subcommand)]
    action: EntityAction,
}

#[derive(Debug, Subcommand)]
pub enum EntityAction {
    List,
    Show { id: String },
    Search { query: String, #[arg(long)] category: Option<String>, #[arg(long)] enabled_only: bool },
    Enable { id: String },
    Disable { id: String },
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    task: String,
    #[arg(long)]
    skill: Vec<String>,
    #[arg(long)]
    tag: Vec<String>,
}

fn load_agents(dir: &DataDir) -> CmdResult<AgentRegistry> {
    let registry = AgentRegistry::new();
    registry.load_from(&YamlAgentLoader { dir: dir.agents_dir() })?;
    Ok(registry)
}

fn load_skills(dir: &DataDir) -> CmdResult<SkillRegistry> {
    let registry = SkillRegistry::new();
    registry.load_from(&YamlSkillLoader { dir: dir.skills_dir() })?;
    Ok(registry)
}

fn load_tools(dir: &DataDir) -> CmdResult<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry.load_from(&YamlToolLoader { dir: dir.tools_dir() })?;
    Ok(registry)
}

pub fn run(dir: &DataDir, json_out: bool, cmd: AgentsCommand) -> CmdResult<()> {
    match cmd {
        AgentsCommand::Agent(args) => agent_action(dir, json_out, args.action),
        AgentsCommand::Skill(args) => skill_action(dir, json_out, args.action),
        AgentsCommand::Tool(args) => tool_action(dir, json_out, args.action),
        AgentsCommand::SyncGraph => sync_graph(dir, json_out),
        AgentsCommand::Match(args) => match_task(dir, json_out, args),
    }
}

fn agent_action(dir: &DataDir, json_out: bool, action: EntityAction) -> CmdResult<()> {
    let registry = load_agents(dir)?;
    match action {
        EntityAction::List => print_json_or_lines(json_out, registry.list_all(), |a| format!("{} [{}]", a.id, a.name)),
        EntityAction::Show { id } => {
            let item = registry.find_by_id(&id).ok_or_else(|| AgentOsError::not_found("agent", &id))?;
            print_one(json_out, &item, |a| format!("{} [{}]\n{}", a.id, a.name, a.description));
            Ok(())
        }
        EntityAction::Search { query, category, enabled_only } => {
            let hits = registry.search(&query, enabled_only, category.as_deref());
            if json_out {
                print_json(&json!(hits.iter().map(|h| json!({ "item": h.item, "score": h.score, "rationale": h.rationale })).collect::<Vec<_>>()));
            } else {
                for hit in &hits {
                    println!("{:.1} {} — {}", hit.score, hit.item.id, hit.rationale.join(", "));
                }
            }
            Ok(())
        }
        EntityAction::Enable { id } => {
            registry.enable(&id)?;
            ok(json_out, &id);
            Ok(())
        }
        EntityAction::Disable { id } => {
            registry.disable(&id)?;
            ok(json_out, &id);
            Ok(())
        }
    }
}

fn skill_action(dir: &DataDir, json_out: bool, action: EntityAction) -> CmdResult<()> {
    let registry = load_skills(dir)?;
    match action {
        EntityAction::List => print_json_or_lines(json_out, registry.list_all(), |s| format!("{} [{}]", s.id, s.name)),
        EntityAction::Show { id } => {
            let item = registry.find_by_id(&id).ok_or_else(|| AgentOsError::not_found("skill", &id))?;
            print_one(json_out, &item, |s| format!("{} [{}]\n{}", s.id, s.name, s.description));
            Ok(())
        }
        EntityAction::Search { query, category, enabled_only } => {
            let hits = registry.search(&query, enabled_only, category.as_deref());
            if json_out {
                print_json(&json!(hits.iter().map(|h| json!({ "item": h.item, "score": h.score, "rationale": h.rationale })).collect::<Vec<_>>()));
            } else {
                for hit in &hits {
                    println!("{:.1} {} — {}", hit.score, hit.item.id, hit.rationale.join(", "));
                }
            }
            Ok(())
        }
        EntityAction::Enable { id } => {
            registry.enable(&id)?;
            ok(json_out, &id);
            Ok(())
        }
        EntityAction::Disable { id } => {
            registry.disable(&id)?;
            ok(json_out, &id);
            Ok(())
        }
    }
}

fn tool_action(dir: &DataDir, json_out: bool, action: EntityAction) -> CmdResult<()> {
    let registry = load_tools(dir)?;
    match action {
        EntityAction::List => print_json_or_lines(json_out, registry.list_all(), |t| format!("{} [{}]", t.id, t.name)),
        EntityAction::Show { id } => {
            let item = registry.find_by_id(&id).ok_or_else(|| AgentOsError::not_found("tool", &id))?;
            print_one(json_out, &item, |t| format!("{} [{}]\n{}", t.id, t.name, t.description));
            Ok(())
        }
        EntityAction::Search { query, category, enabled_only } => {
            let hits = registry.search(&query, enabled_only, category.as_deref());
            if json_out {
                print_json(&json!(hits.iter().map(|h| json!({ "item": h.item, "score": h.score, "rationale": h.rationale })).collect::<Vec<_>>()));
            } else {
                for hit in &hits {
                    println!("{:.1} {} — {}", hit.score, hit.item.id, hit.rationale.join(", "));
                }
            }
            Ok(())
        }
        EntityAction::Enable { id } => {
            registry.enable(&id)?;
            ok(json_out, &id);
            Ok(())
        }
        EntityAction::Disable { id } => {
            registry.disable(&id)?;
            ok(json_out, &id);
            Ok(())
        }
    }
}

fn sync_graph(dir: &DataDir, json_out: bool) -> CmdResult<()> {
    let agents = load_agents(dir)?;
    let skills = load_skills(dir)?;
    let tools = load_tools(dir)?;

    dir.ensure_knowledge_graph_dir().map_err(|e| AgentOsError::Fatal(e.to_string()))?;
    let graph = GraphStore::open(dir.knowledge_graph_db())?;

    agents.sync_to_graph(&graph)?;
    skills.sync_to_graph(&graph)?;
    tools.sync_to_graph(&graph, &skills)?;

    if json_out {
        print_json(&json!({
            "agents": agents.list_all().len(),
            "skills": skills.list_all().len(),
            "tools": tools.list_all().len(),
        }));
    } else {
        println!(
            "synced {} agents, {} skills, {} tools to the graph",
            agents.list_all().len(),
            skills.list_all().len(),
            tools.list_all().len()
        );
    }
    Ok(())
}

fn match_task(dir: &DataDir, json_out: bool, args: MatchArgs) -> CmdResult<()> {
    let agents = load_agents(dir)?.list_all();
    let matches = AgentMatcher::new().match_task(&agents, &args.task, &args.skill, &args.tag);
    if json_out {
        print_json(&json!(matches
            .iter()
            .map(|m| json!({ "agent_id": m.agent.id, "score": m.score, "rationale": m.rationale }))
            .collect::<Vec<_>>()));
    } else {
        for m in &matches {
            println!("{:.2} {} — {}", m.score, m.agent.id, m.rationale.join(", "));
        }
    }
    Ok(())
}

fn print_json_or_lines<T: serde::Serialize>(json_out: bool, items: Vec<T>, line: impl Fn(&T) -> String) {
    if json_out {
        print_json(&json!(items));
    } else {
        for item in &items {
            println!("{}", line(item));
        }
    }
}

fn print_one<T: serde::Serialize>(json_out: bool, item: &T, line: impl Fn(&T) -> String) {
    if json_out {
        print_json(&serde_json::to_value(item).unwrap_or(serde_json::Value::Null));
    } else {
        println!("{}", line(item));
    }
}

fn ok(json_out: bool, id: &str) {
    if json_out {
        print_json(&json!({ "ok": true, "id": id }));
    } else {
        println!("ok: {id}");
    }
}
