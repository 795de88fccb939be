//! # ipatch demo
//!
//! A standalone CLI that walks through the reconciliation protocol between one
//! master and a handful of slaves. Every patch travels as encoded JSON text,
//! exactly as it would over a real transport; pass `--wire` to print it.
//!
//! ## Exchange
//!
//! ```text
//! slave ──Update(baseVersion, diff)──▶ master
//!       ◀── (accepted) | Forward | Full | Retry
//! ```

use std::collections::BTreeMap;
use std::io::{self, Write};

use clap::{Parser, Subcommand};
use colored::*;
use ipatch_core::JsonModel;
use ipatch_sync::{
    FileConfig, FileConfigBuilder, JsonMasterFile, JsonSlaveFile, ModelOutgoing, ModelPatch,
    PatchKind, Result,
};
use serde_json::{json, Value};

type Outgoing = ModelOutgoing<JsonModel>;
type JsonPatch = ModelPatch<JsonModel>;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ipatch-demo")]
#[command(about = "Master/slave document reconciliation walkthrough")]
#[command(version)]
struct Cli {
    /// Print every encoded patch as it crosses the wire
    #[arg(long, global = true)]
    wire: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic demo: two slaves edit, reconcile with the master and converge
    Demo,
    /// Stale catch-up: a lagging slave is brought forward with a Forward patch
    Stale {
        /// Edits the other slave makes while this one is away
        #[arg(short, long, default_value_t = 5)]
        edits: usize,
    },
    /// Full resync: a slave falls out of the master's history window
    Resync {
        /// History capacity for master and slaves
        #[arg(short, long, default_value_t = 8)]
        capacity: usize,
        /// Edits the other slave makes while this one is away
        #[arg(short, long, default_value_t = 12)]
        edits: usize,
    },
    /// Version race: a lagging standby master answers Retry
    Race,
    /// Undo and redo on a slave, replicated to the master
    Undo,
    /// Interactive REPL for manual experimentation
    Interactive,
}

// ─── Hub: the master behind an encoded-text transport ─────────────────────

struct Hub {
    name: String,
    master: JsonMasterFile,
    show_wire: bool,
}

impl Hub {
    fn new(name: &str, config: FileConfig, show_wire: bool) -> Self {
        Self {
            name: name.to_string(),
            master: JsonMasterFile::with_config(config, &mut ipatch_core::UlidSource),
            show_wire,
        }
    }

    fn deliver(&mut self, from: &str, patch: &JsonPatch) -> Result<Option<JsonPatch>> {
        let request = patch.encode()?;
        if self.show_wire {
            println!("    {} {}", format!("{} ──▶", from).bright_magenta(), request.dimmed());
        }

        let response = self.master.apply_encoded(&request)?;
        if self.show_wire {
            let arrow = format!("◀── {}", self.name);
            match &response {
                Some(wire) => println!("    {} {}", arrow.bright_cyan(), wire.dimmed()),
                None => println!("    {} {}", arrow.bright_cyan(), "(accepted)".bright_green()),
            }
        }
        response.as_deref().map(JsonPatch::decode).transpose()
    }
}

// ─── Node: a named slave that can go offline ──────────────────────────────

struct Node {
    name: String,
    slave: JsonSlaveFile,
    online: bool,
}

impl Node {
    fn new(name: &str, config: FileConfig) -> Self {
        Self {
            name: name.to_string(),
            slave: JsonSlaveFile::with_config(config, &mut ipatch_core::UlidSource),
            online: true,
        }
    }

    fn sync(&mut self, hub: &mut Hub) -> Result<()> {
        let outgoing = self.slave.sync();
        self.exchange(hub, outgoing)
    }

    /// Set `key` to `value`, optimistically, then reconcile if online.
    fn set(&mut self, hub: &mut Hub, key: &str, value: Value) -> Result<()> {
        let field = key.to_string();
        let outgoing = self.slave.update(move |state: &Value| {
            let mut next = state.clone();
            next[field.as_str()] = value.clone();
            next
        });
        self.exchange(hub, outgoing)
    }

    fn undo(&mut self, hub: &mut Hub, n: usize) -> Result<()> {
        let outgoing = self.slave.undo(n);
        self.exchange(hub, outgoing)
    }

    fn redo(&mut self, hub: &mut Hub, n: usize) -> Result<()> {
        let outgoing = self.slave.redo(n);
        self.exchange(hub, outgoing)
    }

    fn go_offline(&mut self) {
        self.online = false;
    }

    /// Reconnect and send whatever was edited while away.
    fn go_online(&mut self, hub: &mut Hub) -> Result<()> {
        self.online = true;
        let outgoing = self.slave.flush();
        self.exchange(hub, outgoing)
    }

    fn exchange(&mut self, hub: &mut Hub, mut next: Option<Outgoing>) -> Result<()> {
        while let Some(outgoing) = next {
            if !self.online {
                self.slave.abandon(&outgoing);
                step(&format!(
                    "{} is offline, {} edit(s) held locally",
                    self.name,
                    self.slave.pending_edits()
                ));
                return Ok(());
            }

            let response = hub.deliver(&self.name, outgoing.patch())?;
            describe(&self.name, outgoing.patch().kind(), response.as_ref().map(|p| p.kind()));
            next = self
                .slave
                .accept(outgoing, response.as_ref())?
                .into_outgoing();
        }
        Ok(())
    }
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn describe(name: &str, sent: PatchKind, response: Option<PatchKind>) {
    let outcome = match response {
        None => "accepted".bright_green().to_string(),
        Some(PatchKind::Forward) => "forward: replayed master diffs, rebased local edits".bright_yellow().to_string(),
        Some(PatchKind::Full) => "full: rebuilt from master window".bright_yellow().to_string(),
        Some(PatchKind::Retry) => "retry: master is behind, resending".bright_red().to_string(),
        Some(other) => other.to_string(),
    };
    println!(
        "  {} {} {} {}",
        name.bright_magenta(),
        format!("──{}──▶", sent).bright_cyan(),
        "master".bright_magenta(),
        outcome
    );
}

fn show_node(node: &Node) {
    let border = "─".repeat(56);
    println!("  ┌{}┐", border);
    let status = if node.online { "online".green() } else { "offline".red() };
    println!("  │ {:<54} │", format!("Slave: {} ({})", node.name, status));
    println!("  ├{}┤", border);
    let base = node
        .slave
        .base_version()
        .map_or("unsynced".to_string(), |v| v.to_string());
    println!(
        "  │ {:<54} │",
        format!(
            "confirmed: {}  local: {}  pending: {}",
            base,
            node.slave.current_version(),
            node.slave.pending_edits()
        )
    );
    println!("  │ {:<54} │", compact(node.slave.get()));
    println!("  └{}┘", border);
}

fn show_master(hub: &Hub) {
    let border = "─".repeat(56);
    println!("  ┌{}┐", border);
    println!("  │ {:<54} │", format!("Master: {}", hub.name).bright_yellow().to_string());
    println!("  ├{}┤", border);
    println!(
        "  │ {:<54} │",
        format!(
            "version: {}  window: {}..={}",
            hub.master.current_version(),
            hub.master.base_version(),
            hub.master.current_version()
        )
    );
    println!("  │ {:<54} │", compact(hub.master.get()));
    println!("  └{}┘", border);
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unprintable>".to_string())
}

fn convergence_check(hub: &Hub, nodes: &[&Node]) -> bool {
    nodes.iter().all(|node| {
        node.slave.get() == hub.master.get()
            && node.slave.base_version() == Some(hub.master.current_version())
    })
}

fn convergence_result(converged: bool) {
    if converged {
        println!(
            "\n  {} {}",
            "✓".bright_green().bold(),
            "ALL SLAVES CONVERGED: identical to the master".bright_green().bold()
        );
    } else {
        println!(
            "\n  {} {}",
            "✗".bright_red().bold(),
            "DIVERGENCE DETECTED: slaves differ from the master".bright_red().bold()
        );
    }
}

// ─── Demo ──────────────────────────────────────────────────────────────────

fn run_demo(wire: bool) -> Result<()> {
    header("DEMO: Optimistic Edits & Reconciliation");

    let mut hub = Hub::new("master", FileConfig::default(), wire);
    let mut alice = Node::new("alice", FileConfig::default());
    let mut bob = Node::new("bob", FileConfig::default());

    section("Phase 1: First edit from a never-synced slave");
    alice.set(&mut hub, "lol", json!("woot"))?;
    step(&format!("master is now at version {}", hub.master.current_version()));
    show_master(&hub);

    section("Phase 2: Bob syncs, both edit against the same version");
    bob.sync(&mut hub)?;
    bob.go_offline();
    bob.set(&mut hub, "tags", json!(["draft"]))?;
    alice.set(&mut hub, "title", json!("Meeting notes"))?;
    show_node(&alice);
    show_node(&bob);

    section("Phase 3: Bob reconnects behind the master");
    bob.go_online(&mut hub)?;
    alice.sync(&mut hub)?;

    section("Phase 4: Post-sync state");
    show_master(&hub);
    show_node(&alice);
    show_node(&bob);
    convergence_result(convergence_check(&hub, &[&alice, &bob]));
    Ok(())
}

// ─── Stale ─────────────────────────────────────────────────────────────────

fn run_stale(edits: usize, wire: bool) -> Result<()> {
    header("STALE: Catch-up Within the History Window");

    let mut hub = Hub::new("master", FileConfig::default(), wire);
    let mut writer = Node::new("writer", FileConfig::default());
    let mut reader = Node::new("reader", FileConfig::default());
    writer.sync(&mut hub)?;
    reader.sync(&mut hub)?;

    section(&format!("Phase 1: reader goes away, writer makes {} edits", edits));
    reader.go_offline();
    for i in 0..edits {
        writer.set(&mut hub, "counter", json!(i))?;
    }
    reader.set(&mut hub, "note", json!("written offline"))?;
    show_master(&hub);
    show_node(&reader);

    section("Phase 2: reader reconnects");
    reader.go_online(&mut hub)?;
    writer.sync(&mut hub)?;
    show_node(&reader);
    convergence_result(convergence_check(&hub, &[&writer, &reader]));
    Ok(())
}

// ─── Resync ────────────────────────────────────────────────────────────────

fn run_resync(capacity: usize, edits: usize, wire: bool) -> Result<()> {
    header("RESYNC: Falling Out of the History Window");

    let config = FileConfigBuilder::new().history_capacity(capacity).build();
    let mut hub = Hub::new("master", config.clone(), wire);
    let mut writer = Node::new("writer", config.clone());
    let mut laggard = Node::new("laggard", config);
    writer.sync(&mut hub)?;
    laggard.sync(&mut hub)?;

    section(&format!(
        "Phase 1: writer makes {} edits, master keeps {} states",
        edits, capacity
    ));
    laggard.go_offline();
    laggard.set(&mut hub, "note", json!("written offline"))?;
    for i in 0..edits {
        writer.set(&mut hub, "counter", json!(i))?;
    }
    show_master(&hub);
    step(&format!(
        "laggard confirmed version {:?} is {} the master window",
        laggard.slave.base_version(),
        if laggard.slave.base_version() < Some(hub.master.base_version()) {
            "outside"
        } else {
            "inside"
        }
    ));

    section("Phase 2: laggard reconnects");
    laggard.go_online(&mut hub)?;
    writer.sync(&mut hub)?;
    show_node(&laggard);
    convergence_result(convergence_check(&hub, &[&writer, &laggard]));
    Ok(())
}

// ─── Race ──────────────────────────────────────────────────────────────────

fn run_race(wire: bool) -> Result<()> {
    header("RACE: A Slave Ahead of a Standby Master");

    let mut primary = Hub::new("primary", FileConfig::default(), wire);
    let mut node = Node::new("alice", FileConfig::default());
    node.sync(&mut primary)?;
    let handoff = primary.master.snapshot();

    section("Phase 1: alice edits against the primary");
    for i in 0..3 {
        node.set(&mut primary, "n", json!(i))?;
    }
    show_master(&primary);

    section("Phase 2: a standby restored from an old snapshot takes over");
    let mut standby = Hub {
        name: "standby".to_string(),
        master: JsonMasterFile::from_snapshot(
            handoff,
            FileConfig::default(),
            &mut ipatch_core::UlidSource,
        ),
        show_wire: wire,
    };
    show_master(&standby);

    let Some(outgoing) = node.slave.update(|state: &Value| {
        let mut next = state.clone();
        next["n"] = json!("after failover");
        next
    }) else {
        return Ok(());
    };
    let response = standby.deliver(&node.name, outgoing.patch())?;
    describe(&node.name, outgoing.patch().kind(), response.as_ref().map(|p| p.kind()));
    let resend = node
        .slave
        .accept(outgoing, response.as_ref())?
        .into_outgoing();
    step("alice keeps the patch unchanged until a caught-up master answers");

    section("Phase 3: the primary comes back");
    node.exchange(&mut primary, resend)?;
    show_master(&primary);
    convergence_result(convergence_check(&primary, &[&node]));
    Ok(())
}

// ─── Undo ──────────────────────────────────────────────────────────────────

fn run_undo(wire: bool) -> Result<()> {
    header("UNDO: Linear Undo/Redo Through the Sync Pipeline");

    let mut hub = Hub::new("master", FileConfig::default(), wire);
    let mut node = Node::new("alice", FileConfig::default());
    node.sync(&mut hub)?;

    section("Phase 1: three edits");
    for word in ["one", "two", "three"] {
        node.set(&mut hub, "word", json!(word))?;
    }
    show_master(&hub);

    section("Phase 2: undo twice");
    node.undo(&mut hub, 2)?;
    show_master(&hub);

    section("Phase 3: redo once");
    node.redo(&mut hub, 1)?;
    show_master(&hub);
    step(&format!(
        "can undo: {}  can redo: {}",
        node.slave.can_undo(),
        node.slave.can_redo()
    ));
    convergence_result(convergence_check(&hub, &[&node]));
    Ok(())
}

// ─── Interactive REPL ──────────────────────────────────────────────────────

fn run_interactive(wire: bool) -> Result<()> {
    header("INTERACTIVE REPL: ipatch master/slave");

    let mut hub = Hub::new("master", FileConfig::default(), wire);
    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();

    println!();
    println!("  {}", "Commands:".bold().underline());
    println!("    {} <name>                 Create a slave", "slave".bright_cyan());
    println!("    {} <slave> <key> <json>     Set a key (value parsed as JSON)", "set".bright_cyan());
    println!("    {} <slave> [n]             Undo n steps (default 1)", "undo".bright_cyan());
    println!("    {} <slave> [n]             Redo n steps (default 1)", "redo".bright_cyan());
    println!("    {} <slave>                 Request the master's state", "sync".bright_cyan());
    println!("    {} <slave>              Stop delivering patches", "offline".bright_cyan());
    println!("    {} <slave>               Reconnect and send held edits", "online".bright_cyan());
    println!("    {} [slave]                 Show a slave, or the master", "show".bright_cyan());
    println!("    {}                         Show everything", "list".bright_cyan());
    println!("    {}                         Exit", "quit".bright_cyan());
    println!();

    loop {
        print!("{}", "ipatch> ".bright_cyan().bold());
        io::stdout().flush().ok();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() || input.is_empty() {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let count = |idx: usize| -> usize { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(1) };
        let outcome = match parts[0] {
            "slave" | "s" => {
                match parts.get(1) {
                    Some(name) if !nodes.contains_key(*name) => {
                        nodes.insert(name.to_string(), Node::new(name, FileConfig::default()));
                        step(&format!("Created slave '{}'", name));
                    }
                    Some(name) => println!("  {} Slave '{}' already exists", "!".bright_yellow(), name),
                    None => println!("  {} Usage: slave <name>", "!".bright_red()),
                }
                Ok(())
            }

            "set" => match (parts.get(1).and_then(|n| nodes.get_mut(*n)), parts.get(2)) {
                (Some(node), Some(key)) if parts.len() > 3 => {
                    let raw = parts[3..].join(" ");
                    let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                    node.set(&mut hub, key, value)
                }
                _ => {
                    println!("  {} Usage: set <slave> <key> <json>", "!".bright_red());
                    Ok(())
                }
            },

            "undo" | "redo" | "sync" | "offline" | "online" => {
                match parts.get(1).and_then(|n| nodes.get_mut(*n)) {
                    Some(node) => match parts[0] {
                        "undo" => node.undo(&mut hub, count(2)),
                        "redo" => node.redo(&mut hub, count(2)),
                        "sync" => node.sync(&mut hub),
                        "offline" => {
                            node.go_offline();
                            Ok(())
                        }
                        _ => node.go_online(&mut hub),
                    },
                    None => {
                        println!("  {} Usage: {} <slave>", "!".bright_red(), parts[0]);
                        Ok(())
                    }
                }
            }

            "show" => {
                match parts.get(1).and_then(|n| nodes.get(*n)) {
                    Some(node) => show_node(node),
                    None => show_master(&hub),
                }
                Ok(())
            }

            "list" | "ls" => {
                show_master(&hub);
                for node in nodes.values() {
                    show_node(node);
                }
                let all: Vec<&Node> = nodes.values().collect();
                convergence_result(convergence_check(&hub, &all));
                Ok(())
            }

            "quit" | "exit" | "q" => break,

            other => {
                println!("  {} Unknown command '{}'", "?".bright_yellow(), other);
                Ok(())
            }
        };

        if let Err(err) = outcome {
            println!("  {} {}", "✗".bright_red(), err);
        }
    }
    Ok(())
}

// ─── Entry point ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Demo => run_demo(cli.wire),
        Commands::Stale { edits } => run_stale(edits, cli.wire),
        Commands::Resync { capacity, edits } => run_resync(capacity, edits, cli.wire),
        Commands::Race => run_race(cli.wire),
        Commands::Undo => run_undo(cli.wire),
        Commands::Interactive => run_interactive(cli.wire),
    };

    if let Err(err) = outcome {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
        std::process::exit(1);
    }
}
