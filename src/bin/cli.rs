//! curio CLI - command-line interface for the progress sync engine
//!
//! Usage: curio-cli [OPTIONS] <COMMAND>
//!
//! Talks to the same server endpoints as the app views. Supports JSON output
//! for scripting.

use clap::{Parser, Subcommand};
use curio_lib::{
    filter, graph, layout, settings, AdjustOutcome, Freshness, MutationPhase, ProgressState,
    Session, SyncError,
};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "curio-cli")]
#[command(version, about = "Concept graph progress CLI", long_about = None)]
struct Cli {
    /// Server URL (default: from settings)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a credential token (and verify it against the server)
    Login {
        /// Bearer token issued by the auth flow
        #[arg(long)]
        token: String,
    },
    /// Discard the stored credential
    Logout,
    /// Ensure per-user progress rows exist for every concept
    Init,
    /// Show progress for every concept
    Status,
    /// Show one concept in detail
    Show { node: String },
    /// Poll the server and print progress changes as they happen
    Watch {
        /// Poll interval in seconds
        #[arg(long, default_value_t = 3)]
        interval: u64,
    },
    /// Adjust a concept's curiosity score by ±1
    Adjust {
        node: String,
        /// +1 or -1
        #[arg(allow_hyphen_values = true)]
        delta: i32,
    },
    /// Mark a concept completed
    Complete { node: String },
    /// Clear all progress for the user
    Reset {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Mark every concept completed
    CompleteAll,
    /// List unit tags and their concept counts
    Units,
    /// Print the memoized node layout
    Layout,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    settings::init(settings::default_config_dir());
    if let Some(server) = &cli.server {
        settings::update(|s| s.server_url = server.clone());
    }

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(SyncError::Unauthorized) => {
            // The stored credential is dead; drop it from the settings file
            // so the next invocation does not re-send it.
            settings::clear_access_token();
            eprintln!("Credential rejected (401). Run `curio-cli login --token ...` again.");
            2
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), SyncError> {
    match cli.command {
        Commands::Login { token } => {
            settings::set_access_token(&token);
            let session = Session::from_settings();
            let profile = session.me().await?;
            println!("Signed in as {} <{}>", profile.name, profile.email);
            Ok(())
        }
        Commands::Logout => {
            let session = Session::from_settings();
            session.logout();
            settings::clear_access_token();
            println!("Signed out.");
            Ok(())
        }
        Commands::Init => {
            let session = Session::from_settings();
            let count = session.initialize().await?;
            println!("Graph initialized ({} nodes)", count);
            Ok(())
        }
        Commands::Status => {
            let session = Session::from_settings();
            let snapshot = session.refresh(false).await?;
            print_status(&snapshot.nodes, snapshot.freshness, cli.json);
            Ok(())
        }
        Commands::Show { node } => {
            let session = Session::from_settings();
            let doc = graph::load()?;
            let Some(concept) = doc.node(&node) else {
                eprintln!("No concept '{}' in the graph document.", node);
                return Ok(());
            };
            println!("{} ({})", concept.label, concept.id);
            if let Some(unit) = &concept.unit {
                println!("unit: {}", unit);
            }
            println!("{}", concept.description);
            match session.refresh_node(&node).await? {
                Some(state) => println!(
                    "score {}/5, unlocked={}, completed={}",
                    state.curiosity_score, state.is_unlocked, state.is_completed
                ),
                None => println!("(no progress row yet — run `curio-cli init`)"),
            }
            let neighbors = doc.neighbors(&node);
            if !neighbors.is_empty() {
                println!("related: {}", neighbors.join(", "));
            }
            Ok(())
        }
        Commands::Watch { interval } => watch(interval).await,
        Commands::Adjust { node, delta } => adjust(&node, delta).await,
        Commands::Complete { node } => {
            let session = Session::from_settings();
            let unlocked = session.complete_node(&node).await?;
            session.refresh(true).await?;
            println!("'{}' completed ({} neighbor(s) considered)", node, unlocked.len());
            Ok(())
        }
        Commands::Reset { yes } => {
            if !yes {
                eprintln!("This clears ALL progress. Re-run with --yes to confirm.");
                return Ok(());
            }
            let session = Session::from_settings();
            session.reset().await?;
            println!("Progress reset.");
            Ok(())
        }
        Commands::CompleteAll => {
            let session = Session::from_settings();
            let snapshot = session.complete_all().await?;
            let done = snapshot.nodes.values().filter(|s| s.is_completed).count();
            println!("All nodes completed ({}/{})", done, snapshot.nodes.len());
            Ok(())
        }
        Commands::Units => {
            let doc = graph::load()?;
            for unit in doc.units() {
                let count = doc
                    .nodes()
                    .iter()
                    .filter(|n| n.unit.as_deref() == Some(unit))
                    .count();
                println!("{:<12} {} concept(s)", unit, count);
            }
            let untagged = doc.nodes().iter().filter(|n| n.unit.is_none()).count();
            if untagged > 0 {
                println!("{:<12} {} concept(s)", "(untagged)", untagged);
            }
            Ok(())
        }
        Commands::Layout => {
            let doc = graph::load()?;
            let positions = layout::memoized(doc);
            let state = filter::FilterState::all_enabled(doc);
            for id in filter::visible_nodes(doc, &state) {
                if let Some(p) = positions.get(&id) {
                    println!("{:<24} {:8.1} {:8.1}", id, p.x, p.y);
                }
            }
            Ok(())
        }
    }
}

fn print_status(
    nodes: &std::collections::HashMap<String, ProgressState>,
    freshness: Freshness,
    json: bool,
) {
    if json {
        println!("{}", serde_json::to_string_pretty(nodes).unwrap_or_default());
        return;
    }
    let doc = graph::load().ok();
    let mut ids: Vec<_> = nodes.keys().collect();
    ids.sort();
    println!("{:<24} {:>5} {:>9} {:>10}", "concept", "score", "unlocked", "completed");
    for id in ids {
        let state = &nodes[id];
        let label = doc
            .and_then(|d| d.node(id))
            .map(|n| n.label.as_str())
            .unwrap_or(id.as_str());
        println!(
            "{:<24} {:>3}/5 {:>9} {:>10}",
            label,
            state.curiosity_score,
            if state.is_unlocked { "yes" } else { "no" },
            if state.is_completed { "yes" } else { "no" },
        );
    }
    if freshness == Freshness::Stale {
        println!("(may be out of date: serving last-known data)");
    }
}

async fn watch(interval: u64) -> Result<(), SyncError> {
    let session = Session::from_settings();
    session.mount();
    let mut last = session.refresh(true).await?.nodes;
    println!("Watching {} concepts (every {}s, Ctrl+C to stop)", last.len(), interval);

    let _scheduler = session.start_polling(Duration::from_secs(interval));
    loop {
        tokio::time::sleep(Duration::from_secs(interval)).await;
        let current = session.store().peek().nodes;
        for (id, state) in &current {
            match last.get(id) {
                Some(prior) if prior == state => {}
                _ => println!(
                    "{}: score {} unlocked={} completed={}",
                    id, state.curiosity_score, state.is_unlocked, state.is_completed
                ),
            }
        }
        for notice in session.active_notifications() {
            println!("🎉 '{}' completed at {}", notice.node_id, notice.raised_at.format("%H:%M:%S"));
        }
        last = current;
    }
}

async fn adjust(node: &str, delta: i32) -> Result<(), SyncError> {
    let session = Session::from_settings();
    // Seed the cache so the optimistic math starts from server truth.
    session.refresh(true).await?;

    match session.adjust_curiosity(node, delta) {
        AdjustOutcome::Rejected => {
            println!("No change (score is at a bound or the concept is completed).");
            return Ok(());
        }
        AdjustOutcome::Applied { new_score, completed } => {
            println!("'{}' → {}/5{}", node, new_score, if completed { " — completed!" } else { "" });
        }
    }

    // The mutation is fire-and-forget for views; the CLI waits so the user
    // sees a rollback instead of silently losing the click.
    for _ in 0..100 {
        match session.coordinator().phase(node) {
            MutationPhase::Committed => return Ok(()),
            MutationPhase::RolledBack => {
                println!("Server rejected the change; score rolled back.");
                return Ok(());
            }
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    println!("No server acknowledgment yet; the next poll will reconcile.");
    Ok(())
}
