use clap::{Parser, Subcommand};
use ft_core::geom::fmt_point;
use ft_project::{ProjectResult, apply_grid_route, build_tree, export_tree, load_network, save_network};
use ft_tree::Tree;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ft-cli")]
#[command(about = "FlowTree CLI - branching flow network layout tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a network file and the tree it describes
    Validate {
        /// Path to the network YAML or JSON file
        network_path: PathBuf,
    },
    /// List the derived sections of a network
    Sections {
        /// Path to the network YAML or JSON file
        network_path: PathBuf,
        /// Order sections by distance from the outlet
        #[arg(long)]
        sorted: bool,
    },
    /// List every cycle formed by loop connections
    Cycles {
        /// Path to the network YAML or JSON file
        network_path: PathBuf,
    },
    /// Merge straight runs of connections
    Simplify {
        /// Path to the network YAML or JSON file
        network_path: PathBuf,
        /// Only merge connections of equal diameter
        #[arg(long)]
        check_diameter: bool,
        /// Output file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rebuild connections along the file's grid route
    Route {
        /// Path to the network YAML or JSON file
        network_path: PathBuf,
        /// Output file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ProjectResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { network_path } => cmd_validate(&network_path),
        Commands::Sections {
            network_path,
            sorted,
        } => cmd_sections(&network_path, sorted),
        Commands::Cycles { network_path } => cmd_cycles(&network_path),
        Commands::Simplify {
            network_path,
            check_diameter,
            output,
        } => cmd_simplify(&network_path, check_diameter, output.as_deref()),
        Commands::Route {
            network_path,
            output,
        } => cmd_route(&network_path, output.as_deref()),
    }
}

fn load_tree(network_path: &Path) -> ProjectResult<Tree> {
    let network = load_network(network_path)?;
    build_tree(&network)
}

fn cmd_validate(network_path: &Path) -> ProjectResult<()> {
    println!("Validating network: {}", network_path.display());
    let tree = load_tree(network_path)?;
    tree.check_invariants()?;

    let issues = tree.validate_overlaps();
    for issue in &issues {
        println!("  ! {}", issue.message);
    }
    let cycles = tree.find_all_node_cycles().len();
    println!(
        "  {} nodes, {} connections, {} inlets, {} cycles",
        tree.node_count(),
        tree.connection_count(),
        tree.inlets().len(),
        cycles
    );
    if issues.is_empty() {
        println!("✓ Network is valid");
    } else {
        println!("✗ {} overlap issue(s)", issues.len());
    }
    Ok(())
}

fn cmd_sections(network_path: &Path, sorted: bool) -> ProjectResult<()> {
    let mut tree = load_tree(network_path)?;
    let sections = tree.sections(false, sorted)?;

    println!("Sections in {}:", network_path.display());
    for section in sections {
        let start = tree.position(section.start)?;
        let end = tree.position(section.end)?;
        println!(
            "  {:<12} flow {:>10.4}  {} -> {}  length {:.3}",
            section.key,
            section.flow,
            fmt_point(&start),
            fmt_point(&end),
            section.path.length()
        );
    }
    Ok(())
}

fn cmd_cycles(network_path: &Path) -> ProjectResult<()> {
    let tree = load_tree(network_path)?;
    let cycles = tree.find_all_node_cycles();

    if cycles.is_empty() {
        println!("No cycles found");
        return Ok(());
    }
    println!("Cycles in {}:", network_path.display());
    for (i, cycle) in cycles.iter().enumerate() {
        let points = cycle
            .iter()
            .map(|n| tree.position(*n).map(|p| fmt_point(&p)))
            .collect::<Result<Vec<_>, _>>()?;
        println!("  {}: {}", i, points.join(" - "));
    }
    Ok(())
}

fn cmd_simplify(network_path: &Path, check_diameter: bool, output: Option<&Path>) -> ProjectResult<()> {
    let mut tree = load_tree(network_path)?;
    let removed = tree.simplify(check_diameter, &[])?;
    tree.update_sections()?;

    let target = output.unwrap_or(network_path);
    save_network(target, &export_tree(&tree))?;
    info!(removed, "simplified network");
    println!("✓ Removed {} node(s), wrote {}", removed, target.display());
    Ok(())
}

fn cmd_route(network_path: &Path, output: Option<&Path>) -> ProjectResult<()> {
    let network = load_network(network_path)?;
    let mut tree = build_tree(&network)?;
    let Some(outcome) = apply_grid_route(&mut tree, &network)? else {
        println!("Network has no grid; nothing to route");
        return Ok(());
    };

    for inlet in &outcome.failed {
        let name = tree.node(*inlet).map(|n| n.name.clone()).unwrap_or_default();
        println!("  ! inlet {} could not be routed", name);
    }

    let target = output.unwrap_or(network_path);
    save_network(target, &export_tree(&tree))?;
    if outcome.all_connected() {
        println!("✓ All inlets routed, wrote {}", target.display());
    } else {
        println!(
            "✗ {} inlet(s) not routed, wrote {}",
            outcome.failed.len(),
            target.display()
        );
    }
    Ok(())
}
