use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    apply_shared_grid, build_file_name, load_build, load_settings, prepare_database_url,
    recommended_build::apply_validated_build, save_build, share_url, CatalogClient, CellEvent,
    CellInteractionController, Disposition, GridStore, HttpSolverClient, Key, LaunchContext,
    Modifiers, ModuleCatalog, OptimizeOutcome, Optimizer, Settings, StoreSync,
};
use shared::{Cell, CellPos, Grid};
use storage::Storage;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Launch URL carrying `platform` and, for shared grids, the `grid`
    /// payload.
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Show {
        #[arg(long)]
        json: bool,
    },
    ToggleActive {
        row: usize,
        col: usize,
    },
    ToggleSupercharged {
        row: usize,
        col: usize,
    },
    Tap {
        row: usize,
        col: usize,
        #[arg(long)]
        double: bool,
    },
    Reset,
    ResetTech {
        tech: String,
    },
    ApplyBuild {
        index: usize,
    },
    Optimize {
        tech: String,
        #[arg(long)]
        force: bool,
    },
    SaveBuild {
        name: String,
        path: PathBuf,
    },
    LoadBuild {
        path: PathBuf,
    },
    SelectModules {
        tech: String,
        ids: Vec<String>,
    },
    SwitchPlatform {
        name: String,
    },
    /// Prints a link that reopens the current grid.
    ShareUrl {
        #[arg(long, default_value = "https://planner.example/")]
        base: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(database_url) = cli.database_url.clone() {
        settings.database_url = database_url;
    }
    if let Some(api_url) = cli.api_url.clone() {
        settings.api_url = api_url;
    }

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Arc::new(Storage::new(&database_url).await?);
    let sync = StoreSync::new(storage, Duration::from_millis(settings.debounce_ms));

    let launch = match cli.url.as_deref() {
        Some(url) => LaunchContext::from_url(url)
            .with_context(|| format!("invalid launch url '{url}'"))?,
        None => LaunchContext::default(),
    };
    let mut grid_store = sync
        .load(&launch, &settings.valid_platforms, &settings.default_platform)
        .await?;
    if let Some(payload) = launch.shared_grid.as_deref() {
        if let Err(err) = open_shared_grid(&mut grid_store, &settings, payload).await {
            warn!("shared grid could not be opened, keeping the stored grid: {err:#}");
            grid_store.set_is_shared_grid(false);
        }
    }
    let store = Arc::new(Mutex::new(grid_store));

    let result = run(cli.command, &settings, &sync, &store).await;
    sync.flush().await?;
    result
}

async fn run(
    command: Command,
    settings: &Settings,
    sync: &StoreSync,
    store: &Arc<Mutex<GridStore>>,
) -> Result<()> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    match command {
        Command::Show { json } => {
            let store = store.lock().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
            } else {
                print_grid(&store);
            }
            return Ok(());
        }
        Command::ToggleActive { row, col } => {
            gesture(store, CellPos::new(row, col), &[CellEvent::KeyDown(Key::Space)]).await;
        }
        Command::ToggleSupercharged { row, col } => {
            gesture(store, CellPos::new(row, col), &[CellEvent::Click(Modifiers::NONE)]).await;
        }
        Command::Tap { row, col, double } => {
            let tap = [
                CellEvent::TouchStart,
                CellEvent::TouchEnd,
                CellEvent::Click(Modifiers::NONE),
            ];
            let pos = CellPos::new(row, col);
            let mut controller = CellInteractionController::new();
            report(&mut controller, store, pos, &tap).await;
            if double {
                tokio::time::sleep(Duration::from_millis(50)).await;
                report(&mut controller, store, pos, &tap).await;
            }
        }
        Command::Reset => store.lock().await.reset_grid(),
        Command::ResetTech { tech } => store.lock().await.reset_tech(&tech),
        Command::ApplyBuild { index } => {
            let platform = store.lock().await.platform().to_string();
            let catalog = CatalogClient::new(settings.api_url.clone(), timeout)?;
            let tree = catalog.tech_tree(&platform).await?;
            let build = tree.recommended_builds.get(index).ok_or_else(|| {
                anyhow!(
                    "platform '{platform}' has {} recommended builds, no index {index}",
                    tree.recommended_builds.len()
                )
            })?;
            apply_validated_build(
                &mut *store.lock().await,
                &ModuleCatalog::from_tech_tree(&tree),
                build,
            );
            println!("applied '{}'", build.title);
        }
        Command::Optimize { tech, force } => {
            let solver = HttpSolverClient::new(settings.api_url.clone(), timeout)?;
            let optimizer = Optimizer::new(Arc::clone(store), Arc::new(solver));
            match optimizer.optimize(&tech, force).await {
                OptimizeOutcome::Solved {
                    solve_method,
                    max_bonus,
                    solved_bonus,
                    grid_applied,
                } => println!(
                    "{tech}: {solve_method} max_bonus={} solved_bonus={} grid_applied={grid_applied}",
                    format_bonus(max_bonus),
                    format_bonus(solved_bonus)
                ),
                OptimizeOutcome::PatternNoFit => {
                    println!("{tech}: pattern does not fit; rerun with --force to place it anyway");
                }
                OptimizeOutcome::Failed => bail!("optimization for '{tech}' failed"),
            }
        }
        Command::SaveBuild { name, path } => {
            let raw = save_build(&*store.lock().await, &name)?;
            let target = if path.is_dir() {
                path.join(build_file_name(&name))
            } else {
                path
            };
            std::fs::write(&target, raw)
                .with_context(|| format!("failed to write {}", target.display()))?;
            println!("saved {}", target.display());
            return Ok(());
        }
        Command::LoadBuild { path } => {
            let raw = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut store = store.lock().await;
            let file = load_build(&mut store, &raw, &settings.valid_platforms)?;
            sync.save_platform(store.platform()).await?;
            println!("loaded '{}' for {}", file.name, file.ship_type);
        }
        Command::SelectModules { tech, ids } => {
            store
                .lock()
                .await
                .annotations_mut()
                .set_module_selection(&tech, ids);
        }
        Command::SwitchPlatform { name } => {
            if !settings.valid_platforms.contains(&name) {
                bail!(
                    "unknown platform '{name}', expected one of {:?}",
                    settings.valid_platforms
                );
            }
            let catalog = CatalogClient::new(settings.api_url.clone(), timeout)?;
            let definition = match catalog.tech_tree(&name).await {
                Ok(tree) => tree.grid_definition.clone(),
                Err(err) => {
                    warn!(platform = %name, "tech tree unavailable, starting from a blank grid: {err}");
                    None
                }
            };

            let mut store = store.lock().await;
            store.switch_platform(name.clone(), Grid::default());
            if let Some(definition) = definition {
                store.set_initial_grid_definition(Some(definition.clone()));
                store.set_grid_from_initial_definition(&definition);
            }
            sync.persist_grid(&store);
            sync.clear_auxiliary().await?;
            sync.save_platform(&name).await?;
            info!(platform = %name, "platform switched");
            return Ok(());
        }
        Command::ShareUrl { base } => {
            println!("{}", share_url(&base, &*store.lock().await)?);
            return Ok(());
        }
    }

    sync.persist_all(&*store.lock().await);
    Ok(())
}

async fn open_shared_grid(
    store: &mut GridStore,
    settings: &Settings,
    payload: &str,
) -> Result<()> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    let catalog = CatalogClient::new(settings.api_url.clone(), timeout)?;
    let tree = catalog.tech_tree(store.platform()).await?;
    apply_shared_grid(store, &ModuleCatalog::from_tech_tree(&tree), payload)?;
    Ok(())
}

async fn gesture(store: &Arc<Mutex<GridStore>>, pos: CellPos, events: &[CellEvent]) {
    let mut controller = CellInteractionController::new();
    report(&mut controller, store, pos, events).await;
}

async fn report(
    controller: &mut CellInteractionController,
    store: &Arc<Mutex<GridStore>>,
    pos: CellPos,
    events: &[CellEvent],
) {
    let mut store = store.lock().await;
    for event in events {
        match controller.handle(&mut store, pos, *event).disposition {
            Disposition::Ignored => {}
            Disposition::Applied(gesture) => println!("{gesture:?} applied at {pos:?}"),
            Disposition::Rejected(gesture) => println!("{gesture:?} rejected at {pos:?}"),
        }
    }
}

fn print_grid(store: &GridStore) {
    let grid = store.grid();
    println!(
        "platform={} {}x{} supercharged={} shared={} fixed={}",
        store.platform(),
        grid.width,
        grid.height,
        store.total_supercharged_cells(),
        store.is_shared_grid(),
        store.grid_fixed()
    );
    for row in &grid.cells {
        let line: Vec<String> = row.iter().map(cell_glyph).collect();
        println!("{}", line.join(" "));
    }
    let mut techs: Vec<&str> = store.annotations().techs().collect();
    techs.sort_unstable();
    for tech in techs {
        let Some(annotation) = store.annotations().get(tech) else {
            continue;
        };
        println!(
            "{tech}: max_bonus={} solved_bonus={} status={:?} modules={:?}",
            format_bonus(annotation.max_bonus),
            format_bonus(annotation.solved_bonus),
            annotation.bonus_status,
            annotation.selected_module_ids.as_deref().unwrap_or_default()
        );
    }
}

fn cell_glyph(cell: &Cell) -> String {
    let body = match (&cell.tech, &cell.module) {
        (Some(tech), Some(module)) => {
            let short: String = tech.chars().take(3).collect();
            format!("{short}:{module}")
        }
        _ if cell.active => ".".to_string(),
        _ => "x".to_string(),
    };
    let marker = if cell.supercharged { "*" } else { " " };
    format!("{body:>8}{marker}")
}

fn format_bonus(bonus: Option<f64>) -> String {
    bonus.map_or_else(|| "-".to_string(), |value| format!("{value:.2}"))
}
