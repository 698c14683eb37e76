//! qc-ingest - load rendered QC images into the rating database

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qc_common::config::{defaults, load_toml_config, resolve_database_path};
use qc_common::db::init_database;
use qc_ingest::index::read_index;
use qc_ingest::plan::{
    dtifit_jobs, fmap_coregistration_jobs, mask_jobs, spatial_normalization_jobs,
    surface_localization_jobs, Plan,
};
use qc_ingest::{CommandRenderer, Ingestor};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "qc-ingest")]
#[command(about = "Render pipeline outputs and store them for rating")]
#[command(version)]
struct Args {
    /// SQLite database file (also QCAPP_DATABASE)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Replace payloads of images that already exist
    #[arg(long, global = true)]
    update: bool,

    /// Program producing PNG/GIF bytes on stdout
    #[arg(long, global = true, env = "QCAPP_RENDER_COMMAND")]
    render_command: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Brain masks over T1w anatomicals, from a BIDS index
    Masks { index: PathBuf },

    /// MNI-space anatomicals under the atlas outline, from a BIDS index
    SpatialNormalization { index: PathBuf },

    /// FreeSurfer surfaces for the listed subjects
    SurfaceLocalization {
        subjects_dir: PathBuf,
        #[arg(required = true)]
        include: Vec<String>,
    },

    /// Field-map to BOLD coregistration, from a BIDS index
    FmapCoregistration { index: PathBuf },

    /// Color-FA animations for every *dwi_FA.nii.gz under a directory
    Dtifit { subjects_dir: PathBuf },
}

impl Command {
    fn plan(&self) -> Result<Plan> {
        let plan = match self {
            Command::Masks { index } => mask_jobs(&read_index(index)?),
            Command::SpatialNormalization { index } => spatial_normalization_jobs(&read_index(index)?),
            Command::SurfaceLocalization { subjects_dir, include } => {
                surface_localization_jobs(subjects_dir, include)?
            }
            Command::FmapCoregistration { index } => fmap_coregistration_jobs(&read_index(index)?),
            Command::Dtifit { subjects_dir } => {
                if !subjects_dir.is_dir() {
                    anyhow::bail!("{} is not a directory", subjects_dir.display());
                }
                dtifit_jobs(subjects_dir)
            }
        };
        Ok(plan)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = load_toml_config().context("Failed to load config file")?;

    let default_filter = format!(
        "qc_ingest={level},qc_common={level}",
        level = toml_config.logging.level.as_deref().unwrap_or(defaults::LOG_LEVEL)
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting qc-ingest v{}", env!("CARGO_PKG_VERSION"));

    let db_path = resolve_database_path(args.database.as_deref(), &toml_config);
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let program = args
        .render_command
        .or(toml_config.ingest.render_command)
        .unwrap_or_else(|| defaults::RENDER_COMMAND.to_string());
    info!("Renderer: {}", program);

    let plan = args.command.plan()?;
    info!(
        jobs = plan.jobs.len(),
        unresolved = plan.unresolved,
        update = args.update,
        "Planned {:?}",
        args.command
    );

    let ingestor = Ingestor::new(pool, CommandRenderer::new(program), args.update);
    let summary = ingestor.run(plan).await?;
    println!("{}", summary);

    Ok(())
}
